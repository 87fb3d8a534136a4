//! # 文件系统 API 层
//!
//! 外部调用方的唯一入口：所有操作以 UTF-8 路径寻址，
//! 由一把粗粒度互斥锁串行化整个引擎。
//!
//! 路径先统一规整：反斜杠换成 `/`，没有前导 `/` 就补上，
//! 根之外的尾随 `/` 全部去掉。
//!
//! 写文件会隐式地把父目录链补齐；创建目录是幂等的。

use std::sync::{Arc, Mutex, MutexGuard};

use block_dev::BlockDevice;

use crate::{
    CacheStats, DiskInode, FsError, FsResult, InodeKind, SnapFileSystem, SnapshotInfo,
    MAX_FILE_SIZE, NAME_MAX_LEN, ROOT_INODE,
};

/// 一个文件系统项的元信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub inode: u32,
    pub kind: InodeKind,
    /// 字节大小；目录则为条目区大小
    pub size: u32,
    /// 占用的数据块数
    pub blocks: u32,
}

/// 引擎的公开句柄。
/// 调用方持有一个值即可在多线程间共享（内部互斥），
/// 不存在任何进程级全局状态。
pub struct SnapFs {
    inner: Mutex<SnapFileSystem>,
}

impl SnapFs {
    /// 打开镜像；空白或不兼容的镜像会被重新格式化
    pub fn open(device: Arc<dyn BlockDevice>, cache_capacity: usize) -> FsResult<Self> {
        Ok(Self {
            inner: Mutex::new(SnapFileSystem::open(device, cache_capacity)?),
        })
    }

    /// 无条件格式化后打开
    pub fn format(device: Arc<dyn BlockDevice>, cache_capacity: usize) -> FsResult<Self> {
        Ok(Self {
            inner: Mutex::new(SnapFileSystem::format(device, cache_capacity)?),
        })
    }

    /// 读出整个文件的内容
    pub fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        let path = normalize(path);
        let mut fs = self.lock();

        let inode_id = fs.resolve(&path)?;
        let inode = fs.read_inode(inode_id)?;
        if !inode.is_file() {
            return Err(FsError::NotAFile);
        }

        let mut content = vec![0u8; inode.size as usize];
        let read = fs.read_data(&inode, &mut content, 0)?;
        if read != content.len() {
            return Err(FsError::Corrupt("short read of file data"));
        }
        Ok(content)
    }

    /// 写入整个文件，覆盖旧内容。
    /// 缺失的父目录链会被隐式创建；目标已存在且不是文件时报错。
    pub fn write_file(&self, path: &str, data: &[u8]) -> FsResult<()> {
        if data.len() > MAX_FILE_SIZE {
            return Err(FsError::FileTooLarge);
        }
        let path = normalize(path);
        if path == "/" {
            return Err(FsError::NotAFile);
        }
        let mut fs = self.lock();

        let (parent_path, name) = split_parent(&path);
        Self::ensure_directory(&mut fs, parent_path)?;
        let parent_id = fs.resolve(parent_path)?;
        let parent = fs.read_inode(parent_id)?;

        let inode_id = match fs.dir_lookup(&parent, name)? {
            Some(existing) => {
                let mut inode = fs.read_inode(existing)?;
                if !inode.is_file() {
                    return Err(FsError::NotAFile);
                }
                // 覆盖写先退还旧块
                if inode.block_count > 0 {
                    fs.free_inode_blocks(&mut inode)?;
                }
                inode.size = 0;
                fs.write_inode(existing, &inode)?;
                existing
            }
            None => {
                if name.len() > NAME_MAX_LEN {
                    return Err(FsError::NameTooLong);
                }
                let new_id = fs.alloc_inode()?;
                let mut inode = DiskInode::default();
                inode.init(InodeKind::File);
                fs.write_inode(new_id, &inode)?;
                if let Err(e) = fs.dir_add(parent_id, name, new_id) {
                    let _ = fs.free_inode(new_id);
                    return Err(e);
                }
                new_id
            }
        };

        if data.is_empty() {
            // 空文件只需要留下大小为 0 的 inode
            return Ok(());
        }
        let mut inode = fs.read_inode(inode_id)?;
        let written = fs.write_data(&mut inode, inode_id, data, 0)?;
        if written != data.len() {
            return Err(FsError::WriteFailed);
        }
        Ok(())
    }

    /// 删除一个文件。目录要走单独的接口，这里直接拒绝
    pub fn delete_file(&self, path: &str) -> FsResult<()> {
        let path = normalize(path);
        if path == "/" {
            return Err(FsError::NotAFile);
        }
        let mut fs = self.lock();

        let (parent_id, name) = fs.parent_and_name(&path)?;
        let mut parent = fs.read_inode(parent_id)?;
        let target_id = fs.dir_find(&parent, name)?;
        let mut target = fs.read_inode(target_id)?;
        if !target.is_file() {
            return Err(FsError::NotAFile);
        }

        fs.free_inode_blocks(&mut target)?;
        fs.write_inode(target_id, &target)?;
        fs.free_inode(target_id)?;
        fs.dir_remove(&mut parent, parent_id, name)?;
        Ok(())
    }

    /// 创建一个目录，幂等：已存在同名目录时直接成功；
    /// 同名位置被非目录占用时报 [`FsError::AlreadyExists`]
    pub fn create_directory(&self, path: &str) -> FsResult<()> {
        let path = normalize(path);
        let mut fs = self.lock();

        if path == "/" {
            return Ok(());
        }
        match fs.resolve(&path) {
            Ok(inode_id) => {
                if fs.read_inode(inode_id)?.is_dir() {
                    Ok(())
                } else {
                    Err(FsError::AlreadyExists)
                }
            }
            Err(FsError::NotFound) => {
                let (parent_id, name) = fs.parent_and_name(&path)?;
                Self::make_directory(&mut fs, parent_id, name).map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    /// 目录的条目名，按存储顺序
    pub fn list_directory(&self, path: &str) -> FsResult<Vec<String>> {
        let path = normalize(path);
        let mut fs = self.lock();

        let inode_id = fs.resolve(&path)?;
        let inode = fs.read_inode(inode_id)?;
        let entries = fs.dir_entries(&inode)?;
        Ok(entries.iter().map(|e| e.name().to_owned()).collect())
    }

    /// 路径是否存在
    pub fn exists(&self, path: &str) -> bool {
        let path = normalize(path);
        self.lock().resolve(&path).is_ok()
    }

    pub fn stat(&self, path: &str) -> FsResult<Stat> {
        let path = normalize(path);
        let mut fs = self.lock();

        let inode_id = fs.resolve(&path)?;
        let inode = fs.read_inode(inode_id)?;
        let kind = inode.kind().ok_or(FsError::Corrupt("invalid inode type"))?;
        Ok(Stat {
            inode: inode_id,
            kind,
            size: inode.size,
            blocks: inode.block_count,
        })
    }

    /// 创建全卷快照。`path` 被忽略：快照没有路径粒度
    pub fn create_snapshot(&self, _path: &str, name: &str) -> FsResult<u32> {
        self.lock().create_snapshot(name)
    }

    pub fn restore_snapshot(&self, name: &str) -> FsResult<()> {
        let mut fs = self.lock();
        let id = fs.find_snapshot(name)?;
        fs.restore_snapshot(id)
    }

    pub fn delete_snapshot(&self, name: &str) -> FsResult<()> {
        let mut fs = self.lock();
        let id = fs.find_snapshot(name)?;
        fs.delete_snapshot(id)
    }

    /// 激活快照的名字，字典序
    pub fn list_snapshots(&self, _path: &str) -> FsResult<Vec<String>> {
        let mut names: Vec<String> = self
            .lock()
            .list_snapshots()?
            .iter()
            .map(|record| record.name().to_owned())
            .collect();
        names.sort();
        Ok(names)
    }

    /// 激活快照的完整描述，按 ID 升序
    pub fn snapshots(&self) -> FsResult<Vec<SnapshotInfo>> {
        Ok(self
            .lock()
            .list_snapshots()?
            .iter()
            .map(|record| SnapshotInfo {
                id: record.id,
                name: record.name().to_owned(),
                timestamp: record.timestamp,
            })
            .collect())
    }

    /// 当前超级块的副本，暴露空闲 inode / 空闲块计数
    pub fn super_block(&self) -> FsResult<crate::SuperBlock> {
        self.lock().super_block()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock().cache_stats()
    }

    pub fn clear_cache(&self) {
        self.lock().clear_cache();
    }
}

impl SnapFs {
    fn lock(&self) -> MutexGuard<'_, SnapFileSystem> {
        self.inner.lock().unwrap()
    }

    /// 自根向下补齐目录链。
    /// 途中撞到非目录就报 [`FsError::NotADirectory`]。
    fn ensure_directory(fs: &mut SnapFileSystem, path: &str) -> FsResult<()> {
        let mut current = ROOT_INODE;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let inode = fs.read_inode(current)?;
            if !inode.is_dir() {
                return Err(FsError::NotADirectory);
            }
            current = match fs.dir_lookup(&inode, component)? {
                Some(child_id) => {
                    if !fs.read_inode(child_id)?.is_dir() {
                        return Err(FsError::NotADirectory);
                    }
                    child_id
                }
                None => Self::make_directory(fs, current, component)?,
            };
        }
        Ok(())
    }

    /// 在 `parent_id` 下创建名为 `name` 的目录。
    /// 与并发创建撞名不算失败：撞上的已是目录就沿用它。
    fn make_directory(fs: &mut SnapFileSystem, parent_id: u32, name: &str) -> FsResult<u32> {
        if name.len() > NAME_MAX_LEN {
            return Err(FsError::NameTooLong);
        }
        let new_id = fs.alloc_inode()?;
        let mut inode = DiskInode::default();
        inode.init(InodeKind::Directory);
        fs.write_inode(new_id, &inode)?;

        match fs.dir_add(parent_id, name, new_id) {
            Ok(()) => Ok(new_id),
            Err(FsError::AlreadyExists) => {
                let _ = fs.free_inode(new_id);
                let parent = fs.read_inode(parent_id)?;
                let existing = fs.dir_find(&parent, name)?;
                if fs.read_inode(existing)?.is_dir() {
                    Ok(existing)
                } else {
                    Err(FsError::AlreadyExists)
                }
            }
            Err(e) => {
                let _ = fs.free_inode(new_id);
                Err(e)
            }
        }
    }
}

/// 路径规整：`\` 换 `/`，补前导 `/`，去根之外的尾随 `/`
fn normalize(path: &str) -> String {
    let mut path = path.replace('\\', "/");
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    path
}

/// 规整后的非根路径拆成 `(父路径, 末项名)`
fn split_parent(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some(("", name)) => ("/", name),
        Some((parent, name)) => (parent, name),
        None => ("/", path),
    }
}
