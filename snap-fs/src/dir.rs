//! # 目录层
//!
//! 目录的数据就是目录项记录的紧密排列；追加、查找、删除都经由
//! 索引节点层的字节读写完成。
//!
//! 追加要对抗并发增长：另一个线程可能在本线程读出 inode 之后
//! 扩展了目录。每次尝试都从重新读取父 inode 开始，观察到大小
//! 变化就有限次重试。
//! 删除用「末项换位」保持排列紧密，先换位成功才收缩大小，
//! 这样中途失败最多留下一个重复条目，查找仍取首个匹配。

use crate::{DirEntry, DiskInode, FsError, FsResult, SnapFileSystem, NAME_MAX_LEN};

/// 观察到并发修改时的追加重试次数
const DIR_ADD_RETRIES: usize = 3;

impl SnapFileSystem {
    /// 向目录追加一个条目。
    /// 同名条目已存在时报 [`FsError::AlreadyExists`]；
    /// 重试耗尽报 [`FsError::WriteFailed`]。
    pub fn dir_add(&mut self, parent_id: u32, name: &str, child_id: u32) -> FsResult<()> {
        if name.len() > NAME_MAX_LEN {
            return Err(FsError::NameTooLong);
        }

        for _ in 0..DIR_ADD_RETRIES {
            // 重新读取，观察最新的大小
            let mut parent = self.read_inode(parent_id)?;
            if !parent.is_dir() {
                return Err(FsError::NotADirectory);
            }
            if self.dir_lookup(&parent, name)?.is_some() {
                return Err(FsError::AlreadyExists);
            }

            let entry = DirEntry::new(name, child_id);
            let append_at = parent.size as usize;
            let written = self.write_data(&mut parent, parent_id, entry.as_bytes(), append_at)?;
            if written == DirEntry::SIZE {
                return Ok(());
            }

            // 部分写入：大小没变说明不是并发增长，重试无益
            let latest = self.read_inode(parent_id)?;
            if latest.size as usize == append_at {
                return Err(FsError::WriteFailed);
            }
        }
        Err(FsError::WriteFailed)
    }

    /// 线性扫描目录，返回第一个同名条目的 inode ID
    pub fn dir_find(&mut self, parent: &DiskInode, name: &str) -> FsResult<u32> {
        self.dir_lookup(parent, name)?.ok_or(FsError::NotFound)
    }

    pub(crate) fn dir_lookup(&mut self, parent: &DiskInode, name: &str) -> FsResult<Option<u32>> {
        if !parent.is_dir() {
            return Err(FsError::NotADirectory);
        }
        let entry_count = parent.size as usize / DirEntry::SIZE;
        for index in 0..entry_count {
            let entry = self.dir_entry_at(parent, index)?;
            if entry.name() == name {
                return Ok(Some(entry.inode_id()));
            }
        }
        Ok(None)
    }

    /// 删除目录中的一个条目。
    /// 被删条目不在末尾时先用末项覆盖它，换位写成功后才收缩大小。
    pub fn dir_remove(
        &mut self,
        parent: &mut DiskInode,
        parent_id: u32,
        name: &str,
    ) -> FsResult<()> {
        if !parent.is_dir() {
            return Err(FsError::NotADirectory);
        }
        let entry_count = parent.size as usize / DirEntry::SIZE;

        let mut found = None;
        for index in 0..entry_count {
            if self.dir_entry_at(parent, index)?.name() == name {
                found = Some(index);
                break;
            }
        }
        let Some(index) = found else {
            return Err(FsError::NotFound);
        };

        if index + 1 < entry_count {
            let last = self.dir_entry_at(parent, entry_count - 1)?;
            let written = self.write_data(
                parent,
                parent_id,
                last.as_bytes(),
                index * DirEntry::SIZE,
            )?;
            if written != DirEntry::SIZE {
                return Err(FsError::WriteFailed);
            }
        }

        parent.size -= DirEntry::SIZE as u32;
        self.write_inode(parent_id, parent)?;
        Ok(())
    }

    /// 目录的全部条目，按存储顺序
    pub fn dir_entries(&mut self, parent: &DiskInode) -> FsResult<Vec<DirEntry>> {
        if !parent.is_dir() {
            return Err(FsError::NotADirectory);
        }
        let entry_count = parent.size as usize / DirEntry::SIZE;
        let mut entries = Vec::with_capacity(entry_count);
        for index in 0..entry_count {
            entries.push(self.dir_entry_at(parent, index)?);
        }
        Ok(entries)
    }

    fn dir_entry_at(&mut self, parent: &DiskInode, index: usize) -> FsResult<DirEntry> {
        let mut entry = DirEntry::empty();
        let read = self.read_data(parent, entry.as_bytes_mut(), index * DirEntry::SIZE)?;
        if read != DirEntry::SIZE {
            return Err(FsError::Corrupt("truncated directory entry"));
        }
        Ok(entry)
    }
}
