//! # 路径解析层
//!
//! 从根目录出发逐级查找，把 `/a/b/c` 解析为 inode ID。
//! 连续的 `/` 产生的空路径项被跳过。

use crate::{FsError, FsResult, SnapFileSystem, ROOT_INODE};

impl SnapFileSystem {
    /// 解析一条以 `/` 开头的绝对路径。`/` 解析为根目录
    pub fn resolve(&mut self, path: &str) -> FsResult<u32> {
        if !path.starts_with('/') {
            return Err(FsError::NotFound);
        }

        let mut current = ROOT_INODE;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let inode = self.read_inode(current)?;
            if !inode.is_dir() {
                return Err(FsError::NotADirectory);
            }
            current = self.dir_find(&inode, component)?;
        }
        Ok(current)
    }

    /// 把路径拆成 `(父目录 inode ID, 末项名)`。
    /// 末尾多余的 `/` 被容忍；根目录没有父目录。
    pub fn parent_and_name<'p>(&mut self, path: &'p str) -> FsResult<(u32, &'p str)> {
        if !path.starts_with('/') {
            return Err(FsError::NotFound);
        }
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            // 目标是根目录
            return Err(FsError::NotFound);
        }

        let (parent_path, name) = trimmed.rsplit_once('/').ok_or(FsError::NotFound)?;
        let parent_path = if parent_path.is_empty() { "/" } else { parent_path };

        let parent_id = self.resolve(parent_path)?;
        Ok((parent_id, name))
    }
}
