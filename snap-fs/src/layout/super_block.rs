use core::{mem, ptr, slice};

use crate::{
    BLOCK_COUNT, BLOCK_SIZE, DATA_BLOCK_END, DATA_BLOCK_START, INODE_COUNT, MAGIC, VERSION,
};

use super::DirEntry;

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 记录空闲 inode / 空闲块计数，作为每次分配的提交点
#[derive(Debug, Clone, Default)]
#[repr(C)]
pub struct SuperBlock {
    pub block_size: u32,
    pub block_count: u32,
    pub inode_count: u32,
    /// inode 位图中 0 位的数量
    pub free_inode_count: u32,
    /// 块位图中数据区 0 位的数量
    pub free_block_count: u32,
    magic: u32,
    version: u32,
    dirent_size: u32,
}

impl SuperBlock {
    pub const SIZE: usize = mem::size_of::<Self>();

    /// 一个刚格式化完的卷的超级块。
    /// 数据区全空，inode 0 已被根目录占用。
    pub fn fresh() -> Self {
        Self {
            block_size: BLOCK_SIZE as u32,
            block_count: BLOCK_COUNT as u32,
            inode_count: INODE_COUNT as u32,
            free_inode_count: INODE_COUNT as u32 - 1,
            free_block_count: (DATA_BLOCK_END - DATA_BLOCK_START) as u32,
            magic: MAGIC,
            version: VERSION,
            dirent_size: DirEntry::SIZE as u32,
        }
    }

    /// 布局识别：魔数、版本、目录项大小与几何参数全部匹配才算兼容，
    /// 否则打开时重新格式化
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
            && self.version == VERSION
            && self.dirent_size == DirEntry::SIZE as u32
            && self.block_size == BLOCK_SIZE as u32
            && self.block_count == BLOCK_COUNT as u32
            && self.inode_count == INODE_COUNT as u32
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), Self::SIZE) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), Self::SIZE) }
    }

    pub fn load(buf: &[u8]) -> Self {
        let mut sb = Self::default();
        sb.as_bytes_mut().copy_from_slice(&buf[..Self::SIZE]);
        sb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_is_valid() {
        assert!(SuperBlock::fresh().is_valid());
        assert!(!SuperBlock::default().is_valid());
    }

    #[test]
    fn byte_round_trip() {
        let sb = SuperBlock::fresh();
        let loaded = SuperBlock::load(sb.as_bytes());
        assert!(loaded.is_valid());
        assert_eq!(loaded.free_block_count, sb.free_block_count);
    }
}
