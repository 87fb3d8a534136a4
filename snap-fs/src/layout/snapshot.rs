use core::{mem, ptr, slice};

use crate::{BLOCK_SIZE, INODE_TABLE_BLOCKS, SNAPSHOT_TABLE_BLOCKS};

use super::{SuperBlock, NO_BLOCK};

/// 快照名的最大字节数，记录里最后一字节留给 `\0`
pub const SNAPSHOT_NAME_MAX_LEN: usize = 31;

/// 快照表能容纳的记录数
pub const MAX_SNAPSHOTS: usize =
    SNAPSHOT_TABLE_BLOCKS * BLOCK_SIZE / SnapshotRecord::SIZE;

/// 快照表中的一条定宽记录。
///
/// 记录冻结元数据的去处：两张位图和 16 个 inode 表块在创建快照时
/// 被整块复制到数据区新分配的块里，这里存其块ID。
/// `active` 置 1 是创建流程的提交点；未激活的记录槽可以被复用。
#[derive(Debug, Clone, Default)]
#[repr(C)]
pub struct SnapshotRecord {
    /// 槽位下标即 ID
    pub id: u32,
    pub active: u32,
    /// 创建时刻，Unix 秒
    pub timestamp: i64,
    /// 冻结时的根目录 inode，恒为 0
    pub root_inode_id: u32,
    name: [u8; SNAPSHOT_NAME_MAX_LEN + 1],
    /// 冻结时的超级块
    pub super_block: SuperBlock,
    /// inode 位图副本所在块
    pub inode_bitmap_block: i32,
    /// 块位图副本所在块
    pub block_bitmap_block: i32,
    /// inode 表副本所在的 16 个块
    pub inode_table_blocks: [i32; INODE_TABLE_BLOCKS],
    /// 冻结时已用的 inode 数
    pub used_inodes: u32,
    /// 冻结时已用的数据块数
    pub used_blocks: u32,
}

impl SnapshotRecord {
    pub const SIZE: usize = mem::size_of::<Self>();

    pub fn new(id: u32, name: &str, timestamp: i64) -> Self {
        debug_assert!(name.len() <= SNAPSHOT_NAME_MAX_LEN);
        let mut record = Self {
            id,
            timestamp,
            inode_bitmap_block: NO_BLOCK,
            block_bitmap_block: NO_BLOCK,
            inode_table_blocks: [NO_BLOCK; INODE_TABLE_BLOCKS],
            ..Self::default()
        };
        record.name[..name.len()].copy_from_slice(name.as_bytes());
        record
    }

    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active == 1
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
        let mut record = Self::default();
        record.as_bytes_mut().copy_from_slice(&buf[..Self::SIZE]);
        record
    }
}
