//! # snap-fs 的整体架构，自下而上
//!
//! 1. 块设备接口层（`block_dev` crate）
//! 2. 块缓存层：LRU 写穿缓存，承接上层所有磁盘读写
//! 3. 分配器层：inode 位图、块位图、每块引用计数
//! 4. 快照层：冻结位图与 inode 表的全卷 COW 快照
//! 5. 索引节点层：inode 表读写、块映射增长、按字节读写
//! 6. 目录层：目录 inode 字节流上的条目操作
//! 7. 路径解析层：`/a/b/c` 到 inode ID
//! 8. 文件系统 API 层：以路径寻址的公开接口
//!
//! ## 磁盘布局
//!
//! 超级块 | inode 位图 | 块位图 | inode 表 | 快照表 | 引用计数表 | 数据区

mod block_cache;
pub use block_cache::{BlockCache, CacheStats};

mod layout;
pub use layout::{
    DirEntry, DiskInode, InodeKind, SnapshotRecord, SuperBlock, DIRECT_COUNT, MAX_SNAPSHOTS,
    NAME_MAX_LEN, NO_BLOCK, SNAPSHOT_NAME_MAX_LEN,
};

mod error;
pub use error::{FsError, FsResult};

// 磁盘管理器层：格式化、打开与一致性修复
mod fs;
pub use fs::SnapFileSystem;

// 分配器层
mod alloc;

// 索引节点层
mod inode;

// 目录层
mod dir;

// 路径解析层
mod path;

// 快照层
mod snapshot;
pub use snapshot::SnapshotInfo;

// 文件系统 API 层
mod vfs;
pub use vfs::{SnapFs, Stat};

/// 超级块魔数，ASCII 为 "OSFS"
pub const MAGIC: u32 = 0x4F53_4653;
/// 磁盘布局版本
pub const VERSION: u32 = 2;

pub const BLOCK_SIZE: usize = 1024;
pub const DISK_SIZE: usize = 100 * 1024 * 1024;
pub const BLOCK_COUNT: usize = DISK_SIZE / BLOCK_SIZE;
/// 一个位图块的位数
pub const BLOCK_BITS: usize = BLOCK_SIZE * 8;

/* 各区域的起始块ID，顺序固定 */

pub const SUPERBLOCK_BLOCK: usize = 0;
pub const INODE_BITMAP_BLOCK: usize = 1;
pub const BLOCK_BITMAP_BLOCK: usize = 2;
pub const INODE_TABLE_START: usize = 3;
pub const INODE_TABLE_BLOCKS: usize = 16;
pub const SNAPSHOT_TABLE_START: usize = INODE_TABLE_START + INODE_TABLE_BLOCKS;
pub const SNAPSHOT_TABLE_BLOCKS: usize = 4;
pub const REFCOUNT_TABLE_START: usize = SNAPSHOT_TABLE_START + SNAPSHOT_TABLE_BLOCKS;
pub const REFCOUNT_TABLE_BLOCKS: usize = BLOCK_COUNT / BLOCK_SIZE;
pub const DATA_BLOCK_START: usize = REFCOUNT_TABLE_START + REFCOUNT_TABLE_BLOCKS;
/// 数据区可分配范围的上界（不含）。
/// 块位图只占一个块，能覆盖的块数少于镜像的总块数，
/// 可分配范围以位图容量为上限；位图之外的块永远不会被分配。
pub const DATA_BLOCK_END: usize = if BLOCK_COUNT < BLOCK_BITS {
    BLOCK_COUNT
} else {
    BLOCK_BITS
};

/// 一个 inode 表项的大小
pub const INODE_SIZE: usize = 64;
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;
/// inode 总数，由 inode 表区域大小决定
pub const INODE_COUNT: usize = INODE_TABLE_BLOCKS * INODES_PER_BLOCK;

/// 根目录的 inode ID 恒为 0
pub const ROOT_INODE: u32 = 0;

/// 间接索引块的编号容量
pub const POINTERS_PER_BLOCK: usize = BLOCK_SIZE / 4;
/// 单个 inode 可寻址的数据块上限：直接索引 + 一级间接索引
pub const MAX_FILE_BLOCKS: usize = layout::DIRECT_COUNT + POINTERS_PER_BLOCK;
pub const MAX_FILE_SIZE: usize = MAX_FILE_BLOCKS * BLOCK_SIZE;

pub type Block = [u8; BLOCK_SIZE];
