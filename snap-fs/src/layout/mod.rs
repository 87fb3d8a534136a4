//! # 磁盘数据结构层
//!
//! 磁盘上的所有记录都是 `#[repr(C)]` 的小端定宽整数结构，
//! 通过 `as_bytes`/`as_bytes_mut` 与块缓冲区之间整体拷贝，
//! 从不长期持有指向缓冲区内部的指针。

mod super_block;
pub use super_block::SuperBlock;

pub mod bitmap;

mod inode;
pub use inode::{
    indirect_from, indirect_to, DiskInode, IndirectBlock, InodeKind, DIRECT_COUNT, NO_BLOCK,
};

mod dir_entry;
pub use dir_entry::{DirEntry, NAME_MAX_LEN};

mod snapshot;
pub use snapshot::{SnapshotRecord, MAX_SNAPSHOTS, SNAPSHOT_NAME_MAX_LEN};
