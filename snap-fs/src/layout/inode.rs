use core::{mem, ptr, slice};

use crate::{Block, BLOCK_SIZE, POINTERS_PER_BLOCK};

/// 直接索引块可编号数量
pub const DIRECT_COUNT: usize = 10;
/// 块指针的空值
pub const NO_BLOCK: i32 = -1;

/// 一级间接索引块：整个块连续存储块指针，每个都指向一个数据块
pub type IndirectBlock = [i32; POINTERS_PER_BLOCK];

/// 64 字节的 inode 表项。
///
/// 块指针有效时为数据区块ID，空槽为 [`NO_BLOCK`]；
/// 逻辑块 `0..DIRECT_COUNT` 走直接索引，其余经一级间接索引块。
#[derive(Debug, Clone, Default)]
#[repr(C)]
pub struct DiskInode {
    kind: u32,
    /// 文件大小（字节）；目录则恒为条目数乘以条目大小
    pub size: u32,
    /// 已挂接的数据块数量
    pub block_count: u32,
    pub direct: [i32; DIRECT_COUNT],
    pub indirect: i32,
    _reserved: [u32; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum InodeKind {
    File = 1,
    Directory = 2,
}

impl DiskInode {
    pub const SIZE: usize = mem::size_of::<Self>();

    pub fn init(&mut self, kind: InodeKind) {
        *self = Self {
            kind: kind as u32,
            size: 0,
            block_count: 0,
            direct: [NO_BLOCK; DIRECT_COUNT],
            indirect: NO_BLOCK,
            _reserved: [0; 2],
        };
    }

    /// 磁盘上读出的类型字段，垃圾值返回空
    pub fn kind(&self) -> Option<InodeKind> {
        match self.kind {
            1 => Some(InodeKind::File),
            2 => Some(InodeKind::Directory),
            _ => None,
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == InodeKind::Directory as u32
    }

    #[inline]
    pub fn is_file(&self) -> bool {
        self.kind == InodeKind::File as u32
    }

    /// 容纳 `size` 字节需要的数据块数
    #[inline]
    pub fn blocks_for_size(size: usize) -> usize {
        size.div_ceil(BLOCK_SIZE)
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
        let mut inode = Self::default();
        inode.as_bytes_mut().copy_from_slice(&buf[..Self::SIZE]);
        inode
    }
}

/// 把一个块解释为间接索引表
pub fn indirect_from(block: &Block) -> IndirectBlock {
    let mut table = [NO_BLOCK; POINTERS_PER_BLOCK];
    for (slot, bytes) in table.iter_mut().zip(block.chunks_exact(4)) {
        *slot = i32::from_le_bytes(bytes.try_into().unwrap());
    }
    table
}

/// 把间接索引表编码回一个块
pub fn indirect_to(table: &IndirectBlock) -> Block {
    let mut block = [0u8; BLOCK_SIZE];
    for (bytes, slot) in block.chunks_exact_mut(4).zip(table.iter()) {
        bytes.copy_from_slice(&slot.to_le_bytes());
    }
    block
}
