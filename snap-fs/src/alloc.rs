//! # 分配器层
//!
//! 在 inode 位图、块位图和引用计数表上做位级分配与释放。
//! 每次变更都先写位图/计数字节，再写超级块计数，
//! 后者是该次变更的提交点。

use crate::layout::bitmap;
use crate::{
    FsError, FsResult, SnapFileSystem, BLOCK_BITMAP_BLOCK, DATA_BLOCK_END, DATA_BLOCK_START,
    INODE_BITMAP_BLOCK, INODE_COUNT,
};

impl SnapFileSystem {
    /// 分配最低编号的空闲 inode
    pub fn alloc_inode(&mut self) -> FsResult<u32> {
        let mut bits = self.cache().read(INODE_BITMAP_BLOCK)?;
        let Some(inode_id) = bitmap::alloc_in(&mut bits, 0..INODE_COUNT) else {
            return Err(FsError::ExhaustedInodes);
        };
        self.cache().write(INODE_BITMAP_BLOCK, &bits)?;

        let mut sb = self.read_super()?;
        sb.free_inode_count = sb.free_inode_count.saturating_sub(1);
        self.write_super(&sb)?;
        Ok(inode_id as u32)
    }

    /// 释放一个 inode。不触碰它的块映射，
    /// 调用方必须先释放数据块
    pub fn free_inode(&mut self, inode_id: u32) -> FsResult<()> {
        if inode_id as usize >= INODE_COUNT {
            return Err(FsError::Corrupt("inode id out of range"));
        }
        let mut bits = self.cache().read(INODE_BITMAP_BLOCK)?;
        if !bitmap::get(&bits, inode_id as usize) {
            return Ok(());
        }
        bitmap::clear(&mut bits, inode_id as usize);
        self.cache().write(INODE_BITMAP_BLOCK, &bits)?;

        let mut sb = self.read_super()?;
        sb.free_inode_count += 1;
        self.write_super(&sb)?;
        Ok(())
    }

    /// 在数据区分配最低编号的空闲块，引用计数置 1
    pub fn alloc_block(&mut self) -> FsResult<u32> {
        let mut bits = self.cache().read(BLOCK_BITMAP_BLOCK)?;
        let Some(block_id) = bitmap::alloc_in(&mut bits, DATA_BLOCK_START..DATA_BLOCK_END) else {
            return Err(FsError::ExhaustedBlocks);
        };
        self.cache().write(BLOCK_BITMAP_BLOCK, &bits)?;
        self.set_ref_count(block_id as u32, 1)?;

        let mut sb = self.read_super()?;
        sb.free_block_count = sb.free_block_count.saturating_sub(1);
        self.write_super(&sb)?;
        Ok(block_id as u32)
    }

    /// 引用计数感知的释放。
    /// 共享块只递减计数；独占块清计数、清位图位并归还空闲计数。
    /// 对已空闲块调用是无害的空操作。
    pub fn free_block(&mut self, block_id: u32) -> FsResult<()> {
        if block_id as usize >= DATA_BLOCK_END {
            return Err(FsError::Corrupt("block id beyond bitmap span"));
        }
        let count = self.ref_count(block_id)?;
        if count > 1 {
            self.set_ref_count(block_id, count - 1)?;
            return Ok(());
        }

        if count == 1 {
            self.set_ref_count(block_id, 0)?;
        }
        let mut bits = self.cache().read(BLOCK_BITMAP_BLOCK)?;
        if !bitmap::get(&bits, block_id as usize) {
            return Ok(());
        }
        bitmap::clear(&mut bits, block_id as usize);
        self.cache().write(BLOCK_BITMAP_BLOCK, &bits)?;

        let mut sb = self.read_super()?;
        sb.free_block_count += 1;
        self.write_super(&sb)?;
        Ok(())
    }

    pub fn ref_count(&mut self, block_id: u32) -> FsResult<u8> {
        let (table_block, offset) = Self::refcount_pos(block_id)?;
        let counts = self.cache().read(table_block)?;
        Ok(counts[offset])
    }

    pub(crate) fn set_ref_count(&mut self, block_id: u32, count: u8) -> FsResult<()> {
        let (table_block, offset) = Self::refcount_pos(block_id)?;
        let mut counts = self.cache().read(table_block)?;
        counts[offset] = count;
        self.cache().write(table_block, &counts)?;
        Ok(())
    }

    /// 引用计数加一，255 封顶。拒绝对未分配块操作
    pub fn incref(&mut self, block_id: u32) -> FsResult<()> {
        if block_id as usize >= DATA_BLOCK_END {
            return Err(FsError::Corrupt("block id beyond bitmap span"));
        }
        let bits = self.cache().read(BLOCK_BITMAP_BLOCK)?;
        if !bitmap::get(&bits, block_id as usize) {
            return Err(FsError::Corrupt("incref on unallocated block"));
        }
        let count = self.ref_count(block_id)?;
        self.set_ref_count(block_id, count.saturating_add(1))
    }

    /// 引用计数减一，0 封底。拒绝对未分配块操作
    pub fn decref(&mut self, block_id: u32) -> FsResult<()> {
        if block_id as usize >= DATA_BLOCK_END {
            return Err(FsError::Corrupt("block id beyond bitmap span"));
        }
        let bits = self.cache().read(BLOCK_BITMAP_BLOCK)?;
        if !bitmap::get(&bits, block_id as usize) {
            return Err(FsError::Corrupt("decref on unallocated block"));
        }
        let count = self.ref_count(block_id)?;
        self.set_ref_count(block_id, count.saturating_sub(1))
    }

    /// 写前复制。
    /// 独占块原样返回；共享块复制到新块，旧块计数减一，
    /// 新块计数由分配置 1。
    pub fn cow(&mut self, block_id: u32) -> FsResult<u32> {
        if self.ref_count(block_id)? <= 1 {
            return Ok(block_id);
        }
        let new_block = self.alloc_block()?;
        let data = self.cache().read(block_id as usize)?;
        self.cache().write(new_block as usize, &data)?;
        self.decref(block_id)?;
        Ok(new_block)
    }
}
