//! # 索引节点层
//!
//! inode 表项的读写，以及在一个 inode 的块映射上做按字节粒度的
//! 数据读写。写路径负责三件事：按需增长块映射（直接索引用尽后
//! 建立一级间接索引）、对共享块执行写前复制、以及非整块写入的
//! 读改写。
//!
//! inode 记录的所有权是瞬时的：每个操作读出记录、修改本地副本、
//! 再整体写回，从不长期持有指向 inode 表的引用。

use crate::layout::{indirect_from, indirect_to, IndirectBlock};
use crate::{
    Block, DiskInode, FsError, FsResult, SnapFileSystem, BLOCK_SIZE, DIRECT_COUNT,
    MAX_FILE_BLOCKS, MAX_FILE_SIZE, NO_BLOCK, POINTERS_PER_BLOCK,
};

impl SnapFileSystem {
    pub fn read_inode(&mut self, inode_id: u32) -> FsResult<DiskInode> {
        let (block_id, offset) = Self::inode_pos(inode_id)?;
        let block = self.cache().read(block_id)?;
        Ok(DiskInode::load(&block[offset..]))
    }

    pub fn write_inode(&mut self, inode_id: u32, inode: &DiskInode) -> FsResult<()> {
        let (block_id, offset) = Self::inode_pos(inode_id)?;
        let mut block = self.cache().read(block_id)?;
        block[offset..offset + DiskInode::SIZE].copy_from_slice(inode.as_bytes());
        self.cache().write(block_id, &block)?;
        Ok(())
    }

    /// 向 inode 的数据写入 `data`，起点为文件内偏移 `offset`。
    ///
    /// 返回实际写入的字节数；写前复制失败时写回 inode 并返回已写入
    /// 的部分而非错误，调用方可以带着尾部重试。扩展映射时的分配失败
    /// 会回滚本次调用挂接的所有块后报错。
    pub fn write_data(
        &mut self,
        inode: &mut DiskInode,
        inode_id: u32,
        data: &[u8],
        offset: usize,
    ) -> FsResult<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let end = offset + data.len();
        if end > MAX_FILE_SIZE {
            return Err(FsError::FileTooLarge);
        }

        self.extend_to(inode, DiskInode::blocks_for_size(end))?;

        let mut written = 0;
        let mut position = offset;
        while written < data.len() {
            let block_index = position / BLOCK_SIZE;
            let in_block = position % BLOCK_SIZE;
            let chunk = (data.len() - written).min(BLOCK_SIZE - in_block);

            let mut block_id = self.block_at(inode, block_index)?;

            // 快照共享的块先复制再写
            if self.ref_count(block_id)? > 1 {
                match self.cow(block_id) {
                    Ok(new_block) => {
                        if new_block != block_id {
                            self.set_block_at(inode, block_index, new_block)?;
                            block_id = new_block;
                        }
                    }
                    Err(_) => {
                        return self.finish_write(inode, inode_id, offset, written);
                    }
                }
            }

            if in_block == 0 && chunk == BLOCK_SIZE {
                let mut block: Block = [0; BLOCK_SIZE];
                block.copy_from_slice(&data[written..written + BLOCK_SIZE]);
                self.cache().write(block_id as usize, &block)?;
            } else {
                // 非整块写入先读出原内容
                let mut block = self.cache().read(block_id as usize)?;
                block[in_block..in_block + chunk].copy_from_slice(&data[written..written + chunk]);
                self.cache().write(block_id as usize, &block)?;
            }

            written += chunk;
            position += chunk;
        }

        self.finish_write(inode, inode_id, offset, written)
    }

    /// 收尾：按实际写入量更新大小并把 inode 落盘，
    /// 随后冲刷缓存，让拿到新 inode 的读者不会撞到陈旧缓存
    fn finish_write(
        &mut self,
        inode: &mut DiskInode,
        inode_id: u32,
        offset: usize,
        written: usize,
    ) -> FsResult<usize> {
        let end = offset + written;
        if end > inode.size as usize {
            inode.size = end as u32;
        }
        self.write_inode(inode_id, inode)?;
        self.cache().flush()?;
        Ok(written)
    }

    /// 从 inode 的数据读出至多 `buf.len()` 字节，返回实际读到的字节数。
    /// 超出文件末尾的部分被裁掉，完全越界的读返回 0。
    pub fn read_data(
        &mut self,
        inode: &DiskInode,
        buf: &mut [u8],
        offset: usize,
    ) -> FsResult<usize> {
        let size = inode.size as usize;
        if buf.is_empty() || offset >= size {
            return Ok(0);
        }
        let end = (offset + buf.len()).min(size);

        let mut read = 0;
        let mut position = offset;
        while position < end {
            let block_index = position / BLOCK_SIZE;
            if block_index >= inode.block_count as usize {
                break;
            }
            let in_block = position % BLOCK_SIZE;
            let chunk = (end - position).min(BLOCK_SIZE - in_block);

            let block_id = self.block_at(inode, block_index)?;
            let block = self.cache().read(block_id as usize)?;
            buf[read..read + chunk].copy_from_slice(&block[in_block..in_block + chunk]);

            read += chunk;
            position += chunk;
        }
        Ok(read)
    }

    /// 释放 inode 持有的全部数据块和间接索引块，重置块映射。
    /// 对每个指针先递减引用，归零后才真正归还给位图。
    pub fn free_inode_blocks(&mut self, inode: &mut DiskInode) -> FsResult<()> {
        let block_count = inode.block_count as usize;

        for index in 0..block_count.min(DIRECT_COUNT) {
            let block_id = inode.direct[index];
            if block_id != NO_BLOCK {
                self.release_block(block_id as u32)?;
            }
        }

        if inode.indirect != NO_BLOCK {
            let table = indirect_from(&self.cache().read(inode.indirect as usize)?);
            let indirect_count = block_count.saturating_sub(DIRECT_COUNT);
            for &block_id in table.iter().take(indirect_count) {
                if block_id != NO_BLOCK {
                    self.release_block(block_id as u32)?;
                }
            }
            self.release_block(inode.indirect as u32)?;
        }

        inode.direct = [NO_BLOCK; DIRECT_COUNT];
        inode.indirect = NO_BLOCK;
        inode.block_count = 0;
        inode.size = 0;
        Ok(())
    }

    fn release_block(&mut self, block_id: u32) -> FsResult<()> {
        self.decref(block_id)?;
        if self.ref_count(block_id)? == 0 {
            self.free_block(block_id)?;
        }
        Ok(())
    }

    /// 把块映射增长到至少 `blocks_needed` 个数据块，
    /// 新块逐个分配并清零。任何一步分配失败都会回滚
    /// 本次调用挂接的所有块。
    fn extend_to(&mut self, inode: &mut DiskInode, blocks_needed: usize) -> FsResult<()> {
        if blocks_needed > MAX_FILE_BLOCKS {
            return Err(FsError::FileTooLarge);
        }

        let original_count = inode.block_count as usize;
        let original_indirect = inode.indirect;
        let mut new_blocks: Vec<u32> = Vec::new();

        let result = self.try_extend(inode, blocks_needed, &mut new_blocks);
        if result.is_err() {
            // 回滚：释放新分配的数据块，还原映射
            for &block_id in new_blocks.iter().rev() {
                let _ = self.free_block(block_id);
            }
            for index in original_count..(inode.block_count as usize).min(DIRECT_COUNT) {
                inode.direct[index] = NO_BLOCK;
            }
            if inode.indirect != original_indirect {
                if original_indirect == NO_BLOCK {
                    // 本次调用才建立的间接索引块
                    let _ = self.free_block(inode.indirect as u32);
                } else {
                    // 写前复制换出过共享的间接索引块，退回原块
                    let _ = self.free_block(inode.indirect as u32);
                    let _ = self.incref(original_indirect as u32);
                }
                inode.indirect = original_indirect;
            }
            inode.block_count = original_count as u32;
        }
        result
    }

    fn try_extend(
        &mut self,
        inode: &mut DiskInode,
        blocks_needed: usize,
        new_blocks: &mut Vec<u32>,
    ) -> FsResult<()> {
        let zero: Block = [0; BLOCK_SIZE];

        while (inode.block_count as usize) < blocks_needed {
            let block_id = self.alloc_block()?;
            new_blocks.push(block_id);
            self.cache().write(block_id as usize, &zero)?;

            let index = inode.block_count as usize;
            if index < DIRECT_COUNT {
                inode.direct[index] = block_id as i32;
            } else {
                if inode.indirect == NO_BLOCK {
                    // 首次越过直接索引，建立间接索引块
                    let indirect_id = self.alloc_block()?;
                    let table = [NO_BLOCK; POINTERS_PER_BLOCK];
                    self.cache()
                        .write(indirect_id as usize, &indirect_to(&table))?;
                    inode.indirect = indirect_id as i32;
                }
                let mut table = indirect_from(&self.cache().read(inode.indirect as usize)?);
                table[index - DIRECT_COUNT] = block_id as i32;
                self.write_indirect(inode, &table)?;
            }
            inode.block_count += 1;
        }
        Ok(())
    }

    /// 逻辑块号到物理块ID
    pub(crate) fn block_at(&mut self, inode: &DiskInode, block_index: usize) -> FsResult<u32> {
        let block_id = if block_index < DIRECT_COUNT {
            inode.direct[block_index]
        } else {
            if inode.indirect == NO_BLOCK {
                return Err(FsError::Corrupt("missing indirect block"));
            }
            let table = indirect_from(&self.cache().read(inode.indirect as usize)?);
            table[block_index - DIRECT_COUNT]
        };
        if block_id == NO_BLOCK {
            return Err(FsError::Corrupt("hole in block map"));
        }
        Ok(block_id as u32)
    }

    /// 更新映射中一个槽位（写前复制换块后调用）
    fn set_block_at(
        &mut self,
        inode: &mut DiskInode,
        block_index: usize,
        block_id: u32,
    ) -> FsResult<()> {
        if block_index < DIRECT_COUNT {
            inode.direct[block_index] = block_id as i32;
            return Ok(());
        }
        if inode.indirect == NO_BLOCK {
            return Err(FsError::Corrupt("missing indirect block"));
        }
        let mut table = indirect_from(&self.cache().read(inode.indirect as usize)?);
        table[block_index - DIRECT_COUNT] = block_id as i32;
        self.write_indirect(inode, &table)
    }

    /// 写回间接索引表。
    /// 间接索引块本身也可能被快照共享，写前同样要复制，
    /// 否则恢复快照后旧 inode 会经由被改写的表读到新数据。
    fn write_indirect(&mut self, inode: &mut DiskInode, table: &IndirectBlock) -> FsResult<()> {
        let current = inode.indirect as u32;
        let target = self.cow(current)?;
        if target != current {
            inode.indirect = target as i32;
        }
        self.cache().write(target as usize, &indirect_to(table))?;
        Ok(())
    }
}
