//! # 快照层
//!
//! 全卷写前复制快照。创建时把两张位图和整个 inode 表复制到
//! 数据区新分配的块里冻结起来，再给当前所有已分配块的引用计数
//! 加一；此后对共享块的写入自然触发写前复制。
//!
//! 本层对快照表和冻结块的读写全部绕过块缓存直接走设备：
//! 冻结内容一旦写下就不再变化，而位图经缓存写穿落盘，
//! 直接读设备同样能看到最新值。
//!
//! 三阶段协议的提交点是把记录的 `active` 置 1 的那次写；
//! 中断的创建只会留下未激活的残缺记录，其槽位之后可复用。

use std::time::{SystemTime, UNIX_EPOCH};

use crate::layout::bitmap;
use crate::{
    Block, FsError, FsResult, SnapFileSystem, SnapshotRecord, SuperBlock, BLOCK_BITMAP_BLOCK,
    BLOCK_SIZE, DATA_BLOCK_END, DATA_BLOCK_START, INODE_BITMAP_BLOCK, INODE_COUNT,
    INODE_TABLE_BLOCKS, INODE_TABLE_START, MAX_SNAPSHOTS, NO_BLOCK, REFCOUNT_TABLE_BLOCKS,
    REFCOUNT_TABLE_START, SNAPSHOT_NAME_MAX_LEN, SNAPSHOT_TABLE_BLOCKS, SNAPSHOT_TABLE_START,
    SUPERBLOCK_BLOCK,
};

/// 对外呈现的快照描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub id: u32,
    pub name: String,
    /// 创建时刻，Unix 秒
    pub timestamp: i64,
}

impl SnapFileSystem {
    /// 创建一个名为 `name` 的快照，返回其 ID（即槽位下标）。
    ///
    /// 三阶段：固化（分配冻结块、复制元数据、写入未激活记录）、
    /// 提升引用计数、激活。固化阶段任何失败都会回滚已分配的冻结块。
    pub fn create_snapshot(&mut self, name: &str) -> FsResult<u32> {
        if name.is_empty() || name.len() > SNAPSHOT_NAME_MAX_LEN {
            return Err(FsError::NameTooLong);
        }
        let table = self.read_snapshot_table()?;

        let mut free_slot = None;
        for slot in 0..MAX_SNAPSHOTS {
            let record = Self::record_at(&table, slot);
            if record.is_active() {
                if record.name() == name {
                    return Err(FsError::SnapshotNameTaken);
                }
            } else if free_slot.is_none() {
                free_slot = Some(slot);
            }
        }
        let Some(slot) = free_slot else {
            return Err(FsError::SnapshotTableFull);
        };

        // 阶段一：固化。冻结块先于复制分配，
        // 这样位图副本把它们自己也记为已占用
        let mut frozen: Vec<u32> = Vec::with_capacity(2 + INODE_TABLE_BLOCKS);
        let result = self.materialize(name, slot, &mut frozen);
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                for &block_id in frozen.iter().rev() {
                    let _ = self.free_block(block_id);
                }
                return Err(e);
            }
        };
        self.store_record(slot, &record)?;

        // 阶段二：当前位图下所有已分配的数据区块引用计数加一
        let block_bits = self.device_read(BLOCK_BITMAP_BLOCK)?;
        self.shift_refcounts(&block_bits, None, 1)?;

        // 阶段三：激活，这次写入是提交点
        let mut record = record;
        record.active = 1;
        self.store_record(slot, &record)?;

        log::info!("created snapshot {:?} in slot {slot}", name);
        Ok(slot as u32)
    }

    /// 把整卷回滚到快照 `id` 冻结时的状态。
    ///
    /// 只换回超级块、两张位图和 inode 表；数据块本身不动，
    /// 靠引用计数一直活到现在。换回之后，凡是当前位图里已分配
    /// 而快照位图里未分配的块（快照之后才写入的）都递减引用。
    pub fn restore_snapshot(&mut self, id: u32) -> FsResult<()> {
        let record = self.active_record(id)?;

        let old_bits = self.device_read(BLOCK_BITMAP_BLOCK)?;

        // 换回冻结的元数据
        let frozen_inode_bits = self.device_read(self.frozen_block(record.inode_bitmap_block)?)?;
        self.device_write(INODE_BITMAP_BLOCK, &frozen_inode_bits)?;

        let snap_bits = self.device_read(self.frozen_block(record.block_bitmap_block)?)?;
        self.device_write(BLOCK_BITMAP_BLOCK, &snap_bits)?;

        for (offset, &frozen_id) in record.inode_table_blocks.iter().enumerate() {
            let data = self.device_read(self.frozen_block(frozen_id)?)?;
            self.device_write(INODE_TABLE_START + offset, &data)?;
        }

        let mut super_block: Block = [0; BLOCK_SIZE];
        super_block[..SuperBlock::SIZE].copy_from_slice(record.super_block.as_bytes());
        self.device_write(SUPERBLOCK_BLOCK, &super_block)?;

        // 快照之后写入的块失去了活文件系统这一引用
        self.shift_refcounts(&old_bits, Some(&snap_bits), -1)?;

        self.clear_cache();
        log::info!("restored snapshot {} ({:?})", id, record.name());
        Ok(())
    }

    /// 删除快照 `id`。先把记录标记为未激活（提交点），
    /// 再按冻结位图逐块做引用计数感知的释放，最后归还冻结块本身。
    pub fn delete_snapshot(&mut self, id: u32) -> FsResult<()> {
        let mut record = self.active_record(id)?;

        record.active = 0;
        self.store_record(id as usize, &record)?;

        let snap_bits = self.device_read(self.frozen_block(record.block_bitmap_block)?)?;
        for block_id in DATA_BLOCK_START..DATA_BLOCK_END {
            if bitmap::get(&snap_bits, block_id) {
                self.free_block(block_id as u32)?;
            }
        }

        let inode_bitmap_copy = self.frozen_block(record.inode_bitmap_block)?;
        let block_bitmap_copy = self.frozen_block(record.block_bitmap_block)?;
        self.free_block(inode_bitmap_copy as u32)?;
        self.free_block(block_bitmap_copy as u32)?;
        for &frozen_id in record.inode_table_blocks.iter() {
            let copy = self.frozen_block(frozen_id)?;
            self.free_block(copy as u32)?;
        }

        log::info!("deleted snapshot {} ({:?})", id, record.name());
        Ok(())
    }

    /// 所有激活的快照记录，按 ID 升序
    pub fn list_snapshots(&mut self) -> FsResult<Vec<SnapshotRecord>> {
        let table = self.read_snapshot_table()?;
        Ok((0..MAX_SNAPSHOTS)
            .map(|slot| Self::record_at(&table, slot))
            .filter(SnapshotRecord::is_active)
            .collect())
    }

    /// 按名字找激活的快照
    pub fn find_snapshot(&mut self, name: &str) -> FsResult<u32> {
        self.list_snapshots()?
            .iter()
            .find(|record| record.name() == name)
            .map(|record| record.id)
            .ok_or(FsError::SnapshotNotFound)
    }

    fn materialize(
        &mut self,
        name: &str,
        slot: usize,
        frozen: &mut Vec<u32>,
    ) -> FsResult<SnapshotRecord> {
        let inode_bitmap_copy = self.alloc_block()?;
        frozen.push(inode_bitmap_copy);
        let block_bitmap_copy = self.alloc_block()?;
        frozen.push(block_bitmap_copy);
        let mut table_copies = [NO_BLOCK; INODE_TABLE_BLOCKS];
        for copy in table_copies.iter_mut() {
            let block_id = self.alloc_block()?;
            frozen.push(block_id);
            *copy = block_id as i32;
        }

        // 分配齐全之后再复制，位图副本因此包含冻结块自身
        let data = self.device_read(INODE_BITMAP_BLOCK)?;
        self.device_write(inode_bitmap_copy as usize, &data)?;
        let data = self.device_read(BLOCK_BITMAP_BLOCK)?;
        self.device_write(block_bitmap_copy as usize, &data)?;
        for (offset, &copy) in table_copies.iter().enumerate() {
            let data = self.device_read(INODE_TABLE_START + offset)?;
            self.device_write(copy as usize, &data)?;
        }

        let sb = self.read_super()?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let mut record = SnapshotRecord::new(slot as u32, name, timestamp);
        record.used_inodes = INODE_COUNT as u32 - sb.free_inode_count;
        record.used_blocks = (DATA_BLOCK_END - DATA_BLOCK_START) as u32 - sb.free_block_count;
        record.super_block = sb;
        record.inode_bitmap_block = inode_bitmap_copy as i32;
        record.block_bitmap_block = block_bitmap_copy as i32;
        record.inode_table_blocks = table_copies;
        Ok(record)
    }

    /// 给 `bits` 中已分配的数据区块整体调整引用计数。
    /// 给出 `except` 时，其中也已分配的块不动。
    /// 按计数表块分批读改写，饱和于 0 和 255。
    fn shift_refcounts(
        &mut self,
        bits: &Block,
        except: Option<&Block>,
        delta: i8,
    ) -> FsResult<()> {
        for table_index in 0..REFCOUNT_TABLE_BLOCKS {
            if table_index * BLOCK_SIZE >= DATA_BLOCK_END {
                break;
            }
            let table_block = REFCOUNT_TABLE_START + table_index;
            let mut counts = self.cache().read(table_block)?;
            let mut changed = false;
            for byte_index in 0..BLOCK_SIZE {
                let block_id = table_index * BLOCK_SIZE + byte_index;
                if block_id < DATA_BLOCK_START || block_id >= DATA_BLOCK_END {
                    continue;
                }
                if !bitmap::get(bits, block_id) {
                    continue;
                }
                if except.is_some_and(|e| bitmap::get(e, block_id)) {
                    continue;
                }
                counts[byte_index] = if delta > 0 {
                    counts[byte_index].saturating_add(1)
                } else {
                    counts[byte_index].saturating_sub(1)
                };
                changed = true;
            }
            if changed {
                self.cache().write(table_block, &counts)?;
            }
        }
        Ok(())
    }

    fn active_record(&mut self, id: u32) -> FsResult<SnapshotRecord> {
        if id as usize >= MAX_SNAPSHOTS {
            return Err(FsError::SnapshotNotFound);
        }
        let table = self.read_snapshot_table()?;
        let record = Self::record_at(&table, id as usize);
        if !record.is_active() {
            return Err(FsError::SnapshotNotFound);
        }
        Ok(record)
    }

    /// 冻结块ID的健全性检查：必须落在可分配的数据区内
    fn frozen_block(&self, block_id: i32) -> FsResult<usize> {
        let block_id = block_id as usize;
        if (DATA_BLOCK_START..DATA_BLOCK_END).contains(&block_id) {
            Ok(block_id)
        } else {
            Err(FsError::Corrupt("frozen metadata block out of range"))
        }
    }

    /// 快照表的完整字节映像，直接读设备
    fn read_snapshot_table(&mut self) -> FsResult<Vec<u8>> {
        let mut table = Vec::with_capacity(SNAPSHOT_TABLE_BLOCKS * BLOCK_SIZE);
        for offset in 0..SNAPSHOT_TABLE_BLOCKS {
            table.extend_from_slice(&self.device_read(SNAPSHOT_TABLE_START + offset)?);
        }
        Ok(table)
    }

    fn record_at(table: &[u8], slot: usize) -> SnapshotRecord {
        let start = slot * SnapshotRecord::SIZE;
        SnapshotRecord::load(&table[start..])
    }

    /// 写回一个记录槽位，只触碰它覆盖到的表块
    fn store_record(&mut self, slot: usize, record: &SnapshotRecord) -> FsResult<()> {
        let start = slot * SnapshotRecord::SIZE;
        let end = start + SnapshotRecord::SIZE;

        let first_block = start / BLOCK_SIZE;
        let last_block = (end - 1) / BLOCK_SIZE;
        for table_index in first_block..=last_block {
            let mut block = self.device_read(SNAPSHOT_TABLE_START + table_index)?;
            let block_start = table_index * BLOCK_SIZE;
            // 记录与该表块字节范围的交集
            let lo = start.max(block_start);
            let hi = end.min(block_start + BLOCK_SIZE);
            block[lo - block_start..hi - block_start]
                .copy_from_slice(&record.as_bytes()[lo - start..hi - start]);
            self.device_write(SNAPSHOT_TABLE_START + table_index, &block)?;
        }
        Ok(())
    }
}
