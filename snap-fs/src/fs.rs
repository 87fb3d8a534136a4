//! # 磁盘管理器层
//!
//! 构建磁盘布局并维护它的一致性：
//! 格式化新卷、打开时识别不兼容布局并重新格式化、
//! 以及打开时的一致性扫描（校正计数漂移和引用计数矛盾）。

use std::sync::Arc;

use block_dev::BlockDevice;

use crate::layout::bitmap;
use crate::{
    Block, BlockCache, DiskInode, FsError, FsResult, InodeKind, SuperBlock,
    BLOCK_BITMAP_BLOCK, BLOCK_COUNT, BLOCK_SIZE, DATA_BLOCK_END, DATA_BLOCK_START,
    INODE_BITMAP_BLOCK, INODE_COUNT, INODE_SIZE, INODE_TABLE_BLOCKS, INODE_TABLE_START,
    REFCOUNT_TABLE_START, ROOT_INODE, SNAPSHOT_TABLE_BLOCKS, SNAPSHOT_TABLE_START,
    SUPERBLOCK_BLOCK,
};

/// 打开时允许的空闲计数漂移；超过才校正
const FSCK_DRIFT_TOLERANCE: u32 = 5;

/// 存储引擎本体。
///
/// 引擎自身不含任何全局状态；所有持久状态都在设备上，
/// 所有易失状态都在块缓存里。调用方（见 [`crate::SnapFs`]）
/// 用一把粗粒度互斥锁串行化全部操作。
pub struct SnapFileSystem {
    device: Arc<dyn BlockDevice>,
    cache: BlockCache,
}

impl SnapFileSystem {
    /// 打开一个卷：空白或布局不兼容的镜像会被重新格式化（破坏性），
    /// 兼容的镜像则做一次一致性扫描后投入使用
    pub fn open(device: Arc<dyn BlockDevice>, cache_capacity: usize) -> FsResult<Self> {
        let mut fs = Self {
            cache: BlockCache::new(device.clone(), cache_capacity),
            device,
        };

        let sb = fs.read_super()?;
        if !sb.is_valid() {
            log::warn!("incompatible or blank volume, reformatting");
            fs.format_volume()?;
        } else {
            fs.fsck()?;
        }
        Ok(fs)
    }

    /// 无条件格式化一个新卷
    pub fn format(device: Arc<dyn BlockDevice>, cache_capacity: usize) -> FsResult<Self> {
        let mut fs = Self {
            cache: BlockCache::new(device.clone(), cache_capacity),
            device,
        };
        fs.format_volume()?;
        Ok(fs)
    }

    fn format_volume(&mut self) -> FsResult<()> {
        self.cache.clear();

        let zero: Block = [0; BLOCK_SIZE];

        // inode 位图：inode 0 预留给根目录
        let mut bits = zero;
        bitmap::set(&mut bits, ROOT_INODE as usize);
        self.cache.write(INODE_BITMAP_BLOCK, &bits)?;

        // 块位图：数据区之前的块全部标记为占用
        let mut bits = zero;
        for block_id in 0..DATA_BLOCK_START {
            bitmap::set(&mut bits, block_id);
        }
        self.cache.write(BLOCK_BITMAP_BLOCK, &bits)?;

        // inode 表与快照表清零
        for offset in 0..INODE_TABLE_BLOCKS {
            self.cache.write(INODE_TABLE_START + offset, &zero)?;
        }
        for offset in 0..SNAPSHOT_TABLE_BLOCKS {
            self.cache.write(SNAPSHOT_TABLE_START + offset, &zero)?;
        }

        // 引用计数表：元数据块计 1，数据区全 0
        let mut counts = zero;
        counts[..DATA_BLOCK_START].fill(1);
        self.cache.write(REFCOUNT_TABLE_START, &counts)?;
        for offset in 1..crate::REFCOUNT_TABLE_BLOCKS {
            self.cache.write(REFCOUNT_TABLE_START + offset, &zero)?;
        }

        self.write_super(&SuperBlock::fresh())?;

        // 根目录
        let mut root = DiskInode::default();
        root.init(InodeKind::Directory);
        self.write_inode(ROOT_INODE, &root)?;

        log::info!(
            "formatted volume: {} blocks of {} bytes, {} inodes",
            BLOCK_COUNT,
            BLOCK_SIZE,
            INODE_COUNT
        );
        Ok(())
    }

    /// 打开时的一致性扫描。
    ///
    /// 超级块计数与位图不符时，漂移在容忍范围内就保留，
    /// 超过则静默改写为位图的真值；
    /// 数据区每一块的「位图位 ⇔ 引用计数」矛盾被就地修复。
    fn fsck(&mut self) -> FsResult<()> {
        let inode_bits = self.cache.read(INODE_BITMAP_BLOCK)?;
        let block_bits = self.cache.read(BLOCK_BITMAP_BLOCK)?;

        let free_inodes = bitmap::count_zeros(&inode_bits, 0..INODE_COUNT) as u32;
        let free_blocks = bitmap::count_zeros(&block_bits, DATA_BLOCK_START..DATA_BLOCK_END) as u32;

        let mut sb = self.read_super()?;
        let mut patched = false;
        if sb.free_inode_count.abs_diff(free_inodes) > FSCK_DRIFT_TOLERANCE {
            log::warn!(
                "free inode count drifted: recorded {}, bitmap says {free_inodes}",
                sb.free_inode_count
            );
            sb.free_inode_count = free_inodes;
            patched = true;
        }
        if sb.free_block_count.abs_diff(free_blocks) > FSCK_DRIFT_TOLERANCE {
            log::warn!(
                "free block count drifted: recorded {}, bitmap says {free_blocks}",
                sb.free_block_count
            );
            sb.free_block_count = free_blocks;
            patched = true;
        }
        if patched {
            self.write_super(&sb)?;
        }

        // 引用计数修复：已分配却计 0 的块补成 1，空闲却非 0 的块清零。
        // 已分配且计数大于 1 的块可能被快照共享，不动它。
        let mut repaired = 0usize;
        for table_index in 0..crate::REFCOUNT_TABLE_BLOCKS {
            if table_index * BLOCK_SIZE >= DATA_BLOCK_END {
                break;
            }
            let table_block = REFCOUNT_TABLE_START + table_index;
            let mut counts = self.cache.read(table_block)?;
            let mut changed = false;
            for byte_index in 0..BLOCK_SIZE {
                let block_id = table_index * BLOCK_SIZE + byte_index;
                if block_id < DATA_BLOCK_START || block_id >= DATA_BLOCK_END {
                    continue;
                }
                let allocated = bitmap::get(&block_bits, block_id);
                let count = counts[byte_index];
                if allocated && count == 0 {
                    counts[byte_index] = 1;
                    changed = true;
                    repaired += 1;
                } else if !allocated && count != 0 {
                    counts[byte_index] = 0;
                    changed = true;
                    repaired += 1;
                }
            }
            if changed {
                self.cache.write(table_block, &counts)?;
            }
        }
        if repaired > 0 {
            log::warn!("fsck repaired {repaired} inconsistent block refcounts");
        }
        Ok(())
    }

    /// 当前超级块的副本，供工具和测试观察空闲计数
    pub fn super_block(&mut self) -> FsResult<SuperBlock> {
        self.read_super()
    }

    pub(crate) fn read_super(&mut self) -> FsResult<SuperBlock> {
        let block = self.cache.read(SUPERBLOCK_BLOCK)?;
        Ok(SuperBlock::load(&block))
    }

    /// 超级块写回是每次分配/释放的提交点，位图必须先于它落盘
    pub(crate) fn write_super(&mut self, sb: &SuperBlock) -> FsResult<()> {
        let mut block: Block = [0; BLOCK_SIZE];
        block[..SuperBlock::SIZE].copy_from_slice(sb.as_bytes());
        self.cache.write(SUPERBLOCK_BLOCK, &block)?;
        Ok(())
    }

    /// inode 在表中的位置：块ID与块内字节偏移
    pub(crate) fn inode_pos(inode_id: u32) -> FsResult<(usize, usize)> {
        let inode_id = inode_id as usize;
        if inode_id >= INODE_COUNT {
            return Err(FsError::Corrupt("inode id out of range"));
        }
        let block_id = INODE_TABLE_START + inode_id / crate::INODES_PER_BLOCK;
        let offset = inode_id % crate::INODES_PER_BLOCK * INODE_SIZE;
        Ok((block_id, offset))
    }

    /// 块的引用计数字节在计数表中的位置
    pub(crate) fn refcount_pos(block_id: u32) -> FsResult<(usize, usize)> {
        let block_id = block_id as usize;
        if block_id >= BLOCK_COUNT {
            return Err(FsError::Corrupt("block id out of range"));
        }
        Ok((REFCOUNT_TABLE_START + block_id / BLOCK_SIZE, block_id % BLOCK_SIZE))
    }

    pub(crate) fn cache(&self) -> &BlockCache {
        &self.cache
    }

    /// 绕过缓存直接读设备，快照层专用
    pub(crate) fn device_read(&self, block_id: usize) -> FsResult<Block> {
        let mut buf = [0u8; BLOCK_SIZE];
        self.device.read_block(block_id, &mut buf)?;
        Ok(buf)
    }

    /// 绕过缓存直接写设备，快照层专用。
    /// 为保持缓存一致性，同时作废对应的缓存条目。
    pub(crate) fn device_write(&self, block_id: usize, buf: &Block) -> FsResult<()> {
        self.device.write_block(block_id, buf)?;
        self.cache.invalidate(block_id);
        Ok(())
    }

    pub fn cache_stats(&self) -> crate::CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
