//! # 块缓存层
//!
//! 固定容量的 LRU 缓存，按块ID检索，承接快照层之外所有对设备的读写。
//! 队首是最近使用的块，淘汰发生在队尾。
//!
//! 写入采用**写穿**策略：先落盘，再更新缓存，
//! 因此任何成功写入之后，设备与缓存中对应块的内容一致；
//! 绕过缓存直接读设备（快照层就是这样做的）也能看到最新数据。
//! 脏标记保留给未来的回写模式，当前路径不依赖它。

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex};

use block_dev::BlockDevice;

use crate::{Block, BLOCK_SIZE};

struct CacheEntry {
    block_id: usize,
    data: Block,
    dirty: bool,
}

struct CacheState {
    /// 队首为最近使用
    queue: VecDeque<CacheEntry>,
    hits: u64,
    misses: u64,
    replacements: u64,
}

/// 缓存统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub capacity: usize,
    pub replacements: u64,
}

pub struct BlockCache {
    device: Arc<dyn BlockDevice>,
    /// 容量为 0 表示禁用缓存，所有调用直通设备
    capacity: usize,
    state: Mutex<CacheState>,
}

impl BlockCache {
    pub fn new(device: Arc<dyn BlockDevice>, capacity: usize) -> Self {
        if capacity > 0 {
            log::debug!("block cache enabled, capacity={capacity} blocks");
        }
        Self {
            device,
            capacity,
            state: Mutex::new(CacheState {
                queue: VecDeque::new(),
                hits: 0,
                misses: 0,
                replacements: 0,
            }),
        }
    }

    /// 读取一个块。
    /// 命中时将条目提到队首并返回其数据副本；
    /// 未命中时按需淘汰队尾，从设备读入后插入队首。
    pub fn read(&self, block_id: usize) -> io::Result<Block> {
        if self.capacity == 0 {
            let mut buf = [0u8; BLOCK_SIZE];
            self.device.read_block(block_id, &mut buf)?;
            return Ok(buf);
        }

        let mut state = self.state.lock().unwrap();

        if let Some(index) = state.queue.iter().position(|e| e.block_id == block_id) {
            state.hits += 1;
            let entry = state.queue.remove(index).unwrap();
            let data = entry.data;
            state.queue.push_front(entry);
            return Ok(data);
        }

        state.misses += 1;
        if state.queue.len() >= self.capacity {
            self.evict_lru(&mut state)?;
        }

        let mut data = [0u8; BLOCK_SIZE];
        self.device.read_block(block_id, &mut data)?;
        state.queue.push_front(CacheEntry {
            block_id,
            data,
            dirty: false,
        });
        Ok(data)
    }

    /// 写穿：先写设备，再更新或插入缓存条目（干净状态）
    pub fn write(&self, block_id: usize, buf: &Block) -> io::Result<()> {
        if self.capacity == 0 {
            return self.device.write_block(block_id, buf);
        }

        let mut state = self.state.lock().unwrap();
        self.device.write_block(block_id, buf)?;

        if let Some(index) = state.queue.iter().position(|e| e.block_id == block_id) {
            state.hits += 1;
            let mut entry = state.queue.remove(index).unwrap();
            entry.data.copy_from_slice(buf);
            entry.dirty = false;
            state.queue.push_front(entry);
            return Ok(());
        }

        state.misses += 1;
        if state.queue.len() >= self.capacity {
            self.evict_lru(&mut state)?;
        }
        state.queue.push_front(CacheEntry {
            block_id,
            data: *buf,
            dirty: false,
        });
        Ok(())
    }

    /// 丢弃某个块的缓存条目，从不触发写
    pub fn invalidate(&self, block_id: usize) {
        if self.capacity == 0 {
            return;
        }
        let mut state = self.state.lock().unwrap();
        if let Some(index) = state.queue.iter().position(|e| e.block_id == block_id) {
            state.queue.remove(index);
        }
    }

    /// 写回所有脏块。写穿模式下没有脏块，保留此接口是为了完整性
    pub fn flush(&self) -> io::Result<()> {
        if self.capacity == 0 {
            return Ok(());
        }
        let mut state = self.state.lock().unwrap();
        for entry in state.queue.iter_mut().filter(|e| e.dirty) {
            self.device.write_block(entry.block_id, &entry.data)?;
            entry.dirty = false;
        }
        Ok(())
    }

    /// 丢弃全部条目
    pub fn clear(&self) {
        if self.capacity == 0 {
            return;
        }
        self.state.lock().unwrap().queue.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock().unwrap();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            size: state.queue.len(),
            capacity: self.capacity,
            replacements: state.replacements,
        }
    }

    fn evict_lru(&self, state: &mut CacheState) -> io::Result<()> {
        let Some(lru) = state.queue.pop_back() else {
            return Ok(());
        };
        if lru.dirty {
            self.device.write_block(lru.block_id, &lru.data)?;
        }
        state.replacements += 1;
        Ok(())
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.hits + self.misses;
        let hit_rate = if total > 0 {
            100.0 * self.hits as f64 / total as f64
        } else {
            0.0
        };
        write!(
            f,
            "hits={} misses={} hit_rate={:.2}% size={}/{} replacements={}",
            self.hits, self.misses, hit_rate, self.size, self.capacity, self.replacements
        )
    }
}
