//! 测试共用的内存块设备：按需增长，读到未写过的区域补零

use std::io;
use std::sync::{Arc, Mutex};

use block_dev::BlockDevice;
use snap_fs::BLOCK_SIZE;

pub struct MemDisk(Mutex<Vec<u8>>);

impl MemDisk {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(Vec::new())))
    }
}

impl BlockDevice for MemDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> io::Result<()> {
        let data = self.0.lock().unwrap();
        let start = block_id * BLOCK_SIZE;
        for (offset, byte) in buf.iter_mut().enumerate() {
            *byte = data.get(start + offset).copied().unwrap_or(0);
        }
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> io::Result<()> {
        let mut data = self.0.lock().unwrap();
        let end = block_id * BLOCK_SIZE + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[block_id * BLOCK_SIZE..end].copy_from_slice(buf);
        Ok(())
    }
}
