//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备；[`BlockDevice`] 就是对
//! 读写块设备的抽象，实现了此特质的类型称为**块设备驱动**。
//!
//! 读写都是定位式的：按块ID寻址，互不共享文件偏移，
//! 因此多个线程可以并发地访问同一设备。

use std::io;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync {
    /// 读取一个完整的块到 `buf`。
    /// 设备末尾之外的字节补零，而不是报错。
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> io::Result<()>;

    /// 将 `buf` 完整写入一个块
    fn write_block(&self, block_id: usize, buf: &[u8]) -> io::Result<()>;
}
