//! 宿主侧适配：用一个普通文件充当块设备。


use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;

use block_dev::BlockDevice;
use snap_fs::BLOCK_SIZE;

/// backing file 上的块设备驱动。
///
/// 读写都走定位式 I/O（`read_at`/`write_at`），不共享文件偏移，
/// 因此多线程并发访问互不干扰。镜像末尾之外的短读补零。
pub struct BlockFile(pub File);

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> io::Result<()> {
        let offset = (block_id * BLOCK_SIZE) as u64;
        let mut read = 0;
        while read < buf.len() {
            match self.0.read_at(&mut buf[read..], offset + read as u64) {
                // 镜像比逻辑卷短，剩余部分按全零对待
                Ok(0) => {
                    buf[read..].fill(0);
                    break;
                }
                Ok(n) => read += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> io::Result<()> {
        let offset = (block_id * BLOCK_SIZE) as u64;
        self.0.write_all_at(buf, offset)
    }
}
