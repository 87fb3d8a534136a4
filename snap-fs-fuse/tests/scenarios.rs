//! 对着真实镜像文件跑的端到端场景：跨进程生命周期的持久性、
//! 快照回滚、缓存统计。

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use snap_fs::{FsError, SnapFs, BLOCK_SIZE, DISK_SIZE};
use snap_fs_fuse::BlockFile;

struct TempImage(PathBuf);

impl TempImage {
    fn new(tag: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "snapfs-e2e-{tag}-{}.img",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        Self(path)
    }

    fn device(&self) -> Arc<BlockFile> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.0)
            .unwrap();
        file.set_len(DISK_SIZE as u64).unwrap();
        Arc::new(BlockFile(file))
    }
}

impl Drop for TempImage {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

#[test]
fn volume_survives_reopen() {
    let image = TempImage::new("reopen");

    {
        let fs = SnapFs::open(image.device(), 128).unwrap();
        fs.write_file("/papers/draft.txt", b"revision 1").unwrap();
        fs.create_directory("/archive").unwrap();
    }

    // 新的打开会走一致性扫描，而不是重新格式化
    let fs = SnapFs::open(image.device(), 128).unwrap();
    assert_eq!(fs.read_file("/papers/draft.txt").unwrap(), b"revision 1");
    assert!(fs.exists("/archive"));
}

#[test]
fn snapshot_rollback_on_disk() {
    let image = TempImage::new("rollback");

    {
        let fs = SnapFs::open(image.device(), 128).unwrap();
        fs.write_file("/state", b"before").unwrap();
        fs.create_snapshot("", "checkpoint").unwrap();
        fs.write_file("/state", b"after").unwrap();
        fs.write_file("/junk", &vec![0xAB; 4 * BLOCK_SIZE]).unwrap();
    }

    let fs = SnapFs::open(image.device(), 128).unwrap();
    assert_eq!(fs.read_file("/state").unwrap(), b"after");
    assert_eq!(fs.list_snapshots("").unwrap(), ["checkpoint"]);

    fs.restore_snapshot("checkpoint").unwrap();
    assert_eq!(fs.read_file("/state").unwrap(), b"before");
    assert!(matches!(fs.read_file("/junk"), Err(FsError::NotFound)));
}

#[test]
fn indirect_files_round_trip_through_disk() {
    let image = TempImage::new("indirect");
    let payload: Vec<u8> = (0..40 * BLOCK_SIZE).map(|i| (i * 7 % 256) as u8).collect();

    {
        let fs = SnapFs::open(image.device(), 128).unwrap();
        fs.write_file("/bulk.bin", &payload).unwrap();
    }

    let fs = SnapFs::open(image.device(), 128).unwrap();
    assert_eq!(fs.read_file("/bulk.bin").unwrap(), payload);
    assert_eq!(fs.stat("/bulk.bin").unwrap().blocks, 40);
}

#[test]
fn cache_disabled_still_works() {
    let image = TempImage::new("nocache");
    let fs = SnapFs::open(image.device(), 0).unwrap();

    fs.write_file("/f", b"uncached").unwrap();
    assert_eq!(fs.read_file("/f").unwrap(), b"uncached");

    let stats = fs.cache_stats();
    assert_eq!(stats.capacity, 0);
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 0);
}

#[test]
fn reopen_reformats_corrupted_superblock() {
    use block_dev::BlockDevice;

    let image = TempImage::new("corrupt");
    {
        let fs = SnapFs::open(image.device(), 128).unwrap();
        fs.write_file("/doomed", b"bytes").unwrap();
    }

    // 抹掉超级块，模拟异质或损坏的镜像
    let device = image.device();
    device.write_block(0, &[0u8; BLOCK_SIZE]).unwrap();

    let fs = SnapFs::open(device, 128).unwrap();
    assert!(!fs.exists("/doomed"));
    assert!(fs.super_block().unwrap().is_valid());
}
