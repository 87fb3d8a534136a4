mod cli;

use std::error::Error;
use std::fs::OpenOptions;
use std::sync::Arc;

use clap::Parser;
use cli::Cli;
use snap_fs::{SnapFs, DISK_SIZE};
use snap_fs_fuse::BlockFile;
use typed_bytesize::ByteSizeIec;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(&cli.image)?;
    file.set_len(DISK_SIZE as u64)?;
    let device = Arc::new(BlockFile(file));

    // 不带 --force 时保留已有的合法卷，只做打开时的一致性扫描
    let fs = if cli.force {
        SnapFs::format(device, cli.cache)?
    } else {
        SnapFs::open(device, cli.cache)?
    };

    let sb = fs.super_block()?;
    println!(
        "{}: {} ({} blocks of {} bytes), {} inodes free, {} blocks free",
        cli.image.display(),
        ByteSizeIec(DISK_SIZE as u64),
        sb.block_count,
        sb.block_size,
        sb.free_inode_count,
        sb.free_block_count,
    );
    Ok(())
}
