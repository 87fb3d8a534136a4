mod cli;

use std::error::Error;
use std::fs::OpenOptions;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Command};
use snap_fs::{FsError, SnapFs, SnapshotInfo};
use snap_fs_fuse::BlockFile;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();

    // 镜像必须已经存在，缺镜像时 create 也无从谈起
    let file = OpenOptions::new().read(true).write(true).open(&cli.image)?;
    let device = Arc::new(BlockFile(file));
    let fs = SnapFs::open(device, cli.cache)?;

    match cli.command {
        Command::Create { name } => {
            let id = fs.create_snapshot("", &name)?;
            println!("created snapshot {name:?} with id {id}");
        }
        Command::Delete { id } => {
            let info = find_by_id(&fs, id)?;
            fs.delete_snapshot(&info.name)?;
            println!("deleted snapshot {} ({:?})", id, info.name);
        }
        Command::List => {
            let snapshots = fs.snapshots()?;
            if snapshots.is_empty() {
                println!("no snapshots");
            } else {
                println!("{:<4} {:<32} {}", "id", "name", "timestamp");
                for info in snapshots {
                    println!("{:<4} {:<32} {}", info.id, info.name, info.timestamp);
                }
            }
        }
        Command::Restore { id } => {
            let info = find_by_id(&fs, id)?;
            fs.restore_snapshot(&info.name)?;
            println!("restored snapshot {} ({:?})", id, info.name);
        }
    }
    Ok(())
}

fn find_by_id(fs: &SnapFs, id: u32) -> Result<SnapshotInfo, FsError> {
    fs.snapshots()?
        .into_iter()
        .find(|info| info.id == id)
        .ok_or(FsError::SnapshotNotFound)
}
