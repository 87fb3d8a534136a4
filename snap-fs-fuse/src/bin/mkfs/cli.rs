use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
pub struct Cli {
    /// Disk image path (created if missing)
    #[arg(long, short)]
    pub image: PathBuf,

    /// Reformat even if the image already holds a valid volume
    #[arg(long, short)]
    pub force: bool,

    /// Block cache capacity in blocks, 0 disables the cache
    #[arg(long, default_value_t = 128)]
    pub cache: usize,
}
