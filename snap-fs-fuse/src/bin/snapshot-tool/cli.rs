use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
pub struct Cli {
    /// Disk image path
    #[arg(long, short)]
    pub image: PathBuf,

    /// Block cache capacity in blocks
    #[arg(long, default_value_t = 128)]
    pub cache: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a whole-volume snapshot
    Create { name: String },
    /// Delete a snapshot by id
    Delete { id: u32 },
    /// List active snapshots
    List,
    /// Roll the volume back to a snapshot by id
    Restore { id: u32 },
}
