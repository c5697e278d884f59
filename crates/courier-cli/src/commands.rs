use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dicom-courier")]
#[command(about = "Repackage a DICOM archive by series and sync it to Flywheel", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan, group, package and upload an archive to the configured project
    Upload {
        /// Archive file name (zip)
        #[arg(short, long)]
        file: PathBuf,
        /// Path segment index containing the subject label
        #[arg(short, long, default_value_t = 1)]
        seg_index: usize,
    },
    /// Scan and group only; print what an upload would deposit, without remote calls
    Scan {
        /// Archive file name (zip)
        #[arg(short, long)]
        file: PathBuf,
        /// Path segment index containing the subject label
        #[arg(short, long, default_value_t = 1)]
        seg_index: usize,
    },
    /// Print configuration values
    PrintConfig,
}
