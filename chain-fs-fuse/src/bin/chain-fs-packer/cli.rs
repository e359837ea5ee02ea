use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(version, about = "Build and inspect chain-fs images")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Copy a host directory tree into a fresh image
    Pack {
        /// Host directory to copy
        #[arg(long, short)]
        source: PathBuf,

        #[command(flatten)]
        image: ImageArgs,
    },
    /// List a directory of the image
    Ls {
        #[command(flatten)]
        image: ImageArgs,

        #[arg(default_value = "/")]
        path: String,
    },
    /// Print a file of the image to stdout
    Cat {
        #[command(flatten)]
        image: ImageArgs,

        path: String,
    },
    /// Show the metadata of a file or directory
    Stat {
        #[command(flatten)]
        image: ImageArgs,

        path: String,
    },
    /// Copy one host file to an absolute path inside the image
    Put {
        #[command(flatten)]
        image: ImageArgs,

        host: PathBuf,

        dest: String,
    },
    /// Remove a file or an empty directory of the image
    Rm {
        #[command(flatten)]
        image: ImageArgs,

        path: String,
    },
}

#[derive(Args)]
pub struct ImageArgs {
    /// Image file
    #[arg(long, short)]
    pub image: PathBuf,

    /// Image size in blocks, only used by `pack`
    #[arg(long, default_value_t = 256)]
    pub blocks: u32,

    /// Capacity of the inode table, must match the value used by `pack`.
    ///
    /// The image does not record it; with a smaller value, objects whose
    /// inode number is out of range are reported as missing.
    #[arg(long, default_value_t = 64)]
    pub inodes: u32,
}
