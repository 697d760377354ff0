use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "pk3pack",
    author,
    version,
    about = "Packages an Enemy Territory map and its assets into a .pk3"
)]
pub struct Args {
    /// Path to the compiled map source (`<etmain>/maps/<name>.map`).
    #[arg(value_name = "MAP")]
    pub map_file: PathBuf,

    /// Output .pk3 path, or a directory for `<map-name>.pk3`.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Replace the output archive if it already exists.
    #[arg(long)]
    pub overwrite: bool,

    /// Resolve every reference but write nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Ignore per-source `scripts/shaderlist.txt` allowlists.
    #[arg(long)]
    pub no_shaderlist: bool,

    /// Also pack the .map source, editor images, and misc_model references.
    #[arg(long)]
    pub include_source: bool,

    /// Treat any missing asset as a fatal error.
    #[arg(long)]
    pub require_all: bool,

    /// Index loose .pk3 archives next to etmain as content sources.
    #[arg(long)]
    pub load_pk3s: bool,

    /// Archive to index for subtraction only (name or stem; repeatable).
    #[arg(long = "exclude", value_name = "PK3")]
    pub exclude_sources: Vec<String>,

    /// Archive to drop entirely (name or stem; repeatable).
    #[arg(long = "ignore", value_name = "PK3")]
    pub ignore_sources: Vec<String>,

    /// Debug-level logging (RUST_LOG overrides).
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn parse() -> Args {
    Args::parse()
}
