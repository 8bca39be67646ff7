use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::{
    db_types::SketchBackend,
    distance::{DEFAULT_MASH_DISTANCE, DEFAULT_MAX_RELATIVES},
};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    #[clap(
        short,
        long,
        global = true,
        default_value_t = 0,
        help = "Number of threads to use (0 for all logical cores)"
    )]
    pub threads: usize,

    #[clap(short, long, global = true, action = clap::ArgAction::Count, help = "Verbosity level (e.g., -v, -vv)")]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find genes that set an isolate apart from its closest reference genomes
    Run(RunArgs),
    /// Build (or resume building) the reference database
    Database(DatabaseArgs),
}

/// Locations of the external programs; each defaults to the name on PATH.
#[derive(Parser, Debug, Clone)]
pub struct ToolPaths {
    #[clap(long, default_value = "mash", help = "mash binary")]
    pub mash_bin: PathBuf,

    #[clap(long, default_value = "mashtree", help = "mashtree binary")]
    pub mashtree_bin: PathBuf,

    #[clap(long, default_value = "rgi", help = "rgi binary")]
    pub rgi_bin: PathBuf,

    #[clap(long, default_value = "hmmalign", help = "hmmalign binary")]
    pub hmmalign_bin: PathBuf,

    #[clap(long, default_value = "pplacer", help = "pplacer binary")]
    pub pplacer_bin: PathBuf,

    #[clap(long, default_value = "guppy", help = "guppy binary")]
    pub guppy_bin: PathBuf,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    #[clap(short, long, required = true, help = "Assembled isolate genome (FASTA)")]
    pub input: PathBuf,

    #[clap(short, long, required = true, help = "Reference database directory")]
    pub database: PathBuf,

    #[clap(
        short,
        long,
        help = "Output directory (default: <input stem>_<unix timestamp>)"
    )]
    pub output: Option<PathBuf>,

    #[clap(
        short = 'm',
        long,
        default_value_t = DEFAULT_MASH_DISTANCE,
        help = "Maximum Mash distance for a reference genome to count as a relative"
    )]
    pub mash_distance: f64,

    #[clap(
        long,
        default_value_t = DEFAULT_MAX_RELATIVES,
        help = "Maximum number of relatives to compare against"
    )]
    pub max_relatives: usize,

    #[clap(flatten)]
    pub tools: ToolPaths,
}

#[derive(Parser, Debug)]
pub struct DatabaseArgs {
    #[clap(short, long, required = true, help = "Database directory containing genomes/ and rgi_results/")]
    pub database: PathBuf,

    #[clap(long, help = "Rebuild even if a valid index exists")]
    pub force: bool,

    #[clap(short, long, default_value_t = 21, help = "The length of the k-mer used for sketching")]
    pub kmer_size: u8,

    #[clap(short, long, default_value_t = 1000, help = "Number of hashes kept per sketch")]
    pub sketch_size: usize,

    #[clap(long, value_enum, default_value_t = SketchBackend::Mash, help = "Sketching backend")]
    pub sketcher: SketchBackend,

    #[clap(flatten)]
    pub tools: ToolPaths,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}
