use anyhow::Result;
use flate2::{Compression as GzCompression, read::MultiGzDecoder, write::GzEncoder};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use psutil::process::Process;
use std::{
    fs::{self, File},
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    time::Instant,
};
use xz2::{read::XzDecoder, write::XzEncoder};
use zstd::{stream::read::Decoder as ZstdDecoder, stream::write::Encoder as ZstdEncoder};

use crate::errors::EtdError;

pub const GENOME_EXTENSIONS: [&str; 3] = ["fa", "fna", "fasta"];
const COMPRESSION_EXTENSIONS: [&str; 4] = ["gz", "xz", "zst", "zstd"];

/// Determines the number of worker threads to use.
/// If `cli_threads` is 0, it uses all available logical cores.
pub fn get_num_threads(cli_threads: usize) -> usize {
    let num_threads = if cli_threads == 0 {
        num_cpus::get()
    } else {
        cli_threads
    };
    debug!("Using {} worker threads.", num_threads);
    num_threads
}

/// Initializes the Rayon global thread pool with the specified number of threads.
pub fn initialize_rayon_pool(num_threads: usize) -> Result<()> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()?;
    Ok(())
}

/// Runs one pipeline stage behind a progress bar, then logs elapsed time and RSS.
pub fn track_stage<F, R>(stage: &str, total_items: u64, func: F) -> Result<R, EtdError>
where
    F: FnOnce(&ProgressBar) -> Result<R, EtdError>,
{
    info!("Starting stage: {}", stage);
    let start_time = Instant::now();

    let pb = ProgressBar::new(total_items);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            )
            .unwrap_or_else(|e| {
                debug!("Error setting progress bar style: {}", e);
                ProgressStyle::default_bar()
            })
            .progress_chars("#>-"),
    );

    let result = func(&pb);
    pb.finish_and_clear();

    info!("Stage '{}' finished in {:.2?}", stage, start_time.elapsed());
    match Process::current() {
        Ok(process) => match process.memory_info() {
            Ok(mem_info) => debug!(
                "RSS after stage '{}': {} MB",
                stage,
                mem_info.rss() / 1024 / 1024
            ),
            Err(e) => debug!("Failed to get memory info: {}", e),
        },
        Err(e) => debug!("Failed to get current process: {}", e),
    }

    result
}

fn get_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_lowercase())
}

/// Opens a file for reading, handling decompression based on file extension.
/// Supported extensions: .gz, .xz, .zst.
pub fn get_input_reader(path: &Path) -> Result<Box<dyn BufRead>, EtdError> {
    if !path.exists() {
        return Err(EtdError::MissingInput(path.to_path_buf()));
    }
    let file = File::open(path)?;

    match get_extension(path).as_deref() {
        Some("gz") => Ok(Box::new(BufReader::new(MultiGzDecoder::new(file)))),
        Some("xz") => Ok(Box::new(BufReader::new(XzDecoder::new(file)))),
        Some("zst") | Some("zstd") => Ok(Box::new(BufReader::new(ZstdDecoder::new(file)?))),
        _ => Ok(Box::new(BufReader::new(file))),
    }
}

/// Opens a file for writing, handling compression based on file extension.
/// Supported extensions: .gz, .xz, .zst.
pub fn get_output_writer(path: &Path) -> Result<Box<dyn Write>, EtdError> {
    let file = File::create(path)?;

    match get_extension(path).as_deref() {
        Some("gz") => Ok(Box::new(BufWriter::new(GzEncoder::new(
            file,
            GzCompression::default(),
        )))),
        Some("xz") => Ok(Box::new(BufWriter::new(XzEncoder::new(file, 6)))),
        Some("zst") | Some("zstd") => {
            let encoder = ZstdEncoder::new(file, 0)?.auto_finish();
            Ok(Box::new(BufWriter::new(encoder)))
        }
        _ => Ok(Box::new(BufWriter::new(file))),
    }
}

/// Derives a genome accession from a path or a path-like identifier:
/// directories, compression suffixes and FASTA/table extensions are removed.
///
/// `/db/genomes/Ecoli/GCF_000005845.2.fa.gz` -> `GCF_000005845.2`
pub fn accession_from_path(path: &str) -> String {
    let mut name = Path::new(path.trim())
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.trim().to_string());

    for ext in COMPRESSION_EXTENSIONS {
        if let Some(stripped) = name.strip_suffix(&format!(".{}", ext)) {
            name = stripped.to_string();
            break;
        }
    }
    for ext in GENOME_EXTENSIONS.iter().chain(["msh", "json", "txt"].iter()) {
        if let Some(stripped) = name.strip_suffix(&format!(".{}", ext)) {
            name = stripped.to_string();
            break;
        }
    }
    name
}

/// Lists regular files in `dir` whose extension is one of `extensions`, sorted by path.
pub fn list_files_with_extensions(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, EtdError> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            get_extension(path).is_some_and(|ext| extensions.iter().any(|e| *e == ext))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Ensures `dir` exists.
pub fn ensure_dir(dir: &Path) -> Result<(), EtdError> {
    if !dir.exists() {
        debug!("Creating directory {:?}", dir);
        fs::create_dir_all(dir)?;
    }
    Ok(())
}
