use std::{
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{errors::EtdError, utils::ensure_dir};

pub const LOG_FILE_NAME: &str = "etd.log";

/// Per-invocation settings handed to every stage instead of process-wide state.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_name: String,
    pub output_dir: PathBuf,
    pub workers: usize,
}

impl RunContext {
    pub fn new(run_name: impl Into<String>, output_dir: impl Into<PathBuf>, workers: usize) -> Self {
        RunContext {
            run_name: run_name.into(),
            output_dir: output_dir.into(),
            workers: workers.max(1),
        }
    }

    /// Context for a query run: the output directory defaults to
    /// `<input stem>_<unix seconds>`.
    pub fn for_query(input: &Path, output_dir: Option<PathBuf>, workers: usize) -> Self {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "etd_run".to_string());
        let output_dir = output_dir.unwrap_or_else(|| PathBuf::from(format!("{}_{}", stem, unix_seconds())));
        let run_name = output_dir
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or(stem);
        RunContext::new(run_name, output_dir, workers)
    }

    /// Context for a database build; logs go under `<database>/etd_db`.
    pub fn for_database(database_dir: &Path, workers: usize) -> Self {
        RunContext::new(
            format!("ETD_DB_preparation_{}", unix_seconds()),
            database_dir.join("etd_db"),
            workers,
        )
    }

    pub fn log_path(&self) -> PathBuf {
        self.output_dir.join(LOG_FILE_NAME)
    }

    /// A subdirectory of the output directory, created on demand.
    pub fn stage_dir(&self, name: &str) -> Result<PathBuf, EtdError> {
        let dir = self.output_dir.join(name);
        ensure_dir(&dir)?;
        Ok(dir)
    }

    pub fn prepare(&self) -> Result<(), EtdError> {
        ensure_dir(&self.output_dir)
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_context_defaults_to_timestamped_dir() {
        let ctx = RunContext::for_query(Path::new("/data/isolate_7.fasta"), None, 0);
        assert!(ctx.run_name.starts_with("isolate_7_"));
        assert_eq!(ctx.workers, 1);
    }

    #[test]
    fn query_context_uses_given_output_dir() {
        let ctx = RunContext::for_query(Path::new("x.fa"), Some(PathBuf::from("out/run1")), 4);
        assert_eq!(ctx.run_name, "run1");
        assert_eq!(ctx.log_path(), PathBuf::from("out/run1").join(LOG_FILE_NAME));
    }
}
