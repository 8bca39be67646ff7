use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtdError {
    #[error("Missing input: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("External tool '{tool}' failed ({status}): {stderr}")]
    ExternalTool {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("Tool '{0}' is not installed or could not be started")]
    MissingDependency(String),

    #[error("Malformed table {}: {reason}", .path.display())]
    MalformedTable { path: PathBuf, reason: String },

    #[error("Failed to parse sequence file {}: {reason}", .path.display())]
    SequenceParse { path: PathBuf, reason: String },

    #[error("Nothing to process: {0}")]
    EmptyInput(String),

    #[error("Gene detector output '{}' does not exist", .0.display())]
    DetectorOutputMissing(PathBuf),

    #[error("Database index references {} missing artifact(s): {}", .missing.len(), join_paths(.missing))]
    IndexValidation { missing: Vec<PathBuf> },

    #[error("Sketch parameters differ: {0} vs {1}")]
    SketchParamsMismatch(String, String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<serde_json::Error> for EtdError {
    fn from(e: serde_json::Error) -> Self {
        EtdError::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for EtdError {
    fn from(e: bincode::Error) -> Self {
        EtdError::Serialization(e.to_string())
    }
}

/// A gene accession seen more than once in a single gene-call table.
///
/// Not an error: the first occurrence is used and this is logged.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DuplicateRecordWarning {
    pub gene_id: String,
    pub occurrences: usize,
}

impl std::fmt::Display for DuplicateRecordWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} copies of gene {} so taking the first",
            self.occurrences, self.gene_id
        )
    }
}
