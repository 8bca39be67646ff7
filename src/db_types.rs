use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

/// Which implementation produces and compares genome sketches.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SketchBackend {
    /// The `mash` command-line tool.
    Mash,
    /// The in-process MinHash implementation.
    Native,
}

/// Parameters every sketch in one database must share.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SketchParams {
    pub kmer_size: u8,
    pub sketch_size: usize,
    pub backend: SketchBackend,
}

impl Default for SketchParams {
    fn default() -> Self {
        SketchParams {
            kmer_size: 21,
            sketch_size: 1000,
            backend: SketchBackend::Mash,
        }
    }
}

impl fmt::Display for SketchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "k={}, s={}, backend={:?}",
            self.kmer_size, self.sketch_size, self.backend
        )
    }
}

/// Handle on a single genome's sketch file.
///
/// The sketch content is opaque to the core; only the sketcher reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenomeSketch {
    pub genome_id: String,
    pub params: SketchParams,
    pub path: PathBuf,
}

/// Several genome sketches pasted into one file, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceIndex {
    pub path: PathBuf,
    pub params: SketchParams,
    pub genome_ids: Vec<String>,
}

/// Per-genome artifacts recorded in the database index.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub taxon: String,
    pub gene_calls: PathBuf,
    pub phylogeny: PathBuf,
}

/// Persisted description of a fully built reference database.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DatabaseIndex {
    pub sketch_params: SketchParams,
    pub reference_index: PathBuf,
    pub accessions: BTreeMap<String, IndexEntry>,
}

impl DatabaseIndex {
    pub fn new(sketch_params: SketchParams, reference_index: PathBuf) -> Self {
        DatabaseIndex {
            sketch_params,
            reference_index,
            accessions: BTreeMap::new(),
        }
    }

    pub fn add_accession(&mut self, accession: String, entry: IndexEntry) {
        self.accessions.insert(accession, entry);
    }

    pub fn num_accessions(&self) -> usize {
        self.accessions.len()
    }

    /// Every file this index points at that is not on disk, deduplicated,
    /// in a stable order.
    pub fn missing_artifacts(&self) -> Vec<PathBuf> {
        let mut missing: Vec<PathBuf> = Vec::new();
        let mut check = |path: &Path| {
            if !path.exists() && !missing.iter().any(|m| m == path) {
                missing.push(path.to_path_buf());
            }
        };
        check(&self.reference_index);
        for entry in self.accessions.values() {
            check(&entry.gene_calls);
            check(&entry.phylogeny);
        }
        missing
    }

    pub fn reference_index(&self) -> ReferenceIndex {
        ReferenceIndex {
            path: self.reference_index.clone(),
            params: self.sketch_params,
            genome_ids: self.accessions.keys().cloned().collect(),
        }
    }
}
