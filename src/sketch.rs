//! Per-genome sketches and their combination into one reference index.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use log::{debug, info};
use rayon::prelude::*;

use crate::{
    db_types::{GenomeSketch, ReferenceIndex},
    errors::EtdError,
    tools::Sketcher,
    utils::{ensure_dir, track_stage},
};

pub const SKETCH_EXTENSION: &str = "msh";

/// Whether a sketch call did any work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SketchOutcome {
    Created,
    Skipped,
}

pub struct SketchStore<'a> {
    sketcher: &'a dyn Sketcher,
}

impl<'a> SketchStore<'a> {
    pub fn new(sketcher: &'a dyn Sketcher) -> Self {
        SketchStore { sketcher }
    }

    pub fn sketch_path(dir: &Path, genome_id: &str) -> PathBuf {
        dir.join(format!("{}.{}", genome_id, SKETCH_EXTENSION))
    }

    /// Sketches `genome` into `dir/<genome_id>.msh`, unless that file exists.
    ///
    /// An existing sketch is trusted as-is even if it was made with other
    /// parameters; keeping parameters stable across runs is up to the caller.
    pub fn sketch(
        &self,
        genome_id: &str,
        genome: &Path,
        dir: &Path,
    ) -> Result<(GenomeSketch, SketchOutcome), EtdError> {
        let path = Self::sketch_path(dir, genome_id);
        let handle = GenomeSketch {
            genome_id: genome_id.to_string(),
            params: self.sketcher.params(),
            path: path.clone(),
        };
        if path.exists() {
            return Ok((handle, SketchOutcome::Skipped));
        }
        if !genome.exists() {
            return Err(EtdError::MissingInput(genome.to_path_buf()));
        }
        self.sketcher.sketch(genome, &path)?;
        Ok((handle, SketchOutcome::Created))
    }

    /// Sketches a set of `(genome_id, genome_path)` pairs on the rayon pool.
    /// The returned handles follow the input order.
    pub fn sketch_all(
        &self,
        label: &str,
        genomes: &[(String, PathBuf)],
        dir: &Path,
    ) -> Result<Vec<GenomeSketch>, EtdError> {
        ensure_dir(dir)?;
        let skipped = AtomicUsize::new(0);

        let sketches = track_stage(
            &format!("Sketching genomes for taxon {}", label),
            genomes.len() as u64,
            |pb| {
                genomes
                    .par_iter()
                    .map(|(genome_id, genome)| {
                        let (handle, outcome) = self.sketch(genome_id, genome, dir)?;
                        if outcome == SketchOutcome::Skipped {
                            skipped.fetch_add(1, Ordering::Relaxed);
                        }
                        pb.inc(1);
                        Ok(handle)
                    })
                    .collect::<Result<Vec<_>, EtdError>>()
            },
        )?;

        let skipped = skipped.into_inner();
        if skipped > 0 {
            debug!("Using {} sketches that already exist", skipped);
        }
        info!(
            "Taxon {}: {} sketches ({} new)",
            label,
            sketches.len(),
            sketches.len() - skipped
        );
        Ok(sketches)
    }

    /// Pastes `sketches` into `output` and deletes the per-genome files.
    ///
    /// The handles in `sketches` are dangling once this returns.
    pub fn combine(
        &self,
        sketches: &[GenomeSketch],
        output: &Path,
    ) -> Result<ReferenceIndex, EtdError> {
        let first = sketches
            .first()
            .ok_or_else(|| EtdError::EmptyInput("no sketches to combine".to_string()))?;
        if let Some(odd) = sketches.iter().find(|s| s.params != first.params) {
            return Err(EtdError::SketchParamsMismatch(
                first.params.to_string(),
                odd.params.to_string(),
            ));
        }

        if output.exists() {
            info!("Removing previous combined sketch: {:?}", output);
            fs::remove_file(output)?;
        }
        if let Some(parent) = output.parent() {
            ensure_dir(parent)?;
        }

        info!("Combining {} sketches into {:?}", sketches.len(), output);
        let paths: Vec<PathBuf> = sketches.iter().map(|s| s.path.clone()).collect();
        self.sketcher.paste(&paths, output)?;

        for path in &paths {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        // drop taxon sketch directories left empty
        let mut dirs: Vec<&Path> = paths.iter().filter_map(|p| p.parent()).collect();
        dirs.sort();
        dirs.dedup();
        for dir in dirs {
            if fs::read_dir(dir).map(|mut d| d.next().is_none()).unwrap_or(false) {
                fs::remove_dir(dir)?;
            }
        }

        Ok(ReferenceIndex {
            path: output.to_path_buf(),
            params: first.params,
            genome_ids: sketches.iter().map(|s| s.genome_id.clone()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db_types::SketchParams;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingSketcher {
        sketched: Mutex<Vec<PathBuf>>,
        pasted: Mutex<Vec<Vec<PathBuf>>>,
    }

    impl Sketcher for CountingSketcher {
        fn params(&self) -> SketchParams {
            SketchParams::default()
        }

        fn sketch(&self, genome: &Path, output: &Path) -> Result<(), EtdError> {
            self.sketched.lock().unwrap().push(genome.to_path_buf());
            fs::write(output, b"sketch")?;
            Ok(())
        }

        fn paste(&self, sketches: &[PathBuf], output: &Path) -> Result<(), EtdError> {
            self.pasted.lock().unwrap().push(sketches.to_vec());
            fs::write(output, b"combined")?;
            Ok(())
        }

        fn distance(&self, _reference: &Path, _query: &Path) -> Result<String, EtdError> {
            Ok(String::new())
        }
    }

    #[test]
    fn second_sketch_is_a_skip() {
        let dir = TempDir::new().unwrap();
        let genome = dir.path().join("G1.fa");
        fs::write(&genome, ">g\nACGT\n").unwrap();
        let sketcher = CountingSketcher::default();
        let store = SketchStore::new(&sketcher);

        let (_, first) = store.sketch("G1", &genome, dir.path()).unwrap();
        let (_, second) = store.sketch("G1", &genome, dir.path()).unwrap();

        assert_eq!(first, SketchOutcome::Created);
        assert_eq!(second, SketchOutcome::Skipped);
        assert_eq!(sketcher.sketched.lock().unwrap().len(), 1);
    }

    #[test]
    fn combining_nothing_is_an_error_and_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let sketcher = CountingSketcher::default();
        let out = dir.path().join("card_prev.msh");
        let err = SketchStore::new(&sketcher).combine(&[], &out).unwrap_err();
        assert!(matches!(err, EtdError::EmptyInput(_)));
        assert!(!out.exists());
        assert!(sketcher.pasted.lock().unwrap().is_empty());
    }

    #[test]
    fn combine_keeps_order_and_removes_inputs() {
        let dir = TempDir::new().unwrap();
        let taxon_dir = dir.path().join("genome_sketches").join("Ecoli");
        let sketcher = CountingSketcher::default();
        let store = SketchStore::new(&sketcher);

        let mut genomes = Vec::new();
        for id in ["B", "A", "C"] {
            let g = dir.path().join(format!("{}.fa", id));
            fs::write(&g, ">x\nACGT\n").unwrap();
            genomes.push((id.to_string(), g));
        }
        let sketches = store.sketch_all("Ecoli", &genomes, &taxon_dir).unwrap();
        let out = dir.path().join("card_prev.msh");
        let index = store.combine(&sketches, &out).unwrap();

        assert_eq!(index.genome_ids, ["B", "A", "C"]);
        assert_eq!(
            sketcher.pasted.lock().unwrap()[0],
            sketches.iter().map(|s| s.path.clone()).collect::<Vec<_>>()
        );
        assert!(out.exists());
        assert!(sketches.iter().all(|s| !s.path.exists()));
        assert!(!taxon_dir.exists());
    }
}
