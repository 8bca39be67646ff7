// Shared fixtures for the integration tests. Not every test binary uses
// every helper.
#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use etd::{
    db_types::SketchParams,
    errors::EtdError,
    tools::{GeneDetector, PlacementOutputs, Placer, Sketcher, TreeBuilder, rgi::detector_table_path},
};

pub const GENE_CALL_HEADER: &str = "ORF_ID\tCut_Off\tBest_Hit_ARO\tARO\tPredicted_DNA";

/// Gene-call table with one row per `(accession, name)`.
pub fn gene_calls(genes: &[(&str, &str)]) -> String {
    let mut table = format!("{}\n", GENE_CALL_HEADER);
    for (i, (accession, name)) in genes.iter().enumerate() {
        table.push_str(&format!(
            "orf{}\tPerfect\t{}\t{}\tATG{}TAA\n",
            i, name, accession, accession
        ));
    }
    table
}

/// Deterministic pseudo-random DNA; different seeds share no long k-mers.
pub fn random_genome(seed: u64, len: usize) -> String {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            b"ACGT"[(state >> 62) as usize] as char
        })
        .collect()
}

pub fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Adds one genome and its gene calls to a database directory.
pub fn add_genome(db: &Path, taxon: &str, accession: &str, sequence: &str, genes: &[(&str, &str)]) {
    write_file(
        &db.join("genomes").join(taxon).join(format!("{}.fa", accession)),
        &format!(">{}\n{}\n", accession, sequence),
    );
    write_file(
        &db.join("rgi_results")
            .join(taxon.replace("FASTA", "NCBI"))
            .join(format!("{}.txt", accession)),
        &gene_calls(genes),
    );
}

/// Writes placeholder sketch files and records every call.
#[derive(Default)]
pub struct FakeSketcher {
    pub params: SketchParams,
    pub sketched: Mutex<Vec<PathBuf>>,
    pub pasted: Mutex<Vec<Vec<PathBuf>>>,
    pub table: String,
}

impl FakeSketcher {
    pub fn sketch_count(&self) -> usize {
        self.sketched.lock().unwrap().len()
    }
}

impl Sketcher for FakeSketcher {
    fn params(&self) -> SketchParams {
        self.params
    }

    fn sketch(&self, genome: &Path, output: &Path) -> Result<(), EtdError> {
        self.sketched.lock().unwrap().push(genome.to_path_buf());
        fs::write(output, genome.to_string_lossy().as_bytes())?;
        Ok(())
    }

    fn paste(&self, sketches: &[PathBuf], output: &Path) -> Result<(), EtdError> {
        let mut combined = String::new();
        for sketch in sketches {
            combined.push_str(&fs::read_to_string(sketch)?);
            combined.push('\n');
        }
        self.pasted.lock().unwrap().push(sketches.to_vec());
        fs::write(output, combined)?;
        Ok(())
    }

    fn distance(&self, _reference: &Path, _query: &Path) -> Result<String, EtdError> {
        Ok(self.table.clone())
    }
}

/// Writes a dummy tree; fails for the taxon named in `fail_for`.
#[derive(Default)]
pub struct FakeTreeBuilder {
    pub built: Mutex<Vec<String>>,
    pub fail_for: Option<String>,
}

impl FakeTreeBuilder {
    pub fn failing_for(taxon: &str) -> Self {
        FakeTreeBuilder {
            built: Mutex::new(Vec::new()),
            fail_for: Some(taxon.to_string()),
        }
    }

    pub fn built(&self) -> Vec<String> {
        self.built.lock().unwrap().clone()
    }
}

impl TreeBuilder for FakeTreeBuilder {
    fn build_tree(&self, inputs: &[PathBuf], output: &Path) -> Result<(), EtdError> {
        let taxon = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.fail_for.as_deref() == Some(taxon.as_str()) {
            return Err(EtdError::ExternalTool {
                tool: "mashtree".to_string(),
                status: "exit status: 1".to_string(),
                stderr: format!("cannot build tree for {}", taxon),
            });
        }
        self.built.lock().unwrap().push(taxon);
        fs::write(output, format!("({});\n", inputs.len()))?;
        Ok(())
    }
}

/// Returns a fixed gene-call table for any genome.
pub struct FakeDetector {
    pub table: String,
}

impl GeneDetector for FakeDetector {
    fn detect(&self, _genome: &Path, output_prefix: &Path) -> Result<PathBuf, EtdError> {
        let path = detector_table_path(output_prefix);
        fs::write(&path, &self.table)?;
        Ok(path)
    }
}

#[derive(Default)]
pub struct FakePlacer {
    pub placed: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl Placer for FakePlacer {
    fn place(
        &self,
        package: &Path,
        candidate: &Path,
        output_dir: &Path,
    ) -> Result<PlacementOutputs, EtdError> {
        self.placed
            .lock()
            .unwrap()
            .push((package.to_path_buf(), candidate.to_path_buf()));
        let outputs = PlacementOutputs::in_dir(output_dir);
        for file in [&outputs.alignment, &outputs.placement, &outputs.tree] {
            fs::write(file, "placed")?;
        }
        Ok(outputs)
    }
}
