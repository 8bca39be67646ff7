//! In-process bottom-s MinHash sketches with Mash-compatible distances.
//!
//! Sketch files are bincode-encoded [`SketchFile`]s; a pasted reference index
//! is the same structure holding many sketches. Distance output follows the
//! `mash dist -t` layout so the ranking code reads both backends the same way.

use std::{
    collections::BTreeSet,
    fmt::Write as _,
    io::Write,
    path::{Path, PathBuf},
};

use log::debug;
use needletail::parse_fastx_file;
use serde::{Deserialize, Serialize};

use super::Sketcher;
use crate::{
    db_types::SketchParams,
    errors::EtdError,
    kmer::{for_each_canonical_kmer, tw_hash64},
    utils::{get_input_reader, get_output_writer},
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MinHashSketch {
    pub name: String,
    /// The `sketch_size` smallest k-mer hashes, ascending.
    pub hashes: Vec<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SketchFile {
    pub params: SketchParams,
    pub sketches: Vec<MinHashSketch>,
}

impl SketchFile {
    pub fn load(path: &Path) -> Result<Self, EtdError> {
        let mut reader = get_input_reader(path)?;
        Ok(bincode::deserialize_from(&mut reader)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), EtdError> {
        let mut writer = get_output_writer(path)?;
        bincode::serialize_into(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

pub struct NativeSketcher {
    params: SketchParams,
}

impl NativeSketcher {
    pub fn new(params: SketchParams) -> Self {
        NativeSketcher { params }
    }

    /// Sketches every record of a FASTA/FASTQ file into one MinHash sketch.
    pub fn sketch_genome(&self, genome: &Path) -> Result<MinHashSketch, EtdError> {
        let parse_err = |e: needletail::errors::ParseError| EtdError::SequenceParse {
            path: genome.to_path_buf(),
            reason: e.to_string(),
        };
        if !genome.exists() {
            return Err(EtdError::MissingInput(genome.to_path_buf()));
        }
        let mut reader = parse_fastx_file(genome).map_err(parse_err)?;

        let s = self.params.sketch_size;
        let mut bottom: BTreeSet<u64> = BTreeSet::new();
        while let Some(record) = reader.next() {
            let record = record.map_err(parse_err)?;
            for_each_canonical_kmer(&record.seq(), self.params.kmer_size, |kmer| {
                let hash = tw_hash64(kmer);
                if bottom.len() < s {
                    bottom.insert(hash);
                } else if bottom.last().is_some_and(|&max| hash < max) && bottom.insert(hash) {
                    bottom.pop_last();
                }
            });
        }

        Ok(MinHashSketch {
            name: genome.to_string_lossy().into_owned(),
            hashes: bottom.into_iter().collect(),
        })
    }

    fn check_params(&self, other: SketchParams) -> Result<(), EtdError> {
        if other != self.params {
            return Err(EtdError::SketchParamsMismatch(
                self.params.to_string(),
                other.to_string(),
            ));
        }
        Ok(())
    }

    fn load_query(&self, query: &Path) -> Result<Vec<MinHashSketch>, EtdError> {
        if query.extension().is_some_and(|ext| ext == "msh") {
            let file = SketchFile::load(query)?;
            self.check_params(file.params)?;
            Ok(file.sketches)
        } else {
            Ok(vec![self.sketch_genome(query)?])
        }
    }
}

/// Mash distance `-1/k * ln(2j / (1 + j))` from the bottom-`s` Jaccard estimate.
pub fn mash_distance(a: &MinHashSketch, b: &MinHashSketch, k: u8, sketch_size: usize) -> f64 {
    let (mut i, mut j) = (0, 0);
    let (mut shared, mut considered) = (0usize, 0usize);
    while considered < sketch_size && i < a.hashes.len() && j < b.hashes.len() {
        match a.hashes[i].cmp(&b.hashes[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                shared += 1;
                i += 1;
                j += 1;
            }
        }
        considered += 1;
    }
    // remaining union members from whichever sketch is not exhausted
    considered += (a.hashes.len() - i + b.hashes.len() - j).min(sketch_size - considered);

    if considered == 0 || shared == 0 {
        return 1.0;
    }
    if shared == considered {
        return 0.0;
    }
    let jaccard = shared as f64 / considered as f64;
    let distance = -(2.0 * jaccard / (1.0 + jaccard)).ln() / k as f64;
    distance.clamp(0.0, 1.0)
}

impl Sketcher for NativeSketcher {
    fn params(&self) -> SketchParams {
        self.params
    }

    fn sketch(&self, genome: &Path, output: &Path) -> Result<(), EtdError> {
        let sketch = self.sketch_genome(genome)?;
        debug!(
            "Sketched {:?}: {} hashes (k={}, s={})",
            genome,
            sketch.hashes.len(),
            self.params.kmer_size,
            self.params.sketch_size
        );
        SketchFile {
            params: self.params,
            sketches: vec![sketch],
        }
        .save(output)
    }

    fn paste(&self, sketches: &[PathBuf], output: &Path) -> Result<(), EtdError> {
        let mut combined = SketchFile {
            params: self.params,
            sketches: Vec::with_capacity(sketches.len()),
        };
        for path in sketches {
            let file = SketchFile::load(path)?;
            self.check_params(file.params)?;
            combined.sketches.extend(file.sketches);
        }
        combined.save(output)
    }

    fn distance(&self, reference: &Path, query: &Path) -> Result<String, EtdError> {
        let reference = SketchFile::load(reference)?;
        self.check_params(reference.params)?;
        let queries = self.load_query(query)?;

        let mut table = String::from("#query");
        for q in &queries {
            let _ = write!(table, "\t{}", q.name);
        }
        table.push('\n');
        for r in &reference.sketches {
            table.push_str(&r.name);
            for q in &queries {
                let d = mash_distance(r, q, self.params.kmer_size, self.params.sketch_size);
                let _ = write!(table, "\t{:.6}", d);
            }
            table.push('\n');
        }
        Ok(table)
    }
}
