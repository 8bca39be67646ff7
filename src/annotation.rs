//! Gene-call tables normalised across detector output versions.
//!
//! Detector releases disagree on column names (`ARO` vs `ARO Accession`,
//! `Best_Hit_ARO` vs `Name`, ...) and on whether accessions carry an `ARO:`
//! prefix. Loading maps all of them onto one [`AnnotationRecord`] keyed by
//! the bare accession.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use serde::Serialize;

use crate::{
    errors::{DuplicateRecordWarning, EtdError},
    utils::get_input_reader,
};

const GENE_ID_COLUMNS: [&str; 2] = ["aro", "aro_accession"];
const NAME_COLUMNS: [&str; 3] = ["best_hit_aro", "name", "gene"];
const SEQUENCE_COLUMNS: [&str; 2] = ["predicted_dna", "predicted_nucleotide"];
const CUT_OFF_COLUMNS: [&str; 3] = ["cut_off", "criteria", "rgi_criteria"];
const IDENTITY_COLUMNS: [&str; 2] = ["best_identities", "identity"];
const COVERAGE_COLUMNS: [&str; 2] = ["percentage_length_of_reference_sequence", "coverage"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotationRecord {
    /// Stable gene accession without any `ARO:` prefix.
    pub gene_id: String,
    /// Display name; not unique across genes or database versions.
    pub name: String,
    pub sequence: String,
    pub cut_off: Option<String>,
    pub identity: Option<f64>,
    pub coverage: Option<f64>,
}

/// First record for an accession plus, when it repeats, the warning to report.
#[derive(Debug)]
pub struct UniqueLookup<'a> {
    pub record: &'a AnnotationRecord,
    pub duplicate: Option<DuplicateRecordWarning>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationTable {
    pub genome_id: String,
    pub source: PathBuf,
    pub records: Vec<AnnotationRecord>,
}

/// `ARO:3000026` and ` 3000026 ` both become `3000026`.
pub fn normalize_gene_id(raw: &str) -> String {
    let trimmed = raw.trim();
    let bare = trimmed
        .strip_prefix("ARO:")
        .or_else(|| trimmed.strip_prefix("aro:"))
        .unwrap_or(trimmed);
    bare.trim().to_string()
}

fn normalize_header(raw: &str) -> String {
    raw.trim().to_lowercase().replace([' ', '-'], "_")
}

fn find_column(headers: &[String], aliases: &[&str]) -> Option<usize> {
    aliases
        .iter()
        .find_map(|alias| headers.iter().position(|h| h == alias))
}

impl AnnotationTable {
    pub fn from_records(genome_id: impl Into<String>, records: Vec<AnnotationRecord>) -> Self {
        AnnotationTable {
            genome_id: genome_id.into(),
            source: PathBuf::new(),
            records,
        }
    }

    /// Parses a tab-delimited gene-call file (optionally compressed).
    pub fn load(path: &Path, genome_id: impl Into<String>) -> Result<Self, EtdError> {
        let genome_id = genome_id.into();
        let malformed = |reason: String| EtdError::MalformedTable {
            path: path.to_path_buf(),
            reason,
        };

        let reader = get_input_reader(path)?;
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(|e| malformed(e.to_string()))?
            .iter()
            .map(normalize_header)
            .collect();

        let gene_col = find_column(&headers, &GENE_ID_COLUMNS);
        let name_col = find_column(&headers, &NAME_COLUMNS);
        let seq_col = find_column(&headers, &SEQUENCE_COLUMNS);
        let (Some(gene_col), Some(name_col), Some(seq_col)) = (gene_col, name_col, seq_col) else {
            let mut absent = Vec::new();
            if gene_col.is_none() {
                absent.push("gene accession");
            }
            if name_col.is_none() {
                absent.push("display name");
            }
            if seq_col.is_none() {
                absent.push("predicted sequence");
            }
            return Err(malformed(format!("missing required column(s): {}", absent.join(", "))));
        };
        let cut_off_col = find_column(&headers, &CUT_OFF_COLUMNS);
        let identity_col = find_column(&headers, &IDENTITY_COLUMNS);
        let coverage_col = find_column(&headers, &COVERAGE_COLUMNS);

        let mut records = Vec::new();
        for (i, row) in csv_reader.records().enumerate() {
            let row = row.map_err(|e| malformed(e.to_string()))?;
            let field = |col: usize| row.get(col).map(str::trim).unwrap_or("");
            let gene_id = normalize_gene_id(field(gene_col));
            if gene_id.is_empty() {
                return Err(malformed(format!("row {} has no gene accession", i + 2)));
            }
            let optional = |col: Option<usize>| {
                col.map(field)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            };
            records.push(AnnotationRecord {
                gene_id,
                name: field(name_col).to_string(),
                sequence: field(seq_col).to_string(),
                cut_off: optional(cut_off_col),
                identity: optional(identity_col).and_then(|v| v.parse().ok()),
                coverage: optional(coverage_col).and_then(|v| v.parse().ok()),
            });
        }

        debug!(
            "Loaded {} gene calls for {} from {:?}",
            records.len(),
            genome_id,
            path
        );
        Ok(AnnotationTable {
            genome_id,
            source: path.to_path_buf(),
            records,
        })
    }

    pub fn gene_ids(&self) -> BTreeSet<String> {
        self.records.iter().map(|r| r.gene_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First record (in file order) with this accession. Repeats are logged
    /// and returned as a [`DuplicateRecordWarning`], never as an error.
    pub fn lookup_unique(&self, gene_id: &str) -> Option<UniqueLookup<'_>> {
        let mut matches = self.records.iter().filter(|r| r.gene_id == gene_id);
        let record = matches.next()?;
        let extra = matches.count();
        let duplicate = (extra > 0).then(|| {
            let warning = DuplicateRecordWarning {
                gene_id: gene_id.to_string(),
                occurrences: extra + 1,
            };
            warn!("{}: {}", self.genome_id, warning);
            warning
        });
        Some(UniqueLookup { record, duplicate })
    }
}
