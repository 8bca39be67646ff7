//! Query-vs-reference distances and nearest-neighbour selection.

use std::{collections::HashSet, fs, path::Path};

use log::{debug, info};
use serde::Serialize;

use crate::{
    db_types::{GenomeSketch, ReferenceIndex},
    errors::EtdError,
    tools::Sketcher,
    utils::accession_from_path,
};

pub const DEFAULT_MAX_RELATIVES: usize = 10;
pub const DEFAULT_MASH_DISTANCE: f64 = 0.02;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceRecord {
    pub genome_id: String,
    pub distance: f64,
}

/// Nearest references, ascending by distance, all within `threshold`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeighborSet {
    pub threshold: f64,
    pub neighbors: Vec<DistanceRecord>,
}

impl NeighborSet {
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn genome_ids(&self) -> Vec<&str> {
        self.neighbors.iter().map(|n| n.genome_id.as_str()).collect()
    }
}

/// Parses a `mash dist -t` style table: a `#query ...` header, then one row
/// per reference with its distance to the first query in the second column.
/// Reference identifiers are reduced to accessions.
pub fn parse_distance_table(table: &str, source: &Path) -> Result<Vec<DistanceRecord>, EtdError> {
    let malformed = |reason: String| EtdError::MalformedTable {
        path: source.to_path_buf(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_reader(table.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| malformed(e.to_string()))?
        .clone();
    if headers.len() < 2 {
        return Err(malformed(format!(
            "expected a header with at least one query column, got {:?}",
            headers
        )));
    }

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row.map_err(|e| malformed(e.to_string()))?;
        let (Some(reference), Some(value)) = (row.get(0), row.get(1)) else {
            return Err(malformed(format!("row {} has fewer than two columns", line + 2)));
        };
        if reference.trim().is_empty() {
            continue;
        }
        let distance: f64 = value
            .trim()
            .parse()
            .map_err(|_| malformed(format!("row {}: '{}' is not a distance", line + 2, value)))?;
        if !(0.0..=1.0).contains(&distance) {
            return Err(malformed(format!(
                "row {}: distance {} outside [0, 1]",
                line + 2,
                distance
            )));
        }
        records.push(DistanceRecord {
            genome_id: accession_from_path(reference),
            distance,
        });
    }
    Ok(records)
}

/// Filters to `distance <= threshold`, sorts by distance then genome id,
/// and keeps at most `max_results`. A reference listed twice keeps its
/// closest entry.
pub fn select_neighbors(
    mut records: Vec<DistanceRecord>,
    threshold: f64,
    max_results: usize,
) -> NeighborSet {
    records.retain(|r| r.distance <= threshold);
    records.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.genome_id.cmp(&b.genome_id))
    });

    let mut seen = HashSet::new();
    let neighbors: Vec<DistanceRecord> = records
        .into_iter()
        .filter(|r| seen.insert(r.genome_id.clone()))
        .take(max_results)
        .collect();

    NeighborSet {
        threshold,
        neighbors,
    }
}

/// Rejects a threshold outside `[0, 1]` or a neighbour cap outside
/// `1..=DEFAULT_MAX_RELATIVES`.
pub fn check_selection(threshold: f64, max_results: usize) -> Result<(), EtdError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(EtdError::InvalidArgument(format!(
            "distance threshold {} outside [0, 1]",
            threshold
        )));
    }
    if !(1..=DEFAULT_MAX_RELATIVES).contains(&max_results) {
        return Err(EtdError::InvalidArgument(format!(
            "max relatives {} outside 1..={}",
            max_results, DEFAULT_MAX_RELATIVES
        )));
    }
    Ok(())
}

pub struct DistanceRanker<'a> {
    sketcher: &'a dyn Sketcher,
}

impl<'a> DistanceRanker<'a> {
    pub fn new(sketcher: &'a dyn Sketcher) -> Self {
        DistanceRanker { sketcher }
    }

    /// One batch comparison of `query` against every genome in `reference`.
    /// The raw table is kept at `table_out` when given.
    pub fn distances(
        &self,
        query: &GenomeSketch,
        reference: &ReferenceIndex,
        table_out: Option<&Path>,
    ) -> Result<Vec<DistanceRecord>, EtdError> {
        if query.params != reference.params {
            return Err(EtdError::SketchParamsMismatch(
                reference.params.to_string(),
                query.params.to_string(),
            ));
        }
        if !reference.path.exists() {
            return Err(EtdError::MissingInput(reference.path.clone()));
        }

        let table = self.sketcher.distance(&reference.path, &query.path)?;
        if let Some(out) = table_out {
            fs::write(out, &table)?;
            debug!("Distance table written to {:?}", out);
        }
        parse_distance_table(&table, table_out.unwrap_or(&reference.path))
    }

    pub fn rank(
        &self,
        query: &GenomeSketch,
        reference: &ReferenceIndex,
        threshold: f64,
        max_results: usize,
        table_out: Option<&Path>,
    ) -> Result<NeighborSet, EtdError> {
        check_selection(threshold, max_results)?;
        let records = self.distances(query, reference, table_out)?;
        let total = records.len();
        let neighbors = select_neighbors(records, threshold, max_results);
        info!(
            "{} of {} reference genomes within distance {} (keeping {})",
            neighbors.len(),
            total,
            threshold,
            max_results
        );
        debug!("Closest relatives found: {:?}", neighbors.genome_ids());
        Ok(neighbors)
    }
}
