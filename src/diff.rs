//! Gene-set differences between an isolate and its nearest relatives.
//!
//! Genes are compared by accession, never by display name: one display name
//! can cover several accessions and a name can change between releases.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};
use serde::Serialize;

use crate::{annotation::AnnotationTable, errors::DuplicateRecordWarning};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UniqueGene {
    pub name: String,
    pub sequence: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GeneDifference {
    pub unique_to_isolate: BTreeSet<String>,
    pub missing_from_isolate: BTreeSet<String>,
    /// Name and predicted sequence for every accession in `unique_to_isolate`.
    pub sequences: BTreeMap<String, UniqueGene>,
    pub duplicate_warnings: Vec<DuplicateRecordWarning>,
}

/// Compares the isolate's calls with the union of all neighbour calls.
///
/// With no neighbours every isolate gene is unique and nothing is missing;
/// deciding whether that is meaningful is up to the caller.
pub fn diff(
    query: &AnnotationTable,
    neighbors: &BTreeMap<String, AnnotationTable>,
) -> GeneDifference {
    info!("Determining differences in gene calls for {}", query.genome_id);

    let in_query = query.gene_ids();
    let in_relatives: BTreeSet<String> = neighbors
        .values()
        .flat_map(|table| table.records.iter().map(|r| r.gene_id.clone()))
        .collect();

    let unique_to_isolate: BTreeSet<String> =
        in_query.difference(&in_relatives).cloned().collect();
    let missing_from_isolate: BTreeSet<String> =
        in_relatives.difference(&in_query).cloned().collect();

    info!(
        "Unique genes in isolate compared to {} relatives: {:?}",
        neighbors.len(),
        unique_to_isolate
    );
    debug!("Genes missing from isolate: {:?}", missing_from_isolate);

    let mut sequences = BTreeMap::new();
    let mut duplicate_warnings = Vec::new();
    for gene_id in &unique_to_isolate {
        // every id in unique_to_isolate came from the query table
        if let Some(hit) = query.lookup_unique(gene_id) {
            sequences.insert(
                gene_id.clone(),
                UniqueGene {
                    name: hit.record.name.clone(),
                    sequence: hit.record.sequence.clone(),
                },
            );
            duplicate_warnings.extend(hit.duplicate);
        }
    }

    GeneDifference {
        unique_to_isolate,
        missing_from_isolate,
        sequences,
        duplicate_warnings,
    }
}
