//! Context for genes unique to an isolate: where else the gene has been seen
//! (plasmid vs chromosome, by species) and which reference phylogeny it can
//! be placed on.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use log::debug;
use serde::Serialize;

use crate::{annotation::normalize_gene_id, errors::EtdError, utils::get_input_reader};

const PERFECT: &str = "perfect";
const PLASMID: &str = "ncbi_plasmid";
const CHROMOSOME: &str = "ncbi_chromosome";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct GenomicContext {
    /// Distinct species, first-seen order.
    pub found_in_plasmids: Vec<String>,
    pub found_in_chromosomes: Vec<String>,
}

#[derive(Debug, Clone)]
struct PrevalenceRow {
    gene_id: String,
    criteria: String,
    data_type: String,
    species: String,
}

/// The prevalence model-sequence index, loaded once per run.
#[derive(Debug, Clone)]
pub struct PrevalenceTable {
    rows: Vec<PrevalenceRow>,
}

fn column(headers: &csv::StringRecord, name: &str, path: &Path) -> Result<usize, EtdError> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
        .ok_or_else(|| EtdError::MalformedTable {
            path: path.to_path_buf(),
            reason: format!("missing column '{}'", name),
        })
}

impl PrevalenceTable {
    pub fn load(path: &Path) -> Result<Self, EtdError> {
        let malformed = |e: csv::Error| EtdError::MalformedTable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_reader(get_input_reader(path)?);

        let headers = reader.headers().map_err(malformed)?.clone();
        let gene_col = column(&headers, "aro_accession", path)?;
        let criteria_col = column(&headers, "rgi_criteria", path)?;
        let type_col = column(&headers, "data_type", path)?;
        let species_col = column(&headers, "species_name", path)?;

        let mut rows = Vec::new();
        for row in reader.records() {
            let row = row.map_err(malformed)?;
            let get = |i: usize| row.get(i).unwrap_or("").trim().to_string();
            rows.push(PrevalenceRow {
                gene_id: normalize_gene_id(&get(gene_col)),
                criteria: get(criteria_col).to_lowercase(),
                data_type: get(type_col).to_lowercase(),
                species: get(species_col),
            });
        }
        debug!("Loaded {} prevalence rows from {:?}", rows.len(), path);
        Ok(PrevalenceTable { rows })
    }

    /// Species carrying a perfect hit to `gene_id`, split by replicon type.
    pub fn context(&self, gene_id: &str) -> GenomicContext {
        let mut context = GenomicContext::default();
        for row in self
            .rows
            .iter()
            .filter(|r| r.gene_id == gene_id && r.criteria == PERFECT)
        {
            let bucket = match row.data_type.as_str() {
                PLASMID => &mut context.found_in_plasmids,
                CHROMOSOME => &mut context.found_in_chromosomes,
                _ => continue,
            };
            if !bucket.contains(&row.species) {
                bucket.push(row.species.clone());
            }
        }
        context
    }
}

/// Gene accession -> reference placement package directory.
#[derive(Debug, Clone, Default)]
pub struct PhyloIndex {
    packages: BTreeMap<String, PathBuf>,
}

impl PhyloIndex {
    /// Reads a two-column `accession<TAB>package` file. Relative package
    /// paths are resolved against the index file's directory.
    pub fn load(path: &Path) -> Result<Self, EtdError> {
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .from_reader(get_input_reader(path)?);

        let mut packages = BTreeMap::new();
        for (i, row) in reader.records().enumerate() {
            let row = row.map_err(|e| EtdError::MalformedTable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            let (Some(gene), Some(package)) = (row.get(0), row.get(1)) else {
                return Err(EtdError::MalformedTable {
                    path: path.to_path_buf(),
                    reason: format!("line {} needs an accession and a package path", i + 1),
                });
            };
            packages.insert(normalize_gene_id(gene), base.join(package.trim()));
        }
        Ok(PhyloIndex { packages })
    }

    pub fn package_for(&self, gene_id: &str) -> Option<&Path> {
        self.packages.get(gene_id).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn context_splits_perfect_hits_by_replicon() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index-for-model-sequences.txt");
        fs::write(
            &path,
            "prevalence_sequence_id\taro_accession\trgi_criteria\tdata_type\tspecies_name\n\
             1\tARO:3003689\tPerfect\tncbi_plasmid\tEscherichia coli\n\
             2\tARO:3003689\tPerfect\tncbi_plasmid\tEscherichia coli\n\
             3\tARO:3003689\tPerfect\tncbi_chromosome\tKlebsiella pneumoniae\n\
             4\tARO:3003689\tStrict\tncbi_plasmid\tSalmonella enterica\n\
             5\tARO:3003689\tPerfect\tncbi_plasmid\tEnterobacter cloacae\n\
             6\tARO:3000001\tPerfect\tncbi_plasmid\tAcinetobacter baumannii\n",
        )
        .unwrap();
        let table = PrevalenceTable::load(&path).unwrap();

        let ctx = table.context("3003689");
        assert_eq!(ctx.found_in_plasmids, ["Escherichia coli", "Enterobacter cloacae"]);
        assert_eq!(ctx.found_in_chromosomes, ["Klebsiella pneumoniae"]);
        assert_eq!(table.context("9999999"), GenomicContext::default());
    }

    #[test]
    fn prevalence_without_required_columns_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.txt");
        fs::write(&path, "aro_accession\tspecies_name\nARO:1\tE. coli\n").unwrap();
        let err = PrevalenceTable::load(&path).unwrap_err();
        assert!(err.to_string().contains("rgi_criteria"));
    }

    #[test]
    fn phylo_index_resolves_relative_packages() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.tsv");
        fs::write(&path, "# accession\tpackage\nARO:3003689\tmcr.refpkg\n").unwrap();
        let index = PhyloIndex::load(&path).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.package_for("3003689"),
            Some(dir.path().join("mcr.refpkg").as_path())
        );
    }
}
