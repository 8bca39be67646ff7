//! Staged, resumable construction of the reference database.
//!
//! Layout under the database directory:
//!
//! ```text
//! genomes/        <taxon>.tar.gz archives or extracted <taxon>/ folders of FASTA
//! rgi_results/    paired gene-call archives/folders ("FASTA" -> "NCBI" in the name)
//! etd_db/         genome_sketches/<taxon>/, genome_trees/<taxon>.tree,
//!                 card_prev.msh, etd_db_index.json
//! phylo/          reference placement packages and index.tsv
//! index/          prevalence table (index-for-model-sequences.txt)
//! ```
//!
//! Every stage leaves its output on disk and is skipped when that output is
//! already present, so a failed build can simply be re-run. The directory is
//! assumed to have a single writer.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

use flate2::read::GzDecoder;
use log::{debug, info, warn};

use crate::{
    db_types::{DatabaseIndex, GenomeSketch, IndexEntry, SketchBackend},
    errors::EtdError,
    sketch::SketchStore,
    tools::{Sketcher, TreeBuilder},
    utils::{GENOME_EXTENSIONS, accession_from_path, ensure_dir, list_files_with_extensions},
};

pub const GENE_CALL_EXTENSIONS: [&str; 2] = ["json", "txt"];
const ARCHIVE_SUFFIX: &str = ".tar.gz";

#[derive(Debug, Clone)]
pub struct DatabaseLayout {
    pub root: PathBuf,
}

impl DatabaseLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DatabaseLayout { root: root.into() }
    }

    pub fn genomes_dir(&self) -> PathBuf {
        self.root.join("genomes")
    }

    pub fn gene_calls_dir(&self) -> PathBuf {
        self.root.join("rgi_results")
    }

    pub fn etd_db_dir(&self) -> PathBuf {
        self.root.join("etd_db")
    }

    pub fn sketch_dir(&self) -> PathBuf {
        self.etd_db_dir().join("genome_sketches")
    }

    pub fn tree_dir(&self) -> PathBuf {
        self.etd_db_dir().join("genome_trees")
    }

    pub fn tree_path(&self, taxon: &str) -> PathBuf {
        self.tree_dir().join(format!("{}.tree", taxon))
    }

    pub fn combined_sketch_path(&self) -> PathBuf {
        self.etd_db_dir().join("card_prev.msh")
    }

    pub fn index_path(&self) -> PathBuf {
        self.etd_db_dir().join("etd_db_index.json")
    }

    pub fn phylo_dir(&self) -> PathBuf {
        self.root.join("phylo")
    }

    pub fn phylo_index_path(&self) -> PathBuf {
        self.phylo_dir().join("index.tsv")
    }

    pub fn prevalence_table_path(&self) -> PathBuf {
        self.root.join("index").join("index-for-model-sequences.txt")
    }
}

/// Where a database directory stands before a build.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildState {
    /// No index and no intermediate artifacts.
    NoIndex,
    /// No index, but sketches from an interrupted build are present.
    Building,
    Built(DatabaseIndex),
    /// An index exists but cannot be trusted.
    Invalid { reason: String },
}

/// One taxon's raw inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonInput {
    pub name: String,
    pub genome_dir: PathBuf,
    pub gene_call_dir: Option<PathBuf>,
}

/// A genome with a matching gene-call file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedGenome {
    pub accession: String,
    pub genome: PathBuf,
    pub gene_calls: PathBuf,
}

/// Unpacks a `.tar.gz` into `dest` via a scratch directory, so an
/// interrupted extraction is never mistaken for a finished one.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<(), EtdError> {
    let mut scratch = dest.as_os_str().to_owned();
    scratch.push(".partial");
    let scratch = PathBuf::from(scratch);
    if scratch.exists() {
        fs::remove_dir_all(&scratch)?;
    }
    fs::create_dir_all(&scratch)?;

    info!("Extracting {:?} to {:?}", archive, dest);
    let decoder = GzDecoder::new(File::open(archive)?);
    tar::Archive::new(decoder).unpack(&scratch)?;
    fs::rename(&scratch, dest)?;
    Ok(())
}

fn strip_archive_suffix(name: &str) -> Option<&str> {
    name.strip_suffix(ARCHIVE_SUFFIX)
}

/// The gene-call folder name paired with a genome folder name.
pub fn paired_gene_call_name(genome_folder: &str) -> String {
    genome_folder.replace("FASTA", "NCBI")
}

/// Finds taxon folders under `genomes/`, extracting archives that have not
/// been extracted yet, and their paired gene-call folders. Sorted by name.
pub fn discover_taxa(layout: &DatabaseLayout) -> Result<Vec<TaxonInput>, EtdError> {
    let genomes_dir = layout.genomes_dir();
    if !genomes_dir.is_dir() {
        return Err(EtdError::MissingInput(genomes_dir));
    }

    let mut names = BTreeSet::new();
    for entry in fs::read_dir(&genomes_dir)? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if path.is_dir() {
            if !file_name.ends_with(".partial") {
                names.insert(file_name);
            }
        } else if let Some(stem) = strip_archive_suffix(&file_name) {
            let folder = genomes_dir.join(stem);
            if !folder.exists() {
                extract_archive(&path, &folder)?;
            }
            names.insert(stem.to_string());
        }
    }

    let mut taxa = Vec::with_capacity(names.len());
    for name in names {
        let gene_call_name = paired_gene_call_name(&name);
        let gene_call_dir = layout.gene_calls_dir().join(&gene_call_name);
        let gene_call_archive = layout
            .gene_calls_dir()
            .join(format!("{}{}", gene_call_name, ARCHIVE_SUFFIX));

        if gene_call_dir.exists() {
            debug!("Gene calls already extracted: {:?}", gene_call_dir);
        } else if gene_call_archive.exists() {
            extract_archive(&gene_call_archive, &gene_call_dir)?;
        }

        let gene_call_dir = if gene_call_dir.is_dir() {
            Some(gene_call_dir)
        } else {
            warn!("No gene-call results found for taxon {}", name);
            None
        };
        taxa.push(TaxonInput {
            genome_dir: layout.genomes_dir().join(&name),
            name,
            gene_call_dir,
        });
    }
    Ok(taxa)
}

/// Matches genome files with gene-call files by accession; accessions on
/// only one side are logged and left out.
pub fn pair_genomes(taxon: &TaxonInput) -> Result<Vec<PairedGenome>, EtdError> {
    let genomes: BTreeMap<String, PathBuf> =
        list_files_with_extensions(&taxon.genome_dir, &GENOME_EXTENSIONS)?
            .into_iter()
            .map(|p| (accession_from_path(&p.to_string_lossy()), p))
            .collect();
    let gene_calls: BTreeMap<String, PathBuf> = match &taxon.gene_call_dir {
        Some(dir) => list_files_with_extensions(dir, &GENE_CALL_EXTENSIONS)?
            .into_iter()
            .map(|p| (accession_from_path(&p.to_string_lossy()), p))
            .collect(),
        None => BTreeMap::new(),
    };

    let calls_only: Vec<&String> = gene_calls.keys().filter(|a| !genomes.contains_key(*a)).collect();
    if !calls_only.is_empty() {
        warn!(
            "{} genomes missing in {:?}: {:?}",
            calls_only.len(),
            taxon.genome_dir,
            calls_only
        );
    }
    let genomes_only: Vec<&String> = genomes.keys().filter(|a| !gene_calls.contains_key(*a)).collect();
    if !genomes_only.is_empty() {
        warn!(
            "{} gene-call results missing for taxon {}: {:?}",
            genomes_only.len(),
            taxon.name,
            genomes_only
        );
    }

    Ok(genomes
        .into_iter()
        .filter_map(|(accession, genome)| {
            gene_calls.get(&accession).map(|calls| PairedGenome {
                gene_calls: calls.clone(),
                accession,
                genome,
            })
        })
        .collect())
}

pub fn load_index(path: &Path) -> Result<DatabaseIndex, EtdError> {
    if !path.exists() {
        return Err(EtdError::MissingInput(path.to_path_buf()));
    }
    let file = File::open(path)?;
    Ok(serde_json::from_reader(file)?)
}

/// The index a query run may use: it must exist and everything it names
/// must still be on disk.
pub fn load_validated_index(layout: &DatabaseLayout) -> Result<DatabaseIndex, EtdError> {
    let index = load_index(&layout.index_path())?;
    let missing = index.missing_artifacts();
    if !missing.is_empty() {
        return Err(EtdError::IndexValidation { missing });
    }
    Ok(index)
}

fn write_index(index: &DatabaseIndex, path: &Path) -> Result<(), EtdError> {
    let tmp = path.with_extension("json.tmp");
    {
        let writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(writer, index)?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

pub struct DatabaseBuilder<'a> {
    layout: DatabaseLayout,
    sketcher: &'a dyn Sketcher,
    tree_builder: &'a dyn TreeBuilder,
}

impl<'a> DatabaseBuilder<'a> {
    pub fn new(
        layout: DatabaseLayout,
        sketcher: &'a dyn Sketcher,
        tree_builder: &'a dyn TreeBuilder,
    ) -> Self {
        DatabaseBuilder {
            layout,
            sketcher,
            tree_builder,
        }
    }

    pub fn layout(&self) -> &DatabaseLayout {
        &self.layout
    }

    pub fn state(&self) -> BuildState {
        let index_path = self.layout.index_path();
        if !index_path.exists() {
            let sketch_dir = self.layout.sketch_dir();
            let partial = fs::read_dir(&sketch_dir)
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false);
            return if partial {
                BuildState::Building
            } else {
                BuildState::NoIndex
            };
        }

        let index = match load_index(&index_path) {
            Ok(index) => index,
            Err(e) => {
                return BuildState::Invalid {
                    reason: format!("unreadable index: {}", e),
                };
            }
        };
        let missing = index.missing_artifacts();
        if !missing.is_empty() {
            for path in &missing {
                warn!("Indexed artifact missing: {:?}", path);
            }
            return BuildState::Invalid {
                reason: EtdError::IndexValidation { missing }.to_string(),
            };
        }
        if index.sketch_params != self.sketcher.params() {
            return BuildState::Invalid {
                reason: EtdError::SketchParamsMismatch(
                    index.sketch_params.to_string(),
                    self.sketcher.params().to_string(),
                )
                .to_string(),
            };
        }
        BuildState::Built(index)
    }

    /// Returns a valid index, building or rebuilding it when needed.
    /// `force` discards an otherwise valid index.
    pub fn prepare(&self, force: bool) -> Result<DatabaseIndex, EtdError> {
        let index_path = self.layout.index_path();
        match self.state() {
            BuildState::Built(index) if !force => {
                info!(
                    "Using pre-existing index (use --force to rebuild): {:?}",
                    index_path
                );
                return Ok(index);
            }
            BuildState::Built(_) => {
                info!("Forced rebuild: removing {:?}", index_path);
                self.discard_outputs()?;
            }
            BuildState::Invalid { reason } => {
                warn!("Index incomplete ({}): removing and rebuilding", reason);
                self.discard_outputs()?;
            }
            BuildState::Building => {
                info!("Resuming interrupted build in {:?}", self.layout.etd_db_dir());
            }
            BuildState::NoIndex => {
                info!("No database found ({:?}): building", index_path);
            }
        }
        self.build()
    }

    /// Removes the index and the trees built from the previous corpus.
    /// Sketches left by an interrupted build are kept.
    fn discard_outputs(&self) -> Result<(), EtdError> {
        let index_path = self.layout.index_path();
        if index_path.exists() {
            fs::remove_file(&index_path)?;
        }
        let tree_dir = self.layout.tree_dir();
        if tree_dir.exists() {
            debug!("Removing previous trees in {:?}", tree_dir);
            fs::remove_dir_all(&tree_dir)?;
        }
        Ok(())
    }

    fn build(&self) -> Result<DatabaseIndex, EtdError> {
        ensure_dir(&self.layout.etd_db_dir())?;
        ensure_dir(&self.layout.tree_dir())?;

        let taxa = discover_taxa(&self.layout)?;
        if taxa.is_empty() {
            return Err(EtdError::EmptyInput(format!(
                "no taxon folders or archives in {:?}",
                self.layout.genomes_dir()
            )));
        }
        info!("Found {} taxa", taxa.len());

        let store = SketchStore::new(self.sketcher);
        let mut index = DatabaseIndex::new(self.sketcher.params(), self.layout.combined_sketch_path());
        let mut all_sketches: Vec<GenomeSketch> = Vec::new();

        for taxon in &taxa {
            let mut paired = pair_genomes(taxon)?;
            if paired.is_empty() {
                warn!("Taxon {} has no genomes with gene calls; skipping", taxon.name);
                continue;
            }
            paired.retain(|genome| match index.accessions.get(&genome.accession) {
                Some(entry) => {
                    warn!(
                        "Accession {} in taxon {} already indexed under {}; keeping the first",
                        genome.accession, taxon.name, entry.taxon
                    );
                    false
                }
                None => true,
            });
            if paired.is_empty() {
                warn!("Taxon {} has no genomes left after removing duplicates; skipping", taxon.name);
                continue;
            }
            let (sketches, tree) = self.build_taxon(&store, taxon, &paired)?;

            for genome in paired {
                index.add_accession(
                    genome.accession,
                    IndexEntry {
                        taxon: taxon.name.clone(),
                        gene_calls: genome.gene_calls,
                        phylogeny: tree.clone(),
                    },
                );
            }
            all_sketches.extend(sketches);
        }

        let reference = store.combine(&all_sketches, &self.layout.combined_sketch_path())?;
        index.reference_index = reference.path;
        write_index(&index, &self.layout.index_path())?;
        info!(
            "Database index written to {:?} ({} genomes)",
            self.layout.index_path(),
            index.num_accessions()
        );
        Ok(index)
    }

    fn build_taxon(
        &self,
        store: &SketchStore<'_>,
        taxon: &TaxonInput,
        paired: &[PairedGenome],
    ) -> Result<(Vec<GenomeSketch>, PathBuf), EtdError> {
        let genomes: Vec<(String, PathBuf)> = paired
            .iter()
            .map(|g| (g.accession.clone(), g.genome.clone()))
            .collect();
        let sketches = store.sketch_all(
            &taxon.name,
            &genomes,
            &self.layout.sketch_dir().join(&taxon.name),
        )?;

        let tree = self.layout.tree_path(&taxon.name);
        if tree.exists() {
            info!("Tree for taxon {} already exists: {:?}", taxon.name, tree);
        } else {
            // mashtree reads mash sketches directly; for other backends give it genomes
            let inputs: Vec<PathBuf> = match self.sketcher.params().backend {
                SketchBackend::Mash => sketches.iter().map(|s| s.path.clone()).collect(),
                SketchBackend::Native => genomes.iter().map(|(_, g)| g.clone()).collect(),
            };
            info!("Building tree for taxon {} from {} genomes", taxon.name, inputs.len());
            self.tree_builder.build_tree(&inputs, &tree)?;
        }
        Ok((sketches, tree))
    }
}
