//! A query run: detect genes on the isolate, find its nearest relatives in the
//! reference database and report the genes that set it apart.

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    annotation::AnnotationTable,
    context::RunContext,
    database::{DatabaseLayout, load_validated_index},
    db_types::DatabaseIndex,
    diff::{GeneDifference, diff},
    distance::{DEFAULT_MASH_DISTANCE, DEFAULT_MAX_RELATIVES, DistanceRanker, NeighborSet, check_selection},
    errors::EtdError,
    prevalence::{GenomicContext, PhyloIndex, PrevalenceTable},
    sketch::SketchStore,
    tools::{GeneDetector, PlacementOutputs, Placer, Sketcher},
    utils::get_output_writer,
};

pub const QUERY_SKETCH_ID: &str = "query";

/// The collaborators a query run drives.
pub struct Toolkit {
    pub sketcher: Box<dyn Sketcher>,
    pub detector: Box<dyn GeneDetector>,
    pub placer: Box<dyn Placer>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryOptions {
    pub threshold: f64,
    pub max_relatives: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            threshold: DEFAULT_MASH_DISTANCE,
            max_relatives: DEFAULT_MAX_RELATIVES,
        }
    }
}

/// Everything a run found, as written to `report.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_name: String,
    pub input: PathBuf,
    /// False when no reference genome was close enough to compare against.
    pub differencing_possible: bool,
    pub relatives: NeighborSet,
    pub genes: GeneDifference,
    pub genomic_context: BTreeMap<String, GenomicContext>,
    pub placements: BTreeMap<String, PlacementOutputs>,
}

/// Gene-call tables for every neighbour, resolved through the index.
pub fn load_neighbor_tables(
    index: &DatabaseIndex,
    neighbors: &NeighborSet,
) -> Result<BTreeMap<String, AnnotationTable>, EtdError> {
    let mut tables = BTreeMap::new();
    for accession in neighbors.genome_ids() {
        let entry = index
            .accessions
            .get(accession)
            .ok_or_else(|| EtdError::MissingInput(PathBuf::from(accession)))?;
        debug!("Loading gene calls for {} ({})", accession, entry.taxon);
        tables.insert(
            accession.to_string(),
            AnnotationTable::load(&entry.gene_calls, accession)?,
        );
    }
    Ok(tables)
}

fn write_relatives(neighbors: &NeighborSet, path: &Path) -> Result<(), EtdError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(File::create(path)?);
    let to_err = |e: csv::Error| EtdError::Serialization(e.to_string());
    writer.write_record(["accession", "distance"]).map_err(to_err)?;
    for n in &neighbors.neighbors {
        let distance = n.distance.to_string();
        writer
            .write_record([n.genome_id.as_str(), distance.as_str()])
            .map_err(to_err)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_unique_genes(genes: &GeneDifference, path: &Path) -> Result<(), EtdError> {
    let mut writer = get_output_writer(path)?;
    for (accession, gene) in &genes.sequences {
        writeln!(writer, ">{} {}", accession, gene.name)?;
        writeln!(writer, "{}", gene.sequence)?;
    }
    writer.flush()?;
    Ok(())
}

fn genomic_context(
    layout: &DatabaseLayout,
    genes: &GeneDifference,
) -> Result<BTreeMap<String, GenomicContext>, EtdError> {
    let path = layout.prevalence_table_path();
    if !path.exists() {
        info!("No prevalence table at {:?}; skipping genomic context", path);
        return Ok(BTreeMap::new());
    }
    let table = PrevalenceTable::load(&path)?;
    Ok(genes
        .unique_to_isolate
        .iter()
        .map(|id| (id.clone(), table.context(id)))
        .collect())
}

fn place_unique_genes(
    ctx: &RunContext,
    layout: &DatabaseLayout,
    genes: &GeneDifference,
    placer: &dyn Placer,
) -> Result<BTreeMap<String, PlacementOutputs>, EtdError> {
    let index_path = layout.phylo_index_path();
    if !index_path.exists() {
        info!("No phylogeny index at {:?}; skipping placement", index_path);
        return Ok(BTreeMap::new());
    }
    let phylo = PhyloIndex::load(&index_path)?;

    let mut placements = BTreeMap::new();
    for (accession, gene) in &genes.sequences {
        let Some(package) = phylo.package_for(accession) else {
            info!("No reference phylogeny for {} ({})", accession, gene.name);
            continue;
        };
        let gene_dir = ctx.stage_dir(&format!("genes/{}", accession))?;
        let candidate = gene_dir.join("candidate.fasta");
        fs::write(&candidate, format!(">{}\n{}\n", accession, gene.sequence))?;

        info!("Placing {} ({}) on {:?}", accession, gene.name, package);
        placements.insert(accession.clone(), placer.place(package, &candidate, &gene_dir)?);
    }
    Ok(placements)
}

/// Runs the whole query against the database in `layout`.
///
/// An empty neighbour set is not an error: every isolate gene is then
/// reported as unique and `differencing_possible` is false.
pub fn run_query(
    ctx: &RunContext,
    layout: &DatabaseLayout,
    input: &Path,
    options: &QueryOptions,
    toolkit: &Toolkit,
) -> Result<RunReport, EtdError> {
    if !input.exists() {
        return Err(EtdError::MissingInput(input.to_path_buf()));
    }
    check_selection(options.threshold, options.max_relatives)?;
    ctx.prepare()?;
    let index = load_validated_index(layout)?;
    info!(
        "Using database {:?} ({} genomes, {})",
        layout.root,
        index.num_accessions(),
        index.sketch_params
    );
    let sketch_params = toolkit.sketcher.params();
    if sketch_params != index.sketch_params {
        return Err(EtdError::SketchParamsMismatch(
            index.sketch_params.to_string(),
            sketch_params.to_string(),
        ));
    }

    let rgi_dir = ctx.stage_dir("rgi")?;
    let table_path = toolkit.detector.detect(input, &rgi_dir.join(&ctx.run_name))?;
    let query_table = AnnotationTable::load(&table_path, ctx.run_name.clone())?;
    info!("{} genes called on {:?}", query_table.len(), input);

    let mash_dir = ctx.stage_dir("mash")?;
    let stale = SketchStore::sketch_path(&mash_dir, QUERY_SKETCH_ID);
    if stale.exists() {
        fs::remove_file(&stale)?;
    }
    let (query_sketch, _) =
        SketchStore::new(toolkit.sketcher.as_ref()).sketch(QUERY_SKETCH_ID, input, &mash_dir)?;

    let neighbors = DistanceRanker::new(toolkit.sketcher.as_ref()).rank(
        &query_sketch,
        &index.reference_index(),
        options.threshold,
        options.max_relatives,
        Some(&mash_dir.join("mash_distances.tsv")),
    )?;
    write_relatives(&neighbors, &ctx.output_dir.join("relatives.tsv"))?;

    let differencing_possible = !neighbors.is_empty();
    if !differencing_possible {
        warn!(
            "No reference genome within distance {}: differencing not possible, \
             every gene on the isolate is reported as unique",
            options.threshold
        );
    }
    let neighbor_tables = load_neighbor_tables(&index, &neighbors)?;
    let genes = diff(&query_table, &neighbor_tables);
    write_unique_genes(&genes, &ctx.output_dir.join("unique_genes.fasta"))?;

    let genomic_context = genomic_context(layout, &genes)?;
    let placements = place_unique_genes(ctx, layout, &genes, toolkit.placer.as_ref())?;

    let report = RunReport {
        run_name: ctx.run_name.clone(),
        input: input.to_path_buf(),
        differencing_possible,
        relatives: neighbors,
        genes,
        genomic_context,
        placements,
    };
    let report_path = ctx.output_dir.join("report.json");
    serde_json::to_writer_pretty(BufWriter::new(File::create(&report_path)?), &report)?;
    info!("Report written to {:?}", report_path);
    Ok(report)
}
