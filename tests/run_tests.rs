mod common;

use std::{collections::BTreeSet, fs, path::Path};

use common::{FakeDetector, FakePlacer, FakeTreeBuilder, add_genome, gene_calls, random_genome, write_file};
use etd::{
    context::RunContext,
    database::{DatabaseBuilder, DatabaseLayout},
    db_types::{DatabaseIndex, SketchBackend, SketchParams},
    distance::{DistanceRecord, NeighborSet},
    errors::EtdError,
    pipeline::{QueryOptions, Toolkit, load_neighbor_tables, run_query},
    tools::NativeSketcher,
};
use tempfile::TempDir;

const GENOME_LEN: usize = 4000;

fn native_params() -> SketchParams {
    SketchParams {
        kmer_size: 21,
        sketch_size: 500,
        backend: SketchBackend::Native,
    }
}

/// N1 shares the isolate's sequence; N2 is unrelated.
fn build_database(dir: &Path) -> DatabaseLayout {
    add_genome(dir, "Ecoli", "GCF_N1", &random_genome(1, GENOME_LEN), &[("G2", "g2"), ("G3", "g3")]);
    add_genome(dir, "Ecoli", "GCF_N2", &random_genome(2, GENOME_LEN), &[("G4", "g4")]);
    let layout = DatabaseLayout::new(dir);
    let sketcher = NativeSketcher::new(native_params());
    let trees = FakeTreeBuilder::default();
    DatabaseBuilder::new(layout.clone(), &sketcher, &trees)
        .prepare(false)
        .unwrap();
    layout
}

fn toolkit(isolate_genes: &[(&str, &str)]) -> Toolkit {
    Toolkit {
        sketcher: Box::new(NativeSketcher::new(native_params())),
        detector: Box::new(FakeDetector {
            table: gene_calls(isolate_genes),
        }),
        placer: Box::new(FakePlacer::default()),
    }
}

fn set(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_isolate_compared_with_close_relative() -> Result<(), Box<dyn std::error::Error>> {
    let db = TempDir::new()?;
    let layout = build_database(db.path());
    let work = TempDir::new()?;
    let input = work.path().join("isolate.fasta");
    write_file(&input, &format!(">contig1\n{}\n", random_genome(1, GENOME_LEN)));
    let ctx = RunContext::for_query(&input, Some(work.path().join("out")), 1);

    let report = run_query(
        &ctx,
        &layout,
        &input,
        &QueryOptions::default(),
        &toolkit(&[("G1", "g1"), ("G2", "g2")]),
    )?;

    assert!(report.differencing_possible);
    assert_eq!(report.relatives.genome_ids(), ["GCF_N1"]);
    assert_eq!(report.relatives.neighbors[0].distance, 0.0);
    assert_eq!(report.genes.unique_to_isolate, set(&["G1"]));
    assert_eq!(report.genes.missing_from_isolate, set(&["G3"]));

    let out = work.path().join("out");
    assert!(out.join("mash/query.msh").exists());
    assert!(out.join("mash/mash_distances.tsv").exists());
    assert!(out.join("rgi").join(format!("{}.txt", ctx.run_name)).exists());
    let relatives = fs::read_to_string(out.join("relatives.tsv"))?;
    assert_eq!(relatives.lines().next(), Some("accession\tdistance"));
    assert!(relatives.contains("GCF_N1\t0"));
    let fasta = fs::read_to_string(out.join("unique_genes.fasta"))?;
    assert_eq!(fasta, ">G1 g1\nATGG1TAA\n");

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(out.join("report.json"))?)?;
    assert_eq!(json["differencing_possible"], true);
    assert_eq!(json["genes"]["unique_to_isolate"][0], "G1");
    Ok(())
}

#[test]
fn test_no_relatives_reports_every_gene_as_unique() -> Result<(), Box<dyn std::error::Error>> {
    let db = TempDir::new()?;
    let layout = build_database(db.path());
    let work = TempDir::new()?;
    let input = work.path().join("stranger.fa");
    write_file(&input, &format!(">c\n{}\n", random_genome(99, GENOME_LEN)));
    let ctx = RunContext::for_query(&input, Some(work.path().join("out")), 1);

    let report = run_query(
        &ctx,
        &layout,
        &input,
        &QueryOptions::default(),
        &toolkit(&[("G1", "g1"), ("G2", "g2")]),
    )?;

    assert!(!report.differencing_possible);
    assert!(report.relatives.is_empty());
    assert_eq!(report.genes.unique_to_isolate, set(&["G1", "G2"]));
    assert!(report.genes.missing_from_isolate.is_empty());

    let relatives = fs::read_to_string(work.path().join("out/relatives.tsv"))?;
    assert_eq!(relatives.trim(), "accession\tdistance");
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(work.path().join("out/report.json"))?)?;
    assert_eq!(json["differencing_possible"], false);
    Ok(())
}

#[test]
fn test_unique_genes_get_context_and_placement() -> Result<(), Box<dyn std::error::Error>> {
    let db = TempDir::new()?;
    let layout = build_database(db.path());
    write_file(
        &layout.prevalence_table_path(),
        "aro_accession\trgi_criteria\tdata_type\tspecies_name\n\
         ARO:G1\tPerfect\tncbi_plasmid\tEscherichia coli\n\
         ARO:G1\tPerfect\tncbi_chromosome\tKlebsiella pneumoniae\n",
    );
    write_file(&layout.phylo_index_path(), "G1\tg1_refpkg\n");

    let work = TempDir::new()?;
    let input = work.path().join("isolate.fa");
    write_file(&input, &format!(">c\n{}\n", random_genome(1, GENOME_LEN)));
    let ctx = RunContext::for_query(&input, Some(work.path().join("out")), 1);

    let report = run_query(
        &ctx,
        &layout,
        &input,
        &QueryOptions::default(),
        &toolkit(&[("G1", "g1"), ("G5", "g5")]),
    )?;

    assert_eq!(report.genes.unique_to_isolate, set(&["G1", "G5"]));
    assert_eq!(report.genomic_context["G1"].found_in_plasmids, ["Escherichia coli"]);
    assert_eq!(report.genomic_context["G1"].found_in_chromosomes, ["Klebsiella pneumoniae"]);
    assert!(report.genomic_context["G5"].found_in_plasmids.is_empty());

    assert_eq!(report.placements.len(), 1, "G5 has no reference phylogeny");
    let gene_dir = work.path().join("out/genes/G1");
    assert_eq!(report.placements["G1"].tree, gene_dir.join("placed.tree"));
    assert_eq!(
        fs::read_to_string(gene_dir.join("candidate.fasta"))?,
        ">G1\nATGG1TAA\n"
    );
    Ok(())
}

#[test]
fn test_run_without_database_index_fails() {
    let db = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let input = work.path().join("isolate.fa");
    write_file(&input, ">c\nACGT\n");
    let ctx = RunContext::for_query(&input, Some(work.path().join("out")), 1);

    let err = run_query(
        &ctx,
        &DatabaseLayout::new(db.path()),
        &input,
        &QueryOptions::default(),
        &toolkit(&[]),
    )
    .unwrap_err();
    assert!(matches!(err, EtdError::MissingInput(ref p) if p.ends_with("etd_db_index.json")));
}

#[test]
fn test_out_of_range_threshold_is_rejected() {
    let db = TempDir::new().unwrap();
    let layout = build_database(db.path());
    let work = TempDir::new().unwrap();
    let input = work.path().join("isolate.fa");
    write_file(&input, &format!(">c\n{}\n", random_genome(1, GENOME_LEN)));
    let ctx = RunContext::for_query(&input, Some(work.path().join("out")), 1);

    let options = QueryOptions {
        threshold: 1.5,
        max_relatives: 10,
    };
    let err = run_query(&ctx, &layout, &input, &options, &toolkit(&[("G1", "g1")])).unwrap_err();
    assert!(matches!(err, EtdError::InvalidArgument(_)));
    // rejected before gene calling or sketching start
    assert!(!work.path().join("out/rgi").exists());
    assert!(!work.path().join("out/mash").exists());
}

#[test]
fn test_bad_selection_is_rejected_before_index_is_read() {
    let db = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let input = work.path().join("isolate.fa");
    write_file(&input, ">c\nACGT\n");
    let ctx = RunContext::for_query(&input, Some(work.path().join("out")), 1);
    let layout = DatabaseLayout::new(db.path());

    for options in [
        QueryOptions { threshold: -0.5, ..QueryOptions::default() },
        QueryOptions { max_relatives: 0, ..QueryOptions::default() },
        QueryOptions { max_relatives: 20, ..QueryOptions::default() },
    ] {
        let err = run_query(&ctx, &layout, &input, &options, &toolkit(&[])).unwrap_err();
        assert!(matches!(err, EtdError::InvalidArgument(_)), "{}", err);
    }
    assert!(!work.path().join("out/rgi").exists());
}

#[test]
fn test_neighbor_missing_from_index_is_missing_input() {
    let index = DatabaseIndex::new(native_params(), "card_prev.msh".into());
    let neighbors = NeighborSet {
        threshold: 0.02,
        neighbors: vec![DistanceRecord {
            genome_id: "GCF_GHOST".to_string(),
            distance: 0.01,
        }],
    };
    let err = load_neighbor_tables(&index, &neighbors).unwrap_err();
    assert!(matches!(err, EtdError::MissingInput(ref p) if p.ends_with("GCF_GHOST")));
}
