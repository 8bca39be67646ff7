use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::DatabaseArgs,
    commands::{require_tools, sketcher_for},
    context::RunContext,
    database::{DatabaseBuilder, DatabaseLayout},
    db_types::SketchParams,
    errors::EtdError,
    tools::{CommandTool, ExternalTool, Mashtree, TreeBuilder},
};

pub fn run_database(args: DatabaseArgs, ctx: &RunContext) -> Result<()> {
    info!("Starting database command with args: {:?}", args);
    if !args.database.is_dir() {
        return Err(EtdError::MissingInput(args.database).into());
    }
    if args.kmer_size == 0 || args.kmer_size > 32 {
        return Err(EtdError::InvalidArgument(format!(
            "k-mer size {} outside 1..=32",
            args.kmer_size
        ))
        .into());
    }
    if args.sketch_size == 0 {
        return Err(EtdError::InvalidArgument("sketch size must be at least 1".to_string()).into());
    }

    let params = SketchParams {
        kmer_size: args.kmer_size,
        sketch_size: args.sketch_size,
        backend: args.sketcher,
    };
    let sketcher = sketcher_for(&args.tools, params, ctx.workers);
    let tree_builder = Mashtree::new(
        Box::new(CommandTool::new(&args.tools.mashtree_bin)),
        ctx.workers,
    );

    let mut needed: Vec<&dyn ExternalTool> = sketcher.dependencies();
    needed.extend(tree_builder.dependencies());
    require_tools(needed)?;

    let layout = DatabaseLayout::new(&args.database);
    let builder = DatabaseBuilder::new(layout, sketcher.as_ref(), &tree_builder);
    let index = builder
        .prepare(args.force)
        .with_context(|| format!("Failed to prepare database {:?}", args.database))?;

    info!(
        "Database ready: {} genomes ({}), reference sketch {:?}",
        index.num_accessions(),
        index.sketch_params,
        index.reference_index
    );
    Ok(())
}
