use anyhow::{Context, Result};
use log::{info, warn};

use crate::{
    cli::RunArgs,
    commands::{require_tools, sketcher_for},
    context::RunContext,
    database::{DatabaseLayout, load_validated_index},
    distance::check_selection,
    errors::EtdError,
    pipeline::{QueryOptions, Toolkit, run_query},
    tools::{CommandTool, ExternalTool, Pplacer, Rgi},
};

pub fn run_etd(args: RunArgs, ctx: &RunContext) -> Result<()> {
    info!("Starting run command with args: {:?}", args);
    if !args.input.exists() {
        return Err(EtdError::MissingInput(args.input).into());
    }
    check_selection(args.mash_distance, args.max_relatives)?;

    let layout = DatabaseLayout::new(&args.database);
    let index = load_validated_index(&layout).with_context(|| {
        format!(
            "Database {:?} is not ready; build it with `etd database -d {:?}`",
            args.database, args.database
        )
    })?;

    let tools = &args.tools;
    let toolkit = Toolkit {
        sketcher: sketcher_for(tools, index.sketch_params, ctx.workers),
        detector: Box::new(Rgi::new(Box::new(CommandTool::new(&tools.rgi_bin)), ctx.workers)),
        placer: Box::new(Pplacer::new(
            Box::new(CommandTool::new(&tools.hmmalign_bin)),
            Box::new(CommandTool::new(&tools.pplacer_bin)),
            Box::new(CommandTool::new(&tools.guppy_bin)),
            ctx.workers,
        )),
    };

    let mut needed: Vec<&dyn ExternalTool> = toolkit.sketcher.dependencies();
    needed.extend(toolkit.detector.dependencies());
    if layout.phylo_index_path().exists() {
        needed.extend(toolkit.placer.dependencies());
    }
    require_tools(needed)?;

    let options = QueryOptions {
        threshold: args.mash_distance,
        max_relatives: args.max_relatives,
    };
    let report = run_query(ctx, &layout, &args.input, &options, &toolkit)
        .with_context(|| format!("Run on {:?} failed", args.input))?;

    if !report.differencing_possible {
        warn!(
            "No relatives within distance {}; {} genes reported without comparison",
            options.threshold,
            report.genes.unique_to_isolate.len()
        );
    }
    info!(
        "Run {} finished: {} relatives, {} unique genes, {} missing genes, results in {:?}",
        report.run_name,
        report.relatives.len(),
        report.genes.unique_to_isolate.len(),
        report.genes.missing_from_isolate.len(),
        ctx.output_dir
    );
    Ok(())
}
