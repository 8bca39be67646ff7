pub mod database;
pub mod run;

use anyhow::Result;
use log::debug;

use crate::{
    cli::{Commands, ToolPaths},
    context::RunContext,
    db_types::{SketchBackend, SketchParams},
    logging::init_logging,
    tools::{CommandTool, ExternalTool, Mash, NativeSketcher, Sketcher, check_dependencies},
    utils::{get_num_threads, initialize_rayon_pool},
};

pub fn dispatch_command(command: Commands, threads: usize, verbose: u8) -> Result<()> {
    let workers = get_num_threads(threads);
    let (ctx, inputs_present) = match &command {
        Commands::Run(args) => (
            RunContext::for_query(&args.input, args.output.clone(), workers),
            args.input.exists(),
        ),
        Commands::Database(args) => (
            RunContext::for_database(&args.database, workers),
            args.database.is_dir(),
        ),
    };

    // no log file until the inputs are known to exist, so a typo never
    // leaves an empty output directory behind
    let log_file = (inputs_present && ctx.prepare().is_ok()).then(|| ctx.log_path());
    init_logging(verbose, log_file.as_deref())?;
    debug!("Run {} writing to {:?}", ctx.run_name, ctx.output_dir);

    initialize_rayon_pool(ctx.workers)?;

    match command {
        Commands::Run(args) => run::run_etd(args, &ctx),
        Commands::Database(args) => database::run_database(args, &ctx),
    }
}

pub(crate) fn sketcher_for(tools: &ToolPaths, params: SketchParams, workers: usize) -> Box<dyn Sketcher> {
    match params.backend {
        SketchBackend::Mash => Box::new(Mash::new(
            Box::new(CommandTool::new(&tools.mash_bin)),
            params,
            workers,
        )),
        SketchBackend::Native => Box::new(NativeSketcher::new(params)),
    }
}

pub(crate) fn require_tools(tools: Vec<&dyn ExternalTool>) -> Result<()> {
    check_dependencies(&tools)?;
    Ok(())
}
