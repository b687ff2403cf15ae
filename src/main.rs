use imageplan::cli::commands::{CliArgs, Commands};
use imageplan::cli::handlers::{handle_build, handle_plan};
use imageplan::util::logging::{init_logging, LoggingConfig};
use imageplan::{ImageplanConfig, VERSION};

use clap::Parser;
use tracing::debug;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("imageplan v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Build(build_args) => handle_build(build_args, args.quiet).await,
        Commands::Plan(plan_args) => handle_plan(plan_args, args.quiet),
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let config = LoggingConfig::from_config(&ImageplanConfig::default()).with_cli_overrides(
        args.log_level.as_deref(),
        args.verbose,
        args.quiet,
    );
    init_logging(config);
}
