use anyhow::Result;
use clap::Parser;
use classpack::cli::{AppContext, Cli, Commands};
use tracing_subscriber::EnvFilter;

/// Logs go to stderr so stdout stays paste-ready
fn init_tracing(cli: &Cli) {
    let default = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!cli.no_color)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        dry_run: cli.dry_run,
    };

    match cli.command {
        Commands::Context(args) => classpack::commands::run_context(args, &ctx),
        Commands::Chunk(args) => classpack::commands::run_chunk(args, &ctx),
        Commands::Refs(args) => classpack::commands::run_refs(args, &ctx),
        Commands::Analyze(args) => classpack::commands::run_analyze(args, &ctx),
        Commands::Init(args) => classpack::infra::config::init(args, &ctx),
        Commands::Completions(args) => classpack::completion::run(args, &ctx),
    }
}
