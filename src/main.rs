use anyhow::Result;
use clap::Parser;
use codigest::cli::{Cli, Commands};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build a context once, pass everywhere
    let ctx = cli.context();
    init_tracing(ctx.verbose, ctx.no_color);

    match cli.command {
        Commands::Init(args) => codigest::infra::config::init(args, &ctx),
        Commands::Scan(args) => codigest::scan_run(args, &ctx),
        Commands::Diff(args) => codigest::diff_run(args, &ctx),
        Commands::Semdiff(args) => codigest::semdiff_run(args, &ctx),
        Commands::Tree(args) => codigest::tree_run(args, &ctx),
        Commands::Completions(args) => codigest::completion::run(args, &ctx),
    }
}

/// stderr logging; RUST_LOG wins over --verbose.
fn init_tracing(verbose: bool, no_color: bool) {
    let default = if verbose { "codigest=debug" } else { "codigest=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!no_color)
                .with_target(false),
        )
        .init();
}
