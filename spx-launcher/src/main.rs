mod cli;
mod client;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    // stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                if matches!(cli.command, cli::Commands::Run(_)) {
                    EnvFilter::new("info")
                } else {
                    EnvFilter::new("warn")
                }
            }),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli.run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
