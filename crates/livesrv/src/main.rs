//! livesrv - static file server with live reload.
//!
//! Serves a directory and keeps an event stream open to every browser tab.
//! Hitting `/sse/reload` (from a build script, editor hook or `curl`) makes
//! every connected page reload.

mod error;
mod output;
mod serve;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use error::CliError;
use output::Output;
use serve::ServeArgs;

/// livesrv - static file server with live reload.
#[derive(Parser, Debug)]
#[command(name = "livesrv", version, about)]
struct Cli {
    #[command(flatten)]
    serve: ServeArgs,
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.serve.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(err) = run(cli) {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(cli.serve.execute())
}
