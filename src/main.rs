mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Cli;
use mediascope::error::Result;

/// Browsers launch a native host with the caller's origin as first argument.
const EXTENSION_ORIGIN_SCHEME: &str = "chrome-extension://";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let launched_by_browser = std::env::args()
        .nth(1)
        .is_some_and(|arg| arg.starts_with(EXTENSION_ORIGIN_SCHEME));

    if launched_by_browser {
        init_tracing(false);
        return commands::host::serve(None, false).await;
    }

    let cli = Cli::parse();
    init_tracing(cli.verbose);
    cli.run().await
}

// Stdout is the native messaging channel in host mode, so logs go to stderr.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
