use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use scshot::{init_tracing, run, RunOptions};

/// Capture a window, OCR it and translate what it says.
#[derive(Debug, Parser)]
#[command(name = "scshot", version, about)]
struct Cli {
    /// Path to the TOML settings file.
    #[arg(short, long)]
    config: PathBuf,

    /// Debug-level logging.
    #[arg(short, long)]
    verbose: bool,

    /// Seconds between capture cycles; negative runs once.
    #[arg(short, long = "loop", default_value_t = -1.0, allow_hyphen_values = true)]
    loop_secs: f64,

    /// Exact title of the window to capture (defaults to the focused window).
    #[arg(short, long)]
    window: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let options = RunOptions {
        config: cli.config,
        verbose: cli.verbose,
        loop_secs: cli.loop_secs,
        window: cli.window,
    };
    match run(options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "scshot failed");
            ExitCode::FAILURE
        }
    }
}
