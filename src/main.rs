//! codepot - conversational code interpreter
//!
//! Ask for something to compute; the model writes Python, `pot` runs it in a persistent
//! interpreter and feeds the results back until the model has an answer.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use codepot::cli::{self, RunOptions};

/// codepot - talk to a model that runs Python for you 🐍
#[derive(Parser, Debug)]
#[command(name = "pot")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// Execute a single prompt and exit
    #[arg(short, long)]
    prompt: Option<String>,

    /// Model choice to start with (as named in the config)
    #[arg(short, long)]
    model: Option<String>,

    /// Config file (defaults to the XDG config dir)
    #[arg(long, env = "CODEPOT_CONFIG")]
    config: Option<PathBuf>,

    /// Working directory (like git -C)
    #[arg(short = 'C', long, visible_alias = "directory")]
    cwd: Option<String>,

    /// Enable debug logging (equivalent to RUST_LOG=debug)
    #[arg(short = 'd', long)]
    debug: bool,

    /// Enable verbose logging (equivalent to RUST_LOG=trace)
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Change working directory if specified (do this early)
    if let Some(cwd) = &args.cwd {
        std::env::set_current_dir(cwd)?;
    }

    run_cli(args)
}

fn init_tracing(args: &Args) {
    let default_filter = if args.verbose {
        "trace"
    } else if args.debug {
        "debug"
    } else {
        "warn" // Quiet by default for normal use
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if args.debug || args.verbose {
        tracing::info!("Debug logging enabled");
    }
}

/// Run the CLI/REPL application
fn run_cli(args: Args) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async {
        init_tracing(&args);

        let options = RunOptions {
            config_path: args.config.clone(),
            model: args.model.clone(),
        };

        match args.prompt.as_deref() {
            Some(prompt) => cli::run_single_prompt(&options, prompt).await,
            None => cli::run_interactive(&options).await,
        }
    })
}
