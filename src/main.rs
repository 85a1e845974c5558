use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{self, AsyncBufRead, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use target_optiply::{Target, TargetConfig, target};

/// Singer target that loads records into the Optiply API.
///
/// Reads Singer messages from stdin (or `--input`) and writes STATE
/// messages to stdout. Logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "target-optiply", version)]
struct Cli {
    /// Config file; repeat to layer several, later files win.
    #[arg(long = "config", value_name = "FILE", required_unless_present = "about")]
    config: Vec<PathBuf>,

    /// Read messages from this file instead of stdin.
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Print a JSON description of the target and exit.
    #[arg(long)]
    about: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout is reserved for Singer STATE messages
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "target_optiply=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if cli.about {
        println!("{}", serde_json::to_string_pretty(&target::about())?);
        return Ok(());
    }

    let config = TargetConfig::load(cli.config.as_slice()).context("Failed to load config")?;
    tracing::info!(api_url = %config.api_url, "starting {}", target::TARGET_NAME);

    let input: Box<dyn AsyncBufRead + Unpin> = match &cli.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut target = Target::new(config)?;
    let mut stdout = io::stdout();
    let summary = target.process(input, &mut stdout).await?;

    let records: u64 = summary.streams.values().map(|s| s.total()).sum();
    tracing::info!(
        streams = summary.streams.len(),
        records,
        states = summary.states_emitted,
        "run complete"
    );

    Ok(())
}
