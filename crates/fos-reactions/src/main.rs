//! fOS Reactions - replay mutation scripts through the custom element engine
//!
//! Usage: `fos-reactions <script.json> [--config <config.json>]`
//!
//! Prints one JSON object per callback, checkpoint, resolved `whenDefined`
//! and reported error.

mod element;
mod replay;
mod script;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use fos_elements::EngineConfig;
use tracing_subscriber::EnvFilter;

use crate::replay::TraceEvent;
use crate::script::Script;

/// Command line arguments
#[derive(Debug, PartialEq, Eq)]
struct Args {
    script: PathBuf,
    config: Option<PathBuf>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut script = None;
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let path = args.next().context("--config needs a path")?;
                    config = Some(PathBuf::from(path));
                }
                flag if flag.starts_with("--") => bail!("unknown flag {}", flag),
                path if script.is_none() => script = Some(PathBuf::from(path)),
                extra => bail!("unexpected argument {}", extra),
            }
        }

        let script = script.context("usage: fos-reactions <script.json> [--config <config.json>]")?;
        Ok(Self { script, config })
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse(std::env::args().skip(1))?;
    let script = Script::load(&args.script)?;

    let config = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            EngineConfig::from_json(&json).with_context(|| format!("parsing {}", path.display()))?
        }
        None => script.config.clone().unwrap_or_default(),
    };

    tracing::info!("Replaying {} steps from {}", script.steps.len(), args.script.display());
    let events = replay::run(&script, config)?;

    let mut errors = 0;
    for event in &events {
        if matches!(event, TraceEvent::Error { .. }) {
            errors += 1;
        }
        println!("{}", serde_json::to_string(event)?);
    }

    tracing::info!(
        "{} callbacks, {} errors",
        replay::callback_count(&events),
        errors
    );
    Ok(())
}
