use anyhow::{bail, Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod replay;

// Use RUST_LOG=debug for per-frame output
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(false)
        .init();

    info!("Longshot replay v{}", env!("CARGO_PKG_VERSION"));

    let Some(path) = std::env::args().nth(1) else {
        bail!("Usage: longshot-replay <recorded-stream-file>");
    };

    let raw = std::fs::read(&path).with_context(|| format!("Reading {path}"))?;
    match replay::run(raw.into()) {
        Ok(summary) => {
            info!("{summary}");
            Ok(())
        }
        Err(e) => {
            error!("Replay failed: {:#}", e);
            Err(e)
        }
    }
}
