//! CueCast: a multi-device cue server for live lyrics (binary entry point).
//!
//! This file stays minimal, delegating all application logic, setup, and
//! lifecycle management to the library crate (`lib.rs`).

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let options = cuecast::Options::parse();
    cuecast::run(options).await
}
