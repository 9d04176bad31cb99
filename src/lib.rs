//! # CueCast
//!
//! A live, multi-device cue server for worship/performance lyrics. One
//! authoritative playback position (song, section, line, play state,
//! background, performer preferences) is kept consistent across any number
//! of connected controller, performer, and audience clients.
//!
//! The crate is organized around a single-writer session actor: every
//! mutation funnels through its mailbox, every accepted transition is
//! persisted and broadcast, and observers resynchronize on connect from a
//! full snapshot.

pub mod catalog;
pub mod engine;
pub mod model;
pub mod projector;
pub mod session;
pub mod store;
pub mod sync;

use anyhow::Context;
use clap::Parser;
use directories::ProjectDirs;
use std::path::PathBuf;
use tracing::info;

/// Default HTTP port, matching the browser clients' expectation.
const DEFAULT_PORT: u16 = 4000;

#[derive(Debug, Parser)]
#[command(name = "cuecast", about = "Multi-device cue server for live lyrics")]
pub struct Options {
    /// TCP port to listen on (all interfaces).
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory holding setlist.json, library.json, and state.json.
    /// Defaults to the OS-standard application data directory.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Directory of static client files served at the web root.
    #[arg(long, default_value = "public")]
    pub public_dir: PathBuf,
}

impl Options {
    /// Resolves the data directory, falling back to the OS-standard
    /// per-user application data location.
    pub fn resolve_data_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        let dirs = ProjectDirs::from("dev", "cuecast", "cuecast")
            .context("could not resolve an application data directory")?;
        Ok(dirs.data_dir().to_path_buf())
    }
}

/// Wires the stores, spawns the session actor, and runs the hub server
/// until shutdown.
pub async fn run(options: Options) -> anyhow::Result<()> {
    let data_dir = options.resolve_data_dir()?;
    info!("using data directory {}", data_dir.display());

    let catalog = catalog::Catalog::load(&data_dir);
    info!("loaded {} songs", catalog.list().len());
    let store = store::StateStore::new(&data_dir);

    let session = session::spawn(catalog, store);
    sync::server::start_server(session, options.port, options.public_dir).await
}
