//! Normalizes game-asset images (crop to visible pixels, pad to square) and
//! records where they live in a JSON catalog keyed by asset type and name.

pub mod asset_naming;
pub mod batch;
pub mod catalog;
pub mod config;
pub mod error;
pub mod file_watcher;
pub mod ingest_manager;
pub mod normalizer;
pub mod upload_server;

pub use catalog::{Catalog, CatalogStore, Entry};
pub use config::LabConfig;
pub use error::{AssetError, Result};

/// `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
