//! Undertow Sim - a simulated download engine.
//!
//! Serves a fixed catalog of torrents with configurable metadata latency,
//! download speed and peer ramp, so the gateway can be developed and tested
//! without a swarm. Ids missing from the catalog behave like dead swarms.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use undertow_core::{Gateway, GatewayConfig};
//! use undertow_sim::{Catalog, SimulatedEngine, SimulationConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = Catalog::scan_directory(Path::new("movies")).await?;
//! let engine = Arc::new(SimulatedEngine::new(catalog, SimulationConfig::default()));
//! let gateway = Gateway::new(engine, GatewayConfig::default());
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod engine;
pub mod torrent;

pub use catalog::{Catalog, CatalogEntry, CatalogError, CatalogFile, FileSource, info_hash_for};
pub use engine::{SimulatedEngine, SimulationConfig};
pub use torrent::SimulatedTorrent;
