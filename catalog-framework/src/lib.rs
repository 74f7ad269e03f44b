//! Federated catalog core.
//!
//! [`CatalogFramework`] is the one entry point the ingest and administration
//! layers talk to. It owns:
//! - the [`Pipeline`](catalog_processing::Pipeline) every committed create,
//!   update and delete is submitted to
//! - the [`PublicationReconciler`](catalog_publication::PublicationReconciler)
//!   that keeps replica stores in line with each record's desired
//!   destinations, and the write-back of the resulting published set onto the
//!   local record
//!
//! Configuration is read from TOML ([`CatalogConfig`]); [`telemetry`] sets up
//! logging for binaries and tests.

mod config;
mod error;
mod framework;
pub mod telemetry;

pub use config::{CatalogConfig, ConfigError};
pub use error::{FrameworkError, FrameworkResult};
pub use framework::{CatalogFramework, CatalogFrameworkBuilder};
