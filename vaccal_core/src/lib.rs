#![forbid(unsafe_code)]

//! Core domain model and business logic for the vaccination calendar.
//!
//! This crate provides:
//! - Domain types (age offsets, catalog entries, child profile)
//! - Country catalogs (bundled and on-disk)
//! - Key-value persistence (file-backed and in-memory)
//! - The vaccination store with its derived schedule views
//! - CSV export

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod kv;
pub mod store;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::{CatalogProvider, CatalogResolution, ResourceResolver};
pub use config::Config;
pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use store::{CatalogStatus, StoreEvent, StoreState, VaccinationStore};
