//! sovereign-core - Offline sync core for the Global Sovereign Covenant clients
//!
//! This crate contains the durable store, content cache, operation queue,
//! sync engine and scheduling used by every client surface (CLI, background
//! task, app shells).

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod realtime;
pub mod remote;
pub mod scheduler;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use services::{CacheManager, OperationQueue, Store, StoreHandle, StoreLocation, StoreStats};
pub use state::{SyncSnapshot, SyncState};
pub use sync::{CycleReport, SyncEngine, SyncOutcome};
