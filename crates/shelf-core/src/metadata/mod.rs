//! Metadata persistence.
//!
//! This module provides:
//! - Atomic JSON file operations
//! - Advisory locks shared across host processes
//! - The `MapStore` abstraction used by the registry and the usage ledger

mod atomic;
mod lock;
mod store;

pub use atomic::{atomic_read_json, atomic_write_json};
pub use lock::FileLock;
pub use store::{JsonMapStore, MapStore, VersionMap};
