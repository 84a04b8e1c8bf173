//! Runtime process management.
//!
//! - [`RuntimeProcess`]: handle to one child, shared while it is alive
//! - [`ProcessCache`]: one live handle per target file
//! - [`RunCoordinator`]: install-if-missing, launch, unused-version sweep

mod cache;
mod coordinator;
mod handle;

pub use cache::ProcessCache;
pub use coordinator::{RunCoordinator, LATEST};
pub use handle::{ProcessExit, RuntimeProcess};
