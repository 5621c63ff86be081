//! Workspace umbrella crate.
//!
//! Re-exports the photo sync service so host applications can depend on a
//! single crate and pick the bridge implementation through features.

pub use core_service::*;
