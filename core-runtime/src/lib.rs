//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by every crate in the
//! photo-sync workspace:
//! - Engine configuration (provider endpoints, timeouts, cache lifetimes)
//! - Logging and tracing setup
//! - Event bus for auth and sync notifications

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
