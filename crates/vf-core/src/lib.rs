//! vf-core: shared types, errors, media domain, and configuration.
//!
//! This crate is the foundational dependency for the other vf-* crates and
//! the gateway itself, providing the unified error type, the media-domain
//! types (stream specs, probe results, output formats), and the service
//! configuration with sensible defaults.

pub mod config;
pub mod error;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use media::*;
