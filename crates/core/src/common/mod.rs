//! Common types shared across the crate.

/// Error kinds and the errno mapping used by the Python layer.
pub mod error;

pub use error::{Error, Result, SpawnStage};
