//! Configuration module for fsdispatch
//!
//! Runtime tunables (mount table location, copy chunk sizes) and the CLI
//! arguments of the diagnostic binary.

mod settings;

pub use settings::*;
