//! Structured diagnostics for the enrichment pipeline.
//!
//! Every log line the crate emits about itself carries the pipeline name
//! and, where relevant, the context provider or identity resolver involved.

pub mod structured;

pub use structured::*;
