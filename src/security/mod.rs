//! Security module.
//!
//! Keeps injected context from forging or bloating log lines.

pub mod sanitizer;

pub use sanitizer::*;
