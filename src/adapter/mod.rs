//! Integration with host logging frameworks.
//!
//! The pipeline knows nothing about any framework. These adapters satisfy
//! the host's expected interface and delegate to it:
//! - `log_bridge` - `log::Log` wrapper for the Rust `log` facade
//! - `filter` - Filter-shaped hook for hosts that only offer filters

pub mod filter;
pub mod log_bridge;

pub use filter::*;
pub use log_bridge::*;
