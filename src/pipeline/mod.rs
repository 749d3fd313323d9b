//! Pipeline orchestration module.
//!
//! - `record` - The log record and its property bag
//! - `enrichment` - Snapshot merge, identity bindings, sentinel handling

pub mod enrichment;
pub mod record;

pub use enrichment::*;
pub use record::*;
