//! Context snapshots and the providers that produce them.
//!
//! - `snapshot` - Immutable key/value snapshot and missing-field policy
//! - `provider` - Provider trait and the environment/process/static providers
//! - `timeout` - Budget-bounded snapshots on a worker pool
//! - `cached` - TTL cache in front of any provider, keeping the last good snapshot

pub mod cached;
pub mod provider;
pub mod snapshot;
pub mod timeout;

pub use cached::*;
pub use provider::*;
pub use snapshot::*;
pub use timeout::*;
