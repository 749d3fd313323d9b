//! Identity resolution.
//!
//! - `result` - `IdentityResult` (resolved value or unavailable reason)
//! - `resolver` - Resolver trait, env/static/closure resolvers, panic guard
//! - `timeout` - Budget-bounded resolution on a worker pool
//! - `cached` - TTL cache with a shorter retry window for failures

pub mod cached;
pub mod resolver;
pub mod result;
pub mod timeout;

pub use cached::*;
pub use resolver::*;
pub use result::*;
pub use timeout::*;
