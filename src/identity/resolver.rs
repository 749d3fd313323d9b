//! Identity resolvers.
//!
//! A resolver asks some external source who the current user/actor is.
//! Whatever goes wrong in that source (permissions, not initialised yet,
//! network) comes back as [`IdentityResult::Unavailable`].

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::EnrichError;
use crate::identity::result::IdentityResult;
use crate::logging::structured::LogContext;

/// Environment variables checked by [`EnvIdentityResolver::default`].
pub const DEFAULT_IDENTITY_ENV_VARS: &[&str] = &["USER", "USERNAME", "LOGNAME"];

pub trait IdentityResolver: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    fn resolve(&self) -> IdentityResult;
}

impl<R: IdentityResolver + ?Sized> IdentityResolver for Arc<R> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn resolve(&self) -> IdentityResult {
        (**self).resolve()
    }
}

/// Resolve, turning a panicking resolver into `Unavailable`.
pub fn catch_resolve(resolver: &dyn IdentityResolver, ctx: &LogContext) -> IdentityResult {
    match catch_unwind(AssertUnwindSafe(|| resolver.resolve())) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::warn!(
                "{} IDENTITY_RESOLVER_PANICKED resolver={} message={:?}",
                ctx,
                resolver.name(),
                message
            );
            EnrichError::IdentityUnavailable(format!("resolver panicked: {}", message)).into()
        }
    }
}

/// Always returns the same result.
#[derive(Debug, Clone)]
pub struct StaticIdentityResolver {
    name: String,
    result: IdentityResult,
}

impl StaticIdentityResolver {
    pub fn new(name: &str, result: IdentityResult) -> Self {
        Self {
            name: name.to_string(),
            result,
        }
    }
}

impl IdentityResolver for StaticIdentityResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self) -> IdentityResult {
        self.result.clone()
    }
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Takes the identity from the first non-empty environment variable.
pub struct EnvIdentityResolver {
    vars: Vec<String>,
    lookup: Lookup,
}

impl EnvIdentityResolver {
    pub fn new<I, S>(vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(Into::into).collect(),
            lookup: Box::new(|var| std::env::var(var).ok()),
        }
    }

    pub fn with_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.lookup = Box::new(lookup);
        self
    }

    pub fn vars(&self) -> &[String] {
        &self.vars
    }
}

impl Default for EnvIdentityResolver {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY_ENV_VARS.iter().copied())
    }
}

impl fmt::Debug for EnvIdentityResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvIdentityResolver")
            .field("vars", &self.vars)
            .finish()
    }
}

impl IdentityResolver for EnvIdentityResolver {
    fn name(&self) -> &str {
        "env-user"
    }

    fn resolve(&self) -> IdentityResult {
        self.vars
            .iter()
            .filter_map(|var| (self.lookup)(var))
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
            .map(IdentityResult::Resolved)
            .unwrap_or_else(|| {
                EnrichError::IdentityUnavailable(format!("none of {:?} is set", self.vars)).into()
            })
    }
}

/// Adapts a fallible closure, typically a call into the host runtime's
/// user API.
pub struct FnIdentityResolver<F> {
    name: String,
    lookup: F,
}

impl<F, E> FnIdentityResolver<F>
where
    F: Fn() -> Result<String, E> + Send + Sync,
    E: fmt::Display,
{
    pub fn new(name: &str, lookup: F) -> Self {
        Self {
            name: name.to_string(),
            lookup,
        }
    }
}

impl<F, E> IdentityResolver for FnIdentityResolver<F>
where
    F: Fn() -> Result<String, E> + Send + Sync,
    E: fmt::Display,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self) -> IdentityResult {
        IdentityResult::from_lookup((self.lookup)())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_resolver_first_set_var_wins() {
        let resolver = EnvIdentityResolver::new(["PRIMARY", "SECONDARY"]).with_lookup(|var| {
            match var {
                "PRIMARY" => Some(String::new()),
                "SECONDARY" => Some("carol".to_string()),
                _ => None,
            }
        });
        assert_eq!(resolver.resolve(), IdentityResult::resolved("carol"));
    }

    #[test]
    fn test_env_resolver_unavailable_when_unset() {
        let resolver = EnvIdentityResolver::new(["NOPE"]).with_lookup(|_| None);
        let result = resolver.resolve();
        assert!(!result.is_resolved());
        assert!(result.reason().unwrap().contains("NOPE"));
    }

    #[test]
    fn test_fn_resolver_maps_error() {
        let resolver =
            FnIdentityResolver::new("runtime-user", || Err::<String, _>("not initialised"));
        assert_eq!(
            resolver.resolve(),
            IdentityResult::unavailable("not initialised")
        );
    }

    #[test]
    fn test_catch_resolve_converts_panic() {
        let ctx = LogContext::new("test");
        let resolver = FnIdentityResolver::new("boom", || -> Result<String, String> {
            panic!("runtime exploded")
        });
        let result = catch_resolve(&resolver, &ctx);
        assert_eq!(
            result,
            IdentityResult::unavailable("resolver panicked: runtime exploded")
        );
    }

    #[test]
    fn test_static_resolver() {
        let resolver = StaticIdentityResolver::new("fixed", IdentityResult::resolved("svc"));
        assert_eq!(resolver.resolve().value(), Some("svc"));
        assert_eq!(resolver.name(), "fixed");
    }
}
