//! Outcome of an identity lookup.

use std::fmt;

use serde::Serialize;

use crate::error::EnrichError;

/// Reason recorded when a lookup exceeds its budget.
pub const TIMEOUT_REASON: &str = "timeout";

/// Result of resolving the current user/actor.
///
/// `Unavailable` is an ordinary outcome, not an error: it is what gets
/// logged as the sentinel value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum IdentityResult {
    Resolved(String),
    Unavailable(String),
}

impl IdentityResult {
    pub fn resolved(value: impl Into<String>) -> Self {
        IdentityResult::Resolved(value.into())
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        IdentityResult::Unavailable(reason.into())
    }

    pub fn timeout() -> Self {
        IdentityResult::Unavailable(TIMEOUT_REASON.to_string())
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, IdentityResult::Resolved(_))
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            IdentityResult::Resolved(v) => Some(v),
            IdentityResult::Unavailable(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            IdentityResult::Resolved(_) => None,
            IdentityResult::Unavailable(r) => Some(r),
        }
    }

    /// The property value to write: the identity, or `sentinel`.
    pub fn value_or<'a>(&'a self, sentinel: &'a str) -> &'a str {
        self.value().unwrap_or(sentinel)
    }

    /// Fold a fallible lookup into a result. Blank identities count as
    /// unavailable.
    pub fn from_lookup<E: fmt::Display>(lookup: Result<String, E>) -> Self {
        match lookup {
            Ok(v) if v.trim().is_empty() => {
                EnrichError::IdentityUnavailable("empty identity".to_string()).into()
            }
            Ok(v) => IdentityResult::Resolved(v),
            Err(e) => EnrichError::IdentityUnavailable(e.to_string()).into(),
        }
    }
}

impl From<EnrichError> for IdentityResult {
    fn from(err: EnrichError) -> Self {
        IdentityResult::Unavailable(err.to_string())
    }
}

impl fmt::Display for IdentityResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityResult::Resolved(v) => write!(f, "resolved({})", v),
            IdentityResult::Unavailable(r) => write!(f, "unavailable({})", r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_value_or_sentinel() {
        assert_eq!(IdentityResult::resolved("alice").value_or("NULL"), "alice");
        assert_eq!(IdentityResult::unavailable("denied").value_or("NULL"), "NULL");
    }

    #[test]
    fn test_from_lookup() {
        assert_eq!(
            IdentityResult::from_lookup::<String>(Ok("bob".into())),
            IdentityResult::resolved("bob")
        );
        assert_eq!(
            IdentityResult::from_lookup::<String>(Ok("  ".into())),
            IdentityResult::unavailable("empty identity")
        );
        assert_eq!(
            IdentityResult::from_lookup::<String>(Err("permission denied".into())),
            IdentityResult::unavailable("permission denied")
        );
    }

    #[test]
    fn test_timeout_error_converts_to_timeout_reason() {
        let result = IdentityResult::from(EnrichError::Timeout(Duration::from_millis(10)));
        assert_eq!(result, IdentityResult::timeout());
        assert_eq!(result.reason(), Some(TIMEOUT_REASON));
    }

    #[test]
    fn test_serializes_tagged() {
        let json = serde_json::to_string(&IdentityResult::resolved("alice")).unwrap();
        assert_eq!(json, r#"{"status":"resolved","value":"alice"}"#);
    }
}
