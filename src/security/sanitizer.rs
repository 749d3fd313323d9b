//! Sanitization for injected property keys and values.
//!
//! Context values come from the environment and from external identity
//! sources, so they are untrusted text headed for a log line:
//! - Control characters (including CR/LF and Unicode line separators) are
//!   replaced by a space so a value can never start a new log line
//! - Oversized values are truncated at a char boundary
//! - Property keys must be plain identifiers

use std::borrow::Cow;
use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::logging::structured::LogContext;

/// Default limit for a single property value, in bytes.
pub const DEFAULT_MAX_VALUE_LEN: usize = 1024;

/// Appended to truncated values.
pub const TRUNCATION_MARKER: &str = "...";

lazy_static! {
    /// Accepted property key syntax
    static ref PROPERTY_KEY_PATTERN: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").unwrap();
}

/// Check a property key against the accepted syntax.
pub fn is_valid_property_key(key: &str) -> bool {
    PROPERTY_KEY_PATTERN.is_match(key)
}

/// Counts of what sanitization changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SanitizationResult {
    pub control_chars: usize,
    pub truncated_values: usize,
    pub rejected_keys: usize,
}

impl SanitizationResult {
    pub fn total_detections(&self) -> usize {
        self.control_chars + self.truncated_values + self.rejected_keys
    }

    pub fn has_detections(&self) -> bool {
        self.total_detections() > 0
    }
}

fn is_line_breaking(c: char) -> bool {
    c.is_control() || c == '\u{2028}' || c == '\u{2029}'
}

/// Sanitize a single value, borrowing when nothing needs to change.
pub fn sanitize_value<'a>(
    value: &'a str,
    max_len: usize,
    result: &mut SanitizationResult,
) -> Cow<'a, str> {
    let mut out = if value.contains(is_line_breaking) {
        let mut replaced = String::with_capacity(value.len());
        for c in value.chars() {
            if is_line_breaking(c) {
                result.control_chars += 1;
                replaced.push(' ');
            } else {
                replaced.push(c);
            }
        }
        Cow::Owned(replaced)
    } else {
        Cow::Borrowed(value)
    };

    if out.len() > max_len {
        let keep = max_len.saturating_sub(TRUNCATION_MARKER.len());
        let mut cut = keep;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        let mut truncated = String::with_capacity(cut + TRUNCATION_MARKER.len());
        truncated.push_str(&out[..cut]);
        truncated.push_str(TRUNCATION_MARKER);
        out = Cow::Owned(truncated);
        result.truncated_values += 1;
    }

    out
}

/// Sanitize a batch of context pairs.
///
/// Pairs with an invalid key are dropped; values are cleaned with
/// [`sanitize_value`].
pub fn sanitize_properties<I>(
    pairs: I,
    max_len: usize,
    ctx: &LogContext,
) -> (BTreeMap<String, String>, SanitizationResult)
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut result = SanitizationResult::default();
    let mut clean = BTreeMap::new();

    for (key, value) in pairs {
        if !is_valid_property_key(&key) {
            log::debug!("{} PROPERTY_KEY_REJECTED key={:?}", ctx, key);
            result.rejected_keys += 1;
            continue;
        }
        let value = match sanitize_value(&value, max_len, &mut result) {
            Cow::Borrowed(_) => value,
            Cow::Owned(v) => v,
        };
        clean.insert(key, value);
    }

    if result.has_detections() {
        log::debug!(
            "{} SANITIZE_DETECTIONS control_chars={} truncated={} rejected_keys={}",
            ctx,
            result.control_chars,
            result.truncated_values,
            result.rejected_keys
        );
    }

    (clean, result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_key_syntax() {
        assert!(is_valid_property_key("cluster_id"));
        assert!(is_valid_property_key("spark.app-id"));
        assert!(is_valid_property_key("_private"));
        assert!(!is_valid_property_key(""));
        assert!(!is_valid_property_key("1st"));
        assert!(!is_valid_property_key("has space"));
        assert!(!is_valid_property_key("line\nbreak"));
    }

    #[test]
    fn test_clean_value_is_borrowed() {
        let mut result = SanitizationResult::default();
        let value = sanitize_value("app-20260101", 64, &mut result);
        assert!(matches!(value, Cow::Borrowed(_)));
        assert!(!result.has_detections());
    }

    #[test]
    fn test_newline_injection_neutralized() {
        let mut result = SanitizationResult::default();
        let value = sanitize_value("alice\nERROR forged line\r", 64, &mut result);
        assert_eq!(value, "alice ERROR forged line ");
        assert_eq!(result.control_chars, 2);
    }

    #[test]
    fn test_unicode_line_separator_neutralized() {
        let mut result = SanitizationResult::default();
        let value = sanitize_value("a\u{2028}b", 64, &mut result);
        assert_eq!(value, "a b");
    }

    #[test]
    fn test_truncation_respects_char_boundary() {
        let mut result = SanitizationResult::default();
        // 'é' is two bytes; cutting at byte 5 would split the third one.
        let value = sanitize_value("éééééé", 8, &mut result);
        assert_eq!(value, "éé...");
        assert!(value.len() <= 8);
        assert_eq!(result.truncated_values, 1);
    }

    #[test]
    fn test_sanitize_properties_drops_bad_keys() {
        let ctx = LogContext::new("test");
        let (clean, result) = sanitize_properties(
            vec![
                ("cluster_id".to_string(), "c-1".to_string()),
                ("bad key".to_string(), "x".to_string()),
            ],
            DEFAULT_MAX_VALUE_LEN,
            &ctx,
        );
        assert_eq!(clean.len(), 1);
        assert_eq!(clean.get("cluster_id").map(String::as_str), Some("c-1"));
        assert_eq!(result.rejected_keys, 1);
    }
}
