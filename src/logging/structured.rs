//! Structured logging utilities.
//!
//! Provides a context prefix with the pipeline name and the source
//! (provider or resolver) included in every diagnostic message, the
//! per-thread re-entrancy guard used while enriching, and the `env_logger`
//! format that prints a record's key-values after its message.

use std::cell::Cell;
use std::fmt;
use std::io::{self, Write};

use log::kv::{self, Key, Source, Value, VisitSource};

/// Logging context for one pipeline.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub pipeline: String,
    pub source: Option<String>,
}

impl LogContext {
    pub fn new(pipeline: &str) -> Self {
        Self {
            pipeline: pipeline.to_string(),
            source: None,
        }
    }

    pub fn with_source(&self, source: &str) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            source: Some(source.to_string()),
        }
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "[pipeline={}] [source={}]", self.pipeline, src),
            None => write!(f, "[pipeline={}]", self.pipeline),
        }
    }
}

thread_local! {
    static ENRICHING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as busy enriching a record.
///
/// Records logged while a guard is alive (the crate's own diagnostics,
/// resolver worker threads) are forwarded without enrichment so the
/// bridge never recurses into itself.
#[derive(Debug)]
pub struct EnrichmentGuard {
    previous: bool,
}

impl EnrichmentGuard {
    pub fn enter() -> Self {
        let previous = ENRICHING.with(|flag| flag.replace(true));
        Self { previous }
    }

    pub fn is_active() -> bool {
        ENRICHING.with(|flag| flag.get())
    }
}

impl Drop for EnrichmentGuard {
    fn drop(&mut self) {
        ENRICHING.with(|flag| flag.set(self.previous));
    }
}

/// Appends ` key=value` for each pair.
struct KeyValueWriter<'a> {
    out: &'a mut String,
}

impl<'kvs> VisitSource<'kvs> for KeyValueWriter<'_> {
    fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), kv::Error> {
        use std::fmt::Write as _;
        write!(self.out, " {}={}", key, value).map_err(|_| kv::Error::msg("format failed"))
    }
}

/// `env_logger` format: timestamp, level, target, message, key-values.
pub fn format_with_properties(
    buf: &mut env_logger::fmt::Formatter,
    record: &log::Record<'_>,
) -> io::Result<()> {
    let mut properties = String::new();
    let _ = record
        .key_values()
        .visit(&mut KeyValueWriter { out: &mut properties });
    let timestamp = buf.timestamp_millis();
    writeln!(
        buf,
        "[{} {:<5} {}] {}{}",
        timestamp,
        record.level(),
        record.target(),
        record.args(),
        properties
    )
}
