//! Bridge between the `log` facade and the enrichment pipeline.
//!
//! `EnrichingLogger` wraps any `log::Log`. Each record is copied into a
//! [`LogRecord`] (existing key-values included), enriched, and forwarded to
//! the wrapped logger with the full property bag attached as key-values.
//! Message, level, target, module path, file and line pass through as-is.

use std::sync::Arc;

use log::kv::{self, Key, Value, VisitSource};
use log::{LevelFilter, Log, Metadata, Record};

use crate::error::{EnrichError, Result};
use crate::logging::structured::EnrichmentGuard;
use crate::pipeline::enrichment::EnrichmentPipeline;
use crate::pipeline::record::LogRecord;

/// Copies a record's key-values into a property bag.
struct CollectProperties<'a> {
    record: &'a mut LogRecord,
}

impl<'kvs> VisitSource<'kvs> for CollectProperties<'_> {
    fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> std::result::Result<(), kv::Error> {
        self.record.set_property(key.as_str(), &value.to_string());
        Ok(())
    }
}

impl LogRecord {
    /// Copy a `log` record, key-values included.
    pub fn from_log_record(record: &Record<'_>) -> Self {
        let mut converted =
            LogRecord::new(record.level(), record.args().to_string()).with_target(record.target());
        let _ = record.key_values().visit(&mut CollectProperties {
            record: &mut converted,
        });
        converted
    }
}

pub struct EnrichingLogger<L> {
    inner: L,
    pipeline: Arc<EnrichmentPipeline>,
}

impl<L: Log> EnrichingLogger<L> {
    pub fn new(inner: L, pipeline: Arc<EnrichmentPipeline>) -> Self {
        Self { inner, pipeline }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    pub fn pipeline(&self) -> &EnrichmentPipeline {
        &self.pipeline
    }
}

impl<L: Log + 'static> EnrichingLogger<L> {
    /// Install as the global logger.
    pub fn install(self, max_level: LevelFilter) -> Result<()> {
        log::set_boxed_logger(Box::new(self))
            .map_err(|e| EnrichError::Config(format!("logger already installed: {}", e)))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl<L: Log> Log for EnrichingLogger<L> {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        if !self.inner.enabled(record.metadata()) {
            return;
        }
        // Logged from inside an enrichment on this thread.
        if EnrichmentGuard::is_active() {
            self.inner.log(record);
            return;
        }

        let enriched = {
            let _guard = EnrichmentGuard::enter();
            self.pipeline.enriched(LogRecord::from_log_record(record))
        };

        let pairs: Vec<(&str, &str)> = enriched
            .properties()
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let pairs: &[(&str, &str)] = &pairs;

        self.inner.log(
            &Record::builder()
                .args(*record.args())
                .level(record.level())
                .target(record.target())
                .module_path(record.module_path())
                .file(record.file())
                .line(record.line())
                .key_values(&pairs)
                .build(),
        );
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::provider::StaticContextProvider;
    use crate::identity::resolver::StaticIdentityResolver;
    use crate::identity::result::IdentityResult;
    use log::Level;
    use parking_lot::Mutex;

    /// Captures forwarded records as enriched `LogRecord`s.
    #[derive(Default)]
    struct Capture {
        records: Mutex<Vec<LogRecord>>,
    }

    impl Log for Capture {
        fn enabled(&self, metadata: &Metadata<'_>) -> bool {
            metadata.level() <= Level::Info
        }

        fn log(&self, record: &Record<'_>) {
            self.records.lock().push(LogRecord::from_log_record(record));
        }

        fn flush(&self) {}
    }

    fn logger() -> EnrichingLogger<Capture> {
        let pipeline = EnrichmentPipeline::builder()
            .context_provider(Arc::new(StaticContextProvider::new(
                "static",
                [("cluster_id", "c-1")].into_iter().collect(),
            )))
            .default_identity(Arc::new(StaticIdentityResolver::new(
                "user",
                IdentityResult::resolved("alice"),
            )))
            .build()
            .unwrap();
        EnrichingLogger::new(Capture::default(), Arc::new(pipeline))
    }

    #[test]
    fn test_forwarded_record_carries_properties() {
        let logger = logger();
        let request_id = "r-9";
        let kvs: &[(&str, &str)] = &[("request_id", request_id)];
        logger.log(
            &Record::builder()
                .args(format_args!("job {} started", 7))
                .level(Level::Info)
                .target("scheduler")
                .key_values(&kvs)
                .build(),
        );

        let records = logger.inner().records.lock();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.message, "job 7 started");
        assert_eq!(record.target, "scheduler");
        assert_eq!(record.property("request_id"), Some("r-9"));
        assert_eq!(record.property("cluster_id"), Some("c-1"));
        assert_eq!(record.property("executed_by"), Some("alice"));
    }

    #[test]
    fn test_disabled_records_are_not_enriched_or_forwarded() {
        let logger = logger();
        logger.log(
            &Record::builder()
                .args(format_args!("noise"))
                .level(Level::Debug)
                .build(),
        );
        assert!(logger.inner().records.lock().is_empty());
    }

    #[test]
    fn test_reentrant_records_forwarded_unenriched() {
        let logger = logger();
        {
            let _guard = EnrichmentGuard::enter();
            logger.log(
                &Record::builder()
                    .args(format_args!("from inside a resolver"))
                    .level(Level::Warn)
                    .build(),
            );
        }
        let records = logger.inner().records.lock();
        assert_eq!(records.len(), 1);
        assert!(records[0].properties().is_empty());
    }
}
