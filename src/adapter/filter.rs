//! Filter-shaped enrichment hook.
//!
//! Some hosts only let configuration attach filters to an appender. The
//! enrichment runs inside `decide`, and the answer is always `Neutral` so
//! the rest of the filter chain behaves as if this filter were absent.

use std::sync::Arc;

use crate::pipeline::enrichment::EnrichmentPipeline;
use crate::pipeline::record::LogRecord;

/// Outcome of a filter in a host's filter chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// Drop the record.
    Deny,
    /// No opinion; the next filter decides.
    Neutral,
    /// Log the record without consulting further filters.
    Accept,
}

/// The filter interface a host chain calls.
pub trait RecordFilter: Send + Sync {
    fn decide(&self, record: &mut LogRecord) -> FilterDecision;
}

pub struct EnrichmentFilter {
    pipeline: Arc<EnrichmentPipeline>,
}

impl EnrichmentFilter {
    pub fn new(pipeline: Arc<EnrichmentPipeline>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &EnrichmentPipeline {
        &self.pipeline
    }
}

impl RecordFilter for EnrichmentFilter {
    fn decide(&self, record: &mut LogRecord) -> FilterDecision {
        self.pipeline.enrich(record);
        FilterDecision::Neutral
    }
}

/// Run `record` through a chain: the first non-neutral decision wins,
/// an all-neutral chain accepts.
pub fn run_chain(filters: &[Arc<dyn RecordFilter>], record: &mut LogRecord) -> FilterDecision {
    for filter in filters {
        match filter.decide(record) {
            FilterDecision::Neutral => continue,
            decision => return decision,
        }
    }
    FilterDecision::Accept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::resolver::FnIdentityResolver;
    use log::Level;

    struct DenyDebug;

    impl RecordFilter for DenyDebug {
        fn decide(&self, record: &mut LogRecord) -> FilterDecision {
            if record.level == Level::Debug {
                FilterDecision::Deny
            } else {
                FilterDecision::Neutral
            }
        }
    }

    fn enrichment_filter() -> Arc<dyn RecordFilter> {
        let pipeline = EnrichmentPipeline::builder()
            .default_identity(Arc::new(FnIdentityResolver::new("user", || {
                Err::<String, _>("not on a cluster")
            })))
            .build()
            .unwrap();
        Arc::new(EnrichmentFilter::new(Arc::new(pipeline)))
    }

    #[test]
    fn test_enrichment_filter_is_neutral() {
        let filter = enrichment_filter();
        let mut record = LogRecord::new(Level::Info, "x");
        assert_eq!(filter.decide(&mut record), FilterDecision::Neutral);
        assert_eq!(record.property("executed_by"), Some("NULL"));
    }

    #[test]
    fn test_chain_enriches_then_later_filter_decides() {
        let chain = vec![enrichment_filter(), Arc::new(DenyDebug) as Arc<dyn RecordFilter>];

        let mut info = LogRecord::new(Level::Info, "kept");
        assert_eq!(run_chain(&chain, &mut info), FilterDecision::Accept);
        assert_eq!(info.property("executed_by"), Some("NULL"));

        let mut debug = LogRecord::new(Level::Debug, "dropped");
        assert_eq!(run_chain(&chain, &mut debug), FilterDecision::Deny);
        // Enrichment already happened before the deny.
        assert_eq!(debug.property("executed_by"), Some("NULL"));
    }
}
