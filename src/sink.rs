/* src/sink.rs */

use async_trait::async_trait;
use tracing::info;

use crate::record::EnrichmentRecord;

/// Receives finished records, one per call.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn store(&self, record: EnrichmentRecord);
}

/// Emits each record as an info-level log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl RecordSink for TracingSink {
    async fn store(&self, record: EnrichmentRecord) {
        info!(
            ip = record.ip_address(),
            private = record.is_private(),
            timestamp = %record.timestamp(),
            "{record}"
        );
    }
}
