//! The external pub/sub bus client contract. `BusClient` implementations are
//! shared across `Publisher` instances in the process.

use async_trait::async_trait;

use crate::error::Result;
use crate::record::NormalizedRecord;

/// A transport capable of publishing a batch of records to one topic.
///
/// Implementations are shared (`Arc<dyn BusClient>`) across every
/// [`super::Publisher`] instance in the process — the trait performs no
/// locking of its own, matching §5's "no locking beyond batch-buffer
/// guarding".
#[async_trait]
pub trait BusClient: Send + Sync {
    async fn publish_batch(&self, topic: &str, records: &[NormalizedRecord]) -> Result<()>;
}

/// An HTTP-backed bus client: POSTs each batch as JSON to `{base_url}/{topic}`.
pub struct HttpBusClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBusClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl BusClient for HttpBusClient {
    async fn publish_batch(&self, topic: &str, records: &[NormalizedRecord]) -> Result<()> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), topic);
        self.client
            .post(url)
            .json(records)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
