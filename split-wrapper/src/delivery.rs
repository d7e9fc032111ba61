//! Delivery of queued events and impressions to the events service.

use reqwest::header::CONTENT_TYPE;
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;

use split_wrapper_core::{EventBuffer, Impression, TrackedEvent};

use crate::error::{Error, Result};

/// Maximum number of records sent in one request.
const MAX_BATCH_LEN: usize = 5_000;

/// Posts JSON batches to the events service.
pub struct BatchSender {
    client: ClientWithMiddleware,
    events_url: String,
    impressions_url: String,
}

impl BatchSender {
    pub fn new(client: ClientWithMiddleware, events_base_url: &str) -> Self {
        let base = events_base_url.trim_end_matches('/');
        Self {
            client,
            events_url: format!("{base}/events/bulk"),
            impressions_url: format!("{base}/testImpressions/bulk"),
        }
    }

    pub(crate) async fn post<T: Serialize>(
        &self,
        url: &str,
        kind: &'static str,
        batch: &[T],
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let body = serde_json::to_vec(batch).map_err(|e| Error::Delivery {
            kind,
            reason: e.to_string(),
        })?;

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Delivery {
                kind,
                reason: format!("{status} - {body}"),
            });
        }

        Ok(())
    }
}

/// Drains the queues and sends them, keeping anything that failed.
pub struct DeliveryManager {
    sender: BatchSender,
}

impl DeliveryManager {
    pub fn new(client: ClientWithMiddleware, events_base_url: &str) -> Self {
        Self {
            sender: BatchSender::new(client, events_base_url),
        }
    }

    /// Flush both queues. Impressions go first; a failure of one queue does
    /// not stop the other. The first error is returned.
    pub async fn flush_all(
        &self,
        events: &EventBuffer<TrackedEvent>,
        impressions: &EventBuffer<Impression>,
    ) -> Result<()> {
        let impressions_result = self
            .flush_queue(impressions, &self.sender.impressions_url, "impressions")
            .await;
        let events_result = self
            .flush_queue(events, &self.sender.events_url, "events")
            .await;
        impressions_result.and(events_result)
    }

    /// Send `queue` in batches. On failure the unsent tail is requeued.
    async fn flush_queue<T: Serialize>(
        &self,
        queue: &EventBuffer<T>,
        url: &str,
        kind: &'static str,
    ) -> Result<()> {
        let mut pending = queue.checkpoint();

        let mut failure = None;
        for (index, batch) in pending.chunks(MAX_BATCH_LEN).enumerate() {
            if let Err(e) = self.sender.post(url, kind, batch).await {
                failure = Some((index.saturating_mul(MAX_BATCH_LEN), e));
                break;
            }
        }

        match failure {
            Some((sent, e)) => {
                let unsent = pending.split_off(sent);
                tracing::debug!(kind, retained = unsent.len(), "keeping undelivered batch");
                queue.requeue(unsent);
                Err(e)
            }
            None => Ok(()),
        }
    }
}
