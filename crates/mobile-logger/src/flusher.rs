// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of records to the ingestion endpoint.
//!
//! Two paths leave the process:
//!
//! - **Batch**: the queue's contents as one JSON array. A failed batch is
//!   handed back to the caller to re-queue; nothing is persisted.
//! - **Single**: one record as a JSON object. A failed record is appended to
//!   the persisted failed list for the retry loop.
//!
//! Both go through a [`LogTransport`], which reports every failure mode the
//! same way: a [`ShippingError`]. A `2xx` response whose body is not JSON or
//! reports `success: false` counts as a failure.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::config::ShipperConfig;
use crate::http::get_client;
use crate::record::LogRecord;
use crate::store::FailedLogStore;

/// Why a delivery attempt failed.
#[derive(Debug, Error)]
pub enum ShippingError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("endpoint returned {0}")]
    Status(StatusCode),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("endpoint rejected logs: {0}")]
    Rejected(String),
}

/// Body returned by the ingestion endpoint. Anything beyond `success` is
/// echoed data the shipper does not need.
#[derive(Debug, Deserialize)]
struct IngestResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Sends records to the ingestion endpoint.
#[async_trait]
pub trait LogTransport: Send + Sync {
    /// Delivers `batch` as a single JSON array.
    async fn send_batch(&self, batch: &[LogRecord]) -> Result<(), ShippingError>;

    /// Delivers one record as a JSON object.
    async fn send_one(&self, record: &LogRecord) -> Result<(), ShippingError>;
}

/// [`LogTransport`] over HTTP POST to `{endpoint_url}/logs`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    #[must_use]
    pub fn new(config: &ShipperConfig) -> Self {
        Self {
            client: get_client(config),
            url: config.logs_url(),
        }
    }

    async fn post<T: Serialize + ?Sized + Sync>(&self, body: &T) -> Result<(), ShippingError> {
        let resp = self.client.post(&self.url).json(body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ShippingError::Status(status));
        }

        let bytes = resp.bytes().await?;
        let parsed: IngestResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ShippingError::MalformedResponse(e.to_string()))?;
        if !parsed.success {
            return Err(ShippingError::Rejected(
                parsed.message.unwrap_or_else(|| "success: false".to_string()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl LogTransport for HttpTransport {
    async fn send_batch(&self, batch: &[LogRecord]) -> Result<(), ShippingError> {
        self.post(batch).await
    }

    async fn send_one(&self, record: &LogRecord) -> Result<(), ShippingError> {
        self.post(record).await
    }
}

/// Applies the failure policy of each delivery path on top of a transport.
#[derive(Clone)]
pub struct Flusher {
    transport: Arc<dyn LogTransport>,
    failed: Arc<FailedLogStore>,
}

impl Flusher {
    #[must_use]
    pub fn new(transport: Arc<dyn LogTransport>, failed: Arc<FailedLogStore>) -> Self {
        Self { transport, failed }
    }

    /// Ships `batch` and returns it back if delivery failed, so the caller can
    /// re-queue it.
    pub async fn flush_batch(&self, batch: Vec<LogRecord>) -> Option<Vec<LogRecord>> {
        if batch.is_empty() {
            return None;
        }
        let n = batch.len();
        match self.transport.send_batch(&batch).await {
            Ok(()) => {
                debug!("SHIPPER | Flushed {} logs", n);
                None
            }
            Err(e) => {
                error!("SHIPPER | Failed to flush {} logs, re-queueing: {}", n, e);
                Some(batch)
            }
        }
    }

    /// Ships one record. On failure the record is persisted for retry.
    pub async fn send_single(&self, record: LogRecord) -> bool {
        match self.transport.send_one(&record).await {
            Ok(()) => true,
            Err(e) => {
                error!("SHIPPER | Failed to send log '{}': {}", record.title, e);
                self.failed.append(record);
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::record::tests::sample_record;
    use crate::store::MemoryStore;
    use mockito::Matcher;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-process transport recording every call.
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub(crate) fail: AtomicBool,
        pub(crate) batches: Mutex<Vec<Vec<LogRecord>>>,
        pub(crate) singles: Mutex<Vec<LogRecord>>,
        pub(crate) attempts: AtomicUsize,
    }

    impl RecordingTransport {
        pub(crate) fn failing() -> Self {
            let transport = Self::default();
            transport.fail.store(true, Ordering::SeqCst);
            transport
        }

        fn outcome(&self) -> Result<(), ShippingError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(ShippingError::Status(StatusCode::INTERNAL_SERVER_ERROR))
            } else {
                Ok(())
            }
        }

        pub(crate) fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().unwrap().iter().map(Vec::len).collect()
        }
    }

    #[async_trait]
    impl LogTransport for RecordingTransport {
        async fn send_batch(&self, batch: &[LogRecord]) -> Result<(), ShippingError> {
            let outcome = self.outcome();
            if outcome.is_ok() {
                self.batches.lock().unwrap().push(batch.to_vec());
            }
            outcome
        }

        async fn send_one(&self, record: &LogRecord) -> Result<(), ShippingError> {
            let outcome = self.outcome();
            if outcome.is_ok() {
                self.singles.lock().unwrap().push(record.clone());
            }
            outcome
        }
    }

    fn http_transport(url: String) -> HttpTransport {
        HttpTransport::new(&ShipperConfig {
            endpoint_url: url,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_send_batch_posts_json_array() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/logs")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Regex(
                r#"^\[\{.*"title":"a".*\},\{.*"title":"b".*\}\]$"#.to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"success":true,"count":2}"#)
            .expect(1)
            .create_async()
            .await;

        let transport = http_transport(server.url());
        let result = transport
            .send_batch(&[sample_record("a"), sample_record("b")])
            .await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_one_posts_json_object() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/logs")
            .match_body(Matcher::PartialJson(json!({"title": "single"})))
            .with_status(201)
            .with_body(r#"{"success":true,"id":"abc"}"#)
            .create_async()
            .await;

        let result = http_transport(server.url())
            .send_one(&sample_record("single"))
            .await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/logs")
            .with_status(500)
            .create_async()
            .await;

        let result = http_transport(server.url())
            .send_one(&sample_record("x"))
            .await;

        assert!(matches!(
            result,
            Err(ShippingError::Status(StatusCode::INTERNAL_SERVER_ERROR))
        ));
    }

    #[tokio::test]
    async fn test_malformed_body_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/logs")
            .with_status(200)
            .with_body("<html>ok</html>")
            .create_async()
            .await;

        let result = http_transport(server.url())
            .send_one(&sample_record("x"))
            .await;

        assert!(matches!(result, Err(ShippingError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_success_false_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/logs")
            .with_status(200)
            .with_body(r#"{"success":false,"message":"db down"}"#)
            .create_async()
            .await;

        let result = http_transport(server.url())
            .send_batch(&[sample_record("x")])
            .await;

        match result {
            Err(ShippingError::Rejected(message)) => assert_eq!(message, "db down"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        // nothing listens on port 9 locally
        let result = http_transport("http://127.0.0.1:9".to_string())
            .send_one(&sample_record("x"))
            .await;
        assert!(matches!(result, Err(ShippingError::Transport(_))));
    }

    #[tokio::test]
    async fn test_flush_batch_returns_batch_on_failure() {
        let failed = Arc::new(FailedLogStore::new(Arc::new(MemoryStore::new())));
        let flusher = Flusher::new(Arc::new(RecordingTransport::failing()), Arc::clone(&failed));

        let batch = vec![sample_record("1"), sample_record("2")];
        let returned = flusher.flush_batch(batch.clone()).await;

        assert_eq!(returned, Some(batch));
        // batch failures are never persisted
        assert!(failed.is_empty());
    }

    #[tokio::test]
    async fn test_flush_batch_empty_is_noop() {
        let transport = Arc::new(RecordingTransport::default());
        let failed = Arc::new(FailedLogStore::new(Arc::new(MemoryStore::new())));
        let flusher = Flusher::new(transport.clone(), failed);

        assert_eq!(flusher.flush_batch(Vec::new()).await, None);
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_send_single_failure_appends_failed_entry() {
        let failed = Arc::new(FailedLogStore::new(Arc::new(MemoryStore::new())));
        let flusher = Flusher::new(Arc::new(RecordingTransport::failing()), Arc::clone(&failed));

        assert!(!flusher.send_single(sample_record("lost")).await);

        let entries = failed.load();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].record.title, "lost");
        assert_eq!(entries[0].retry_count, 0);
    }
}
