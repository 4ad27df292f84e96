//! Change relay
//!
//! Waits on the upstream long-poll and hands back the first changed
//! document. Holds no state between calls.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::error::{RelayError, RelayResult};
use crate::upstream::ChangeFeed;

pub struct ChangeRelay {
    feed: Arc<dyn ChangeFeed>,
    outer_timeout: Duration,
}

impl ChangeRelay {
    pub fn new(feed: Arc<dyn ChangeFeed>, outer_timeout: Duration) -> Self {
        Self {
            feed,
            outer_timeout,
        }
    }

    #[must_use]
    pub const fn outer_timeout(&self) -> Duration {
        self.outer_timeout
    }

    /// Wait for the next document change and return its body.
    ///
    /// Dropping the returned future (the caller went away) drops the
    /// in-flight upstream request with it.
    #[instrument(skip_all)]
    pub async fn wait_for_next_change(&self) -> RelayResult<Value> {
        let envelope = tokio::time::timeout(self.outer_timeout, self.feed.next_change())
            .await
            .map_err(|_| {
                warn!("upstream longpoll exceeded outer timeout");
                RelayError::timeout(format!(
                    "upstream did not respond within {:?}",
                    self.outer_timeout
                ))
            })??;

        let doc = envelope.into_first_doc()?;
        info!(doc = %doc, "barcode change received");

        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ChangeEnvelope;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// Replays queued envelopes, one per call
    struct ScriptedFeed {
        responses: Mutex<VecDeque<RelayResult<ChangeEnvelope>>>,
    }

    impl ScriptedFeed {
        fn new(responses: Vec<RelayResult<ChangeEnvelope>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
            })
        }
    }

    #[async_trait]
    impl ChangeFeed for ScriptedFeed {
        async fn next_change(&self) -> RelayResult<ChangeEnvelope> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("feed called more often than scripted")
        }
    }

    /// Never answers
    struct StalledFeed;

    #[async_trait]
    impl ChangeFeed for StalledFeed {
        async fn next_change(&self) -> RelayResult<ChangeEnvelope> {
            std::future::pending().await
        }
    }

    /// Sets its flag when the upstream call it lives in is dropped
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// Parks forever, reporting when it started and when it was dropped
    struct InFlightFeed {
        started: Arc<Notify>,
        dropped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ChangeFeed for InFlightFeed {
        async fn next_change(&self) -> RelayResult<ChangeEnvelope> {
            let _guard = DropFlag(self.dropped.clone());
            self.started.notify_one();
            std::future::pending().await
        }
    }

    fn envelope(value: Value) -> RelayResult<ChangeEnvelope> {
        Ok(serde_json::from_value(value).unwrap())
    }

    #[tokio::test]
    async fn test_returns_first_doc() {
        let feed = ScriptedFeed::new(vec![envelope(json!({
            "results": [{ "doc": { "id": "B-001", "status": "scanned" } }]
        }))]);
        let relay = ChangeRelay::new(feed, Duration::from_secs(5));

        let doc = relay.wait_for_next_change().await.unwrap();
        assert_eq!(doc, json!({ "id": "B-001", "status": "scanned" }));
    }

    #[tokio::test]
    async fn test_sequential_calls_are_independent() {
        let feed = ScriptedFeed::new(vec![
            envelope(json!({ "results": [{ "doc": { "id": "B-001", "extra": 1 } }] })),
            envelope(json!({ "results": [{ "doc": { "id": "B-002" } }] })),
        ]);
        let relay = ChangeRelay::new(feed, Duration::from_secs(5));

        let first = relay.wait_for_next_change().await.unwrap();
        let second = relay.wait_for_next_change().await.unwrap();

        assert_eq!(first, json!({ "id": "B-001", "extra": 1 }));
        assert_eq!(second, json!({ "id": "B-002" }));
    }

    #[tokio::test]
    async fn test_upstream_errors_pass_through() {
        let feed = ScriptedFeed::new(vec![
            Err(RelayError::upstream(503, "maintenance")),
            Err(RelayError::transport("connection refused")),
            envelope(json!({ "results": [] })),
        ]);
        let relay = ChangeRelay::new(feed, Duration::from_secs(5));

        assert!(matches!(
            relay.wait_for_next_change().await,
            Err(RelayError::UpstreamError { status: 503, .. })
        ));
        assert!(matches!(
            relay.wait_for_next_change().await,
            Err(RelayError::TransportFailure { timed_out: false, .. })
        ));
        assert!(matches!(
            relay.wait_for_next_change().await,
            Err(RelayError::MalformedUpstreamResponse(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_outer_timeout() {
        let relay = ChangeRelay::new(Arc::new(StalledFeed), Duration::from_secs(90));

        let err = relay.wait_for_next_change().await.unwrap_err();

        assert!(matches!(err, RelayError::TransportFailure { timed_out: true, .. }));
        assert!(err.status_code().is_server_error());
    }

    #[tokio::test]
    async fn test_caller_going_away_drops_upstream_call() {
        let started = Arc::new(Notify::new());
        let dropped = Arc::new(AtomicBool::new(false));
        let feed = Arc::new(InFlightFeed {
            started: started.clone(),
            dropped: dropped.clone(),
        });
        let relay = Arc::new(ChangeRelay::new(feed, Duration::from_secs(90)));

        let waiter = tokio::spawn({
            let relay = relay.clone();
            async move { relay.wait_for_next_change().await }
        });

        started.notified().await;
        assert!(!dropped.load(Ordering::SeqCst));

        waiter.abort();
        let joined = waiter.await;

        assert!(joined.unwrap_err().is_cancelled());
        assert!(dropped.load(Ordering::SeqCst));
    }
}
