//! Upstream change feed client
//!
//! `ChangeFeed` is the seam between the relay and the document store. The
//! production implementation talks to a CouchDB `_changes` endpoint over
//! `reqwest`; tests plug in their own feeds.

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT},
    Client,
};
use url::Url;

use crate::changes::{ChangeEnvelope, ChangeQuery};
use crate::config::UpstreamConfig;
use crate::error::{RelayError, RelayResult};

/// Source of change envelopes
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Block until the upstream reports at least one change made after
    /// this call was issued (or until the upstream gives up).
    async fn next_change(&self) -> RelayResult<ChangeEnvelope>;
}

/// Basic-auth credentials for the upstream database
#[derive(Clone)]
struct Credentials {
    username: String,
    password: Option<String>,
}

/// CouchDB `_changes` long-poll client
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct CouchChangeFeed {
    changes_url: Url,
    credentials: Option<Credentials>,
    client: Client,
}

impl CouchChangeFeed {
    /// Build a client for the database at `config.url`.
    ///
    /// No request timeout is set here; the relay owns the outer limit.
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))?;

        Self::with_client(client, config)
    }

    /// Build on top of an existing `reqwest::Client`.
    pub fn with_client(client: Client, config: &UpstreamConfig) -> anyhow::Result<Self> {
        let changes_url = changes_url(&config.url)?;
        let credentials = config.username.as_ref().map(|username| Credentials {
            username: username.clone(),
            password: config.password.clone(),
        });

        Ok(Self {
            changes_url,
            credentials,
            client,
        })
    }

    /// Resolved `_changes` endpoint
    #[must_use]
    pub const fn changes_url(&self) -> &Url {
        &self.changes_url
    }
}

#[async_trait]
impl ChangeFeed for CouchChangeFeed {
    async fn next_change(&self) -> RelayResult<ChangeEnvelope> {
        let mut request = self
            .client
            .get(self.changes_url.clone())
            .query(&ChangeQuery.params());

        if let Some(ref credentials) = self.credentials {
            request = request.basic_auth(&credentials.username, credentials.password.as_ref());
        }

        tracing::debug!(url = %self.changes_url, "issuing longpoll request");
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|e| {
                tracing::debug!(status = status.as_u16(), "failed to read upstream error body: {e}");
                String::new()
            });
            return Err(RelayError::upstream(status.as_u16(), &body));
        }

        let body = response.bytes().await?;
        let envelope: ChangeEnvelope = serde_json::from_slice(&body)?;
        tracing::debug!(
            results = envelope.results.len(),
            last_seq = ?envelope.last_seq,
            "longpoll returned"
        );

        Ok(envelope)
    }
}

/// Resolve `<base>/_changes`, tolerating a base URL with or without a
/// trailing slash.
fn changes_url(base: &str) -> anyhow::Result<Url> {
    let mut base =
        Url::parse(base).map_err(|e| anyhow::anyhow!("Invalid upstream URL {base}: {e}"))?;

    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    base.join("_changes")
        .map_err(|e| anyhow::anyhow!("Invalid upstream URL {base}: {e}"))
}
