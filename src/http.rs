//! HTTP transport behind the `ApiClient` seam.
//!
//! The paginator and fetchers are written against [`ApiClient`], so the
//! network edge is swappable: [`RestClient`] wraps reqwest for production,
//! [`MockApi`] serves canned pages in tests.

use crate::error::{Error, Result};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Trait for the HTTP edge.
///
/// One method is enough: every collection endpoint is a GET returning JSON,
/// and the paginator follows fully-qualified `next` URLs.
#[async_trait::async_trait]
pub trait ApiClient: Send + Sync {
    /// Fetch a URL and return the decoded JSON body.
    ///
    /// # Errors
    ///
    /// - `Error::Unauthorized`: HTTP 401 (session expired)
    /// - `Error::Timeout`: request exceeded the configured timeout
    /// - `Error::Network`: transport failure or non-success status
    /// - `Error::MalformedResponse`: body is not valid JSON
    async fn get_json(&self, url: &str) -> Result<Value>;
}

/// Source of the auth token, read on every request.
///
/// Reading per request (rather than capturing at construction) means a token
/// refresh in the surrounding shell takes effect immediately.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// A fixed token, for sessions where the shell hands the token over once.
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        StaticToken {
            token: token.into(),
        }
    }
}

impl TokenSource for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.token.clone())
    }
}

/// Reqwest-backed client with per-request timeout and token auth.
pub struct RestClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
}

impl RestClient {
    /// Build a client from the engine configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the underlying HTTP client cannot be built.
    pub fn new(config: &crate::config::EngineConfig, tokens: Arc<dyn TokenSource>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(RestClient { http, tokens })
    }
}

#[async_trait::async_trait]
impl ApiClient for RestClient {
    async fn get_json(&self, url: &str) -> Result<Value> {
        debug!("» GET {}", url);

        let mut request = self.http.get(url);
        if let Some(token) = self.tokens.token() {
            request = request.header(reqwest::header::AUTHORIZATION, format!("Token {}", token));
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            warn!("✗ GET {} -> 401 (session expired)", url);
            return Err(Error::Unauthorized);
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            debug!("✓ GET {} -> 204 (no body)", url);
            return Ok(Value::Null);
        }
        if !status.is_success() {
            warn!("✗ GET {} -> {}", url, status);
            return Err(Error::Network(format!("HTTP {} from {}", status, url)));
        }

        let body = response.json::<Value>().await?;
        debug!("✓ GET {} -> {}", url, status);
        Ok(body)
    }
}

// ============================================================================
// In-Memory Test Client
// ============================================================================

/// In-memory `ApiClient` for tests.
///
/// Register canned responses per URL, or a failure to inject transport
/// errors. Counts calls so single-flight and cache-hit behavior can be
/// asserted without a network.
///
/// # Example
///
/// ```ignore
/// let api = MockApi::new();
/// api.route("https://t/customers/?page=1", json!({"results": [], "next": null}));
/// let body = api.get_json("https://t/customers/?page=1").await?;
/// assert_eq!(api.calls(), 1);
/// ```
#[derive(Default)]
pub struct MockApi {
    routes: DashMap<String, Value>,
    failures: DashMap<String, Error>,
    calls: AtomicUsize,
}

impl MockApi {
    pub fn new() -> Self {
        MockApi::default()
    }

    /// Register a canned JSON response for a URL.
    pub fn route(&self, url: impl Into<String>, body: Value) {
        self.routes.insert(url.into(), body);
    }

    /// Register a failure for a URL. Takes precedence over a routed body.
    pub fn fail(&self, url: impl Into<String>, error: Error) {
        self.failures.insert(url.into(), error);
    }

    /// Remove a registered failure so subsequent calls succeed.
    pub fn recover(&self, url: &str) {
        self.failures.remove(url);
    }

    /// Total number of `get_json` calls served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ApiClient for MockApi {
    async fn get_json(&self, url: &str) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.failures.get(url) {
            return Err(error.clone());
        }
        match self.routes.get(url) {
            Some(body) => Ok(body.clone()),
            None => Err(Error::Network(format!("no mock route for {}", url))),
        }
    }
}
