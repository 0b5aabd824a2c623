//! REST implementation of [`Retriever`].
//!
//! `RestRetriever` wraps a `reqwest::Client` and posts the user prompt to
//! the documents route, with automatic retry + exponential back-off on
//! transient (5xx / timeout) failures.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use pc_domain::config::RetrievalConfig;
use pc_domain::document::Document;
use pc_domain::error::{Error, Result};
use pc_domain::principal::Credential;
use pc_domain::trace::TraceEvent;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use uuid::Uuid;

use crate::provider::Retriever;
use crate::types::{RetrieveRequest, RetrieveResponse};

const SERVICE: &str = "retrieval";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Created once and reused; the underlying `reqwest::Client` keeps a
/// connection pool.
#[derive(Debug, Clone)]
pub struct RestRetriever {
    http: Client,
    url: String,
    max_retries: u32,
}

impl RestRetriever {
    pub fn new(cfg: &RetrievalConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        let url = format!(
            "{}/{}",
            cfg.base_url.trim_end_matches('/'),
            cfg.path.trim_start_matches('/')
        );

        Ok(Self {
            http,
            url,
            max_retries: cfg.max_retries,
        })
    }

    fn decorate(&self, rb: RequestBuilder, credential: &Credential) -> RequestBuilder {
        rb.header(reqwest::header::AUTHORIZATION, credential.bearer())
            .header("X-Trace-Id", Uuid::new_v4().to_string())
    }

    // ── retry engine ─────────────────────────────────────────────────

    /// Execute a request with retry + exponential back-off on transient errors.
    ///
    /// * Retries on 5xx status codes and on timeouts / connection errors.
    /// * Does **not** retry on 4xx (client errors are permanent).
    /// * Emits a `TraceEvent::ServiceCall` after every attempt.
    async fn execute_with_retry(
        &self,
        endpoint: &str,
        build_request: impl Fn() -> RequestBuilder,
    ) -> Result<Response> {
        let mut last_err: Option<Error> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(retry_backoff(attempt)).await;
            }

            let start = Instant::now();
            let result = build_request().send().await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(resp) => {
                    let status = resp.status();
                    TraceEvent::ServiceCall {
                        service: SERVICE.into(),
                        endpoint: endpoint.to_owned(),
                        status: status.as_u16(),
                        duration_ms,
                    }
                    .emit();

                    if status.is_server_error() {
                        let body = resp.text().await.unwrap_or_default();
                        last_err = Some(Error::Service {
                            service: SERVICE.into(),
                            message: format!("{endpoint} returned {status}: {body}"),
                        });
                        continue;
                    }

                    if status.is_client_error() {
                        let body = resp.text().await.unwrap_or_default();
                        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                            return Err(Error::Auth(format!(
                                "{endpoint} auth failed ({status}): {body}"
                            )));
                        }
                        return Err(Error::Rejected {
                            service: SERVICE.into(),
                            message: format!("{endpoint} returned {status}: {body}"),
                        });
                    }

                    return Ok(resp);
                }
                Err(e) => {
                    TraceEvent::ServiceCall {
                        service: SERVICE.into(),
                        endpoint: endpoint.to_owned(),
                        status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                        duration_ms,
                    }
                    .emit();
                    last_err = Some(from_reqwest(e));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Service {
            service: SERVICE.into(),
            message: format!("{endpoint}: all retries exhausted"),
        }))
    }
}

/// Delay before retry `attempt` (1-based): 100ms, 200ms, 400ms, ...
fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_millis(100 * 2u64.pow(attempt.saturating_sub(1).min(16)))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl Retriever for RestRetriever {
    async fn retrieve(&self, credential: &Credential, query: &str) -> Result<Vec<Document>> {
        let req = RetrieveRequest { user_prompt: query };
        let resp = self
            .execute_with_retry("POST docs", || {
                self.decorate(self.http.post(&self.url), credential).json(&req)
            })
            .await?;

        let body = resp.text().await.map_err(from_reqwest)?;
        let parsed: RetrieveResponse = serde_json::from_str(&body).map_err(|e| Error::Service {
            service: SERVICE.into(),
            message: format!("failed to parse documents response: {e}"),
        })?;
        Ok(parsed.into_documents())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error conversion helper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Convert a `reqwest::Error` into a domain `Error`.
pub fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}
