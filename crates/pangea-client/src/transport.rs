//! HTTP plumbing shared by every security-service client.
//!
//! Every service speaks the same envelope (`{request_id, status, summary,
//! result}`), authenticates with a bearer token and may answer `202 Accepted`
//! when the work is still running. [`PangeaTransport`] handles all three so
//! the per-service clients only describe their request and result types.

use std::time::{Duration, Instant};

use pc_domain::config::PangeaConfig;
use pc_domain::error::{Error, Result};
use pc_domain::principal::Credential;
use pc_domain::trace::TraceEvent;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

const SUCCESS: &str = "Success";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connection pool plus URL and polling settings. Created once and shared
/// (behind an `Arc`) by every service client.
#[derive(Debug, Clone)]
pub struct PangeaTransport {
    http: Client,
    domain: String,
    url_template: String,
    poll_max_attempts: u32,
    poll_base_delay: Duration,
}

impl PangeaTransport {
    pub fn new(cfg: &PangeaConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            http,
            domain: cfg.base_domain.trim_end_matches('/').to_owned(),
            url_template: cfg.url_template.clone(),
            poll_max_attempts: cfg.poll_max_attempts,
            poll_base_delay: Duration::from_millis(cfg.poll_base_delay_ms),
        })
    }

    /// Full URL of `path` on `service`.
    pub fn url(&self, service: &str, path: &str) -> String {
        render_url(&self.url_template, service, &self.domain, path)
    }

    fn decorate(&self, rb: RequestBuilder, credential: &Credential) -> RequestBuilder {
        rb.header(reqwest::header::AUTHORIZATION, credential.bearer())
            .header(
                reqwest::header::USER_AGENT,
                concat!("pangea-chat/", env!("CARGO_PKG_VERSION")),
            )
            .header("X-Trace-Id", Uuid::new_v4().to_string())
    }

    /// POST `body` to `service`/`path` and return the envelope's `result`.
    ///
    /// A `202 Accepted` is followed up by polling the request's result
    /// location; giving up yields [`Error::PollExhausted`].
    pub async fn post<B, R>(
        &self,
        service: &str,
        path: &str,
        credential: &Credential,
        body: &B,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url(service, path);
        let endpoint = format!("POST /{path}");
        tracing::debug!(service, url = %url, "service request");

        let start = Instant::now();
        let sent = self
            .decorate(self.http.post(&url), credential)
            .json(body)
            .send()
            .await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let resp = match sent {
            Ok(resp) => resp,
            Err(e) => {
                TraceEvent::ServiceCall {
                    service: service.to_owned(),
                    endpoint,
                    status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                    duration_ms,
                }
                .emit();
                return Err(from_reqwest(e));
            }
        };

        let status = resp.status();
        TraceEvent::ServiceCall {
            service: service.to_owned(),
            endpoint,
            status: status.as_u16(),
            duration_ms,
        }
        .emit();

        let text = resp.text().await.map_err(from_reqwest)?;
        let (status, text) = if status == StatusCode::ACCEPTED {
            self.await_async(service, credential, &text).await?
        } else {
            (status, text)
        };

        check_status(service, status, &text)?;
        parse_envelope(service, &text)
    }

    // ── async long-poll ──────────────────────────────────────────────

    async fn await_async(
        &self,
        service: &str,
        credential: &Credential,
        accepted_body: &str,
    ) -> Result<(StatusCode, String)> {
        let request_id = serde_json::from_str::<Value>(accepted_body)
            .ok()
            .and_then(|v| v.get("request_id")?.as_str().map(str::to_owned))
            .ok_or_else(|| Error::Service {
                service: service.to_owned(),
                message: "202 Accepted without a request_id".into(),
            })?;

        let url = self.url(service, &format!("request/{request_id}"));

        for attempt in 1..=self.poll_max_attempts {
            tokio::time::sleep(poll_backoff(attempt, self.poll_base_delay)).await;

            let resp = self
                .decorate(self.http.get(&url), credential)
                .send()
                .await
                .map_err(from_reqwest)?;
            let status = resp.status();

            TraceEvent::AsyncPoll {
                service: service.to_owned(),
                request_id: request_id.clone(),
                attempt,
                status: status.as_u16(),
            }
            .emit();

            let text = resp.text().await.map_err(from_reqwest)?;
            if status != StatusCode::ACCEPTED {
                return Ok((status, text));
            }
        }

        tracing::warn!(
            service,
            request_id = %request_id,
            attempts = self.poll_max_attempts,
            "async request still pending, giving up"
        );
        Err(Error::PollExhausted {
            service: service.to_owned(),
            request_id,
            attempts: self.poll_max_attempts,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    result: Option<Value>,
}

pub(crate) fn render_url(template: &str, service: &str, domain: &str, path: &str) -> String {
    template
        .replace("{service}", service)
        .replace("{domain}", domain)
        .replace("{path}", path.trim_start_matches('/'))
}

/// Delay before poll `attempt` (1-based): `attempt² × base`.
pub fn poll_backoff(attempt: u32, base: Duration) -> Duration {
    base * attempt.saturating_mul(attempt)
}

/// Map a non-2xx status to the error taxonomy.
pub(crate) fn check_status(service: &str, status: StatusCode, body: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Error::Auth(format!(
            "{service} rejected the credential ({})",
            status.as_u16()
        )));
    }
    let message = summarize(body);
    if status.is_client_error() {
        Err(Error::Rejected {
            service: service.to_owned(),
            message,
        })
    } else {
        Err(Error::Service {
            service: service.to_owned(),
            message: format!("{}: {message}", status.as_u16()),
        })
    }
}

/// Decode the envelope and return its `result` as `R`.
pub(crate) fn parse_envelope<R: DeserializeOwned>(service: &str, body: &str) -> Result<R> {
    let envelope: Envelope = serde_json::from_str(body).map_err(|e| Error::Service {
        service: service.to_owned(),
        message: format!("malformed response envelope: {e}"),
    })?;

    if envelope.status != SUCCESS {
        return Err(Error::Rejected {
            service: service.to_owned(),
            message: envelope.summary.unwrap_or(envelope.status),
        });
    }

    serde_json::from_value(envelope.result.unwrap_or(Value::Null)).map_err(|e| Error::Service {
        service: service.to_owned(),
        message: format!("unexpected result shape: {e}"),
    })
}

fn summarize(body: &str) -> String {
    let from_envelope = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        v.get("summary")
            .and_then(Value::as_str)
            .map(str::to_owned)
    });
    from_envelope.unwrap_or_else(|| body.chars().take(200).collect())
}

/// Convert a `reqwest::Error` into a domain `Error`.
pub fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}
