//! Per-document authorization checks.

use std::sync::Arc;

use async_trait::async_trait;
use pc_domain::error::Result;
use pc_domain::principal::Credential;
use serde::Deserialize;
use serde_json::Value;

use crate::transport::PangeaTransport;

const SERVICE: &str = "authz";

#[async_trait]
pub trait Authorizer: Send + Sync {
    /// May `subject` read the document `document_id`?
    async fn check(&self, credential: &Credential, subject: &str, document_id: &str)
        -> Result<bool>;
}

#[derive(Debug, Deserialize)]
struct CheckResult {
    #[serde(default)]
    allowed: bool,
}

/// `{subject:{type:"user",id}, action:"read", resource:{type:"file",id}}`
pub fn check_body(subject: &str, document_id: &str) -> Value {
    serde_json::json!({
        "subject": { "type": "user", "id": subject },
        "action": "read",
        "resource": { "type": "file", "id": document_id },
        "debug": false,
    })
}

#[derive(Debug, Clone)]
pub struct RestAuthorizer {
    transport: Arc<PangeaTransport>,
}

impl RestAuthorizer {
    pub fn new(transport: Arc<PangeaTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Authorizer for RestAuthorizer {
    async fn check(
        &self,
        credential: &Credential,
        subject: &str,
        document_id: &str,
    ) -> Result<bool> {
        let out: CheckResult = self
            .transport
            .post(SERVICE, "v1/check", credential, &check_body(subject, document_id))
            .await?;
        Ok(out.allowed)
    }
}
