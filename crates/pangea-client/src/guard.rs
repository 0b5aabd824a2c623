//! Content-safety guard client.
//!
//! The guard answers in one of two generations (see
//! [`pc_domain::guard::GuardResult`]). [`decode_guard_result`] probes the
//! raw result once and nothing downstream looks at the wire again.

use std::sync::Arc;

use async_trait::async_trait;
use pc_domain::config::GuardConfig;
use pc_domain::error::{Error, Result};
use pc_domain::guard::{GuardPayload, GuardResult, GuardV1, GuardV2};
use pc_domain::principal::Credential;
use serde_json::Value;

use crate::transport::PangeaTransport;

/// One guard call: a recipe, the payload to scan, optional detector overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardRequest {
    pub recipe: String,
    pub payload: GuardPayload,
    pub overrides: Option<Value>,
}

impl GuardRequest {
    pub fn text(recipe: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            recipe: recipe.into(),
            payload: GuardPayload::Text(text.into()),
            overrides: None,
        }
    }

    pub fn with_overrides(mut self, overrides: Value) -> Self {
        self.overrides = Some(overrides);
        self
    }

    /// `{recipe, text | messages, overrides?}`
    pub fn to_body(&self) -> Value {
        let mut body = serde_json::json!({ "recipe": self.recipe });
        match &self.payload {
            GuardPayload::Text(text) => body["text"] = Value::String(text.clone()),
            GuardPayload::Messages(messages) => {
                body["messages"] = serde_json::to_value(messages).unwrap_or(Value::Null)
            }
        }
        if let Some(overrides) = &self.overrides {
            body["overrides"] = overrides.clone();
        }
        body
    }
}

#[async_trait]
pub trait Guard: Send + Sync {
    async fn guard(&self, credential: &Credential, req: GuardRequest) -> Result<GuardResult>;
}

/// Resolve the response generation from its shape.
///
/// `detectors` means the newer schema; `findings` or a top-level `detected`
/// flag means the older one. Anything else is a service error.
pub fn decode_guard_result(service: &str, raw: Value) -> Result<GuardResult> {
    let shape_err = |e: serde_json::Error| Error::Service {
        service: service.to_owned(),
        message: format!("unexpected guard result: {e}"),
    };

    let Some(obj) = raw.as_object() else {
        return Err(Error::Service {
            service: service.to_owned(),
            message: "guard result is not an object".into(),
        });
    };

    if obj.contains_key("detectors") {
        let v2: GuardV2 = serde_json::from_value(raw).map_err(shape_err)?;
        Ok(GuardResult::V2(v2))
    } else if obj.contains_key("findings") || obj.contains_key("detected") {
        let v1: GuardV1 = serde_json::from_value(raw).map_err(shape_err)?;
        Ok(GuardResult::V1(v1))
    } else {
        Err(Error::Service {
            service: service.to_owned(),
            message: "guard result has neither detectors nor findings".into(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RestGuardClient {
    transport: Arc<PangeaTransport>,
    service: String,
    path: String,
}

impl RestGuardClient {
    pub fn new(transport: Arc<PangeaTransport>, cfg: &GuardConfig) -> Self {
        Self {
            transport,
            service: cfg.service.clone(),
            path: cfg.path.clone(),
        }
    }
}

#[async_trait]
impl Guard for RestGuardClient {
    async fn guard(&self, credential: &Credential, req: GuardRequest) -> Result<GuardResult> {
        let raw: Value = self
            .transport
            .post(&self.service, &self.path, credential, &req.to_body())
            .await?;
        decode_guard_result(&self.service, raw)
    }
}
