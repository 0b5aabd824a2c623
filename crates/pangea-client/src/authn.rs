//! Bearer-token check: who does this credential belong to?

use std::sync::Arc;

use async_trait::async_trait;
use pc_domain::error::{Error, Result};
use pc_domain::principal::{Credential, Profile};
use serde::Deserialize;

use crate::transport::PangeaTransport;

const SERVICE: &str = "authn";

/// Identity behind a valid token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenInfo {
    pub owner: String,
    #[serde(default)]
    pub profile: Profile,
}

#[async_trait]
pub trait TokenChecker: Send + Sync {
    /// Resolve `token`. An unknown or expired token is [`Error::Auth`].
    async fn check(&self, token: &Credential) -> Result<TokenInfo>;
}

/// Token check authorized by the application's client token. Without one,
/// the checked token authorizes its own check.
#[derive(Debug, Clone)]
pub struct RestTokenChecker {
    transport: Arc<PangeaTransport>,
    client_token: Option<Credential>,
}

impl RestTokenChecker {
    pub fn new(transport: Arc<PangeaTransport>, client_token: Option<Credential>) -> Self {
        Self {
            transport,
            client_token,
        }
    }
}

#[async_trait]
impl TokenChecker for RestTokenChecker {
    async fn check(&self, token: &Credential) -> Result<TokenInfo> {
        let body = serde_json::json!({ "token": token.expose() });
        let authorizer = self.client_token.as_ref().unwrap_or(token);
        let info: TokenInfo = self
            .transport
            .post(SERVICE, "v2/client/token/check", authorizer, &body)
            .await
            .map_err(|e| match e {
                // A rejected token check means the user's token is bad.
                Error::Rejected { message, .. } => Error::Auth(message),
                other => other,
            })?;
        if info.owner.is_empty() {
            return Err(Error::Auth("token has no owner".into()));
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_info_parses_profile() {
        let json = r#"{
            "owner": "alice@example.com",
            "profile": { "first_name": "Alice", "last_name": "Liddell" },
            "type": "user"
        }"#;
        let info: TokenInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.owner, "alice@example.com");
        assert_eq!(info.profile.first_name.as_deref(), Some("Alice"));
    }
}
