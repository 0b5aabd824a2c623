//! Knowledge-base context for a turn: retrieval, then per-document
//! authorization.
//!
//! Both steps degrade instead of failing. A retrieval error yields no
//! documents; a failed authorization check denies that one document.

use futures_util::future::join_all;

use pc_domain::document::{AuthzDecision, Document};
use pc_domain::principal::Principal;
use pc_pangea::Authorizer;
use pc_retrieval::Retriever;

/// Candidates for `query`, or none when retrieval fails.
pub async fn retrieve_documents(
    retriever: &dyn Retriever,
    principal: &Principal,
    query: &str,
) -> Vec<Document> {
    match retriever.retrieve(&principal.credential, query).await {
        Ok(docs) => docs,
        Err(e) => {
            tracing::warn!(
                username = %principal.username,
                error = %e,
                "retrieval failed, continuing without document context"
            );
            Vec::new()
        }
    }
}

/// Check every document concurrently and keep the allowed ones in their
/// original order. Returns the kept documents and one decision per input
/// document.
pub async fn authorize_documents(
    authz: &dyn Authorizer,
    principal: &Principal,
    documents: Vec<Document>,
) -> (Vec<Document>, Vec<AuthzDecision>) {
    let checks = documents
        .iter()
        .map(|doc| authz.check(&principal.credential, &principal.username, &doc.id));
    let verdicts = join_all(checks).await;

    let mut allowed = Vec::with_capacity(documents.len());
    let mut decisions = Vec::with_capacity(documents.len());
    for (doc, verdict) in documents.into_iter().zip(verdicts) {
        let decision = match verdict {
            Ok(ok) => AuthzDecision {
                document_id: doc.id.clone(),
                allowed: ok,
                error: None,
            },
            Err(e) => {
                tracing::warn!(document_id = %doc.id, error = %e, "authz check failed, denying");
                AuthzDecision {
                    document_id: doc.id.clone(),
                    allowed: false,
                    error: Some(e.to_string()),
                }
            }
        };
        if decision.allowed {
            allowed.push(doc);
        }
        decisions.push(decision);
    }
    (allowed, decisions)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use pc_domain::error::{Error, Result};
    use pc_domain::principal::{Credential, Profile};

    use super::*;

    fn principal() -> Principal {
        Principal {
            username: "bob@example.com".into(),
            profile: Profile::default(),
            credential: Credential::new("t"),
            is_exempt: false,
        }
    }

    fn doc(id: &str) -> Document {
        Document {
            id: id.into(),
            content: format!("content of {id}"),
            metadata: Default::default(),
        }
    }

    /// Answers slowest for the first document so completion order differs
    /// from retrieval order.
    struct Rules;

    #[async_trait]
    impl Authorizer for Rules {
        async fn check(&self, _c: &Credential, _s: &str, document_id: &str) -> Result<bool> {
            match document_id {
                "a" => {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok(true)
                }
                "b" => Ok(false),
                "c" => Ok(true),
                _ => Err(Error::Http("connection reset".into())),
            }
        }
    }

    struct Broken;

    #[async_trait]
    impl Retriever for Broken {
        async fn retrieve(&self, _c: &Credential, _q: &str) -> Result<Vec<Document>> {
            Err(Error::Timeout("index".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_allowed_in_retrieval_order() {
        let (kept, decisions) =
            authorize_documents(&Rules, &principal(), vec![doc("a"), doc("b"), doc("c")]).await;
        let ids: Vec<_> = kept.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
        assert_eq!(decisions.len(), 3);
        assert!(!decisions[1].allowed);
    }

    #[tokio::test]
    async fn failed_check_denies_with_error() {
        let (kept, decisions) = authorize_documents(&Rules, &principal(), vec![doc("zzz")]).await;
        assert!(kept.is_empty());
        assert!(decisions[0].error.as_deref().unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn retrieval_failure_is_empty() {
        assert!(retrieve_documents(&Broken, &principal(), "q").await.is_empty());
    }
}
