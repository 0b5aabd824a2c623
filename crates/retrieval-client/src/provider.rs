use async_trait::async_trait;
use pc_domain::document::Document;
use pc_domain::error::Result;
use pc_domain::principal::Credential;

/// Source of context documents for a user prompt.
///
/// Implementations may talk to the real index, a local fixture, or a test
/// double. Callers treat any error as "no documents".
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Documents relevant to `query`, most relevant first.
    async fn retrieve(&self, credential: &Credential, query: &str) -> Result<Vec<Document>>;
}
