use std::collections::HashMap;

use pc_domain::document::Document;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveRequest<'a> {
    pub user_prompt: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDto {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub page_content: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrieveResponse {
    #[serde(default)]
    pub documents: Vec<DocumentDto>,
}

impl RetrieveResponse {
    /// Convert to domain documents, keeping index order. Documents the index
    /// returned without an id get a positional one (`doc-<n>`).
    pub fn into_documents(self) -> Vec<Document> {
        self.documents
            .into_iter()
            .enumerate()
            .map(|(i, dto)| Document {
                id: dto
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| format!("doc-{i}")),
                content: dto.page_content,
                metadata: dto.metadata,
            })
            .collect()
    }
}
