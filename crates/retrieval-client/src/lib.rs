//! `pc-retrieval` — knowledge-base document retrieval.
//!
//! [`Retriever`] abstracts the vector-index lookup behind the chat's
//! knowledge-base toggle; [`RestRetriever`] is the HTTP implementation with
//! retry and back-off on transient failures.

pub mod provider;
pub mod rest;
pub mod types;

pub use provider::Retriever;
pub use rest::{from_reqwest, RestRetriever};
pub use types::{DocumentDto, RetrieveRequest, RetrieveResponse};
