//! `pc-pangea` — clients for the security services a chat turn passes
//! through: audit log, content guard, authorization, unredaction and the
//! token check.
//!
//! Each collaborator is an `async_trait` trait with a REST implementation.
//! All REST implementations share one [`PangeaTransport`], which owns the
//! connection pool, the response-envelope check and the `202 Accepted`
//! long-poll.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pc_domain::config::Config;
//! use pc_domain::principal::Credential;
//! use pc_pangea::{GuardRequest, Guard, PangeaTransport, RestGuardClient};
//!
//! # async fn example() -> pc_domain::error::Result<()> {
//! let cfg = Config::default();
//! let transport = Arc::new(PangeaTransport::new(&cfg.pangea)?);
//! let guard = RestGuardClient::new(transport, &cfg.guard);
//!
//! let verdict = guard
//!     .guard(
//!         &Credential::new("pts_..."),
//!         GuardRequest::text(&cfg.guard.input_recipe, "hello"),
//!     )
//!     .await?;
//! println!("detected: {}", verdict.detected());
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod authn;
pub mod authz;
pub mod guard;
pub mod redact;
pub mod transport;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use audit::{
    AuditEvent, AuditLog, AuditRecord, RestAuditClient, SearchRequest, SearchRestriction,
    SearchResult, StoredEnvelope, StoredEvent,
};
pub use authn::{RestTokenChecker, TokenChecker, TokenInfo};
pub use authz::{Authorizer, RestAuthorizer};
pub use guard::{decode_guard_result, Guard, GuardRequest, RestGuardClient};
pub use redact::{RestUnredactor, Unredactor};
pub use transport::{from_reqwest, poll_backoff, PangeaTransport};
