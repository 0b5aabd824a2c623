/// Shared error type used across all Pangea Chat crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// Credential rejected (HTTP 401/403). Forces re-authentication.
    #[error("auth: {0}")]
    Auth(String),

    /// Request or policy rejection (HTTP 400, or a non-`Success` envelope).
    #[error("rejected by {service}: {message}")]
    Rejected { service: String, message: String },

    /// Server-side failure (5xx) or a response we could not interpret.
    #[error("{service}: {message}")]
    Service { service: String, message: String },

    /// An async request was still processing after the last poll.
    #[error("{service}: request {request_id} still processing after {attempts} polls")]
    PollExhausted {
        service: String,
        request_id: String,
        attempts: u32,
    },

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True when the failure means the bearer credential is no longer valid.
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    /// True for failures worth retrying (network, timeout, 5xx, poll give-up).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Timeout(_) | Error::Service { .. } | Error::PollExhausted { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_is_not_transient() {
        let err = Error::Auth("403".into());
        assert!(err.is_auth());
        assert!(!err.is_transient());
    }

    #[test]
    fn poll_exhausted_is_transient() {
        let err = Error::PollExhausted {
            service: "audit".into(),
            request_id: "prq_1".into(),
            attempts: 3,
        };
        assert!(err.is_transient());
        assert!(err.to_string().contains("prq_1"));
    }

    #[test]
    fn rejection_is_neither() {
        let err = Error::Rejected {
            service: "ai-guard".into(),
            message: "ValidationError".into(),
        };
        assert!(!err.is_auth());
        assert!(!err.is_transient());
    }
}
