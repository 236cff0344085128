use std::fmt;

use crate::{api::Problem, store::StoreError};

pub type Result<T> = std::result::Result<T, AcmeError>;

/// Abstract outcome classification for ACME operations.
///
/// Success is expressed as `Ok(())`; everything here is an error class.
/// [`Transient`](ErrorKind::Transient) is special: the request pipeline
/// recovers from it internally by re-sending with a fresh nonce, so callers
/// only observe it once the retry budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Protocol violation: malformed input, unparseable response, unknown
    /// dialect, missing directory endpoints, bad CSR or signature algorithm.
    Invalid,

    /// The server rejected the request's arguments (rate limit, rejected or
    /// unsupported identifier, invalid contact).
    BadArg,

    /// Unauthorized.
    Forbidden,

    /// Resource absent; also an account recorded for a different CA.
    NotFound,

    /// `badNonce` / `userActionRequired`; retried automatically.
    Transient,

    /// Catch-all server-side failure and unknown problem types.
    General,

    /// HTTP method other than GET/HEAD/POST.
    NotImplemented,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Invalid => "invalid",
            ErrorKind::BadArg => "bad-arg",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Transient => "transient",
            ErrorKind::General => "general",
            ErrorKind::NotImplemented => "not-implemented",
        };
        f.write_str(name)
    }
}

/// Error type for all session and pipeline operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AcmeError {
    /// An RFC 7807 problem document returned by the CA.
    #[error(transparent)]
    Problem(#[from] Problem),

    /// A non-2xx response without a usable problem document.
    #[error("unexpected HTTP status {status}: {detail}")]
    Status { status: u16, detail: String },

    /// The exchange violated the protocol as this client understands it.
    #[error("{0}")]
    Protocol(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Only GET, HEAD and POST are part of the ACME wire protocol.
    #[error("HTTP method {0} not supported")]
    NotImplemented(reqwest::Method),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Account key material could not be read or used.
    #[error("key error: {0}")]
    Key(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AcmeError {
    /// Classify this error per the ACME problem taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AcmeError::Problem(problem) => problem.kind(),
            AcmeError::Status { status, .. } => match status {
                400 => ErrorKind::Invalid,
                403 => ErrorKind::Forbidden,
                404 => ErrorKind::NotFound,
                _ => ErrorKind::General,
            },
            AcmeError::Protocol(_) | AcmeError::Json(_) | AcmeError::Key(_) => ErrorKind::Invalid,
            AcmeError::NotFound(_) => ErrorKind::NotFound,
            AcmeError::NotImplemented(_) => ErrorKind::NotImplemented,
            AcmeError::Transport(_) => ErrorKind::General,
            AcmeError::Store(err) => err.kind(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        AcmeError::Protocol(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_fallback_mapping() {
        let kind = |status| {
            AcmeError::Status {
                status,
                detail: String::new(),
            }
            .kind()
        };

        assert_eq!(kind(400), ErrorKind::Invalid);
        assert_eq!(kind(403), ErrorKind::Forbidden);
        assert_eq!(kind(404), ErrorKind::NotFound);
        assert_eq!(kind(500), ErrorKind::General);
        assert_eq!(kind(503), ErrorKind::General);
    }

    #[test]
    fn method_not_implemented() {
        let err = AcmeError::NotImplemented(reqwest::Method::DELETE);
        assert_eq!(err.kind(), ErrorKind::NotImplemented);
    }
}
