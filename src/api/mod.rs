//! Wire-format JSON objects.
//!
//! Not intended to be used directly. Provided to aid debugging.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

mod directory;

pub use self::directory::{DirectoryDoc, DirectoryMeta};

/// Mapping of ACME problem types to the abstract error taxonomy.
///
/// Entries are matched after stripping the `urn:ietf:params:` or `urn:`
/// prefix, so both RFC 8555 (`urn:ietf:params:acme:error:*`) and legacy
/// draft (`urn:acme:error:*`) spellings resolve to the same class.
const PROBLEM_KINDS: &[(&str, ErrorKind)] = &[
    ("acme:error:badCSR", ErrorKind::Invalid),
    ("acme:error:badNonce", ErrorKind::Transient),
    ("acme:error:badSignatureAlgorithm", ErrorKind::Invalid),
    ("acme:error:invalidContact", ErrorKind::BadArg),
    ("acme:error:unsupportedContact", ErrorKind::General),
    ("acme:error:malformed", ErrorKind::Invalid),
    ("acme:error:rateLimited", ErrorKind::BadArg),
    ("acme:error:rejectedIdentifier", ErrorKind::BadArg),
    ("acme:error:serverInternal", ErrorKind::General),
    ("acme:error:unauthorized", ErrorKind::Forbidden),
    ("acme:error:unsupportedIdentifier", ErrorKind::BadArg),
    ("acme:error:userActionRequired", ErrorKind::Transient),
    ("acme:error:badRevocationReason", ErrorKind::Invalid),
    ("acme:error:caa", ErrorKind::General),
    ("acme:error:dns", ErrorKind::General),
    ("acme:error:connection", ErrorKind::General),
    ("acme:error:tls", ErrorKind::General),
    ("acme:error:incorrectResponse", ErrorKind::General),
];

/// Problem document per [RFC 7807], as served with
/// `Content-Type: application/problem+json`.
///
/// [RFC 7807]: https://datatracker.ietf.org/doc/html/rfc7807
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type", default)]
    pub _type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subproblems: Option<Vec<Subproblem>>,
}

impl Problem {
    /// Classify the problem type into the abstract taxonomy.
    ///
    /// Unknown types map to [`ErrorKind::General`], never to success.
    pub fn kind(&self) -> ErrorKind {
        let _type = self._type.as_str();
        let _type = _type
            .strip_prefix("urn:ietf:params:")
            .or_else(|| _type.strip_prefix("urn:"))
            .unwrap_or(_type);

        PROBLEM_KINDS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(_type))
            .map(|&(_, kind)| kind)
            .unwrap_or(ErrorKind::General)
    }

    /// Returns true if the problem triggers the pipeline's nonce recovery.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self._type),
            None => write!(f, "{}", self._type),
        }
    }
}

impl std::error::Error for Problem {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subproblem {
    #[serde(rename = "type")]
    pub _type: String,
    pub detail: Option<String>,
    pub identifier: Option<Identifier>,
}

/// An order identifier, carried in subproblems to point at the offending
/// domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub _type: String,
    pub value: String,
}
