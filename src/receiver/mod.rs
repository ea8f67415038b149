//! Inbound side of propagation: verify and apply invalidations from peers

mod endpoint;
mod replay;

pub use endpoint::{ReceiveError, ReceiverEndpoint};
pub use replay::{ReplayCache, ReplayCheck};

use axum::http::StatusCode;

/// Result of handling one inbound invalidation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Accepted,
    RejectedSignature,
    RejectedReplay,
    RejectedStale,
    RejectedMalformed,
    /// Valid message for a session this node does not hold. Not an error.
    LocalSessionNotFound,
}

impl ReceiveOutcome {
    /// Reason code returned in rejection bodies and used as metric label
    pub fn reason_code(self) -> &'static str {
        match self {
            ReceiveOutcome::Accepted => "ACCEPTED",
            ReceiveOutcome::RejectedSignature => "REJECTED_SIGNATURE",
            ReceiveOutcome::RejectedReplay => "REJECTED_REPLAY",
            ReceiveOutcome::RejectedStale => "REJECTED_STALE",
            ReceiveOutcome::RejectedMalformed => "REJECTED_MALFORMED",
            ReceiveOutcome::LocalSessionNotFound => "LOCAL_SESSION_NOT_FOUND",
        }
    }

    /// Whether the sender should consider the message delivered
    pub fn is_success(self) -> bool {
        matches!(
            self,
            ReceiveOutcome::Accepted | ReceiveOutcome::LocalSessionNotFound
        )
    }

    pub fn status_code(self) -> StatusCode {
        match self {
            ReceiveOutcome::Accepted | ReceiveOutcome::LocalSessionNotFound => StatusCode::OK,
            ReceiveOutcome::RejectedSignature => StatusCode::UNAUTHORIZED,
            ReceiveOutcome::RejectedReplay => StatusCode::CONFLICT,
            ReceiveOutcome::RejectedStale | ReceiveOutcome::RejectedMalformed => {
                StatusCode::BAD_REQUEST
            }
        }
    }

    /// Response body: `OK` on success, the reason code otherwise
    pub fn body(self) -> &'static str {
        if self.is_success() {
            "OK"
        } else {
            self.reason_code()
        }
    }
}

impl std::fmt::Display for ReceiveOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason_code())
    }
}
