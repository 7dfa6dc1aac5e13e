//! Request gate
//!
//! Issues grouped, cancellable HTTP fetches identified by a caller-supplied
//! token. The gate owns the token map, the pooled HTTP client and the response
//! cache; callers only see tokens, fetch handles and classified outcomes.
//!
//! # Components
//!
//! - `RequestGate`: token map with `create`/`push`/`cancel`/`remove`
//! - `fetcher`: client builder, status classification, body reading
//! - `cache`: in-memory response cache bounded by a TTL

mod cache;
mod fetcher;
mod requests;

pub use cache::{CachedResponse, ResponseCache};
pub use fetcher::{build_http_client, fetch_url, is_response_ok, FetchedResponse};
pub use requests::{FetchHandle, RequestGate, TokenGuard};

use crate::updater::ResponseState;
use thiserror::Error;

/// Misuse of the token lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("Token already exists: {0}")]
    DuplicateToken(String),

    #[error("Unknown or canceled token: {0}")]
    UnknownToken(String),
}

/// Why a fetch did not produce a response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Request canceled")]
    Canceled,

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP error {status_code}")]
    Http { status_code: u16 },

    #[error("Request failed: {0}")]
    Unknown(String),
}

impl FetchError {
    /// HTTP status code, for HTTP errors
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::Http { status_code } => Some(*status_code),
            _ => None,
        }
    }

    /// How the failure is reported in an update response
    pub fn response_state(&self) -> ResponseState {
        match self {
            FetchError::Canceled => ResponseState::Canceled,
            FetchError::Timeout => ResponseState::Timeout,
            FetchError::Http { .. } | FetchError::Unknown(_) => ResponseState::Error,
        }
    }

    /// Returns true if the failure must abort the whole run
    pub fn is_terminal(&self) -> bool {
        matches!(self, FetchError::Canceled | FetchError::Timeout)
    }

    /// Returns true for a 404 response
    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }
}

impl From<GateError> for FetchError {
    /// A token that vanished under the caller means the batch was canceled
    fn from(error: GateError) -> Self {
        match error {
            GateError::UnknownToken(_) => FetchError::Canceled,
            GateError::DuplicateToken(_) => FetchError::Unknown(error.to_string()),
        }
    }
}
