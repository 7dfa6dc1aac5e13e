/// Update run state definitions
///
/// This module defines the phases an update run moves through, the two run
/// modes, and the terminal responses reported to observers.
use crate::gate::FetchError;
use std::fmt;

/// Represents the current phase of an update run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdatePhase {
    // ===== Active Phases =====
    /// Run registered but not started
    Idle,

    /// Checking that the last stored page still exists and is unchanged
    Verifying,

    /// Probing candidate links for the next page
    LocatingNextPage,

    /// Confirming a candidate links back to the current page
    VerifyingBackLink,

    /// Picking the image of the accepted next page
    FetchingImage,

    /// Writing the new page to the store
    Persisting,

    // ===== Terminal Phases =====
    /// Run finished normally (with or without new pages)
    Done,

    /// Run failed
    Error,

    /// Run was stopped
    Canceled,
}

impl UpdatePhase {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Canceled)
    }

    /// Returns true if moving from `self` to `next` is legal
    ///
    /// Any active phase may end the run and may repeat itself (retries,
    /// successive candidates). Terminal phases never change.
    pub fn can_transition_to(&self, next: UpdatePhase) -> bool {
        use UpdatePhase::*;

        if self.is_terminal() {
            return false;
        }
        if next.is_terminal() || *self == next {
            return true;
        }

        matches!(
            (self, next),
            (Idle, Verifying)
                | (Verifying, LocatingNextPage)
                | (Verifying, FetchingImage)
                | (LocatingNextPage, VerifyingBackLink)
                | (VerifyingBackLink, LocatingNextPage)
                | (VerifyingBackLink, FetchingImage)
                | (LocatingNextPage, FetchingImage)
                | (FetchingImage, Persisting)
                | (Persisting, LocatingNextPage)
        )
    }

    /// Terminal phase matching a final response
    pub fn for_response(response: &UpdateResponse) -> Self {
        match response.state() {
            ResponseState::Success => Self::Done,
            ResponseState::Canceled => Self::Canceled,
            ResponseState::Error | ResponseState::Timeout => Self::Error,
        }
    }
}

impl fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Verifying => "verifying",
            Self::LocatingNextPage => "locating_next_page",
            Self::VerifyingBackLink => "verifying_back_link",
            Self::FetchingImage => "fetching_image",
            Self::Persisting => "persisting",
            Self::Done => "done",
            Self::Error => "error",
            Self::Canceled => "canceled",
        };
        write!(f, "{}", name)
    }
}

/// How much a run fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateMode {
    /// One discovery step, at most one new page
    SinglePage,

    /// Throttled loop of discovery steps bounded by the page limit
    MultiplePages,
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SinglePage => write!(f, "single-page"),
            Self::MultiplePages => write!(f, "multi-page"),
        }
    }
}

/// Outcome class of a fetch or a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseState {
    Success,
    Error,
    Timeout,
    Canceled,
}

/// Final response of an update run
///
/// Finding nothing new is a `Success` with an explanatory message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateResponse {
    Success {
        message: String,
    },
    Error {
        message: String,
        status_code: Option<u16>,
    },
    Timeout,
    Canceled,
}

impl UpdateResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self::Success {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            status_code: None,
        }
    }

    /// Response reporting a failed fetch
    pub fn from_fetch_error(error: &FetchError) -> Self {
        match error {
            FetchError::Canceled => Self::Canceled,
            FetchError::Timeout => Self::Timeout,
            FetchError::Http { status_code } => Self::Error {
                message: error.to_string(),
                status_code: Some(*status_code),
            },
            FetchError::Unknown(_) => Self::error(error.to_string()),
        }
    }

    pub fn state(&self) -> ResponseState {
        match self {
            Self::Success { .. } => ResponseState::Success,
            Self::Error { .. } => ResponseState::Error,
            Self::Timeout => ResponseState::Timeout,
            Self::Canceled => ResponseState::Canceled,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success { message } | Self::Error { message, .. } => Some(message),
            Self::Timeout | Self::Canceled => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Error { status_code, .. } => *status_code,
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl fmt::Display for UpdateResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { message } => write!(f, "{}", message),
            Self::Error { message, .. } => write!(f, "Error: {}", message),
            Self::Timeout => write!(f, "Timed out"),
            Self::Canceled => write!(f, "Canceled"),
        }
    }
}

/// Status update emitted at every step of a run
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateEvent {
    pub comic_id: i64,
    pub mode: UpdateMode,
    pub phase: UpdatePhase,

    /// Human-readable progress of the current step
    pub progress: Option<String>,

    /// Set on intermediate multi-page reports and on the final event
    pub response: Option<UpdateResponse>,
}

impl UpdateEvent {
    /// Returns true for the last event of a run
    pub fn is_final(&self) -> bool {
        self.phase.is_terminal()
    }
}
