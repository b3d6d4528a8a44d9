/// Errors surfaced by backend calls and the session store.
///
/// Display strings are user-facing; callers can show them verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The backend answered 2xx but the payload was not what we expected
    /// (e.g. a login response without a token or user).
    #[error("Invalid server response: {0}")]
    InvalidServerResponse(String),

    /// No response at all: connection failure or timeout.
    #[error("Network error. Check your connection.")]
    Network { detail: String },

    /// 401 on an authenticated call. Local session state has been cleared.
    #[error("Session expired. Please log in again.")]
    SessionExpired,

    /// 5xx from the backend.
    #[error("Server error. Please try again later.")]
    Server { status: u16 },

    /// Any other error status, carrying the backend message when present.
    #[error("{message}")]
    Api { status: u16, message: String },

    /// `login` was called before the persisted session finished loading.
    #[error("Session is still loading")]
    NotReady,

    /// Client-side validation failed before any request was sent.
    #[error("{0}")]
    InvalidInput(String),
}

impl Error {
    /// HTTP status associated with the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::SessionExpired => Some(401),
            Self::Server { status } | Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Errors a user can reasonably retry by re-navigating.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Server { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
