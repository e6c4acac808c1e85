use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Local pre-flight validation failure; no network call was made.
    #[error("{0}")]
    Validation(&'static str),

    /// No usable response was obtained (connect failure, timeout). The
    /// stored session is untouched.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("{message}")]
    RequestFailed {
        status: u16,
        message: String,
        details: Option<String>,
    },

    /// A refresh could not restore a valid session. The session has been
    /// cleared; the user must log in again.
    #[error("session expired, please log in again")]
    SessionExpired,

    /// Refresh was requested with no stored session.
    #[error("no refresh token available")]
    NoRefreshToken,

    /// The durable session store itself failed.
    #[error("session store error: {0}")]
    Store(#[from] rusqlite::Error),
}
