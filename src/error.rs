//! Error types for session, token and API operations
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("No authorization code received")]
    MissingCode,

    #[error("Invalid state parameter")]
    InvalidState,

    #[error("Callback already handled")]
    CallbackAlreadyHandled,

    #[error("Token exchange failed: {0}")]
    AuthExchangeFailed(String),

    #[error("Authentication expired")]
    TokenExpired,

    #[error("No access token available")]
    NoToken,

    #[error("Upstream error ({status}): {body}")]
    UpstreamError { status: u16, body: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Failed to fetch user profile: {0}")]
    ProfileFetchFailed(Box<AuthError>),

    #[error("Authentication timeout")]
    CallbackTimeout,

    #[error("Invalid Spotify ID: {0}")]
    InvalidId(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AuthError {
    /// Fixed message shown to the user when a callback attempt fails.
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::AuthorizationDenied(_) => "Authentication was cancelled or failed",
            AuthError::MissingCode => "No authorization code received",
            AuthError::CallbackTimeout => "Authentication timeout",
            _ => "Failed to authenticate with Spotify",
        }
    }

    /// Whether the error means the stored session is no longer usable.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            AuthError::TokenExpired | AuthError::NoToken => true,
            AuthError::ProfileFetchFailed(inner) => inner.is_auth_failure(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
