use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("instance request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("instance rejected app registration: {0}")]
    Rejected(String),
    #[error("invalid instance host: {0}")]
    InvalidHost(String),
}

#[derive(Debug, Error)]
pub enum AuthExchangeError {
    #[error("token request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("instance rejected authorization code: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected response from instance: {0}")]
    BadResponse(String),
}

/// A stored secret could not be opened: foreign key, truncated envelope,
/// or corrupted storage. The session holding it is unusable.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed secret envelope")]
    Envelope,
    #[error("secret failed authentication")]
    Crypto,
    #[error("secret is not valid utf8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Umbrella error for session engine operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Exchange(#[from] AuthExchangeError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("session secrets unreadable, session was reset: {0}")]
    Codec(#[from] CodecError),
}
