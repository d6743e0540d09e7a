use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed trip plan, rejected before any computation starts.
    #[error("invalid trip plan: {0}")]
    Validation(String),
    /// A computation needed data that is not available (never a fabricated value).
    #[error("data unavailable: {0}")]
    DataUnavailable(String),
    /// Coastline dataset missing, corrupt or not loadable.
    #[error("shoreline dataset error: {0}")]
    Shoreline(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }
}
