use thiserror::Error;

#[derive(Debug, Error)]
pub enum DemodError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("component is running; stop it before reconfiguring")]
    Busy,

    #[error("component has not been configured")]
    NotConfigured,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("short read from sample source: wanted {wanted}, got {got}")]
    ShortRead { wanted: usize, got: usize },

    #[error("sampling driver error: {0}")]
    Driver(String),
}

pub type Result<T> = std::result::Result<T, DemodError>;
