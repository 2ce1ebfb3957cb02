use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Route {path} references unknown backend '{backend}'")]
    UnknownBackend { path: String, backend: String },

    #[error("Duplicate backend name '{0}'")]
    DuplicateBackend(String),

    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
