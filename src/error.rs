use http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl AppError {
    /// Short label used as the `kind` field in error logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Client(_) => "client",
            AppError::Proxy(_) => "proxy",
            AppError::Storage(_) => "storage",
            AppError::Io(_) => "io",
            AppError::Serde(_) => "serde",
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing required configuration: {0}")]
    MissingField(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to build client: {0}")]
    BuildError(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Request timeout after {timeout_ms}ms")]
    RequestTimeout { timeout_ms: u128 },

    #[error("Too many redirects ({0})")]
    TooManyRedirects(usize),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Invalid SourceForge URL")]
    InvalidTarget,

    #[error("SourceForge Error: {reason}")]
    Upstream { status: StatusCode, reason: String },

    #[error("Proxy request failed: {0}")]
    Fetch(#[from] ClientError),
}

impl ProxyError {
    /// Status code reported to the caller for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidTarget => StatusCode::BAD_REQUEST,
            ProxyError::Upstream { status, .. } => *status,
            ProxyError::Fetch(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage IO failed for key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored value for key {key} is not valid JSON: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, AppError>;
