//! Error types for Syndicate

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyndicateError>;

#[derive(Error, Debug)]
pub enum SyndicateError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl SyndicateError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SyndicateError::Validation(_) | SyndicateError::NotFound(_) => 3,
            SyndicateError::Platform(PlatformError::Authentication(_)) => 2,
            SyndicateError::Platform(_) => 1,
            SyndicateError::Cipher(_) => 1,
            SyndicateError::Config(_) => 1,
            SyndicateError::Database(_) => 1,
        }
    }

    /// True when the failure means the stored token is no longer accepted
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            SyndicateError::Platform(PlatformError::Authentication(_))
        )
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Column encoding failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("{platform} API returned {status}: {body}")]
    Api {
        platform: String,
        status: u16,
        body: String,
    },

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Unexpected response: {0}")]
    Parse(String),

    #[error("{0} is not yet supported")]
    Unsupported(String),

    #[error("Token refresh unsupported: {0}")]
    RefreshUnsupported(String),

    #[error("Content validation failed: {0}")]
    Validation(String),
}
