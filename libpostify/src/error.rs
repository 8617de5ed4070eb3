//! Error types for Postify

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PostifyError>;

#[derive(Error, Debug)]
pub enum PostifyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Image generation failed: {0}")]
    ImageGeneration(#[from] ImageGenError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PostifyError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PostifyError::InvalidInput(_) => 3,
            PostifyError::Config(_) => 2,
            _ => 1,
        }
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
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },

    /// Raised by the in-memory store when a write has been scripted to fail.
    #[error("Injected failure: {0}")]
    Injected(String),
}

/// Failure of a single platform delivery attempt.
///
/// The inner string is the human-readable reason that ends up in the
/// outcome returned to the caller and in `PostResult.error_message`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Disabled(String),
}

impl PlatformError {
    /// The message persisted verbatim for a failed attempt
    pub fn message(&self) -> &str {
        match self {
            PlatformError::Configuration(m)
            | PlatformError::InvalidInput(m)
            | PlatformError::Transport(m)
            | PlatformError::Rejected(m)
            | PlatformError::Timeout(m)
            | PlatformError::Disabled(m) => m,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Username already exists")]
    UsernameTaken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired session")]
    InvalidSession,

    #[error("{0}")]
    Validation(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

#[derive(Error, Debug)]
pub enum ImageGenError {
    #[error("STABILITY_API_KEY not found in environment")]
    NotConfigured,

    #[error("{0}")]
    Api(String),

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    MalformedResponse(String),
}

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Unsupported image type: {0}")]
    UnsupportedType(String),

    #[error("Invalid media reference: {0}")]
    InvalidReference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
