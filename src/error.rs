//! Error types for gpgbridge operations.

use thiserror::Error;

/// Result type alias for gpgbridge operations.
pub type Result<T> = std::result::Result<T, GpgError>;

/// Main error type for gpgbridge operations.
#[derive(Error, Debug)]
pub enum GpgError {
    /// A required operation parameter was not supplied
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    /// The engine could not be started, or its streams failed at the transport level
    #[error("Process error: {0}")]
    Process(String),

    /// The engine ran but its diagnostics report a failure
    #[error("Engine error: {0}")]
    EngineDiagnostic(String),

    /// Decryption did not reach the success status
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// The engine reported a signature mismatch
    #[error("Bad signature: {0}")]
    BadSignature(String),

    /// Key generation produced no key material
    #[error("Key generation error: {0}")]
    KeyGeneration(String),

    /// The detected engine version is known not to work
    #[error("Unsupported engine version: {0}")]
    UnsupportedVersion(String),

    /// The requested operation is intentionally not supported
    #[error("Unimplemented operation: {0}")]
    Unimplemented(String),

    /// Engine output that could not be interpreted at all
    #[error("Packet error: {0}")]
    Packet(String),

    /// I/O errors on the scratch directory
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl GpgError {
    /// Creates a new missing parameter error.
    pub fn missing_parameter<T: ToString>(name: T) -> Self {
        Self::MissingParameter(name.to_string())
    }

    /// Creates a new process error.
    pub fn process<T: ToString>(msg: T) -> Self {
        Self::Process(msg.to_string())
    }

    /// Creates a new engine diagnostic error.
    pub fn engine<T: ToString>(msg: T) -> Self {
        Self::EngineDiagnostic(msg.to_string())
    }

    /// Creates a new decryption failure.
    pub fn decryption_failed<T: ToString>(msg: T) -> Self {
        Self::DecryptionFailed(msg.to_string())
    }

    /// Creates a new bad signature error.
    pub fn bad_signature<T: ToString>(msg: T) -> Self {
        Self::BadSignature(msg.to_string())
    }

    /// Creates a new key generation error.
    pub fn key_generation<T: ToString>(msg: T) -> Self {
        Self::KeyGeneration(msg.to_string())
    }

    /// Creates a new unsupported version error.
    pub fn unsupported_version<T: ToString>(msg: T) -> Self {
        Self::UnsupportedVersion(msg.to_string())
    }

    /// Creates a new unimplemented operation error.
    pub fn unimplemented<T: ToString>(msg: T) -> Self {
        Self::Unimplemented(msg.to_string())
    }

    /// Creates a new packet error.
    pub fn packet<T: ToString>(msg: T) -> Self {
        Self::Packet(msg.to_string())
    }

    /// Creates a new invalid input error.
    pub fn invalid_input<T: ToString>(msg: T) -> Self {
        Self::InvalidInput(msg.to_string())
    }

    /// Creates a new configuration error.
    pub fn config<T: ToString>(msg: T) -> Self {
        Self::Config(msg.to_string())
    }

    /// Creates a new validation error.
    pub fn validation<T: ToString>(msg: T) -> Self {
        Self::Validation(msg.to_string())
    }
}
