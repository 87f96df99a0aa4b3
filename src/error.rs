//! Error taxonomy shared across components.
//!
//! Library boundaries return one of these `thiserror` enums so callers can
//! match on precise variants; `main` and other glue code aggregate with
//! `anyhow::Result` the way the rest of this codebase already does.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("master key not configured")]
    MissingMasterKey,
    #[error("ciphertext is not recognized as ours and plaintext fallback is disabled")]
    NotCiphertext,
    #[error("ciphertext failed authentication")]
    DecryptionFailed,
    #[error("encoding error: {0}")]
    Encoding(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),
    #[error("no row found for tenant {0}")]
    TenantNotFound(uuid::Uuid),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unrecognized {field} value in row: {value}")]
    Decode { field: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum VenueError {
    #[error("request to {venue} timed out")]
    Timeout { venue: &'static str },
    #[error("{venue} rate-limited the request")]
    RateLimited { venue: &'static str },
    #[error("{venue} stream disconnected")]
    Disconnected { venue: &'static str },
    #[error("{venue} returned malformed data: {reason}")]
    BadData { venue: &'static str, reason: String },
    #[error("{venue} rejected credentials (401)")]
    Unauthorized { venue: &'static str },
    #[error("{venue} does not support this operation")]
    Unsupported { venue: &'static str },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("venue error: {0}")]
    Venue(#[from] VenueError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("circuit breaker tripped: {0}")]
    CircuitBreakerTripped(String),
    #[error("opportunity requires manual approval")]
    NotApproved,
    #[error("price moved beyond slippage tolerance")]
    SlippageExceeded,
    #[error("insufficient balance for minimum position size")]
    InsufficientBalance,
    #[error("position size below configured minimum")]
    SizeTooSmall,
    #[error("venue error: {0}")]
    Venue(#[from] VenueError),
    #[error("buy leg filled but sell leg failed — open position requires manual unwind: {0}")]
    OneLeggedFill(String),
}

/// Returned from `main`; every variant maps to a non-zero exit code.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("POLYBOT_MASTER_KEY is required when running in live mode")]
    MissingMasterKey,
    #[error("missing credentials for venue {0} required by an enabled strategy in live mode")]
    MissingCredentials(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
