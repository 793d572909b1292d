//! Error types for trustmint

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    Unauthorized,
    NotVerified(String),
    ComplianceRejected(String),
    InsufficientBalance,
    InsufficientAllowance,
    AlreadyBound(String),
    NotBound(String),
    InvalidState(String),
    Paused,
    Frozen(String),
    NonzeroBalance(String),
    UnknownAsset(String),
    InvalidAmount(String),
    InvalidClaim(String),
    CryptoError(String),
    ConfigError(String),
    IoError(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LedgerError::Unauthorized => write!(f, "Caller lacks required privilege"),
            LedgerError::NotVerified(msg) => write!(f, "Identity not verified: {}", msg),
            LedgerError::ComplianceRejected(msg) => write!(f, "Compliance rejected: {}", msg),
            LedgerError::InsufficientBalance => write!(f, "Insufficient balance"),
            LedgerError::InsufficientAllowance => write!(f, "Insufficient allowance"),
            LedgerError::AlreadyBound(msg) => write!(f, "Holder already bound: {}", msg),
            LedgerError::NotBound(msg) => write!(f, "Holder not bound: {}", msg),
            LedgerError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            LedgerError::Paused => write!(f, "Token is paused"),
            LedgerError::Frozen(msg) => write!(f, "Frozen: {}", msg),
            LedgerError::NonzeroBalance(msg) => write!(f, "Nonzero balance: {}", msg),
            LedgerError::UnknownAsset(msg) => write!(f, "Unknown asset: {}", msg),
            LedgerError::InvalidAmount(msg) => write!(f, "Invalid amount: {}", msg),
            LedgerError::InvalidClaim(msg) => write!(f, "Invalid claim: {}", msg),
            LedgerError::CryptoError(msg) => write!(f, "Cryptographic error: {}", msg),
            LedgerError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            LedgerError::IoError(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::IoError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, LedgerError>;
