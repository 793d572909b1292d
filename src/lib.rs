//! trustmint - a permissioned-asset transfer engine
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Identity & Claims
//! - [`claims`] - Claim topics, trusted issuers, signed attestations
//! - [`identity`] - Identity registry and holder verification
//!
//! ## Compliance
//! - [`compliance`] - Modular compliance engine and rule modules
//!
//! ## Ledger
//! - [`token`] - Permissioned token: balances, supply, allowances, freeze/pause
//!
//! ## Trading Venue
//! - [`platform`] - Escrow intermediary and order book
//!
//! ## Cryptography
//! - [`crypto`] - Signatures and verification (secp256k1)
//!
//! ## Configuration & Utilities
//! - [`access`] - Owner/agent role sets
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Identity & Claims
// ============================================================================
pub mod claims;
pub mod identity;

// ============================================================================
// Compliance
// ============================================================================
pub mod compliance;

// ============================================================================
// Ledger & Trading Venue
// ============================================================================
pub mod platform;
pub mod token;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod access;
pub mod config;
pub mod error;
