//! Core types for multi-ledger DID resolution.
//!
//! This crate provides the foundational types shared by the cache and pool crates:
//! - Ledger pool and resolver configuration (serde, TOML, validated builders)
//! - The execution context a resolution runs in ([`AgentContext`])
//! - Ledger identity records ([`NymRecord`])
//! - DID helpers (self-certification, `did:indy` namespace parsing)

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod did;
pub mod nym;

pub use config::{
    ConfigError, DEFAULT_CACHE_ID, DEFAULT_CACHE_LIMIT, GenesisSource, LedgerPoolConfig,
    ResolverConfig, TransactionAuthorAgreement,
};
pub use context::AgentContext;
pub use did::{
    IndyDid, did_from_verkey, is_abbreviated_verkey, is_self_certified_did, parse_indy_did,
    unqualified_did,
};
pub use nym::{NymParseError, NymRecord};
