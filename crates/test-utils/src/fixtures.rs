//! Ledger fixtures: pool configurations and NYM records.
//!
//! NYM records are derived from a one-byte seed so tests can create many
//! distinct DIDs without hard-coding keys.

#![allow(clippy::expect_used)]

use std::path::Path;

use vdr_types::{GenesisSource, LedgerPoolConfig, NymRecord, ResolverConfig};

/// Genesis transactions used for every fixture pool.
pub const GENESIS_TXN: &str = r#"{"reqSignature":{},"txn":{"data":{"data":{"alias":"Node1","client_ip":"127.0.0.1","client_port":9702,"node_ip":"127.0.0.1","node_port":9701,"services":["VALIDATOR"]},"dest":"Gw6pDLhcBcoQesN72qfotTgFa7cbuqZpkX3Xo6pLhPhv"},"metadata":{"from":"Th7MpTaRZVRYnPiabds81Y"},"type":"0"},"txnMetadata":{"seqNo":1},"ver":"1"}"#;

/// A pool with inline genesis transactions.
///
/// # Panics
///
/// Panics if `id` is not a valid pool id.
#[must_use]
pub fn pool_config(id: &str, is_production: bool) -> LedgerPoolConfig {
    LedgerPoolConfig::builder()
        .id(id)
        .is_production(is_production)
        .genesis(GenesisSource::transactions(GENESIS_TXN))
        .build()
        .expect("valid pool config")
}

/// The pool set most resolver tests run against, in configuration order:
///
/// | id               | production |
/// |------------------|------------|
/// | `sovrinMain`     | yes        |
/// | `sovrinBuilder`  | no         |
/// | `sovringStaging` | no         |
/// | `indicioMain`    | yes        |
/// | `bcovrinTest`    | no         |
#[must_use]
pub fn standard_pools() -> Vec<LedgerPoolConfig> {
    vec![
        pool_config("sovrinMain", true),
        pool_config("sovrinBuilder", false),
        pool_config("sovringStaging", false),
        pool_config("indicioMain", true),
        pool_config("bcovrinTest", false),
    ]
}

/// A resolver configuration over `pools` with the default cache settings.
///
/// # Panics
///
/// Panics if the pools do not form a valid configuration.
#[must_use]
pub fn resolver_config(data_dir: &Path, pools: Vec<LedgerPoolConfig>) -> ResolverConfig {
    ResolverConfig::builder()
        .pools(pools)
        .data_dir(data_dir)
        .build()
        .expect("valid resolver config")
}

/// Full verkey derived from `seed`.
#[must_use]
pub fn verkey(seed: u8) -> String {
    bs58::encode([seed; 32]).into_string()
}

/// Unqualified DID self-certified by [`verkey(seed)`](verkey).
#[must_use]
pub fn did(seed: u8) -> String {
    bs58::encode([seed; 16]).into_string()
}

/// A record whose full verkey self-certifies its DID.
#[must_use]
pub fn self_certified_nym(seed: u8) -> NymRecord {
    NymRecord { did: did(seed), verkey: Some(verkey(seed)), role: None }
}

/// A record whose verkey was rotated away from the one the DID was derived
/// from, so it no longer self-certifies.
#[must_use]
pub fn rotated_nym(seed: u8) -> NymRecord {
    NymRecord { did: did(seed), verkey: Some(verkey(seed.wrapping_add(1))), role: None }
}

/// A record with an abbreviated verkey (`~` plus the key's second half), which
/// always counts as self-certifying.
#[must_use]
pub fn abbreviated_nym(seed: u8) -> NymRecord {
    let abbreviated = format!("~{}", bs58::encode([seed; 16]).into_string());
    NymRecord { did: did(seed), verkey: Some(abbreviated), role: None }
}
