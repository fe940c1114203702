//! Ledger pool connections and multi-ledger DID resolution.
//!
//! A DID may live on any of several Indy ledger networks. This crate keeps one
//! [`LedgerPool`] per configured network and resolves DIDs across all of them
//! with [`MultiLedgerResolver`], memoizing answers in a persisted LRU cache.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::{path::Path, sync::Arc};
//!
//! use async_trait::async_trait;
//! use vdr_cache::FileRecordStorage;
//! use vdr_pool::{
//!     ClientError, LedgerNetworkClient, LedgerRequest, LedgerResponse, MultiLedgerResolver,
//!     PoolHandle,
//! };
//! use vdr_types::{AgentContext, ResolverConfig};
//!
//! /// Speaks the ledger wire protocol, e.g. over a VDR binding.
//! #[derive(Debug)]
//! struct VdrClient;
//!
//! #[async_trait]
//! impl LedgerNetworkClient for VdrClient {
//!     async fn open_connection(
//!         &self,
//!         pool_id: &str,
//!         genesis_path: &Path,
//!     ) -> Result<PoolHandle, ClientError> {
//!         // Connect to the validator nodes listed in the genesis file.
//! #       todo!()
//!     }
//! #   async fn create_pool_configuration(&self, _: &str, _: &Path) -> Result<(), ClientError> {
//! #       todo!()
//! #   }
//! #   async fn close_connection(&self, _: PoolHandle) -> Result<(), ClientError> {
//! #       todo!()
//! #   }
//! #   async fn delete_pool_configuration(&self, _: &str) -> Result<(), ClientError> {
//! #       todo!()
//! #   }
//! #   async fn submit(
//! #       &self,
//! #       _: PoolHandle,
//! #       _: &LedgerRequest,
//! #   ) -> Result<LedgerResponse, ClientError> {
//! #       todo!()
//! #   }
//!     // create_pool_configuration, close_connection,
//!     // delete_pool_configuration and submit likewise.
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ResolverConfig::from_file("resolver.toml")?;
//! let storage = Arc::new(FileRecordStorage::new(config.data_dir.join("records")));
//! let resolver = MultiLedgerResolver::builder()
//!     .config(config)
//!     .client(Arc::new(VdrClient))
//!     .storage(storage)
//!     .build()?;
//!
//! let ctx = AgentContext::new("agent-1");
//! let resolved = resolver.resolve(&ctx, "did:sov:q7ATwTYbQDgiigVijUAej").await?;
//! println!("{} is on {}", resolved.nym.did, resolved.pool.id());
//! # Ok(())
//! # }
//! ```
//!
//! [`mock::MockLedgerClient`] implements the client in memory for tests.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │               MultiLedgerResolver                    │
//! │  resolve │ pool_for_did │ pool_for_namespace         │
//! ├───────────────────────────┬──────────────────────────┤
//! │   DID cache               │  LedgerPool (per ledger) │
//! │   PersistedLruCache       │  connect │ get_nym       │
//! ├───────────────────────────┼──────────────────────────┤
//! │   RecordStorage           │  LedgerNetworkClient     │
//! └───────────────────────────┴──────────────────────────┘
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod error;
mod metrics;
pub mod mock;
mod pool;
mod resolver;
mod settle;
mod taa;

pub use client::{
    ClientError, ClientErrorKind, LedgerNetworkClient, LedgerRequest, LedgerResponse, PoolHandle,
    RequestKind,
};
pub use error::{ConnectError, ErrorKind, LedgerError, Result};
pub use metrics::{
    ConnectionEvent, MetricsResolverMetrics, NoopResolverMetrics, ResolutionOutcome,
    ResolverMetrics,
};
pub use pool::{LedgerPool, PoolStatus};
pub use resolver::{CachedResolution, DidPool, MultiLedgerResolver, ResolvedDid};
pub use taa::{
    AcceptanceMechanisms, AgreementParseError, AuthorAgreement, AuthorAgreementAcceptance,
};
