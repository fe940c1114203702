//! In-process ledger network client for testing.
//!
//! [`MockLedgerClient`] implements [`LedgerNetworkClient`] against in-memory
//! state, so pools and the resolver can be exercised without a real ledger.
//!
//! # Features
//!
//! - **NYM storage**: register records per pool for `GET_NYM` reads
//! - **Author agreements**: publish a transaction author agreement per pool;
//!   writes are recorded for inspection
//! - **Pool configuration**: optionally require configurations to be created
//!   before connections open, like a real client
//! - **Failure injection**: client errors, rejections, negative
//!   acknowledgements and delays, per pool
//! - **Call counting**: opens, creates, closes, deletes and per-pool submits
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use vdr_pool::{LedgerPool, mock::MockLedgerClient};
//! use vdr_types::{GenesisSource, LedgerPoolConfig, NymRecord};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(MockLedgerClient::new());
//! client.set_nym("sovrinMain", NymRecord {
//!     did: "q7ATwTYbQDgiigVijUAej".to_string(),
//!     verkey: Some("~M9kv2Ez61cur7X39DXWh8W".to_string()),
//!     role: None,
//! });
//!
//! let config = LedgerPoolConfig::builder()
//!     .id("sovrinMain")
//!     .genesis(GenesisSource::path("/etc/ledgers/sovrin.txn"))
//!     .build()?;
//! let pool = LedgerPool::builder()
//!     .config(config)
//!     .genesis_dir("/tmp/genesis")
//!     .client(client.clone())
//!     .build();
//!
//! let nym = pool.get_nym("did:sov:q7ATwTYbQDgiigVijUAej").await?;
//! assert_eq!(client.submit_count("sovrinMain"), 1);
//! # Ok(())
//! # }
//! ```

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Value, json};
use vdr_types::{NymRecord, unqualified_did};

use crate::{
    client::{
        ClientError, GET_NYM, GET_TXN_AUTHR_AGRMT, GET_TXN_AUTHR_AGRMT_AML, LedgerNetworkClient,
        LedgerRequest, LedgerResponse, PoolHandle,
    },
    taa::AuthorAgreement,
};

/// Controllable in-memory ledger network client.
#[derive(Debug, Default)]
pub struct MockLedgerClient {
    /// NYM records keyed by pool id, then unqualified DID.
    nyms: RwLock<HashMap<String, HashMap<String, NymRecord>>>,
    /// Published author agreements per pool.
    agreements: RwLock<HashMap<String, AuthorAgreement>>,
    /// Write requests received per pool.
    writes: RwLock<HashMap<String, Vec<LedgerRequest>>>,
    /// Pools with a created configuration.
    configured: RwLock<HashSet<String>>,
    /// Open handles and the pool each belongs to.
    handles: RwLock<HashMap<PoolHandle, String>>,
    /// Genesis path of the latest open per pool.
    opened_with: RwLock<HashMap<String, PathBuf>>,
    /// One-shot failures for the next open of a pool.
    open_failures: RwLock<HashMap<String, ClientError>>,
    /// Persistent submit failures per pool.
    submit_failures: RwLock<HashMap<String, ClientError>>,
    /// Responses returned instead of a reply, per pool.
    response_overrides: RwLock<HashMap<String, LedgerResponse>>,
    /// Submit delays per pool.
    submit_delays: RwLock<HashMap<String, Duration>>,
    /// Submit counts per pool.
    submits: RwLock<HashMap<String, usize>>,
    require_configuration: AtomicBool,
    open_delay_ms: AtomicU64,
    next_handle: AtomicU64,
    open_count: AtomicUsize,
    create_count: AtomicUsize,
    close_count: AtomicUsize,
    delete_count: AtomicUsize,
}

impl MockLedgerClient {
    /// Creates a client with no records and no injected failures.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a NYM record on a pool.
    pub fn set_nym(&self, pool_id: &str, nym: NymRecord) {
        self.nyms
            .write()
            .entry(pool_id.to_string())
            .or_default()
            .insert(unqualified_did(&nym.did).to_string(), nym);
    }

    /// Removes a NYM record from a pool.
    pub fn remove_nym(&self, pool_id: &str, did: &str) {
        if let Some(nyms) = self.nyms.write().get_mut(pool_id) {
            nyms.remove(unqualified_did(did));
        }
    }

    /// Publishes `agreement` as the transaction author agreement of a pool.
    pub fn set_author_agreement(&self, pool_id: &str, agreement: AuthorAgreement) {
        self.agreements.write().insert(pool_id.to_string(), agreement);
    }

    /// Write requests received by `pool_id`, in submission order.
    #[must_use]
    pub fn write_requests(&self, pool_id: &str) -> Vec<LedgerRequest> {
        self.writes.read().get(pool_id).cloned().unwrap_or_default()
    }

    /// When enabled, opening a pool without a created configuration fails
    /// with [`ClientErrorKind::PoolConfigMissing`](crate::ClientErrorKind::PoolConfigMissing).
    pub fn require_pool_configuration(&self, required: bool) {
        self.require_configuration.store(required, Ordering::SeqCst);
    }

    /// Makes the next open of `pool_id` fail with `error`.
    pub fn fail_next_open(&self, pool_id: &str, error: ClientError) {
        self.open_failures.write().insert(pool_id.to_string(), error);
    }

    /// Delays every open by `delay`.
    pub fn delay_open(&self, delay: Duration) {
        self.open_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Makes every submit to `pool_id` fail with `error`.
    pub fn fail_requests(&self, pool_id: &str, error: ClientError) {
        self.submit_failures.write().insert(pool_id.to_string(), error);
    }

    /// Makes every submit to `pool_id` return a `REJECT`.
    pub fn reject_requests(&self, pool_id: &str, reason: &str) {
        self.response_overrides
            .write()
            .insert(pool_id.to_string(), LedgerResponse::Reject { reason: reason.to_string() });
    }

    /// Makes every submit to `pool_id` return a `REQNACK`.
    pub fn reqnack_requests(&self, pool_id: &str, reason: &str) {
        self.response_overrides
            .write()
            .insert(pool_id.to_string(), LedgerResponse::Reqnack { reason: reason.to_string() });
    }

    /// Delays every submit to `pool_id` by `delay`.
    pub fn delay_requests(&self, pool_id: &str, delay: Duration) {
        self.submit_delays.write().insert(pool_id.to_string(), delay);
    }

    /// Clears all injected failures, rejections and delays.
    pub fn reset_failures(&self) {
        self.open_failures.write().clear();
        self.submit_failures.write().clear();
        self.response_overrides.write().clear();
        self.submit_delays.write().clear();
        self.open_delay_ms.store(0, Ordering::SeqCst);
    }

    /// Number of `open_connection` calls.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    /// Number of `create_pool_configuration` calls.
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.create_count.load(Ordering::SeqCst)
    }

    /// Number of `close_connection` calls.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    /// Number of `delete_pool_configuration` calls.
    #[must_use]
    pub fn delete_count(&self) -> usize {
        self.delete_count.load(Ordering::SeqCst)
    }

    /// Number of requests submitted to `pool_id`.
    #[must_use]
    pub fn submit_count(&self, pool_id: &str) -> usize {
        self.submits.read().get(pool_id).copied().unwrap_or(0)
    }

    /// Number of requests submitted to all pools.
    #[must_use]
    pub fn total_submit_count(&self) -> usize {
        self.submits.read().values().sum()
    }

    /// Number of currently open handles.
    #[must_use]
    pub fn open_handle_count(&self) -> usize {
        self.handles.read().len()
    }

    /// Whether a configuration exists for `pool_id`.
    #[must_use]
    pub fn is_configured(&self, pool_id: &str) -> bool {
        self.configured.read().contains(pool_id)
    }

    /// Genesis path passed to the latest successful open of `pool_id`.
    #[must_use]
    pub fn opened_with(&self, pool_id: &str) -> Option<PathBuf> {
        self.opened_with.read().get(pool_id).cloned()
    }

    fn nym_reply(&self, pool_id: &str, request: &LedgerRequest) -> LedgerResponse {
        let dest = request.target_did().unwrap_or_default();
        let data = self
            .nyms
            .read()
            .get(pool_id)
            .and_then(|nyms| nyms.get(dest))
            .map(|nym| {
                json!({
                    "dest": unqualified_did(&nym.did),
                    "identifier": "V4SGRU86Z58d6TV7PBUe6f",
                    "role": nym.role,
                    "verkey": nym.verkey,
                })
                .to_string()
            });
        LedgerResponse::Reply {
            result: json!({
                "type": GET_NYM,
                "dest": dest,
                "data": data.map_or(Value::Null, Value::String),
            }),
        }
    }

    fn agreement_reply(&self, pool_id: &str) -> LedgerResponse {
        let data = self.agreements.read().get(pool_id).map(|agreement| {
            json!({
                "text": agreement.text,
                "version": agreement.version,
                "digest": agreement.digest,
                "ratification_ts": agreement.ratification_ts,
            })
        });
        LedgerResponse::Reply {
            result: json!({ "type": GET_TXN_AUTHR_AGRMT, "data": data }),
        }
    }

    fn mechanisms_reply(&self, pool_id: &str) -> LedgerResponse {
        let data = self.agreements.read().get(pool_id).map(|agreement| {
            let mechanisms = &agreement.acceptance_mechanisms;
            json!({
                "aml": mechanisms.aml,
                "version": mechanisms.version,
                "amlContext": mechanisms.aml_context,
            })
        });
        LedgerResponse::Reply {
            result: json!({ "type": GET_TXN_AUTHR_AGRMT_AML, "data": data }),
        }
    }

    fn write_reply(&self, pool_id: &str, request: &LedgerRequest) -> LedgerResponse {
        let mut writes = self.writes.write();
        let received = writes.entry(pool_id.to_string()).or_default();
        received.push(request.clone());
        LedgerResponse::Reply {
            result: json!({
                "txn": request.as_json(),
                "txnMetadata": { "seqNo": received.len() },
            }),
        }
    }
}

#[async_trait]
impl LedgerNetworkClient for MockLedgerClient {
    async fn open_connection(
        &self,
        pool_id: &str,
        genesis_path: &Path,
    ) -> Result<PoolHandle, ClientError> {
        self.open_count.fetch_add(1, Ordering::SeqCst);

        let delay = self.open_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if let Some(error) = self.open_failures.write().remove(pool_id) {
            return Err(error);
        }
        if self.require_configuration.load(Ordering::SeqCst) && !self.is_configured(pool_id) {
            return Err(ClientError::pool_config_missing(format!(
                "pool configuration '{pool_id}' does not exist"
            )));
        }

        let handle = PoolHandle::new(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        self.handles.write().insert(handle, pool_id.to_string());
        self.opened_with.write().insert(pool_id.to_string(), genesis_path.to_path_buf());
        Ok(handle)
    }

    async fn create_pool_configuration(
        &self,
        pool_id: &str,
        _genesis_path: &Path,
    ) -> Result<(), ClientError> {
        self.create_count.fetch_add(1, Ordering::SeqCst);
        self.configured.write().insert(pool_id.to_string());
        Ok(())
    }

    async fn close_connection(&self, handle: PoolHandle) -> Result<(), ClientError> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        match self.handles.write().remove(&handle) {
            Some(_) => Ok(()),
            None => Err(ClientError::transport(format!("invalid pool handle {handle}"))),
        }
    }

    async fn delete_pool_configuration(&self, pool_id: &str) -> Result<(), ClientError> {
        self.delete_count.fetch_add(1, Ordering::SeqCst);
        self.configured.write().remove(pool_id);
        Ok(())
    }

    async fn submit(
        &self,
        handle: PoolHandle,
        request: &LedgerRequest,
    ) -> Result<LedgerResponse, ClientError> {
        let pool_id = self
            .handles
            .read()
            .get(&handle)
            .cloned()
            .ok_or_else(|| ClientError::transport(format!("invalid pool handle {handle}")))?;
        *self.submits.write().entry(pool_id.clone()).or_default() += 1;

        let delay = self.submit_delays.read().get(&pool_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.submit_failures.read().get(&pool_id).cloned() {
            return Err(error);
        }
        if let Some(response) = self.response_overrides.read().get(&pool_id).cloned() {
            return Ok(response);
        }
        Ok(match request.operation_type() {
            Some(GET_NYM) => self.nym_reply(&pool_id, request),
            Some(GET_TXN_AUTHR_AGRMT) => self.agreement_reply(&pool_id),
            Some(GET_TXN_AUTHR_AGRMT_AML) => self.mechanisms_reply(&pool_id),
            _ => self.write_reply(&pool_id, request),
        })
    }
}
