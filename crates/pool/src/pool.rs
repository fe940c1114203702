//! Connection management for a single ledger pool.
//!
//! # Architecture
//!
//! A [`LedgerPool`] owns at most one connection to its ledger network, modelled
//! as an explicit state machine:
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Connected
//!      ▲                        │                  │
//!      └────────── error ───────┘◀───── close ─────┘
//! ```
//!
//! A connection attempt runs as its own task and is shared between callers,
//! so concurrent requests against a pool that is still connecting all observe
//! the same outcome and never open a second connection. The task itself
//! records the outcome in the pool state, even if every caller has gone away.
//!
//! The public [`connect`](LedgerPool::connect) is not re-entrant: it fails with
//! [`LedgerError::AlreadyConnecting`] while an attempt is in flight. Request
//! submission goes through an internal path that joins the in-flight attempt
//! instead.
//!
//! Writes to a ledger that publishes a transaction author agreement carry an
//! acceptance of it. The agreement is read from the ledger on the first write
//! and kept for the lifetime of the pool.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use parking_lot::Mutex;
use serde_json::Value;
use snafu::ResultExt;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};
use vdr_types::{GenesisSource, LedgerPoolConfig, NymRecord};

use crate::{
    client::{
        ClientErrorKind, LedgerNetworkClient, LedgerRequest, LedgerResponse, PoolHandle,
        RequestKind,
    },
    error::{
        AlreadyConnectingSnafu, ClientSnafu, ConnectError, ConnectionSnafu, CreateSnafu,
        GenesisWriteSnafu, InvalidResponseSnafu, LedgerError, NotFoundSnafu, OpenSnafu,
        RejectedSnafu, Result,
    },
    metrics::{ConnectionEvent, ResolverMetrics, default_metrics},
    taa::AuthorAgreement,
};

type ConnectAttempt = Shared<BoxFuture<'static, Result<PoolHandle, ConnectError>>>;

/// Observable connection status of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
    /// No connection and no attempt in flight.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected.
    Connected,
}

enum ConnectionState {
    Disconnected,
    Connecting { attempt: u64, future: ConnectAttempt },
    Connected(PoolHandle),
}

struct PoolInner {
    config: LedgerPoolConfig,
    genesis_dir: PathBuf,
    client: Arc<dyn LedgerNetworkClient>,
    metrics: Arc<dyn ResolverMetrics>,
    /// Genesis file resolved on the first connection attempt.
    genesis_path: Mutex<Option<PathBuf>>,
    state: Mutex<ConnectionState>,
    next_attempt: AtomicU64,
    /// Agreement published by the ledger, read once.
    author_agreement: OnceCell<Option<AuthorAgreement>>,
}

/// A connection to one ledger network.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct LedgerPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for LedgerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerPool")
            .field("id", &self.inner.config.id)
            .field("is_production", &self.inner.config.is_production)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[bon::bon]
impl LedgerPool {
    /// Creates a pool. No connection is made until it is first needed.
    ///
    /// Inline genesis transactions are written to `genesis_dir` on the first
    /// connection attempt.
    #[builder]
    pub fn new(
        config: LedgerPoolConfig,
        #[builder(into)] genesis_dir: PathBuf,
        client: Arc<dyn LedgerNetworkClient>,
        #[builder(default = default_metrics())] metrics: Arc<dyn ResolverMetrics>,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                genesis_dir,
                client,
                metrics,
                genesis_path: Mutex::new(None),
                state: Mutex::new(ConnectionState::Disconnected),
                next_attempt: AtomicU64::new(0),
                author_agreement: OnceCell::new(),
            }),
        }
    }
}

impl LedgerPool {
    /// Returns the pool id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.config.id
    }

    /// Returns the pool configuration.
    #[must_use]
    pub fn config(&self) -> &LedgerPoolConfig {
        &self.inner.config
    }

    /// Whether this pool is a production network.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.inner.config.is_production
    }

    /// Returns the `did:indy` namespace served by this pool.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.inner.config.namespace()
    }

    /// Returns the current connection status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        match &*self.inner.state.lock() {
            ConnectionState::Disconnected => PoolStatus::Disconnected,
            ConnectionState::Connecting { .. } => PoolStatus::Connecting,
            ConnectionState::Connected(_) => PoolStatus::Connected,
        }
    }

    /// Connects to the pool, or returns the handle of the existing connection.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AlreadyConnecting`] if an attempt is already in flight.
    /// - [`LedgerError::Connection`] if the attempt fails. The pool returns to
    ///   disconnected so a later call may retry.
    pub async fn connect(&self) -> Result<PoolHandle> {
        let attempt = {
            let mut state = self.inner.state.lock();
            match &*state {
                ConnectionState::Connected(handle) => return Ok(*handle),
                ConnectionState::Connecting { .. } => {
                    return AlreadyConnectingSnafu { pool_id: self.id() }.fail();
                },
                ConnectionState::Disconnected => self.start_connect(&mut state),
            }
        };
        attempt.await.context(ConnectionSnafu { pool_id: self.id() })
    }

    /// Returns a ready handle, joining an in-flight attempt or starting one.
    async fn handle(&self) -> Result<PoolHandle> {
        let attempt = {
            let mut state = self.inner.state.lock();
            match &*state {
                ConnectionState::Connected(handle) => return Ok(*handle),
                ConnectionState::Connecting { future, .. } => future.clone(),
                ConnectionState::Disconnected => self.start_connect(&mut state),
            }
        };
        attempt.await.context(ConnectionSnafu { pool_id: self.id() })
    }

    fn start_connect(&self, state: &mut ConnectionState) -> ConnectAttempt {
        let attempt = self.inner.next_attempt.fetch_add(1, Ordering::Relaxed);
        debug!(pool_id = %self.id(), attempt, "Connecting to ledger pool");

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let result = inner.open().await;
            inner.finish_connect(attempt, &result);
            result
        });

        let inner = Arc::clone(&self.inner);
        let future = async move {
            match task.await {
                Ok(result) => result,
                Err(join_error) => {
                    let result = Err(ConnectError::Aborted { message: join_error.to_string() });
                    inner.finish_connect(attempt, &result);
                    result
                },
            }
        }
        .boxed()
        .shared();

        *state = ConnectionState::Connecting { attempt, future: future.clone() };
        future
    }

    /// Submits a read request and returns the reply's `result`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Connection`] if the pool cannot be connected.
    /// - [`LedgerError::Client`] if the client fails to submit.
    /// - [`LedgerError::Rejected`] if the ledger rejects or does not
    ///   acknowledge the request.
    pub async fn submit_read_request(&self, request: &LedgerRequest) -> Result<Value> {
        self.submit(RequestKind::Read, request).await
    }

    /// Submits a write request and returns the reply's `result`.
    ///
    /// If the ledger publishes a transaction author agreement, the pool's
    /// configured agreement is checked against it and the client attaches the
    /// acceptance before the request is sent.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AuthorAgreementRequired`] if the ledger has an
    ///   agreement but the pool configures none.
    /// - [`LedgerError::AuthorAgreementMismatch`] if the configured version or
    ///   mechanism is not the ledger's.
    /// - Any error of [`author_agreement`](Self::author_agreement) or
    ///   [`submit_read_request`](Self::submit_read_request).
    pub async fn submit_write_request(&self, request: &LedgerRequest) -> Result<Value> {
        let request = self.append_author_agreement(request).await?;
        self.submit(RequestKind::Write, &request).await
    }

    /// Returns the transaction author agreement the ledger publishes, or
    /// `None` if it has none.
    ///
    /// The agreement is read on first use and cached. A failed read is not
    /// cached.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidResponse`] if the agreement replies are malformed.
    /// - Any error of [`submit_read_request`](Self::submit_read_request).
    pub async fn author_agreement(&self) -> Result<Option<AuthorAgreement>> {
        self.inner
            .author_agreement
            .get_or_try_init(|| self.fetch_author_agreement())
            .await
            .cloned()
    }

    async fn fetch_author_agreement(&self) -> Result<Option<AuthorAgreement>> {
        debug!(pool_id = %self.id(), "Reading transaction author agreement");
        let agreement_request = LedgerRequest::get_txn_author_agreement();
        let mechanisms_request = LedgerRequest::get_acceptance_mechanisms();
        let (agreement, mechanisms) = futures::try_join!(
            self.submit_read_request(&agreement_request),
            self.submit_read_request(&mechanisms_request),
        )?;

        let agreement = AuthorAgreement::from_replies(&agreement, &mechanisms).map_err(|e| {
            InvalidResponseSnafu { pool_id: self.id(), message: e.to_string() }.build()
        })?;
        if let Some(agreement) = &agreement {
            info!(
                pool_id = %self.id(),
                version = %agreement.version,
                "Ledger requires a transaction author agreement"
            );
        }
        Ok(agreement)
    }

    async fn append_author_agreement(&self, request: &LedgerRequest) -> Result<LedgerRequest> {
        let Some(agreement) = self.author_agreement().await? else {
            return Ok(request.clone());
        };
        let acceptance =
            agreement.accept(self.id(), self.inner.config.transaction_author_agreement.as_ref())?;
        self.inner
            .client
            .append_author_agreement_acceptance(request.clone(), &acceptance)
            .await
            .context(ClientSnafu { pool_id: self.id() })
    }

    async fn submit(&self, operation: RequestKind, request: &LedgerRequest) -> Result<Value> {
        let handle = self.handle().await?;
        let response = self.inner.client.submit(handle, request).await;

        let success = matches!(response, Ok(LedgerResponse::Reply { .. }));
        self.inner.metrics.record_pool_request(self.id(), operation, success);

        match response.context(ClientSnafu { pool_id: self.id() })? {
            LedgerResponse::Reply { result } => Ok(result),
            LedgerResponse::Reject { reason } | LedgerResponse::Reqnack { reason } => {
                RejectedSnafu { pool_id: self.id(), operation, reason }.fail()
            },
        }
    }

    /// Reads the NYM record of `did` from this pool.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] if the ledger holds no record for `did`.
    /// - [`LedgerError::InvalidResponse`] if the reply cannot be parsed.
    /// - Any error of [`submit_read_request`](Self::submit_read_request).
    pub async fn get_nym(&self, did: &str) -> Result<NymRecord> {
        let request = LedgerRequest::get_nym(did);
        let result = self.submit_read_request(&request).await?;
        let nym = NymRecord::from_reply(&result).map_err(|e| {
            InvalidResponseSnafu { pool_id: self.id(), message: e.to_string() }.build()
        })?;
        match nym {
            Some(nym) => Ok(nym),
            None => {
                let message = format!("Did '{did}' not found on ledger {}", self.id());
                NotFoundSnafu { message }.fail()
            },
        }
    }

    /// Closes the connection. Closing a pool that is not connected is a no-op.
    ///
    /// An in-flight connection attempt is awaited first so the connection it
    /// opens is closed rather than leaked.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Client`] if the client fails to close the
    /// connection. The pool is disconnected either way.
    pub async fn close(&self) -> Result<()> {
        let pending = match &*self.inner.state.lock() {
            ConnectionState::Connecting { future, .. } => Some(future.clone()),
            _ => None,
        };
        if let Some(attempt) = pending {
            // The outcome is recorded in the pool state by the attempt itself.
            let _ = attempt.await;
        }

        let handle = {
            let mut state = self.inner.state.lock();
            match &*state {
                ConnectionState::Connected(handle) => {
                    let handle = *handle;
                    *state = ConnectionState::Disconnected;
                    Some(handle)
                },
                _ => None,
            }
        };
        let Some(handle) = handle else {
            return Ok(());
        };

        self.inner.metrics.record_connection(self.id(), ConnectionEvent::Disconnected);
        info!(pool_id = %self.id(), %handle, "Closing ledger pool connection");
        self.inner.client.close_connection(handle).await.context(ClientSnafu { pool_id: self.id() })
    }

    /// Closes the connection if open, then deletes the local pool configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Client`] if closing or deleting fails.
    pub async fn delete(&self) -> Result<()> {
        self.close().await?;
        info!(pool_id = %self.id(), "Deleting ledger pool configuration");
        self.inner
            .client
            .delete_pool_configuration(self.id())
            .await
            .context(ClientSnafu { pool_id: self.id() })
    }
}

impl PoolInner {
    async fn open(&self) -> Result<PoolHandle, ConnectError> {
        let genesis_path = self.genesis_path().await?;
        let pool_id = self.config.id.as_str();

        match self.client.open_connection(pool_id, &genesis_path).await {
            Ok(handle) => Ok(handle),
            Err(e) if e.kind() == ClientErrorKind::PoolConfigMissing => {
                debug!(pool_id, "Pool configuration does not exist, creating it");
                self.client
                    .create_pool_configuration(pool_id, &genesis_path)
                    .await
                    .context(CreateSnafu)?;
                self.client.open_connection(pool_id, &genesis_path).await.context(OpenSnafu)
            },
            Err(e) => Err(e).context(OpenSnafu),
        }
    }

    /// Returns the genesis file, writing inline transactions on first use.
    async fn genesis_path(&self) -> Result<PathBuf, ConnectError> {
        let remembered = self.genesis_path.lock().clone();
        if let Some(path) = remembered {
            return Ok(path);
        }

        let path = match &self.config.genesis {
            GenesisSource::Path(path) => path.clone(),
            GenesisSource::Transactions(transactions) => {
                let path = self.genesis_dir.join(self.config.genesis_file_name());
                write_genesis(&path, transactions).await?;
                debug!(pool_id = %self.config.id, path = %path.display(), "Wrote genesis file");
                path
            },
        };
        *self.genesis_path.lock() = Some(path.clone());
        Ok(path)
    }

    /// Records the outcome of connection attempt `attempt`, unless the state
    /// has moved on since it started.
    fn finish_connect(&self, attempt: u64, result: &Result<PoolHandle, ConnectError>) {
        let mut state = self.state.lock();
        let current = matches!(
            &*state,
            ConnectionState::Connecting { attempt: current, .. } if *current == attempt
        );
        if !current {
            return;
        }

        match result {
            Ok(handle) => {
                *state = ConnectionState::Connected(*handle);
                self.metrics.record_connection(&self.config.id, ConnectionEvent::Connected);
                info!(pool_id = %self.config.id, %handle, "Connected to ledger pool");
            },
            Err(e) => {
                *state = ConnectionState::Disconnected;
                self.metrics.record_connection(&self.config.id, ConnectionEvent::Failed);
                error!(pool_id = %self.config.id, error = %e, "Connection to pool failed");
            },
        }
    }
}

async fn write_genesis(path: &Path, transactions: &str) -> Result<(), ConnectError> {
    let write_error = |e: std::io::Error| GenesisWriteSnafu { path, message: e.to_string() }.build();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_error)?;
    }
    tokio::fs::write(path, transactions).await.map_err(write_error)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use vdr_test_utils::TestDir;
    use vdr_types::TransactionAuthorAgreement;

    use super::*;
    use crate::{
        client::ClientError,
        error::ErrorKind,
        mock::MockLedgerClient,
        taa::AcceptanceMechanisms,
    };

    fn pool(client: &Arc<MockLedgerClient>, dir: &TestDir, genesis: GenesisSource) -> LedgerPool {
        let config = LedgerPoolConfig::builder()
            .id("sovrinMain")
            .is_production(true)
            .genesis(genesis)
            .build()
            .unwrap();
        pool_with(client, dir, config)
    }

    fn pool_with(
        client: &Arc<MockLedgerClient>,
        dir: &TestDir,
        config: LedgerPoolConfig,
    ) -> LedgerPool {
        LedgerPool::builder()
            .config(config)
            .genesis_dir(dir.genesis_dir())
            .client(client.clone())
            .build()
    }

    fn accepting_pool(
        client: &Arc<MockLedgerClient>,
        dir: &TestDir,
        accepted: Option<TransactionAuthorAgreement>,
    ) -> LedgerPool {
        let config = LedgerPoolConfig::builder()
            .id("sovrinMain")
            .genesis(GenesisSource::transactions("txn"))
            .maybe_transaction_author_agreement(accepted)
            .build()
            .unwrap();
        pool_with(client, dir, config)
    }

    fn ledger_agreement(version: &str) -> AuthorAgreement {
        AuthorAgreement {
            text: "Use the ledger responsibly.".to_string(),
            version: version.to_string(),
            digest: format!("digest-of-{version}"),
            ratification_ts: Some(1_575_417_600),
            acceptance_mechanisms: AcceptanceMechanisms {
                aml: [("accept".to_string(), "Accepted by the author".to_string())].into(),
                version: "1.0".to_string(),
                aml_context: None,
            },
        }
    }

    fn nym_write() -> LedgerRequest {
        LedgerRequest::new(json!({
            "identifier": "V4SGRU86Z58d6TV7PBUe6f",
            "operation": { "type": "1", "dest": "q7ATwTYbQDgiigVijUAej" },
            "protocolVersion": 2,
        }))
    }

    #[tokio::test]
    async fn test_connect_writes_inline_genesis_once() {
        let dir = TestDir::new();
        let client = Arc::new(MockLedgerClient::new());
        let pool = pool(&client, &dir, GenesisSource::transactions("{\"txn\":1}\n"));

        pool.connect().await.unwrap();
        let written = std::fs::read_to_string(dir.genesis_dir().join("genesis-sovrinMain.txn")).unwrap();
        assert_eq!(written, "{\"txn\":1}\n");

        pool.close().await.unwrap();
        std::fs::remove_file(dir.genesis_dir().join("genesis-sovrinMain.txn")).unwrap();

        // The remembered path is reused; the file is not written again.
        pool.connect().await.unwrap();
        assert!(!dir.genesis_dir().join("genesis-sovrinMain.txn").exists());
        assert_eq!(
            client.opened_with("sovrinMain"),
            Some(dir.genesis_dir().join("genesis-sovrinMain.txn"))
        );
    }

    #[tokio::test]
    async fn test_connect_uses_supplied_genesis_path() {
        let dir = TestDir::new();
        let client = Arc::new(MockLedgerClient::new());
        let pool = pool(&client, &dir, GenesisSource::path("/etc/ledgers/sovrin.txn"));

        pool.connect().await.unwrap();
        assert_eq!(client.opened_with("sovrinMain"), Some(PathBuf::from("/etc/ledgers/sovrin.txn")));
        assert!(!dir.genesis_dir().exists());
    }

    #[tokio::test]
    async fn test_connect_creates_missing_pool_configuration() {
        let dir = TestDir::new();
        let client = Arc::new(MockLedgerClient::new());
        client.require_pool_configuration(true);
        let pool = pool(&client, &dir, GenesisSource::transactions("txn"));

        pool.connect().await.unwrap();

        assert_eq!(client.create_count(), 1);
        assert_eq!(client.open_count(), 2);
        assert!(client.is_configured("sovrinMain"));
        assert_eq!(pool.status(), PoolStatus::Connected);
    }

    #[tokio::test]
    async fn test_connect_when_connected_returns_existing_handle() {
        let dir = TestDir::new();
        let client = Arc::new(MockLedgerClient::new());
        let pool = pool(&client, &dir, GenesisSource::transactions("txn"));

        let first = pool.connect().await.unwrap();
        let second = pool.connect().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(client.open_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_while_connecting_fails_fast() {
        let dir = TestDir::new();
        let client = Arc::new(MockLedgerClient::new());
        client.delay_open(Duration::from_millis(50));
        let pool = pool(&client, &dir, GenesisSource::transactions("txn"));

        let (first, second) = tokio::join!(pool.connect(), async {
            tokio::task::yield_now().await;
            pool.connect().await
        });

        assert!(first.is_ok());
        assert!(matches!(second, Err(LedgerError::AlreadyConnecting { .. })));
        assert_eq!(client.open_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_connection_attempt() {
        let dir = TestDir::new();
        let client = Arc::new(MockLedgerClient::new());
        client.delay_open(Duration::from_millis(20));
        client.set_nym("sovrinMain", NymRecord {
            did: "q7ATwTYbQDgiigVijUAej".to_string(),
            verkey: Some("~M9kv2Ez61cur7X39DXWh8W".to_string()),
            role: None,
        });
        let pool = pool(&client, &dir, GenesisSource::transactions("txn"));

        let results = futures::future::join_all(
            (0..5).map(|_| pool.get_nym("did:sov:q7ATwTYbQDgiigVijUAej")),
        )
        .await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(client.open_count(), 1);
        assert_eq!(client.submit_count("sovrinMain"), 5);
    }

    #[tokio::test]
    async fn test_failed_connection_resets_for_retry() {
        let dir = TestDir::new();
        let client = Arc::new(MockLedgerClient::new());
        client.fail_next_open("sovrinMain", ClientError::transport("connection refused"));
        let pool = pool(&client, &dir, GenesisSource::transactions("txn"));

        let err = pool.connect().await.unwrap_err();
        assert!(matches!(err, LedgerError::Connection { .. }));
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::Ledger);
        assert_eq!(pool.status(), PoolStatus::Disconnected);

        pool.connect().await.unwrap();
        assert_eq!(pool.status(), PoolStatus::Connected);
        assert_eq!(client.open_count(), 2);
    }

    #[tokio::test]
    async fn test_unwritable_genesis_dir_fails_connection() {
        let dir = TestDir::new();
        std::fs::write(dir.genesis_dir(), b"not a directory").unwrap();
        let client = Arc::new(MockLedgerClient::new());
        let pool = pool(&client, &dir, GenesisSource::transactions("txn"));

        let err = pool.connect().await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Connection { source: ConnectError::GenesisWrite { .. }, .. }
        ));
        assert_eq!(client.open_count(), 0);
    }

    #[tokio::test]
    async fn test_reject_and_reqnack_are_classified() {
        let dir = TestDir::new();
        let client = Arc::new(MockLedgerClient::new());
        let pool = pool(&client, &dir, GenesisSource::transactions("txn"));
        let request = LedgerRequest::get_nym("q7ATwTYbQDgiigVijUAej");
        // Read the (absent) agreement while the ledger still answers.
        assert_eq!(pool.author_agreement().await.unwrap(), None);

        client.reject_requests("sovrinMain", "client request invalid");
        let err = pool.submit_write_request(&request).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Ledger 'sovrinMain' rejected write transaction request: client request invalid"
        );

        client.reqnack_requests("sovrinMain", "node busy");
        let err = pool.submit_read_request(&request).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Rejected { operation: RequestKind::Read, ref reason, .. } if reason == "node busy"
        ));
    }

    #[tokio::test]
    async fn test_get_nym_missing_is_not_found() {
        let dir = TestDir::new();
        let client = Arc::new(MockLedgerClient::new());
        let pool = pool(&client, &dir, GenesisSource::transactions("txn"));

        let err = pool.get_nym("did:sov:q7ATwTYbQDgiigVijUAej").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(
            err.to_string(),
            "Did 'did:sov:q7ATwTYbQDgiigVijUAej' not found on ledger sovrinMain"
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let dir = TestDir::new();
        let client = Arc::new(MockLedgerClient::new());
        let pool = pool(&client, &dir, GenesisSource::transactions("txn"));

        pool.close().await.unwrap();
        assert_eq!(client.close_count(), 0);

        pool.connect().await.unwrap();
        pool.close().await.unwrap();
        pool.close().await.unwrap();

        assert_eq!(client.close_count(), 1);
        assert_eq!(pool.status(), PoolStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_close_waits_for_in_flight_connection() {
        let dir = TestDir::new();
        let client = Arc::new(MockLedgerClient::new());
        client.delay_open(Duration::from_millis(20));
        let pool = pool(&client, &dir, GenesisSource::transactions("txn"));

        let connecting = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.connect().await })
        };
        tokio::task::yield_now().await;
        while pool.status() == PoolStatus::Disconnected {
            tokio::task::yield_now().await;
        }

        pool.close().await.unwrap();
        connecting.await.unwrap().unwrap();

        assert_eq!(client.close_count(), 1);
        assert_eq!(client.open_handle_count(), 0);
        assert_eq!(pool.status(), PoolStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_delete_closes_then_removes_configuration() {
        let dir = TestDir::new();
        let client = Arc::new(MockLedgerClient::new());
        client.require_pool_configuration(true);
        let pool = pool(&client, &dir, GenesisSource::transactions("txn"));

        pool.connect().await.unwrap();
        pool.delete().await.unwrap();

        assert_eq!(client.close_count(), 1);
        assert!(!client.is_configured("sovrinMain"));

        // Deleting again only repeats the (idempotent) configuration delete.
        pool.delete().await.unwrap();
        assert_eq!(client.close_count(), 1);
    }

    #[tokio::test]
    async fn test_pools_with_similar_ids_get_their_own_genesis_files() {
        let dir = TestDir::new();
        let client = Arc::new(MockLedgerClient::new());
        let config = |id: &str, genesis: &str| {
            LedgerPoolConfig::builder()
                .id(id)
                .genesis(GenesisSource::transactions(genesis))
                .build()
                .unwrap()
        };
        let dotted = pool_with(&client, &dir, config("main.net", "GENESIS-ONE"));
        let underscored = pool_with(&client, &dir, config("main_net", "GENESIS-TWO"));

        dotted.connect().await.unwrap();
        underscored.connect().await.unwrap();
        dotted.close().await.unwrap();
        dotted.connect().await.unwrap();

        let dotted_path = client.opened_with("main.net").unwrap();
        let underscored_path = client.opened_with("main_net").unwrap();
        assert_ne!(dotted_path, underscored_path);
        assert_eq!(std::fs::read_to_string(dotted_path).unwrap(), "GENESIS-ONE");
        assert_eq!(std::fs::read_to_string(underscored_path).unwrap(), "GENESIS-TWO");
    }

    #[tokio::test]
    async fn test_write_without_ledger_agreement_is_sent_unchanged() {
        let dir = TestDir::new();
        let client = Arc::new(MockLedgerClient::new());
        let pool = accepting_pool(&client, &dir, None);

        pool.submit_write_request(&nym_write()).await.unwrap();
        pool.submit_write_request(&nym_write()).await.unwrap();

        let writes = client.write_requests("sovrinMain");
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], nym_write());
        // Two agreement reads for the first write, none for the second.
        assert_eq!(client.submit_count("sovrinMain"), 4);
    }

    #[tokio::test]
    async fn test_write_carries_acceptance_of_matching_agreement() {
        let dir = TestDir::new();
        let client = Arc::new(MockLedgerClient::new());
        client.set_author_agreement("sovrinMain", ledger_agreement("1"));
        let pool =
            accepting_pool(&client, &dir, Some(TransactionAuthorAgreement::new("1", "accept")));

        let result = pool.submit_write_request(&nym_write()).await.unwrap();
        assert_eq!(result["txnMetadata"]["seqNo"], 1);

        let writes = client.write_requests("sovrinMain");
        let acceptance = writes[0].author_agreement_acceptance().unwrap();
        assert_eq!(acceptance.digest, "digest-of-1");
        assert_eq!(acceptance.mechanism, "accept");
        assert_eq!(acceptance.time % 86_400, 0);
        assert_eq!(writes[0].as_json()["operation"], nym_write().as_json()["operation"]);
    }

    #[tokio::test]
    async fn test_agreement_is_read_once() {
        let dir = TestDir::new();
        let client = Arc::new(MockLedgerClient::new());
        client.set_author_agreement("sovrinMain", ledger_agreement("1"));
        let pool =
            accepting_pool(&client, &dir, Some(TransactionAuthorAgreement::new("1", "accept")));

        let (first, second) = tokio::join!(pool.author_agreement(), pool.author_agreement());
        assert_eq!(first.unwrap(), Some(ledger_agreement("1")));
        assert_eq!(second.unwrap(), Some(ledger_agreement("1")));
        pool.submit_write_request(&nym_write()).await.unwrap();

        assert_eq!(client.submit_count("sovrinMain"), 3);
    }

    #[tokio::test]
    async fn test_failed_agreement_read_is_retried() {
        let dir = TestDir::new();
        let client = Arc::new(MockLedgerClient::new());
        client.set_author_agreement("sovrinMain", ledger_agreement("1"));
        let pool = accepting_pool(&client, &dir, None);

        client.fail_requests("sovrinMain", ClientError::timeout("no answer"));
        let err = pool.author_agreement().await.unwrap_err();
        assert!(err.is_retryable());

        client.reset_failures();
        assert_eq!(pool.author_agreement().await.unwrap(), Some(ledger_agreement("1")));
    }

    #[tokio::test]
    async fn test_write_with_agreement_version_mismatch_fails() {
        let dir = TestDir::new();
        let client = Arc::new(MockLedgerClient::new());
        client.set_author_agreement("sovrinMain", ledger_agreement("2.0"));
        let pool =
            accepting_pool(&client, &dir, Some(TransactionAuthorAgreement::new("1", "accept")));

        let err = pool.submit_write_request(&nym_write()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to satisfy matching TAA with mechanism \"accept\" and version \"1\" in pool \
             'sovrinMain'. Found [\"accept\"] and version 2.0 in pool."
        );
        assert_eq!(err.kind(), ErrorKind::Ledger);
        assert!(!err.is_retryable());
        assert!(client.write_requests("sovrinMain").is_empty());
    }

    #[tokio::test]
    async fn test_write_with_agreement_mechanism_mismatch_fails() {
        let dir = TestDir::new();
        let client = Arc::new(MockLedgerClient::new());
        client.set_author_agreement("sovrinMain", ledger_agreement("1"));
        let pool = accepting_pool(
            &client,
            &dir,
            Some(TransactionAuthorAgreement::new("1", "decline")),
        );

        let err = pool.submit_write_request(&nym_write()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to satisfy matching TAA with mechanism \"decline\" and version \"1\" in pool \
             'sovrinMain'. Found [\"accept\"] and version 1 in pool."
        );
        assert!(client.write_requests("sovrinMain").is_empty());
    }

    #[tokio::test]
    async fn test_write_without_configured_agreement_fails() {
        let dir = TestDir::new();
        let client = Arc::new(MockLedgerClient::new());
        client.set_author_agreement("sovrinMain", ledger_agreement("1"));
        let pool = accepting_pool(&client, &dir, None);

        let err = pool.submit_write_request(&nym_write()).await.unwrap_err();
        assert!(matches!(err, LedgerError::AuthorAgreementRequired { ref version, .. } if version == "1"));
        assert!(err.to_string().starts_with(
            "Please, specify a transaction author agreement with version and acceptance mechanism"
        ));
        assert!(client.write_requests("sovrinMain").is_empty());
    }

    #[tokio::test]
    async fn test_reads_do_not_need_an_agreement() {
        let dir = TestDir::new();
        let client = Arc::new(MockLedgerClient::new());
        client.set_author_agreement("sovrinMain", ledger_agreement("1"));
        let pool = accepting_pool(&client, &dir, None);

        let err = pool.get_nym("did:sov:q7ATwTYbQDgiigVijUAej").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(client.submit_count("sovrinMain"), 1);
    }
}
