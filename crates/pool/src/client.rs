//! Interface to the ledger network transport.
//!
//! [`LedgerNetworkClient`] is the seam between pool management and whatever
//! actually speaks the ledger wire protocol. The pool never builds or signs
//! transactions itself. It hands [`LedgerRequest`]s to the client and
//! classifies the [`LedgerResponse`]s that come back.

use std::{
    fmt,
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use vdr_types::unqualified_did;

use crate::taa::AuthorAgreementAcceptance;

/// `GET_NYM` transaction type.
pub(crate) const GET_NYM: &str = "105";

/// `GET_TXN_AUTHR_AGRMT` transaction type.
pub(crate) const GET_TXN_AUTHR_AGRMT: &str = "6";

/// `GET_TXN_AUTHR_AGRMT_AML` transaction type.
pub(crate) const GET_TXN_AUTHR_AGRMT_AML: &str = "7";

/// Submitter used for unsigned read requests.
const DEFAULT_SUBMITTER: &str = "LibindyDid111111111111";

/// Ledger request protocol version.
const PROTOCOL_VERSION: u64 = 2;

/// Opaque handle to an open ledger connection, issued by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle(u64);

impl PoolHandle {
    /// Wraps a client-issued handle value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw handle value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a request reads from or writes to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Read transaction.
    Read,
    /// Write transaction.
    Write,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// A ledger transaction request in its JSON wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerRequest(Value);

impl LedgerRequest {
    /// Wraps an already built request.
    #[must_use]
    pub fn new(request: Value) -> Self {
        Self(request)
    }

    /// Builds an unsigned `GET_NYM` read request for `did`.
    ///
    /// Qualified `did:sov:` and `did:indy:` identifiers are unqualified first.
    #[must_use]
    pub fn get_nym(did: &str) -> Self {
        Self::read(json!({
            "type": GET_NYM,
            "dest": unqualified_did(did),
        }))
    }

    /// Builds an unsigned request for the ledger's current transaction author
    /// agreement.
    #[must_use]
    pub fn get_txn_author_agreement() -> Self {
        Self::read(json!({ "type": GET_TXN_AUTHR_AGRMT }))
    }

    /// Builds an unsigned request for the ledger's current acceptance
    /// mechanism list.
    #[must_use]
    pub fn get_acceptance_mechanisms() -> Self {
        Self::read(json!({ "type": GET_TXN_AUTHR_AGRMT_AML }))
    }

    fn read(operation: Value) -> Self {
        Self(json!({
            "reqId": next_request_id(),
            "identifier": DEFAULT_SUBMITTER,
            "operation": operation,
            "protocolVersion": PROTOCOL_VERSION,
        }))
    }

    /// Returns the request with `acceptance` set as its `taaAcceptance`.
    #[must_use]
    pub fn with_author_agreement_acceptance(mut self, acceptance: &AuthorAgreementAcceptance) -> Self {
        if let Value::Object(fields) = &mut self.0 {
            fields.insert(
                "taaAcceptance".to_string(),
                json!({
                    "taaDigest": acceptance.digest,
                    "mechanism": acceptance.mechanism,
                    "time": acceptance.time,
                }),
            );
        }
        self
    }

    /// Returns the `taaAcceptance` attached to the request, if any.
    #[must_use]
    pub fn author_agreement_acceptance(&self) -> Option<AuthorAgreementAcceptance> {
        self.0.get("taaAcceptance").and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Returns the request JSON.
    #[must_use]
    pub fn as_json(&self) -> &Value {
        &self.0
    }

    /// Returns `operation.type`, e.g. `"105"` for `GET_NYM`.
    #[must_use]
    pub fn operation_type(&self) -> Option<&str> {
        self.0.pointer("/operation/type").and_then(Value::as_str)
    }

    /// Returns `operation.dest`, the DID a request targets.
    #[must_use]
    pub fn target_did(&self) -> Option<&str> {
        self.0.pointer("/operation/dest").and_then(Value::as_str)
    }
}

/// Request ids only need to be unique per submitter; nanosecond time plus a
/// process-local counter is enough.
fn next_request_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default();
    now.wrapping_add(COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// A structured ledger response, tagged by the `op` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "UPPERCASE")]
pub enum LedgerResponse {
    /// The request was processed; `result` carries the payload.
    Reply {
        /// Transaction result.
        result: Value,
    },
    /// The ledger explicitly rejected the request.
    Reject {
        /// Rejection reason.
        reason: String,
    },
    /// The request was not acknowledged.
    Reqnack {
        /// Reason given by the node.
        reason: String,
    },
}

impl LedgerResponse {
    /// Parses a raw JSON response.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if `raw` is not a recognised response.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Failure category reported by a [`LedgerNetworkClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientErrorKind {
    /// No local configuration exists for the pool; it must be created first.
    PoolConfigMissing,
    /// The ledger does not hold the requested record.
    LedgerNotFound,
    /// The ledger did not answer in time.
    Timeout,
    /// The connection to the ledger failed.
    Transport,
    /// Any other client failure.
    Other,
}

impl fmt::Display for ClientErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoolConfigMissing => write!(f, "pool configuration missing"),
            Self::LedgerNotFound => write!(f, "not found"),
            Self::Timeout => write!(f, "timeout"),
            Self::Transport => write!(f, "transport"),
            Self::Other => write!(f, "error"),
        }
    }
}

/// Error returned by a [`LedgerNetworkClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientError {
    kind: ClientErrorKind,
    message: String,
}

impl ClientError {
    /// Creates an error of the given kind.
    pub fn new(kind: ClientErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// The pool has no local configuration yet.
    pub fn pool_config_missing(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::PoolConfigMissing, message)
    }

    /// The requested record does not exist on the ledger.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::LedgerNotFound, message)
    }

    /// The ledger did not answer in time.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Timeout, message)
    }

    /// The connection to the ledger failed.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Transport, message)
    }

    /// Returns the failure category.
    #[must_use]
    pub fn kind(&self) -> ClientErrorKind {
        self.kind
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ClientError {}

/// Transport to one or more ledger networks.
///
/// One client instance is shared by every [`LedgerPool`](crate::LedgerPool);
/// connections are told apart by their [`PoolHandle`].
#[async_trait]
pub trait LedgerNetworkClient: Send + Sync + fmt::Debug {
    /// Opens a connection to the pool using its local configuration.
    ///
    /// Fails with [`ClientErrorKind::PoolConfigMissing`] when no configuration
    /// has been created for `pool_id` yet.
    async fn open_connection(
        &self,
        pool_id: &str,
        genesis_path: &Path,
    ) -> Result<PoolHandle, ClientError>;

    /// Creates the local configuration for a pool from its genesis file.
    async fn create_pool_configuration(
        &self,
        pool_id: &str,
        genesis_path: &Path,
    ) -> Result<(), ClientError>;

    /// Closes an open connection.
    async fn close_connection(&self, handle: PoolHandle) -> Result<(), ClientError>;

    /// Deletes the local configuration of a pool.
    async fn delete_pool_configuration(&self, pool_id: &str) -> Result<(), ClientError>;

    /// Submits a request over an open connection.
    async fn submit(
        &self,
        handle: PoolHandle,
        request: &LedgerRequest,
    ) -> Result<LedgerResponse, ClientError>;

    /// Attaches an author agreement acceptance to a write request before it
    /// is submitted.
    ///
    /// The default sets the request's `taaAcceptance` field. Clients that
    /// sign requests override this so the acceptance is covered by the
    /// signature.
    async fn append_author_agreement_acceptance(
        &self,
        request: LedgerRequest,
        acceptance: &AuthorAgreementAcceptance,
    ) -> Result<LedgerRequest, ClientError> {
        Ok(request.with_author_agreement_acceptance(acceptance))
    }
}
