//! Multi-ledger DID resolution.
//!
//! [`MultiLedgerResolver`] finds the ledger that authoritatively hosts a DID
//! among an ordered set of pools:
//!
//! 1. A cached answer whose pool is still configured is returned without any
//!    network traffic.
//! 2. Otherwise every pool is queried concurrently and all queries are allowed
//!    to settle.
//! 3. With no successful answer the failure is classified: not-found if every
//!    pool reported not-found, an aggregate ledger error otherwise.
//! 4. Among successful answers the first self-certifying one wins. Failing
//!    that, production pools are preferred over non-production pools, and
//!    configuration order decides among the rest.
//! 5. The winner is written to the DID cache.

use std::{sync::Arc, time::Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, ensure};
use tracing::{debug, trace, warn};
use vdr_cache::{PersistedLruCache, RecordStorage};
use vdr_types::{AgentContext, NymRecord, ResolverConfig, parse_indy_did};

use crate::{
    client::{LedgerNetworkClient, PoolHandle},
    error::{
        BranchFailedSnafu, CacheSnafu, ConfigSnafu, ErrorKind, LedgerError, NotConfiguredSnafu,
        NotFoundSnafu, Result,
    },
    metrics::{ResolutionOutcome, ResolverMetrics, default_metrics},
    pool::LedgerPool,
    settle::Settled,
};

/// A resolution as stored in the DID cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedResolution {
    /// The DID as it was requested.
    pub identifier: String,
    /// The record the winning pool returned.
    pub nym: NymRecord,
    /// Id of the winning pool.
    pub pool_id: String,
}

/// A resolved DID and the pool that holds it.
#[derive(Debug, Clone)]
pub struct ResolvedDid {
    /// Pool the record was read from.
    pub pool: LedgerPool,
    /// The ledger record.
    pub nym: NymRecord,
}

/// The pool responsible for a DID, as returned by
/// [`MultiLedgerResolver::pool_for_did`].
#[derive(Debug, Clone)]
pub struct DidPool {
    /// Pool hosting the DID.
    pub pool: LedgerPool,
    /// The ledger record, when the pool was found by resolving the DID.
    /// `None` for `did:indy` DIDs, whose pool follows from the namespace.
    pub nym: Option<NymRecord>,
}

/// Resolves DIDs across an ordered set of ledger pools.
///
/// The resolver owns one DID cache, which is bound to the first
/// [`AgentContext`] it serves. Use one resolver per context.
pub struct MultiLedgerResolver {
    pools: Vec<LedgerPool>,
    did_cache: PersistedLruCache<CachedResolution>,
    metrics: Arc<dyn ResolverMetrics>,
}

impl std::fmt::Debug for MultiLedgerResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiLedgerResolver")
            .field("pools", &self.pools)
            .field("did_cache", &self.did_cache)
            .finish_non_exhaustive()
    }
}

#[bon::bon]
impl MultiLedgerResolver {
    /// Creates a resolver with one [`LedgerPool`] per configured pool.
    ///
    /// No connections are made until they are needed or
    /// [`connect_all`](Self::connect_all) is called.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Config`] if the configuration is invalid.
    #[builder]
    pub fn new(
        config: ResolverConfig,
        client: Arc<dyn LedgerNetworkClient>,
        storage: Arc<dyn RecordStorage>,
        #[builder(default = default_metrics())] metrics: Arc<dyn ResolverMetrics>,
    ) -> Result<Self> {
        config.validate().context(ConfigSnafu)?;

        let genesis_dir = config.genesis_dir();
        let pools = config
            .pools
            .into_iter()
            .map(|pool_config| {
                LedgerPool::builder()
                    .config(pool_config)
                    .genesis_dir(genesis_dir.clone())
                    .client(Arc::clone(&client))
                    .metrics(Arc::clone(&metrics))
                    .build()
            })
            .collect();
        let did_cache = PersistedLruCache::new(config.cache_id, config.cache_limit, storage)
            .context(CacheSnafu)?;

        Ok(Self { pools, did_cache, metrics })
    }
}

impl MultiLedgerResolver {
    /// Returns the configured pools, in configuration order.
    #[must_use]
    pub fn pools(&self) -> &[LedgerPool] {
        &self.pools
    }

    /// Returns the write pool: the first configured pool.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotConfigured`] if no pools are configured.
    pub fn write_pool(&self) -> Result<&LedgerPool> {
        self.pools.first().context(NotConfiguredSnafu)
    }

    /// Returns the pool serving a `did:indy` namespace.
    ///
    /// Without a namespace the write pool is returned; that form is
    /// deprecated and logs a warning.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotConfigured`] if no pools are configured.
    /// - [`LedgerError::NotFound`] if no pool serves `namespace`.
    pub fn pool_for_namespace(&self, namespace: Option<&str>) -> Result<&LedgerPool> {
        ensure!(!self.pools.is_empty(), NotConfiguredSnafu);

        let Some(namespace) = namespace else {
            warn!("Not passing the indy namespace is deprecated and will be removed in a future version");
            return self.write_pool();
        };
        self.pools.iter().find(|pool| pool.namespace() == namespace).context(NotFoundSnafu {
            message: format!("No ledgers found for IndyNamespace '{namespace}'."),
        })
    }

    /// Returns the pool responsible for `did`.
    ///
    /// A `did:indy` DID names its pool through its namespace, so no ledger is
    /// queried. Any other DID is [`resolve`](Self::resolve)d.
    ///
    /// # Errors
    ///
    /// Errors of [`pool_for_namespace`](Self::pool_for_namespace) for
    /// `did:indy` DIDs, of [`resolve`](Self::resolve) otherwise.
    pub async fn pool_for_did(&self, ctx: &AgentContext, did: &str) -> Result<DidPool> {
        if let Some(indy_did) = parse_indy_did(did) {
            let pool = self.pool_for_namespace(Some(indy_did.namespace))?;
            return Ok(DidPool { pool: pool.clone(), nym: None });
        }
        let resolved = self.resolve(ctx, did).await?;
        Ok(DidPool { pool: resolved.pool, nym: Some(resolved.nym) })
    }

    /// Resolves `did` to the pool that hosts it and its ledger record.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotConfigured`] if no pools are configured.
    /// - [`LedgerError::NotFound`] if every pool reports the DID absent.
    /// - [`LedgerError::Unresolved`] if no pool resolved the DID and at least
    ///   one failed with another error.
    /// - [`LedgerError::Cache`] if the DID cache cannot be read, including use
    ///   from a second context.
    pub async fn resolve(&self, ctx: &AgentContext, did: &str) -> Result<ResolvedDid> {
        let started = Instant::now();
        let result = self.resolve_uncounted(ctx, did).await;

        let outcome = match &result {
            Ok((_, outcome)) => *outcome,
            Err(e) if e.kind() == ErrorKind::NotFound => ResolutionOutcome::NotFound,
            Err(_) => ResolutionOutcome::Failed,
        };
        self.metrics.record_resolution(outcome, started.elapsed());
        result.map(|(resolved, _)| resolved)
    }

    async fn resolve_uncounted(
        &self,
        ctx: &AgentContext,
        did: &str,
    ) -> Result<(ResolvedDid, ResolutionOutcome)> {
        ensure!(!self.pools.is_empty(), NotConfiguredSnafu);

        let cached = self.did_cache.get(ctx, did).await.context(CacheSnafu)?;
        if let Some(cached) = cached {
            if let Some(pool) = self.pool_by_id(&cached.pool_id) {
                trace!(did, pool_id = %pool.id(), "Found ledger for did in cache");
                self.metrics.record_cache_lookup(true);
                let resolved = ResolvedDid { pool: pool.clone(), nym: cached.nym };
                return Ok((resolved, ResolutionOutcome::CacheHit));
            }
            debug!(did, pool_id = %cached.pool_id, "Cached ledger is no longer configured");
        }
        self.metrics.record_cache_lookup(false);

        let Settled { successful, rejected } = self.query_pools(did).await;
        let Some((pool, nym)) = select_resolution(successful) else {
            return Err(self.classify_failure(did, rejected));
        };
        debug!(did, pool_id = %pool.id(), "Resolved did");

        let cached = CachedResolution {
            identifier: did.to_string(),
            nym: nym.clone(),
            pool_id: pool.id().to_string(),
        };
        if let Err(error) = self.did_cache.set(ctx, did, cached).await {
            warn!(did, error = %error, "Failed to cache did resolution");
        }

        Ok((ResolvedDid { pool, nym }, ResolutionOutcome::Resolved))
    }

    /// Queries every pool concurrently and waits for all of them to settle.
    ///
    /// Each query runs as its own task, so a failing or panicking branch
    /// cannot disturb the others. Successful answers stay in configuration
    /// order.
    async fn query_pools(&self, did: &str) -> Settled<(LedgerPool, NymRecord), LedgerError> {
        trace!(did, pools = self.pools.len(), "Retrieving did from ledgers");

        let branches = self.pools.iter().map(|pool| {
            let query = {
                let pool = pool.clone();
                let did = did.to_string();
                tokio::spawn(async move { pool.get_nym(&did).await })
            };
            let pool = pool.clone();
            async move {
                let result = match query.await {
                    Ok(result) => result,
                    Err(join_error) => BranchFailedSnafu {
                        pool_id: pool.id(),
                        message: join_error.to_string(),
                    }
                    .fail(),
                };
                result.map(|nym| (pool, nym))
            }
        });

        let settled: Settled<_, _> = join_all(branches).await.into_iter().collect();
        for error in &settled.rejected {
            trace!(did, error = %error, "Error retrieving did from ledger");
        }
        trace!(did, successful = settled.successful.len(), "Retrieved responses from ledgers");
        settled
    }

    fn classify_failure(&self, did: &str, rejected: Vec<LedgerError>) -> LedgerError {
        let total = self.pools.len();
        let mut unexpected: Vec<LedgerError> =
            rejected.into_iter().filter(|e| e.kind() != ErrorKind::NotFound).collect();

        if unexpected.is_empty() {
            return LedgerError::NotFound {
                message: format!("Did '{did}' not found on any of the ledgers (total {total})."),
            };
        }
        let failed = unexpected.len();
        LedgerError::Unresolved {
            did: did.to_string(),
            failed,
            total,
            source: Box::new(unexpected.swap_remove(0)),
        }
    }

    /// Connects every pool, one at a time in configuration order.
    ///
    /// Best effort: failures are logged and skipped. Returns the handles of
    /// the pools that connected.
    pub async fn connect_all(&self) -> Vec<PoolHandle> {
        let mut handles = Vec::with_capacity(self.pools.len());
        for pool in &self.pools {
            match pool.connect().await {
                Ok(handle) => handles.push(handle),
                Err(error) => {
                    warn!(pool_id = %pool.id(), error = %error, "Failed to connect to ledger pool");
                },
            }
        }
        handles
    }

    /// Closes every pool. Failures are logged and do not stop the others.
    pub async fn close_all(&self) {
        for pool in &self.pools {
            if let Err(error) = pool.close().await {
                warn!(pool_id = %pool.id(), error = %error, "Failed to close ledger pool");
            }
        }
    }

    fn pool_by_id(&self, pool_id: &str) -> Option<&LedgerPool> {
        self.pools.iter().find(|pool| pool.id() == pool_id)
    }
}

/// Picks the winning answer among successful, configuration-ordered answers:
/// 1. the first self-certifying answer, else
/// 2. the first answer from a production pool, else
/// 3. the first answer.
fn select_resolution(successful: Vec<(LedgerPool, NymRecord)>) -> Option<(LedgerPool, NymRecord)> {
    let winner = successful
        .iter()
        .position(|(_, nym)| nym.is_self_certified())
        .or_else(|| successful.iter().position(|(pool, _)| pool.is_production()))
        .unwrap_or(0);
    successful.into_iter().nth(winner)
}
