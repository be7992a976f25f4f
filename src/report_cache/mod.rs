//! Generic report cache
//!
//! [`ReportCache`] owns the freshness decision, base table materialization,
//! per-key locking and the staging/publish cycle. What gets derived from the
//! base table is delegated to a [`DerivedTableBuilder`], which only runs on
//! rebuild.
//!
//! One request for a key:
//! 1. take the key's write lock
//! 2. resolve Fresh or Rebuild from the live tables
//! 3. on Rebuild: materialize the base table and run the builder into staging
//!    tables, then publish them over the live names (bounded by the rebuild
//!    timeout; staging is dropped on any failure)
//! 4. on Fresh: ask the builder to describe the live generation
//! 5. downgrade to a read lock and hand the caller a [`CacheHandle`]

pub mod errors;
pub mod freshness;
pub mod tables;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{OwnedRwLockReadGuard, RwLock};

pub use errors::CacheError;
pub use freshness::{CacheEntry, CachePolicy, Freshness, FreshnessDecider, RebuildReason};
pub use tables::TableSet;

use crate::cache_store::{CacheStore, StoreError};
use crate::config::CacheConfig;
use crate::query_builder::{Statement, ToSql};
use crate::report_source::{BaseTableSource, CacheKey, ReportQuerySource};

/// Produces a report's derived tables from its base table
#[async_trait]
pub trait DerivedTableBuilder: Send + Sync {
    /// What the caller needs to know about a generation to read it back
    type Schema: Send + Sync;

    /// Derived table prefixes in build order; the last one is written last and
    /// marks a complete generation
    fn table_prefixes(&self) -> &'static [&'static str];

    /// Build every derived table of `tables` from `tables.base()`
    async fn build(
        &self,
        store: &dyn CacheStore,
        tables: &TableSet,
    ) -> Result<Self::Schema, CacheError>;

    /// Describe an existing generation without modifying it
    async fn describe(&self, store: &dyn CacheStore, tables: &TableSet) -> Self::Schema;
}

/// A readable generation of one key
///
/// Holds the key's read lock, so no rebuild of the same key can publish while
/// the handle is alive.
pub struct CacheHandle<S> {
    pub report_name: String,
    pub report_description: String,
    pub entry: CacheEntry,
    pub tables: TableSet,
    pub schema: S,
    _guard: OwnedRwLockReadGuard<()>,
}

impl<S> CacheHandle<S> {
    pub fn key(&self) -> &CacheKey {
        &self.entry.key
    }
}

pub struct ReportCache<B: DerivedTableBuilder> {
    store: Arc<dyn CacheStore>,
    builder: B,
    decider: FreshnessDecider,
    rebuild_timeout: Duration,
    locks: Mutex<HashMap<CacheKey, Arc<RwLock<()>>>>,
}

impl<B: DerivedTableBuilder> ReportCache<B> {
    pub fn new(store: Arc<dyn CacheStore>, builder: B, config: &CacheConfig) -> Self {
        Self::with_settings(
            store,
            builder,
            FreshnessDecider::new(config.expire_time(), config.cache_enabled),
            config.rebuild_timeout(),
        )
    }

    pub fn with_settings(
        store: Arc<dyn CacheStore>,
        builder: B,
        decider: FreshnessDecider,
        rebuild_timeout: Duration,
    ) -> Self {
        Self {
            store,
            builder,
            decider,
            rebuild_timeout,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    fn key_lock(&self, key: &CacheKey) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // clones are only taken under this mutex, so a count of one means idle
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Resolve, rebuild if needed, and return a readable generation
    pub async fn open(
        &self,
        source: &dyn ReportQuerySource,
        policy: CachePolicy,
    ) -> Result<CacheHandle<B::Schema>, CacheError> {
        let key = source
            .cache_key()
            .map_err(|e| CacheError::InvalidKey(e.to_string()))?;
        let lock = self.key_lock(&key);
        let guard = lock.write_owned().await;

        let live = TableSet::live(key.clone());
        let exists = self.live_generation_exists(&live).await?;
        let generated_at = if exists {
            self.store.table_generated_at(&live.base()).await?
        } else {
            None
        };

        let freshness = self
            .decider
            .resolve(&key, policy, exists, generated_at, Utc::now())?;

        let (schema, generated_at, generated_this_request) = match freshness {
            Freshness::Fresh => {
                log::info!("Cache `{}` is fresh, reusing derived tables", key);
                let schema = self.builder.describe(self.store.as_ref(), &live).await;
                (schema, generated_at, false)
            }
            Freshness::Rebuild(reason) => {
                log::info!("Rebuilding cache `{}` ({:?})", key, reason);
                let schema = self.rebuild(source, &key).await?;
                let generated_at = self
                    .store
                    .table_generated_at(&live.base())
                    .await?
                    .or_else(|| Some(Utc::now()));
                (schema, generated_at, true)
            }
        };

        let entry = CacheEntry {
            key,
            base_table_name: live.base(),
            generated_at,
            expire_time: self.decider.expire_time(),
            generated_this_request,
        };

        Ok(CacheHandle {
            report_name: source.report_name().to_string(),
            report_description: source.report_description().to_string(),
            entry,
            tables: live,
            schema,
            _guard: guard.downgrade(),
        })
    }

    async fn live_generation_exists(&self, live: &TableSet) -> Result<bool, StoreError> {
        if !self.store.table_exists(&live.base()).await? {
            return Ok(false);
        }
        match self.builder.table_prefixes().last() {
            Some(last) => self.store.table_exists(&live.derived(last)).await,
            None => Ok(true),
        }
    }

    async fn rebuild(
        &self,
        source: &dyn ReportQuerySource,
        key: &CacheKey,
    ) -> Result<B::Schema, CacheError> {
        let report = source.report_name().to_string();
        let base_source = source
            .base_table()
            .map_err(|e| CacheError::SourceUnavailable {
                report: report.clone(),
                message: e.to_string(),
            })?;

        let staging = TableSet::staging(key.clone());
        let work = async {
            self.materialize_base(&report, &base_source, &staging).await?;
            let schema = self.builder.build(self.store.as_ref(), &staging).await?;
            self.publish(key, &staging).await?;
            Ok::<_, CacheError>(schema)
        };

        let outcome = match tokio::time::timeout(self.rebuild_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout {
                key: key.to_string(),
                timeout: self.rebuild_timeout,
            }),
        };

        match outcome {
            Ok(schema) => {
                log::info!("Published new generation of `{}`", key);
                Ok(schema)
            }
            Err(e) => {
                log::error!("Rebuild of `{}` failed: {}", key, e);
                self.discard(&staging).await;
                if matches!(e, CacheError::Publish { .. }) {
                    self.discard(&TableSet::live(key.clone())).await;
                }
                Err(e)
            }
        }
    }

    async fn materialize_base(
        &self,
        report: &str,
        base_source: &BaseTableSource,
        staging: &TableSet,
    ) -> Result<(), CacheError> {
        for statement in base_source.statements(&staging.base()) {
            self.store.execute(&statement).await.map_err(|e| {
                log::error!(
                    "Materializing base table for `{}` failed. Statement was:\n{}\nError: {}",
                    report,
                    render(&statement),
                    e
                );
                CacheError::SourceUnavailable {
                    report: report.to_string(),
                    message: e.to_string(),
                }
            })?;
        }
        Ok(())
    }

    /// Move `staging` over the live names
    ///
    /// The live marker table goes first and comes back last, so a live set
    /// is only complete once every table of the new generation is in place.
    /// A publish that stops halfway leaves a mix of generations, which is
    /// dropped.
    async fn publish(&self, key: &CacheKey, staging: &TableSet) -> Result<(), CacheError> {
        let prefixes = self.builder.table_prefixes();
        let live = TableSet::live(key.clone());
        let result = async {
            if let Some(marker) = prefixes.last() {
                self.store.drop_tables(&[live.derived(marker)]).await?;
            }
            self.store.publish(&staging.publish_pairs(prefixes)).await
        }
        .await;

        result.map_err(|source| {
            log::error!(
                "Publishing `{}` failed, dropping the partly published live tables",
                key
            );
            CacheError::Publish {
                key: key.to_string(),
                source,
            }
        })
    }

    async fn discard(&self, tables: &TableSet) {
        let names = tables.all(self.builder.table_prefixes());
        if let Err(e) = self.store.drop_tables(&names).await {
            log::warn!("Failed to drop tables {:?}: {}", names, e);
        }
    }
}

/// SQL for diagnostics; falls back to the debug form if rendering fails
pub(crate) fn render(statement: &Statement) -> String {
    statement
        .to_sql()
        .unwrap_or_else(|_| format!("{:?}", statement))
}
