//! Column metadata cache with request coalescing
//!
//! Per table the cache moves through absent -> pending -> cached ->
//! stale -> refreshing:
//! - a fresh entry is returned directly
//! - a stale entry is returned directly and a background refresh starts
//! - with no entry, the caller waits on the table's in-flight refresh,
//!   starting one if none is running
//!
//! At most one `-info` call per table is in flight. Its result is handed to
//! every waiter in arrival order.

use super::{parse_columns, ColumnMeta};
use crate::command::{Tool, ToolRunner};
use crate::query::info_args;
use crate::query::telemetry;
use crate::{Error, Result};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Shared, immutable column list for one table.
pub type Columns = Arc<[ColumnMeta]>;

type Waiter = oneshot::Sender<Result<Columns>>;

struct CacheEntry {
    columns: Columns,
    updated: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Tables with a refresh in flight, and the callers waiting on it
    pending: HashMap<String, Vec<Waiter>>,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub stale_hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub fetches: u64,
}

#[derive(Default)]
struct CacheCounters {
    hits: AtomicU64,
    stale_hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    fetches: AtomicU64,
}

pub struct ColumnCache {
    runner: Arc<dyn ToolRunner>,
    ttl: Duration,
    state: Mutex<CacheState>,
    stats: CacheCounters,
}

impl ColumnCache {
    pub fn new(runner: Arc<dyn ToolRunner>, ttl: Duration) -> Self {
        Self {
            runner,
            ttl,
            state: Mutex::new(CacheState::default()),
            stats: CacheCounters::default(),
        }
    }

    /// Columns of `table`, from cache when possible.
    pub async fn get(self: &Arc<Self>, table: &str) -> Result<Columns> {
        if table.is_empty() {
            return Err(Error::MissingTable);
        }

        let rx = {
            let mut state = self.state.lock();

            let cached = state
                .entries
                .get(table)
                .map(|e| (e.columns.clone(), e.updated.elapsed() < self.ttl));
            if let Some((columns, fresh)) = cached {
                if fresh {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    telemetry::record_column_lookup("hit");
                } else {
                    self.stats.stale_hits.fetch_add(1, Ordering::Relaxed);
                    telemetry::record_column_lookup("stale");
                    debug!(table, "Serving stale columns while refreshing");
                    if !state.pending.contains_key(table) {
                        state.pending.insert(table.to_string(), Vec::new());
                        self.spawn_refresh(table);
                    }
                }
                return Ok(columns);
            }

            let (tx, rx) = oneshot::channel();
            match state.pending.get_mut(table) {
                Some(waiters) => {
                    waiters.push(tx);
                    self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
                    telemetry::record_column_lookup("coalesced");
                }
                None => {
                    state.pending.insert(table.to_string(), vec![tx]);
                    self.stats.misses.fetch_add(1, Ordering::Relaxed);
                    telemetry::record_column_lookup("miss");
                    self.spawn_refresh(table);
                }
            }
            rx
        };

        rx.await.map_err(|_| {
            Error::Internal(format!("column refresh for {table} ended without a result"))
        })?
    }

    /// Drop the cached entry for `table`. An in-flight refresh still lands.
    pub fn invalidate(&self, table: &str) {
        if self.state.lock().entries.remove(table).is_some() {
            debug!(table, "Invalidated cached columns");
        }
    }

    /// Whether a refresh for `table` is currently running.
    pub fn is_refreshing(&self, table: &str) -> bool {
        self.state.lock().pending.contains_key(table)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            stale_hits: self.stats.stale_hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            coalesced: self.stats.coalesced.load(Ordering::Relaxed),
            fetches: self.stats.fetches.load(Ordering::Relaxed),
        }
    }

    /// The refresh runs on its own task so a caller dropping its future
    /// can't strand the other waiters. The pending slot must already exist.
    fn spawn_refresh(self: &Arc<Self>, table: &str) {
        let this = Arc::clone(self);
        let table = table.to_string();
        tokio::spawn(async move { this.refresh(table).await });
    }

    async fn refresh(&self, table: String) {
        self.stats.fetches.fetch_add(1, Ordering::Relaxed);
        info!(table = %table, "Getting columns");
        let result = self.load(&table).await;

        let waiters = {
            let mut state = self.state.lock();
            if let Ok(columns) = &result {
                state.entries.insert(
                    table.clone(),
                    CacheEntry {
                        columns: columns.clone(),
                        updated: Instant::now(),
                    },
                );
            }
            state.pending.remove(&table).unwrap_or_default()
        };

        match result {
            Ok(columns) => {
                for waiter in waiters {
                    let _ = waiter.send(Ok(columns.clone()));
                }
            }
            Err(e) => {
                warn!(table = %table, error = %e, waiters = waiters.len(), "Column refresh failed");
                let message = e.to_string();
                for waiter in waiters {
                    let _ = waiter.send(Err(Error::Metadata(format!(
                        "failed to load columns for {table}: {message}"
                    ))));
                }
            }
        }
    }

    async fn load(&self, table: &str) -> Result<Columns> {
        let info = self.runner.run_json(Tool::Query, &info_args(table)).await?;
        Ok(parse_columns(&info)?.into())
    }
}
