//! Write-triggered digestion scheduling
//!
//! Writes mark their table dirty. The first mark in a quiet period arms one
//! timer for the cooldown window; marks arriving while it is armed only join
//! the dirty set and never push the deadline back. When the timer fires the
//! dirty set is taken and one digest is launched per table. Tables marked
//! after that wait for the next window.

use crate::command::{Tool, ToolRunner};
use crate::query::{table_only_args, telemetry};

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// The armed cooldown window. Its timer only flushes while it is still the
/// current window; a manual flush cancels and replaces it.
struct Window {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct DigestState {
    dirty: BTreeSet<String>,
    window: Option<Window>,
    next_generation: u64,
}

impl DigestState {
    /// Take the dirty set and close the window.
    ///
    /// With `generation` set, only the window of that generation may be
    /// closed; a timer from an older window gets nothing.
    fn take_batch(&mut self, generation: Option<u64>) -> Option<BTreeSet<String>> {
        match (&self.window, generation) {
            (Some(window), Some(g)) if window.generation != g => return None,
            (None, Some(_)) => return None,
            _ => {}
        }
        if let Some(window) = self.window.take() {
            window.cancel.cancel();
        }
        Some(std::mem::take(&mut self.dirty))
    }
}

pub struct DigestScheduler {
    runner: Arc<dyn ToolRunner>,
    cooldown: Duration,
    state: Mutex<DigestState>,
    flushes: AtomicU64,
}

impl DigestScheduler {
    pub fn new(runner: Arc<dyn ToolRunner>, cooldown: Duration) -> Self {
        Self {
            runner,
            cooldown,
            state: Mutex::new(DigestState::default()),
            flushes: AtomicU64::new(0),
        }
    }

    /// Mark `table` dirty and make sure a flush is scheduled.
    pub fn mark_dirty(self: &Arc<Self>, table: &str) {
        let armed = {
            let mut state = self.state.lock();
            state.dirty.insert(table.to_string());
            if state.window.is_some() {
                None
            } else {
                let generation = state.next_generation;
                state.next_generation += 1;
                let cancel = CancellationToken::new();
                state.window = Some(Window {
                    generation,
                    cancel: cancel.clone(),
                });
                Some((generation, cancel))
            }
        };

        let Some((generation, cancel)) = armed else {
            debug!(table, "Digest already scheduled");
            return;
        };

        debug!(
            table,
            generation,
            cooldown_secs = self.cooldown.as_secs(),
            "Scheduling digest"
        );
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(this.cooldown) => {
                    let batch = this.state.lock().take_batch(Some(generation));
                    if let Some(tables) = batch {
                        this.launch_all(tables).await;
                    }
                }
                // Whoever cancelled the window already took its tables.
                _ = cancel.cancelled() => {}
            }
        });
    }

    /// Launch one digest per dirty table now and close the current window.
    ///
    /// Returns the number of tables digested. Launch failures are logged.
    pub async fn flush(&self) -> usize {
        let tables = self.state.lock().take_batch(None).unwrap_or_default();
        self.launch_all(tables).await
    }

    /// Flush immediately instead of waiting out the current window.
    ///
    /// The scheduler stays usable: later marks open a fresh window.
    pub async fn shutdown(&self) {
        info!("Digest scheduler shutting down, flushing dirty tables");
        self.flush().await;
    }

    async fn launch_all(&self, tables: BTreeSet<String>) -> usize {
        if tables.is_empty() {
            return 0;
        }

        self.flushes.fetch_add(1, Ordering::Relaxed);
        info!(tables = tables.len(), "Digesting dirty tables");
        for table in &tables {
            match self.runner.launch(Tool::Digest, &table_only_args(table)).await {
                Ok(()) => telemetry::record_digest_launch("started"),
                Err(e) => {
                    telemetry::record_digest_launch("error");
                    error!(table = %table, error = %e, "Failed to start digest");
                }
            }
        }
        tables.len()
    }

    /// Tables marked dirty since the last flush.
    pub fn pending_tables(&self) -> Vec<String> {
        self.state.lock().dirty.iter().cloned().collect()
    }

    pub fn is_armed(&self) -> bool {
        self.state.lock().window.is_some()
    }

    /// Number of flushes that launched at least one digest.
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }
}
