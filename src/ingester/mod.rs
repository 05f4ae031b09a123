//! Write path
//!
//! Samples are streamed to the ingest tool as newline-delimited JSON. Each
//! successful write marks its table for a batched background digest.

mod digest;

pub use digest::DigestScheduler;

use crate::command::{Tool, ToolRunner};
use crate::query::table_only_args;
use crate::{Error, Result};

use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Table a `dataset`/`subset` pair is written to.
pub fn table_name(dataset: &str, subset: &str) -> String {
    format!("{dataset}.{subset}")
}

pub struct Ingester {
    runner: Arc<dyn ToolRunner>,
    digests: Arc<DigestScheduler>,
}

impl Ingester {
    pub fn new(runner: Arc<dyn ToolRunner>, digests: Arc<DigestScheduler>) -> Self {
        Self { runner, digests }
    }

    /// Stream `samples` into `dataset.subset` and queue a digest for it.
    ///
    /// Returns once the records are written to the tool's stdin; the ingest
    /// itself finishes in the background. Returns the table written to.
    pub async fn add_samples(
        &self,
        dataset: &str,
        subset: &str,
        samples: &[Value],
    ) -> Result<String> {
        if dataset.is_empty() || subset.is_empty() {
            return Err(Error::MissingTable);
        }

        let table = table_name(dataset, subset);
        info!(table = %table, samples = samples.len(), "Adding samples");

        self.runner
            .stream_records(Tool::Ingest, &table_only_args(&table), samples)
            .await?;
        self.digests.mark_dirty(&table);

        Ok(table)
    }

    pub fn digests(&self) -> &Arc<DigestScheduler> {
        &self.digests
    }
}
