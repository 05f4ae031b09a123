//! Driver contract exposed to the API layer
//!
//! Each operation returns exactly one `Result`; nothing is retried.

use crate::command::{Tool, ToolRunner};
use crate::config::DriverConfig;
use crate::ingester::{DigestScheduler, Ingester};
use crate::metadata::{parse_tables, ColumnCache, Columns, TableInfo, TableRef};
use crate::query::{stats_args, tables_args, QueryExecutor, QueryOutput, QuerySpec};
use crate::Result;

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

pub struct PcsDriver {
    config: DriverConfig,
    runner: Arc<dyn ToolRunner>,
    queries: QueryExecutor,
    columns: Arc<ColumnCache>,
    ingester: Ingester,
}

impl PcsDriver {
    pub fn new(config: DriverConfig, runner: Arc<dyn ToolRunner>) -> Self {
        let columns = Arc::new(ColumnCache::new(runner.clone(), config.column_ttl));
        let digests = Arc::new(DigestScheduler::new(runner.clone(), config.digest_cooldown));

        Self {
            queries: QueryExecutor::new(runner.clone()),
            ingester: Ingester::new(runner.clone(), digests),
            columns,
            runner,
            config,
        }
    }

    /// Run a query spec against `table`.
    ///
    /// `unweight` is accepted for interface compatibility; weighting columns
    /// are not supported by the query tool, so it has no effect.
    pub async fn run(&self, table: &TableRef, spec: &QuerySpec, unweight: bool) -> Result<QueryOutput> {
        let table = table.require()?;
        info!(table, view = spec.view.as_str(), "Running query");
        if unweight {
            debug!(table, "Ignoring unweight flag");
        }
        self.queries.run(table, spec).await
    }

    /// Raw `-info` output for `table`.
    pub async fn get_stats(&self, table: &TableRef) -> Result<Value> {
        let table = table.require()?;
        info!(table, "Getting stats for table");
        self.runner.run_json(Tool::Query, &stats_args(table)).await
    }

    pub async fn get_tables(&self) -> Result<Vec<TableInfo>> {
        let listing = self.runner.run_json(Tool::Query, &tables_args()).await?;
        parse_tables(&listing)
    }

    /// Column metadata for `table`, served from the coalescing cache.
    pub async fn get_columns(&self, table: &TableRef) -> Result<Columns> {
        self.columns.get(table.require()?).await
    }

    /// Write `samples` into `dataset.subset` and schedule its digestion.
    pub async fn add_samples(&self, dataset: &str, subset: &str, samples: &[Value]) -> Result<()> {
        self.ingester.add_samples(dataset, subset, samples).await?;
        Ok(())
    }

    /// Forget cached column metadata for `table`.
    pub fn clear_cache(&self, table: &TableRef) {
        self.columns.invalidate(table.name());
    }

    pub fn default_table(&self) -> &str {
        &self.config.default_table
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn column_cache(&self) -> &Arc<ColumnCache> {
        &self.columns
    }

    pub fn digests(&self) -> &Arc<DigestScheduler> {
        self.ingester.digests()
    }

    /// Flush pending digests without waiting for the cooldown.
    pub async fn shutdown(&self) {
        self.digests().shutdown().await;
    }
}
