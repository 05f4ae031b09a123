//! Query execution
//!
//! A query runs in three steps:
//! - compile the spec into query tool arguments for its view
//! - run the tool and parse its JSON output
//! - marshal the output into the view's canonical shape

mod compiler;
mod marshal;
mod spec;
pub(crate) mod telemetry;

pub use compiler::{
    compile, hist_args, info_args, samples_args, stats_args, table_args, table_only_args,
    tables_args, time_args, view_args,
};
pub use marshal::{
    marshal_dist_rows, marshal_samples, marshal_table_rows, marshal_time_rows, parse_float,
    CanonicalRow, Sample, COUNT_FIELD, TIME_BUCKET_KEY,
};
pub use spec::{
    Condition, Filter, QueryMeta, QueryOpts, QuerySpec, TableMetadata, View, DEFAULT_TIME_COLUMN,
};

use crate::command::{Tool, ToolRunner};
use crate::{Error, Result};

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info_span, Instrument};

/// Marshalled result of one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    /// table, time and hist views
    Rows(Vec<CanonicalRow>),
    /// samples view
    Samples(Vec<Sample>),
}

impl QueryOutput {
    pub fn len(&self) -> usize {
        match self {
            QueryOutput::Rows(rows) => rows.len(),
            QueryOutput::Samples(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rows(&self) -> Option<&[CanonicalRow]> {
        match self {
            QueryOutput::Rows(rows) => Some(rows),
            QueryOutput::Samples(_) => None,
        }
    }

    pub fn samples(&self) -> Option<&[Sample]> {
        match self {
            QueryOutput::Samples(samples) => Some(samples),
            QueryOutput::Rows(_) => None,
        }
    }
}

/// Runs query specs against the query tool.
#[derive(Clone)]
pub struct QueryExecutor {
    runner: Arc<dyn ToolRunner>,
}

impl QueryExecutor {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }

    /// Run `spec` against `table` and marshal the result for its view.
    pub async fn run(&self, table: &str, spec: &QuerySpec) -> Result<QueryOutput> {
        let view = spec.view;
        let started = Instant::now();
        let span = info_span!("query.run", table = %table, view = view.as_str());

        let result = async {
            if table.is_empty() {
                return Err(Error::MissingTable);
            }

            let args = view_args(table, spec)?;
            let raw = self.runner.run_json(Tool::Query, &args).await?;

            let (cols, dims) = (spec.cols(), spec.dims());
            let output = match view {
                View::Table => QueryOutput::Rows(marshal_table_rows(&raw, cols, dims)?),
                View::Time => QueryOutput::Rows(marshal_time_rows(&raw, cols, dims)?),
                View::Hist => QueryOutput::Rows(marshal_dist_rows(&raw, cols, dims)?),
                View::Samples => QueryOutput::Samples(marshal_samples(&raw)?),
            };
            debug!(rows = output.len(), "Query marshalled");
            Ok::<_, Error>(output)
        }
        .instrument(span)
        .await;

        let duration_seconds = started.elapsed().as_secs_f64();
        match &result {
            Ok(output) => telemetry::record_query(telemetry::QueryMetrics {
                view: view.as_str(),
                outcome: "success",
                error_class: None,
                duration_seconds,
                rows_returned: output.len() as u64,
            }),
            Err(error) => telemetry::record_query(telemetry::QueryMetrics {
                view: view.as_str(),
                outcome: "error",
                error_class: Some(error.class()),
                duration_seconds,
                rows_returned: 0,
            }),
        }

        result
    }
}
