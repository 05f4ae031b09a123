//! Query-path telemetry instruments and recording helpers.

use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::KeyValue;
use std::sync::OnceLock;

struct QueryInstruments {
    query_requests: Counter<u64>,
    query_duration_seconds: Histogram<f64>,
    query_rows_returned: Histogram<u64>,
    column_cache_lookups: Counter<u64>,
    digest_launches: Counter<u64>,
}

fn instruments() -> &'static QueryInstruments {
    static INSTRUMENTS: OnceLock<QueryInstruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| {
        let meter = global::meter("pcs.query");
        QueryInstruments {
            query_requests: meter
                .u64_counter("pcs.query.requests")
                .with_description("Total query requests by view and outcome")
                .init(),
            query_duration_seconds: meter
                .f64_histogram("pcs.query.duration")
                .with_description("Query latency including the external tool run")
                .with_unit("s")
                .init(),
            query_rows_returned: meter
                .u64_histogram("pcs.query.rows_returned")
                .with_description("Marshalled rows returned per query")
                .init(),
            column_cache_lookups: meter
                .u64_counter("pcs.metadata.column_cache.lookups")
                .with_description("Column metadata lookups by cache outcome")
                .init(),
            digest_launches: meter
                .u64_counter("pcs.ingest.digest_launches")
                .with_description("Digest tool launches by outcome")
                .init(),
        }
    })
}

pub struct QueryMetrics {
    pub view: &'static str,
    pub outcome: &'static str,
    pub error_class: Option<&'static str>,
    pub duration_seconds: f64,
    pub rows_returned: u64,
}

pub fn record_query(metrics: QueryMetrics) {
    let i = instruments();
    let mut attrs = vec![
        KeyValue::new("view", metrics.view),
        KeyValue::new("outcome", metrics.outcome),
    ];
    if let Some(error_class) = metrics.error_class {
        attrs.push(KeyValue::new("error.class", error_class));
    }

    i.query_requests.add(1, &attrs);
    i.query_duration_seconds.record(metrics.duration_seconds, &attrs);
    i.query_rows_returned.record(metrics.rows_returned, &attrs);
}

/// `outcome` is one of hit, stale, miss, coalesced.
pub fn record_column_lookup(outcome: &'static str) {
    instruments()
        .column_cache_lookups
        .add(1, &[KeyValue::new("outcome", outcome)]);
}

pub fn record_digest_launch(outcome: &'static str) {
    instruments()
        .digest_launches
        .add(1, &[KeyValue::new("outcome", outcome)]);
}
