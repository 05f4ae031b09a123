//! Query spec compiler
//!
//! Translates a `QuerySpec` into the query tool's flags. `compile` produces
//! the fragment shared by every view (grouping, aggregation, filters, limit);
//! the per-view builders wrap it with the flags that select the output shape.

use super::spec::{Filter, QueryOpts, QuerySpec, View};
use crate::command::{CommandArgs, Opt, Switch};
use crate::{Error, Result};

use serde_json::Value;

const STRING_PREFIX: &str = "string";
const INTEGER_PREFIX: &str = "integer";

/// Compile the grouping/filter fragment of `spec`.
///
/// Pure and deterministic. A spec without `opts` compiles to an empty list.
/// Otherwise the time column flag is always present, even with no filters.
pub fn compile(spec: &QuerySpec) -> CommandArgs {
    let Some(opts) = spec.opts.as_ref() else {
        return CommandArgs::new();
    };

    let mut args = dims_and_cols(opts);
    if let Some(filters) = string_filters(opts) {
        args = args.opt(Opt::StrFilter, filters);
    }
    if let Some(filters) = int_and_time_filters(spec.time_col(), opts) {
        args = args.opt(Opt::IntFilter, filters);
    }
    args = args.opt(Opt::TimeCol, spec.time_col());

    // A limit of 0 means "no limit", matching how clients send an unset limit.
    if let Some(limit) = opts.limit.filter(|l| *l > 0) {
        args = args.opt(Opt::Limit, limit.to_string());
    }

    args
}

/// `-group` and `-int`. Both are skipped when `dims` is absent altogether.
fn dims_and_cols(opts: &QueryOpts) -> CommandArgs {
    let mut args = CommandArgs::new();
    let Some(dims) = opts.dims.as_ref() else {
        return args;
    };

    if !dims.is_empty() {
        args = args.opt(Opt::Group, dims.join(","));
    }
    if !opts.cols.is_empty() {
        args = args.opt(Opt::Int, opts.cols.join(","));
    }
    args
}

fn string_filters(opts: &QueryOpts) -> Option<String> {
    let filters: Vec<String> = opts
        .filters
        .iter()
        .filter_map(|f| {
            let (name, op, value) = first_condition(f, STRING_PREFIX)?;
            // Only regex matches map to equality; every other operator is negated.
            let op = if op == "$regex" { "eq" } else { "neq" };
            Some(format!("{name}:{op}:{value}"))
        })
        .collect();

    join_nonempty(filters)
}

fn int_and_time_filters(time_col: &str, opts: &QueryOpts) -> Option<String> {
    let mut filters = Vec::new();

    if let Some(start) = opts.start_ms.filter(|ms| *ms != 0) {
        filters.push(format!("{time_col}:gt:{}", start / 1000));
    }
    if let Some(end) = opts.end_ms.filter(|ms| *ms != 0) {
        filters.push(format!("{time_col}:lt:{}", end / 1000));
    }

    filters.extend(opts.filters.iter().filter_map(|f| {
        let (name, op, value) = first_condition(f, INTEGER_PREFIX)?;
        let op = op.strip_prefix('$').unwrap_or(op);
        Some(format!("{name}:{op}:{value}"))
    }));

    join_nonempty(filters)
}

/// Column name, operator and rendered value of a filter of the given kind.
fn first_condition<'a>(filter: &'a Filter, kind: &str) -> Option<(&'a str, &'a str, String)> {
    let (prefix, name) = filter
        .column
        .split_once('.')
        .unwrap_or((filter.column.as_str(), ""));
    if prefix != kind {
        return None;
    }
    let condition = filter.conditions.first()?;
    Some((name, condition.op.as_str(), render_value(&condition.value)))
}

fn join_nonempty(parts: Vec<String>) -> Option<String> {
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(","))
    }
}

/// Render a filter value the way it appears in a `col:op:val` tuple.
pub(crate) fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(render_value).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// `-laq` plus the compiled fragment, or nothing when the spec has no opts.
fn query_fragment(spec: &QuerySpec) -> CommandArgs {
    if spec.opts.is_none() {
        return CommandArgs::new();
    }
    CommandArgs::new().switch(Switch::Laq).extend(compile(spec))
}

pub fn table_args(table: &str, spec: &QuerySpec) -> CommandArgs {
    CommandArgs::new()
        .switch(Switch::Print)
        .switch(Switch::Json)
        .extend(query_fragment(spec))
        .opt(Opt::Table, table)
}

/// Time series arguments. The view can't be expressed without a bucket size.
pub fn time_args(table: &str, spec: &QuerySpec) -> Result<CommandArgs> {
    let bucket = spec
        .opts
        .as_ref()
        .and_then(|o| o.time_bucket.as_deref())
        .filter(|b| !b.is_empty())
        .ok_or_else(|| Error::MissingQuerySpec("opts.time_bucket".to_string()))?;

    Ok(CommandArgs::new()
        .switch(Switch::Print)
        .switch(Switch::Json)
        .switch(Switch::Time)
        .opt(Opt::TimeBucket, bucket)
        .extend(query_fragment(spec))
        .opt(Opt::Table, table))
}

pub fn hist_args(table: &str, spec: &QuerySpec) -> CommandArgs {
    CommandArgs::new()
        .switch(Switch::Print)
        .switch(Switch::Json)
        .opt(Opt::Op, "hist")
        .extend(query_fragment(spec))
        .opt(Opt::Table, table)
}

pub fn samples_args(table: &str, spec: &QuerySpec) -> CommandArgs {
    query_fragment(spec)
        .switch(Switch::Samples)
        .switch(Switch::Json)
        .opt(Opt::Table, table)
}

/// Full argument list for running `spec` against `table`.
pub fn view_args(table: &str, spec: &QuerySpec) -> Result<CommandArgs> {
    match spec.view {
        View::Table => Ok(table_args(table, spec)),
        View::Time => time_args(table, spec),
        View::Hist => Ok(hist_args(table, spec)),
        View::Samples => Ok(samples_args(table, spec)),
    }
}

pub fn info_args(table: &str) -> CommandArgs {
    CommandArgs::new()
        .switch(Switch::Info)
        .switch(Switch::Json)
        .opt(Opt::Table, table)
}

/// Raw table statistics, as returned to callers unchanged.
pub fn stats_args(table: &str) -> CommandArgs {
    CommandArgs::new()
        .switch(Switch::Json)
        .switch(Switch::Info)
        .opt(Opt::Table, table)
}

pub fn tables_args() -> CommandArgs {
    CommandArgs::new().switch(Switch::Tables).switch(Switch::Json)
}

/// Arguments for the ingest and digest tools.
pub fn table_only_args(table: &str) -> CommandArgs {
    CommandArgs::new().opt(Opt::Table, table)
}
