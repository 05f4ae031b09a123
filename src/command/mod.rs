//! Command protocol adapter
//!
//! Builds argument lists for the external query, ingest and digest tools and
//! runs them, returning parsed JSON output.

mod args;
mod runner;

pub use args::{CommandArgs, Opt, Switch};
pub use runner::{ProcessRunner, Tool, ToolRunner};
