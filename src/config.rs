//! Driver configuration and component factory
//!
//! Defaults mirror the layout the tools are usually deployed with: the three
//! executables under `./bin` relative to the process working directory, and
//! the table data in `./`. Every setting can be overridden from the
//! environment.

use crate::command::{ProcessRunner, Tool, ToolRunner};
use crate::driver::PcsDriver;
use crate::{Error, Result};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Default stdout ceiling for one query invocation.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 100_000 * 1024;
/// Column metadata is refreshed after this long.
pub const DEFAULT_COLUMN_TTL: Duration = Duration::from_secs(600);
/// Digest requests are collapsed over this window.
pub const DEFAULT_DIGEST_COOLDOWN: Duration = Duration::from_secs(30);
pub const DEFAULT_TABLE: &str = "snorkel_test_data";

/// Locations of the external executables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub query: PathBuf,
    pub ingest: PathBuf,
    pub digest: PathBuf,
}

impl ToolPaths {
    /// Paths for `query`, `ingest` and `digest` inside `bin_dir`.
    pub fn in_dir(bin_dir: impl AsRef<Path>) -> Self {
        let dir = bin_dir.as_ref();
        Self {
            query: dir.join("query"),
            ingest: dir.join("ingest"),
            digest: dir.join("digest"),
        }
    }

    pub fn path(&self, tool: Tool) -> &Path {
        match tool {
            Tool::Query => &self.query,
            Tool::Ingest => &self.ingest,
            Tool::Digest => &self.digest,
        }
    }
}

impl Default for ToolPaths {
    fn default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::in_dir(cwd.join("bin"))
    }
}

/// Configuration for the driver
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// External executables
    pub tools: ToolPaths,
    /// Working directory the tools run in
    pub work_dir: PathBuf,
    /// Stdout ceiling for query invocations
    pub max_output_bytes: usize,
    /// Column metadata freshness window
    pub column_ttl: Duration,
    /// Digest batching window
    pub digest_cooldown: Duration,
    /// Table offered to clients that have not picked one
    pub default_table: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tools: ToolPaths::default(),
            work_dir: PathBuf::from("./"),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            column_ttl: DEFAULT_COLUMN_TTL,
            digest_cooldown: DEFAULT_DIGEST_COOLDOWN,
            default_table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl DriverConfig {
    /// Build a config from the environment, falling back to defaults.
    ///
    /// Environment variables:
    /// - PCS_BIN_DIR: directory holding query/ingest/digest (default: ./bin)
    /// - PCS_QUERY_BIN, PCS_INGEST_BIN, PCS_DIGEST_BIN: per-tool overrides
    /// - PCS_DB_DIR: working directory for the tools (default: ./)
    /// - PCS_MAX_OUTPUT_BYTES: stdout ceiling for queries
    /// - PCS_COLUMN_TTL_SECS: column metadata TTL (default: 600)
    /// - PCS_DIGEST_COOLDOWN_SECS: digest window (default: 30)
    /// - PCS_DEFAULT_TABLE: default table name
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(dir) = var("PCS_BIN_DIR") {
            config.tools = ToolPaths::in_dir(dir);
        }
        if let Some(path) = var("PCS_QUERY_BIN") {
            config.tools.query = PathBuf::from(path);
        }
        if let Some(path) = var("PCS_INGEST_BIN") {
            config.tools.ingest = PathBuf::from(path);
        }
        if let Some(path) = var("PCS_DIGEST_BIN") {
            config.tools.digest = PathBuf::from(path);
        }
        if let Some(dir) = var("PCS_DB_DIR") {
            config.work_dir = PathBuf::from(dir);
        }
        if let Some(raw) = var("PCS_MAX_OUTPUT_BYTES") {
            config.max_output_bytes = parse_number("PCS_MAX_OUTPUT_BYTES", &raw)? as usize;
        }
        if let Some(raw) = var("PCS_COLUMN_TTL_SECS") {
            config.column_ttl = Duration::from_secs(parse_number("PCS_COLUMN_TTL_SECS", &raw)?);
        }
        if let Some(raw) = var("PCS_DIGEST_COOLDOWN_SECS") {
            config.digest_cooldown =
                Duration::from_secs(parse_number("PCS_DIGEST_COOLDOWN_SECS", &raw)?);
        }
        if let Some(table) = var("PCS_DEFAULT_TABLE") {
            config.default_table = table;
        }

        if config.max_output_bytes == 0 {
            return Err(Error::Config(
                "PCS_MAX_OUTPUT_BYTES must be greater than zero".to_string(),
            ));
        }

        Ok(config)
    }
}

fn parse_number(name: &str, raw: &str) -> Result<u64> {
    raw.parse::<u64>().map_err(|e| {
        Error::Config(format!(
            "{name} must be a non-negative integer, got '{raw}': {e}"
        ))
    })
}

pub struct ComponentFactory;

impl ComponentFactory {
    /// Create a process-backed tool runner
    pub fn create_runner(config: &DriverConfig) -> Arc<dyn ToolRunner> {
        info!(
            query = %config.tools.query.display(),
            ingest = %config.tools.ingest.display(),
            digest = %config.tools.digest.display(),
            work_dir = %config.work_dir.display(),
            "Using process tool runner"
        );
        Arc::new(ProcessRunner::new(
            config.tools.clone(),
            config.work_dir.clone(),
            config.max_output_bytes,
        ))
    }

    /// Create a driver over real tool processes
    pub fn create_driver(config: DriverConfig) -> PcsDriver {
        let runner = Self::create_runner(&config);
        PcsDriver::new(config, runner)
    }

    /// Create a driver from environment variables
    pub fn create_driver_from_env() -> Result<PcsDriver> {
        Ok(Self::create_driver(DriverConfig::from_env()?))
    }
}
