//! Shared test fixtures: an in-memory tool runner with scripted responses.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use pcs_driver::command::{CommandArgs, Tool, ToolRunner};
use pcs_driver::config::DriverConfig;
use pcs_driver::{PcsDriver, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

type Responder = Box<dyn Fn(Tool, &CommandArgs) -> Result<Value> + Send + Sync>;

/// One recorded tool invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub tool: Tool,
    pub argv: Vec<String>,
    /// Records written to stdin, for `stream_records`
    pub records: Vec<Value>,
}

impl Call {
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}

/// `ToolRunner` that records every call and answers `run_json` from a
/// closure, optionally after a delay.
pub struct FakeRunner {
    responder: Responder,
    delay: Option<Duration>,
    calls: Mutex<Vec<Call>>,
}

impl FakeRunner {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(Tool, &CommandArgs) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `value`.
    pub fn returning(value: Value) -> Self {
        Self::new(move |_, _| Ok(value.clone()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, tool: Tool) -> Vec<Call> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.tool == tool)
            .cloned()
            .collect()
    }

    pub fn count(&self, tool: Tool) -> usize {
        self.calls.lock().iter().filter(|c| c.tool == tool).count()
    }

    fn record(&self, tool: Tool, args: &CommandArgs, records: &[Value]) {
        self.calls.lock().push(Call {
            tool,
            argv: args.to_argv(),
            records: records.to_vec(),
        });
    }
}

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn run_json(&self, tool: Tool, args: &CommandArgs) -> Result<Value> {
        self.record(tool, args, &[]);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(tool, args)
    }

    async fn stream_records(
        &self,
        tool: Tool,
        args: &CommandArgs,
        records: &[Value],
    ) -> Result<()> {
        self.record(tool, args, records);
        Ok(())
    }

    async fn launch(&self, tool: Tool, args: &CommandArgs) -> Result<()> {
        self.record(tool, args, &[]);
        Ok(())
    }
}

/// Driver with default config over `runner`.
pub fn driver_with(runner: Arc<FakeRunner>) -> PcsDriver {
    PcsDriver::new(DriverConfig::default(), runner)
}

/// Let spawned background tasks run to completion under paused time.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
