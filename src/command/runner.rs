//! Process execution for the query, ingest and digest tools

use super::args::CommandArgs;
use crate::config::ToolPaths;
use crate::{Error, Result};

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The three external executables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Query,
    Ingest,
    Digest,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Query => "query",
            Tool::Ingest => "ingest",
            Tool::Digest => "digest",
        }
    }
}

/// Command protocol adapter
///
/// Abstracts how the external tools are invoked so the query, metadata and
/// write paths can run against real processes or an in-memory fake.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run `tool` to completion and parse its stdout as JSON.
    ///
    /// Unparseable stdout is an `Error::Parse` whatever the exit status was.
    async fn run_json(&self, tool: Tool, args: &CommandArgs) -> Result<Value>;

    /// Start `tool` and write each record to its stdin as one JSON document
    /// per line, then close stdin. Does not wait for the tool to exit.
    async fn stream_records(&self, tool: Tool, args: &CommandArgs, records: &[Value])
        -> Result<()>;

    /// Start `tool` and return without waiting. Output is only logged.
    async fn launch(&self, tool: Tool, args: &CommandArgs) -> Result<()>;
}

/// `ToolRunner` backed by real child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    tools: ToolPaths,
    work_dir: PathBuf,
    max_output_bytes: usize,
}

impl ProcessRunner {
    pub fn new(tools: ToolPaths, work_dir: impl Into<PathBuf>, max_output_bytes: usize) -> Self {
        Self {
            tools,
            work_dir: work_dir.into(),
            max_output_bytes,
        }
    }

    fn command(&self, tool: Tool, args: &CommandArgs) -> Command {
        let program = self.tools.path(tool);
        info!(
            tool = tool.as_str(),
            command = %format!("{} {}", program.display(), args),
            "Running command"
        );

        let mut cmd = Command::new(program);
        cmd.args(args.to_argv()).current_dir(&self.work_dir);
        cmd
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run_json(&self, tool: Tool, args: &CommandArgs) -> Result<Value> {
        let mut child = self
            .command(tool, args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr_task = drain_stderr(&mut child);
        let Some(mut stdout) = child.stdout.take() else {
            kill_and_reap(tool, &mut child, stderr_task).await;
            return Err(Error::Internal("child stdout was not captured".to_string()));
        };

        // Read one byte past the ceiling so an exact-size output is accepted.
        let mut buf = Vec::new();
        let read = (&mut stdout)
            .take(self.max_output_bytes as u64 + 1)
            .read_to_end(&mut buf)
            .await;

        if let Err(e) = read {
            warn!(tool = tool.as_str(), error = %e, "Failed reading tool output, killing process");
            kill_and_reap(tool, &mut child, stderr_task).await;
            return Err(e.into());
        }

        if buf.len() > self.max_output_bytes {
            warn!(
                tool = tool.as_str(),
                limit = self.max_output_bytes,
                "Tool output exceeded limit, killing process"
            );
            kill_and_reap(tool, &mut child, stderr_task).await;
            return Err(Error::OutputLimit {
                limit: self.max_output_bytes,
            });
        }

        let status = child.wait().await?;
        log_completion(tool, Some(status), collect(stderr_task).await);

        // Exit status is deliberately not checked here; only the parse can fail.
        serde_json::from_slice(&buf).map_err(|e| Error::Parse(e.to_string()))
    }

    async fn stream_records(
        &self,
        tool: Tool,
        args: &CommandArgs,
        records: &[Value],
    ) -> Result<()> {
        let mut child = self
            .command(tool, args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr_task = drain_stderr(&mut child);
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Internal("child stdin was not captured".to_string()))?;

        let written = async {
            for record in records {
                let mut line = serde_json::to_vec(record)?;
                line.push(b'\n');
                stdin.write_all(&line).await?;
            }
            stdin.flush().await?;
            Ok::<_, Error>(())
        }
        .await;
        drop(stdin);

        reap(tool, child, stderr_task);
        debug!(tool = tool.as_str(), records = records.len(), "Streamed records");
        written
    }

    async fn launch(&self, tool: Tool, args: &CommandArgs) -> Result<()> {
        let mut child = self
            .command(tool, args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr_task = drain_stderr(&mut child);
        reap(tool, child, stderr_task);
        Ok(())
    }
}

type StderrTask = Option<JoinHandle<Vec<u8>>>;

/// Read stderr on its own task so a chatty child can't block on a full pipe.
fn drain_stderr(child: &mut Child) -> StderrTask {
    child.stderr.take().map(|stderr| tokio::spawn(read_all(stderr)))
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        debug!(error = %e, "Failed reading tool stderr");
    }
    buf
}

async fn collect(task: StderrTask) -> Vec<u8> {
    match task {
        Some(handle) => handle.await.unwrap_or_default(),
        None => Vec::new(),
    }
}

/// Kill a child whose output is being abandoned and wait for it to exit.
async fn kill_and_reap(tool: Tool, child: &mut Child, stderr_task: StderrTask) {
    let _ = child.start_kill();
    let status = child.wait().await.ok();
    log_completion(tool, status, collect(stderr_task).await);
}

fn reap(tool: Tool, mut child: Child, stderr_task: StderrTask) {
    tokio::spawn(async move {
        let status = match child.wait().await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(tool = tool.as_str(), error = %e, "Failed waiting for tool");
                None
            }
        };
        log_completion(tool, status, collect(stderr_task).await);
    });
}

fn log_completion(tool: Tool, status: Option<ExitStatus>, stderr: Vec<u8>) {
    if !stderr.is_empty() {
        debug!(
            tool = tool.as_str(),
            stderr = %String::from_utf8_lossy(&stderr).trim_end(),
            "Tool diagnostics"
        );
    }
    match status {
        Some(status) if !status.success() => {
            warn!(tool = tool.as_str(), status = %status, "Tool exited unsuccessfully");
        }
        _ => {}
    }
}
