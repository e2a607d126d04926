//! Interpreter bridge running as a child process.
//!
//! The bridge reads `{"code": "..."}` requests, one per line, on stdin and writes
//! [`EngineMessage`]s as JSON lines on stdout. By default the bundled Python bridge is
//! run with the first `python3`/`python` found on `PATH`.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, trace};

use super::engine::{EngineError, EngineLauncher, EngineMessage, ExecutionEngine};

/// Python source of the bundled bridge.
pub const BRIDGE_SCRIPT: &str = include_str!("../../assets/kernel_bridge.py");

/// Interpreters tried, in order, when no command is configured.
const PYTHON_CANDIDATES: &[&str] = &["python3", "python"];

/// Launches interpreter bridge processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
    command: Option<String>,
    args: Vec<String>,
}

impl ProcessLauncher {
    /// Use the bundled bridge with the interpreter found on `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a custom bridge command instead of the bundled one.
    pub fn with_command(mut self, command: impl Into<String>, args: Vec<String>) -> Self {
        self.command = Some(command.into());
        self.args = args;
        self
    }

    fn resolve(&self) -> Result<(String, Vec<String>), EngineError> {
        if let Some(command) = &self.command {
            return Ok((command.clone(), self.args.clone()));
        }

        let python = PYTHON_CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
            .ok_or_else(|| EngineError::Launch("no python interpreter found on PATH".into()))?;

        Ok((
            python.to_string_lossy().into_owned(),
            vec!["-u".into(), "-c".into(), BRIDGE_SCRIPT.into()],
        ))
    }
}

#[async_trait]
impl EngineLauncher for ProcessLauncher {
    async fn launch(&self) -> Result<Box<dyn ExecutionEngine>, EngineError> {
        let (program, args) = self.resolve()?;
        debug!(program = %program, "Launching interpreter bridge");

        let mut child = Command::new(&program)
            .args(&args)
            .env("MPLBACKEND", "Agg")
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Launch(format!("{}: {}", program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Launch("bridge stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Launch("bridge stdout unavailable".into()))?;

        Ok(Box::new(ProcessEngine {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
        }))
    }
}

/// A running bridge process.
pub struct ProcessEngine {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

#[async_trait]
impl ExecutionEngine for ProcessEngine {
    async fn submit(&mut self, code: &str) -> Result<(), EngineError> {
        let mut line = json!({ "code": code }).to_string();
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<EngineMessage>, EngineError> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            trace!(line = %line, "Bridge message");
            return parse_line(&line).map(Some);
        }
    }

    async fn shutdown(&mut self) -> Result<(), EngineError> {
        self.child.kill().await?;
        Ok(())
    }
}

fn parse_line(line: &str) -> Result<EngineMessage, EngineError> {
    serde_json::from_str(line).map_err(|e| EngineError::Protocol(format!("{}: {}", e, line)))
}
