//! One persistent interpreter per conversation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::engine::{EngineError, EngineLauncher, ExecutionEngine};
use crate::output::{push_fragments, ExecutionOutput, ResultFragment};

/// Default wall-clock limit for one `execute` call.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Python run after every launch: create the work dir and make it the cwd.
fn init_code(work_dir: &Path) -> String {
    let dir = serde_json::Value::String(work_dir.to_string_lossy().into_owned());
    format!(
        "import os\nos.makedirs({dir}, exist_ok=True)\nos.chdir({dir})\n",
        dir = dir
    )
}

/// Owns the interpreter backing one conversation.
///
/// Calls are exclusive: `execute` takes `&mut self`, so a second execution cannot start
/// before the previous one has returned.
pub struct ExecutionSession {
    launcher: Arc<dyn EngineLauncher>,
    engine: Option<Box<dyn ExecutionEngine>>,
    work_dir: PathBuf,
    timeout: Option<Duration>,
}

impl ExecutionSession {
    /// Create a session; the engine is launched on [`start`](Self::start) or first use.
    pub fn new(launcher: Arc<dyn EngineLauncher>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            launcher,
            engine: None,
            work_dir: work_dir.into(),
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }

    /// Set the execution timeout; `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_some()
    }

    /// Launch the engine and run the initialization routine.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        let mut engine = self.launcher.launch().await?;

        let mut init_fragments = Vec::new();
        run_until_idle(engine.as_mut(), &init_code(&self.work_dir), &mut init_fragments).await?;
        if init_fragments.iter().any(ResultFragment::is_error) {
            warn!(work_dir = %self.work_dir.display(), "Interpreter init code reported an error");
        }

        info!(work_dir = %self.work_dir.display(), "Interpreter started");
        self.engine = Some(engine);
        Ok(())
    }

    /// Run one code string and collect its fragments in emission order.
    ///
    /// Code that raises is not an `Err`: the traceback comes back as an error fragment.
    /// When the timeout fires, the engine is restarted and the fragments collected so far
    /// are returned followed by an error fragment describing the timeout.
    pub async fn execute(&mut self, code: &str) -> Result<ExecutionOutput, EngineError> {
        if self.engine.is_none() {
            self.start().await?;
        }

        let mut fragments = Vec::new();
        let outcome = {
            let Some(engine) = self.engine.as_mut() else {
                return Err(EngineError::Exited);
            };
            let run = run_until_idle(engine.as_mut(), code, &mut fragments);
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, run).await.ok(),
                None => Some(run.await),
            }
        };

        match outcome {
            Some(Ok(())) => {
                debug!(fragments = fragments.len(), "Execution complete");
                Ok(ExecutionOutput::new(fragments))
            }
            Some(Err(e)) => {
                warn!(error = %e, "Interpreter failed during execution");
                self.engine = None;
                Err(e)
            }
            None => {
                let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
                warn!(timeout_secs = secs, "Execution timed out, restarting interpreter");
                self.stop_engine().await;
                self.start().await?;
                fragments.push(ResultFragment::Error(format!(
                    "TimeoutError: execution did not finish within {} seconds. \
                     The interpreter was restarted and all variables were lost.",
                    secs
                )));
                Ok(ExecutionOutput::new(fragments))
            }
        }
    }

    /// Tear down the engine and launch a new one, optionally in a new work dir.
    pub async fn restart(&mut self, work_dir: Option<PathBuf>) -> Result<(), EngineError> {
        self.stop_engine().await;
        if let Some(dir) = work_dir {
            self.work_dir = dir;
        }
        info!(work_dir = %self.work_dir.display(), "Restarting interpreter");
        self.start().await
    }

    /// Stop the engine if it is running.
    pub async fn shutdown(&mut self) {
        self.stop_engine().await;
    }

    async fn stop_engine(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            if let Err(e) = engine.shutdown().await {
                warn!(error = %e, "Interpreter shutdown failed");
            }
        }
    }
}

async fn run_until_idle(
    engine: &mut dyn ExecutionEngine,
    code: &str,
    out: &mut Vec<ResultFragment>,
) -> Result<(), EngineError> {
    engine.submit(code).await?;
    loop {
        match engine.next_message().await? {
            Some(message) if message.is_idle() => return Ok(()),
            Some(message) => push_fragments(&message, out),
            None => return Err(EngineError::Exited),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{EngineMessage, MimeBundle};
    use crate::testing::ScriptedLauncher;

    fn session(launcher: &ScriptedLauncher) -> ExecutionSession {
        ExecutionSession::new(Arc::new(launcher.clone()), "/tmp/codepot-test/work_dir")
    }

    #[test]
    fn test_init_code_quotes_path() {
        let code = init_code(Path::new("/tmp/a \"b\"/work_dir"));
        assert!(code.contains(r#"os.chdir("/tmp/a \"b\"/work_dir")"#));
        assert!(code.starts_with("import os\n"));
    }

    #[tokio::test]
    async fn test_start_runs_init_code() {
        let launcher = ScriptedLauncher::new();
        let mut session = session(&launcher);
        session.start().await.unwrap();

        assert!(session.is_running());
        assert_eq!(launcher.launch_count(), 1);
        let submitted = launcher.submissions();
        assert_eq!(submitted.len(), 1);
        assert!(submitted[0].contains("os.chdir"));
    }

    #[tokio::test]
    async fn test_execute_collects_in_order() {
        let launcher = ScriptedLauncher::new().respond(
            "print(1+1)",
            vec![
                EngineMessage::stdout("2\n"),
                EngineMessage::ExecuteResult {
                    data: MimeBundle::text("None"),
                },
            ],
        );
        let mut session = session(&launcher);

        let output = session.execute("print(1+1)").await.unwrap();
        assert_eq!(
            output.fragments,
            vec![
                ResultFragment::Stdout("2\n".into()),
                ResultFragment::RichText("None".into())
            ]
        );
        assert!(!output.failed());
    }

    #[tokio::test]
    async fn test_execute_lazily_starts_engine() {
        let launcher = ScriptedLauncher::new();
        let mut session = session(&launcher);
        assert!(!session.is_running());

        session.execute("x = 1").await.unwrap();
        assert!(session.is_running());
        assert_eq!(launcher.submissions().last().map(String::as_str), Some("x = 1"));
    }

    #[tokio::test]
    async fn test_code_error_is_a_fragment_not_an_err() {
        let launcher = ScriptedLauncher::new().respond(
            "1/0",
            vec![EngineMessage::Error {
                traceback: vec!["ZeroDivisionError: division by zero".into()],
            }],
        );
        let mut session = session(&launcher);

        let output = session.execute("1/0").await.unwrap();
        assert!(output.failed());
    }

    #[tokio::test]
    async fn test_engine_exit_is_an_error_and_relaunches_next_time() {
        let launcher = ScriptedLauncher::new().exit_on("os._exit");
        let mut session = session(&launcher);

        let err = session.execute("os._exit(1)").await.unwrap_err();
        assert!(matches!(err, EngineError::Exited));
        assert!(!session.is_running());

        session.execute("x = 1").await.unwrap();
        assert_eq!(launcher.launch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_restarts_and_reports_partial_output() {
        let launcher = ScriptedLauncher::new().hang_on("while True");
        let mut session = session(&launcher).with_timeout(Some(Duration::from_secs(5)));

        let output = session.execute("while True: pass").await.unwrap();
        assert!(output.failed());
        assert!(output.model_text().contains("TimeoutError"));
        assert_eq!(launcher.launch_count(), 2);
        assert!(session.is_running());
    }

    #[tokio::test]
    async fn test_restart_moves_work_dir() {
        let launcher = ScriptedLauncher::new();
        let mut session = session(&launcher);
        session.start().await.unwrap();

        session
            .restart(Some(PathBuf::from("/tmp/codepot-test/other")))
            .await
            .unwrap();

        assert_eq!(session.work_dir(), Path::new("/tmp/codepot-test/other"));
        assert_eq!(launcher.launch_count(), 2);
        let last = launcher.submissions().pop().unwrap();
        assert!(last.contains("/tmp/codepot-test/other"));
    }
}
