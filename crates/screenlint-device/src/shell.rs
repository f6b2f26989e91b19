//! Process execution abstraction

use async_trait::async_trait;
use screenlint_core::{Result, ScreenlintError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::process::{Output, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Output of a finished (or killed) process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOutput {
    /// stdout followed by stderr
    pub output: String,
    /// `None` when the process was killed
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ShellOutput {
    /// Successful output with the given text
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            exit_code: Some(0),
            timed_out: false,
        }
    }

    pub fn failed(output: impl Into<String>, exit_code: i32) -> Self {
        Self {
            output: output.into(),
            exit_code: Some(exit_code),
            timed_out: false,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

impl From<Output> for ShellOutput {
    fn from(output: Output) -> Self {
        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Self {
            output: text,
            exit_code: output.status.code(),
            timed_out: false,
        }
    }
}

/// Runs OS processes (allows mocking in tests)
#[async_trait]
pub trait ShellExecutor: Send + Sync {
    /// Run to completion and capture combined output
    async fn run(&self, argv: &[&str]) -> Result<ShellOutput>;

    /// Run, killing the process once `timeout` elapses
    async fn run_with_timeout(&self, argv: &[&str], timeout: Duration) -> Result<ShellOutput>;

    /// Start in the background; `cleanup` runs after the process exits
    async fn spawn(&self, argv: &[&str], cleanup: Option<&[&str]>) -> Result<()>;
}

/// How long pipe readers may drain after the process ends
const READ_GRACE: Duration = Duration::from_millis(500);

/// Copy everything `reader` yields into `buf` until EOF
fn capture<R>(reader: Option<R>, buf: Arc<AsyncMutex<Vec<u8>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut reader) = reader else {
            return;
        };
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.lock().await.extend_from_slice(&chunk[..n]),
            }
        }
    })
}

fn split_argv<'a>(argv: &'a [&'a str]) -> Result<(&'a str, &'a [&'a str])> {
    argv.split_first()
        .map(|(program, args)| (*program, args))
        .ok_or_else(|| ScreenlintError::LaunchFailure("empty command".to_string()))
}

/// Real executor backed by `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct ProcessShell;

impl ProcessShell {
    pub fn new() -> Self {
        Self
    }

    fn command(argv: &[&str]) -> Result<Command> {
        let (program, args) = split_argv(argv)?;
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(command)
    }
}

#[async_trait]
impl ShellExecutor for ProcessShell {
    #[instrument(skip(self))]
    async fn run(&self, argv: &[&str]) -> Result<ShellOutput> {
        debug!("Executing {:?}", argv);

        let output = Self::command(argv)?
            .output()
            .await
            .map_err(|e| ScreenlintError::LaunchFailure(format!("{}: {}", argv.join(" "), e)))?;

        let output = ShellOutput::from(output);
        if !output.success() {
            debug!("Command exited with {:?}: {}", output.exit_code, output.output.trim());
        }
        Ok(output)
    }

    #[instrument(skip(self))]
    async fn run_with_timeout(&self, argv: &[&str], timeout: Duration) -> Result<ShellOutput> {
        debug!("Executing {:?} (timeout {:?})", argv, timeout);

        let mut child = Self::command(argv)?
            .spawn()
            .map_err(|e| ScreenlintError::LaunchFailure(format!("{}: {}", argv.join(" "), e)))?;

        let stdout = Arc::new(AsyncMutex::new(Vec::new()));
        let stderr = Arc::new(AsyncMutex::new(Vec::new()));
        let readers = [
            capture(child.stdout.take(), Arc::clone(&stdout)),
            capture(child.stderr.take(), Arc::clone(&stderr)),
        ];

        let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => (status?.code(), false),
            Err(_) => {
                warn!("{} killed after {:?}", argv.join(" "), timeout);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {}: {}", argv.join(" "), e);
                }
                (None, true)
            }
        };

        // Grandchildren may keep the pipes open after a kill
        for mut reader in readers {
            if tokio::time::timeout(READ_GRACE, &mut reader).await.is_err() {
                reader.abort();
            }
        }

        let mut output = String::from_utf8_lossy(&stdout.lock().await).to_string();
        output.push_str(&String::from_utf8_lossy(&stderr.lock().await));
        Ok(ShellOutput {
            output,
            exit_code,
            timed_out,
        })
    }

    #[instrument(skip(self))]
    async fn spawn(&self, argv: &[&str], cleanup: Option<&[&str]>) -> Result<()> {
        let mut command = Self::command(argv)?;
        command.kill_on_drop(false).stderr(Stdio::null());
        let mut child = command
            .spawn()
            .map_err(|e| ScreenlintError::LaunchFailure(format!("{}: {}", argv.join(" "), e)))?;

        let name = argv.join(" ");
        let cleanup: Option<Vec<String>> =
            cleanup.map(|c| c.iter().map(|s| s.to_string()).collect());
        let stdout = child.stdout.take();

        tokio::spawn(async move {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[{}] {}", name, line);
                }
            }
            match child.wait().await {
                Ok(status) => info!("{} exited with {}", name, status),
                Err(e) => warn!("{} wait failed: {}", name, e),
            }

            if let Some(cleanup) = cleanup {
                let argv: Vec<&str> = cleanup.iter().map(String::as_str).collect();
                if let Err(e) = ProcessShell.run(&argv).await {
                    warn!("Cleanup {:?} failed: {}", argv, e);
                }
            }
        });

        Ok(())
    }
}

#[derive(Debug, Default)]
struct MockState {
    responses: HashMap<String, VecDeque<ShellOutput>>,
    launch_failures: HashSet<String>,
    calls: Vec<String>,
    timeouts: Vec<(String, Duration)>,
}

/// Scripted executor for testing
///
/// Responses are keyed by `argv.join(" ")`. A scripted sequence is consumed front to
/// back and its last entry repeats. Clones share the call log.
#[derive(Debug, Clone, Default)]
pub struct MockShell {
    state: Arc<Mutex<MockState>>,
}

impl MockShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, command: &str, output: ShellOutput) -> Self {
        self.with_sequence(command, vec![output])
    }

    pub fn with_sequence(self, command: &str, outputs: Vec<ShellOutput>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state
                .responses
                .insert(command.to_string(), outputs.into_iter().collect());
        }
        self
    }

    /// Make `command` fail to start
    pub fn with_launch_failure(self, command: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.launch_failures.insert(command.to_string());
        }
        self
    }

    /// Every command issued, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    /// Number of times `command` was issued
    pub fn call_count(&self, command: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == command).count()
    }

    /// Timeouts passed to `run_with_timeout`
    pub fn timeouts(&self) -> Vec<(String, Duration)> {
        self.state.lock().map(|s| s.timeouts.clone()).unwrap_or_default()
    }

    fn respond(&self, argv: &[&str]) -> Result<ShellOutput> {
        let key = argv.join(" ");
        let mut state = self
            .state
            .lock()
            .map_err(|_| ScreenlintError::Other("mock shell poisoned".to_string()))?;
        state.calls.push(key.clone());

        if state.launch_failures.contains(&key) {
            return Err(ScreenlintError::LaunchFailure(format!("mock launch failure: {}", key)));
        }

        let queue = state
            .responses
            .get_mut(&key)
            .ok_or_else(|| ScreenlintError::LaunchFailure(format!("No mock response for: {}", key)))?;
        let output = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        output.ok_or_else(|| ScreenlintError::LaunchFailure(format!("No mock response for: {}", key)))
    }
}

#[async_trait]
impl ShellExecutor for MockShell {
    async fn run(&self, argv: &[&str]) -> Result<ShellOutput> {
        self.respond(argv)
    }

    async fn run_with_timeout(&self, argv: &[&str], timeout: Duration) -> Result<ShellOutput> {
        if let Ok(mut state) = self.state.lock() {
            state.timeouts.push((argv.join(" "), timeout));
        }
        self.respond(argv)
    }

    async fn spawn(&self, argv: &[&str], cleanup: Option<&[&str]>) -> Result<()> {
        self.respond(argv)?;
        if let Some(cleanup) = cleanup {
            self.respond(cleanup)?;
        }
        Ok(())
    }
}
