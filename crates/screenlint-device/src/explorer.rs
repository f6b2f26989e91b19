//! External exploration tool invocation

use screenlint_core::config::ExplorationConfig;
use screenlint_core::Result;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

use crate::shell::ShellExecutor;

/// Lines of tool output kept in a report
pub const OUTPUT_TAIL_LINES: usize = 40;

/// How the exploration tool exited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorationReport {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// Last [`OUTPUT_TAIL_LINES`] lines of the tool's output
    pub output: String,
}

/// The last `n` lines of `text`
fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

impl ExplorationReport {
    pub fn completed(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// Runs the exploration tool against a booted device
pub struct ExplorationRunner<E: ShellExecutor> {
    shell: E,
    config: ExplorationConfig,
}

impl<E: ShellExecutor> ExplorationRunner<E> {
    pub fn new(shell: E, config: ExplorationConfig) -> Self {
        Self { shell, config }
    }

    /// Full argument vector for one run
    pub fn invocation(&self, serial: &str, apk: &Path, out_dir: &Path) -> Vec<String> {
        let mut argv = self.config.command.clone();
        argv.extend([
            "-d".to_string(),
            serial.to_string(),
            "-a".to_string(),
            apk.to_string_lossy().to_string(),
            "-o".to_string(),
            out_dir.to_string_lossy().to_string(),
        ]);
        if self.config.is_emulator {
            argv.push("-is_emulator".to_string());
        }
        argv.push("-timeout".to_string());
        argv.push(self.config.timeout_secs.to_string());
        if self.config.keep_app {
            argv.push("-keep_app".to_string());
        }
        argv
    }

    /// Run the tool and block until it exits or the wall timeout kills it
    ///
    /// A non-zero exit is not an error; ingestion just finds fewer captures.
    #[instrument(skip(self))]
    pub async fn run(&self, serial: &str, apk: &Path, out_dir: &Path) -> Result<ExplorationReport> {
        tokio::fs::create_dir_all(out_dir).await?;

        let argv = self.invocation(serial, apk, out_dir);
        let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
        info!("Starting exploration: {}", argv.join(" "));

        let out = self
            .shell
            .run_with_timeout(&argv, self.config.wall_timeout())
            .await?;

        debug!("Exploration produced {} bytes of output", out.output.len());
        let report = ExplorationReport {
            exit_code: out.exit_code,
            timed_out: out.timed_out,
            output: tail_lines(&out.output, OUTPUT_TAIL_LINES),
        };

        if report.timed_out {
            warn!("Exploration killed after {:?}", self.config.wall_timeout());
        } else if !report.completed() {
            warn!("Exploration exited with {:?}", report.exit_code);
        } else {
            info!("Exploration finished");
        }
        Ok(report)
    }
}
