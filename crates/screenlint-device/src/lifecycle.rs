//! Device readiness, boot and app installation

use regex::Regex;
use screenlint_core::config::DeviceConfig;
use screenlint_core::{poll_until, PollOutcome, Result, ScreenlintError, Sleeper, TokioSleeper};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::shell::{ShellExecutor, ShellOutput};

const WRITE_SECURE_SETTINGS: &str = "android.permission.WRITE_SECURE_SETTINGS";

/// One virtual-device profile from `avdmanager list avd`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvdInfo {
    pub name: String,
    pub device: String,
    pub path: String,
    pub target: String,
    pub based_on: String,
    pub tag_abi: String,
}

/// State column of `adb devices` for `serial`, if listed
pub fn device_state(devices_output: &str, serial: &str) -> Option<String> {
    devices_output.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(s), Some(state)) if s == serial => Some(state.to_string()),
            _ => None,
        }
    })
}

/// Parse `avdmanager list avd` output
pub fn parse_avd_list(output: &str) -> Result<Vec<AvdInfo>> {
    let pattern = Regex::new(
        r"(?s)Name:\s*(.*?)\r?\n\s*Device:\s*(.*?)\r?\n\s*Path:\s*(.*?)\r?\n\s*Target:\s*(.*?)\r?\n\s*Based on:\s*(.*?)\s*Tag/ABI:\s*([^\r\n]*)",
    )
    .map_err(|e| ScreenlintError::Other(format!("Invalid AVD pattern: {}", e)))?;

    Ok(pattern
        .captures_iter(output)
        .map(|caps| AvdInfo {
            name: caps[1].trim().to_string(),
            device: caps[2].trim().to_string(),
            path: caps[3].trim().to_string(),
            target: caps[4].trim().to_string(),
            based_on: caps[5].trim().replace('"', ""),
            tag_abi: caps[6].trim().to_string(),
        })
        .collect())
}

/// Verifies, boots and prepares one device
pub struct DeviceLifecycleManager<E: ShellExecutor> {
    shell: E,
    config: DeviceConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl<E: ShellExecutor> DeviceLifecycleManager<E> {
    pub fn new(shell: E, config: DeviceConfig) -> Self {
        Self {
            shell,
            config,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace the sleeper used between probes and for the settle delay
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    async fn adb(&self, args: &[&str]) -> Result<ShellOutput> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(self.config.adb.as_str());
        argv.extend_from_slice(args);
        self.shell.run(&argv).await
    }

    /// Whether `adb devices` lists the serial in any state
    pub async fn is_listed(&self, serial: &str) -> bool {
        match self.adb(&["devices"]).await {
            Ok(out) => device_state(&out.output, serial).is_some(),
            Err(e) => {
                debug!("adb devices failed: {}", e);
                false
            }
        }
    }

    /// Three-part readiness probe: online, boot completed, package manager alive
    pub async fn is_ready(&self, serial: &str) -> bool {
        let online = match self.adb(&["devices"]).await {
            Ok(out) => device_state(&out.output, serial).as_deref() == Some("device"),
            Err(e) => {
                debug!("adb devices failed: {}", e);
                false
            }
        };
        if !online {
            return false;
        }

        let booted = match self
            .adb(&["-s", serial, "shell", "getprop", "sys.boot_completed"])
            .await
        {
            Ok(out) => out.output.trim() == "1",
            Err(e) => {
                debug!("getprop failed on {}: {}", serial, e);
                false
            }
        };
        if !booted {
            return false;
        }

        match self
            .adb(&["-s", serial, "shell", "pm", "path", &self.config.probe_package])
            .await
        {
            Ok(out) => out.output.contains("package:"),
            Err(e) => {
                debug!("pm path failed on {}: {}", serial, e);
                false
            }
        }
    }

    /// Poll the readiness probe, then wait the settle delay
    #[instrument(skip(self))]
    pub async fn wait_until_ready(&self, serial: &str) -> Result<()> {
        let policy = self.config.poll_policy();
        info!(
            "Waiting for {} (every {:?}, up to {} attempts)",
            serial, policy.interval, policy.max_attempts
        );

        let outcome = poll_until(policy, self.sleeper.as_ref(), |attempt| async move {
            let ready = self.is_ready(serial).await;
            if !ready && attempt % 5 == 0 {
                info!("Still waiting for boot... (Attempt {})", attempt);
            }
            ready
        })
        .await;

        match outcome {
            PollOutcome::Ready { attempts } => {
                info!(
                    "{} ready after {} attempt(s), settling for {:?}",
                    serial,
                    attempts,
                    self.config.settle_delay()
                );
                self.sleeper.sleep(self.config.settle_delay()).await;
                Ok(())
            }
            PollOutcome::Exhausted { attempts } => Err(ScreenlintError::BootTimeout {
                serial: serial.to_string(),
                attempts,
            }),
        }
    }

    /// Boot the configured virtual device if `serial` is not listed, then wait for it
    #[instrument(skip(self))]
    pub async fn prepare(&self, serial: &str) -> Result<()> {
        if !self.is_listed(serial).await {
            info!("{} not listed, restarting bridge and booting {}", serial, self.config.avd_name);
            self.adb(&["kill-server"]).await?;
            self.adb(&["start-server"]).await?;

            let mut argv = vec![
                self.config.emulator.as_str(),
                "-avd",
                self.config.avd_name.as_str(),
            ];
            argv.extend(self.config.emulator_args.iter().map(String::as_str));
            self.shell.spawn(&argv, None).await?;
        }

        self.wait_until_ready(serial).await
    }

    /// `adb connect` to the configured remote device; `false` when none is configured
    pub async fn connect_remote(&self) -> Result<bool> {
        let Some(target) = self.config.remote.as_deref() else {
            return Ok(false);
        };

        let out = self.adb(&["connect", target]).await?;
        if out.success() && !out.output.contains("failed") {
            info!("Connected to {}", target);
            Ok(true)
        } else {
            Err(ScreenlintError::Other(format!(
                "adb connect {} failed: {}",
                target,
                out.output.trim()
            )))
        }
    }

    /// Install the exploration tool's helper app and grant it secure settings access
    pub async fn install_helper(&self, serial: &str) -> Result<()> {
        let Some(helper) = self.config.helper_apk.as_deref() else {
            return Ok(());
        };
        if !helper.exists() {
            warn!("Helper APK not found at {}", helper.display());
            return Ok(());
        }

        let helper = helper.to_string_lossy();
        let out = self
            .adb(&["-s", serial, "install", "-r", "-g", &helper])
            .await?;
        if !out.output.contains("Success") {
            return Err(ScreenlintError::InstallFailure(format!(
                "helper {}: {}",
                helper,
                out.output.trim()
            )));
        }

        let grant = self
            .adb(&[
                "-s",
                serial,
                "shell",
                "pm",
                "grant",
                &self.config.helper_package,
                WRITE_SECURE_SETTINGS,
            ])
            .await?;
        if !grant.success() {
            warn!("Granting {} failed: {}", WRITE_SECURE_SETTINGS, grant.output.trim());
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn install_app(&self, serial: &str, apk: &Path) -> Result<()> {
        let apk = apk.to_string_lossy();
        let out = self
            .adb(&["-s", serial, "install", "-t", "-r", "-g", &apk])
            .await?;

        if out.output.contains("Success") {
            info!("Installed {} on {}", apk, serial);
            Ok(())
        } else {
            Err(ScreenlintError::InstallFailure(format!(
                "{}: {}",
                apk,
                out.output.trim()
            )))
        }
    }

    #[instrument(skip(self))]
    pub async fn uninstall_app(&self, serial: &str, package: &str) -> Result<()> {
        let out = self.adb(&["-s", serial, "uninstall", package]).await?;
        if out.output.contains("Success") {
            info!("Uninstalled {} from {}", package, serial);
            Ok(())
        } else {
            Err(ScreenlintError::Other(format!(
                "Uninstall of {} failed: {}",
                package,
                out.output.trim()
            )))
        }
    }

    /// Virtual-device profiles known to the SDK
    pub async fn list_avds(&self) -> Result<Vec<AvdInfo>> {
        let out = self
            .shell
            .run(&[self.config.avdmanager.as_str(), "list", "avd"])
            .await?;
        let avds = parse_avd_list(&out.output)?;
        if avds.is_empty() {
            return Err(ScreenlintError::NotFound(format!(
                "No AVDs found in output: {}",
                out.output.trim()
            )));
        }
        Ok(avds)
    }
}
