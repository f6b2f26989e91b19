//! Configuration management for screenlint
//!
//! Settings for storage, device handling, the exploration tool, analysis and OCR.
//! Every field has a serde default so a partial `screenlint.toml` is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::poll::PollPolicy;
use crate::Result;

/// Default config file name
pub const CONFIG_FILE: &str = "screenlint.toml";

/// Top-level screenlint configuration
///
/// Loaded from `screenlint.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreenlintConfig {
    /// Output storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Device bridge and emulator settings
    #[serde(default)]
    pub device: DeviceConfig,

    /// External exploration tool
    #[serde(default)]
    pub exploration: ExplorationConfig,

    /// Rule checking
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Text recognition
    #[serde(default)]
    pub ocr: OcrConfig,
}

/// Output storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `<base>` of the `<base>/<user>/<package>/<run>/files` convention
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

/// Device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_serial")]
    pub serial: String,

    /// Virtual-device profile booted when the serial is not listed
    #[serde(default = "default_avd_name")]
    pub avd_name: String,

    #[serde(default = "default_adb")]
    pub adb: String,

    #[serde(default = "default_emulator")]
    pub emulator: String,

    #[serde(default = "default_avdmanager")]
    pub avdmanager: String,

    #[serde(default = "default_emulator_args")]
    pub emulator_args: Vec<String>,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: usize,

    /// Wait after the probe succeeds, before the device takes input reliably
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,

    /// System package queried through the package manager
    #[serde(default = "default_probe_package")]
    pub probe_package: String,

    /// `host:port` of a remote device for `adb connect`
    #[serde(default)]
    pub remote: Option<String>,

    /// Helper APK of the exploration tool
    #[serde(default)]
    pub helper_apk: Option<PathBuf>,

    #[serde(default = "default_helper_package")]
    pub helper_package: String,
}

/// Exploration tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationConfig {
    /// Program and leading arguments
    #[serde(default = "default_exploration_command")]
    pub command: Vec<String>,

    /// Timeout passed to the tool
    #[serde(default = "default_exploration_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_true")]
    pub is_emulator: bool,

    #[serde(default = "default_true")]
    pub keep_app: bool,

    /// Extra wall time on top of the tool's own timeout before the process is killed
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
}

/// Analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Reference language of the app; grammar checks skip it
    #[serde(default = "default_base_language")]
    pub base_language: String,

    /// Directory of `<locale>.txt` word lists
    #[serde(default)]
    pub dictionaries_dir: Option<PathBuf>,

    #[serde(default = "default_min_text_height_mm")]
    pub min_text_height_mm: f64,

    /// Run state checkers in parallel
    #[serde(default = "default_true")]
    pub parallel: bool,
}

/// OCR configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_tesseract")]
    pub tesseract: String,

    #[serde(default = "default_ocr_language")]
    pub language: String,

    #[serde(default)]
    pub tessdata_dir: Option<PathBuf>,
}

// Default value providers
fn default_base_dir() -> PathBuf {
    PathBuf::from("storage")
}

fn default_serial() -> String {
    "emulator-5554".to_string()
}

fn default_avd_name() -> String {
    "TestDevice".to_string()
}

fn default_adb() -> String {
    "adb".to_string()
}

fn default_emulator() -> String {
    "emulator".to_string()
}

fn default_avdmanager() -> String {
    "avdmanager".to_string()
}

fn default_emulator_args() -> Vec<String> {
    ["-no-snapshot-load", "-no-boot-anim", "-netdelay", "none", "-netspeed", "full"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_max_poll_attempts() -> usize {
    40
}

fn default_settle_delay_secs() -> u64 {
    45
}

fn default_probe_package() -> String {
    "android".to_string()
}

fn default_helper_package() -> String {
    "io.github.ylimit.droidbotapp".to_string()
}

fn default_exploration_command() -> Vec<String> {
    vec!["droidbot".to_string()]
}

fn default_exploration_timeout_secs() -> u64 {
    120
}

fn default_grace_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_base_language() -> String {
    "lt".to_string()
}

fn default_min_text_height_mm() -> f64 {
    2.0
}

fn default_tesseract() -> String {
    "tesseract".to_string()
}

fn default_ocr_language() -> String {
    "eng".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial: default_serial(),
            avd_name: default_avd_name(),
            adb: default_adb(),
            emulator: default_emulator(),
            avdmanager: default_avdmanager(),
            emulator_args: default_emulator_args(),
            poll_interval_secs: default_poll_interval_secs(),
            max_poll_attempts: default_max_poll_attempts(),
            settle_delay_secs: default_settle_delay_secs(),
            probe_package: default_probe_package(),
            remote: None,
            helper_apk: None,
            helper_package: default_helper_package(),
        }
    }
}

impl DeviceConfig {
    /// Poll policy for the boot-readiness wait
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.poll_interval_secs),
            self.max_poll_attempts,
        )
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            command: default_exploration_command(),
            timeout_secs: default_exploration_timeout_secs(),
            is_emulator: true,
            keep_app: true,
            grace_secs: default_grace_secs(),
        }
    }
}

impl ExplorationConfig {
    /// Wall time after which the tool process is killed
    pub fn wall_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs + self.grace_secs)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            base_language: default_base_language(),
            dictionaries_dir: None,
            min_text_height_mm: default_min_text_height_mm(),
            parallel: true,
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tesseract: default_tesseract(),
            language: default_ocr_language(),
            tessdata_dir: None,
        }
    }
}

impl ScreenlintConfig {
    /// Load configuration from `path` or use defaults when the file is absent
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content).map_err(|e| {
                crate::ScreenlintError::Config(format!("Failed to parse config file: {}", e))
            })?)
        } else {
            Ok(Self::default())
        }
    }

    /// Write default configuration to `path`, creating parent directories
    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = Self::default().to_toml()?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            crate::ScreenlintError::Config(format!("Failed to serialize config: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ScreenlintConfig::default();
        assert_eq!(config.device.serial, "emulator-5554");
        assert_eq!(config.device.avd_name, "TestDevice");
        assert_eq!(config.device.max_poll_attempts, 40);
        assert_eq!(config.device.poll_interval_secs, 5);
        assert_eq!(config.device.settle_delay_secs, 45);
        assert_eq!(config.exploration.timeout_secs, 120);
        assert_eq!(config.analysis.base_language, "lt");
        assert_eq!(config.analysis.min_text_height_mm, 2.0);
        assert!(!config.ocr.enabled);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml_str = r#"
            [device]
            serial = "R58M123"
            settle_delay_secs = 30

            [ocr]
            enabled = true
        "#;

        let config: ScreenlintConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.device.serial, "R58M123");
        assert_eq!(config.device.settle_delay_secs, 30);
        assert_eq!(config.device.adb, "adb");
        assert!(config.ocr.enabled);
        assert_eq!(config.ocr.language, "eng");
        assert_eq!(config.exploration.command, vec!["droidbot".to_string()]);
    }

    #[test]
    fn test_load_missing_file_gives_default() {
        let temp_dir = TempDir::new().unwrap();
        let config =
            ScreenlintConfig::load_or_default(&temp_dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.device.serial, "emulator-5554");
    }

    #[test]
    fn test_write_and_load_default() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("conf").join(CONFIG_FILE);

        ScreenlintConfig::write_default(&path).unwrap();
        assert!(path.exists());

        let config = ScreenlintConfig::load_or_default(&path).unwrap();
        assert_eq!(config.device.emulator_args.len(), 6);
        assert_eq!(config.device.helper_package, "io.github.ylimit.droidbotapp");
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "device = 12").unwrap();

        let err = ScreenlintConfig::load_or_default(&path).unwrap_err();
        assert!(matches!(err, crate::ScreenlintError::Config(_)));
    }

    #[test]
    fn test_wall_timeout_includes_grace() {
        let config = ExplorationConfig::default();
        assert_eq!(config.wall_timeout(), Duration::from_secs(180));
    }
}
