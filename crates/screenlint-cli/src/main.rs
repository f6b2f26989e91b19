//! screenlint CLI - mobile app UI-quality testing
//!
//! Usage:
//!   screenlint run --apk <apk> --package <pkg>   Explore an app on the device and analyze it
//!   screenlint analyze <states_dir> --package <pkg>   Re-analyze existing captures
//!   screenlint device status|prepare            Probe or boot the configured device
//!   screenlint avds                             List virtual-device profiles
//!   screenlint config init|show                 Write or print the configuration

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use screenlint_analysis::{
    AnalysisPipeline, AnalysisSummary, AppContext, CheckerEngine, Messages, RunContext,
};
use screenlint_core::config::CONFIG_FILE;
use screenlint_core::{Application, ScreenlintConfig, TestDevice, TestRun};
use screenlint_device::{DeviceLifecycleManager, ProcessShell};
use screenlint_orchestrator::{JobDispatcher, JobOrchestrator, JobOutcome, JobPhase};
use screenlint_store::InMemoryStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "screenlint")]
#[command(author, version, about = "Automated UI-quality testing for Android apps")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file
    #[arg(short, long, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Explore an app on the configured device and analyze the captures
    Run {
        /// Application package to test
        #[arg(long)]
        apk: PathBuf,

        /// Package name of the application
        #[arg(long)]
        package: String,

        /// Display name (defaults to the package name)
        #[arg(long)]
        name: Option<String>,

        /// Owner of the test run
        #[arg(long, default_value = "local")]
        user: String,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },

    /// Analyze an existing states directory without a device
    Analyze {
        /// Directory holding screen_<token>.png / state_<token>.json pairs
        states_dir: PathBuf,

        /// Package name of the application
        #[arg(long)]
        package: String,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },

    /// Device operations
    Device {
        #[command(subcommand)]
        action: DeviceCommands,

        /// Device serial (defaults to the configured one)
        #[arg(long, global = true)]
        serial: Option<String>,
    },

    /// List virtual-device profiles
    Avds,

    /// Configuration file management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Args)]
struct AnalysisArgs {
    /// Translation catalog (JSON)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Screen resolution of the test device, e.g. 1080x1920
    #[arg(long)]
    resolution: Option<String>,

    /// Diagonal screen size of the test device in inches
    #[arg(long)]
    inches: Option<f64>,

    /// Write the results as JSON (proof images next to it)
    #[arg(long)]
    report: Option<PathBuf>,
}

impl AnalysisArgs {
    fn test_device(&self) -> Result<Option<TestDevice>> {
        match (&self.resolution, self.inches) {
            (Some(resolution), Some(inches)) => {
                let (width, height) = TestDevice::parse_resolution(resolution)
                    .with_context(|| format!("Invalid resolution: {}", resolution))?;
                Ok(Some(TestDevice::new(resolution.as_str(), width, height, inches)))
            }
            (None, None) => Ok(None),
            _ => bail!("--resolution and --inches must be given together"),
        }
    }
}

#[derive(Subcommand)]
enum DeviceCommands {
    /// Show whether the device is listed and ready
    Status,
    /// Boot the device if needed and wait until it is ready
    Prepare,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a default configuration file
    Init,
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Commands::Config { action } = &cli.command {
        return cmd_config(&cli.config, action);
    }

    let config = ScreenlintConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    match cli.command {
        Commands::Run {
            apk,
            package,
            name,
            user,
            analysis,
        } => cmd_run(config, apk, package, name, user, analysis).await,
        Commands::Analyze {
            states_dir,
            package,
            analysis,
        } => cmd_analyze(config, states_dir, package, analysis).await,
        Commands::Device { action, serial } => cmd_device(config, action, serial).await,
        Commands::Avds => cmd_avds(config).await,
        Commands::Config { .. } => Ok(()),
    }
}

fn build_engine(config: &ScreenlintConfig) -> Result<Arc<CheckerEngine>> {
    let engine = CheckerEngine::from_config(&config.analysis, &config.ocr)
        .context("Failed to set up checkers")?;
    Ok(Arc::new(engine))
}

async fn write_report(store: &InMemoryStore, report: Option<&Path>) -> Result<()> {
    if let Some(path) = report {
        store
            .write_report(path)
            .await
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}

fn print_summary(summary: &AnalysisSummary) {
    println!("Screenshots analyzed: {}", summary.screenshots);
    println!("Screenshots skipped:  {}", summary.skipped);
    println!("Invalid states:       {}", summary.invalid_states);
    println!("Failed states:        {}", summary.failed_states);
    println!("Screen defects:       {}", summary.defects);
    println!("App defects:          {}", summary.app_defects);
    for (checker, count) in &summary.report.failures {
        println!("Checker {} failed {} time(s)", checker, count);
    }
}

async fn cmd_run(
    config: ScreenlintConfig,
    apk: PathBuf,
    package: String,
    name: Option<String>,
    user: String,
    analysis: AnalysisArgs,
) -> Result<()> {
    let store = InMemoryStore::new();
    let engine = build_engine(&config)?;
    let orchestrator = Arc::new(JobOrchestrator::new(
        ProcessShell::new(),
        &config,
        Arc::new(store.clone()),
        engine,
    ));

    let mut application = Application::new(name.unwrap_or_else(|| package.clone()), &package, apk);
    if let Some(catalog) = &analysis.catalog {
        application = application.with_catalog(catalog);
    }
    let test_run = TestRun::new(user, analysis.test_device()?);
    let job = orchestrator.enqueue(application, test_run).await?;

    let (dispatcher, mut outcomes) = JobDispatcher::start(Arc::clone(&orchestrator));
    let job_id = dispatcher.submit(job.id)?;
    info!("Submitted job {}", job_id);
    dispatcher.shutdown().await?;

    let Some(outcome) = outcomes.recv().await else {
        bail!("Job {} did not run", job_id);
    };
    print_outcome(&outcome);
    write_report(&store, analysis.report.as_deref()).await?;

    if !outcome.completed() {
        bail!("Job {} ended as {}", job_id, outcome.phase.status_name());
    }
    Ok(())
}

fn print_outcome(outcome: &JobOutcome) {
    println!("Job {}: {}", outcome.job_id, outcome.phase.status_name());
    if let JobPhase::Failed { reason } = &outcome.phase {
        println!("  {}", reason);
    }
    if let Some(report) = &outcome.exploration {
        if !report.completed() {
            println!("Exploration did not finish cleanly (exit code {:?})", report.exit_code);
        }
    }
    if let Some(summary) = &outcome.analysis {
        print_summary(summary);
    }
    if !outcome.cleaned_up {
        warn!("App under test may still be installed");
    }
}

async fn cmd_analyze(
    config: ScreenlintConfig,
    states_dir: PathBuf,
    package: String,
    analysis: AnalysisArgs,
) -> Result<()> {
    if !states_dir.is_dir() {
        bail!("{} is not a directory", states_dir.display());
    }

    let messages = match &analysis.catalog {
        Some(path) => Messages::load(path)
            .with_context(|| format!("Failed to load catalog {}", path.display()))?,
        None => Messages::default(),
    };
    let test_device = analysis.test_device()?;
    let mut app = AppContext::new(&package, messages)
        .with_base_language(&config.analysis.base_language);
    if let Some(device) = &test_device {
        app = app.with_device(device.clone());
    }

    let store = InMemoryStore::new();
    let pipeline = AnalysisPipeline::new(build_engine(&config)?, Arc::new(store.clone()));
    let run = RunContext {
        test_run_id: Uuid::new_v4(),
        application_id: Uuid::new_v4(),
        test_device,
        app: Arc::new(app),
    };

    let summary = pipeline.analyze_run(&run, &states_dir).await?;
    print_summary(&summary);
    write_report(&store, analysis.report.as_deref()).await
}

async fn cmd_device(
    config: ScreenlintConfig,
    action: DeviceCommands,
    serial: Option<String>,
) -> Result<()> {
    let serial = serial.unwrap_or_else(|| config.device.serial.clone());
    let device = DeviceLifecycleManager::new(ProcessShell::new(), config.device);

    match action {
        DeviceCommands::Status => {
            let listed = device.is_listed(&serial).await;
            let ready = listed && device.is_ready(&serial).await;
            println!("Device {}", serial);
            println!("  listed: {}", listed);
            println!("  ready:  {}", ready);
        }
        DeviceCommands::Prepare => {
            device.connect_remote().await?;
            device
                .prepare(&serial)
                .await
                .with_context(|| format!("Device {} not ready", serial))?;
            println!("Device {} is ready", serial);
        }
    }
    Ok(())
}

async fn cmd_avds(config: ScreenlintConfig) -> Result<()> {
    let device = DeviceLifecycleManager::new(ProcessShell::new(), config.device);
    let avds = device.list_avds().await?;
    println!("{}", serde_json::to_string_pretty(&avds)?);
    Ok(())
}

fn cmd_config(path: &Path, action: &ConfigCommands) -> Result<()> {
    match action {
        ConfigCommands::Init => {
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            ScreenlintConfig::write_default(path)?;
            println!("Wrote {}", path.display());
        }
        ConfigCommands::Show => {
            let config = ScreenlintConfig::load_or_default(path)?;
            print!("{}", config.to_toml()?);
        }
    }
    Ok(())
}
