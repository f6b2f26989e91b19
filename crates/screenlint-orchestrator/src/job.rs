//! Job execution: drives the state machine against a device

use screenlint_analysis::{
    AnalysisPipeline, AnalysisSummary, AppContext, CheckerEngine, Messages, RunContext,
};
use screenlint_core::fail_open::{fail_open, fail_open_with_retries};
use screenlint_core::{
    Application, Job, Result, ScreenlintConfig, ScreenlintError, Sleeper, StorageLayout,
    TestRun, TokioSleeper,
};
use screenlint_device::{
    DeviceLifecycleManager, ExplorationReport, ExplorationRunner, ShellExecutor,
};
use screenlint_store::Repository;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::state_machine::{transition, JobAction, JobEvent, JobPhase};

const CONNECT_RETRIES: usize = 3;
const CONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// What happened to one job
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job_id: Uuid,
    pub phase: JobPhase,
    pub exploration: Option<ExplorationReport>,
    pub analysis: Option<AnalysisSummary>,
    /// Whether uninstalling the app under test succeeded
    pub cleaned_up: bool,
}

impl JobOutcome {
    fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            phase: JobPhase::Queued,
            exploration: None,
            analysis: None,
            cleaned_up: false,
        }
    }

    pub fn completed(&self) -> bool {
        self.phase == JobPhase::Completed
    }
}

/// Runs jobs end to end on one device
pub struct JobOrchestrator<E: ShellExecutor> {
    repo: Arc<dyn Repository>,
    device: DeviceLifecycleManager<E>,
    explorer: ExplorationRunner<E>,
    analysis: AnalysisPipeline,
    layout: StorageLayout,
    base_language: String,
    sleeper: Arc<dyn Sleeper>,
    remote: OnceCell<bool>,
}

impl<E: ShellExecutor + Clone> JobOrchestrator<E> {
    pub fn new(
        shell: E,
        config: &ScreenlintConfig,
        repo: Arc<dyn Repository>,
        engine: Arc<CheckerEngine>,
    ) -> Self {
        Self {
            device: DeviceLifecycleManager::new(shell.clone(), config.device.clone()),
            explorer: ExplorationRunner::new(shell, config.exploration.clone()),
            analysis: AnalysisPipeline::new(engine, Arc::clone(&repo)),
            repo,
            layout: StorageLayout::new(&config.storage.base_dir),
            base_language: config.analysis.base_language.clone(),
            sleeper: Arc::new(TokioSleeper),
            remote: OnceCell::new(),
        }
    }
}

impl<E: ShellExecutor> JobOrchestrator<E> {
    /// Replace the sleeper used for boot polling and connection retries
    pub fn with_sleeper(self, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            device: self.device.with_sleeper(Arc::clone(&sleeper)),
            sleeper,
            ..self
        }
    }

    pub fn serial(&self) -> &str {
        &self.device.config().serial
    }

    /// Store a new job in the `Queued` state
    pub async fn enqueue(&self, application: Application, test_run: TestRun) -> Result<Job> {
        let status = self
            .repo
            .find_or_create_status(JobPhase::Queued.status_name())
            .await?;
        let job = Job::new(application, test_run, status);
        self.repo.save_job(&job).await?;
        info!("Queued job {} for {}", job.id, job.application.package_name);
        Ok(job)
    }

    /// Run a stored job to a terminal phase
    ///
    /// Only a missing job is an error. Phase failures end in `Failed`; cleanup runs
    /// after both terminal phases and its failure is only logged.
    #[instrument(skip(self), fields(serial = %self.serial()))]
    pub async fn execute(&self, job_id: Uuid) -> Result<JobOutcome> {
        let mut job = self
            .repo
            .find_job(job_id)
            .await?
            .ok_or_else(|| ScreenlintError::NotFound(format!("Job {}", job_id)))?;

        let mut outcome = JobOutcome::new(job_id);
        let mut event = JobEvent::Start;

        loop {
            let (phase, actions) = transition(outcome.phase.clone(), event);
            outcome.phase = phase;

            let mut next = None;
            for action in actions {
                match self.perform(&action, &mut job, &mut outcome).await {
                    Ok(produced) => next = produced.or(next),
                    Err(e) if outcome.phase.is_terminal() => {
                        warn!("{:?} failed after job ended: {}", action, e);
                    }
                    Err(e) => {
                        error!("{} failed: {}", outcome.phase.status_name(), e);
                        next = Some(JobEvent::Error {
                            message: e.to_string(),
                        });
                        break;
                    }
                }
            }

            if outcome.phase.is_terminal() {
                break;
            }
            event = next.unwrap_or_else(|| JobEvent::Error {
                message: format!("no outcome from {}", outcome.phase.status_name()),
            });
        }

        info!("Job {} finished: {}", job_id, outcome.phase.status_name());
        Ok(outcome)
    }

    async fn perform(
        &self,
        action: &JobAction,
        job: &mut Job,
        outcome: &mut JobOutcome,
    ) -> Result<Option<JobEvent>> {
        let serial = self.serial();
        match action {
            JobAction::PersistStatus { name } => {
                let status = self.repo.find_or_create_status(name).await?;
                job.set_status(status);
                self.repo.save_job(job).await?;
                Ok(None)
            }
            JobAction::BootDevice => {
                self.connect_remote_once().await;
                self.device.prepare(serial).await?;
                Ok(Some(JobEvent::DeviceReady))
            }
            JobAction::InstallApps => {
                let apk = &job.application.apk_path;
                if !apk.exists() {
                    return Err(ScreenlintError::NotFound(format!("APK {}", apk.display())));
                }
                self.device.install_helper(serial).await?;
                self.device.install_app(serial, apk).await?;
                Ok(Some(JobEvent::AppsInstalled))
            }
            JobAction::RunExploration => {
                let out_dir = self.layout.run_output_dir(
                    &job.test_run.user_id,
                    &job.application.package_name,
                    job.test_run.id,
                );
                let report = self
                    .explorer
                    .run(serial, &job.application.apk_path, &out_dir)
                    .await?;
                outcome.exploration = Some(report);
                Ok(Some(JobEvent::ExplorationFinished))
            }
            JobAction::AnalyzeResults => {
                let summary = self.analyze(job).await?;
                let defects = summary.defects + summary.app_defects;
                outcome.analysis = Some(summary);
                Ok(Some(JobEvent::AnalysisFinished { defects }))
            }
            JobAction::MarkRunFinished => {
                job.test_run.mark_finished();
                job.touch();
                self.repo.save_job(job).await?;
                Ok(None)
            }
            JobAction::Cleanup => {
                let package = &job.application.package_name;
                let uninstalled =
                    fail_open("cleanup", || self.device.uninstall_app(serial, package)).await;
                outcome.cleaned_up = uninstalled.is_some();
                Ok(None)
            }
            JobAction::LogActivity { message } => {
                info!("{}", message);
                Ok(None)
            }
        }
    }

    /// `adb connect` is attempted on the first job only
    async fn connect_remote_once(&self) -> bool {
        *self
            .remote
            .get_or_init(|| async {
                fail_open_with_retries(
                    "adb connect",
                    || self.device.connect_remote(),
                    CONNECT_RETRIES,
                    CONNECT_BACKOFF,
                    self.sleeper.as_ref(),
                )
                .await
                .unwrap_or(false)
            })
            .await
    }

    async fn analyze(&self, job: &Job) -> Result<AnalysisSummary> {
        let messages = match &job.application.catalog_path {
            Some(path) => Messages::load(path)?,
            None => Messages::default(),
        };
        let mut app = AppContext::new(&job.application.package_name, messages)
            .with_base_language(&self.base_language);
        if let Some(device) = &job.test_run.test_device {
            app = app.with_device(device.clone());
        }

        let run = RunContext {
            test_run_id: job.test_run.id,
            application_id: job.application.id,
            test_device: job.test_run.test_device.clone(),
            app: Arc::new(app),
        };
        let states_dir = self.layout.states_dir(
            &job.test_run.user_id,
            &job.application.package_name,
            job.test_run.id,
        );
        self.analysis.analyze_run(&run, &states_dir).await
    }
}
