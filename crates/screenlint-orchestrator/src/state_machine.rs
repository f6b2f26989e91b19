//! Pure state machine for job control flow
//!
//! `transition(phase, event) -> (phase, actions)` performs no I/O. The orchestrator
//! executes the returned actions and feeds the outcome back in as the next event.
//!
//! - Invalid transitions go to `Failed` (never panic)
//! - Every transition into a new phase emits `PersistStatus`
//! - Both terminal phases emit `Cleanup`

use serde::Serialize;

/// Phase of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum JobPhase {
    Queued,
    BootingDevice,
    InstallingApps,
    RunningExploration,
    AnalyzingResults,
    Completed,
    Failed { reason: String },
}

impl JobPhase {
    /// Status name persisted for this phase
    pub fn status_name(&self) -> &'static str {
        match self {
            JobPhase::Queued => "Queued",
            JobPhase::BootingDevice => "Booting Device",
            JobPhase::InstallingApps => "Installing Apps",
            JobPhase::RunningExploration => "Running Exploration",
            JobPhase::AnalyzingResults => "Analyzing Results",
            JobPhase::Completed => "Completed",
            JobPhase::Failed { .. } => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::Failed { .. })
    }
}

/// Outcome of the work done in the current phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Start,
    DeviceReady,
    AppsInstalled,
    ExplorationFinished,
    AnalysisFinished { defects: usize },
    Error { message: String },
}

/// Side effects requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobAction {
    PersistStatus { name: &'static str },
    BootDevice,
    InstallApps,
    RunExploration,
    AnalyzeResults,
    MarkRunFinished,
    /// Uninstall the app under test; best effort
    Cleanup,
    LogActivity { message: String },
}

fn enter(phase: JobPhase, mut actions: Vec<JobAction>) -> (JobPhase, Vec<JobAction>) {
    actions.insert(
        0,
        JobAction::PersistStatus {
            name: phase.status_name(),
        },
    );
    (phase, actions)
}

fn fail(reason: String) -> (JobPhase, Vec<JobAction>) {
    let actions = vec![
        JobAction::LogActivity {
            message: format!("Job failed: {}", reason),
        },
        JobAction::Cleanup,
    ];
    enter(JobPhase::Failed { reason }, actions)
}

/// Pure state transition function
///
/// # Invalid Transitions
/// Any event a phase does not expect moves the job to `Failed`, terminal phases
/// included. This function never panics.
pub fn transition(phase: JobPhase, event: JobEvent) -> (JobPhase, Vec<JobAction>) {
    match (phase, event) {
        (JobPhase::Queued, JobEvent::Start) => {
            enter(JobPhase::BootingDevice, vec![JobAction::BootDevice])
        }

        (JobPhase::BootingDevice, JobEvent::DeviceReady) => {
            enter(JobPhase::InstallingApps, vec![JobAction::InstallApps])
        }

        (JobPhase::InstallingApps, JobEvent::AppsInstalled) => {
            enter(JobPhase::RunningExploration, vec![JobAction::RunExploration])
        }

        (JobPhase::RunningExploration, JobEvent::ExplorationFinished) => {
            enter(JobPhase::AnalyzingResults, vec![JobAction::AnalyzeResults])
        }

        (JobPhase::AnalyzingResults, JobEvent::AnalysisFinished { defects }) => enter(
            JobPhase::Completed,
            vec![
                JobAction::LogActivity {
                    message: format!("Job completed with {} defects", defects),
                },
                JobAction::MarkRunFinished,
                JobAction::Cleanup,
            ],
        ),

        (phase, JobEvent::Error { message }) if !phase.is_terminal() => {
            fail(format!("{} failed: {}", phase.status_name(), message))
        }

        (phase, event) => fail(format!(
            "Invalid transition: {:?} in phase {}",
            event,
            phase.status_name()
        )),
    }
}
