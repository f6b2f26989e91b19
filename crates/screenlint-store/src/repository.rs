//! Save/find contract used by the orchestrator and the results collector

use async_trait::async_trait;
use screenlint_core::{
    Defect, DefectType, Job, JobStatus, Result, ScreenShot, TestRunDefect, TestRunDefectImage,
};
use uuid::Uuid;

/// Persistence operations required by the pipeline
///
/// Each call is one unit of work; implementations make it transactional.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_job(&self, id: Uuid) -> Result<Option<Job>>;

    /// Insert or replace a job (including its test run)
    async fn save_job(&self, job: &Job) -> Result<()>;

    /// Status with this name, created on first use
    async fn find_or_create_status(&self, name: &str) -> Result<JobStatus>;

    async fn save_screenshot(&self, screenshot: ScreenShot) -> Result<ScreenShot>;

    /// Defect type for `code`; the first description stored wins
    async fn find_or_create_defect_type(&self, code: &str, description: &str)
        -> Result<DefectType>;

    async fn save_defect(&self, defect: Defect) -> Result<()>;

    async fn save_test_run_defect(&self, defect: TestRunDefect) -> Result<TestRunDefect>;

    async fn save_defect_proof_image(&self, image: TestRunDefectImage) -> Result<()>;
}
