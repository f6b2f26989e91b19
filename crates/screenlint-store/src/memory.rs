//! In-memory repository with JSON report export

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use screenlint_core::{
    Defect, DefectType, Job, JobStatus, Result, ScreenShot, ScreenlintError, TestRunDefect,
    TestRunDefectImage,
};

use crate::Repository;

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<Uuid, Job>,
    status_history: HashMap<Uuid, Vec<String>>,
    statuses: Vec<JobStatus>,
    screenshots: Vec<ScreenShot>,
    defect_types: Vec<DefectType>,
    defects: Vec<Defect>,
    test_run_defects: Vec<TestRunDefect>,
    images: Vec<TestRunDefectImage>,
}

/// Serializable view of everything stored
#[derive(Debug, Clone, Serialize)]
pub struct StoreSnapshot {
    pub jobs: Vec<Job>,
    pub screenshots: Vec<ScreenShot>,
    pub defect_types: Vec<DefectType>,
    pub defects: Vec<Defect>,
    pub test_run_defects: Vec<TestRunDefect>,
    pub proof_images: usize,
}

/// Repository held entirely in memory
///
/// Cloning shares the underlying data. Every distinct status a job is saved with is
/// appended to that job's history.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
    fail_proof_images: bool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose `save_defect_proof_image` always fails
    pub fn with_failing_proof_images() -> Self {
        Self {
            inner: Arc::default(),
            fail_proof_images: true,
        }
    }

    /// Status names a job went through, in order
    pub async fn status_history(&self, job_id: Uuid) -> Vec<String> {
        let inner = self.inner.read().await;
        inner.status_history.get(&job_id).cloned().unwrap_or_default()
    }

    pub async fn screenshots(&self) -> Vec<ScreenShot> {
        self.inner.read().await.screenshots.clone()
    }

    pub async fn defect_types(&self) -> Vec<DefectType> {
        self.inner.read().await.defect_types.clone()
    }

    pub async fn defects(&self) -> Vec<Defect> {
        self.inner.read().await.defects.clone()
    }

    pub async fn test_run_defects(&self) -> Vec<TestRunDefect> {
        self.inner.read().await.test_run_defects.clone()
    }

    pub async fn proof_images(&self) -> Vec<TestRunDefectImage> {
        self.inner.read().await.images.clone()
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.read().await;
        StoreSnapshot {
            jobs: inner.jobs.values().cloned().collect(),
            screenshots: inner.screenshots.clone(),
            defect_types: inner.defect_types.clone(),
            defects: inner.defects.clone(),
            test_run_defects: inner.test_run_defects.clone(),
            proof_images: inner.images.len(),
        }
    }

    /// Write the snapshot as pretty JSON and each proof image as `<defect id>.png` next to it
    pub async fn write_report(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot().await;
        let json = serde_json::to_string_pretty(&snapshot)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, json).await?;

        let images_dir = path.with_extension("images");
        let images = self.proof_images().await;
        if !images.is_empty() {
            tokio::fs::create_dir_all(&images_dir).await?;
            for image in images {
                let file = images_dir.join(format!("{}.png", image.test_run_defect_id));
                tokio::fs::write(file, &image.png).await?;
            }
        }

        debug!("Wrote report to {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryStore {
    async fn find_job(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.inner.read().await.jobs.get(&id).cloned())
    }

    async fn save_job(&self, job: &Job) -> Result<()> {
        let mut inner = self.inner.write().await;
        let history = inner.status_history.entry(job.id).or_default();
        if history.last() != Some(&job.status.name) {
            history.push(job.status.name.clone());
        }
        inner.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn find_or_create_status(&self, name: &str) -> Result<JobStatus> {
        let mut inner = self.inner.write().await;
        if let Some(status) = inner.statuses.iter().find(|s| s.name == name) {
            return Ok(status.clone());
        }
        let status = JobStatus::new(name);
        inner.statuses.push(status.clone());
        Ok(status)
    }

    async fn save_screenshot(&self, screenshot: ScreenShot) -> Result<ScreenShot> {
        self.inner.write().await.screenshots.push(screenshot.clone());
        Ok(screenshot)
    }

    async fn find_or_create_defect_type(
        &self,
        code: &str,
        description: &str,
    ) -> Result<DefectType> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.defect_types.iter().find(|t| t.code == code) {
            return Ok(existing.clone());
        }
        let defect_type = DefectType::new(code, description);
        inner.defect_types.push(defect_type.clone());
        Ok(defect_type)
    }

    async fn save_defect(&self, defect: Defect) -> Result<()> {
        self.inner.write().await.defects.push(defect);
        Ok(())
    }

    async fn save_test_run_defect(&self, defect: TestRunDefect) -> Result<TestRunDefect> {
        self.inner.write().await.test_run_defects.push(defect.clone());
        Ok(defect)
    }

    async fn save_defect_proof_image(&self, image: TestRunDefectImage) -> Result<()> {
        if self.fail_proof_images {
            return Err(ScreenlintError::Storage(
                "proof image storage unavailable".to_string(),
            ));
        }
        self.inner.write().await.images.push(image);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use screenlint_core::{Application, TestRun};
    use tempfile::TempDir;

    fn sample_job(status: JobStatus) -> Job {
        let app = Application::new("Demo", "com.example.demo", "/tmp/demo.apk");
        Job::new(app, TestRun::new("user-1", None), status)
    }

    #[tokio::test]
    async fn test_find_or_create_status_is_idempotent() {
        let store = InMemoryStore::new();
        let a = store.find_or_create_status("Booting Device").await.unwrap();
        let b = store.find_or_create_status("Booting Device").await.unwrap();
        let c = store.find_or_create_status("Completed").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[tokio::test]
    async fn test_defect_type_first_writer_wins() {
        let store = InMemoryStore::new();
        let first = store
            .find_or_create_defect_type("TS2", "Text : [OK] too small")
            .await
            .unwrap();
        let second = store
            .find_or_create_defect_type("TS2", "another message")
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.description, "Text : [OK] too small");
        assert_eq!(store.defect_types().await.len(), 1);
    }

    #[tokio::test]
    async fn test_status_history_records_changes() {
        let store = InMemoryStore::new();
        let queued = store.find_or_create_status("Queued").await.unwrap();
        let mut job = sample_job(queued);
        store.save_job(&job).await.unwrap();
        // saving again without a status change does not duplicate
        store.save_job(&job).await.unwrap();

        let booting = store.find_or_create_status("Booting Device").await.unwrap();
        job.set_status(booting);
        store.save_job(&job).await.unwrap();

        assert_eq!(
            store.status_history(job.id).await,
            vec!["Queued".to_string(), "Booting Device".to_string()]
        );
        let found = store.find_job(job.id).await.unwrap().unwrap();
        assert_eq!(found.edit_count, 1);
    }

    #[tokio::test]
    async fn test_missing_job_is_none() {
        let store = InMemoryStore::new();
        assert!(store.find_job(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failing_proof_images() {
        let store = InMemoryStore::with_failing_proof_images();
        let result = store
            .save_defect_proof_image(TestRunDefectImage::new(Uuid::new_v4(), vec![1, 2, 3]))
            .await;
        assert!(matches!(result, Err(ScreenlintError::Storage(_))));
        assert!(store.proof_images().await.is_empty());
    }

    #[tokio::test]
    async fn test_write_report() {
        let temp_dir = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        let defect_type = store.find_or_create_defect_type("SL1", "Same for").await.unwrap();
        let saved = store
            .save_test_run_defect(TestRunDefect::new(
                Uuid::new_v4(),
                Uuid::new_v4(),
                None,
                defect_type.id,
                "Same for [ok]: [OK]: en,de",
            ))
            .await
            .unwrap();
        store
            .save_defect_proof_image(TestRunDefectImage::new(saved.id, vec![0x89, b'P']))
            .await
            .unwrap();

        let path = temp_dir.path().join("out").join("report.json");
        store.write_report(&path).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["test_run_defects"].as_array().unwrap().len(), 1);
        assert_eq!(value["proof_images"], 1);
        assert!(temp_dir
            .path()
            .join("out")
            .join("report.images")
            .join(format!("{}.png", saved.id))
            .exists());
    }
}
