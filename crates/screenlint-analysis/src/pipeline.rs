//! Analysis of one run's output directory

use screenlint_core::{Result, ScreenShot, ScreenlintError, TestDevice};
use screenlint_store::Repository;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::checks::{CheckerEngine, EngineReport};
use crate::collector::ResultsCollector;
use crate::context::{AppContext, State};
use crate::ingest::{self, CapturePair, IngestEvent};

/// Identity of the run being analyzed
#[derive(Debug, Clone)]
pub struct RunContext {
    pub test_run_id: Uuid,
    pub application_id: Uuid,
    pub test_device: Option<TestDevice>,
    pub app: Arc<AppContext>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisSummary {
    /// Screenshots registered and analyzed
    pub screenshots: usize,
    /// Screenshots without a layout
    pub skipped: usize,
    /// Pairs whose layout or image could not be read
    pub invalid_states: usize,
    /// Pairs dropped because registering or recording them failed
    pub failed_states: usize,
    pub defects: usize,
    pub app_defects: usize,
    pub report: EngineReport,
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ScreenlintError::Other(format!("analysis task failed: {}", e)))
}

/// Ingest, check and record every capture of a run
pub struct AnalysisPipeline {
    engine: Arc<CheckerEngine>,
    repo: Arc<dyn Repository>,
}

impl AnalysisPipeline {
    pub fn new(engine: Arc<CheckerEngine>, repo: Arc<dyn Repository>) -> Self {
        Self { engine, repo }
    }

    #[instrument(skip(self, run), fields(test_run = %run.test_run_id))]
    pub async fn analyze_run(&self, run: &RunContext, states_dir: &Path) -> Result<AnalysisSummary> {
        let collector =
            ResultsCollector::new(Arc::clone(&self.repo), run.test_run_id, run.application_id);
        let mut summary = AnalysisSummary::default();

        let dir = states_dir.to_path_buf();
        let events = blocking(move || ingest::scan(&dir)).await?;

        for event in events {
            let pair = match event {
                IngestEvent::Pair(pair) => pair,
                IngestEvent::Skipped { .. } => {
                    summary.skipped += 1;
                    continue;
                }
            };
            let image_path = pair.image_path.clone();
            match self.analyze_pair(run, &collector, pair, &mut summary).await {
                Ok(true) => summary.screenshots += 1,
                Ok(false) => summary.invalid_states += 1,
                Err(e) => {
                    warn!("Failed to analyze {}: {}", image_path.display(), e);
                    summary.failed_states += 1;
                }
            }
        }

        let engine = Arc::clone(&self.engine);
        let app = Arc::clone(&run.app);
        let (app_results, app_report) = blocking(move || engine.analyze_app(&app)).await?;
        summary.app_defects = collector.record_app(&app_results).await?;
        summary.report.merge(app_report);

        info!("Analyzed {} screenshots", summary.screenshots);
        Ok(summary)
    }

    /// `false` when the state could not be built and nothing was registered
    ///
    /// Errors only concern this pair; the run goes on with the next one.
    async fn analyze_pair(
        &self,
        run: &RunContext,
        collector: &ResultsCollector,
        pair: CapturePair,
        summary: &mut AnalysisSummary,
    ) -> Result<bool> {
        let device = run.test_device.clone();
        let app = Arc::clone(&run.app);
        let loaded = {
            let pair = pair.clone();
            blocking(move || {
                State::load(&pair.token, &pair.image_path, &pair.layout_path, device, app)
            })
            .await?
        };
        let state = match loaded {
            Ok(state) => state,
            Err(e) => {
                warn!("Skipping {}: {}", pair.image_path.display(), e);
                return Ok(false);
            }
        };

        let screenshot = self
            .repo
            .save_screenshot(ScreenShot::new(
                pair.file_name(),
                run.test_device.as_ref().map(|d| d.id),
                run.application_id,
            ))
            .await?;

        let engine = Arc::clone(&self.engine);
        let (results, report, image) = blocking(move || {
            let (results, report) = engine.analyze_state(&state);
            let image = if results.has_bounds() {
                state
                    .image()
                    .map_err(|e| warn!("No proof images for {}: {}", state.name, e))
                    .ok()
            } else {
                None
            };
            (results, report, image)
        })
        .await?;

        summary.defects += collector
            .record_state(&screenshot, image.as_deref(), &results)
            .await?;
        summary.report.merge(report);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{DictionaryTextAnalyzer, RuleCheckerRegistry};
    use image::{DynamicImage, RgbImage};
    use screenlint_core::config::AnalysisConfig;
    use async_trait::async_trait;
    use screenlint_core::{
        Defect, DefectType, Job, JobStatus, TestRunDefect, TestRunDefectImage,
    };
    use screenlint_store::InMemoryStore;
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    const LAYOUT: &str = r#"{"views": [
        {"temp_id": 0, "parent": -1, "bounds": [[0, 0], [200, 400]]},
        {"temp_id": 1, "parent": 0, "bounds": [[10, 100], [150, 120]], "text": "Terms apply"}
    ]}"#;

    fn write_capture(dir: &Path, token: &str, layout: Option<&str>) {
        DynamicImage::ImageRgb8(RgbImage::new(200, 400))
            .save(dir.join(format!("screen_{}.png", token)))
            .unwrap();
        if let Some(layout) = layout {
            fs::write(dir.join(format!("state_{}.json", token)), layout).unwrap();
        }
    }

    /// Store whose first `save_screenshot` fails
    struct FailOnceStore {
        inner: InMemoryStore,
        failed: AtomicBool,
    }

    #[async_trait]
    impl Repository for FailOnceStore {
        async fn find_job(&self, id: Uuid) -> Result<Option<Job>> {
            self.inner.find_job(id).await
        }

        async fn save_job(&self, job: &Job) -> Result<()> {
            self.inner.save_job(job).await
        }

        async fn find_or_create_status(&self, name: &str) -> Result<JobStatus> {
            self.inner.find_or_create_status(name).await
        }

        async fn save_screenshot(&self, screenshot: ScreenShot) -> Result<ScreenShot> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(ScreenlintError::Storage("connection reset".to_string()));
            }
            self.inner.save_screenshot(screenshot).await
        }

        async fn find_or_create_defect_type(
            &self,
            code: &str,
            description: &str,
        ) -> Result<DefectType> {
            self.inner.find_or_create_defect_type(code, description).await
        }

        async fn save_defect(&self, defect: Defect) -> Result<()> {
            self.inner.save_defect(defect).await
        }

        async fn save_test_run_defect(&self, defect: TestRunDefect) -> Result<TestRunDefect> {
            self.inner.save_test_run_defect(defect).await
        }

        async fn save_defect_proof_image(&self, image: TestRunDefectImage) -> Result<()> {
            self.inner.save_defect_proof_image(image).await
        }
    }

    fn engine() -> Arc<CheckerEngine> {
        let registry = RuleCheckerRegistry::default_set(
            &AnalysisConfig::default(),
            Arc::new(DictionaryTextAnalyzer::new()),
            None,
        );
        Arc::new(CheckerEngine::new(Arc::new(registry)))
    }

    fn pipeline(store: &InMemoryStore) -> AnalysisPipeline {
        AnalysisPipeline::new(engine(), Arc::new(store.clone()))
    }

    fn run() -> RunContext {
        RunContext {
            test_run_id: Uuid::new_v4(),
            application_id: Uuid::new_v4(),
            test_device: Some(TestDevice::new("Small", 200, 400, 1.0)),
            app: Arc::new(AppContext::new("com.example.app", Default::default())),
        }
    }

    #[tokio::test]
    async fn test_analyze_run() {
        let temp = TempDir::new().unwrap();
        write_capture(temp.path(), "a", Some(LAYOUT));
        write_capture(temp.path(), "b", None);
        write_capture(temp.path(), "c", Some("{not json"));

        let store = InMemoryStore::new();
        let summary = pipeline(&store).analyze_run(&run(), temp.path()).await.unwrap();

        assert_eq!(summary.screenshots, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.invalid_states, 1);
        assert_eq!(summary.defects, 1);
        assert_eq!(summary.app_defects, 0);

        let screenshots = store.screenshots().await;
        assert_eq!(screenshots.len(), 1);
        assert_eq!(screenshots[0].file_name, "screen_a.png");

        let defects = store.test_run_defects().await;
        assert_eq!(defects.len(), 1);
        assert!(defects[0].message.starts_with("Text : [Terms apply] too small"));
        assert_eq!(store.proof_images().await.len(), 1);
    }

    #[tokio::test]
    async fn test_storage_error_skips_only_that_pair() {
        let temp = TempDir::new().unwrap();
        for token in ["a", "b", "c"] {
            write_capture(temp.path(), token, Some(LAYOUT));
        }

        let store = InMemoryStore::new();
        let repo = Arc::new(FailOnceStore {
            inner: store.clone(),
            failed: AtomicBool::new(false),
        });
        let summary = AnalysisPipeline::new(engine(), repo)
            .analyze_run(&run(), temp.path())
            .await
            .unwrap();

        assert_eq!(summary.screenshots, 2);
        assert_eq!(summary.failed_states, 1);
        assert_eq!(summary.invalid_states, 0);
        assert_eq!(summary.defects, 2);

        let names: Vec<_> = store
            .screenshots()
            .await
            .into_iter()
            .map(|s| s.file_name)
            .collect();
        assert_eq!(names, vec!["screen_b.png", "screen_c.png"]);
    }

    #[tokio::test]
    async fn test_missing_states_dir() {
        let temp = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        let summary = pipeline(&store)
            .analyze_run(&run(), &temp.path().join("missing"))
            .await
            .unwrap();
        assert_eq!(summary, AnalysisSummary::default());
    }
}
