//! Persisting checker annotations as defects with proof images

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use screenlint_core::{
    Defect, Rect, Result, ScreenShot, ScreenlintError, TestRunDefect, TestRunDefectImage,
};
use screenlint_store::Repository;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::checks::{AppCheckResults, DefectAnnotation, StateCheckResults};

const PROOF_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const PROOF_STROKE: i32 = 3;

/// Copy of `image` with a red rectangle around `bounds`, PNG encoded
pub fn render_proof(image: &DynamicImage, bounds: Rect) -> Result<Vec<u8>> {
    let mut canvas: RgbaImage = image.to_rgba8();
    let (width, height) = (canvas.width() as i32, canvas.height() as i32);
    let Some(area) = bounds.intersect(&Rect::new(0, 0, width, height)) else {
        return Err(ScreenlintError::Image(format!(
            "Bounds {} outside of {}x{} screenshot",
            bounds, width, height
        )));
    };

    for y in area.y..area.bottom() {
        for x in area.x..area.right() {
            let on_edge = x < area.x + PROOF_STROKE
                || x >= area.right() - PROOF_STROKE
                || y < area.y + PROOF_STROKE
                || y >= area.bottom() - PROOF_STROKE;
            if on_edge {
                canvas.put_pixel(x as u32, y as u32, PROOF_COLOR);
            }
        }
    }

    let mut png = Vec::new();
    canvas
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| ScreenlintError::Image(format!("encode proof: {}", e)))?;
    Ok(png)
}

/// Writes findings of one test run through the repository
pub struct ResultsCollector {
    repo: Arc<dyn Repository>,
    test_run_id: Uuid,
    application_id: Uuid,
}

impl ResultsCollector {
    pub fn new(repo: Arc<dyn Repository>, test_run_id: Uuid, application_id: Uuid) -> Self {
        Self {
            repo,
            test_run_id,
            application_id,
        }
    }

    /// Record every annotation of a registered screenshot; returns how many were stored
    pub async fn record_state(
        &self,
        screenshot: &ScreenShot,
        image: Option<&DynamicImage>,
        results: &StateCheckResults,
    ) -> Result<usize> {
        for annotation in results.annotations() {
            let defect_type = self
                .repo
                .find_or_create_defect_type(annotation.rule.code, &annotation.message)
                .await?;
            self.repo
                .save_defect(Defect::new(screenshot.id, defect_type.id))
                .await?;
            let run_defect = self
                .repo
                .save_test_run_defect(TestRunDefect::new(
                    self.test_run_id,
                    self.application_id,
                    Some(screenshot.id),
                    defect_type.id,
                    annotation.message.clone(),
                ))
                .await?;

            if let Some(bounds) = annotation.bounds {
                self.record_proof(&run_defect, image, bounds, annotation).await;
            }
        }
        debug!(
            "Recorded {} defects for {}",
            results.len(),
            screenshot.file_name
        );
        Ok(results.len())
    }

    async fn record_proof(
        &self,
        run_defect: &TestRunDefect,
        image: Option<&DynamicImage>,
        bounds: Rect,
        annotation: &DefectAnnotation,
    ) {
        let Some(image) = image else {
            warn!("No screenshot pixels for proof of {}", annotation.rule);
            return;
        };
        let stored = match render_proof(image, bounds) {
            Ok(png) => {
                self.repo
                    .save_defect_proof_image(TestRunDefectImage::new(run_defect.id, png))
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            warn!("Proof image for {} not stored: {}", annotation.rule, e);
        }
    }

    /// Record app-wide findings; no screenshot, no defect row, no image
    pub async fn record_app(&self, results: &AppCheckResults) -> Result<usize> {
        for annotation in results.annotations() {
            let defect_type = self
                .repo
                .find_or_create_defect_type(annotation.rule.code, &annotation.message)
                .await?;
            self.repo
                .save_test_run_defect(TestRunDefect::new(
                    self.test_run_id,
                    self.application_id,
                    None,
                    defect_type.id,
                    annotation.message.clone(),
                ))
                .await?;
        }
        Ok(results.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{AppDefectAnnotation, GrammarCheck, UnreadableTextCheck};
    use image::RgbImage;
    use screenlint_store::InMemoryStore;

    fn screen() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 80, image::Rgb([255, 255, 255])))
    }

    fn state_results() -> StateCheckResults {
        let mut results = StateCheckResults::new();
        results.add(DefectAnnotation::new(
            UnreadableTextCheck::RULE,
            Some(Rect::new(10, 10, 40, 20)),
            "Text : [tiny] too small 1.23mm [x=10,y=10,width=40,height=20]",
        ));
        results.add(DefectAnnotation::new(GrammarCheck::RULE, None, "Misspelled: teh"));
        results
    }

    #[test]
    fn test_render_proof_draws_red_border() {
        let png = render_proof(&screen(), Rect::new(10, 10, 40, 20)).unwrap();
        let proof = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(proof.dimensions(), (100, 80));
        assert_eq!(*proof.get_pixel(10, 10), PROOF_COLOR);
        assert_eq!(*proof.get_pixel(12, 20), PROOF_COLOR);
        assert_eq!(*proof.get_pixel(49, 29), PROOF_COLOR);
        assert_eq!(*proof.get_pixel(30, 20), Rgba([255, 255, 255, 255]));
        assert_eq!(*proof.get_pixel(5, 5), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_render_proof_outside_image() {
        assert!(render_proof(&screen(), Rect::new(200, 200, 10, 10)).is_err());
    }

    #[tokio::test]
    async fn test_record_state() {
        let store = InMemoryStore::new();
        let collector = ResultsCollector::new(Arc::new(store.clone()), Uuid::new_v4(), Uuid::new_v4());
        let screenshot = ScreenShot::new("screen_a.png", None, Uuid::new_v4());

        let image = screen();
        let count = collector
            .record_state(&screenshot, Some(&image), &state_results())
            .await
            .unwrap();
        assert_eq!(count, 2);

        let defects = store.test_run_defects().await;
        assert_eq!(defects.len(), 2);
        assert!(defects.iter().all(|d| d.screenshot_id == Some(screenshot.id)));
        assert!(defects.iter().all(|d| d.defects_count == 1));
        assert_eq!(store.defects().await.len(), 2);

        let images = store.proof_images().await;
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].test_run_defect_id, defects[0].id);
    }

    #[tokio::test]
    async fn test_defect_type_first_description_wins() {
        let store = InMemoryStore::new();
        let collector = ResultsCollector::new(Arc::new(store.clone()), Uuid::new_v4(), Uuid::new_v4());
        let image = screen();
        for name in ["screen_a.png", "screen_b.png"] {
            let screenshot = ScreenShot::new(name, None, Uuid::new_v4());
            collector
                .record_state(&screenshot, Some(&image), &state_results())
                .await
                .unwrap();
        }
        let types = store.defect_types().await;
        assert_eq!(types.len(), 2);
        assert_eq!(types[1].description, "Misspelled: teh");
    }

    #[tokio::test]
    async fn test_proof_failure_keeps_defects() {
        let store = InMemoryStore::with_failing_proof_images();
        let collector = ResultsCollector::new(Arc::new(store.clone()), Uuid::new_v4(), Uuid::new_v4());
        let screenshot = ScreenShot::new("screen_a.png", None, Uuid::new_v4());
        let image = screen();

        let count = collector
            .record_state(&screenshot, Some(&image), &state_results())
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(store.test_run_defects().await.len(), 2);
        assert!(store.proof_images().await.is_empty());
    }

    #[tokio::test]
    async fn test_record_app_has_no_screenshot() {
        let store = InMemoryStore::new();
        let collector = ResultsCollector::new(Arc::new(store.clone()), Uuid::new_v4(), Uuid::new_v4());
        let mut results = AppCheckResults::new();
        results.add(AppDefectAnnotation::new(GrammarCheck::RULE, "[typo] en: opne"));

        assert_eq!(collector.record_app(&results).await.unwrap(), 1);
        let defects = store.test_run_defects().await;
        assert_eq!(defects[0].screenshot_id, None);
        assert!(store.defects().await.is_empty());
        assert!(store.proof_images().await.is_empty());
    }
}
