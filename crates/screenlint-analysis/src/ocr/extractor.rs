//! OCR fallback chain

use image::DynamicImage;
use screenlint_core::{Rect, ScreenlintError};
use std::sync::Arc;
use tracing::{debug, warn};

use super::preprocess::{
    adaptive_threshold, crop, gaussian_blur_3x3, normalized_grayscale, upscale_small,
    ADAPTIVE_BLOCK_SIZE, ADAPTIVE_CONSTANT,
};
use super::OcrEngine;

/// Steps of the fallback chain, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStage {
    /// OCR on the cropped region
    Raw,
    /// Short crop scaled up (preprocessing only)
    Upscaled,
    /// Normalized grayscale, Gaussian blur, OCR
    Blurred,
    /// Adaptive threshold of the blurred image, OCR
    Thresholded,
}

/// Outcome of [`TextExtractor::extract_traced`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextExtraction {
    /// Accepted result, else the last one attempted
    pub text: String,
    pub stages: Vec<ExtractionStage>,
    pub accepted: bool,
    /// Some stage produced non-empty text
    pub recognized: bool,
}

/// Runs OCR through escalating preprocessing until a result is accepted
#[derive(Clone)]
pub struct TextExtractor {
    engine: Arc<dyn OcrEngine>,
}

impl TextExtractor {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self { engine }
    }

    pub fn extract(
        &self,
        image: &DynamicImage,
        bounds: Rect,
        accept: &dyn Fn(&str) -> bool,
    ) -> String {
        self.extract_traced(image, bounds, accept).text
    }

    pub fn extract_traced(
        &self,
        image: &DynamicImage,
        bounds: Rect,
        accept: &dyn Fn(&str) -> bool,
    ) -> TextExtraction {
        let mut extraction = TextExtraction::default();

        let Some(mut region) = crop(image, bounds) else {
            debug!("Bounds {} outside the image", bounds);
            return extraction;
        };

        if self.attempt(ExtractionStage::Raw, &region, accept, &mut extraction) {
            return extraction;
        }

        if let Some(upscaled) = upscale_small(&region) {
            extraction.stages.push(ExtractionStage::Upscaled);
            region = upscaled;
        }

        let blurred = gaussian_blur_3x3(&normalized_grayscale(&region));
        let thresholded = adaptive_threshold(&blurred, ADAPTIVE_BLOCK_SIZE, ADAPTIVE_CONSTANT);

        if self.attempt(
            ExtractionStage::Blurred,
            &DynamicImage::ImageLuma8(blurred),
            accept,
            &mut extraction,
        ) {
            return extraction;
        }

        self.attempt(
            ExtractionStage::Thresholded,
            &DynamicImage::ImageLuma8(thresholded),
            accept,
            &mut extraction,
        );
        extraction
    }

    /// One OCR attempt; `true` when the result is accepted
    fn attempt(
        &self,
        stage: ExtractionStage,
        image: &DynamicImage,
        accept: &dyn Fn(&str) -> bool,
        extraction: &mut TextExtraction,
    ) -> bool {
        extraction.stages.push(stage);

        match self.engine.recognize(image) {
            Ok(text) => {
                let text = text.trim().to_string();
                extraction.recognized |= !text.is_empty();
                extraction.accepted = accept(&text);
                extraction.text = text;
                extraction.accepted
            }
            Err(e) => {
                let e = match e {
                    e @ ScreenlintError::ExtractionFailure(_) => e,
                    other => ScreenlintError::ExtractionFailure(other.to_string()),
                };
                warn!("{:?} stage: {}", stage, e);
                false
            }
        }
    }
}
