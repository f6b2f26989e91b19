//! Text recognition with a preprocessing fallback chain

mod extractor;
pub mod preprocess;

pub use extractor::{ExtractionStage, TextExtraction, TextExtractor};

use image::{DynamicImage, ImageFormat};
use screenlint_core::config::OcrConfig;
use screenlint_core::{Result, ScreenlintError};
use std::collections::VecDeque;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Recognizes text in an image
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &DynamicImage) -> Result<String>;
}

/// Tesseract CLI, fed a PNG on stdin
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    program: String,
    language: String,
    tessdata_dir: Option<PathBuf>,
}

impl TesseractOcr {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            program: config.tesseract.clone(),
            language: config.language.clone(),
            tessdata_dir: config.tessdata_dir.clone(),
        }
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.language.clone(),
        ];
        if let Some(dir) = &self.tessdata_dir {
            args.push("--tessdata-dir".to_string());
            args.push(dir.to_string_lossy().to_string());
        }
        args
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &DynamicImage) -> Result<String> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| ScreenlintError::ExtractionFailure(format!("encode: {}", e)))?;

        let mut child = Command::new(&self.program)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ScreenlintError::ExtractionFailure(format!("{}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&png)?;
        }
        let output = child.wait_with_output()?;

        if !output.status.success() {
            return Err(ScreenlintError::ExtractionFailure(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("OCR {}x{}: {:?}", image.width(), image.height(), text);
        Ok(text)
    }
}

/// Scripted OCR for testing
///
/// Returns the queued results in order, then empty text. Clones share the queue
/// and the log of image sizes seen.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOcr {
    results: Arc<Mutex<VecDeque<std::result::Result<String, String>>>>,
    calls: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl ScriptedOcr {
    pub fn new(results: Vec<std::result::Result<String, String>>) -> Self {
        Self {
            results: Arc::new(Mutex::new(results.into())),
            calls: Arc::default(),
        }
    }

    /// Always recognize `text`
    pub fn constant(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string()); 1024])
    }

    /// `(width, height)` of every image recognized
    pub fn calls(&self) -> Vec<(u32, u32)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl OcrEngine for ScriptedOcr {
    fn recognize(&self, image: &DynamicImage) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((image.width(), image.height()));
        }
        let next = self
            .results
            .lock()
            .map_err(|_| ScreenlintError::Other("scripted OCR poisoned".to_string()))?
            .pop_front();
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(ScreenlintError::ExtractionFailure(message)),
            None => Ok(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tesseract_args() {
        let config = OcrConfig {
            language: "lit".to_string(),
            tessdata_dir: Some(PathBuf::from("/usr/share/tessdata")),
            ..OcrConfig::default()
        };
        let ocr = TesseractOcr::new(&config);
        assert_eq!(
            ocr.args().join(" "),
            "stdin stdout -l lit --tessdata-dir /usr/share/tessdata"
        );
    }

    #[test]
    fn test_missing_tesseract_is_extraction_failure() {
        let config = OcrConfig {
            tesseract: "screenlint-no-such-tesseract".to_string(),
            ..OcrConfig::default()
        };
        let image = DynamicImage::new_luma8(4, 4);
        let err = TesseractOcr::new(&config).recognize(&image).unwrap_err();
        assert!(matches!(err, ScreenlintError::ExtractionFailure(_)));
    }

    #[test]
    fn test_scripted_ocr_sequence() {
        let ocr = ScriptedOcr::new(vec![Ok("a".to_string()), Err("boom".to_string())]);
        let image = DynamicImage::new_luma8(3, 2);
        assert_eq!(ocr.recognize(&image).unwrap(), "a");
        assert!(ocr.recognize(&image).is_err());
        assert_eq!(ocr.recognize(&image).unwrap(), "");
        assert_eq!(ocr.calls(), vec![(3, 2); 3]);
    }
}
