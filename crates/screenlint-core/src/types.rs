//! Persisted entities and shared value types
//!
//! Entities are created through explicit constructors that assign an id and a
//! creation time. Mutating entities expose `touch()`, which the orchestrator calls
//! on every update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Axis-aligned rectangle in screen pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from two corners, normalizing their order
    pub fn from_corners(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self::new(x1.min(x2), y1.min(y2), (x2 - x1).abs(), (y2 - y1).abs())
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Overlapping region, `None` when the rectangles do not overlap
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if right > x && bottom > y {
            Some(Rect::new(x, y, right - x, bottom - y))
        } else {
            None
        }
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[x={},y={},width={},height={}]",
            self.x, self.y, self.width, self.height
        )
    }
}

/// Named job status; the vocabulary is open-ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: Uuid,
    pub name: String,
}

impl JobStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

/// One exploration run of one application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub application: Application,
    pub test_run: TestRun,
    pub status: JobStatus,
    pub created: DateTime<Utc>,
    pub edited: DateTime<Utc>,
    pub edit_count: u32,
}

impl Job {
    pub fn new(application: Application, test_run: TestRun, status: JobStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            application,
            test_run,
            status,
            created: now,
            edited: now,
            edit_count: 0,
        }
    }

    /// Record a modification
    pub fn touch(&mut self) {
        self.edit_count += 1;
        self.edited = Utc::now();
    }

    pub fn set_status(&mut self, status: JobStatus) {
        self.status = status;
        self.touch();
    }
}

/// Logical run of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRun {
    pub id: Uuid,
    pub user_id: String,
    pub description: Option<String>,
    pub run_date: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
    pub test_device: Option<TestDevice>,
    pub edited: DateTime<Utc>,
    pub edit_count: u32,
}

impl TestRun {
    pub fn new(user_id: impl Into<String>, test_device: Option<TestDevice>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            description: None,
            run_date: now,
            finished: None,
            test_device,
            edited: now,
            edit_count: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn touch(&mut self) {
        self.edit_count += 1;
        self.edited = Utc::now();
    }

    pub fn mark_finished(&mut self) {
        self.finished = Some(Utc::now());
        self.touch();
    }
}

/// Device profile used for pixel to millimetre conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDevice {
    pub id: Uuid,
    pub name: String,
    pub resolution_width: u32,
    pub resolution_height: u32,
    /// Diagonal in inches
    pub screen_size_inches: f64,
    pub tablet: bool,
    pub english_interface: bool,
    pub left_to_right: bool,
    pub created: DateTime<Utc>,
}

impl TestDevice {
    pub fn new(
        name: impl Into<String>,
        resolution_width: u32,
        resolution_height: u32,
        screen_size_inches: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            resolution_width,
            resolution_height,
            screen_size_inches,
            tablet: false,
            english_interface: true,
            left_to_right: true,
            created: Utc::now(),
        }
    }

    /// Parse a `"1080x1920"` resolution
    pub fn parse_resolution(value: &str) -> Option<(u32, u32)> {
        let (w, h) = value.trim().split_once(['x', 'X'])?;
        Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
    }

    /// Pixels per inch along the diagonal, `None` without a usable profile
    pub fn dpi(&self) -> Option<f64> {
        if self.screen_size_inches <= 0.0 || self.resolution_width == 0 || self.resolution_height == 0 {
            return None;
        }
        let w = self.resolution_width as f64;
        let h = self.resolution_height as f64;
        Some((w * w + h * h).sqrt() / self.screen_size_inches)
    }

    /// Physical length in millimetres of `pixels` on this device
    pub fn physical_size_mm(&self, pixels: i32) -> Option<f64> {
        self.dpi().map(|dpi| pixels as f64 * 25.4 / dpi)
    }
}

/// Application under test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub name: String,
    pub package_name: String,
    pub version: Option<String>,
    pub apk_path: std::path::PathBuf,
    /// Message catalog (`key -> locale -> text`) as JSON
    pub catalog_path: Option<std::path::PathBuf>,
}

impl Application {
    pub fn new(
        name: impl Into<String>,
        package_name: impl Into<String>,
        apk_path: impl Into<std::path::PathBuf>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            package_name: package_name.into(),
            version: None,
            apk_path: apk_path.into(),
            catalog_path: None,
        }
    }

    pub fn with_catalog(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.catalog_path = Some(path.into());
        self
    }
}

/// Registered screenshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenShot {
    pub id: Uuid,
    /// Exactly `screen_<token>.png`
    pub file_name: String,
    pub test_device_id: Option<Uuid>,
    pub application_id: Uuid,
    pub invalid: bool,
    pub created: DateTime<Utc>,
}

impl ScreenShot {
    pub fn new(
        file_name: impl Into<String>,
        test_device_id: Option<Uuid>,
        application_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            test_device_id,
            application_id,
            invalid: false,
            created: Utc::now(),
        }
    }
}

/// Catalog entry keyed by rule code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefectType {
    pub id: Uuid,
    pub code: String,
    pub description: String,
}

impl DefectType {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            description: description.into(),
        }
    }
}

/// Low-level finding on a screenshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defect {
    pub id: Uuid,
    pub screenshot_id: Uuid,
    pub defect_type_id: Uuid,
    pub created: DateTime<Utc>,
}

impl Defect {
    pub fn new(screenshot_id: Uuid, defect_type_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            screenshot_id,
            defect_type_id,
            created: Utc::now(),
        }
    }
}

/// Report-level finding, one per annotation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRunDefect {
    pub id: Uuid,
    pub test_run_id: Uuid,
    pub application_id: Uuid,
    /// `None` for app-wide findings
    pub screenshot_id: Option<Uuid>,
    pub defect_type_id: Uuid,
    pub defects_count: u32,
    pub message: String,
    pub created: DateTime<Utc>,
}

impl TestRunDefect {
    pub fn new(
        test_run_id: Uuid,
        application_id: Uuid,
        screenshot_id: Option<Uuid>,
        defect_type_id: Uuid,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            test_run_id,
            application_id,
            screenshot_id,
            defect_type_id,
            defects_count: 1,
            message: message.into(),
            created: Utc::now(),
        }
    }
}

/// Screenshot copy with the finding boxed, PNG encoded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRunDefectImage {
    pub id: Uuid,
    pub test_run_defect_id: Uuid,
    #[serde(skip)]
    pub png: Vec<u8>,
    pub created: DateTime<Utc>,
}

impl TestRunDefectImage {
    pub fn new(test_run_defect_id: Uuid, png: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            test_run_defect_id,
            png,
            created: Utc::now(),
        }
    }
}
