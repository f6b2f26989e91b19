//! Analysis model: control trees, states, message catalogs and the app context

use image::DynamicImage;
use screenlint_core::{Rect, Result, ScreenlintError, TestDevice};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::warn;

/// Index of a control in its [`ControlTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlId(pub usize);

/// One UI element of a captured state
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub id: ControlId,
    pub parent: Option<ControlId>,
    pub children: Vec<ControlId>,
    pub bounds: Rect,
    pub text: Option<String>,
    pub content_description: Option<String>,
    pub resource_id: Option<String>,
    pub class_name: Option<String>,
    pub visible: bool,
}

impl Control {
    /// Trimmed text, `None` when absent or blank
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn content_description(&self) -> Option<&str> {
        self.content_description
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    views: Vec<RawView>,
}

#[derive(Debug, Deserialize)]
struct RawView {
    temp_id: i64,
    #[serde(default = "no_parent")]
    parent: i64,
    #[serde(default)]
    bounds: Option<[[i32; 2]; 2]>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    content_description: Option<String>,
    #[serde(default)]
    resource_id: Option<String>,
    #[serde(default, rename = "class")]
    class_name: Option<String>,
    #[serde(default = "visible_by_default")]
    visible: bool,
}

fn no_parent() -> i64 {
    -1
}

fn visible_by_default() -> bool {
    true
}

/// Arena of the controls of one state
///
/// Parent links are indices. Links to unknown ids or links that close a cycle are
/// cut when the tree is built, so every walk towards the root terminates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlTree {
    controls: Vec<Control>,
}

impl ControlTree {
    /// Parse the exploration tool's state snapshot (`{"views": [...]}`)
    pub fn from_snapshot_json(json: &str) -> Result<Self> {
        let snapshot: RawSnapshot = serde_json::from_str(json)
            .map_err(|e| ScreenlintError::Layout(format!("unparseable snapshot: {}", e)))?;

        let index: HashMap<i64, usize> = snapshot
            .views
            .iter()
            .enumerate()
            .map(|(i, v)| (v.temp_id, i))
            .collect();

        let mut controls: Vec<Control> = snapshot
            .views
            .into_iter()
            .enumerate()
            .map(|(i, view)| {
                let parent = if view.parent < 0 {
                    None
                } else {
                    match index.get(&view.parent) {
                        Some(&p) if p != i => Some(ControlId(p)),
                        _ => {
                            warn!(
                                "View {} points at unknown parent {}, treating as root",
                                view.temp_id, view.parent
                            );
                            None
                        }
                    }
                };
                let bounds = view
                    .bounds
                    .map(|[[x1, y1], [x2, y2]]| Rect::from_corners(x1, y1, x2, y2))
                    .unwrap_or_default();

                Control {
                    id: ControlId(i),
                    parent,
                    children: Vec::new(),
                    bounds,
                    text: view.text,
                    content_description: view.content_description,
                    resource_id: view.resource_id,
                    class_name: view.class_name,
                    visible: view.visible,
                }
            })
            .collect();

        cut_cycles(&mut controls);

        for i in 0..controls.len() {
            if let Some(ControlId(p)) = controls[i].parent {
                controls[p].children.push(ControlId(i));
            }
        }

        Ok(Self { controls })
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    pub fn get(&self, id: ControlId) -> Option<&Control> {
        self.controls.get(id.0)
    }

    pub fn parent(&self, control: &Control) -> Option<&Control> {
        control.parent.and_then(|p| self.get(p))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Control> {
        self.controls.iter()
    }

    pub fn roots(&self) -> impl Iterator<Item = &Control> {
        self.controls.iter().filter(|c| c.parent.is_none())
    }

    /// Visible controls with non-empty bounds, in arena order
    pub fn actual_controls(&self) -> impl Iterator<Item = &Control> {
        self.controls
            .iter()
            .filter(|c| c.visible && !c.bounds.is_empty())
    }
}

fn cut_cycles(controls: &mut [Control]) {
    for start in 0..controls.len() {
        let mut seen = BTreeSet::new();
        seen.insert(start);
        let mut current = controls[start].parent;
        while let Some(ControlId(p)) = current {
            if !seen.insert(p) {
                warn!("Parent cycle at control {}, treating as root", start);
                controls[start].parent = None;
                break;
            }
            current = controls[p].parent;
        }
    }
}

/// Translation catalog: key -> locale -> text
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Messages {
    #[serde(default)]
    locales: Vec<String>,
    #[serde(default)]
    messages: BTreeMap<String, BTreeMap<String, String>>,
}

impl Messages {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Declared locales, or every locale used by a message when none are declared
    pub fn locales(&self) -> Vec<String> {
        if !self.locales.is_empty() {
            return self.locales.clone();
        }
        let used: BTreeSet<&String> = self.messages.values().flat_map(|t| t.keys()).collect();
        used.into_iter().cloned().collect()
    }

    /// Locales ordered by code length, then alphabetically
    pub fn locales_by_length(&self) -> Vec<String> {
        let mut locales = self.locales();
        locales.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        locales
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.messages.keys().map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.messages.contains_key(key)
    }

    pub fn translations(&self, key: &str) -> Option<&BTreeMap<String, String>> {
        self.messages.get(key)
    }

    pub fn message(&self, key: &str, locale: &str) -> Option<&str> {
        self.messages
            .get(key)
            .and_then(|t| t.get(locale))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// App-wide data shared read-only by all checkers of one run
#[derive(Debug, Clone, Default)]
pub struct AppContext {
    pub package_name: String,
    pub messages: Messages,
    pub devices: Vec<TestDevice>,
    /// Reference language of the app
    pub base_language: String,
    pub system: BTreeMap<String, String>,
}

impl AppContext {
    pub fn new(package_name: impl Into<String>, messages: Messages) -> Self {
        Self {
            package_name: package_name.into(),
            messages,
            devices: Vec::new(),
            base_language: "lt".to_string(),
            system: BTreeMap::new(),
        }
    }

    pub fn with_base_language(mut self, language: impl Into<String>) -> Self {
        self.base_language = language.into();
        self
    }

    pub fn with_device(mut self, device: TestDevice) -> Self {
        self.devices.push(device);
        self
    }
}

/// One captured screen: screenshot, control tree and owning app context
#[derive(Debug)]
pub struct State {
    pub name: String,
    pub image_path: PathBuf,
    pub layout_path: PathBuf,
    pub controls: ControlTree,
    /// Width and height of the screenshot
    pub image_size: (u32, u32),
    pub test_device: Option<TestDevice>,
    pub app: Arc<AppContext>,
    image: OnceLock<std::result::Result<Arc<DynamicImage>, String>>,
}

impl State {
    pub fn new(
        name: impl Into<String>,
        controls: ControlTree,
        image_size: (u32, u32),
        test_device: Option<TestDevice>,
        app: Arc<AppContext>,
    ) -> Self {
        Self {
            name: name.into(),
            image_path: PathBuf::new(),
            layout_path: PathBuf::new(),
            controls,
            image_size,
            test_device,
            app,
            image: OnceLock::new(),
        }
    }

    /// Parse the layout and read the image header; pixels are decoded on first use
    pub fn load(
        name: impl Into<String>,
        image_path: &Path,
        layout_path: &Path,
        test_device: Option<TestDevice>,
        app: Arc<AppContext>,
    ) -> Result<Self> {
        let json = std::fs::read_to_string(layout_path)?;
        let controls = ControlTree::from_snapshot_json(&json)?;
        let image_size = image::image_dimensions(image_path)
            .map_err(|e| ScreenlintError::Image(format!("{}: {}", image_path.display(), e)))?;

        let mut state = Self::new(name, controls, image_size, test_device, app);
        state.image_path = image_path.to_path_buf();
        state.layout_path = layout_path.to_path_buf();
        Ok(state)
    }

    /// State with an already decoded image
    pub fn with_image(mut self, image: DynamicImage) -> Self {
        self.image_size = (image.width(), image.height());
        self.image = OnceLock::from(Ok(Arc::new(image)));
        self
    }

    /// Decoded screenshot, loaded once
    pub fn image(&self) -> Result<Arc<DynamicImage>> {
        self.image
            .get_or_init(|| {
                image::open(&self.image_path)
                    .map(Arc::new)
                    .map_err(|e| format!("{}: {}", self.image_path.display(), e))
            })
            .clone()
            .map_err(ScreenlintError::Image)
    }

    pub fn image_height(&self) -> i32 {
        self.image_size.1 as i32
    }

    pub fn actual_controls(&self) -> impl Iterator<Item = &Control> {
        self.controls.actual_controls()
    }

    /// Texts of all actual controls joined the way language detection expects
    pub fn all_texts(&self) -> String {
        self.actual_controls()
            .filter_map(Control::text)
            .collect::<Vec<_>>()
            .join(". ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "tag": "2024-01-01_120000",
        "views": [
            {"temp_id": 0, "parent": -1, "bounds": [[0, 0], [1080, 1920]], "class": "android.widget.FrameLayout", "visible": true},
            {"temp_id": 1, "parent": 0, "bounds": [[0, 100], [1080, 400]], "class": "android.widget.LinearLayout"},
            {"temp_id": 2, "parent": 1, "bounds": [[10, 110], [300, 130]], "text": "Hello", "resource_id": "id/title"},
            {"temp_id": 3, "parent": 1, "bounds": [[10, 140], [300, 140]], "text": "flat"},
            {"temp_id": 4, "parent": 1, "bounds": [[10, 150], [300, 170]], "text": "hidden", "visible": false}
        ]
    }"#;

    #[test]
    fn test_parse_snapshot() {
        let tree = ControlTree::from_snapshot_json(SNAPSHOT).unwrap();
        assert_eq!(tree.len(), 5);

        let title = tree.get(ControlId(2)).unwrap();
        assert_eq!(title.text(), Some("Hello"));
        assert_eq!(title.bounds, Rect::new(10, 110, 290, 20));
        assert_eq!(tree.parent(title).unwrap().id, ControlId(1));
        assert_eq!(tree.get(ControlId(1)).unwrap().children.len(), 3);
        assert_eq!(tree.roots().count(), 1);
    }

    #[test]
    fn test_actual_controls_skip_hidden_and_empty() {
        let tree = ControlTree::from_snapshot_json(SNAPSHOT).unwrap();
        let ids: Vec<_> = tree.actual_controls().map(|c| c.id.0).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_unknown_parent_and_cycle_are_cut() {
        let json = r#"{"views": [
            {"temp_id": 10, "parent": 11, "bounds": [[0,0],[10,10]]},
            {"temp_id": 11, "parent": 10, "bounds": [[0,0],[10,10]]},
            {"temp_id": 12, "parent": 99, "bounds": [[0,0],[10,10]]}
        ]}"#;
        let tree = ControlTree::from_snapshot_json(json).unwrap();

        // every walk towards a root terminates
        for control in tree.iter() {
            let mut steps = 0;
            let mut current = Some(control);
            while let Some(c) = current {
                current = tree.parent(c);
                steps += 1;
                assert!(steps <= tree.len());
            }
        }
        assert!(tree.get(ControlId(2)).unwrap().parent.is_none());
        assert!(tree.roots().count() >= 2);
    }

    #[test]
    fn test_invalid_snapshot_is_layout_error() {
        let err = ControlTree::from_snapshot_json("not json").unwrap_err();
        assert!(matches!(err, ScreenlintError::Layout(_)));
    }

    #[test]
    fn test_messages_catalog() {
        let json = r#"{"messages": {
            "ok": {"en": "OK", "lt": "Gerai", "en-GB": "OK"},
            "cancel": {"en": "Cancel"}
        }}"#;
        let messages = Messages::from_json(json).unwrap();
        assert_eq!(messages.locales(), vec!["en", "en-GB", "lt"]);
        assert_eq!(messages.locales_by_length(), vec!["en", "lt", "en-GB"]);
        assert_eq!(messages.message("ok", "lt"), Some("Gerai"));
        assert_eq!(messages.message("cancel", "lt"), None);
        assert!(messages.contains_key("cancel"));
    }

    #[test]
    fn test_state_all_texts() {
        let tree = ControlTree::from_snapshot_json(SNAPSHOT).unwrap();
        let state = State::new("a", tree, (1080, 1920), None, Arc::new(AppContext::default()));
        assert_eq!(state.all_texts(), "Hello");
        assert!(state.image().is_err());
    }
}
