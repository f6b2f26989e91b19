//! Rule checker framework
//!
//! A checker examines one [`State`] (state role), the [`AppContext`] of a run (app
//! role), or both. Concrete checkers advertise their roles through
//! [`RuleChecker::roles`] and the engine dispatches on that.

mod engine;
mod grammar;
mod missing_translation;
mod obscured_text;
mod registry;
mod text;
mod unreadable_text;

pub use engine::{CheckerEngine, EngineReport};
pub use grammar::GrammarCheck;
pub use missing_translation::MissingTranslationCheck;
pub use obscured_text::ObscuredTextCheck;
pub use registry::RuleCheckerRegistry;
pub use text::{is_translatable, similarity, DictionaryTextAnalyzer, TextAnalyzer};
pub use unreadable_text::UnreadableTextCheck;

use screenlint_core::{Rect, Result};

use crate::context::{AppContext, State};

/// Stable identity of a rule; `code` keys the persisted defect type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId {
    pub id: u32,
    pub code: &'static str,
    pub name: &'static str,
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code, self.name)
    }
}

/// Finding on one state
#[derive(Debug, Clone, PartialEq)]
pub struct DefectAnnotation {
    pub rule: RuleId,
    pub bounds: Option<Rect>,
    pub message: String,
}

impl DefectAnnotation {
    pub fn new(rule: RuleId, bounds: Option<Rect>, message: impl Into<String>) -> Self {
        Self {
            rule,
            bounds,
            message: message.into(),
        }
    }
}

/// Finding on the app as a whole
#[derive(Debug, Clone, PartialEq)]
pub struct AppDefectAnnotation {
    pub rule: RuleId,
    pub message: String,
}

impl AppDefectAnnotation {
    pub fn new(rule: RuleId, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
        }
    }
}

/// Annotations for one state, in the order they were added
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateCheckResults {
    annotations: Vec<DefectAnnotation>,
}

impl StateCheckResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, annotation: DefectAnnotation) {
        self.annotations.push(annotation);
    }

    pub fn annotations(&self) -> &[DefectAnnotation] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Any annotation needs a proof image
    pub fn has_bounds(&self) -> bool {
        self.annotations.iter().any(|a| a.bounds.is_some())
    }

    fn append(&mut self, other: StateCheckResults) {
        self.annotations.extend(other.annotations);
    }
}

/// Annotations for the app context of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppCheckResults {
    annotations: Vec<AppDefectAnnotation>,
}

impl AppCheckResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, annotation: AppDefectAnnotation) {
        self.annotations.push(annotation);
    }

    pub fn annotations(&self) -> &[AppDefectAnnotation] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    fn append(&mut self, other: AppCheckResults) {
        self.annotations.extend(other.annotations);
    }
}

/// Per-state role; must not keep state between calls
pub trait StateChecker: Send + Sync {
    fn analyze_state(&self, state: &State, results: &mut StateCheckResults) -> Result<()>;
}

/// Per-run role over the shared app context
pub trait AppChecker: Send + Sync {
    fn analyze_app(&self, app: &AppContext, results: &mut AppCheckResults) -> Result<()>;
}

/// Roles a checker plays
#[derive(Clone, Copy)]
pub enum CheckerRoles<'a> {
    StateOnly(&'a dyn StateChecker),
    AppOnly(&'a dyn AppChecker),
    Both(&'a dyn StateChecker, &'a dyn AppChecker),
}

impl<'a> CheckerRoles<'a> {
    pub fn as_state(&self) -> Option<&'a dyn StateChecker> {
        match *self {
            Self::StateOnly(s) | Self::Both(s, _) => Some(s),
            Self::AppOnly(_) => None,
        }
    }

    pub fn as_app(&self) -> Option<&'a dyn AppChecker> {
        match *self {
            Self::AppOnly(a) | Self::Both(_, a) => Some(a),
            Self::StateOnly(_) => None,
        }
    }
}

/// A registered rule
pub trait RuleChecker: Send + Sync {
    fn rule(&self) -> RuleId;
    fn roles(&self) -> CheckerRoles<'_>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::context::{ControlTree, Messages};
    use screenlint_core::TestDevice;
    use std::sync::Arc;

    /// State built from inline views on a 1080x1920, 5" device
    pub fn state_with_views(views: &str) -> State {
        state_with_views_and_messages(views, Messages::default())
    }

    pub fn state_with_views_and_messages(views: &str, messages: Messages) -> State {
        let json = format!(r#"{{"views": [{}]}}"#, views);
        let tree = ControlTree::from_snapshot_json(&json).unwrap();
        let app = Arc::new(AppContext::new("com.example.app", messages));
        State::new(
            "test",
            tree,
            (1080, 1920),
            Some(TestDevice::new("Pixel", 1080, 1920, 5.0)),
            app,
        )
    }
}
