use screenlint_core::Result;

use super::{
    CheckerRoles, DefectAnnotation, RuleChecker, RuleId, StateCheckResults, StateChecker,
};
use crate::context::{Control, State};

/// Text physically too small to read; reports the first such control only
pub struct UnreadableTextCheck {
    min_height_mm: f64,
}

impl UnreadableTextCheck {
    pub const RULE: RuleId = RuleId {
        id: 19,
        code: "TS2",
        name: "UnreadableText",
    };

    pub const DEFAULT_MIN_HEIGHT_MM: f64 = 2.0;

    pub fn new(min_height_mm: f64) -> Self {
        Self { min_height_mm }
    }

    fn too_small(&self, control: &Control, state: &State, height_mm: f64) -> bool {
        if height_mm >= self.min_height_mm {
            return false;
        }
        let bottom = control.bounds.bottom();
        // text cut by the screen edge
        if bottom >= state.image_height() {
            return false;
        }
        // text cut by its container
        if let Some(parent) = state.controls.parent(control) {
            if bottom >= parent.bounds.bottom() {
                return false;
            }
        }
        true
    }
}

impl Default for UnreadableTextCheck {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MIN_HEIGHT_MM)
    }
}

impl StateChecker for UnreadableTextCheck {
    fn analyze_state(&self, state: &State, results: &mut StateCheckResults) -> Result<()> {
        let Some(device) = state.test_device.as_ref() else {
            return Ok(());
        };

        for control in state.actual_controls() {
            let Some(text) = control.text() else {
                continue;
            };
            if control.bounds.height <= 3 || control.bounds.width <= 3 {
                continue;
            }
            let Some(height_mm) = device.physical_size_mm(control.bounds.height) else {
                return Ok(());
            };

            if self.too_small(control, state, height_mm) {
                results.add(DefectAnnotation::new(
                    Self::RULE,
                    Some(control.bounds),
                    format!(
                        "Text : [{}] too small {:.2}mm {}",
                        text, height_mm, control.bounds
                    ),
                ));
                return Ok(());
            }
        }
        Ok(())
    }
}

impl RuleChecker for UnreadableTextCheck {
    fn rule(&self) -> RuleId {
        Self::RULE
    }

    fn roles(&self) -> CheckerRoles<'_> {
        CheckerRoles::StateOnly(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::state_with_views;

    // 1080x1920 at 5": 20 px is about 1.15 mm, 40 px about 2.31 mm
    const ROOT: &str = r#"{"temp_id": 0, "parent": -1, "bounds": [[0, 0], [1080, 1920]]}"#;

    fn run(views: &str) -> StateCheckResults {
        let state = state_with_views(&format!("{},{}", ROOT, views));
        let mut results = StateCheckResults::new();
        UnreadableTextCheck::default()
            .analyze_state(&state, &mut results)
            .unwrap();
        results
    }

    #[test]
    fn test_small_text_flagged_once() {
        let results = run(
            r#"{"temp_id": 1, "parent": 0, "bounds": [[10, 100], [300, 120]], "text": "Terms apply"},
               {"temp_id": 2, "parent": 0, "bounds": [[10, 200], [300, 220]], "text": "Also tiny"}"#,
        );
        assert_eq!(results.len(), 1);
        let annotation = &results.annotations()[0];
        assert_eq!(annotation.rule.code, "TS2");
        assert!(annotation.message.contains("[Terms apply]"));
        assert!(annotation.message.contains("1.15mm"));
        assert_eq!(annotation.bounds.unwrap().height, 20);
    }

    #[test]
    fn test_readable_text_not_flagged() {
        let results = run(
            r#"{"temp_id": 1, "parent": 0, "bounds": [[10, 100], [300, 140]], "text": "Big enough"}"#,
        );
        assert!(results.is_empty());
    }

    #[test]
    fn test_tiny_bounds_and_blank_text_ignored() {
        let results = run(
            r#"{"temp_id": 1, "parent": 0, "bounds": [[10, 100], [13, 120]], "text": "narrow"},
               {"temp_id": 2, "parent": 0, "bounds": [[10, 200], [300, 220]], "text": "   "}"#,
        );
        assert!(results.is_empty());
    }

    #[test]
    fn test_screen_edge_excluded() {
        let results = run(
            r#"{"temp_id": 1, "parent": 0, "bounds": [[10, 1900], [300, 1920]], "text": "footer"}"#,
        );
        assert!(results.is_empty());
    }

    #[test]
    fn test_parent_edge_excluded() {
        let results = run(
            r#"{"temp_id": 1, "parent": 0, "bounds": [[0, 100], [1080, 200]]},
               {"temp_id": 2, "parent": 1, "bounds": [[10, 180], [300, 200]], "text": "clipped"}"#,
        );
        assert!(results.is_empty());
    }

    #[test]
    fn test_without_device_skipped() {
        let mut state = state_with_views(&format!(
            "{},{}",
            ROOT, r#"{"temp_id": 1, "parent": 0, "bounds": [[10, 100], [300, 120]], "text": "x y"}"#
        ));
        state.test_device = None;
        let mut results = StateCheckResults::new();
        UnreadableTextCheck::default()
            .analyze_state(&state, &mut results)
            .unwrap();
        assert!(results.is_empty());
    }
}
