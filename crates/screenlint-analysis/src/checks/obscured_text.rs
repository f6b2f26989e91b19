use screenlint_core::Result;
use std::sync::Arc;

use super::text::similarity;
use super::{CheckerRoles, DefectAnnotation, RuleChecker, RuleId, StateCheckResults, StateChecker};
use crate::context::State;
use crate::ocr::TextExtractor;

/// Similarity at which recognized text counts as the control's text
pub const MIN_SIMILARITY: f64 = 0.8;

/// Control text that OCR cannot read back from the screenshot
pub struct ObscuredTextCheck {
    extractor: Arc<TextExtractor>,
}

impl ObscuredTextCheck {
    pub const RULE: RuleId = RuleId {
        id: 21,
        code: "TC1",
        name: "ObscuredText",
    };

    pub fn new(extractor: Arc<TextExtractor>) -> Self {
        Self { extractor }
    }
}

impl StateChecker for ObscuredTextCheck {
    fn analyze_state(&self, state: &State, results: &mut StateCheckResults) -> Result<()> {
        let mut screen = None;

        for control in state.actual_controls() {
            let Some(text) = control.text() else {
                continue;
            };
            if screen.is_none() {
                screen = Some(state.image()?);
            }
            let Some(image) = screen.as_deref() else {
                continue;
            };

            let accept = |recognized: &str| similarity(recognized, text) >= MIN_SIMILARITY;
            let extraction = self.extractor.extract_traced(image, control.bounds, &accept);

            // no stage read anything
            if !extraction.recognized || extraction.accepted {
                continue;
            }
            results.add(DefectAnnotation::new(
                Self::RULE,
                Some(control.bounds),
                format!(
                    "Text [{}] clipped or obscured, recognized [{}]",
                    text, extraction.text
                ),
            ));
        }
        Ok(())
    }
}

impl RuleChecker for ObscuredTextCheck {
    fn rule(&self) -> RuleId {
        Self::RULE
    }

    fn roles(&self) -> CheckerRoles<'_> {
        CheckerRoles::StateOnly(self)
    }
}
