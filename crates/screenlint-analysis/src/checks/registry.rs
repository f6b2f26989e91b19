//! Checker registration, unique by rule code

use screenlint_core::config::AnalysisConfig;
use screenlint_core::{Result, ScreenlintError};
use std::sync::Arc;
use tracing::debug;

use super::{
    AppChecker, GrammarCheck, MissingTranslationCheck, ObscuredTextCheck, RuleChecker, RuleId,
    StateChecker, TextAnalyzer, UnreadableTextCheck,
};
use crate::ocr::TextExtractor;

/// Ordered set of checkers, unique by rule code
#[derive(Default)]
pub struct RuleCheckerRegistry {
    checkers: Vec<Arc<dyn RuleChecker>>,
}

impl RuleCheckerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard checkers; the OCR-based one only when an extractor is given
    pub fn default_set(
        config: &AnalysisConfig,
        analyzer: Arc<dyn TextAnalyzer>,
        extractor: Option<Arc<TextExtractor>>,
    ) -> Self {
        let mut checkers: Vec<Arc<dyn RuleChecker>> = vec![
            Arc::new(UnreadableTextCheck::new(config.min_text_height_mm)),
            Arc::new(MissingTranslationCheck::new(Arc::clone(&analyzer))),
            Arc::new(GrammarCheck::new(analyzer)),
        ];
        if let Some(extractor) = extractor {
            checkers.push(Arc::new(ObscuredTextCheck::new(extractor)));
        }
        Self { checkers }
    }

    /// Append a checker; a second checker with the same rule code is rejected
    pub fn register(&mut self, checker: Arc<dyn RuleChecker>) -> Result<()> {
        let rule = checker.rule();
        if self.checkers.iter().any(|c| c.rule().code == rule.code) {
            return Err(ScreenlintError::Config(format!(
                "Rule {} is already registered",
                rule.code
            )));
        }
        debug!("Registered checker {}", rule);
        self.checkers.push(checker);
        Ok(())
    }

    pub fn rules(&self) -> Vec<RuleId> {
        self.checkers.iter().map(|c| c.rule()).collect()
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }

    /// State-role checkers in registration order
    pub fn state_checkers(&self) -> Vec<(RuleId, &dyn StateChecker)> {
        self.checkers
            .iter()
            .filter_map(|c| c.roles().as_state().map(|s| (c.rule(), s)))
            .collect()
    }

    /// App-role checkers in registration order
    pub fn app_checkers(&self) -> Vec<(RuleId, &dyn AppChecker)> {
        self.checkers
            .iter()
            .filter_map(|c| c.roles().as_app().map(|a| (c.rule(), a)))
            .collect()
    }
}
