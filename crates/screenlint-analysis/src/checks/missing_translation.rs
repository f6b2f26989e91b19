use screenlint_core::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::text::{is_translatable, is_upper_case};
use super::{
    AppCheckResults, AppChecker, AppDefectAnnotation, CheckerRoles, DefectAnnotation,
    RuleChecker, RuleId, StateCheckResults, StateChecker, TextAnalyzer,
};
use crate::context::{AppContext, State};

/// Missing or suspiciously identical translations, and untranslated keys on screen
pub struct MissingTranslationCheck {
    analyzer: Arc<dyn TextAnalyzer>,
}

impl MissingTranslationCheck {
    pub const RULE: RuleId = RuleId {
        id: 14,
        code: "SL1",
        name: "MissingTranslation",
    };

    pub fn new(analyzer: Arc<dyn TextAnalyzer>) -> Self {
        Self { analyzer }
    }

    fn spelled_in(&self, language: &str, text: &str) -> bool {
        self.analyzer
            .is_spelling_correct(&text.to_lowercase(), &[language.to_string()])
    }

    /// A bare message key shown instead of its translation
    fn is_placeholder(&self, text: &str, state: &State, languages: &[String]) -> bool {
        if text.is_empty() || is_upper_case(text) || text.contains(' ') {
            return false;
        }
        state.app.messages.contains_key(text) && !self.analyzer.is_spelling_correct(text, languages)
    }
}

/// `"en-US"` -> `"en-"`, the prefix regional variants of a language share
fn regional_prefix(language: &str) -> String {
    let base: String = language.chars().take(2).collect();
    format!("{}-", base)
}

impl AppChecker for MissingTranslationCheck {
    fn analyze_app(&self, app: &AppContext, results: &mut AppCheckResults) -> Result<()> {
        let messages = &app.messages;
        let languages = messages.locales_by_length();

        for key in messages.keys() {
            let Some(translations) = messages.translations(key) else {
                continue;
            };
            let mut missing = Vec::new();
            let mut same: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

            for (i, source_language) in languages.iter().enumerate() {
                let Some(source) = translations.get(source_language) else {
                    missing.push(source_language.as_str());
                    continue;
                };
                if !is_translatable(source) {
                    continue;
                }

                let prefix = regional_prefix(source_language);
                for target_language in &languages[i + 1..] {
                    if target_language.starts_with(&prefix) {
                        break;
                    }
                    let Some(target) = translations.get(target_language) else {
                        continue;
                    };
                    if source == target
                        && (!self.spelled_in(source_language, source)
                            || !self.spelled_in(target_language, target))
                    {
                        let locales = same.entry(source.as_str()).or_default();
                        locales.insert(source_language.as_str());
                        locales.insert(target_language.as_str());
                    }
                }
            }

            if !missing.is_empty() {
                results.add(AppDefectAnnotation::new(
                    Self::RULE,
                    format!("Missing for [{}]: {}", key, missing.join(",")),
                ));
            }
            for (text, locales) in same {
                results.add(AppDefectAnnotation::new(
                    Self::RULE,
                    format!(
                        "Same for [{}]: [{}]: {}",
                        key,
                        text,
                        locales.into_iter().collect::<Vec<_>>().join(",")
                    ),
                ));
            }
        }
        Ok(())
    }
}

impl StateChecker for MissingTranslationCheck {
    fn analyze_state(&self, state: &State, results: &mut StateCheckResults) -> Result<()> {
        if state.app.messages.is_empty() {
            return Ok(());
        }
        let languages = self.analyzer.detect_languages(&state.all_texts());

        for control in state.actual_controls() {
            let Some(text) = control.text() else {
                continue;
            };
            if is_translatable(text) && self.is_placeholder(text, state, &languages) {
                results.add(DefectAnnotation::new(
                    Self::RULE,
                    Some(control.bounds),
                    format!("untranslated: {}", text),
                ));
            }
        }
        Ok(())
    }
}

impl RuleChecker for MissingTranslationCheck {
    fn rule(&self) -> RuleId {
        Self::RULE
    }

    fn roles(&self) -> CheckerRoles<'_> {
        CheckerRoles::Both(self, self)
    }
}
