use regex::Regex;
use screenlint_core::Result;
use std::sync::{Arc, LazyLock};

use super::{
    AppCheckResults, AppChecker, AppDefectAnnotation, CheckerRoles, DefectAnnotation,
    RuleChecker, RuleId, StateCheckResults, StateChecker, TextAnalyzer,
};
use crate::context::{AppContext, Control, State};

/// `printf` placeholders such as `%s` and `%1$d`
static FORMAT_ARGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%(\d+\$)?[sd]").expect("valid placeholder pattern"));

/// Spelling of on-screen text and of the message catalog
pub struct GrammarCheck {
    analyzer: Arc<dyn TextAnalyzer>,
}

impl GrammarCheck {
    pub const RULE: RuleId = RuleId {
        id: 2,
        code: "BadSpelling",
        name: "Grammar",
    };

    pub fn new(analyzer: Arc<dyn TextAnalyzer>) -> Self {
        Self { analyzer }
    }

    /// Misspelled words of the control's text, then of its content description
    fn control_mistakes(&self, control: &Control, languages: &[String]) -> Option<String> {
        [control.text(), control.content_description()]
            .into_iter()
            .flatten()
            .map(|text| self.analyzer.misspellings(text, languages))
            .find(|words| !words.is_empty())
            .map(|words| format!("Misspelled: {}", words.join(", ")))
    }
}

impl StateChecker for GrammarCheck {
    fn analyze_state(&self, state: &State, results: &mut StateCheckResults) -> Result<()> {
        let languages = self.analyzer.detect_languages(&state.all_texts());
        let Some(dominant) = languages.first() else {
            return Ok(());
        };
        if *dominant == state.app.base_language {
            return Ok(());
        }

        for control in state.actual_controls() {
            if let Some(message) = self.control_mistakes(control, &languages) {
                results.add(DefectAnnotation::new(Self::RULE, Some(control.bounds), message));
                return Ok(());
            }
        }
        Ok(())
    }
}

impl AppChecker for GrammarCheck {
    fn analyze_app(&self, app: &AppContext, results: &mut AppCheckResults) -> Result<()> {
        let locales = app.messages.locales_by_length();
        for key in app.messages.keys() {
            for locale in &locales {
                let Some(message) = app.messages.message(key, locale) else {
                    continue;
                };
                let message = FORMAT_ARGS.replace_all(message, "");
                let mistakes = self
                    .analyzer
                    .misspellings(&message, std::slice::from_ref(locale));
                if !mistakes.is_empty() {
                    results.add(AppDefectAnnotation::new(
                        Self::RULE,
                        format!("[{}] {}: {}", key, locale, mistakes.join(", ")),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl RuleChecker for GrammarCheck {
    fn rule(&self) -> RuleId {
        Self::RULE
    }

    fn roles(&self) -> CheckerRoles<'_> {
        CheckerRoles::Both(self, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::state_with_views;
    use crate::checks::DictionaryTextAnalyzer;
    use crate::context::Messages;

    fn check() -> GrammarCheck {
        GrammarCheck::new(Arc::new(
            DictionaryTextAnalyzer::new()
                .with_words("en", ["open", "the", "settings", "menu", "save", "file", "name", "is"])
                .with_words("lt", ["atidaryti", "nustatymai", "meniu", "vardas"]),
        ))
    }

    fn run(views: &str) -> StateCheckResults {
        let state = state_with_views(views);
        let mut results = StateCheckResults::new();
        check().analyze_state(&state, &mut results).unwrap();
        results
    }

    #[test]
    fn test_first_misspelled_control_reported() {
        let results = run(
            r#"{"temp_id": 0, "parent": -1, "bounds": [[0, 0], [1080, 1920]]},
               {"temp_id": 1, "parent": 0, "bounds": [[0, 100], [500, 160]], "text": "Open the settings menu"},
               {"temp_id": 2, "parent": 0, "bounds": [[0, 200], [500, 260]], "text": "Save the flie"},
               {"temp_id": 3, "parent": 0, "bounds": [[0, 300], [500, 360]], "text": "Teh menu"}"#,
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results.annotations()[0].message, "Misspelled: flie");
        assert_eq!(results.annotations()[0].bounds.unwrap().y, 200);
    }

    #[test]
    fn test_content_description_checked() {
        let results = run(
            r#"{"temp_id": 0, "parent": -1, "bounds": [[0, 0], [1080, 1920]], "text": "Open the settings menu"},
               {"temp_id": 1, "parent": 0, "bounds": [[0, 100], [100, 160]], "content_description": "Sve file"}"#,
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results.annotations()[0].message, "Misspelled: sve");
    }

    #[test]
    fn test_base_language_skipped() {
        let results = run(
            r#"{"temp_id": 0, "parent": -1, "bounds": [[0, 0], [1080, 1920]]},
               {"temp_id": 1, "parent": 0, "bounds": [[0, 100], [500, 160]], "text": "Atidaryti nustatymai meniu"},
               {"temp_id": 2, "parent": 0, "bounds": [[0, 200], [500, 260]], "text": "vardaz"}"#,
        );
        assert!(results.is_empty());
    }

    #[test]
    fn test_no_detected_language_skipped() {
        let results = run(
            r#"{"temp_id": 0, "parent": -1, "bounds": [[0, 0], [1080, 1920]], "text": "qwv zzk"}"#,
        );
        assert!(results.is_empty());
    }

    #[test]
    fn test_format_args_removed() {
        assert_eq!(FORMAT_ARGS.replace_all("%s of %2$d, 100%", ""), " of , 100%");
    }

    #[test]
    fn test_catalog_spelling() {
        let messages = Messages::from_json(
            r#"{"messages": {
                "greeting": {"en": "File name is %s", "lt": "Vardas %1$s"},
                "typo": {"en": "Opne menu"}
            }}"#,
        )
        .unwrap();
        let app = AppContext::new("com.example.app", messages);
        let mut results = AppCheckResults::new();
        check().analyze_app(&app, &mut results).unwrap();

        let messages: Vec<_> = results.annotations().iter().map(|a| a.message.as_str()).collect();
        assert_eq!(messages, vec!["[typo] en: opne"]);
    }
}
