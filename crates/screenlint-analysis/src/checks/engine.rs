//! Runs registered checkers in isolation and merges their findings

use rayon::prelude::*;
use screenlint_core::config::{AnalysisConfig, OcrConfig};
use screenlint_core::{Result, ScreenlintError};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    AppCheckResults, DictionaryTextAnalyzer, RuleCheckerRegistry, RuleId, StateCheckResults,
    TextAnalyzer,
};
use crate::context::{AppContext, State};
use crate::ocr::{TesseractOcr, TextExtractor};

/// Checker failures seen by the engine, per rule code
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineReport {
    pub failures: BTreeMap<&'static str, usize>,
}

impl EngineReport {
    pub fn total_failures(&self) -> usize {
        self.failures.values().sum()
    }

    pub fn merge(&mut self, other: EngineReport) {
        for (code, count) in other.failures {
            *self.failures.entry(code).or_default() += count;
        }
    }

    fn record(&mut self, rule: RuleId) {
        *self.failures.entry(rule.code).or_default() += 1;
    }
}

/// Run one checker on its own buffer; errors and panics become `CheckerFailure`
fn isolated<T, F>(rule: RuleId, subject: &str, run: F) -> Option<T>
where
    F: FnOnce() -> Result<T>,
{
    let failure = match catch_unwind(AssertUnwindSafe(run)) {
        Ok(Ok(buffer)) => return Some(buffer),
        Ok(Err(e)) => e.to_string(),
        Err(panic) => panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panicked".to_string()),
    };
    let error = ScreenlintError::CheckerFailure {
        checker: rule.code.to_string(),
        message: failure,
    };
    warn!("{} on {}, skipping its results", error, subject);
    None
}

/// Runs every registered checker over states and app contexts
pub struct CheckerEngine {
    registry: Arc<RuleCheckerRegistry>,
    parallel: bool,
}

impl CheckerEngine {
    pub fn new(registry: Arc<RuleCheckerRegistry>) -> Self {
        Self {
            registry,
            parallel: true,
        }
    }

    /// Standard checkers configured from `screenlint.toml`
    ///
    /// Word lists come from `dictionaries_dir`; the OCR checker is added when OCR is enabled.
    pub fn from_config(analysis: &AnalysisConfig, ocr: &OcrConfig) -> Result<Self> {
        let analyzer: Arc<dyn TextAnalyzer> = match &analysis.dictionaries_dir {
            Some(dir) => Arc::new(DictionaryTextAnalyzer::load_dir(dir)?),
            None => Arc::new(DictionaryTextAnalyzer::new()),
        };
        let extractor = ocr
            .enabled
            .then(|| Arc::new(TextExtractor::new(Arc::new(TesseractOcr::new(ocr)))));

        let registry = RuleCheckerRegistry::default_set(analysis, analyzer, extractor);
        let codes: Vec<_> = registry.rules().iter().map(|r| r.code).collect();
        info!("Checkers: {}", codes.join(", "));
        Ok(Self::new(Arc::new(registry)).with_parallel(analysis.parallel))
    }

    /// `false` runs state checkers one after another instead of on the rayon pool
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn registry(&self) -> &RuleCheckerRegistry {
        &self.registry
    }

    /// Every state checker on `state`; results merged in registration order
    pub fn analyze_state(&self, state: &State) -> (StateCheckResults, EngineReport) {
        let checkers = self.registry.state_checkers();
        let run = |(rule, checker): &(RuleId, &dyn super::StateChecker)| {
            let outcome = isolated(*rule, &state.name, || {
                let mut buffer = StateCheckResults::new();
                checker.analyze_state(state, &mut buffer)?;
                Ok(buffer)
            });
            (*rule, outcome)
        };

        let outcomes: Vec<_> = if self.parallel {
            checkers.par_iter().map(run).collect()
        } else {
            checkers.iter().map(run).collect()
        };

        let mut results = StateCheckResults::new();
        let mut report = EngineReport::default();
        for (rule, outcome) in outcomes {
            match outcome {
                Some(buffer) => results.append(buffer),
                None => report.record(rule),
            }
        }
        (results, report)
    }

    /// Every app checker once on the shared context
    pub fn analyze_app(&self, app: &AppContext) -> (AppCheckResults, EngineReport) {
        let mut results = AppCheckResults::new();
        let mut report = EngineReport::default();

        for (rule, checker) in self.registry.app_checkers() {
            let outcome = isolated(rule, &app.package_name, || {
                let mut buffer = AppCheckResults::new();
                checker.analyze_app(app, &mut buffer)?;
                Ok(buffer)
            });
            match outcome {
                Some(buffer) => results.append(buffer),
                None => report.record(rule),
            }
        }
        (results, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::state_with_views;
    use crate::checks::{
        AppChecker, AppDefectAnnotation, CheckerRoles, DefectAnnotation, RuleChecker,
        StateChecker, UnreadableTextCheck,
    };

    enum Behavior {
        Annotate,
        Fail,
        Panic,
    }

    struct FakeCheck {
        rule: RuleId,
        behavior: Behavior,
    }

    impl FakeCheck {
        fn new(code: &'static str, behavior: Behavior) -> Self {
            Self {
                rule: RuleId {
                    id: 100,
                    code,
                    name: "Fake",
                },
                behavior,
            }
        }

        fn act(&self) -> Result<()> {
            match self.behavior {
                Behavior::Annotate => Ok(()),
                Behavior::Fail => Err(ScreenlintError::Other("rule crashed".to_string())),
                Behavior::Panic => panic!("rule panicked"),
            }
        }
    }

    impl StateChecker for FakeCheck {
        fn analyze_state(&self, _state: &State, results: &mut StateCheckResults) -> Result<()> {
            // partial output must be discarded on failure
            results.add(DefectAnnotation::new(self.rule, None, self.rule.code));
            self.act()
        }
    }

    impl AppChecker for FakeCheck {
        fn analyze_app(&self, _app: &AppContext, results: &mut AppCheckResults) -> Result<()> {
            results.add(AppDefectAnnotation::new(self.rule, self.rule.code));
            self.act()
        }
    }

    impl RuleChecker for FakeCheck {
        fn rule(&self) -> RuleId {
            self.rule
        }

        fn roles(&self) -> CheckerRoles<'_> {
            CheckerRoles::Both(self, self)
        }
    }

    fn engine(parallel: bool) -> CheckerEngine {
        let mut registry = RuleCheckerRegistry::new();
        registry.register(Arc::new(FakeCheck::new("A", Behavior::Annotate))).unwrap();
        registry.register(Arc::new(FakeCheck::new("B", Behavior::Fail))).unwrap();
        registry.register(Arc::new(FakeCheck::new("C", Behavior::Panic))).unwrap();
        registry.register(Arc::new(FakeCheck::new("D", Behavior::Annotate))).unwrap();
        CheckerEngine::new(Arc::new(registry)).with_parallel(parallel)
    }

    fn state() -> State {
        state_with_views(r#"{"temp_id": 0, "parent": -1, "bounds": [[0, 0], [1080, 1920]]}"#)
    }

    #[test]
    fn test_failures_isolated_sequential() {
        let (results, report) = engine(false).analyze_state(&state());
        let codes: Vec<_> = results.annotations().iter().map(|a| a.message.as_str()).collect();
        assert_eq!(codes, vec!["A", "D"]);
        assert_eq!(report.failures.get("B"), Some(&1));
        assert_eq!(report.failures.get("C"), Some(&1));
        assert_eq!(report.total_failures(), 2);
    }

    #[test]
    fn test_failures_isolated_parallel_keeps_order() {
        let engine = engine(true);
        for _ in 0..3 {
            let (results, report) = engine.analyze_state(&state());
            let codes: Vec<_> = results.annotations().iter().map(|a| a.message.as_str()).collect();
            assert_eq!(codes, vec!["A", "D"]);
            assert_eq!(report.total_failures(), 2);
        }
    }

    #[test]
    fn test_app_failures_isolated() {
        let (results, report) = engine(false).analyze_app(&AppContext::default());
        assert_eq!(results.len(), 2);
        assert_eq!(report.total_failures(), 2);
    }

    #[test]
    fn test_real_checker_alongside_failing_one() {
        let mut registry = RuleCheckerRegistry::new();
        registry.register(Arc::new(FakeCheck::new("B", Behavior::Fail))).unwrap();
        registry.register(Arc::new(UnreadableTextCheck::default())).unwrap();
        let engine = CheckerEngine::new(Arc::new(registry));

        let state = state_with_views(
            r#"{"temp_id": 0, "parent": -1, "bounds": [[0, 0], [1080, 1920]]},
               {"temp_id": 1, "parent": 0, "bounds": [[10, 100], [300, 120]], "text": "tiny"}"#,
        );
        let (results, report) = engine.analyze_state(&state);
        assert_eq!(results.len(), 1);
        assert_eq!(results.annotations()[0].rule.code, "TS2");
        assert_eq!(report.total_failures(), 1);
    }

    #[test]
    fn test_from_config() {
        let engine = CheckerEngine::from_config(&AnalysisConfig::default(), &OcrConfig::default())
            .unwrap();
        assert_eq!(engine.registry().len(), 3);

        let ocr = OcrConfig {
            enabled: true,
            ..OcrConfig::default()
        };
        let engine = CheckerEngine::from_config(&AnalysisConfig::default(), &ocr).unwrap();
        assert_eq!(engine.registry().len(), 4);
    }

    #[test]
    fn test_report_merge() {
        let mut a = EngineReport::default();
        a.record(UnreadableTextCheck::RULE);
        let mut b = EngineReport::default();
        b.record(UnreadableTextCheck::RULE);
        a.merge(b);
        assert_eq!(a.failures.get("TS2"), Some(&2));
    }
}
