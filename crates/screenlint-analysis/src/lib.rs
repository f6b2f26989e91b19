//! Screenshot defect detection
//!
//! Captures produced by an exploration run are paired by [`ingest`], loaded into
//! [`State`]s, passed through the registered rule checkers by the [`CheckerEngine`]
//! and recorded as defects by the [`ResultsCollector`]. [`AnalysisPipeline`] ties the
//! steps together for one run.

pub mod checks;
pub mod collector;
pub mod context;
pub mod ingest;
pub mod ocr;
pub mod pipeline;

pub use checks::{
    AppCheckResults, CheckerEngine, DictionaryTextAnalyzer, EngineReport, RuleCheckerRegistry,
    RuleId, StateCheckResults, TextAnalyzer,
};
pub use collector::{render_proof, ResultsCollector};
pub use context::{AppContext, Control, ControlId, ControlTree, Messages, State};
pub use ingest::{CapturePair, IngestEvent};
pub use ocr::{OcrEngine, ScriptedOcr, TesseractOcr, TextExtractor};
pub use pipeline::{AnalysisPipeline, AnalysisSummary, RunContext};
