//! Decision Metrics - Session analytics for ethical-decision study logs
//!
//! Scores one participant session from its raw interaction log through a
//! deterministic pipeline: event log normalization → per-scenario resolution
//! → value alignment evaluation → composite index calculation.
//!
//! ## Modules
//!
//! - **Pipeline**: one-call scoring (`compute_session_metrics`) and JSON in/out
//! - **Encoder**: structured JSON document and flat CSV record exports

pub mod alignment;
pub mod composite;
pub mod config;
pub mod encoder;
pub mod error;
pub mod normalizer;
pub mod pipeline;
pub mod resolver;
pub mod types;

pub use alignment::{AlignmentEvaluator, RankingHistory};
pub use composite::CompositeIndexCalculator;
pub use config::{EngineConfig, ReferenceMaxima};
pub use encoder::{MetricsDocument, MetricsEncoder};
pub use error::AnalyticsError;
pub use normalizer::EventLogNormalizer;
pub use pipeline::{
    compute_session_metrics, parse_input, session_json_to_metrics, MetricsProcessor, SessionInput,
};
pub use resolver::ScenarioResolver;
pub use types::{
    AlignmentChange, DataQualityWarning, Event, EventKind, OptionRef, OutcomeVector,
    RankingEntry, ScenarioOutcome, ScenarioRecord, SessionAnalysis, SessionMetrics, ValueLabel,
    ValueRanking,
};

/// Engine version embedded in all metrics documents
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for metrics documents
pub const PRODUCER_NAME: &str = "decision-metrics";
