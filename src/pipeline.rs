//! Pipeline orchestration
//!
//! This module provides the public API for scoring a session. It chains the
//! four stages, each taking the previous stage's output:
//! Normalizer → Resolver → Alignment Evaluator → Composite Index Calculator.

use crate::alignment::{AlignmentEvaluator, RankingHistory};
use crate::composite::CompositeIndexCalculator;
use crate::config::EngineConfig;
use crate::encoder::MetricsEncoder;
use crate::error::AnalyticsError;
use crate::normalizer::EventLogNormalizer;
use crate::resolver::ScenarioResolver;
use crate::types::{Event, RankingEntry, ScenarioOutcome, SessionAnalysis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Everything the engine needs to score one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInput {
    pub session_id: String,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub outcomes: Vec<ScenarioOutcome>,
    #[serde(default, alias = "rankings")]
    pub ranking_history: Vec<RankingEntry>,
}

/// Parse a session input document
pub fn parse_input(json: &str) -> Result<SessionInput, AnalyticsError> {
    serde_json::from_str(json).map_err(|e| AnalyticsError::ParseError(e.to_string()))
}

/// Score one session with the default configuration.
///
/// # Arguments
/// * `session_id` - Session being scored; every event must belong to it
/// * `events` - Raw event log, in any order
/// * `outcomes` - Outcome vector of each confirmed scenario
/// * `ranking_history` - Declared value rankings with their timestamps
///
/// # Example
/// ```ignore
/// let analysis = compute_session_metrics("s-1", &events, &outcomes, &rankings)?;
/// println!("{:?}", analysis.metrics.value_consistency_index);
/// ```
pub fn compute_session_metrics(
    session_id: &str,
    events: &[Event],
    outcomes: &[ScenarioOutcome],
    ranking_history: &[RankingEntry],
) -> Result<SessionAnalysis, AnalyticsError> {
    MetricsProcessor::new().compute(session_id, events, outcomes, ranking_history)
}

/// Convert a session input JSON document to a metrics JSON document (stateless, one-shot).
pub fn session_json_to_metrics(input_json: String) -> Result<String, AnalyticsError> {
    MetricsProcessor::new().process(&input_json)
}

/// Processor holding an engine configuration.
///
/// Holds no per-session state; one processor can score any number of sessions,
/// from any number of threads.
#[derive(Debug, Clone, Default)]
pub struct MetricsProcessor {
    config: EngineConfig,
    encoder: MetricsEncoder,
}

impl MetricsProcessor {
    /// Create a processor with the study's default scoring
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a processor with a custom configuration
    pub fn with_config(config: EngineConfig) -> Result<Self, AnalyticsError> {
        config.validate()?;
        Ok(Self {
            config,
            encoder: MetricsEncoder::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the full pipeline over one session
    pub fn compute(
        &self,
        session_id: &str,
        events: &[Event],
        outcomes: &[ScenarioOutcome],
        ranking_history: &[RankingEntry],
    ) -> Result<SessionAnalysis, AnalyticsError> {
        // Stage 1: Order and validate the event log
        let normalized = EventLogNormalizer::normalize(session_id, events)?;

        // Stage 2: Resolve each confirmed scenario
        let resolved = ScenarioResolver::resolve(normalized, outcomes)?;

        // Stage 3: Evaluate alignment against the ranking in force
        let history = RankingHistory::from(ranking_history);
        let evaluated = AlignmentEvaluator::evaluate(resolved, &history);

        // Stage 4: Aggregate into session metrics
        let analysis = CompositeIndexCalculator::calculate(evaluated, &self.config);

        if analysis.has_warnings() {
            warn!(
                session_id,
                warnings = analysis.warnings.len(),
                "session metrics computed with data-quality warnings"
            );
        } else {
            debug!(session_id, "session metrics computed");
        }

        Ok(analysis)
    }

    /// Score a parsed session input
    pub fn compute_input(&self, input: &SessionInput) -> Result<SessionAnalysis, AnalyticsError> {
        self.compute(
            &input.session_id,
            &input.events,
            &input.outcomes,
            &input.ranking_history,
        )
    }

    /// Score a session input JSON document and return the metrics JSON document
    pub fn process(&self, input_json: &str) -> Result<String, AnalyticsError> {
        let input = parse_input(input_json)?;
        let analysis = self.compute_input(&input)?;
        self.encoder.encode_to_json(&analysis)
    }
}
