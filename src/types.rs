//! Core types for the decision session analytics pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw events, per-scenario timelines, resolved scenarios, evaluated
//! scenario records, and the final session metrics.

use crate::error::AnalyticsError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scenario identifier as emitted by the presentation layer
pub type ScenarioId = String;

/// Interaction event kinds captured during a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ScenarioPresented,
    OptionSelected,
    /// Comparative value review (CVR) prompt opened
    ReflectionOpened,
    /// Adaptive preference adjustment (APA) reordering submitted
    ReflectionValueReordered,
    DecisionConfirmed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ScenarioPresented => "scenario_presented",
            EventKind::OptionSelected => "option_selected",
            EventKind::ReflectionOpened => "reflection_opened",
            EventKind::ReflectionValueReordered => "reflection_value_reordered",
            EventKind::DecisionConfirmed => "decision_confirmed",
        }
    }

    /// Whether this event is a visit to either reflection prompt
    pub fn is_reflection(&self) -> bool {
        matches!(
            self,
            EventKind::ReflectionOpened | EventKind::ReflectionValueReordered
        )
    }
}

/// Moral value labels a participant ranks and options are tagged with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum ValueLabel {
    Safety,
    Efficiency,
    Sustainability,
    Fairness,
    Nonmaleficence,
}

impl ValueLabel {
    pub const ALL: [ValueLabel; 5] = [
        ValueLabel::Safety,
        ValueLabel::Efficiency,
        ValueLabel::Sustainability,
        ValueLabel::Fairness,
        ValueLabel::Nonmaleficence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueLabel::Safety => "Safety",
            ValueLabel::Efficiency => "Efficiency",
            ValueLabel::Sustainability => "Sustainability",
            ValueLabel::Fairness => "Fairness",
            ValueLabel::Nonmaleficence => "Nonmaleficence",
        }
    }
}

impl fmt::Display for ValueLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueLabel {
    type Err = AnalyticsError;

    /// Labels are matched case-insensitively ("safety" and "Safety" are the same value)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        ValueLabel::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| AnalyticsError::InvalidRanking(format!("unknown value label '{s}'")))
    }
}

impl TryFrom<String> for ValueLabel {
    type Error = AnalyticsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// An ordered ranking of all five values, highest priority first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ValueLabel>", into = "Vec<ValueLabel>")]
pub struct ValueRanking {
    labels: Vec<ValueLabel>,
}

impl ValueRanking {
    /// Build a ranking, rejecting anything but five distinct labels
    pub fn new(labels: Vec<ValueLabel>) -> Result<Self, AnalyticsError> {
        if labels.len() != ValueLabel::ALL.len() {
            return Err(AnalyticsError::InvalidRanking(format!(
                "expected {} labels, got {}",
                ValueLabel::ALL.len(),
                labels.len()
            )));
        }
        for (i, label) in labels.iter().enumerate() {
            if labels[..i].contains(label) {
                return Err(AnalyticsError::InvalidRanking(format!(
                    "label '{label}' appears more than once"
                )));
            }
        }
        Ok(Self { labels })
    }

    /// Highest-priority (rank 0) value
    pub fn top(&self) -> ValueLabel {
        self.labels[0]
    }

    pub fn labels(&self) -> &[ValueLabel] {
        &self.labels
    }

    /// Zero-based rank of a label
    pub fn rank_of(&self, label: ValueLabel) -> Option<usize> {
        self.labels.iter().position(|l| *l == label)
    }
}

impl TryFrom<Vec<ValueLabel>> for ValueRanking {
    type Error = AnalyticsError;

    fn try_from(labels: Vec<ValueLabel>) -> Result<Self, Self::Error> {
        ValueRanking::new(labels)
    }
}

impl From<ValueRanking> for Vec<ValueLabel> {
    fn from(ranking: ValueRanking) -> Self {
        ranking.labels
    }
}

/// A declared ranking together with the moment it was submitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub timestamp: DateTime<Utc>,
    pub ranking: ValueRanking,
}

/// Identity of a selected option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionRef {
    pub option_id: String,
    /// Value the option is tagged with, used for alignment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_label: Option<ValueLabel>,
}

/// An immutable interaction record from the session log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub session_id: String,
    pub scenario_id: ScenarioId,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    /// Selected option (required when kind is OptionSelected)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option: Option<OptionRef>,
}

impl Event {
    pub fn new(
        session_id: impl Into<String>,
        scenario_id: impl Into<ScenarioId>,
        kind: EventKind,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            scenario_id: scenario_id.into(),
            kind,
            timestamp,
            option: None,
        }
    }

    /// An `option_selected` event for the given option
    pub fn selection(
        session_id: impl Into<String>,
        scenario_id: impl Into<ScenarioId>,
        timestamp: DateTime<Utc>,
        option_id: impl Into<String>,
        value_label: Option<ValueLabel>,
    ) -> Self {
        Self {
            option: Some(OptionRef {
                option_id: option_id.into(),
                value_label,
            }),
            ..Self::new(session_id, scenario_id, EventKind::OptionSelected, timestamp)
        }
    }
}

/// The seven outcome dimensions of a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeDimension {
    LivesSaved,
    HumanCasualties,
    FirefightingResource,
    InfrastructureCondition,
    BiodiversityCondition,
    PropertiesCondition,
    CriticalFacilityCondition,
}

impl OutcomeDimension {
    pub const ALL: [OutcomeDimension; 7] = [
        OutcomeDimension::LivesSaved,
        OutcomeDimension::HumanCasualties,
        OutcomeDimension::FirefightingResource,
        OutcomeDimension::InfrastructureCondition,
        OutcomeDimension::BiodiversityCondition,
        OutcomeDimension::PropertiesCondition,
        OutcomeDimension::CriticalFacilityCondition,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeDimension::LivesSaved => "lives_saved",
            OutcomeDimension::HumanCasualties => "human_casualties",
            OutcomeDimension::FirefightingResource => "firefighting_resource",
            OutcomeDimension::InfrastructureCondition => "infrastructure_condition",
            OutcomeDimension::BiodiversityCondition => "biodiversity_condition",
            OutcomeDimension::PropertiesCondition => "properties_condition",
            OutcomeDimension::CriticalFacilityCondition => "critical_facility_condition",
        }
    }

    /// Whether the dimension is a percentage delta rather than a count
    pub fn is_percentage(&self) -> bool {
        !matches!(
            self,
            OutcomeDimension::LivesSaved | OutcomeDimension::HumanCasualties
        )
    }
}

/// Numeric consequences of a chosen option
///
/// Lives saved and casualties are counts; the remaining five dimensions are
/// percentage deltas from baseline in [-100, 100].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeVector {
    #[serde(alias = "livesSaved")]
    pub lives_saved: f64,
    #[serde(alias = "humanCasualties")]
    pub human_casualties: f64,
    #[serde(alias = "firefightingResource")]
    pub firefighting_resource: f64,
    #[serde(alias = "infrastructureCondition")]
    pub infrastructure_condition: f64,
    #[serde(alias = "biodiversityCondition")]
    pub biodiversity_condition: f64,
    #[serde(alias = "propertiesCondition")]
    pub properties_condition: f64,
    #[serde(alias = "nuclearPowerStation")]
    pub critical_facility_condition: f64,
}

impl OutcomeVector {
    pub fn get(&self, dimension: OutcomeDimension) -> f64 {
        match dimension {
            OutcomeDimension::LivesSaved => self.lives_saved,
            OutcomeDimension::HumanCasualties => self.human_casualties,
            OutcomeDimension::FirefightingResource => self.firefighting_resource,
            OutcomeDimension::InfrastructureCondition => self.infrastructure_condition,
            OutcomeDimension::BiodiversityCondition => self.biodiversity_condition,
            OutcomeDimension::PropertiesCondition => self.properties_condition,
            OutcomeDimension::CriticalFacilityCondition => self.critical_facility_condition,
        }
    }

    /// Add another vector into this one, dimension by dimension
    pub fn accumulate(&mut self, other: &OutcomeVector) {
        self.lives_saved += other.lives_saved;
        self.human_casualties += other.human_casualties;
        self.firefighting_resource += other.firefighting_resource;
        self.infrastructure_condition += other.infrastructure_condition;
        self.biodiversity_condition += other.biodiversity_condition;
        self.properties_condition += other.properties_condition;
        self.critical_facility_condition += other.critical_facility_condition;
    }

    /// Check sign and range constraints of a single scenario outcome
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        for dimension in OutcomeDimension::ALL {
            let value = self.get(dimension);
            if !value.is_finite() {
                return Err(AnalyticsError::InvalidOutcome(format!(
                    "{} is not a finite number",
                    dimension.as_str()
                )));
            }
            let in_range = if dimension.is_percentage() {
                (-100.0..=100.0).contains(&value)
            } else {
                value >= 0.0
            };
            if !in_range {
                return Err(AnalyticsError::InvalidOutcome(format!(
                    "{} = {} is out of range",
                    dimension.as_str(),
                    value
                )));
            }
        }
        Ok(())
    }
}

/// Outcome of a confirmed scenario, supplied by the persistence layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub scenario_id: ScenarioId,
    pub chosen_option_id: String,
    /// Value label of the chosen option
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chosen_option_label: Option<ValueLabel>,
    pub outcome_vector: OutcomeVector,
}

// ============================================================================
// Pipeline stage outputs
// ============================================================================

/// Ordered events of one scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioTimeline {
    pub scenario_id: ScenarioId,
    /// Events sorted by timestamp, ties in log order, truncated after confirmation
    pub events: Vec<Event>,
    /// Whether a `decision_confirmed` event closed this timeline
    pub confirmed: bool,
}

/// Output of the event log normalizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedLog {
    pub session_id: String,
    /// Timelines in order of first presentation
    pub timelines: Vec<ScenarioTimeline>,
    pub warnings: Vec<DataQualityWarning>,
}

impl NormalizedLog {
    pub fn timeline(&self, scenario_id: &str) -> Option<&ScenarioTimeline> {
        self.timelines.iter().find(|t| t.scenario_id == scenario_id)
    }
}

/// A confirmed scenario after per-scenario resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedScenario {
    pub scenario_id: ScenarioId,
    pub switch_count: u32,
    /// Number of `reflection_opened` events
    pub reflection_visits: u32,
    /// Number of `reflection_value_reordered` events
    pub reorderings: u32,
    pub decision_time_seconds: u64,
    pub confirmed_at: DateTime<Utc>,
    /// Last selection before confirmation
    pub final_selection: OptionRef,
    pub final_outcome: Option<ScenarioOutcome>,
    /// Timestamp of the first reflection event of either kind
    pub first_reflection_at: Option<DateTime<Utc>>,
    /// Selection in force immediately before the first reflection event
    pub pre_reflection_selection: Option<OptionRef>,
}

impl ResolvedScenario {
    pub fn reflection_visited(&self) -> bool {
        self.reflection_visits > 0
    }

    pub fn reordering_occurred(&self) -> bool {
        self.reorderings > 0
    }

    /// Value label of the final choice, falling back to the outcome record when
    /// the logged selection carries none and both name the same option
    pub fn final_value_label(&self) -> Option<ValueLabel> {
        self.final_selection.value_label.or_else(|| {
            self.final_outcome
                .as_ref()
                .filter(|o| o.chosen_option_id == self.final_selection.option_id)
                .and_then(|o| o.chosen_option_label)
        })
    }
}

/// Output of the per-scenario resolver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedSession {
    pub session_id: String,
    pub scenarios: Vec<ResolvedScenario>,
    /// Scenarios presented but not yet confirmed
    pub pending_scenario_ids: Vec<ScenarioId>,
    pub warnings: Vec<DataQualityWarning>,
}

/// Direction of an alignment change following a reflection prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentChange {
    /// Aligned before reflection, not aligned after
    Misaligned,
    /// Not aligned before reflection, aligned after
    Realigned,
}

/// Finalized per-scenario record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRecord {
    pub scenario_id: ScenarioId,
    pub switch_count: u32,
    pub reflection_visited: bool,
    pub reordering_occurred: bool,
    pub reflection_visits: u32,
    pub reorderings: u32,
    pub decision_time_seconds: u64,
    pub final_option_id: String,
    pub final_value_label: Option<ValueLabel>,
    pub final_outcome: Option<ScenarioOutcome>,
    pub aligned: bool,
    pub alignment_changed_after_reflection: Option<AlignmentChange>,
    /// Ranking in force at confirmation time
    pub ranking_in_force: Option<ValueRanking>,
}

/// Output of the alignment evaluator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatedSession {
    pub session_id: String,
    pub records: Vec<ScenarioRecord>,
    pub pending_scenario_ids: Vec<ScenarioId>,
    pub warnings: Vec<DataQualityWarning>,
}

/// Non-fatal anomalies detected while computing metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityWarning {
    /// Confirmation preceded presentation; decision time clamped to zero
    NegativeDecisionTime {
        scenario_id: ScenarioId,
        raw_seconds: i64,
    },
    /// Events logged after a scenario was confirmed were ignored
    EventsAfterConfirmation { scenario_id: ScenarioId, dropped: u32 },
    /// Scenario presented but never confirmed
    PendingScenario { scenario_id: ScenarioId },
    /// Confirmed scenario without an outcome vector
    MissingOutcome { scenario_id: ScenarioId },
    /// Outcome names a different option than the last logged selection
    OutcomeOptionMismatch {
        scenario_id: ScenarioId,
        logged_option_id: String,
        outcome_option_id: String,
    },
    /// Outcome supplied for a scenario that was not finalized
    UnusedOutcome { scenario_id: ScenarioId },
    /// No ranking declared before confirmation
    NoRankingInForce { scenario_id: ScenarioId },
    /// Final choice carries no value label
    MissingValueLabel { scenario_id: ScenarioId },
    /// Normalized dimension fell outside [0, 1] and was clamped
    NormalizedValueClamped {
        dimension: OutcomeDimension,
        raw: f64,
    },
    /// Nothing finalized; session-wide indices are undefined
    NoFinalizedScenarios,
}

/// Ranking used to judge one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueOrderTrajectory {
    pub scenario_id: ScenarioId,
    pub ranking: Option<ValueRanking>,
}

/// Session-wide analytics
///
/// `None` values are serialized as `null` and mean the metric is undefined for
/// the data available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub session_id: String,
    pub finalized_scenario_count: u32,
    pub pending_scenario_ids: Vec<ScenarioId>,

    /// Aligned / finalized scenarios (0-1)
    pub value_consistency_index: Option<f64>,
    /// Mean of the normalized cumulative outcome dimensions (0-1)
    pub performance_composite: Option<f64>,
    /// 1 - population variance of the normalized dimensions (0-1)
    pub balance_index: Option<f64>,

    pub switch_count_total: u32,
    pub misalign_after_cvr_apa_count: u32,
    pub realign_after_cvr_apa_count: u32,
    /// Total comparative value review visits
    pub cvr_arrivals: u32,
    /// Total adaptive preference reorderings
    pub apa_reorderings: u32,

    /// Mean decision time in seconds
    pub avg_decision_time: Option<f64>,
    pub decision_times: Vec<u64>,
    pub final_alignment_by_scenario: Vec<bool>,
    pub value_order_trajectories: Vec<ValueOrderTrajectory>,
    /// Sum of finalized outcome vectors, absent when none carried an outcome
    pub cumulative_outcome: Option<OutcomeVector>,
    pub scenario_details: Vec<ScenarioRecord>,
}

/// Metrics plus the data-quality warnings raised while computing them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAnalysis {
    pub metrics: SessionMetrics,
    pub warnings: Vec<DataQualityWarning>,
}

impl SessionAnalysis {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
