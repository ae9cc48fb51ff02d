//! Composite index calculation
//!
//! Aggregates finalized scenario records into session-wide indices using the
//! study's scoring formulas.

use crate::config::{EngineConfig, ReferenceMaxima};
use crate::types::{
    AlignmentChange, DataQualityWarning, EvaluatedSession, OutcomeDimension, OutcomeVector,
    ScenarioRecord, SessionAnalysis, SessionMetrics, ValueOrderTrajectory,
};
use tracing::debug;

/// Calculator for session-wide metrics
pub struct CompositeIndexCalculator;

impl CompositeIndexCalculator {
    /// Compute session metrics from evaluated scenario records
    pub fn calculate(evaluated: EvaluatedSession, config: &EngineConfig) -> SessionAnalysis {
        let EvaluatedSession {
            session_id,
            records,
            pending_scenario_ids,
            mut warnings,
        } = evaluated;

        if records.is_empty() {
            warnings.push(DataQualityWarning::NoFinalizedScenarios);
        }

        let value_consistency_index = value_consistency_index(&records);
        let cumulative_outcome = cumulative_outcome(&records);

        let (performance_composite, balance_index) = match &cumulative_outcome {
            Some(totals) => {
                let normalized = normalize_dimensions(totals, &config.reference_maxima);
                let clamped = clamp_dimensions(normalized, &mut warnings);
                (
                    performance_composite(&clamped, config.rounding_decimals),
                    balance_index(&clamped, config.rounding_decimals),
                )
            }
            None => (None, None),
        };

        let decision_times: Vec<u64> = records.iter().map(|r| r.decision_time_seconds).collect();
        let avg_decision_time = mean(decision_times.iter().map(|&t| t as f64));

        let metrics = SessionMetrics {
            session_id,
            finalized_scenario_count: records.len() as u32,
            pending_scenario_ids,
            value_consistency_index,
            performance_composite,
            balance_index,
            switch_count_total: records.iter().map(|r| r.switch_count).sum(),
            misalign_after_cvr_apa_count: count_changes(&records, AlignmentChange::Misaligned),
            realign_after_cvr_apa_count: count_changes(&records, AlignmentChange::Realigned),
            cvr_arrivals: records.iter().map(|r| r.reflection_visits).sum(),
            apa_reorderings: records.iter().map(|r| r.reorderings).sum(),
            avg_decision_time,
            decision_times,
            final_alignment_by_scenario: records.iter().map(|r| r.aligned).collect(),
            value_order_trajectories: records
                .iter()
                .map(|r| ValueOrderTrajectory {
                    scenario_id: r.scenario_id.clone(),
                    ranking: r.ranking_in_force.clone(),
                })
                .collect(),
            cumulative_outcome,
            scenario_details: records,
        };

        debug!(
            session_id = %metrics.session_id,
            finalized = metrics.finalized_scenario_count,
            warnings = warnings.len(),
            "calculated session metrics"
        );

        SessionAnalysis { metrics, warnings }
    }
}

/// Share of finalized scenarios whose final choice was aligned
///
/// Undefined when nothing has been finalized.
pub fn value_consistency_index(records: &[ScenarioRecord]) -> Option<f64> {
    if records.is_empty() {
        return None;
    }
    let aligned = records.iter().filter(|r| r.aligned).count();
    Some(aligned as f64 / records.len() as f64)
}

/// Sum of the outcome vectors attached to finalized scenarios
///
/// Absent when no finalized scenario carried an outcome.
pub fn cumulative_outcome(records: &[ScenarioRecord]) -> Option<OutcomeVector> {
    let mut outcomes = records
        .iter()
        .filter_map(|r| r.final_outcome.as_ref())
        .map(|o| &o.outcome_vector)
        .peekable();
    outcomes.peek()?;

    let mut totals = OutcomeVector::default();
    for vector in outcomes {
        totals.accumulate(vector);
    }
    Some(totals)
}

/// Scale each dimension to "higher is better" units of the reference maxima
///
/// Casualties are reversed (`1 - casualties / max`). Values are not clamped.
pub fn normalize_dimensions(
    totals: &OutcomeVector,
    reference: &ReferenceMaxima,
) -> [(OutcomeDimension, f64); 7] {
    OutcomeDimension::ALL.map(|dimension| {
        let value = totals.get(dimension);
        let normalized = match dimension {
            OutcomeDimension::LivesSaved => value / reference.lives_saved,
            OutcomeDimension::HumanCasualties => 1.0 - value / reference.human_casualties,
            _ => value / reference.percentage,
        };
        (dimension, normalized)
    })
}

fn clamp_dimensions(
    normalized: [(OutcomeDimension, f64); 7],
    warnings: &mut Vec<DataQualityWarning>,
) -> [f64; 7] {
    normalized.map(|(dimension, raw)| {
        let clamped = raw.clamp(0.0, 1.0);
        if clamped != raw {
            debug!(dimension = dimension.as_str(), raw, "normalized dimension clamped");
            warnings.push(DataQualityWarning::NormalizedValueClamped { dimension, raw });
        }
        clamped
    })
}

/// Mean of the normalized dimensions; `None` for an empty slice
pub fn performance_composite(normalized: &[f64], decimals: u32) -> Option<f64> {
    mean(normalized.iter().copied()).map(|m| round_to(m, decimals))
}

/// One minus the population variance of the normalized dimensions; `None` for an empty slice
pub fn balance_index(normalized: &[f64], decimals: u32) -> Option<f64> {
    let mean = mean(normalized.iter().copied())?;
    let variance = normalized.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
        / normalized.len() as f64;
    Some(round_to(1.0 - variance, decimals))
}

fn count_changes(records: &[ScenarioRecord], change: AlignmentChange) -> u32 {
    records
        .iter()
        .filter(|r| r.alignment_changed_after_reflection == Some(change))
        .count() as u32
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
