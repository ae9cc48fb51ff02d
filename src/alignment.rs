//! Value alignment evaluation
//!
//! A final choice is aligned when its value label equals the top entry of the
//! ranking in force at confirmation time. Alignment changes across a
//! reflection prompt are classified as misaligning or realigning.

use crate::types::{
    AlignmentChange, DataQualityWarning, EvaluatedSession, RankingEntry, ResolvedScenario,
    ResolvedSession, ScenarioRecord, ValueLabel, ValueRanking,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Time-ordered history of declared value rankings
///
/// Serialized as a plain list of entries; deserialization goes through
/// [`RankingHistory::new`] so the ordering holds for loaded histories too.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<RankingEntry>", into = "Vec<RankingEntry>")]
pub struct RankingHistory {
    entries: Vec<RankingEntry>,
}

impl RankingHistory {
    /// Build a history; entries are ordered by timestamp, ties kept in input order
    pub fn new(mut entries: Vec<RankingEntry>) -> Self {
        entries.sort_by_key(|e| e.timestamp);
        Self { entries }
    }

    /// Latest ranking declared at or before `at`
    pub fn in_force_at(&self, at: DateTime<Utc>) -> Option<&ValueRanking> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.timestamp <= at)
            .map(|e| &e.ranking)
    }

    /// Latest ranking declared strictly before `at`
    ///
    /// A reordering and the ranking entry it produces share a timestamp, so
    /// this is the ranking the participant held going into that event.
    pub fn in_force_before(&self, at: DateTime<Utc>) -> Option<&ValueRanking> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.timestamp < at)
            .map(|e| &e.ranking)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<&[RankingEntry]> for RankingHistory {
    fn from(entries: &[RankingEntry]) -> Self {
        RankingHistory::new(entries.to_vec())
    }
}

impl From<Vec<RankingEntry>> for RankingHistory {
    fn from(entries: Vec<RankingEntry>) -> Self {
        RankingHistory::new(entries)
    }
}

impl From<RankingHistory> for Vec<RankingEntry> {
    fn from(history: RankingHistory) -> Self {
        history.entries
    }
}

/// Evaluator turning resolved scenarios into finalized records
pub struct AlignmentEvaluator;

impl AlignmentEvaluator {
    /// Evaluate alignment of every resolved scenario
    pub fn evaluate(resolved: ResolvedSession, history: &RankingHistory) -> EvaluatedSession {
        let ResolvedSession {
            session_id,
            scenarios,
            pending_scenario_ids,
            mut warnings,
        } = resolved;

        let records: Vec<ScenarioRecord> = scenarios
            .into_iter()
            .map(|scenario| evaluate_scenario(scenario, history, &mut warnings))
            .collect();

        debug!(
            session_id = %session_id,
            aligned = records.iter().filter(|r| r.aligned).count(),
            finalized = records.len(),
            "evaluated alignment"
        );

        EvaluatedSession {
            session_id,
            records,
            pending_scenario_ids,
            warnings,
        }
    }
}

/// Whether a value label matches the top of a ranking
///
/// Without a ranking or a label the choice is unaligned.
pub fn is_aligned(label: Option<ValueLabel>, ranking: Option<&ValueRanking>) -> bool {
    match (label, ranking) {
        (Some(label), Some(ranking)) => ranking.top() == label,
        _ => false,
    }
}

/// Classify the alignment transition across a reflection prompt
pub fn classify_change(before: bool, after: bool) -> Option<AlignmentChange> {
    match (before, after) {
        (true, false) => Some(AlignmentChange::Misaligned),
        (false, true) => Some(AlignmentChange::Realigned),
        _ => None,
    }
}

fn evaluate_scenario(
    scenario: ResolvedScenario,
    history: &RankingHistory,
    warnings: &mut Vec<DataQualityWarning>,
) -> ScenarioRecord {
    let ranking_in_force = history.in_force_at(scenario.confirmed_at).cloned();
    let final_value_label = scenario.final_value_label();

    if ranking_in_force.is_none() {
        warnings.push(DataQualityWarning::NoRankingInForce {
            scenario_id: scenario.scenario_id.clone(),
        });
    }
    if final_value_label.is_none() {
        warnings.push(DataQualityWarning::MissingValueLabel {
            scenario_id: scenario.scenario_id.clone(),
        });
    }

    let aligned = is_aligned(final_value_label, ranking_in_force.as_ref());

    let reflected = scenario.reflection_visited() || scenario.reordering_occurred();
    let alignment_changed_after_reflection = if reflected {
        match (&scenario.pre_reflection_selection, scenario.first_reflection_at) {
            (Some(before), Some(reflected_at)) => {
                let aligned_before =
                    is_aligned(before.value_label, history.in_force_before(reflected_at));
                classify_change(aligned_before, aligned)
            }
            _ => None,
        }
    } else {
        None
    };

    ScenarioRecord {
        reflection_visited: scenario.reflection_visited(),
        reordering_occurred: scenario.reordering_occurred(),
        scenario_id: scenario.scenario_id,
        switch_count: scenario.switch_count,
        reflection_visits: scenario.reflection_visits,
        reorderings: scenario.reorderings,
        decision_time_seconds: scenario.decision_time_seconds,
        final_option_id: scenario.final_selection.option_id,
        final_value_label,
        final_outcome: scenario.final_outcome,
        aligned,
        alignment_changed_after_reflection,
        ranking_in_force,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OptionRef;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn ranking(top: ValueLabel) -> ValueRanking {
        let mut labels = vec![top];
        labels.extend(ValueLabel::ALL.into_iter().filter(|l| *l != top));
        ValueRanking::new(labels).unwrap()
    }

    fn history(entries: &[(i64, ValueLabel)]) -> RankingHistory {
        RankingHistory::new(
            entries
                .iter()
                .map(|&(seconds, top)| RankingEntry {
                    timestamp: at(seconds),
                    ranking: ranking(top),
                })
                .collect(),
        )
    }

    fn option(id: &str, label: ValueLabel) -> OptionRef {
        OptionRef {
            option_id: id.to_string(),
            value_label: Some(label),
        }
    }

    fn scenario(final_label: ValueLabel, confirmed_at: i64) -> ResolvedScenario {
        ResolvedScenario {
            scenario_id: "1".to_string(),
            switch_count: 0,
            reflection_visits: 0,
            reorderings: 0,
            decision_time_seconds: 30,
            confirmed_at: at(confirmed_at),
            final_selection: option("1a", final_label),
            final_outcome: None,
            first_reflection_at: None,
            pre_reflection_selection: None,
        }
    }

    fn evaluate_one(scenario: ResolvedScenario, history: &RankingHistory) -> EvaluatedSession {
        let resolved = ResolvedSession {
            session_id: "session-1".to_string(),
            scenarios: vec![scenario],
            pending_scenario_ids: vec![],
            warnings: vec![],
        };
        AlignmentEvaluator::evaluate(resolved, history)
    }

    #[test]
    fn test_safety_choice_under_safety_ranking_is_aligned() {
        let ranking = ValueRanking::new(vec![
            ValueLabel::Safety,
            ValueLabel::Efficiency,
            ValueLabel::Sustainability,
            ValueLabel::Fairness,
            ValueLabel::Nonmaleficence,
        ])
        .unwrap();
        let history = RankingHistory::new(vec![RankingEntry {
            timestamp: at(0),
            ranking,
        }]);

        let evaluated = evaluate_one(scenario(ValueLabel::Safety, 30), &history);

        assert!(evaluated.records[0].aligned);
        assert_eq!(evaluated.records[0].alignment_changed_after_reflection, None);
        assert!(evaluated.warnings.is_empty());
    }

    #[test]
    fn test_ranking_in_force_is_latest_before_confirmation() {
        let history = history(&[
            (0, ValueLabel::Safety),
            (40, ValueLabel::Fairness),
            (100, ValueLabel::Safety),
        ]);

        let evaluated = evaluate_one(scenario(ValueLabel::Fairness, 60), &history);
        let record = &evaluated.records[0];

        assert!(record.aligned);
        assert_eq!(
            record.ranking_in_force.as_ref().map(ValueRanking::top),
            Some(ValueLabel::Fairness)
        );
    }

    #[test]
    fn test_history_order_is_normalized() {
        let history = RankingHistory::new(vec![
            RankingEntry {
                timestamp: at(50),
                ranking: ranking(ValueLabel::Efficiency),
            },
            RankingEntry {
                timestamp: at(10),
                ranking: ranking(ValueLabel::Safety),
            },
        ]);

        assert_eq!(history.in_force_at(at(5)), None);
        assert_eq!(history.in_force_at(at(20)).map(|r| r.top()), Some(ValueLabel::Safety));
        assert_eq!(
            history.in_force_at(at(50)).map(|r| r.top()),
            Some(ValueLabel::Efficiency)
        );
    }

    #[test]
    fn test_no_ranking_means_unaligned() {
        let evaluated = evaluate_one(scenario(ValueLabel::Safety, 30), &RankingHistory::default());

        assert!(!evaluated.records[0].aligned);
        assert_eq!(
            evaluated.warnings,
            vec![DataQualityWarning::NoRankingInForce {
                scenario_id: "1".to_string()
            }]
        );
    }

    #[test]
    fn test_reflection_that_erodes_alignment() {
        let history = history(&[(0, ValueLabel::Safety)]);
        let mut resolved = scenario(ValueLabel::Efficiency, 60);
        resolved.reflection_visits = 1;
        resolved.first_reflection_at = Some(at(20));
        resolved.pre_reflection_selection = Some(option("1s", ValueLabel::Safety));

        let evaluated = evaluate_one(resolved, &history);
        let record = &evaluated.records[0];

        assert!(!record.aligned);
        assert_eq!(
            record.alignment_changed_after_reflection,
            Some(AlignmentChange::Misaligned)
        );
    }

    #[test]
    fn test_reordering_that_realigns() {
        // Participant picked Fairness, then promoted Fairness to the top
        let history = history(&[(0, ValueLabel::Safety), (30, ValueLabel::Fairness)]);
        let mut resolved = scenario(ValueLabel::Fairness, 60);
        resolved.reorderings = 1;
        resolved.first_reflection_at = Some(at(25));
        resolved.pre_reflection_selection = Some(option("1a", ValueLabel::Fairness));

        let evaluated = evaluate_one(resolved, &history);
        let record = &evaluated.records[0];

        assert!(record.aligned);
        assert!(record.reordering_occurred);
        assert_eq!(
            record.alignment_changed_after_reflection,
            Some(AlignmentChange::Realigned)
        );
    }

    #[test]
    fn test_reordering_logged_with_its_ranking_entry_realigns() {
        // The new ranking carries the exact timestamp of the reorder event
        let history = history(&[(0, ValueLabel::Safety), (10, ValueLabel::Fairness)]);
        let mut resolved = scenario(ValueLabel::Fairness, 20);
        resolved.reorderings = 1;
        resolved.first_reflection_at = Some(at(10));
        resolved.pre_reflection_selection = Some(option("1a", ValueLabel::Fairness));

        let evaluated = evaluate_one(resolved, &history);

        assert_eq!(
            evaluated.records[0].alignment_changed_after_reflection,
            Some(AlignmentChange::Realigned)
        );
    }

    #[test]
    fn test_in_force_before_excludes_same_instant() {
        let history = history(&[(0, ValueLabel::Safety), (10, ValueLabel::Fairness)]);

        assert_eq!(history.in_force_at(at(10)).map(|r| r.top()), Some(ValueLabel::Fairness));
        assert_eq!(history.in_force_before(at(10)).map(|r| r.top()), Some(ValueLabel::Safety));
        assert_eq!(history.in_force_before(at(0)), None);
    }

    #[test]
    fn test_deserialized_history_is_ordered() {
        let json = r#"[
            { "timestamp": "2025-03-01T10:00:10Z",
              "ranking": ["Safety", "Efficiency", "Sustainability", "Fairness", "Nonmaleficence"] },
            { "timestamp": "2025-03-01T10:00:05Z",
              "ranking": ["Efficiency", "Safety", "Sustainability", "Fairness", "Nonmaleficence"] }
        ]"#;

        let history: RankingHistory = serde_json::from_str(json).unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history.in_force_at(at(20)).map(|r| r.top()), Some(ValueLabel::Safety));
        assert_eq!(history.in_force_at(at(7)).map(|r| r.top()), Some(ValueLabel::Efficiency));

        let round_trip: RankingHistory =
            serde_json::from_str(&serde_json::to_string(&history).unwrap()).unwrap();
        assert_eq!(round_trip, history);
    }

    #[test]
    fn test_unchanged_alignment_after_reflection() {
        let history = history(&[(0, ValueLabel::Safety)]);
        let mut resolved = scenario(ValueLabel::Safety, 60);
        resolved.reflection_visits = 2;
        resolved.first_reflection_at = Some(at(20));
        resolved.pre_reflection_selection = Some(option("1a", ValueLabel::Safety));

        let evaluated = evaluate_one(resolved, &history);
        assert_eq!(evaluated.records[0].alignment_changed_after_reflection, None);
    }

    #[test]
    fn test_reflection_without_prior_selection() {
        let history = history(&[(0, ValueLabel::Safety)]);
        let mut resolved = scenario(ValueLabel::Safety, 60);
        resolved.reflection_visits = 1;
        resolved.first_reflection_at = Some(at(5));

        let evaluated = evaluate_one(resolved, &history);
        assert_eq!(evaluated.records[0].alignment_changed_after_reflection, None);
    }

    #[test]
    fn test_missing_label_is_unaligned_and_flagged() {
        let history = history(&[(0, ValueLabel::Safety)]);
        let mut resolved = scenario(ValueLabel::Safety, 60);
        resolved.final_selection.value_label = None;

        let evaluated = evaluate_one(resolved, &history);

        assert!(!evaluated.records[0].aligned);
        assert_eq!(
            evaluated.warnings,
            vec![DataQualityWarning::MissingValueLabel {
                scenario_id: "1".to_string()
            }]
        );
    }

    #[test]
    fn test_classify_change_three_states() {
        assert_eq!(classify_change(true, false), Some(AlignmentChange::Misaligned));
        assert_eq!(classify_change(false, true), Some(AlignmentChange::Realigned));
        assert_eq!(classify_change(true, true), None);
        assert_eq!(classify_change(false, false), None);
    }
}
