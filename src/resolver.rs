//! Per-scenario resolution
//!
//! Reduces each confirmed scenario timeline to its decision facts: final
//! selection, switch count, reflection activity and elapsed decision time.
//! Scenarios are resolved independently of each other.

use crate::error::AnalyticsError;
use crate::types::{
    DataQualityWarning, Event, EventKind, NormalizedLog, OptionRef, ResolvedScenario,
    ResolvedSession, ScenarioOutcome, ScenarioTimeline,
};
use std::collections::HashMap;
use tracing::debug;

/// Resolver for normalized scenario timelines
pub struct ScenarioResolver;

impl ScenarioResolver {
    /// Resolve every confirmed timeline and attach its outcome vector
    pub fn resolve(
        log: NormalizedLog,
        outcomes: &[ScenarioOutcome],
    ) -> Result<ResolvedSession, AnalyticsError> {
        let NormalizedLog {
            session_id,
            timelines,
            mut warnings,
        } = log;

        let outcomes_by_scenario = index_outcomes(outcomes)?;

        let mut scenarios = Vec::new();
        let mut pending_scenario_ids = Vec::new();

        for timeline in &timelines {
            if !timeline.confirmed {
                pending_scenario_ids.push(timeline.scenario_id.clone());
                warnings.push(DataQualityWarning::PendingScenario {
                    scenario_id: timeline.scenario_id.clone(),
                });
                continue;
            }
            let outcome = outcomes_by_scenario
                .get(timeline.scenario_id.as_str())
                .copied();
            scenarios.push(resolve_timeline(timeline, outcome, &mut warnings)?);
        }

        for outcome in outcomes {
            if !scenarios.iter().any(|s| s.scenario_id == outcome.scenario_id) {
                warnings.push(DataQualityWarning::UnusedOutcome {
                    scenario_id: outcome.scenario_id.clone(),
                });
            }
        }

        debug!(
            session_id = %session_id,
            resolved = scenarios.len(),
            pending = pending_scenario_ids.len(),
            "resolved scenarios"
        );

        Ok(ResolvedSession {
            session_id,
            scenarios,
            pending_scenario_ids,
            warnings,
        })
    }
}

/// Index outcomes by scenario, validating each vector
fn index_outcomes(
    outcomes: &[ScenarioOutcome],
) -> Result<HashMap<&str, &ScenarioOutcome>, AnalyticsError> {
    let mut by_scenario = HashMap::with_capacity(outcomes.len());
    for outcome in outcomes {
        outcome.outcome_vector.validate().map_err(|e| match e {
            AnalyticsError::InvalidOutcome(reason) => AnalyticsError::InvalidOutcome(format!(
                "scenario '{}': {}",
                outcome.scenario_id, reason
            )),
            other => other,
        })?;
        if by_scenario
            .insert(outcome.scenario_id.as_str(), outcome)
            .is_some()
        {
            return Err(AnalyticsError::InvalidOutcome(format!(
                "more than one outcome supplied for scenario '{}'",
                outcome.scenario_id
            )));
        }
    }
    Ok(by_scenario)
}

/// Resolve a single confirmed timeline
pub fn resolve_timeline(
    timeline: &ScenarioTimeline,
    outcome: Option<&ScenarioOutcome>,
    warnings: &mut Vec<DataQualityWarning>,
) -> Result<ResolvedScenario, AnalyticsError> {
    let scenario_id = &timeline.scenario_id;

    let presented_at = timeline
        .events
        .iter()
        .find(|e| e.kind == EventKind::ScenarioPresented)
        .map(|e| e.timestamp)
        .ok_or_else(|| {
            AnalyticsError::MalformedLog(format!("scenario '{scenario_id}' was never presented"))
        })?;

    let confirm_pos = timeline
        .events
        .iter()
        .position(|e| e.kind == EventKind::DecisionConfirmed)
        .ok_or_else(|| {
            AnalyticsError::MalformedLog(format!("scenario '{scenario_id}' was never confirmed"))
        })?;
    let confirmed_at = timeline.events[confirm_pos].timestamp;
    let before_confirm = &timeline.events[..confirm_pos];

    let final_selection = last_selection(before_confirm).ok_or_else(|| {
        AnalyticsError::MalformedLog(format!(
            "scenario '{scenario_id}' was confirmed without a selection"
        ))
    })?;

    let selections = count_kind(before_confirm, EventKind::OptionSelected);
    let switch_count = selections.saturating_sub(1);
    let reflection_visits = count_kind(before_confirm, EventKind::ReflectionOpened);
    let reorderings = count_kind(before_confirm, EventKind::ReflectionValueReordered);

    let raw_seconds = (confirmed_at - presented_at).num_seconds();
    let decision_time_seconds = if raw_seconds < 0 {
        debug!(%scenario_id, raw_seconds, "negative decision time clamped to zero");
        warnings.push(DataQualityWarning::NegativeDecisionTime {
            scenario_id: scenario_id.clone(),
            raw_seconds,
        });
        0
    } else {
        raw_seconds as u64
    };

    let first_reflection = before_confirm.iter().position(|e| e.kind.is_reflection());
    let first_reflection_at = first_reflection.map(|pos| before_confirm[pos].timestamp);
    let pre_reflection_selection =
        first_reflection.and_then(|pos| last_selection(&before_confirm[..pos]));

    match outcome {
        None => warnings.push(DataQualityWarning::MissingOutcome {
            scenario_id: scenario_id.clone(),
        }),
        Some(o) if o.chosen_option_id != final_selection.option_id => {
            warnings.push(DataQualityWarning::OutcomeOptionMismatch {
                scenario_id: scenario_id.clone(),
                logged_option_id: final_selection.option_id.clone(),
                outcome_option_id: o.chosen_option_id.clone(),
            })
        }
        Some(_) => {}
    }

    Ok(ResolvedScenario {
        scenario_id: scenario_id.clone(),
        switch_count,
        reflection_visits,
        reorderings,
        decision_time_seconds,
        confirmed_at,
        final_selection,
        final_outcome: outcome.cloned(),
        first_reflection_at,
        pre_reflection_selection,
    })
}

fn count_kind(events: &[Event], kind: EventKind) -> u32 {
    events.iter().filter(|e| e.kind == kind).count() as u32
}

fn last_selection(events: &[Event]) -> Option<OptionRef> {
    events
        .iter()
        .rev()
        .filter(|e| e.kind == EventKind::OptionSelected)
        .find_map(|e| e.option.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::EventLogNormalizer;
    use crate::types::{OutcomeVector, ValueLabel};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    const SESSION: &str = "session-1";

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn event(scenario: &str, kind: EventKind, seconds: i64) -> Event {
        Event::new(SESSION, scenario, kind, at(seconds))
    }

    fn select(scenario: &str, option: &str, label: ValueLabel, seconds: i64) -> Event {
        Event::selection(SESSION, scenario, at(seconds), option, Some(label))
    }

    fn outcome(scenario: &str, option: &str) -> ScenarioOutcome {
        ScenarioOutcome {
            scenario_id: scenario.to_string(),
            chosen_option_id: option.to_string(),
            chosen_option_label: None,
            outcome_vector: OutcomeVector {
                lives_saved: 500.0,
                ..Default::default()
            },
        }
    }

    fn resolve(events: &[Event], outcomes: &[ScenarioOutcome]) -> ResolvedSession {
        let log = EventLogNormalizer::normalize(SESSION, events).unwrap();
        ScenarioResolver::resolve(log, outcomes).unwrap()
    }

    #[test]
    fn test_single_selection_has_zero_switches() {
        let events = vec![
            event("1", EventKind::ScenarioPresented, 0),
            select("1", "1a", ValueLabel::Safety, 12),
            event("1", EventKind::DecisionConfirmed, 47),
        ];

        let session = resolve(&events, &[outcome("1", "1a")]);
        let scenario = &session.scenarios[0];

        assert_eq!(scenario.switch_count, 0);
        assert_eq!(scenario.decision_time_seconds, 47);
        assert_eq!(scenario.final_selection.option_id, "1a");
        assert!(!scenario.reflection_visited());
        assert!(!scenario.reordering_occurred());
        assert_eq!(scenario.first_reflection_at, None);
        assert!(session.warnings.is_empty());
    }

    #[test]
    fn test_switches_and_reflection_tracking() {
        let events = vec![
            event("1", EventKind::ScenarioPresented, 0),
            select("1", "1a", ValueLabel::Safety, 5),
            select("1", "1b", ValueLabel::Efficiency, 10),
            event("1", EventKind::ReflectionOpened, 20),
            event("1", EventKind::ReflectionValueReordered, 30),
            event("1", EventKind::ReflectionOpened, 35),
            select("1", "1c", ValueLabel::Fairness, 40),
            event("1", EventKind::DecisionConfirmed, 50),
        ];

        let session = resolve(&events, &[outcome("1", "1c")]);
        let scenario = &session.scenarios[0];

        assert_eq!(scenario.switch_count, 2);
        assert_eq!(scenario.reflection_visits, 2);
        assert_eq!(scenario.reorderings, 1);
        assert_eq!(scenario.first_reflection_at, Some(at(20)));
        assert_eq!(
            scenario.pre_reflection_selection.as_ref().map(|o| o.option_id.as_str()),
            Some("1b")
        );
        assert_eq!(scenario.final_selection.option_id, "1c");
        assert_eq!(
            scenario.final_selection.value_label,
            Some(ValueLabel::Fairness)
        );
    }

    #[test]
    fn test_reflection_before_any_selection() {
        let events = vec![
            event("1", EventKind::ScenarioPresented, 0),
            event("1", EventKind::ReflectionValueReordered, 3),
            select("1", "1a", ValueLabel::Safety, 5),
            event("1", EventKind::DecisionConfirmed, 9),
        ];

        let session = resolve(&events, &[outcome("1", "1a")]);
        let scenario = &session.scenarios[0];

        assert!(scenario.reordering_occurred());
        assert_eq!(scenario.pre_reflection_selection, None);
    }

    #[test]
    fn test_decision_time_truncates_to_whole_seconds() {
        let presented = at(0);
        let events = vec![
            Event::new(SESSION, "1", EventKind::ScenarioPresented, presented),
            select("1", "1a", ValueLabel::Safety, 1),
            Event::new(
                SESSION,
                "1",
                EventKind::DecisionConfirmed,
                presented + Duration::milliseconds(2_900),
            ),
        ];

        let session = resolve(&events, &[outcome("1", "1a")]);
        assert_eq!(session.scenarios[0].decision_time_seconds, 2);
    }

    #[test]
    fn test_negative_decision_time_is_clamped_and_flagged() {
        // Timeline built by hand in the wrong order
        let timeline = ScenarioTimeline {
            scenario_id: "1".to_string(),
            events: vec![
                event("1", EventKind::ScenarioPresented, 30),
                select("1", "1a", ValueLabel::Safety, 10),
                event("1", EventKind::DecisionConfirmed, 20),
            ],
            confirmed: true,
        };

        let mut warnings = Vec::new();
        let resolved =
            resolve_timeline(&timeline, Some(&outcome("1", "1a")), &mut warnings).unwrap();

        assert_eq!(resolved.decision_time_seconds, 0);
        assert_eq!(
            warnings,
            vec![DataQualityWarning::NegativeDecisionTime {
                scenario_id: "1".to_string(),
                raw_seconds: -10,
            }]
        );
    }

    #[test]
    fn test_pending_and_missing_outcomes_are_reported() {
        let events = vec![
            event("1", EventKind::ScenarioPresented, 0),
            select("1", "1a", ValueLabel::Safety, 5),
            event("1", EventKind::DecisionConfirmed, 10),
            event("2", EventKind::ScenarioPresented, 20),
            select("2", "2a", ValueLabel::Safety, 25),
        ];

        let session = resolve(&events, &[outcome("2", "2a")]);

        assert_eq!(session.scenarios.len(), 1);
        assert_eq!(session.pending_scenario_ids, vec!["2".to_string()]);
        assert_eq!(session.scenarios[0].final_outcome, None);
        assert_eq!(
            session.warnings,
            vec![
                DataQualityWarning::MissingOutcome {
                    scenario_id: "1".to_string()
                },
                DataQualityWarning::PendingScenario {
                    scenario_id: "2".to_string()
                },
                DataQualityWarning::UnusedOutcome {
                    scenario_id: "2".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_outcome_option_mismatch_is_flagged() {
        let events = vec![
            event("1", EventKind::ScenarioPresented, 0),
            select("1", "1a", ValueLabel::Safety, 5),
            event("1", EventKind::DecisionConfirmed, 10),
        ];

        let session = resolve(&events, &[outcome("1", "1b")]);

        assert!(session.warnings.iter().any(|w| matches!(
            w,
            DataQualityWarning::OutcomeOptionMismatch { outcome_option_id, .. } if outcome_option_id == "1b"
        )));
        assert_eq!(session.scenarios[0].final_selection.option_id, "1a");
    }

    #[test]
    fn test_invalid_and_duplicate_outcomes_are_rejected() {
        let events = vec![
            event("1", EventKind::ScenarioPresented, 0),
            select("1", "1a", ValueLabel::Safety, 5),
            event("1", EventKind::DecisionConfirmed, 10),
        ];
        let log = EventLogNormalizer::normalize(SESSION, &events).unwrap();

        let mut invalid = outcome("1", "1a");
        invalid.outcome_vector.human_casualties = -3.0;
        let result = ScenarioResolver::resolve(log.clone(), &[invalid]);
        assert!(matches!(result, Err(AnalyticsError::InvalidOutcome(_))));
        let message = result.unwrap_err().to_string();
        assert_eq!(message.matches("Invalid outcome vector").count(), 1);
        assert!(message.contains("scenario '1'"));

        let result = ScenarioResolver::resolve(log, &[outcome("1", "1a"), outcome("1", "1a")]);
        assert!(matches!(result, Err(AnalyticsError::InvalidOutcome(_))));
    }
}
