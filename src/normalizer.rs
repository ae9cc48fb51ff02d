//! Event log normalization
//!
//! This module turns an unordered session log into per-scenario timelines:
//! - Events sorted by timestamp, ties kept in log order
//! - Structural ordering invariants enforced
//! - Events after a scenario's confirmation dropped and reported

use crate::error::AnalyticsError;
use crate::types::{DataQualityWarning, Event, EventKind, NormalizedLog, ScenarioTimeline};
use std::collections::HashMap;
use tracing::debug;

/// Normalizer for raw session event logs
pub struct EventLogNormalizer;

impl EventLogNormalizer {
    /// Validate and order the events of one session
    ///
    /// Scenarios that were presented but never confirmed are kept as
    /// unconfirmed timelines so that in-progress sessions can still be scored.
    pub fn normalize(session_id: &str, events: &[Event]) -> Result<NormalizedLog, AnalyticsError> {
        if let Some(foreign) = events.iter().find(|e| e.session_id != session_id) {
            return Err(AnalyticsError::MalformedLog(format!(
                "event for session '{}' found in log of session '{}'",
                foreign.session_id, session_id
            )));
        }

        // sort_by_key is stable, so equal timestamps keep their log position
        let mut ordered: Vec<&Event> = events.iter().collect();
        ordered.sort_by_key(|e| e.timestamp);

        let mut timelines: Vec<ScenarioTimeline> = Vec::new();
        let mut dropped: Vec<u32> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();

        for event in ordered {
            let Some(slot) = index.get(event.scenario_id.as_str()).copied() else {
                if event.kind != EventKind::ScenarioPresented {
                    return Err(AnalyticsError::MalformedLog(format!(
                        "{} for scenario '{}' at {} precedes its presentation",
                        event.kind.as_str(),
                        event.scenario_id,
                        event.timestamp.to_rfc3339()
                    )));
                }
                index.insert(event.scenario_id.as_str(), timelines.len());
                timelines.push(ScenarioTimeline {
                    scenario_id: event.scenario_id.clone(),
                    events: vec![event.clone()],
                    confirmed: false,
                });
                dropped.push(0);
                continue;
            };

            let timeline = &mut timelines[slot];
            if timeline.confirmed {
                dropped[slot] += 1;
                continue;
            }

            match event.kind {
                EventKind::OptionSelected if event.option.is_none() => {
                    return Err(AnalyticsError::MalformedLog(format!(
                        "option_selected for scenario '{}' at {} carries no option",
                        event.scenario_id,
                        event.timestamp.to_rfc3339()
                    )));
                }
                EventKind::DecisionConfirmed => {
                    let has_selection = timeline
                        .events
                        .iter()
                        .any(|e| e.kind == EventKind::OptionSelected);
                    if !has_selection {
                        return Err(AnalyticsError::MalformedLog(format!(
                            "decision_confirmed for scenario '{}' at {} has no preceding option_selected",
                            event.scenario_id,
                            event.timestamp.to_rfc3339()
                        )));
                    }
                    timeline.confirmed = true;
                }
                _ => {}
            }

            timeline.events.push(event.clone());
        }

        let warnings: Vec<DataQualityWarning> = timelines
            .iter()
            .zip(&dropped)
            .filter(|&(_, &count)| count > 0)
            .map(|(timeline, &count)| {
                debug!(
                    scenario_id = %timeline.scenario_id,
                    dropped = count,
                    "ignoring events logged after confirmation"
                );
                DataQualityWarning::EventsAfterConfirmation {
                    scenario_id: timeline.scenario_id.clone(),
                    dropped: count,
                }
            })
            .collect();

        debug!(
            session_id,
            events = events.len(),
            scenarios = timelines.len(),
            "normalized event log"
        );

        Ok(NormalizedLog {
            session_id: session_id.to_string(),
            timelines,
            warnings,
        })
    }
}
