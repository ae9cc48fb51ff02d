//! Session metrics encoder
//!
//! Both export forms are derived from the same [`SessionMetrics`] value:
//! a structured JSON document and a flat, one-row-per-session record.

use crate::error::AnalyticsError;
use crate::types::{DataQualityWarning, SessionAnalysis, SessionMetrics};
use crate::{ENGINE_VERSION, PRODUCER_NAME};
use serde::{Deserialize, Serialize};

/// Current metrics document schema version
pub const METRICS_SCHEMA_VERSION: &str = "session_metrics.v1";

/// Producer metadata embedded in metrics documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsProducer {
    pub name: String,
    pub version: String,
}

/// Structured metrics document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsDocument {
    pub schema_version: String,
    pub producer: MetricsProducer,
    pub metrics: SessionMetrics,
    pub warnings: Vec<DataQualityWarning>,
}

/// One named column of the flat record; `None` is an undefined metric
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatColumn {
    pub name: &'static str,
    pub value: Option<String>,
}

impl FlatColumn {
    fn new(name: &'static str, value: impl ToString) -> Self {
        Self {
            name,
            value: Some(value.to_string()),
        }
    }

    fn optional<T: ToString>(name: &'static str, value: Option<T>) -> Self {
        Self {
            name,
            value: value.map(|v| v.to_string()),
        }
    }
}

/// Encoder for session metrics exports
#[derive(Debug, Clone)]
pub struct MetricsEncoder {
    pretty: bool,
}

impl Default for MetricsEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsEncoder {
    /// Create an encoder producing pretty-printed JSON
    pub fn new() -> Self {
        Self { pretty: true }
    }

    /// Create an encoder producing single-line JSON
    pub fn compact() -> Self {
        Self { pretty: false }
    }

    /// Wrap an analysis into a metrics document
    pub fn encode(&self, analysis: &SessionAnalysis) -> MetricsDocument {
        MetricsDocument {
            schema_version: METRICS_SCHEMA_VERSION.to_string(),
            producer: MetricsProducer {
                name: PRODUCER_NAME.to_string(),
                version: ENGINE_VERSION.to_string(),
            },
            metrics: analysis.metrics.clone(),
            warnings: analysis.warnings.clone(),
        }
    }

    /// Encode to JSON string
    pub fn encode_to_json(&self, analysis: &SessionAnalysis) -> Result<String, AnalyticsError> {
        let document = self.encode(analysis);
        if self.pretty {
            serde_json::to_string_pretty(&document).map_err(AnalyticsError::JsonError)
        } else {
            serde_json::to_string(&document).map_err(AnalyticsError::JsonError)
        }
    }

    /// Scalar metrics as ordered named columns
    ///
    /// Per-scenario lists are left out; they belong to the structured document.
    pub fn flat_record(metrics: &SessionMetrics) -> Vec<FlatColumn> {
        vec![
            FlatColumn::new("session_id", &metrics.session_id),
            FlatColumn::new("finalized_scenario_count", metrics.finalized_scenario_count),
            FlatColumn::new("pending_scenario_count", metrics.pending_scenario_ids.len()),
            FlatColumn::new("cvr_arrivals", metrics.cvr_arrivals),
            FlatColumn::new("apa_reorderings", metrics.apa_reorderings),
            FlatColumn::new(
                "misalign_after_cvr_apa_count",
                metrics.misalign_after_cvr_apa_count,
            ),
            FlatColumn::new(
                "realign_after_cvr_apa_count",
                metrics.realign_after_cvr_apa_count,
            ),
            FlatColumn::new("switch_count_total", metrics.switch_count_total),
            FlatColumn::optional("avg_decision_time", metrics.avg_decision_time),
            FlatColumn::optional("value_consistency_index", metrics.value_consistency_index),
            FlatColumn::optional("performance_composite", metrics.performance_composite),
            FlatColumn::optional("balance_index", metrics.balance_index),
        ]
    }

    /// Flat record as CSV: a header line and one data line
    ///
    /// Undefined metrics are written as empty cells.
    pub fn encode_csv(metrics: &SessionMetrics) -> String {
        let columns = Self::flat_record(metrics);
        let header: Vec<String> = columns.iter().map(|c| escape_csv(c.name)).collect();
        let row: Vec<String> = columns
            .iter()
            .map(|c| c.value.as_deref().map(escape_csv).unwrap_or_default())
            .collect();
        format!("{}\n{}\n", header.join(","), row.join(","))
    }
}

fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
