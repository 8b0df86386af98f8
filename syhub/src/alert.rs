//! Threshold alerts over the latest telemetry readings.
//!
//! Each configured field has an acceptable `[min, max]` range. A field
//! alerts when its most recent sample is numeric and falls outside that
//! range. Missing fields and non-numeric samples never alert.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::snapshot::Snapshot;

/// Inclusive acceptable range for one field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    /// Lowest acceptable value.
    pub min: f64,
    /// Highest acceptable value.
    pub max: f64,
}

impl Threshold {
    /// Creates a threshold.
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Returns `true` if `value` lies within `[min, max]`.
    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// A field whose latest reading is out of range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    /// The offending field.
    pub field: String,
    /// Its latest reading.
    pub value: f64,
    /// Lowest acceptable value.
    pub min: f64,
    /// Highest acceptable value.
    pub max: f64,
}

/// Checks the latest reading of every thresholded field.
///
/// Alerts come back in field order.
pub fn evaluate_thresholds(
    snapshot: &Snapshot,
    thresholds: &BTreeMap<String, Threshold>,
) -> Vec<Alert> {
    thresholds
        .iter()
        .filter_map(|(field, threshold)| {
            let value = snapshot.latest(field).and_then(numeric_value)?;
            if threshold.contains(value) {
                return None;
            }
            Some(Alert {
                field: field.clone(),
                value,
                min: threshold.min,
                max: threshold.max,
            })
        })
        .collect()
}

/// Reads a sample as a finite number, accepting numeric strings as the feed
/// sometimes sends them. `"NaN"` and `"inf"` are not readings.
fn numeric_value(sample: &serde_json::Value) -> Option<f64> {
    let value = match sample {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    value.is_finite().then_some(value)
}
