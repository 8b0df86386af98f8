//! Ingestion of decoded telemetry messages into the series store.
//!
//! The feed transport hands the adapter raw payloads, one message each. A
//! payload is a JSON object mapping field names to readings:
//!
//! ```json
//! {"temperature": 25.5, "pH": 6.8, "TDS": 600}
//! ```
//!
//! Decoding happens before the store lock is taken. A payload that cannot
//! be decoded is logged, counted and dropped; it never touches the store and
//! never stops the adapter from applying the next message.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Receiver;

use serde::Serialize;

use crate::error::{DecodeError, Result};
use crate::store::SeriesStore;
use crate::{MetricKey, Sample};

/// Decodes one payload into its `(field, value)` pairs.
///
/// # Errors
///
/// Returns [`DecodeError`] if the payload is not UTF-8, not JSON, or not a
/// JSON object.
pub fn decode_message(payload: &[u8]) -> std::result::Result<Vec<(MetricKey, Sample)>, DecodeError> {
    let text = std::str::from_utf8(payload).map_err(|source| DecodeError::Utf8 { source })?;
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|source| DecodeError::Json { source })?;

    match value {
        serde_json::Value::Object(fields) => Ok(fields.into_iter().collect()),
        other => Err(DecodeError::NotAnObject {
            found: json_type_name(&other),
        }),
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Running counters for the ingestion path.
#[derive(Debug, Default)]
pub struct IngestStats {
    messages_applied: AtomicU64,
    messages_rejected: AtomicU64,
    samples_appended: AtomicU64,
    fields_dropped: AtomicU64,
}

impl IngestStats {
    /// Returns a plain copy of the counters.
    pub fn summary(&self) -> IngestSummary {
        IngestSummary {
            messages_applied: self.messages_applied.load(Ordering::Relaxed),
            messages_rejected: self.messages_rejected.load(Ordering::Relaxed),
            samples_appended: self.samples_appended.load(Ordering::Relaxed),
            fields_dropped: self.fields_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`IngestStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct IngestSummary {
    /// Messages that were decoded and applied.
    pub messages_applied: u64,
    /// Messages that failed to decode or carried an empty key.
    pub messages_rejected: u64,
    /// Samples appended to the store.
    pub samples_appended: u64,
    /// Fields dropped because they were not on the allowlist.
    pub fields_dropped: u64,
}

/// Applies decoded telemetry messages to a [`SeriesStore`].
#[derive(Debug)]
pub struct IngestionAdapter {
    store: Arc<SeriesStore>,
    allowed_fields: Option<BTreeSet<String>>,
    stats: Arc<IngestStats>,
}

impl IngestionAdapter {
    /// Creates an adapter that accepts every field.
    pub fn new(store: Arc<SeriesStore>) -> Self {
        Self {
            store,
            allowed_fields: None,
            stats: Arc::new(IngestStats::default()),
        }
    }

    /// Restricts ingestion to the given field names.
    ///
    /// Fields outside the allowlist are dropped; the rest of the message is
    /// still applied.
    #[must_use]
    pub fn with_allowed_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Returns a shared handle to the adapter's counters.
    pub fn stats(&self) -> Arc<IngestStats> {
        Arc::clone(&self.stats)
    }

    /// Decodes `payload` and applies it to the store.
    ///
    /// Returns the number of samples appended.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the payload is malformed (the store is not
    /// touched), or a store error if some field had an empty key (the other
    /// fields have been applied).
    pub fn try_ingest(&self, payload: &[u8]) -> Result<usize> {
        let fields = match decode_message(payload) {
            Ok(fields) => fields,
            Err(e) => {
                self.stats.messages_rejected.fetch_add(1, Ordering::Relaxed);
                return Err(e.into());
            }
        };

        let fields = self.filter_fields(fields);
        let count = fields.iter().filter(|(key, _)| !key.is_empty()).count() as u64;

        let result = self.store.apply_batch(fields);
        self.stats.samples_appended.fetch_add(count, Ordering::Relaxed);
        match &result {
            Ok(_) => self.stats.messages_applied.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.stats.messages_rejected.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    /// Decodes and applies `payload`, logging instead of returning errors.
    ///
    /// Returns `true` if the whole message was applied.
    pub fn ingest(&self, payload: &[u8]) -> bool {
        match self.try_ingest(payload) {
            Ok(applied) => {
                tracing::trace!(applied, "telemetry message applied");
                true
            }
            Err(e) => {
                tracing::warn!("dropping telemetry message: {e}");
                false
            }
        }
    }

    /// Applies every payload received on `messages` until all senders are
    /// dropped.
    ///
    /// Intended to run on a dedicated ingestion thread.
    pub fn run(&self, messages: &Receiver<Vec<u8>>) {
        tracing::info!("telemetry ingestion started");
        for payload in messages {
            self.ingest(&payload);
        }
        tracing::info!("telemetry feed closed, ingestion stopped");
    }

    fn filter_fields(&self, fields: Vec<(MetricKey, Sample)>) -> Vec<(MetricKey, Sample)> {
        let Some(allowed) = &self.allowed_fields else {
            return fields;
        };

        let before = fields.len();
        let kept: Vec<_> = fields
            .into_iter()
            .filter(|(key, _)| {
                let keep = allowed.contains(key);
                if !keep {
                    tracing::debug!(field = %key, "dropping field not on allowlist");
                }
                keep
            })
            .collect();

        let dropped = (before - kept.len()) as u64;
        if dropped > 0 {
            self.stats.fields_dropped.fetch_add(dropped, Ordering::Relaxed);
        }
        kept
    }
}
