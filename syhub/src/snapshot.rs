//! Point-in-time copies of the series store.
//!
//! A [`Snapshot`] owns its data outright. Once returned by
//! [`SeriesStore::snapshot`](crate::store::SeriesStore::snapshot) it can be
//! read, serialised and rendered without any further synchronization.
//!
//! [`SnapshotReader`] is the per-request entry point used by the dashboard:
//! every call to [`SnapshotReader::read`] takes exactly one fresh snapshot,
//! nothing is cached between requests.
//!
//! Every snapshot carries its capture time, exposed to clients as
//! `lastUpdate` in RFC 3339 form.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Serialize, Serializer};

use crate::store::SeriesStore;
use crate::{MetricKey, Sample};

/// An independent copy of every series in a store.
///
/// Keys are kept sorted so rendering and serialisation are stable. Equality
/// compares series contents only, not the capture time.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Retained samples per key, oldest first.
    series: BTreeMap<MetricKey, Vec<Sample>>,
    /// When the copy was taken.
    #[serde(rename = "lastUpdate", serialize_with = "serialize_rfc3339")]
    taken_at: SystemTime,
}

impl Snapshot {
    /// Wraps already-copied series data, stamping it with the current time.
    pub fn new(series: BTreeMap<MetricKey, Vec<Sample>>) -> Self {
        Self {
            series,
            taken_at: SystemTime::now(),
        }
    }

    /// Returns an empty snapshot.
    pub fn empty() -> Self {
        Self::new(BTreeMap::new())
    }

    /// Returns the samples for `key`, oldest first.
    pub fn get(&self, key: &str) -> Option<&[Sample]> {
        self.series.get(key).map(Vec::as_slice)
    }

    /// Returns `true` if the snapshot contains `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.series.contains_key(key)
    }

    /// Iterates over `(key, samples)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Sample])> + '_ {
        self.series
            .iter()
            .map(|(key, samples)| (key.as_str(), samples.as_slice()))
    }

    /// Iterates over keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.series.keys().map(String::as_str)
    }

    /// Returns the most recent sample for `key`.
    pub fn latest(&self, key: &str) -> Option<&Sample> {
        self.series.get(key).and_then(|samples| samples.last())
    }

    /// Returns the most recent sample for every key.
    pub fn latest_values(&self) -> BTreeMap<&str, &Sample> {
        self.series
            .iter()
            .filter_map(|(key, samples)| samples.last().map(|last| (key.as_str(), last)))
            .collect()
    }

    /// Returns the number of keys.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Returns `true` if the snapshot has no keys.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Returns the capture time as an RFC 3339 UTC timestamp with
    /// millisecond precision.
    pub fn last_update(&self) -> String {
        humantime::format_rfc3339_millis(self.taken_at).to_string()
    }

    /// Returns the latest value of every key plus a `lastUpdate` field.
    ///
    /// This is the payload of `/api/latest` and of each live update. A
    /// metric named `lastUpdate` is shadowed by the timestamp.
    pub fn latest_with_timestamp(&self) -> serde_json::Map<String, Sample> {
        let mut payload: serde_json::Map<String, Sample> = self
            .latest_values()
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();
        payload.insert(
            LAST_UPDATE_FIELD.to_string(),
            Sample::String(self.last_update()),
        );
        payload
    }
}

/// Name of the capture-time field in serialized snapshots.
pub const LAST_UPDATE_FIELD: &str = "lastUpdate";

fn serialize_rfc3339<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&humantime::format_rfc3339_millis(*time))
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.series == other.series
    }
}

/// Takes one fresh snapshot per rendering request.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    store: Arc<SeriesStore>,
}

impl SnapshotReader {
    /// Creates a reader over `store`.
    pub fn new(store: Arc<SeriesStore>) -> Self {
        Self { store }
    }

    /// Copies the current store contents.
    pub fn read(&self) -> Snapshot {
        self.store.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_snapshot() -> Snapshot {
        let mut series = BTreeMap::new();
        series.insert("pH".to_string(), vec![json!(6.7), json!(6.8)]);
        series.insert("EC".to_string(), vec![json!(1.2)]);
        series.insert("deviceID".to_string(), vec![json!("plt-404cca470da0")]);
        Snapshot::new(series)
    }

    #[test]
    fn test_keys_are_sorted() {
        let snapshot = sample_snapshot();
        let keys: Vec<_> = snapshot.keys().collect();
        assert_eq!(keys, vec!["EC", "deviceID", "pH"]);
    }

    #[test]
    fn test_latest_values() {
        let snapshot = sample_snapshot();
        let latest = snapshot.latest_values();
        assert_eq!(latest.get("pH"), Some(&&json!(6.8)));
        assert_eq!(latest.get("deviceID"), Some(&&json!("plt-404cca470da0")));
        assert_eq!(snapshot.latest("missing"), None);
    }

    #[test]
    fn test_serializes_as_key_to_samples_map() {
        let snapshot = sample_snapshot();
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["series"]["pH"], json!([6.7, 6.8]));
    }

    #[test]
    fn test_serializes_capture_time_as_last_update() {
        let snapshot = sample_snapshot();
        let value = serde_json::to_value(&snapshot).unwrap();
        let stamp = value["lastUpdate"].as_str().unwrap();

        assert_eq!(stamp, snapshot.last_update());
        assert!(humantime::parse_rfc3339(stamp).is_ok());
    }

    #[test]
    fn test_last_update_matches_taken_at() {
        let taken_at = SystemTime::UNIX_EPOCH + std::time::Duration::from_millis(1_700_000_000_123);
        let snapshot = Snapshot {
            series: BTreeMap::new(),
            taken_at,
        };
        assert_eq!(snapshot.last_update(), "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn test_latest_with_timestamp() {
        let snapshot = sample_snapshot();
        let payload = snapshot.latest_with_timestamp();

        assert_eq!(payload.len(), 4);
        assert_eq!(payload["pH"], json!(6.8));
        assert_eq!(payload["EC"], json!(1.2));
        assert_eq!(payload[LAST_UPDATE_FIELD], json!(snapshot.last_update()));
    }

    #[test]
    fn test_equality_ignores_capture_time() {
        let a = sample_snapshot();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = sample_snapshot();
        assert_eq!(a, b);
        assert_ne!(a, Snapshot::empty());
    }

    #[test]
    fn test_reader_sees_appends_between_reads() {
        let store = Arc::new(SeriesStore::new(5).unwrap());
        let reader = SnapshotReader::new(Arc::clone(&store));

        assert!(reader.read().is_empty());
        store.append("waterLevel", json!(75)).unwrap();

        let snapshot = reader.read();
        assert_eq!(snapshot.get("waterLevel"), Some(&[json!(75)][..]));
    }
}
