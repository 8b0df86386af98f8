//! Thread-safe store of bounded telemetry series.
//!
//! The [`SeriesStore`] is the single owner of every retained sample. It maps
//! metric keys to [`Series`] and exposes exactly three ways in: [`append`],
//! [`apply_batch`] and [`snapshot`]. The lock that keeps writers and readers
//! apart never leaves this module.
//!
//! # Design
//!
//! - One coarse `Mutex` guards the whole key map
//! - Series are created lazily on first append and never removed
//! - Critical sections cover only in-memory work: a push plus bounded pops on
//!   the write side, a copy of every series on the read side
//! - Readers receive owned copies; nothing returned by the store aliases its
//!   internal state
//!
//! A snapshot is taken under the same lock as appends, so every series in it
//! reflects a state that actually existed between two appends. A batch is
//! applied under one lock acquisition, but no cross-key ordering is promised.
//!
//! [`append`]: SeriesStore::append
//! [`apply_batch`]: SeriesStore::apply_batch
//! [`snapshot`]: SeriesStore::snapshot
//!
//! # Example Usage
//!
//! ```rust
//! use syhub::store::SeriesStore;
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SeriesStore::new(3)?;
//!
//! for reading in [20.5, 20.7, 20.9, 21.2] {
//!     store.append("temperature", json!(reading))?;
//! }
//!
//! let snapshot = store.snapshot();
//! assert_eq!(
//!     snapshot.get("temperature"),
//!     Some(&[json!(20.7), json!(20.9), json!(21.2)][..])
//! );
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Result, StoreError};
use crate::series::Series;
use crate::snapshot::Snapshot;
use crate::{MetricKey, Sample};

/// Number of samples retained per key when no capacity is configured.
pub const DEFAULT_MAX_POINTS: usize = 10;

const DEFAULT_CAPACITY: NonZeroUsize = NonZeroUsize::new(DEFAULT_MAX_POINTS).unwrap();

/// Keyed collection of bounded series, safe to share across threads.
///
/// Wrap it in an `Arc` and hand a clone to every component that needs it;
/// there is no global instance.
///
/// # Thread Safety
///
/// All methods take `&self`. Appends and snapshots are mutually exclusive,
/// so a snapshot never sees a series halfway through an append.
#[derive(Debug)]
pub struct SeriesStore {
    /// Series indexed by metric key.
    series: Mutex<HashMap<MetricKey, Series>>,
    /// Maximum number of samples retained per key.
    capacity: NonZeroUsize,
}

impl SeriesStore {
    /// Creates an empty store retaining at most `capacity` samples per key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ZeroCapacity`] if `capacity` is 0.
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or(StoreError::ZeroCapacity)?;
        Ok(Self {
            series: Mutex::new(HashMap::new()),
            capacity,
        })
    }

    /// Creates an empty store retaining [`DEFAULT_MAX_POINTS`] samples per key.
    pub fn with_default_capacity() -> Self {
        Self {
            series: Mutex::new(HashMap::new()),
            capacity: DEFAULT_CAPACITY,
        }
    }

    /// Returns the maximum number of samples retained per key.
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Appends a sample to the series for `key`, creating the series if it
    /// does not exist yet.
    ///
    /// If the series is already full, its oldest sample is evicted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] if `key` is empty. The store is left
    /// untouched in that case.
    pub fn append(&self, key: &str, value: Sample) -> Result<()> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey.into());
        }

        let mut series = self.lock();
        Self::push_locked(&mut series, self.capacity, key, value);
        Ok(())
    }

    /// Appends every `(key, sample)` pair in `fields`.
    ///
    /// The batch is applied under a single lock acquisition. Entries with an
    /// empty key are skipped; every other entry is still applied. Field order
    /// within the batch carries no meaning across keys.
    ///
    /// Returns the number of samples appended.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] if at least one entry had an empty
    /// key. The valid entries of the batch have been applied by then.
    pub fn apply_batch<I, K>(&self, fields: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, Sample)>,
        K: AsRef<str>,
    {
        let mut applied = 0;
        let mut rejected = 0;

        {
            let mut series = self.lock();
            for (key, value) in fields {
                let key = key.as_ref();
                if key.is_empty() {
                    rejected += 1;
                    continue;
                }
                Self::push_locked(&mut series, self.capacity, key, value);
                applied += 1;
            }
        }

        if rejected > 0 {
            return Err(StoreError::InvalidKey.into());
        }
        Ok(applied)
    }

    /// Returns an independent copy of every series in the store.
    ///
    /// Samples are deep-copied, so later appends (or mutation of anything the
    /// caller appended) never show through a returned snapshot.
    pub fn snapshot(&self) -> Snapshot {
        let copied: BTreeMap<MetricKey, Vec<Sample>> = {
            let series = self.lock();
            series
                .iter()
                .map(|(key, series)| (key.clone(), series.to_vec()))
                .collect()
        };
        Snapshot::new(copied)
    }

    /// Returns the number of keys in the store.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns the number of samples retained for `key`, if the key exists.
    pub fn series_len(&self, key: &str) -> Option<usize> {
        self.lock().get(key).map(Series::len)
    }

    /// Returns a copy of the most recent sample for `key`.
    pub fn latest(&self, key: &str) -> Option<Sample> {
        self.lock().get(key).and_then(Series::latest).cloned()
    }

    /// Acquires the series map.
    ///
    /// A panic while the lock is held cannot leave a series torn (each
    /// mutation is one push and bounded pops on a `VecDeque`), so a poisoned
    /// lock is recovered instead of propagated.
    fn lock(&self) -> MutexGuard<'_, HashMap<MetricKey, Series>> {
        self.series.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pushes into the series for `key`, creating it on first use.
    fn push_locked(
        series: &mut HashMap<MetricKey, Series>,
        capacity: NonZeroUsize,
        key: &str,
        value: Sample,
    ) {
        match series.get_mut(key) {
            Some(existing) => {
                existing.push(value);
            }
            None => {
                let mut fresh = Series::new(capacity);
                fresh.push(value);
                series.insert(key.to_string(), fresh);
            }
        }
    }
}

impl Default for SeriesStore {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyhubError;
    use serde_json::json;

    #[test]
    fn test_new_rejects_zero_capacity() {
        let err = SeriesStore::new(0).unwrap_err();
        assert!(matches!(err, SyhubError::Store(StoreError::ZeroCapacity)));
    }

    #[test]
    fn test_default_capacity() {
        let store = SeriesStore::default();
        assert_eq!(store.capacity(), DEFAULT_MAX_POINTS);
        assert!(store.is_empty());
    }

    #[test]
    fn test_append_creates_series_lazily() {
        let store = SeriesStore::new(4).unwrap();
        assert_eq!(store.series_len("pH"), None);

        store.append("pH", json!(6.8)).unwrap();
        assert_eq!(store.series_len("pH"), Some(1));
        assert_eq!(store.len(), 1);
        assert_eq!(store.latest("pH"), Some(json!(6.8)));
    }

    #[test]
    fn test_append_empty_key_leaves_store_unchanged() {
        let store = SeriesStore::new(4).unwrap();
        store.append("EC", json!(1.2)).unwrap();
        let before = store.snapshot();

        let err = store.append("", json!(5)).unwrap_err();
        assert!(matches!(err, SyhubError::Store(StoreError::InvalidKey)));

        assert_eq!(store.snapshot(), before);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_fifo_eviction_keeps_last_capacity_values() {
        let capacity = 10;
        let store = SeriesStore::new(capacity).unwrap();
        for i in 0..capacity + 3 {
            store.append("distance", json!(i)).unwrap();
        }

        let snapshot = store.snapshot();
        let expected: Vec<_> = (3..capacity + 3).map(|i| json!(i)).collect();
        assert_eq!(snapshot.get("distance"), Some(expected.as_slice()));
    }

    #[test]
    fn test_apply_batch_appends_each_field() {
        let store = SeriesStore::new(10).unwrap();
        let applied = store
            .apply_batch([("a", json!(1)), ("b", json!(2))])
            .unwrap();
        assert_eq!(applied, 2);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.get("a"), Some(&[json!(1)][..]));
        assert_eq!(snapshot.get("b"), Some(&[json!(2)][..]));
    }

    #[test]
    fn test_apply_batch_skips_empty_keys_but_applies_rest() {
        let store = SeriesStore::new(10).unwrap();
        let err = store
            .apply_batch([("TDS", json!(600)), ("", json!(1)), ("ORP", json!(350))])
            .unwrap_err();
        assert!(matches!(err, SyhubError::Store(StoreError::InvalidKey)));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("TDS"), Some(&[json!(600)][..]));
        assert_eq!(snapshot.get("ORP"), Some(&[json!(350)][..]));
    }

    #[test]
    fn test_snapshot_is_independent_of_later_appends() {
        let store = SeriesStore::new(2).unwrap();
        store.append("temperature", json!(25.5)).unwrap();
        let snapshot = store.snapshot();

        store.append("temperature", json!(26.0)).unwrap();
        store.append("temperature", json!(26.5)).unwrap();

        assert_eq!(snapshot.get("temperature"), Some(&[json!(25.5)][..]));
    }

    #[test]
    fn test_snapshot_deep_copies_structured_samples() {
        let store = SeriesStore::new(2).unwrap();
        let mut reading = json!({ "value": 7.1, "unit": "pH" });
        store.append("probe", reading.clone()).unwrap();

        let snapshot = store.snapshot();
        reading["value"] = json!(9.9);
        store.append("probe", reading).unwrap();

        let first = &snapshot.get("probe").unwrap()[0];
        assert_eq!(first["value"], json!(7.1));
    }

    #[test]
    fn test_sequential_snapshots_are_equal_without_appends() {
        let store = SeriesStore::new(3).unwrap();
        store.apply_batch([("x", json!(1)), ("y", json!("on"))]).unwrap();

        let first = store.snapshot();
        let second = store.snapshot();
        assert_eq!(first, second);
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        use std::sync::Arc;

        let store = Arc::new(SeriesStore::new(3).unwrap());
        store.append("level", json!(75)).unwrap();

        let poisoner = Arc::clone(&store);
        let result = std::thread::spawn(move || {
            let _guard = poisoner.lock();
            panic!("poison the store lock");
        })
        .join();
        assert!(result.is_err());

        store.append("level", json!(76)).unwrap();
        assert_eq!(store.series_len("level"), Some(2));
    }
}
