//! Bounded, insertion-ordered sample sequences.
//!
//! A [`Series`] holds the most recent readings for one metric key. It is a
//! plain FIFO ring over a `VecDeque`: appends go to the back, and once the
//! series is at capacity every append evicts the oldest sample from the
//! front.
//!
//! # Design
//!
//! - Capacity is fixed at construction and is always at least 1
//! - `len() <= capacity()` holds after every operation
//! - Appends are O(1) amortized; copying out is O(n) in series length
//! - No weighting or priority: eviction is strictly oldest-first
//!
//! `Series` has no synchronization of its own. The
//! [`SeriesStore`](crate::store::SeriesStore) owns every series and guards
//! them behind its lock.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

use crate::Sample;

/// A fixed-capacity, oldest-first-evicting sequence of samples.
///
/// # Examples
///
/// ```rust
/// use std::num::NonZeroUsize;
/// use serde_json::json;
/// use syhub::series::Series;
///
/// let mut series = Series::new(NonZeroUsize::new(2).unwrap());
/// series.push(json!(1));
/// series.push(json!(2));
/// series.push(json!(3));
///
/// assert_eq!(series.to_vec(), vec![json!(2), json!(3)]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    /// Retained samples, oldest at the front.
    samples: VecDeque<Sample>,
    /// Maximum number of retained samples.
    capacity: NonZeroUsize,
}

impl Series {
    /// Creates an empty series that retains at most `capacity` samples.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.get()),
            capacity,
        }
    }

    /// Appends a sample, evicting the oldest samples until the series fits
    /// its capacity again.
    ///
    /// Returns the number of evicted samples.
    pub fn push(&mut self, sample: Sample) -> usize {
        self.samples.push_back(sample);

        let mut evicted = 0;
        while self.samples.len() > self.capacity.get() {
            self.samples.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Returns the maximum number of retained samples.
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Returns the number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if the series holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns `true` if the next push will evict a sample.
    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity.get()
    }

    /// Returns the most recent sample.
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Iterates over retained samples, oldest first.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Sample> + '_ {
        self.samples.iter()
    }

    /// Copies the retained samples out, oldest first.
    ///
    /// The returned vector shares nothing with the series.
    pub fn to_vec(&self) -> Vec<Sample> {
        self.samples.iter().cloned().collect()
    }
}
