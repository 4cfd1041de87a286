//! Published forecast set
//!
//! The scheduler builds a complete [`ForecastSet`] off to the side and swaps
//! it in with one pointer store. Detectors load a snapshot and do their
//! lookup against it, so they see either the whole old set or the whole new
//! one and never wait on the writer.

use crate::core::{ForecastPoint, MinuteBucket};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One generation of forecast points keyed by minute bucket
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastSet {
    generation: u64,
    generated_at: Option<DateTime<Utc>>,
    points: BTreeMap<MinuteBucket, ForecastPoint>,
}

impl ForecastSet {
    /// The set in effect before anything was ever published
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set; a later point for the same bucket replaces an earlier one
    pub fn new(generation: u64, generated_at: DateTime<Utc>, points: Vec<ForecastPoint>) -> Self {
        Self {
            generation,
            generated_at: Some(generated_at),
            points: points.into_iter().map(|p| (p.minute_bucket, p)).collect(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn generated_at(&self) -> Option<DateTime<Utc>> {
        self.generated_at
    }

    pub fn get(&self, bucket: &MinuteBucket) -> Option<&ForecastPoint> {
        self.points.get(bucket)
    }

    /// Points in bucket order
    pub fn points(&self) -> impl Iterator<Item = &ForecastPoint> {
        self.points.values()
    }

    /// First and last covered bucket
    pub fn span(&self) -> Option<(MinuteBucket, MinuteBucket)> {
        let first = *self.points.keys().next()?;
        let last = *self.points.keys().next_back()?;
        Some((first, last))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Shared handle to the currently published forecast set
#[derive(Debug)]
pub struct ForecastStore {
    current: ArcSwap<ForecastSet>,
}

impl ForecastStore {
    pub fn new(initial: ForecastSet) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Consistent view of the current set
    pub fn snapshot(&self) -> Arc<ForecastSet> {
        self.current.load_full()
    }

    /// Replace the whole set, returning the one it superseded
    pub fn publish(&self, set: ForecastSet) -> Arc<ForecastSet> {
        log::debug!(
            "Publishing forecast generation {} ({} points)",
            set.generation(),
            set.len()
        );
        self.current.swap(Arc::new(set))
    }

    /// Forecast point for a bucket in the current set
    pub fn lookup(&self, bucket: &MinuteBucket) -> Option<ForecastPoint> {
        self.current.load().get(bucket).copied()
    }
}

impl Default for ForecastStore {
    fn default() -> Self {
        Self::new(ForecastSet::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn start() -> MinuteBucket {
        MinuteBucket::containing(Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap())
    }

    fn uniform_set(generation: u64, watts: f64) -> ForecastSet {
        let points = (0..60)
            .map(|i| ForecastPoint {
                minute_bucket: start().offset_minutes(i),
                expected_power: watts,
                spike_threshold: watts * 1.5,
            })
            .collect();
        ForecastSet::new(generation, start().start(), points)
    }

    #[test]
    fn test_publish_replaces_everything() {
        let store = ForecastStore::default();
        assert!(store.snapshot().is_empty());
        assert!(store.lookup(&start()).is_none());

        let previous = store.publish(uniform_set(1, 40.0));
        assert!(previous.is_empty());

        // Second generation covers a later hour only
        let later: Vec<ForecastPoint> = (60..120)
            .map(|i| ForecastPoint {
                minute_bucket: start().offset_minutes(i),
                expected_power: 80.0,
                spike_threshold: 120.0,
            })
            .collect();
        store.publish(ForecastSet::new(2, start().start(), later));

        assert!(store.lookup(&start()).is_none());
        assert_eq!(store.lookup(&start().offset_minutes(60)).map(|p| p.expected_power), Some(80.0));
        assert_eq!(store.snapshot().generation(), 2);
        assert_eq!(store.snapshot().span(), Some((start().offset_minutes(60), start().offset_minutes(119))));
    }

    #[test]
    fn test_readers_never_see_mixed_generations() {
        let store = Arc::new(ForecastStore::new(uniform_set(0, 0.0)));
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    while !done.load(Ordering::Relaxed) {
                        let snapshot = store.snapshot();
                        let expected = snapshot.generation() as f64;
                        assert_eq!(snapshot.len(), 60);
                        assert!(snapshot.points().all(|p| p.expected_power == expected));
                    }
                })
            })
            .collect();

        for generation in 1..200u64 {
            store.publish(uniform_set(generation, generation as f64));
        }
        done.store(true, Ordering::Relaxed);

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
