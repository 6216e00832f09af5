//! Counter readings, multiplexing correction and per-stage statistics.

use crate::PERF_MAX_EVENTS;

use std::sync::atomic::{fence, AtomicU64, Ordering};

/// A snapshot of one counter group.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Reading {
    /// The number of valid entries in `value`.
    pub nr: usize,
    /// Nanoseconds the group was enabled.
    pub time_enabled: u64,
    /// Nanoseconds the group was resident on the PMU.
    pub time_running: u64,
    pub value: [u64; PERF_MAX_EVENTS],
}

impl Reading {
    pub fn values(&self) -> &[u64] {
        &self.value[..self.nr.min(PERF_MAX_EVENTS)]
    }
}

/// The outcome of correcting an interval between two readings.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Correction {
    /// The group was resident the whole interval.
    Exact,
    /// The group was multiplexed and the deltas were scaled up.
    Scaled,
    /// The group never ran during the interval, nothing can be attributed.
    Dropped,
}

/// Computes the per-event deltas between two readings of the same group.
///
/// When the group ran for only part of the interval each delta is scaled by
/// `enabled / running`. When it did not run at all the interval is dropped
/// and `deltas` is left untouched.
#[inline]
pub fn correct(pre: &Reading, post: &Reading, deltas: &mut [u64; PERF_MAX_EVENTS]) -> Correction {
    let enabled = post.time_enabled.saturating_sub(pre.time_enabled);
    let running = post.time_running.saturating_sub(pre.time_running);

    if running == 0 {
        return Correction::Dropped;
    }

    let n = post.nr.min(PERF_MAX_EVENTS);

    for ((delta, post), pre) in deltas[..n]
        .iter_mut()
        .zip(&post.value[..n])
        .zip(&pre.value[..n])
    {
        *delta = post.saturating_sub(*pre);
    }

    if running < enabled {
        for delta in deltas[..n].iter_mut() {
            *delta = scale(*delta, enabled, running);
        }

        Correction::Scaled
    } else {
        Correction::Exact
    }
}

#[inline]
fn scale(value: u64, enabled: u64, running: u64) -> u64 {
    let scaled = value as u128 * enabled as u128 / running as u128;
    scaled.min(u64::MAX as u128) as u64
}

/// Accumulated statistics as presented to a formatter.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub calls: u64,
    /// Units of work reported by the stage, typically packets.
    pub units: u64,
    pub time_enabled: u64,
    pub time_running: u64,
    /// The number of valid entries in `value`.
    pub len: usize,
    pub value: [u64; PERF_MAX_EVENTS],
}

impl Snapshot {
    pub fn values(&self) -> &[u64] {
        &self.value[..self.len.min(PERF_MAX_EVENTS)]
    }

    /// `value[index] / calls`, zero when there were no calls.
    pub fn per_call(&self, index: usize) -> f64 {
        ratio(self.value[index], self.calls)
    }

    /// `value[index] / units`, zero when no units were processed.
    pub fn per_unit(&self, index: usize) -> f64 {
        ratio(self.value[index], self.units)
    }

    /// `value[numerator] / value[denominator]`, zero on an empty denominator.
    pub fn ratio(&self, numerator: usize, denominator: usize) -> f64 {
        ratio(self.value[numerator], self.value[denominator])
    }
}

impl From<Reading> for Snapshot {
    fn from(reading: Reading) -> Self {
        Self {
            calls: 0,
            units: 0,
            time_enabled: reading.time_enabled,
            time_running: reading.time_running,
            len: reading.nr,
            value: reading.value,
        }
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Default)]
struct Generation {
    calls: AtomicU64,
    units: AtomicU64,
    value: [AtomicU64; PERF_MAX_EVENTS],
}

impl Generation {
    fn clear(&self) {
        self.calls.store(0, Ordering::Relaxed);
        self.units.store(0, Ordering::Relaxed);

        for v in &self.value {
            v.store(0, Ordering::Relaxed);
        }
    }
}

/// Statistics of one stage on one worker.
///
/// Only the owning worker calls [`record`]. Each update is written into the
/// generation readers are not looking at and then published by bumping
/// `seq`, whose parity selects the readable generation. Readers retry until
/// `seq` is unchanged across their read, so a snapshot never mixes two
/// updates.
///
/// [`record`]: NodeStats::record
#[repr(align(64))]
#[derive(Default)]
pub struct NodeStats {
    seq: AtomicU64,
    generation: [Generation; 2],
}

impl NodeStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one call, its units and the per-event deltas.
    #[inline]
    pub fn record(&self, units: u64, deltas: &[u64]) {
        let seq = self.seq.load(Ordering::Relaxed);
        let current = &self.generation[(seq & 1) as usize];
        let next = &self.generation[((seq + 1) & 1) as usize];

        // readers that observe any of the writes below must also observe the
        // previous publish
        fence(Ordering::Release);

        next.calls.store(
            current.calls.load(Ordering::Relaxed).wrapping_add(1),
            Ordering::Relaxed,
        );
        next.units.store(
            current.units.load(Ordering::Relaxed).wrapping_add(units),
            Ordering::Relaxed,
        );

        for (i, (next, current)) in next.value.iter().zip(&current.value).enumerate() {
            let delta = deltas.get(i).copied().unwrap_or(0);
            next.store(
                current.load(Ordering::Relaxed).wrapping_add(delta),
                Ordering::Relaxed,
            );
        }

        self.seq.store(seq.wrapping_add(1), Ordering::Release);
    }

    /// Reads the published generation.
    pub fn snapshot(&self, len: usize) -> Snapshot {
        loop {
            let seq = self.seq.load(Ordering::Acquire);
            let generation = &self.generation[(seq & 1) as usize];

            let mut snapshot = Snapshot {
                calls: generation.calls.load(Ordering::Relaxed),
                units: generation.units.load(Ordering::Relaxed),
                len: len.min(PERF_MAX_EVENTS),
                ..Default::default()
            };

            for (v, g) in snapshot.value.iter_mut().zip(&generation.value) {
                *v = g.load(Ordering::Relaxed);
            }

            fence(Ordering::Acquire);

            if self.seq.load(Ordering::Relaxed) == seq {
                return snapshot;
            }

            std::hint::spin_loop();
        }
    }

    /// Publishes an empty generation. The owning worker must not be inside
    /// [`record`](NodeStats::record).
    pub fn clear(&self) {
        let seq = self.seq.load(Ordering::Relaxed);
        let next = &self.generation[((seq + 1) & 1) as usize];

        fence(Ordering::Release);

        next.clear();

        self.seq.store(seq.wrapping_add(1), Ordering::Release);
    }
}

/// The statistics of every stage on one worker.
pub struct StatsTable {
    stages: Box<[NodeStats]>,
}

impl StatsTable {
    pub fn new(stages: usize) -> Self {
        Self {
            stages: (0..stages).map(|_| NodeStats::new()).collect(),
        }
    }

    pub fn get(&self, stage: usize) -> Option<&NodeStats> {
        self.stages.get(stage)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn clear(&self) {
        for stage in self.stages.iter() {
            stage.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn reading(time_enabled: u64, time_running: u64, values: &[u64]) -> Reading {
        let mut reading = Reading {
            nr: values.len(),
            time_enabled,
            time_running,
            ..Default::default()
        };
        reading.value[..values.len()].copy_from_slice(values);
        reading
    }

    #[test]
    fn exact_interval() {
        let mut deltas = [0; PERF_MAX_EVENTS];
        let pre = reading(100, 100, &[10, 20]);
        let post = reading(200, 200, &[15, 50]);

        assert_eq!(correct(&pre, &post, &mut deltas), Correction::Exact);
        assert_eq!(&deltas[..2], &[5, 30]);
    }

    #[test]
    fn multiplexed_interval_is_scaled() {
        let mut deltas = [0; PERF_MAX_EVENTS];
        let pre = reading(1_000, 500, &[0, 7]);
        let post = reading(1_000 + 2 * 333, 500 + 333, &[1_234, 7 + 999]);

        assert_eq!(correct(&pre, &post, &mut deltas), Correction::Scaled);
        assert_eq!(&deltas[..2], &[2 * 1_234, 2 * 999]);
    }

    #[test]
    fn interval_without_running_time_is_dropped() {
        let mut deltas = [0; PERF_MAX_EVENTS];
        let pre = reading(100, 50, &[1]);
        let post = reading(300, 50, &[100]);

        assert_eq!(correct(&pre, &post, &mut deltas), Correction::Dropped);
        assert_eq!(deltas, [0; PERF_MAX_EVENTS]);
    }

    #[test]
    fn counters_going_backwards_saturate() {
        let mut deltas = [0; PERF_MAX_EVENTS];
        let pre = reading(0, 0, &[100]);
        let post = reading(10, 10, &[5]);

        assert_eq!(correct(&pre, &post, &mut deltas), Correction::Exact);
        assert_eq!(deltas[0], 0);
    }

    #[test]
    fn record_and_clear() {
        let stats = NodeStats::new();

        stats.record(32, &[10, 1]);
        stats.record(16, &[5, 2]);

        let snapshot = stats.snapshot(2);
        assert_eq!(snapshot.calls, 2);
        assert_eq!(snapshot.units, 48);
        assert_eq!(snapshot.values(), &[15, 3]);
        assert_eq!(snapshot.per_call(0), 7.5);

        stats.clear();

        let snapshot = stats.snapshot(2);
        assert_eq!(snapshot.calls, 0);
        assert_eq!(snapshot.units, 0);
        assert_eq!(snapshot.values(), &[0, 0]);

        stats.record(1, &[1, 1]);
        assert_eq!(stats.snapshot(2).calls, 1);
    }

    #[test]
    fn aligned_to_cache_line() {
        assert_eq!(std::mem::align_of::<NodeStats>(), 64);

        let table = StatsTable::new(3);
        let a = table.get(0).unwrap() as *const NodeStats as usize;
        let b = table.get(1).unwrap() as *const NodeStats as usize;
        assert_eq!(a % 64, 0);
        assert!(b - a >= 64);
        assert!(table.get(3).is_none());
    }

    // every update adds 1 call, 3 units and (1, 2) so a consistent snapshot
    // always satisfies units == 3 * calls and value == calls * (1, 2)
    #[test]
    fn concurrent_reader_never_sees_a_torn_generation() {
        let stats = Arc::new(NodeStats::new());
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let stats = stats.clone();
            let done = done.clone();

            std::thread::spawn(move || {
                for _ in 0..200_000 {
                    stats.record(3, &[1, 2]);
                }
                done.store(true, Ordering::Release);
            })
        };

        let mut last = 0;

        while !done.load(Ordering::Acquire) {
            let snapshot = stats.snapshot(2);

            assert!(snapshot.calls >= last, "calls regressed");
            assert_eq!(snapshot.units, 3 * snapshot.calls);
            assert_eq!(snapshot.value[0], snapshot.calls);
            assert_eq!(snapshot.value[1], 2 * snapshot.calls);

            last = snapshot.calls;
        }

        writer.join().unwrap();

        assert_eq!(stats.snapshot(2).calls, 200_000);
    }

    // every cycle records five updates of (1 call, 3 units, (1..=8)) and
    // clears, so a consistent snapshot always has value[i] == (i + 1) * calls
    #[test]
    fn concurrent_reader_never_sees_a_partial_clear() {
        let stats = Arc::new(NodeStats::new());
        let done = Arc::new(AtomicBool::new(false));
        let deltas: Vec<u64> = (1..=PERF_MAX_EVENTS as u64).collect();

        let writer = {
            let stats = stats.clone();
            let done = done.clone();

            std::thread::spawn(move || {
                for _ in 0..40_000 {
                    for _ in 0..5 {
                        stats.record(3, &deltas);
                    }
                    stats.clear();
                }
                done.store(true, Ordering::Release);
            })
        };

        while !done.load(Ordering::Acquire) {
            let snapshot = stats.snapshot(PERF_MAX_EVENTS);

            assert!(snapshot.calls <= 5);
            assert_eq!(snapshot.units, 3 * snapshot.calls, "{snapshot:?}");

            for (i, value) in snapshot.values().iter().enumerate() {
                assert_eq!(*value, (i as u64 + 1) * snapshot.calls, "{snapshot:?}");
            }
        }

        writer.join().unwrap();

        let snapshot = stats.snapshot(PERF_MAX_EVENTS);
        assert_eq!(snapshot.calls, 0);
        assert_eq!(snapshot.values(), &[0; PERF_MAX_EVENTS]);
    }
}

