//! The per-worker measurement state and the dispatch wrapper.

use crate::metrics::{INTERVALS_DROPPED, INTERVALS_MULTIPLEXED};
use crate::registry::Bundle;
use crate::stats::{correct, Correction, Reading, Snapshot, StatsTable};
use crate::PERF_MAX_EVENTS;

use thiserror::Error;

use std::sync::Arc;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("counter page was not stable after {0} attempts")]
    Unstable(usize),
    #[error("no counters to read")]
    NoCounters,
}

/// Takes a [`Reading`] of a counter group from the thread being measured.
pub trait CounterReader: Send + Sync {
    fn read(&self, reading: &mut Reading) -> Result<(), ReadError>;
}

/// Measurement state of one worker while a node-scoped bundle runs.
pub struct WorkerRuntime {
    worker: usize,
    n_values: usize,
    bundle: Arc<Bundle>,
    stats: Arc<StatsTable>,
    reader: Box<dyn CounterReader>,
}

impl WorkerRuntime {
    pub fn new(
        worker: usize,
        bundle: Arc<Bundle>,
        stats: Arc<StatsTable>,
        reader: Box<dyn CounterReader>,
    ) -> Self {
        Self {
            worker,
            n_values: bundle.n_values().min(PERF_MAX_EVENTS),
            bundle,
            stats,
            reader,
        }
    }

    pub fn worker(&self) -> usize {
        self.worker
    }

    pub fn bundle(&self) -> &Arc<Bundle> {
        &self.bundle
    }

    pub fn n_values(&self) -> usize {
        self.n_values
    }

    pub fn n_stages(&self) -> usize {
        self.stats.len()
    }

    pub fn snapshot(&self, stage: usize) -> Option<Snapshot> {
        self.stats.get(stage).map(|s| s.snapshot(self.n_values))
    }

    /// Runs a stage in place of the scheduler's direct call.
    ///
    /// The counters are read immediately before and after `f`. The corrected
    /// deltas, one call and the units `f` returns are added to the stage's
    /// statistics. The return value of `f` is passed through unchanged. If
    /// either reading fails or the group did not run during the call, the
    /// interval is dropped and nothing is recorded.
    #[inline]
    pub fn dispatch<F: FnOnce() -> u64>(&self, stage: usize, f: F) -> u64 {
        let mut pre = Reading::default();
        let pre_ok = self.reader.read(&mut pre).is_ok();

        let units = f();

        let mut post = Reading::default();
        let post_ok = self.reader.read(&mut post).is_ok();

        if !(pre_ok && post_ok) {
            INTERVALS_DROPPED.increment();
            return units;
        }

        let mut deltas = [0; PERF_MAX_EVENTS];

        match correct(&pre, &post, &mut deltas) {
            Correction::Exact => {}
            Correction::Scaled => {
                INTERVALS_MULTIPLEXED.increment();
            }
            Correction::Dropped => {
                INTERVALS_DROPPED.increment();
                trace!("worker {} stage {stage}: counters did not run", self.worker);
                return units;
            }
        }

        if let Some(stats) = self.stats.get(stage) {
            stats.record(units, &deltas[..self.n_values]);
        }

        units
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::*;

    use parking_lot::Mutex;

    use std::collections::VecDeque;

    /// Replays a fixed sequence of readings.
    struct Replay(Mutex<VecDeque<Reading>>);

    impl Replay {
        fn new(readings: Vec<(u64, u64, [u64; 2])>) -> Box<Self> {
            Box::new(Self(Mutex::new(
                readings
                    .into_iter()
                    .map(|(time_enabled, time_running, values)| {
                        let mut reading = Reading {
                            nr: 2,
                            time_enabled,
                            time_running,
                            ..Default::default()
                        };
                        reading.value[..2].copy_from_slice(&values);
                        reading
                    })
                    .collect(),
            )))
        }
    }

    impl CounterReader for Replay {
        fn read(&self, reading: &mut Reading) -> Result<(), ReadError> {
            *reading = self.0.lock().pop_front().ok_or(ReadError::NoCounters)?;
            Ok(())
        }
    }

    fn bundle() -> Arc<Bundle> {
        static EVENTS: &[Event] = &[
            Event::new(EventType::Fixed(PERF_TYPE_HARDWARE), 0, "cycles", ""),
            Event::new(EventType::Fixed(PERF_TYPE_HARDWARE), 1, "instructions", ""),
        ];

        fn format(_: &Snapshot, _: usize) -> String {
            String::new()
        }

        let mut registry = Registry::new(Default::default());
        registry
            .register_source(SourceDef::new("test", "", EVENTS))
            .unwrap();
        registry
            .register_bundle(BundleDef {
                name: "test",
                description: "",
                source: "test",
                footer: None,
                bundle_type: BundleType::Node,
                offset_type: OffsetType::Mmap,
                events: &[0, 1],
                metrics: &[],
                cpu_supports: &[],
                init: None,
                column_headers: &[],
                format,
            })
            .unwrap()
    }

    #[test]
    fn passes_units_through() {
        let stats = Arc::new(StatsTable::new(2));
        let runtime = WorkerRuntime::new(
            0,
            bundle(),
            stats.clone(),
            Replay::new(vec![
                (10, 10, [100, 200]),
                (20, 20, [150, 260]),
                (30, 30, [150, 260]),
                (40, 40, [170, 300]),
            ]),
        );

        assert_eq!(runtime.dispatch(1, || 32), 32);
        assert_eq!(runtime.dispatch(1, || 8), 8);

        let snapshot = runtime.snapshot(1).unwrap();
        assert_eq!(snapshot.calls, 2);
        assert_eq!(snapshot.units, 40);
        assert_eq!(snapshot.values(), &[70, 100]);

        assert_eq!(runtime.snapshot(0).unwrap().calls, 0);
    }

    #[test]
    fn multiplexed_interval_is_scaled() {
        let runtime = WorkerRuntime::new(
            0,
            bundle(),
            Arc::new(StatsTable::new(1)),
            Replay::new(vec![(100, 50, [0, 0]), (300, 150, [10, 30])]),
        );

        runtime.dispatch(0, || 1);

        assert_eq!(runtime.snapshot(0).unwrap().values(), &[20, 60]);
    }

    #[test]
    fn idle_group_records_nothing() {
        let runtime = WorkerRuntime::new(
            0,
            bundle(),
            Arc::new(StatsTable::new(1)),
            Replay::new(vec![
                (10, 10, [1, 1]),
                (20, 20, [2, 3]),
                (30, 20, [2, 3]),
                (40, 20, [9, 9]),
            ]),
        );

        runtime.dispatch(0, || 4);
        let before = runtime.snapshot(0).unwrap();

        assert_eq!(runtime.dispatch(0, || 4), 4);
        assert_eq!(runtime.snapshot(0).unwrap(), before);
    }

    #[test]
    fn failed_read_still_calls_the_stage() {
        let runtime = WorkerRuntime::new(
            0,
            bundle(),
            Arc::new(StatsTable::new(1)),
            Replay::new(Vec::new()),
        );

        let mut called = false;
        assert_eq!(
            runtime.dispatch(0, || {
                called = true;
                3
            }),
            3
        );
        assert!(called);
        assert_eq!(runtime.snapshot(0).unwrap().calls, 0);
    }
}
