//! Counters describing the instrumentation itself.
//!
//! Exact intervals are not counted here, a shared counter bumped on every
//! stage call would bounce its cache line between workers. Per-stage call
//! counts live in the statistics tables instead.

use metriken::*;

#[metric(
    name = "perfmon_intervals_dropped",
    description = "Measured intervals discarded because the counters did not run or could not be read",
    metadata = { unit = "intervals" }
)]
pub static INTERVALS_DROPPED: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "perfmon_intervals_multiplexed",
    description = "Measured intervals scaled up because the counter group was multiplexed",
    metadata = { unit = "intervals" }
)]
pub static INTERVALS_MULTIPLEXED: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "perfmon_read_retries_exhausted",
    description = "Counter page reads that never observed a stable sequence",
    metadata = { unit = "reads" }
)]
pub static READ_RETRIES_EXHAUSTED: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "perfmon_activations",
    description = "Bundles successfully started",
    metadata = { unit = "activations" }
)]
pub static ACTIVATIONS: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "perfmon_activation_failures",
    description = "Bundle starts that failed and were unwound",
    metadata = { unit = "activations" }
)]
pub static ACTIVATION_FAILURES: LazyCounter = LazyCounter::new(Counter::default);
