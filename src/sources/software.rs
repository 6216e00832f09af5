use crate::registry::*;

use linkme::distributed_slice;

const SW: EventType = EventType::Fixed(PERF_TYPE_SOFTWARE);

static EVENTS: &[Event] = &[
    Event::new(SW, 0, "cpu-clock", "Wall clock time on the CPU, in nanoseconds"),
    Event::new(SW, 1, "task-clock", "Time the task was running, in nanoseconds"),
    Event::new(SW, 2, "page-faults", "Page faults"),
    Event::new(SW, 3, "context-switches", "Context switches"),
    Event::new(SW, 4, "cpu-migrations", "Migrations to another CPU"),
    Event::new(SW, 5, "minor-faults", "Page faults served without I/O"),
    Event::new(SW, 6, "major-faults", "Page faults that required I/O"),
];

#[distributed_slice(SOURCES)]
static SOFTWARE: SourceDef = SourceDef::new(
    "software",
    "Kernel software events, available without a PMU",
    EVENTS,
);
