use crate::registry::*;

use linkme::distributed_slice;

const HW: EventType = EventType::Fixed(PERF_TYPE_HARDWARE);

static EVENTS: &[Event] = &[
    Event::new(HW, 0, "cpu-cycles", "Core cycles while the thread is not halted"),
    Event::new(HW, 1, "instructions", "Instructions retired"),
    Event::new(HW, 2, "cache-references", "Last level cache references"),
    Event::new(HW, 3, "cache-misses", "Last level cache misses"),
    Event::new(HW, 4, "branch-instructions", "Branch instructions retired"),
    Event::new(HW, 5, "branch-misses", "Mispredicted branch instructions"),
    Event::new(HW, 6, "bus-cycles", "Bus cycles"),
    Event::new(HW, 7, "stalled-cycles-frontend", "Cycles the frontend issued nothing"),
    Event::new(HW, 8, "stalled-cycles-backend", "Cycles the backend retired nothing"),
    Event::new(HW, 9, "ref-cycles", "Reference cycles, not affected by frequency scaling"),
];

#[distributed_slice(SOURCES)]
static HARDWARE: SourceDef = SourceDef::new(
    "hardware",
    "Generic hardware events mapped by the kernel for every PMU",
    EVENTS,
);
