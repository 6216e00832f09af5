use perf_event::events::Event;

/// An event programmed from its perf type and config alone.
#[derive(Copy, Clone, Debug)]
pub struct RawEvent {
    event_type: u32,
    config: u64,
}

impl RawEvent {
    pub fn new(event_type: u32, config: u64) -> Self {
        Self { event_type, config }
    }
}

impl Event for RawEvent {
    fn update_attrs(self, attr: &mut perf_event_open_sys::bindings::perf_event_attr) {
        attr.type_ = self.event_type;
        attr.config = self.config;
    }
}
