use crate::cpu::CpuFeatures;

pub const PERF_TYPE_HARDWARE: u32 = 0;
pub const PERF_TYPE_SOFTWARE: u32 = 1;
pub const PERF_TYPE_RAW: u32 = 4;

/// Where the perf type of an event comes from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventType {
    /// The perf type is known when the event is defined.
    Fixed(u32),
    /// The perf type is taken from the instance being measured. The index
    /// selects the source's instance type that supplies the targets.
    FromInstance(usize),
}

/// A raw event selector provided by a [`Source`].
#[derive(Copy, Clone, Debug)]
pub struct Event {
    pub name: &'static str,
    pub description: &'static str,
    pub config: u64,
    pub exclude_kernel: bool,
    pub kind: EventType,
}

impl Event {
    pub const fn new(
        kind: EventType,
        config: u64,
        name: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            description,
            config,
            exclude_kernel: false,
            kind,
        }
    }

    pub const fn exclude_kernel(mut self) -> Self {
        self.exclude_kernel = true;
        self
    }

    /// The perf type to program for this event on the given target.
    pub fn perf_type(&self, target: &Instance) -> u32 {
        match self.kind {
            EventType::Fixed(type_) => type_,
            EventType::FromInstance(_) => target.type_,
        }
    }
}

/// A concrete measurement target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instance {
    /// perf type of the PMU this instance belongs to, only meaningful for
    /// events whose type comes from the instance
    pub type_: u32,
    pub cpu: Option<usize>,
    pub pid: Option<libc::pid_t>,
    pub name: String,
}

impl Instance {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            type_: 0,
            cpu: None,
            pid: None,
            name: name.into(),
        }
    }

    pub fn with_type(mut self, type_: u32) -> Self {
        self.type_ = type_;
        self
    }

    pub fn with_cpu(mut self, cpu: usize) -> Self {
        self.cpu = Some(cpu);
        self
    }

    pub fn with_pid(mut self, pid: libc::pid_t) -> Self {
        self.pid = Some(pid);
        self
    }

    /// The instance covering every CPU and every task.
    pub fn whole_machine() -> Self {
        Self::new("system")
    }

    pub fn is_whole_machine(&self) -> bool {
        self.cpu.is_none() && self.pid.is_none()
    }
}

impl std::fmt::Display for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.cpu, self.pid) {
            (Some(cpu), Some(pid)) => write!(f, "{} (cpu {cpu} pid {pid})", self.name),
            (Some(cpu), None) => write!(f, "{} (cpu {cpu})", self.name),
            (None, Some(pid)) => write!(f, "{} (pid {pid})", self.name),
            (None, None) => write!(f, "{}", self.name),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceType {
    pub name: String,
    pub instances: Vec<Instance>,
}

impl InstanceType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instances: Vec::new(),
        }
    }
}

pub type SourceInitFn = fn(&mut Source, &CpuFeatures) -> anyhow::Result<()>;
pub type FormatConfigFn = fn(u64) -> String;

/// Static definition of a source, collected into [`SOURCES`].
///
/// [`SOURCES`]: crate::registry::SOURCES
#[derive(Copy, Clone)]
pub struct SourceDef {
    pub name: &'static str,
    pub description: &'static str,
    pub events: &'static [Event],
    /// Runs once, before the source is first used.
    pub init: Option<SourceInitFn>,
    pub format_config: Option<FormatConfigFn>,
}

impl SourceDef {
    pub const fn new(name: &'static str, description: &'static str, events: &'static [Event]) -> Self {
        Self {
            name,
            description,
            events,
            init: None,
            format_config: None,
        }
    }

    pub const fn init(mut self, init: SourceInitFn) -> Self {
        self.init = Some(init);
        self
    }

    pub const fn format_config(mut self, format: FormatConfigFn) -> Self {
        self.format_config = Some(format);
        self
    }
}

/// A registered provider of events and, optionally, measurable instances.
#[derive(Debug)]
pub struct Source {
    name: &'static str,
    description: &'static str,
    events: &'static [Event],
    instance_types: Vec<InstanceType>,
    format_config: Option<FormatConfigFn>,
}

impl Source {
    pub(crate) fn from_def(def: &SourceDef) -> Self {
        Self {
            name: def.name,
            description: def.description,
            events: def.events,
            instance_types: Vec::new(),
            format_config: def.format_config,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub fn events(&self) -> &'static [Event] {
        self.events
    }

    pub fn event(&self, index: usize) -> Option<&'static Event> {
        self.events.get(index)
    }

    pub fn instance_types(&self) -> &[InstanceType] {
        &self.instance_types
    }

    pub fn instance_type(&self, index: usize) -> Option<&InstanceType> {
        self.instance_types.get(index)
    }

    pub fn instance_type_by_name(&self, name: &str) -> Option<&InstanceType> {
        self.instance_types.iter().find(|t| t.name == name)
    }

    /// Adds an instance type and returns its index.
    pub fn add_instance_type(&mut self, instance_type: InstanceType) -> usize {
        self.instance_types.push(instance_type);
        self.instance_types.len() - 1
    }

    pub fn format_config(&self, config: u64) -> String {
        match self.format_config {
            Some(format) => format(config),
            None => format!("config=0x{config:x}"),
        }
    }
}
