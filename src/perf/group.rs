use super::event::RawEvent;
use super::{CounterBackend, GroupRequest, MetricsReader, MmapPage, MmapReader, ProgrammedGroup};
use crate::error::PerfmonError;
use crate::registry::{Instance, OffsetType};
use crate::runtime::CounterReader;
use crate::stats::Reading;
use crate::PERF_MAX_EVENTS;

use perf_event::{Builder, ReadFormat};

use std::os::unix::io::AsRawFd;
use std::sync::Arc;

/// Programs counters through `perf_event_open(2)`.
pub struct PerfBackend {
    cpus: Vec<usize>,
}

impl PerfBackend {
    pub fn new() -> Result<Self, std::io::Error> {
        let cpus = crate::common::linux::online_cpus()?;

        debug!("perf backend covers {} online CPUs", cpus.len());

        Ok(Self { cpus })
    }
}

impl CounterBackend for PerfBackend {
    fn open(&mut self, request: &GroupRequest<'_>) -> Result<Box<dyn ProgrammedGroup>, PerfmonError> {
        if !request.target.is_whole_machine() {
            return Ok(Box::new(PerfGroup::open(request, request.target.cpu)?));
        }

        // a group can't follow every task on every CPU, so the machine is
        // covered with one group per CPU and the readings are summed
        let groups = self
            .cpus
            .iter()
            .map(|&cpu| PerfGroup::open(request, Some(cpu)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Box::new(SystemGroup {
            target: request.target.clone(),
            groups,
        }))
    }
}

/// One leader and its followers on a single target.
struct PerfGroup {
    target: Instance,
    offset_type: OffsetType,
    lanes: &'static [usize],
    pages: Vec<Arc<MmapPage>>,
    /// The leader is the first counter
    counters: Vec<perf_event::Counter>,
}

impl PerfGroup {
    fn open(request: &GroupRequest<'_>, cpu: Option<usize>) -> Result<Self, PerfmonError> {
        let bundle = request.bundle;
        let target = request.target;

        if bundle.events().is_empty() {
            return Err(PerfmonError::BundleInit {
                bundle: bundle.name().to_string(),
                reason: "the bundle has no events".to_string(),
            });
        }

        let mut counters: Vec<perf_event::Counter> = Vec::with_capacity(bundle.events().len());

        for &index in bundle.events() {
            let event = request
                .source
                .event(index)
                .ok_or_else(|| PerfmonError::BundleInit {
                    bundle: bundle.name().to_string(),
                    reason: format!("source '{}' has no event {index}", request.source.name()),
                })?;

            let mut builder = Builder::new(RawEvent::new(event.perf_type(target), event.config));

            match cpu {
                Some(cpu) => builder.one_cpu(cpu),
                None => builder.any_cpu(),
            };

            match (target.pid, cpu) {
                (Some(pid), _) => builder.observe_pid(pid),
                (None, Some(_)) => builder.any_pid(),
                (None, None) => builder.observe_self(),
            };

            builder
                .exclude_hv(false)
                .exclude_kernel(event.exclude_kernel || request.exclude_kernel);

            let counter = match counters.first_mut() {
                None => builder
                    .read_format(
                        ReadFormat::TOTAL_TIME_ENABLED
                            | ReadFormat::TOTAL_TIME_RUNNING
                            | ReadFormat::GROUP,
                    )
                    .build(),
                Some(leader) => builder.build_with_group(leader),
            }
            .map_err(|source| PerfmonError::Open {
                event: event.name.to_string(),
                target: target.to_string(),
                source,
            })?;

            trace!("opened '{}' on {target}", event.name);

            counters.push(counter);
        }

        let mut pages = Vec::new();

        if request.needs_user_reads() {
            for (counter, &index) in counters.iter().zip(bundle.events()) {
                let name = request.source.event(index).map(|e| e.name).unwrap_or("");

                let page = MmapPage::new(counter.as_raw_fd(), request.read_retries).map_err(
                    |source| PerfmonError::Mmap {
                        event: name.to_string(),
                        target: target.to_string(),
                        source,
                    },
                )?;

                if !page.user_reads_supported() {
                    return Err(PerfmonError::Unsupported(
                        "counters can't be read from user space on this system",
                    ));
                }

                pages.push(Arc::new(page));
            }
        }

        Ok(Self {
            target: target.clone(),
            offset_type: bundle.offset_type(),
            lanes: bundle.metrics(),
            pages,
            counters,
        })
    }

    fn leader(&mut self) -> &mut perf_event::Counter {
        // open() never builds a group without a leader
        &mut self.counters[0]
    }

    fn group_error(&self, op: &'static str, source: std::io::Error) -> PerfmonError {
        PerfmonError::Group {
            op,
            target: self.target.to_string(),
            source,
        }
    }
}

impl ProgrammedGroup for PerfGroup {
    fn target(&self) -> &Instance {
        &self.target
    }

    fn descriptors(&self) -> usize {
        self.counters.len()
    }

    fn enable(&mut self) -> Result<(), PerfmonError> {
        self.leader()
            .enable_group()
            .map_err(|e| self.group_error("enable", e))
    }

    fn disable(&mut self) -> Result<(), PerfmonError> {
        self.leader()
            .disable_group()
            .map_err(|e| self.group_error("disable", e))
    }

    fn reset(&mut self) -> Result<(), PerfmonError> {
        self.leader()
            .reset_group()
            .map_err(|e| self.group_error("reset", e))
    }

    fn read(&mut self) -> Result<Reading, PerfmonError> {
        if self.offset_type == OffsetType::Metrics {
            return Err(PerfmonError::Unsupported(
                "topdown metrics are only read around stage calls",
            ));
        }

        let data = self
            .leader()
            .read_group()
            .map_err(|e| self.group_error("read", e))?;

        let mut reading = Reading {
            nr: self.counters.len().min(PERF_MAX_EVENTS),
            time_enabled: data.time_enabled().map(|t| t.as_nanos() as u64).unwrap_or(0),
            time_running: data.time_running().map(|t| t.as_nanos() as u64).unwrap_or(0),
            ..Default::default()
        };

        for (value, counter) in reading.value.iter_mut().zip(&self.counters) {
            *value = data.get(counter).map(|c| c.value()).unwrap_or(0);
        }

        Ok(reading)
    }

    fn reader(&self) -> Result<Box<dyn CounterReader>, PerfmonError> {
        let leader = self.pages.first().ok_or(PerfmonError::Unsupported(
            "the group was not mapped for user space reads",
        ))?;

        Ok(match self.offset_type {
            OffsetType::Mmap => Box::new(MmapReader::new(self.pages.clone())),
            OffsetType::Metrics => Box::new(MetricsReader::new(leader.clone(), self.lanes)),
        })
    }
}

/// Per-CPU groups that together cover the whole machine.
struct SystemGroup {
    target: Instance,
    groups: Vec<PerfGroup>,
}

impl ProgrammedGroup for SystemGroup {
    fn target(&self) -> &Instance {
        &self.target
    }

    fn descriptors(&self) -> usize {
        self.groups.iter().map(|g| g.descriptors()).sum()
    }

    fn enable(&mut self) -> Result<(), PerfmonError> {
        self.groups.iter_mut().try_for_each(|g| g.enable())
    }

    fn disable(&mut self) -> Result<(), PerfmonError> {
        self.groups.iter_mut().try_for_each(|g| g.disable())
    }

    fn reset(&mut self) -> Result<(), PerfmonError> {
        self.groups.iter_mut().try_for_each(|g| g.reset())
    }

    fn read(&mut self) -> Result<Reading, PerfmonError> {
        let mut total = Reading::default();

        for group in self.groups.iter_mut() {
            let reading = group.read()?;

            total.nr = reading.nr;
            total.time_enabled += reading.time_enabled;
            total.time_running += reading.time_running;

            for (total, value) in total.value.iter_mut().zip(reading.values()) {
                *total += value;
            }
        }

        Ok(total)
    }

    fn reader(&self) -> Result<Box<dyn CounterReader>, PerfmonError> {
        Err(PerfmonError::Unsupported(
            "whole machine groups are not read from user space",
        ))
    }
}
