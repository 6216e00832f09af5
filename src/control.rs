//! Activation lifecycle of a bundle.
//!
//! [`Perfmon`] holds the catalogs, the counter backend and the pipeline, and
//! runs a single bundle at a time. Everything an activation programs is owned
//! by an `Activation`: dropping it removes the installed wrappers and closes
//! the counter groups in reverse order, which is how both `stop` and a failed
//! `start` unwind.

use crate::error::PerfmonError;
use crate::metrics::{ACTIVATIONS, ACTIVATION_FAILURES};
use crate::perf::{CounterBackend, GroupRequest, ProgrammedGroup, DEFAULT_READ_RETRIES};
use crate::pipeline::Pipeline;
use crate::registry::{
    Bundle, BundleType, EventType, Instance, InstanceType, OffsetType, Registry, Source,
};
use crate::resolver::resolve_targets;
use crate::runtime::WorkerRuntime;
use crate::stats::{correct, Reading, Snapshot, StatsTable};
use crate::PERF_MAX_EVENTS;

use serde::Serialize;

use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Knobs applied to every activation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    /// Instance type used when a bundle's events don't name one.
    pub default_instance_type: Option<String>,
    /// Bound on seqlock retries for user space counter reads.
    pub read_retries: usize,
    /// Forces `exclude_kernel` on every programmed event.
    pub exclude_kernel: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            default_instance_type: None,
            read_retries: DEFAULT_READ_RETRIES,
            exclude_kernel: false,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct EventInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub config: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct InstanceTypeInfo {
    pub name: String,
    pub instances: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SourceInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub events: Vec<EventInfo>,
    pub instance_types: Vec<InstanceTypeInfo>,
}

impl From<&Source> for SourceInfo {
    fn from(source: &Source) -> Self {
        Self {
            name: source.name(),
            description: source.description(),
            events: source
                .events()
                .iter()
                .map(|e| EventInfo {
                    name: e.name,
                    description: e.description,
                    config: source.format_config(e.config),
                })
                .collect(),
            instance_types: source
                .instance_types()
                .iter()
                .map(|t| InstanceTypeInfo {
                    name: t.name.clone(),
                    instances: t.instances.iter().map(|i| i.to_string()).collect(),
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BundleInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub source: &'static str,
    pub bundle_type: BundleType,
    pub offset_type: OffsetType,
    pub column_headers: Vec<&'static str>,
    pub footer: Option<&'static str>,
}

impl From<&Bundle> for BundleInfo {
    fn from(bundle: &Bundle) -> Self {
        Self {
            name: bundle.name(),
            description: bundle.description(),
            source: bundle.source(),
            bundle_type: bundle.bundle_type(),
            offset_type: bundle.offset_type(),
            column_headers: bundle.column_headers().to_vec(),
            footer: bundle.footer(),
        }
    }
}

/// The resources of one running bundle.
struct Activation {
    pipeline: Arc<dyn Pipeline>,
    bundle: Arc<Bundle>,
    instance_type: Option<String>,
    targets: Vec<Instance>,
    groups: Vec<Box<dyn ProgrammedGroup>>,
    /// Per group, what `read_instance` subtracts. Taken at the last reset.
    baselines: Vec<Reading>,
    /// Per worker, only for node-scoped bundles
    stats: Vec<Arc<StatsTable>>,
    /// Workers whose stage calls are routed through a runtime
    wrapped: Vec<usize>,
    started: Instant,
}

impl Drop for Activation {
    fn drop(&mut self) {
        for &worker in self.wrapped.iter().rev() {
            self.pipeline.remove_wrapper(worker);
        }

        while let Some(mut group) = self.groups.pop() {
            if let Err(e) = group.disable() {
                debug!("{e}");
            }

            trace!(
                "closing {} descriptors on {}",
                group.descriptors(),
                group.target()
            );
        }
    }
}

pub struct Perfmon {
    registry: Registry,
    backend: Box<dyn CounterBackend>,
    pipeline: Arc<dyn Pipeline>,
    options: Options,
    state: State,
    active: Option<Activation>,
    ever_started: bool,
}

impl Perfmon {
    pub fn new(
        registry: Registry,
        backend: Box<dyn CounterBackend>,
        pipeline: Arc<dyn Pipeline>,
        options: Options,
    ) -> Self {
        Self {
            registry,
            backend,
            pipeline,
            options,
            state: State::Idle,
            active: None,
            ever_started: false,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn pipeline(&self) -> &Arc<dyn Pipeline> {
        &self.pipeline
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_bundle(&self) -> Option<&Arc<Bundle>> {
        self.active.as_ref().map(|a| &a.bundle)
    }

    pub fn active_instance_type(&self) -> Option<&str> {
        self.active.as_ref().and_then(|a| a.instance_type.as_deref())
    }

    /// The measurement targets of the running bundle.
    pub fn instances(&self) -> &[Instance] {
        self.active
            .as_ref()
            .map(|a| a.targets.as_slice())
            .unwrap_or(&[])
    }

    /// Time since the running bundle was started or last reset.
    pub fn elapsed(&self) -> Option<Duration> {
        self.active.as_ref().map(|a| a.started.elapsed())
    }

    /// The number of counter descriptors currently open.
    pub fn open_descriptors(&self) -> usize {
        self.active
            .as_ref()
            .map(|a| a.groups.iter().map(|g| g.descriptors()).sum())
            .unwrap_or(0)
    }

    pub fn list_sources(&self) -> Vec<SourceInfo> {
        self.registry
            .sources()
            .iter()
            .map(|s| SourceInfo::from(s.as_ref()))
            .collect()
    }

    pub fn list_bundles(&self) -> Vec<BundleInfo> {
        self.registry
            .bundles()
            .iter()
            .map(|b| BundleInfo::from(b.as_ref()))
            .collect()
    }

    /// Programs the counters of a bundle and, for node-scoped bundles,
    /// routes every stage call through the dispatch wrapper.
    ///
    /// On failure everything opened so far is closed and the state is left
    /// as it was.
    pub fn start(&mut self, name: &str) -> Result<(), PerfmonError> {
        if let Some(active) = &self.active {
            return Err(PerfmonError::AlreadyRunning(active.bundle.name().to_string()));
        }

        let bundle = self
            .registry
            .bundle(name)
            .cloned()
            .ok_or_else(|| PerfmonError::UnknownBundle(name.to_string()))?;

        self.state = State::Starting;

        match self.activate(bundle) {
            Ok(activation) => {
                info!(
                    "started bundle '{}' ({}) on {} targets",
                    activation.bundle.name(),
                    activation.bundle.bundle_type(),
                    activation.targets.len()
                );

                ACTIVATIONS.increment();

                self.active = Some(activation);
                self.ever_started = true;
                self.state = State::Running;

                Ok(())
            }
            Err(e) => {
                warn!("failed to start bundle '{name}': {e}");

                ACTIVATION_FAILURES.increment();

                self.state = State::Idle;

                Err(e)
            }
        }
    }

    fn activate(&mut self, bundle: Arc<Bundle>) -> Result<Activation, PerfmonError> {
        let bundle_type = bundle.bundle_type();

        if bundle_type == BundleType::Unknown {
            return Err(PerfmonError::UnsupportedBundle(bundle.name().to_string()));
        }

        if bundle.offset_type() == OffsetType::Metrics && bundle_type != BundleType::Node {
            return Err(PerfmonError::UnsupportedBundle(bundle.name().to_string()));
        }

        let source = self
            .registry
            .source(bundle.source())
            .cloned()
            .ok_or_else(|| PerfmonError::UnsupportedBundle(bundle.name().to_string()))?;

        bundle
            .init(&source)
            .map_err(|e| PerfmonError::BundleInit {
                bundle: bundle.name().to_string(),
                reason: e.to_string(),
            })?;

        let instance_type = self.instance_type(&bundle, &source);
        let workers = self.pipeline.workers();

        if bundle_type != BundleType::System {
            if let Some(id) = workers.iter().position(|w| !w.is_known()) {
                return Err(PerfmonError::UnboundWorker(id));
            }
        }

        let targets = resolve_targets(bundle_type, instance_type, &workers);

        if targets.is_empty() {
            return Err(PerfmonError::NoTargets {
                bundle: bundle.name().to_string(),
                scope: bundle_type,
            });
        }

        debug!(
            "bundle '{}' resolved to {} targets",
            bundle.name(),
            targets.len()
        );

        let mut activation = Activation {
            pipeline: self.pipeline.clone(),
            bundle: bundle.clone(),
            instance_type: instance_type.map(|t| t.name.clone()),
            targets: Vec::with_capacity(targets.len()),
            groups: Vec::with_capacity(targets.len()),
            baselines: Vec::with_capacity(targets.len()),
            stats: Vec::new(),
            wrapped: Vec::new(),
            started: Instant::now(),
        };

        for target in targets {
            let request = GroupRequest {
                bundle: &bundle,
                source: &source,
                target: &target,
                exclude_kernel: self.options.exclude_kernel,
                read_retries: self.options.read_retries,
            };

            let group = self.backend.open(&request)?;

            activation.baselines.push(Reading {
                nr: bundle.n_values(),
                ..Default::default()
            });
            activation.groups.push(group);
            activation.targets.push(target);
        }

        let mut runtimes = Vec::new();

        if bundle_type == BundleType::Node {
            for (worker, group) in activation.groups.iter().enumerate() {
                let stats = Arc::new(StatsTable::new(self.pipeline.stages(worker)));

                runtimes.push(Arc::new(WorkerRuntime::new(
                    worker,
                    bundle.clone(),
                    stats.clone(),
                    group.reader()?,
                )));

                activation.stats.push(stats);
            }
        }

        for group in activation.groups.iter_mut() {
            group.enable()?;
        }

        for (worker, runtime) in runtimes.into_iter().enumerate() {
            self.pipeline.install_wrapper(worker, runtime)?;
            activation.wrapped.push(worker);
        }

        Ok(activation)
    }

    /// The instance type supplying targets for a bundle: the one named by
    /// its first instance-typed event, else the configured default.
    fn instance_type<'a>(&self, bundle: &Bundle, source: &'a Source) -> Option<&'a InstanceType> {
        let from_events = bundle.events().iter().find_map(|&i| match source.event(i)?.kind {
            EventType::FromInstance(t) => Some(t),
            EventType::Fixed(_) => None,
        });

        match from_events {
            Some(index) => source.instance_type(index),
            None => self
                .options
                .default_instance_type
                .as_deref()
                .and_then(|name| source.instance_type_by_name(name)),
        }
    }

    /// Restores direct stage calls and closes every counter group.
    pub fn stop(&mut self) -> Result<(), PerfmonError> {
        let activation = self.active.take().ok_or(PerfmonError::NotRunning)?;

        self.state = State::Stopping;

        let name = activation.bundle.name();
        let elapsed = activation.started.elapsed();

        drop(activation);

        self.state = State::Idle;

        info!(
            "stopped bundle '{name}' after {}",
            humantime::format_duration(Duration::from_millis(elapsed.as_millis() as u64))
        );

        Ok(())
    }

    /// Zeroes the accumulated statistics without touching the programming.
    pub fn reset(&mut self) -> Result<(), PerfmonError> {
        let activation = match self.active.as_mut() {
            Some(activation) => activation,
            None if self.ever_started => return Ok(()),
            None => return Err(PerfmonError::NeverStarted),
        };

        if activation.stats.is_empty() {
            // the kernel resets counts but not the enabled and running
            // times, so later reads are taken relative to this one
            for (group, baseline) in activation
                .groups
                .iter_mut()
                .zip(activation.baselines.iter_mut())
            {
                group.reset()?;
                *baseline = group.read()?;
            }
        } else {
            for (worker, stats) in activation.stats.iter().enumerate() {
                self.pipeline.at_safe_point(worker, &mut || stats.clear());
            }
        }

        activation.started = Instant::now();

        debug!("reset bundle '{}'", activation.bundle.name());

        Ok(())
    }

    /// The accumulated statistics of one stage on one worker.
    pub fn read_statistics(&self, stage: usize, worker: usize) -> Result<Snapshot, PerfmonError> {
        let activation = self.active.as_ref().ok_or(PerfmonError::NotRunning)?;

        if activation.bundle.bundle_type() != BundleType::Node {
            return Err(PerfmonError::NotNodeScoped(
                activation.bundle.name().to_string(),
            ));
        }

        let stats = activation
            .stats
            .get(worker)
            .ok_or(PerfmonError::NoSuchWorker(worker))?;

        let stage_stats = stats
            .get(stage)
            .ok_or(PerfmonError::NoSuchStage { worker, stage })?;

        Ok(stage_stats.snapshot(activation.bundle.n_values()))
    }

    /// The counter values and times of one target since the bundle was
    /// started or reset, scaled for multiplexing. Values are zero if the
    /// group never ran.
    pub fn read_instance(&mut self, index: usize) -> Result<Snapshot, PerfmonError> {
        let activation = self.active.as_mut().ok_or(PerfmonError::NotRunning)?;

        let group = activation
            .groups
            .get_mut(index)
            .ok_or(PerfmonError::NoSuchInstance(index))?;

        let reading = group.read()?;
        let baseline = &activation.baselines[index];

        let mut values = [0; PERF_MAX_EVENTS];
        correct(baseline, &reading, &mut values);

        Ok(Snapshot {
            time_enabled: reading.time_enabled.saturating_sub(baseline.time_enabled),
            time_running: reading.time_running.saturating_sub(baseline.time_running),
            len: reading.nr,
            value: values,
            ..Default::default()
        })
    }
}

impl Drop for Perfmon {
    fn drop(&mut self) {
        if self.active.is_some() {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuFeatures;
    use crate::pipeline::{Graph, Stage};
    use crate::registry::{BundleDef, Event, SourceDef, PERF_TYPE_HARDWARE};
    use crate::runtime::{CounterReader, ReadError};

    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    static EVENTS: &[Event] = &[
        Event::new(EventType::Fixed(PERF_TYPE_HARDWARE), 0, "cycles", ""),
        Event::new(EventType::Fixed(PERF_TYPE_HARDWARE), 1, "instructions", ""),
    ];

    #[derive(Default)]
    struct Counts {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    /// A group whose counters advance by `10 * (n + 1)` and whose times
    /// advance by 100 on every read. Counts restart from `reset_at`, times
    /// never do.
    fn tick(nr: usize, ticks: &AtomicU64, reset_at: u64) -> Reading {
        let tick = ticks.fetch_add(1, Ordering::Relaxed) + 1;

        let mut reading = Reading {
            nr,
            time_enabled: tick * 100,
            time_running: tick * 100,
            ..Default::default()
        };

        for (n, value) in reading.value[..nr].iter_mut().enumerate() {
            *value = (tick - reset_at) * 10 * (n as u64 + 1);
        }

        reading
    }

    struct Ticker {
        nr: usize,
        ticks: Arc<AtomicU64>,
    }

    impl CounterReader for Ticker {
        fn read(&self, reading: &mut Reading) -> Result<(), ReadError> {
            *reading = tick(self.nr, &self.ticks, 0);
            Ok(())
        }
    }

    struct MockGroup {
        target: Instance,
        nr: usize,
        ticks: Arc<AtomicU64>,
        reset_at: u64,
        counts: Arc<Counts>,
    }

    impl Drop for MockGroup {
        fn drop(&mut self) {
            self.counts.closed.fetch_add(1, Ordering::Relaxed);
        }
    }

    impl ProgrammedGroup for MockGroup {
        fn target(&self) -> &Instance {
            &self.target
        }

        fn descriptors(&self) -> usize {
            self.nr
        }

        fn enable(&mut self) -> Result<(), PerfmonError> {
            Ok(())
        }

        fn disable(&mut self) -> Result<(), PerfmonError> {
            Ok(())
        }

        fn reset(&mut self) -> Result<(), PerfmonError> {
            self.reset_at = self.ticks.load(Ordering::Relaxed);
            Ok(())
        }

        fn read(&mut self) -> Result<Reading, PerfmonError> {
            Ok(tick(self.nr, &self.ticks, self.reset_at))
        }

        fn reader(&self) -> Result<Box<dyn CounterReader>, PerfmonError> {
            Ok(Box::new(Ticker {
                nr: self.nr,
                ticks: self.ticks.clone(),
            }))
        }
    }

    struct MockBackend {
        counts: Arc<Counts>,
        /// Fails the open with this index
        fail_at: Option<usize>,
    }

    impl CounterBackend for MockBackend {
        fn open(
            &mut self,
            request: &GroupRequest<'_>,
        ) -> Result<Box<dyn ProgrammedGroup>, PerfmonError> {
            if self.fail_at == Some(self.counts.opened.load(Ordering::Relaxed)) {
                return Err(PerfmonError::Open {
                    event: "cycles".to_string(),
                    target: request.target.to_string(),
                    source: std::io::Error::from_raw_os_error(libc::EACCES),
                });
            }

            self.counts.opened.fetch_add(1, Ordering::Relaxed);

            Ok(Box::new(MockGroup {
                target: request.target.clone(),
                nr: request.bundle.n_values(),
                ticks: Arc::new(AtomicU64::new(0)),
                reset_at: 0,
                counts: self.counts.clone(),
            }))
        }
    }

    fn format(snapshot: &Snapshot, column: usize) -> String {
        snapshot.value[column].to_string()
    }

    fn bundle(name: &'static str, bundle_type: BundleType) -> BundleDef {
        BundleDef {
            name,
            description: "",
            source: "test",
            footer: None,
            bundle_type,
            offset_type: OffsetType::Mmap,
            events: &[0, 1],
            metrics: &[],
            cpu_supports: &[],
            init: None,
            column_headers: &["Cycles", "Instructions"],
            format,
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::new(CpuFeatures::default());

        registry
            .register_source(SourceDef::new("test", "", EVENTS))
            .unwrap();

        for (name, bundle_type) in [
            ("node", BundleType::Node),
            ("thread", BundleType::Thread),
            ("system", BundleType::System),
            ("unsupported", BundleType::Unknown),
        ] {
            registry.register_bundle(bundle(name, bundle_type)).unwrap();
        }

        registry
    }

    /// Two workers with two stages each, bound to the test thread.
    fn graph(bind: bool) -> Arc<Graph> {
        let graph = Arc::new(Graph::new(2, &[], |_| {
            vec![Stage::new("input", || 32), Stage::new("output", || 8)]
        }));

        if bind {
            for id in 0..2 {
                graph.worker(id).unwrap().bind_current_thread(false);
            }
        }

        graph
    }

    fn perfmon(graph: Arc<Graph>, fail_at: Option<usize>) -> (Perfmon, Arc<Counts>) {
        let counts = Arc::new(Counts::default());
        let backend = MockBackend {
            counts: counts.clone(),
            fail_at,
        };

        (
            Perfmon::new(registry(), Box::new(backend), graph, Options::default()),
            counts,
        )
    }

    #[test]
    fn system_bundle_measures_the_machine() {
        let (mut perfmon, _) = perfmon(graph(false), None);

        perfmon.start("system").unwrap();

        assert_eq!(perfmon.instances().len(), 1);
        assert!(perfmon.instances()[0].is_whole_machine());
        assert_eq!(perfmon.open_descriptors(), 2);

        let snapshot = perfmon.read_instance(0).unwrap();
        assert_eq!(snapshot.values(), &[10, 20]);
        assert_eq!(snapshot.time_enabled, 100);

        assert!(matches!(
            perfmon.read_instance(1),
            Err(PerfmonError::NoSuchInstance(1))
        ));
        assert!(matches!(
            perfmon.read_statistics(0, 0),
            Err(PerfmonError::NotNodeScoped(_))
        ));
    }

    #[test]
    fn node_bundle_records_stage_calls() {
        let graph = graph(true);
        let (mut perfmon, counts) = perfmon(graph.clone(), None);

        perfmon.start("node").unwrap();

        assert_eq!(perfmon.state(), State::Running);
        assert_eq!(perfmon.instances().len(), 2);
        assert_eq!(perfmon.open_descriptors(), 4);

        let worker = graph.worker(0).unwrap();
        for _ in 0..3 {
            assert_eq!(worker.run_once(), 40);
        }

        let input = perfmon.read_statistics(0, 0).unwrap();
        assert_eq!(input.calls, 3);
        assert_eq!(input.units, 96);
        assert_eq!(input.values(), &[30, 60]);

        let output = perfmon.read_statistics(1, 0).unwrap();
        assert_eq!(output.calls, 3);
        assert_eq!(output.units, 24);

        assert_eq!(perfmon.read_statistics(0, 1).unwrap().calls, 0);
        assert!(matches!(
            perfmon.read_statistics(2, 0),
            Err(PerfmonError::NoSuchStage { worker: 0, stage: 2 })
        ));
        assert!(matches!(
            perfmon.read_statistics(0, 5),
            Err(PerfmonError::NoSuchWorker(5))
        ));

        perfmon.stop().unwrap();

        assert_eq!(perfmon.state(), State::Idle);
        assert!(!perfmon.is_running());
        assert_eq!(perfmon.open_descriptors(), 0);
        assert_eq!(counts.opened.load(Ordering::Relaxed), 2);
        assert_eq!(counts.closed.load(Ordering::Relaxed), 2);

        // direct calls again
        assert_eq!(worker.run_once(), 40);
        assert!(matches!(
            perfmon.read_statistics(0, 0),
            Err(PerfmonError::NotRunning)
        ));
    }

    #[test]
    fn one_bundle_at_a_time() {
        let (mut perfmon, counts) = perfmon(graph(true), None);

        perfmon.start("node").unwrap();

        assert!(matches!(
            perfmon.start("thread"),
            Err(PerfmonError::AlreadyRunning(name)) if name == "node"
        ));
        assert_eq!(perfmon.state(), State::Running);
        assert_eq!(perfmon.active_bundle().map(|b| b.name()), Some("node"));
        assert_eq!(counts.opened.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn reset_clears_statistics() {
        let graph = graph(true);
        let (mut perfmon, _) = perfmon(graph.clone(), None);

        perfmon.start("node").unwrap();
        graph.worker(1).unwrap().run_once();
        assert_eq!(perfmon.read_statistics(0, 1).unwrap().calls, 1);

        perfmon.reset().unwrap();

        let snapshot = perfmon.read_statistics(0, 1).unwrap();
        assert_eq!(snapshot.calls, 0);
        assert_eq!(snapshot.values(), &[0, 0]);

        perfmon.stop().unwrap();
        perfmon.start("thread").unwrap();

        // three reads before the reset, one taken by the reset itself
        for _ in 0..3 {
            perfmon.read_instance(0).unwrap();
        }
        perfmon.reset().unwrap();

        let snapshot = perfmon.read_instance(0).unwrap();
        assert_eq!(snapshot.values(), &[10, 20]);
        assert_eq!(snapshot.time_enabled, 100);
        assert_eq!(snapshot.time_running, 100);
    }

    #[test]
    fn failed_start_unwinds() {
        let (mut perfmon, counts) = perfmon(graph(true), Some(1));

        assert!(matches!(
            perfmon.start("thread"),
            Err(PerfmonError::Open { .. })
        ));

        assert_eq!(perfmon.state(), State::Idle);
        assert!(!perfmon.is_running());
        assert_eq!(perfmon.open_descriptors(), 0);
        assert_eq!(counts.opened.load(Ordering::Relaxed), 1);
        assert_eq!(counts.closed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn control_errors() {
        let (mut perfmon, _) = perfmon(graph(true), None);

        assert!(matches!(perfmon.stop(), Err(PerfmonError::NotRunning)));
        assert!(matches!(perfmon.reset(), Err(PerfmonError::NeverStarted)));
        assert!(matches!(
            perfmon.start("missing"),
            Err(PerfmonError::UnknownBundle(_))
        ));
        assert!(matches!(
            perfmon.start("unsupported"),
            Err(PerfmonError::UnsupportedBundle(_))
        ));

        perfmon.start("thread").unwrap();
        perfmon.stop().unwrap();

        assert!(perfmon.reset().is_ok());
        assert_eq!(perfmon.state(), State::Idle);
    }

    #[test]
    fn workers_must_be_bound() {
        let (mut perfmon, counts) = perfmon(graph(false), None);

        assert!(matches!(
            perfmon.start("node"),
            Err(PerfmonError::UnboundWorker(0))
        ));
        assert_eq!(counts.opened.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn catalog_listing() {
        let (perfmon, _) = perfmon(graph(false), None);

        let sources = perfmon.list_sources();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].events[1].name, "instructions");

        let bundles = perfmon.list_bundles();
        assert_eq!(bundles.len(), 4);
        assert_eq!(bundles[0].column_headers, vec!["Cycles", "Instructions"]);
    }
}
