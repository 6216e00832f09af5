//! The interface to the pipeline scheduler and a reference scheduler.
//!
//! The instrumentation never runs stages itself. It asks the scheduler for
//! its workers and stages and hands each worker a [`WorkerRuntime`] to route
//! stage calls through while a node-scoped bundle is running.

use crate::error::PerfmonError;
use crate::registry::Instance;
use crate::runtime::WorkerRuntime;

use parking_lot::RwLock;

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

/// Where a worker thread runs.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerTarget {
    /// The CPU the worker is pinned to.
    pub cpu: Option<usize>,
    /// The kernel thread id of the worker.
    pub tid: Option<libc::pid_t>,
}

impl WorkerTarget {
    pub fn new(cpu: Option<usize>, tid: Option<libc::pid_t>) -> Self {
        Self { cpu, tid }
    }

    /// The measurement target for this worker. Without a thread id any task
    /// on the worker's CPU is counted.
    pub fn instance(&self, id: usize) -> Instance {
        let mut instance = Instance::new(format!("worker {id}"));
        instance.cpu = self.cpu;
        instance.pid = self.tid;
        instance
    }

    pub fn is_known(&self) -> bool {
        self.cpu.is_some() || self.tid.is_some()
    }
}

/// A scheduler whose stage calls can be routed through a [`WorkerRuntime`].
pub trait Pipeline: Send + Sync {
    /// The workers, indexed by worker id.
    fn workers(&self) -> Vec<WorkerTarget>;

    /// The number of stages on a worker.
    fn stages(&self, worker: usize) -> usize;

    fn stage_name(&self, worker: usize, stage: usize) -> Option<String>;

    /// Routes the worker's stage calls through `runtime`.
    fn install_wrapper(&self, worker: usize, runtime: Arc<WorkerRuntime>)
        -> Result<(), PerfmonError>;

    /// Restores direct stage calls. Returns once the worker no longer uses
    /// the previously installed runtime.
    fn remove_wrapper(&self, worker: usize);

    /// Runs `f` while the worker is between stage calls.
    fn at_safe_point(&self, worker: usize, f: &mut dyn FnMut());
}

/// The kernel thread id of the calling thread.
#[cfg(target_os = "linux")]
pub fn current_tid() -> libc::pid_t {
    unsafe { libc::syscall(libc::SYS_gettid) as libc::pid_t }
}

#[cfg(not(target_os = "linux"))]
pub fn current_tid() -> libc::pid_t {
    unsafe { libc::getpid() }
}

pub type StageFn = Box<dyn Fn() -> u64 + Send + Sync>;

/// A named processing step. Returns the number of units it handled.
pub struct Stage {
    name: String,
    f: StageFn,
}

impl Stage {
    pub fn new(name: impl Into<String>, f: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            f: Box::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

struct WorkerSlot {
    cpu: Option<usize>,
    /// 0 until the worker thread binds
    tid: AtomicI32,
    stages: Vec<Stage>,
    wrapper: RwLock<Option<Arc<WorkerRuntime>>>,
}

/// A run-to-completion scheduler: every worker calls each of its stages in
/// order, over and over.
pub struct Graph {
    workers: Vec<Arc<WorkerSlot>>,
}

impl Graph {
    /// Builds `workers` workers, each with the stages returned by `stages`.
    /// Worker `n` is pinned to `cpus[n]` when present.
    pub fn new<F>(workers: usize, cpus: &[usize], mut stages: F) -> Self
    where
        F: FnMut(usize) -> Vec<Stage>,
    {
        let workers = (0..workers)
            .map(|id| {
                Arc::new(WorkerSlot {
                    cpu: cpus.get(id).copied(),
                    tid: AtomicI32::new(0),
                    stages: stages(id),
                    wrapper: RwLock::new(None),
                })
            })
            .collect();

        Self { workers }
    }

    /// The loop for one worker, to be run on that worker's thread.
    pub fn worker(&self, id: usize) -> Option<WorkerLoop> {
        self.workers.get(id).map(|slot| WorkerLoop {
            id,
            slot: slot.clone(),
        })
    }
}

impl Pipeline for Graph {
    fn workers(&self) -> Vec<WorkerTarget> {
        self.workers
            .iter()
            .map(|w| {
                let tid = w.tid.load(Ordering::Acquire);
                WorkerTarget::new(w.cpu, (tid != 0).then_some(tid))
            })
            .collect()
    }

    fn stages(&self, worker: usize) -> usize {
        self.workers.get(worker).map(|w| w.stages.len()).unwrap_or(0)
    }

    fn stage_name(&self, worker: usize, stage: usize) -> Option<String> {
        self.workers
            .get(worker)
            .and_then(|w| w.stages.get(stage))
            .map(|s| s.name.clone())
    }

    fn install_wrapper(
        &self,
        worker: usize,
        runtime: Arc<WorkerRuntime>,
    ) -> Result<(), PerfmonError> {
        let slot = self
            .workers
            .get(worker)
            .ok_or(PerfmonError::NoSuchWorker(worker))?;

        *slot.wrapper.write() = Some(runtime);

        Ok(())
    }

    fn remove_wrapper(&self, worker: usize) {
        if let Some(slot) = self.workers.get(worker) {
            *slot.wrapper.write() = None;
        }
    }

    fn at_safe_point(&self, worker: usize, f: &mut dyn FnMut()) {
        if let Some(slot) = self.workers.get(worker) {
            // holding the write lock keeps the worker out of run_once
            let _guard = slot.wrapper.write();
            f();
        }
    }
}

/// The hot loop of one worker.
pub struct WorkerLoop {
    id: usize,
    slot: Arc<WorkerSlot>,
}

impl WorkerLoop {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Pins the calling thread to the worker's CPU and records its thread id.
    /// Must be called from the thread that runs the loop, before the bundle
    /// is started.
    pub fn bind_current_thread(&self, pin: bool) {
        if let (true, Some(cpu)) = (pin, self.slot.cpu) {
            if !core_affinity::set_for_current(core_affinity::CoreId { id: cpu }) {
                warn!("failed to pin worker {} to cpu {cpu}", self.id);
            }
        }

        self.slot.tid.store(current_tid(), Ordering::Release);
    }

    /// Calls every stage once and returns the units handled.
    pub fn run_once(&self) -> u64 {
        let wrapper = self.slot.wrapper.read();
        let mut units = 0;

        match wrapper.as_ref() {
            Some(runtime) => {
                for (id, stage) in self.slot.stages.iter().enumerate() {
                    units += runtime.dispatch(id, || (stage.f)());
                }
            }
            None => {
                for stage in self.slot.stages.iter() {
                    units += (stage.f)();
                }
            }
        }

        units
    }

    /// Runs the stages until `running` is cleared.
    pub fn run(&self, running: &AtomicBool) -> u64 {
        let mut units = 0;

        while running.load(Ordering::Relaxed) {
            units += self.run_once();
        }

        units
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicU64;

    #[test]
    fn direct_calls() {
        let calls = Arc::new(AtomicU64::new(0));

        let graph = Graph::new(2, &[4], |_| {
            let calls = calls.clone();
            vec![
                Stage::new("input", move || {
                    calls.fetch_add(1, Ordering::Relaxed);
                    32
                }),
                Stage::new("output", || 32),
            ]
        });

        assert_eq!(graph.stages(1), 2);
        assert_eq!(graph.stage_name(0, 1).as_deref(), Some("output"));
        assert_eq!(graph.stage_name(0, 2), None);

        let worker = graph.worker(0).unwrap();
        assert_eq!(worker.run_once(), 64);
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        assert_eq!(
            graph.workers(),
            vec![
                WorkerTarget::new(Some(4), None),
                WorkerTarget::new(None, None)
            ]
        );

        worker.bind_current_thread(false);
        assert_eq!(graph.workers()[0].tid, Some(current_tid()));
        assert!(graph.worker(2).is_none());
    }

    #[test]
    fn worker_instance() {
        let instance = WorkerTarget::new(Some(1), Some(42)).instance(3);

        assert_eq!(instance.name, "worker 3");
        assert_eq!(instance.cpu, Some(1));
        assert_eq!(instance.pid, Some(42));
        assert!(!WorkerTarget::default().is_known());
    }
}
