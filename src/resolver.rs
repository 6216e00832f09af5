//! Bundle applicability and measurement target resolution.

use crate::cpu::CpuFeatures;
use crate::pipeline::WorkerTarget;
use crate::registry::{BundleType, CpuSupports, Instance, InstanceType};

/// Resolves the bundle type for the running processor.
///
/// Overrides are evaluated in declaration order and the last one whose
/// predicate holds wins. Without overrides, or when none holds, the default
/// applies.
pub fn resolve_applicability(
    default: BundleType,
    overrides: &[CpuSupports],
    features: &CpuFeatures,
) -> BundleType {
    overrides
        .iter()
        .filter(|o| (o.supported)(features))
        .last()
        .map(|o| o.bundle_type)
        .unwrap_or(default)
}

/// Expands a bundle type into the ordered list of targets to program.
///
/// System bundles measure every instance of the active instance type, or the
/// whole machine when the source defines none. Thread and node bundles
/// measure each worker; for node bundles the worker reads the counters itself
/// around every stage call.
pub fn resolve_targets(
    bundle_type: BundleType,
    instance_type: Option<&InstanceType>,
    workers: &[WorkerTarget],
) -> Vec<Instance> {
    match bundle_type {
        BundleType::System => match instance_type {
            Some(t) => t.instances.clone(),
            None => vec![Instance::whole_machine()],
        },
        BundleType::Thread | BundleType::Node => workers
            .iter()
            .enumerate()
            .map(|(id, worker)| worker.instance(id))
            .collect(),
        BundleType::Unknown => Vec::new(),
    }
}
