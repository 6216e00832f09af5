//! Catalogs of counter sources and measurement bundles.
//!
//! Built-in definitions are plain static data gathered with `linkme` into
//! [`SOURCES`] and [`BUNDLES`]. Nothing is registered as a side effect of
//! loading: [`Registry::builtin`] walks both slices explicitly, in name order,
//! so the resulting catalog is deterministic.

use crate::cpu::CpuFeatures;
use crate::error::RegistryError;
use crate::resolver::resolve_applicability;
use crate::PERF_MAX_EVENTS;

use linkme::distributed_slice;

use std::collections::HashMap;
use std::sync::Arc;

mod bundle;
mod source;

pub use bundle::*;
pub use source::*;

#[distributed_slice]
pub static SOURCES: [SourceDef] = [..];

#[distributed_slice]
pub static BUNDLES: [BundleDef] = [..];

/// The number of 8-bit lanes in the topdown metrics register.
pub const METRIC_LANES: usize = 8;

pub struct Registry {
    features: CpuFeatures,
    sources: Vec<Arc<Source>>,
    source_by_name: HashMap<&'static str, usize>,
    bundles: Vec<Arc<Bundle>>,
    bundle_by_name: HashMap<&'static str, usize>,
}

impl Registry {
    /// An empty registry evaluating bundles against `features`.
    pub fn new(features: CpuFeatures) -> Self {
        Self {
            features,
            sources: Vec::new(),
            source_by_name: HashMap::new(),
            bundles: Vec::new(),
            bundle_by_name: HashMap::new(),
        }
    }

    /// Registers every built-in source and bundle.
    ///
    /// A source whose initialization fails is skipped along with the bundles
    /// that reference it. Any other registration error is returned.
    pub fn builtin(features: CpuFeatures) -> Result<Self, RegistryError> {
        let mut registry = Self::new(features);

        let mut sources: Vec<&SourceDef> = SOURCES.iter().collect();
        sources.sort_by_key(|s| s.name);

        for def in sources {
            match registry.register_source(*def) {
                Ok(_) => {}
                Err(RegistryError::SourceInit { name, reason }) => {
                    debug!("source '{name}' is unavailable: {reason}");
                }
                Err(e) => return Err(e),
            }
        }

        let mut bundles: Vec<&BundleDef> = BUNDLES.iter().collect();
        bundles.sort_by_key(|b| b.name);

        for def in bundles {
            match registry.register_bundle(*def) {
                Ok(_) => {}
                Err(RegistryError::UnknownSource {
                    bundle,
                    source_name,
                }) => {
                    debug!("bundle '{bundle}' skipped, source '{source_name}' is unavailable");
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "registered {} sources and {} bundles",
            registry.sources.len(),
            registry.bundles.len()
        );

        Ok(registry)
    }

    pub fn features(&self) -> &CpuFeatures {
        &self.features
    }

    /// Registers a source, running its init routine first.
    pub fn register_source(&mut self, def: SourceDef) -> Result<Arc<Source>, RegistryError> {
        if self.source_by_name.contains_key(def.name) {
            return Err(RegistryError::DuplicateSource(def.name.to_string()));
        }

        let mut source = Source::from_def(&def);

        if let Some(init) = def.init {
            init(&mut source, &self.features).map_err(|e| RegistryError::SourceInit {
                name: def.name.to_string(),
                reason: e.to_string(),
            })?;
        }

        let source = Arc::new(source);

        self.source_by_name.insert(def.name, self.sources.len());
        self.sources.push(source.clone());

        Ok(source)
    }

    /// Registers a bundle, resolving its bundle type for this processor.
    pub fn register_bundle(&mut self, def: BundleDef) -> Result<Arc<Bundle>, RegistryError> {
        if self.bundle_by_name.contains_key(def.name) {
            return Err(RegistryError::DuplicateBundle(def.name.to_string()));
        }

        let source = self
            .source(def.source)
            .ok_or_else(|| RegistryError::UnknownSource {
                bundle: def.name.to_string(),
                source_name: def.source.to_string(),
            })?;

        let count = def.events.len() + def.metrics.len();

        if count > PERF_MAX_EVENTS {
            return Err(RegistryError::TooManyEvents {
                bundle: def.name.to_string(),
                count,
                max: PERF_MAX_EVENTS,
            });
        }

        if let Some(&index) = def.events.iter().find(|&&i| i >= source.events().len()) {
            return Err(RegistryError::EventOutOfRange {
                bundle: def.name.to_string(),
                source_name: def.source.to_string(),
                index,
                len: source.events().len(),
            });
        }

        if let Some(&index) = def.metrics.iter().find(|&&i| i >= METRIC_LANES) {
            return Err(RegistryError::MetricOutOfRange {
                bundle: def.name.to_string(),
                index,
                max: METRIC_LANES,
            });
        }

        // worker targets carry no PMU type for these events to take
        let from_instance = def.events.iter().any(|&i| {
            matches!(
                source.event(i).map(|e| e.kind),
                Some(EventType::FromInstance(_))
            )
        });

        if from_instance {
            let scopes = std::iter::once(def.bundle_type)
                .chain(def.cpu_supports.iter().map(|o| o.bundle_type));

            for scope in scopes {
                if matches!(scope, BundleType::Thread | BundleType::Node) {
                    return Err(RegistryError::InstanceEventScope {
                        bundle: def.name.to_string(),
                        scope,
                    });
                }
            }
        }

        let bundle_type = resolve_applicability(def.bundle_type, def.cpu_supports, &self.features);

        if bundle_type != def.bundle_type {
            debug!(
                "bundle '{}' resolved to {bundle_type} on {}",
                def.name,
                self.features.uarch()
            );
        }

        let bundle = Arc::new(Bundle::new(def, bundle_type));

        self.bundle_by_name.insert(def.name, self.bundles.len());
        self.bundles.push(bundle.clone());

        Ok(bundle)
    }

    pub fn source(&self, name: &str) -> Option<&Arc<Source>> {
        self.source_by_name.get(name).map(|&i| &self.sources[i])
    }

    pub fn bundle(&self, name: &str) -> Option<&Arc<Bundle>> {
        self.bundle_by_name.get(name).map(|&i| &self.bundles[i])
    }

    /// All sources in registration order.
    pub fn sources(&self) -> &[Arc<Source>] {
        &self.sources
    }

    /// All bundles in registration order.
    pub fn bundles(&self) -> &[Arc<Bundle>] {
        &self.bundles
    }
}
