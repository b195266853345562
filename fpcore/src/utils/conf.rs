use std::{any::TypeId, collections::HashMap, path::Path};

use downcast_rs::{DowncastSync, impl_downcast};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIs};

use crate::{
    store::StoreLimits,
    utils::error::{FpError, FpResult},
};

/// Run-scoped object analyses can read through their query context.
pub trait OpaqueObject: DowncastSync {}
impl_downcast!(sync OpaqueObject);

/// Typed map of the context objects of one run, at most one per type.
#[derive(Default)]
pub struct ContextObjects(HashMap<TypeId, Box<dyn OpaqueObject>>);

impl ContextObjects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `object`, returning the previous object of the same type.
    pub fn insert<T: OpaqueObject>(&mut self, object: T) -> Option<Box<dyn OpaqueObject>> {
        self.0.insert(TypeId::of::<T>(), Box::new(object))
    }

    pub fn get<T: OpaqueObject>(&self) -> Option<&T> {
        self.0
            .get(&TypeId::of::<T>())
            .and_then(|object| object.as_ref().downcast_ref::<T>())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Order in which the worklist hands out pending computations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumIs, Display)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum WorklistOrder {
    #[default]
    Fifo,
    Lifo,
    /// Pseudo-random order, reproducible from `seed`.
    Shuffled { seed: u64 },
}

/// Engine configuration.
///
/// ```
/// # use fpcore::utils::conf::{EngineConfig, WorklistOrder};
/// let config = EngineConfig::from_toml_str(r#"
/// threads = 4
/// max_updates_per_epk = 64
///
/// [order]
/// kind = "shuffled"
/// seed = 7
/// "#).unwrap();
/// assert_eq!(config.threads, 4);
/// assert_eq!(config.order, WorklistOrder::Shuffled { seed: 7 });
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Worker threads; 1 runs the worklist on the calling thread.
    pub threads: usize,
    /// Maximum number of EPKs computed per parallel batch.
    pub batch_size: usize,
    pub order: WorklistOrder,
    /// Upper bound on effective commits per EPK.
    pub max_updates_per_epk: Option<usize>,
    /// Reject EPKs whose value changes more often than their lattice height.
    pub check_lattice_height: bool,
    /// Log every fallback value at debug level.
    pub trace_fallbacks: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            batch_size: 64,
            order: WorklistOrder::Fifo,
            max_updates_per_epk: None,
            check_lattice_height: true,
            trace_fallbacks: false,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> FpResult<Self> {
        Self::parse(content, "<inline>")
    }

    pub fn from_file(path: impl AsRef<Path>) -> FpResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, &path.display().to_string())
    }

    fn parse(content: &str, file: &str) -> FpResult<Self> {
        toml::from_str(content).map_err(|source| FpError::ConfigParseError {
            source,
            file: file.to_string(),
        })
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_order(mut self, order: WorklistOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_max_updates_per_epk(mut self, limit: usize) -> Self {
        self.max_updates_per_epk = Some(limit);
        self
    }

    pub(crate) fn store_limits(&self) -> StoreLimits {
        StoreLimits {
            max_updates_per_epk: self.max_updates_per_epk,
            check_lattice_height: self.check_lattice_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.order.is_fifo());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = EngineConfig::from_toml_str("thread = 2").unwrap_err();
        assert!(matches!(err, FpError::ConfigParseError { ref file, .. } if file == "<inline>"));
    }

    #[test]
    fn order_parses_from_tagged_table() {
        let config = EngineConfig::from_toml_str("order = { kind = \"lifo\" }").unwrap();
        assert_eq!(config.order, WorklistOrder::Lifo);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = EngineConfig::from_file("/nonexistent/fpcore.toml").unwrap_err();
        assert!(matches!(err, FpError::IoError(_)));
    }

    struct Marker(u8);
    impl OpaqueObject for Marker {}

    #[test]
    fn context_objects_are_keyed_by_type() {
        let mut objects = ContextObjects::new();
        assert!(objects.insert(Marker(1)).is_none());
        assert!(objects.insert(Marker(2)).is_some());

        assert_eq!(objects.get::<Marker>().map(|m| m.0), Some(2));
        assert_eq!(objects.len(), 1);
    }
}
