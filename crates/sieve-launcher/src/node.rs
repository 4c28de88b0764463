//! FilterNode - one launchable (kind, config) pair

use sieve_protocol::DataMap;
use sieve_runtime::Filter;

/// A filter waiting to be launched
///
/// The builder closure defers construction to the worker thread so filter
/// values never cross threads half-initialized.
pub struct FilterNode {
    kind: String,
    config: DataMap,
    build: Box<dyn FnOnce() -> Box<dyn Filter> + Send>,
}

impl FilterNode {
    /// Node for a filter type with a `Default` constructor
    pub fn new<F>(kind: impl Into<String>, config: DataMap) -> Self
    where
        F: Filter + Default + 'static,
    {
        Self {
            kind: kind.into(),
            config,
            build: Box::new(|| Box::new(F::default())),
        }
    }

    /// Node with an explicit factory
    pub fn with_factory(
        kind: impl Into<String>,
        config: DataMap,
        build: impl FnOnce() -> Box<dyn Filter> + Send + 'static,
    ) -> Self {
        Self {
            kind: kind.into(),
            config,
            build: Box::new(build),
        }
    }

    /// The filter kind name
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The raw user config
    pub fn config(&self) -> &DataMap {
        &self.config
    }

    pub(crate) fn into_parts(self) -> (String, DataMap, Box<dyn FnOnce() -> Box<dyn Filter> + Send>) {
        (self.kind, self.config, self.build)
    }
}

impl std::fmt::Debug for FilterNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterNode")
            .field("kind", &self.kind)
            .finish()
    }
}
