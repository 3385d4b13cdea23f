//! Weak-handle cache for sampled methods.
//!
//! The first time a frame key shows up in a trace, the resolved (weak)
//! method handle is parked here. The recompile driver later uses these
//! handles to re-check liveness and promote to strong references; keeping
//! them weak means a sampled method never pins its holder in memory.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::MethodKey;
use crate::host::MethodRef;

#[derive(Default)]
pub struct SampledMethods {
    refs: HashMap<MethodKey, Arc<dyn MethodRef>>,
}

impl SampledMethods {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &MethodKey) -> Option<&Arc<dyn MethodRef>> {
        self.refs.get(key)
    }

    /// Park a handle for `key` unless one is already stored.
    pub fn insert_if_absent(&mut self, key: MethodKey, handle: Arc<dyn MethodRef>) {
        self.refs.entry(key).or_insert(handle);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn clear(&mut self) {
        self.refs.clear();
    }
}
