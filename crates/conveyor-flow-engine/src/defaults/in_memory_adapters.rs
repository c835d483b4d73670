//! In-memory [`AdapterLookup`] backed by a shared map.
//!
//! Useful for tests and for embedding the engine without a persistence
//! layer. Cheaply cloneable; clones share the same underlying map.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::errors::LookupError;
use crate::traits::AdapterLookup;
use crate::types::Adapter;

#[derive(Clone, Default)]
pub struct InMemoryAdapterLookup {
    inner: Arc<RwLock<BTreeMap<String, Adapter>>>,
}

impl InMemoryAdapterLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an adapter by id.
    pub fn insert(&self, adapter: Adapter) {
        self.inner.write().insert(adapter.id.clone(), adapter);
    }

    /// Remove an adapter. Returns `true` if it existed.
    pub fn remove(&self, id: &str) -> bool {
        self.inner.write().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[async_trait]
impl AdapterLookup for InMemoryAdapterLookup {
    async fn find(&self, id: &str) -> Result<Option<Adapter>, LookupError> {
        Ok(self.inner.read().get(id).cloned())
    }
}
