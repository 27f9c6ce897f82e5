//! RB-020: Read-only context holding the particle spec and store registries.
//!
//! The normalizer and resolver consume these through the `SpecLookup` and
//! `StoreLookup` traits; `Context` is the in-memory snapshot built from a
//! `context.yaml` document. A `Context` is never mutated during resolution.

use super::types::{ContextDoc, ParticleSpec, StoreDescriptor, TypeDescriptor};
use indexmap::IndexMap;
use std::sync::Arc;

/// Resolves a particle name to its spec.
pub trait SpecLookup {
    fn lookup(&self, name: &str) -> Option<Arc<ParticleSpec>>;
}

/// Exposes the concrete stores available for Use/Map/Copy handles.
pub trait StoreLookup {
    fn store(&self, id: &str) -> Option<&StoreDescriptor>;
    fn stores(&self) -> Vec<&StoreDescriptor>;
}

/// Immutable snapshot of spec and store registries.
#[derive(Debug, Clone, Default)]
pub struct Context {
    specs: IndexMap<String, Arc<ParticleSpec>>,
    stores: IndexMap<String, StoreDescriptor>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from a parsed context document.
    pub fn from_doc(doc: &ContextDoc) -> Self {
        let mut ctx = Self::new();
        for (name, spec) in &doc.particles {
            ctx.add_spec(ParticleSpec {
                name: name.clone(),
                verbs: spec.verbs.clone(),
                connections: spec.connections.clone(),
            });
        }
        for (id, store) in &doc.stores {
            ctx.add_store(StoreDescriptor {
                id: id.clone(),
                type_desc: store.type_desc.as_deref().map(TypeDescriptor::new),
                tags: store.tags.clone(),
            });
        }
        ctx
    }

    /// Register a spec, replacing any previous spec of the same name.
    pub fn add_spec(&mut self, spec: ParticleSpec) {
        self.specs.insert(spec.name.clone(), Arc::new(spec));
    }

    pub fn add_store(&mut self, store: StoreDescriptor) {
        self.stores.insert(store.id.clone(), store);
    }

    pub fn spec_count(&self) -> usize {
        self.specs.len()
    }

    pub fn store_count(&self) -> usize {
        self.stores.len()
    }

    /// Specs that advertise `verb`, in registration order.
    pub fn specs_with_verb(&self, verb: &str) -> Vec<Arc<ParticleSpec>> {
        self.specs
            .values()
            .filter(|s| s.verbs.iter().any(|v| v == verb))
            .cloned()
            .collect()
    }
}

impl SpecLookup for Context {
    fn lookup(&self, name: &str) -> Option<Arc<ParticleSpec>> {
        self.specs.get(name).cloned()
    }
}

impl StoreLookup for Context {
    fn store(&self, id: &str) -> Option<&StoreDescriptor> {
        self.stores.get(id)
    }

    fn stores(&self) -> Vec<&StoreDescriptor> {
        self.stores.values().collect()
    }
}
