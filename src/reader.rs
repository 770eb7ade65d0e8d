use crate::error::Result;
use crate::objects::{Object, ObjectId};
use std::collections::HashMap;

/// Source of not-yet-materialized objects, typically backed by a parsed byte
/// stream. The registry calls `materialize` on first access to an address it
/// does not know.
///
/// Implementations must be deterministic and side-effect-free apart from
/// their own caching; the registry caches the returned object and never asks
/// for the same address twice.
pub trait ObjectSource {
    /// Returns the object stored at `id`, or `None` if the source does not
    /// know the address.
    fn materialize(&self, id: ObjectId) -> Result<Option<Object>>;

    /// The document root (catalog) declared by the source, if any.
    fn root(&self) -> Option<ObjectId> {
        None
    }

    /// Page objects declared by the source, in document order.
    fn page_objects(&self) -> Vec<ObjectId> {
        Vec::new()
    }

    /// Conformance-level marker carried by the source, if any. Read lazily by
    /// the document; never forced at open or close time.
    fn conformance_level(&self) -> Option<String> {
        None
    }

    /// Highest object number the source owns. The registry allocates fresh
    /// numbers strictly above this, so lazily materialized source objects can
    /// never be shadowed by new allocations.
    fn max_object_number(&self) -> u32 {
        0
    }
}

/// Map-backed [`ObjectSource`] for pre-parsed object graphs and tests.
#[derive(Debug, Default)]
pub struct MemorySource {
    objects: HashMap<u32, Object>,
    root: Option<ObjectId>,
    pages: Vec<ObjectId>,
    conformance: Option<String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, number: u32, object: Object) {
        self.objects.insert(number, object);
    }

    pub fn set_root(&mut self, root: ObjectId) {
        self.root = Some(root);
    }

    pub fn add_page_object(&mut self, id: ObjectId) {
        self.pages.push(id);
    }

    pub fn set_conformance_level(&mut self, level: impl Into<String>) {
        self.conformance = Some(level.into());
    }
}

impl ObjectSource for MemorySource {
    fn materialize(&self, id: ObjectId) -> Result<Option<Object>> {
        Ok(self.objects.get(&id.number()).cloned())
    }

    fn root(&self) -> Option<ObjectId> {
        self.root
    }

    fn page_objects(&self) -> Vec<ObjectId> {
        self.pages.clone()
    }

    fn conformance_level(&self) -> Option<String> {
        self.conformance.clone()
    }

    fn max_object_number(&self) -> u32 {
        self.objects.keys().copied().max().unwrap_or(0)
    }
}
