use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId};
use crate::reader::ObjectSource;
use std::collections::BTreeMap;

/// Write state of a registry entry.
///
/// `Flushed` is a one-way gate: once an entry is flushed its object is
/// immutable and the entry never returns to `InMemory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    InMemory,
    Flushed,
    Free,
}

#[derive(Debug)]
struct XrefEntry {
    object: Object,
    generation: u16,
    state: EntryState,
}

/// Per-document cross-reference table: maps object numbers to objects and
/// their write state.
///
/// Entries unknown to the table are materialized on first resolve from the
/// attached [`ObjectSource`], if any. Iteration order is ascending object
/// number, which is what gives flushing its deterministic order.
pub struct XrefTable {
    entries: BTreeMap<u32, XrefEntry>,
    free_list: Vec<ObjectId>,
    next_number: u32,
    source: Option<Box<dyn ObjectSource>>,
}

impl XrefTable {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            free_list: Vec::new(),
            next_number: 1,
            source: None,
        }
    }

    pub fn with_source(source: Box<dyn ObjectSource>) -> Self {
        let mut table = Self::new();
        // Fresh allocations must not collide with numbers the source owns,
        // even before those objects are materialized.
        table.next_number = source.max_object_number() + 1;
        table.source = Some(source);
        table
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub(crate) fn source_root(&self) -> Option<ObjectId> {
        self.source.as_ref().and_then(|s| s.root())
    }

    pub(crate) fn source_page_objects(&self) -> Vec<ObjectId> {
        self.source
            .as_ref()
            .map(|s| s.page_objects())
            .unwrap_or_default()
    }

    pub(crate) fn source_conformance_level(&self) -> Option<String> {
        self.source.as_ref().and_then(|s| s.conformance_level())
    }

    /// Allocates a fresh address, reusing a freed slot with a bumped
    /// generation when one is available. The new entry starts `InMemory`
    /// holding an empty dictionary.
    pub fn allocate(&mut self) -> ObjectId {
        let id = match self.free_list.pop() {
            Some(id) => id,
            None => {
                let number = self.next_number;
                self.next_number += 1;
                ObjectId::new(number, 0)
            }
        };
        self.entries.insert(
            id.number(),
            XrefEntry {
                object: Object::Dictionary(Dictionary::new()),
                generation: id.generation(),
                state: EntryState::InMemory,
            },
        );
        id
    }

    fn ensure_materialized(&mut self, id: ObjectId) -> Result<()> {
        if self.entries.contains_key(&id.number()) {
            return Ok(());
        }
        let object = match self.source.as_ref() {
            Some(source) => source.materialize(id)?,
            None => None,
        };
        match object {
            Some(object) => {
                self.next_number = self.next_number.max(id.number() + 1);
                self.entries.insert(
                    id.number(),
                    XrefEntry {
                        object,
                        generation: id.generation(),
                        state: EntryState::InMemory,
                    },
                );
                Ok(())
            }
            None => Err(PdfError::CorruptReference(id)),
        }
    }

    fn entry(&self, id: ObjectId) -> Result<&XrefEntry> {
        let entry = self
            .entries
            .get(&id.number())
            .ok_or(PdfError::CorruptReference(id))?;
        if entry.generation != id.generation() || entry.state == EntryState::Free {
            return Err(PdfError::CorruptReference(id));
        }
        Ok(entry)
    }

    fn entry_mut(&mut self, id: ObjectId) -> Result<&mut XrefEntry> {
        let entry = self
            .entries
            .get_mut(&id.number())
            .ok_or(PdfError::CorruptReference(id))?;
        if entry.generation != id.generation() || entry.state == EntryState::Free {
            return Err(PdfError::CorruptReference(id));
        }
        Ok(entry)
    }

    /// Resolves an address to its object, materializing from the source on
    /// first access. Unknown to both table and source is `CorruptReference`.
    pub fn resolve(&mut self, id: ObjectId) -> Result<&Object> {
        self.ensure_materialized(id)?;
        Ok(&self.entry(id)?.object)
    }

    /// Mutable resolve. Fails with `ImmutableObject` on a flushed entry.
    pub fn resolve_mut(&mut self, id: ObjectId) -> Result<&mut Object> {
        self.ensure_materialized(id)?;
        let entry = self.entry_mut(id)?;
        if entry.state == EntryState::Flushed {
            return Err(PdfError::ImmutableObject(id));
        }
        Ok(&mut entry.object)
    }

    /// Replaces the object stored at an existing address.
    pub fn set(&mut self, id: ObjectId, object: Object) -> Result<()> {
        let slot = self.resolve_mut(id)?;
        *slot = object;
        Ok(())
    }

    /// One-way transition to `Flushed`. Idempotent.
    pub fn mark_flushed(&mut self, id: ObjectId) -> Result<()> {
        self.entry_mut(id)?.state = EntryState::Flushed;
        Ok(())
    }

    pub fn is_flushed(&self, id: ObjectId) -> bool {
        self.entry(id)
            .map(|e| e.state == EntryState::Flushed)
            .unwrap_or(false)
    }

    /// Whether the entry exists in the table (resolved, not freed), without
    /// consulting the source.
    pub fn is_materialized(&self, id: ObjectId) -> bool {
        self.entry(id).is_ok()
    }

    pub fn state(&self, id: ObjectId) -> Option<EntryState> {
        self.entry(id).ok().map(|e| e.state)
    }

    /// Marks a slot free for reuse with a bumped generation.
    pub fn free(&mut self, id: ObjectId) -> Result<()> {
        let entry = self.entry_mut(id)?;
        if entry.state == EntryState::Flushed {
            return Err(PdfError::ImmutableObject(id));
        }
        entry.state = EntryState::Free;
        entry.object = Object::Null;
        self.free_list
            .push(ObjectId::new(id.number(), id.generation() + 1));
        Ok(())
    }

    /// All `InMemory` addresses in ascending object-number order.
    pub fn in_memory_ids(&self) -> Vec<ObjectId> {
        self.entries
            .iter()
            .filter(|(_, e)| e.state == EntryState::InMemory)
            .map(|(&number, e)| ObjectId::new(number, e.generation))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for XrefTable {
    fn default() -> Self {
        Self::new()
    }
}
