//! Cross-document page copying.
//!
//! Copies are driven by a per-(source, target) cache mapping source object
//! numbers to target addresses, held by the target document. The cache makes
//! shared indirect objects (fonts, resources, optional-content groups) copy
//! once per document pair, across calls, and makes cyclic object graphs
//! terminate: the mapping for an object is recorded before its contents are
//! copied, so a back-reference met during recursion resolves to the
//! already-allocated target address.

use crate::document::{Document, Page};
use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId};
use crate::xref::XrefTable;
use std::collections::HashMap;

type CopyCache = HashMap<u32, ObjectId>;

impl Document {
    /// Copies the 1-based inclusive page range `from..=to` into `target`,
    /// appending the copied pages to its page tree.
    ///
    /// Indirect objects reachable from the pages are copied once per
    /// (source, target) pair; later calls reuse earlier copies. References to
    /// source objects that were already flushed cannot be followed: they are
    /// replaced with `Null` in the copy and reported through the error log,
    /// but the page copy itself still succeeds. A page whose own dictionary
    /// is flushed in the source is skipped entirely, with a diagnostic.
    pub fn copy_pages_to(
        &mut self,
        from: u32,
        to: u32,
        target: &mut Document,
    ) -> Result<Vec<Page>> {
        self.check_open()?;
        target.check_open()?;
        let count = self.page_count();
        if from == 0 || from > to || to > count {
            return Err(PdfError::InvalidPageRange { from, to, count });
        }

        let source_id = self.id();
        let mut cache = target.copy_caches.remove(&source_id).unwrap_or_default();
        let result = copy_page_range(self, target, &mut cache, from, to);
        // The cache survives errors too; partially copied objects stay mapped.
        target.copy_caches.insert(source_id, cache);
        result
    }

    /// Flushes every object this document received from `source` and drops
    /// the copy cache for that pair. Returns the number of flushed entries.
    ///
    /// After this call the copied objects are immutable and later copies from
    /// the same source start from an empty cache, so shared source objects
    /// get fresh target copies instead of references to flushed ones.
    pub fn flush_copied_objects(&mut self, source: &Document) -> Result<usize> {
        self.check_open()?;
        let cache = match self.copy_caches.remove(&source.id()) {
            Some(cache) => cache,
            None => return Ok(0),
        };
        let mut ids: Vec<ObjectId> = cache.values().copied().collect();
        ids.sort_by_key(ObjectId::number);
        let count = ids.len();
        for id in ids {
            self.write_and_mark(id)?;
        }
        Ok(count)
    }
}

fn copy_page_range(
    source: &mut Document,
    target: &mut Document,
    cache: &mut CopyCache,
    from: u32,
    to: u32,
) -> Result<Vec<Page>> {
    let mut copied = Vec::new();
    for number in from..=to {
        let page_id = source.pages[(number - 1) as usize].object_id();
        if source.xref.is_flushed(page_id) {
            tracing::error!(
                page = %page_id,
                "page is already flushed in the source and cannot be copied, skipping"
            );
            continue;
        }
        // A repeat copy of the same page resolves to the existing target
        // page; it is already attached and its layers already registered.
        if let Some(&mapped) = cache.get(&page_id.number()) {
            copied.push(Page::new(mapped));
            continue;
        }
        let copied_id = copy_page(&mut source.xref, &mut target.xref, cache, page_id)?;
        target.attach_page(copied_id)?;
        register_page_layers(target, copied_id)?;
        copied.push(Page::new(copied_id));
    }
    Ok(copied)
}

/// Copies one page dictionary. The `Parent` entry is dropped before the
/// graph walk so the copy never drags the source page tree along; attaching
/// the page re-links it into the target's tree.
fn copy_page(
    source: &mut XrefTable,
    target: &mut XrefTable,
    cache: &mut CopyCache,
    page_id: ObjectId,
) -> Result<ObjectId> {
    let mut page_dict = source
        .resolve(page_id)?
        .as_dict()
        .cloned()
        .ok_or(PdfError::CorruptReference(page_id))?;
    page_dict.remove("Parent");

    let copied_id = target.allocate();
    cache.insert(page_id.number(), copied_id);
    let copied_dict = copy_dictionary(source, target, cache, page_dict)?;
    target.set(copied_id, Object::Dictionary(copied_dict))?;
    Ok(copied_id)
}

fn copy_indirect(
    source: &mut XrefTable,
    target: &mut XrefTable,
    cache: &mut CopyCache,
    id: ObjectId,
) -> Result<Option<ObjectId>> {
    if source.is_flushed(id) {
        tracing::error!(
            object = %id,
            "optional content and resources copying failed, source object is already flushed"
        );
        return Ok(None);
    }
    if let Some(&mapped) = cache.get(&id.number()) {
        return Ok(Some(mapped));
    }
    let object = source.resolve(id)?.clone();
    let copied_id = target.allocate();
    // Mapped before recursion so cycles resolve to this address.
    cache.insert(id.number(), copied_id);
    let copied = copy_value(source, target, cache, object)?;
    target.set(copied_id, copied)?;
    Ok(Some(copied_id))
}

fn copy_value(
    source: &mut XrefTable,
    target: &mut XrefTable,
    cache: &mut CopyCache,
    object: Object,
) -> Result<Object> {
    match object {
        Object::Reference(id) => Ok(match copy_indirect(source, target, cache, id)? {
            Some(mapped) => Object::Reference(mapped),
            None => Object::Null,
        }),
        Object::Array(items) => {
            let mut copied = Vec::with_capacity(items.len());
            for item in items {
                copied.push(copy_value(source, target, cache, item)?);
            }
            Ok(Object::Array(copied))
        }
        Object::Dictionary(dict) => Ok(Object::Dictionary(copy_dictionary(
            source, target, cache, dict,
        )?)),
        Object::Stream(dict, data) => Ok(Object::Stream(
            copy_dictionary(source, target, cache, dict)?,
            data,
        )),
        other => Ok(other),
    }
}

fn copy_dictionary(
    source: &mut XrefTable,
    target: &mut XrefTable,
    cache: &mut CopyCache,
    dict: Dictionary,
) -> Result<Dictionary> {
    let mut copied = Dictionary::new();
    for (key, value) in dict {
        let value = copy_value(source, target, cache, value)?;
        copied.set(key, value);
    }
    Ok(copied)
}

/// Post-copy pass registering the optional-content groups a copied page uses
/// under the target catalog, so the target stays self-describing.
///
/// Looks through Resources/Properties (inline or indirect at either level)
/// and registers every referenced dictionary typed `/OCG`. Entries replaced
/// with `Null` during the copy are skipped.
fn register_page_layers(target: &mut Document, page_id: ObjectId) -> Result<()> {
    let resources = {
        let dict = target
            .xref
            .resolve(page_id)?
            .as_dict()
            .ok_or(PdfError::CorruptReference(page_id))?;
        dict.get("Resources").cloned()
    };
    let resources = match resources {
        Some(Object::Dictionary(dict)) => dict,
        Some(Object::Reference(id)) => match target.xref.resolve(id)?.as_dict() {
            Some(dict) => dict.clone(),
            None => return Ok(()),
        },
        _ => return Ok(()),
    };

    let properties = match resources.get("Properties") {
        Some(Object::Dictionary(dict)) => dict.clone(),
        Some(Object::Reference(id)) => match target.xref.resolve(*id)?.as_dict() {
            Some(dict) => dict.clone(),
            None => return Ok(()),
        },
        _ => return Ok(()),
    };

    for (_, value) in properties.iter() {
        let id = match value.as_reference() {
            Some(id) => id,
            None => continue,
        };
        let is_ocg = target
            .xref
            .resolve(id)
            .ok()
            .and_then(Object::as_dict)
            .map(|dict| dict.get_name("Type") == Some("OCG"))
            .unwrap_or(false);
        if is_ocg {
            target.register_layer(id)?;
        }
    }
    Ok(())
}
