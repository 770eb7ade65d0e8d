use crate::error::{PdfError, Result};
use crate::layers::{Layer, OcProperties};
use crate::objects::{Dictionary, Object, ObjectId};
use crate::reader::ObjectSource;
use crate::writer::ObjectSink;
use crate::xref::XrefTable;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a `Document` instance. Copy caches between
/// document pairs are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(u64);

/// Handle to a page dictionary inside one document's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    id: ObjectId,
}

impl Page {
    pub(crate) fn new(id: ObjectId) -> Self {
        Self { id }
    }

    pub fn object_id(&self) -> ObjectId {
        self.id
    }
}

/// Document metadata serialized into the info dictionary at close time, but
/// only if it was materialized before close.
#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub producer: String,
    pub creation_date: DateTime<Utc>,
    pub modification_date: DateTime<Utc>,
}

impl Default for DocumentInfo {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            title: None,
            author: None,
            producer: format!("pdf-dom v{}", env!("CARGO_PKG_VERSION")),
            creation_date: now,
            modification_date: now,
        }
    }
}

impl DocumentInfo {
    fn pdf_date(date: &DateTime<Utc>) -> String {
        date.format("D:%Y%m%d%H%M%SZ").to_string()
    }

    pub(crate) fn to_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        if let Some(title) = &self.title {
            dict.set("Title", Object::String(title.clone()));
        }
        if let Some(author) = &self.author {
            dict.set("Author", Object::String(author.clone()));
        }
        dict.set("Producer", Object::String(self.producer.clone()));
        dict.set(
            "CreationDate",
            Object::String(Self::pdf_date(&self.creation_date)),
        );
        dict.set(
            "ModDate",
            Object::String(Self::pdf_date(&self.modification_date)),
        );
        dict
    }
}

/// A document: one registry, a catalog, optional source and sink, and the
/// bookkeeping for pages, optional-content layers, and cross-document copy
/// caches.
///
/// Documents are single-owner; there is no internal locking. Cross-document
/// operations take `&mut` on both sides, so two documents can never alias.
pub struct Document {
    id: DocumentId,
    pub(crate) xref: XrefTable,
    pub(crate) writer: Option<Box<dyn ObjectSink>>,
    catalog_id: Option<ObjectId>,
    pages_root: Option<ObjectId>,
    pub(crate) pages: Vec<Page>,
    info: Option<DocumentInfo>,
    /// `None` = never asked; `Some(inner)` = materialized answer.
    conformance: Option<Option<String>>,
    pub(crate) oc_properties: Option<OcProperties>,
    /// source document id -> (source object number -> copied target address)
    pub(crate) copy_caches: HashMap<DocumentId, HashMap<u32, ObjectId>>,
    pub(crate) closed: bool,
}

impl Document {
    pub fn new() -> Self {
        Self::build(None, None)
    }

    pub fn with_writer(writer: Box<dyn ObjectSink>) -> Self {
        Self::build(None, Some(writer))
    }

    pub fn with_source(source: Box<dyn ObjectSource>) -> Self {
        Self::build(Some(source), None)
    }

    pub fn with_source_and_writer(
        source: Box<dyn ObjectSource>,
        writer: Box<dyn ObjectSink>,
    ) -> Self {
        Self::build(Some(source), Some(writer))
    }

    fn build(source: Option<Box<dyn ObjectSource>>, writer: Option<Box<dyn ObjectSink>>) -> Self {
        let xref = match source {
            Some(source) => XrefTable::with_source(source),
            None => XrefTable::new(),
        };
        let mut document = Self {
            id: DocumentId(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed)),
            xref,
            writer,
            catalog_id: None,
            pages_root: None,
            pages: Vec::new(),
            info: None,
            conformance: None,
            oc_properties: None,
            copy_caches: HashMap::new(),
            closed: false,
        };
        // Two-phase open: the instance is fully formed before the hook runs,
        // so initialization timing cannot depend on how the value was built.
        document.on_opened();
        document
    }

    /// Explicit post-construction step. Adopts the source's pages and, when a
    /// writer is attached, materializes the document info eagerly. Everything
    /// else stays lazy until first access.
    fn on_opened(&mut self) {
        for id in self.xref.source_page_objects() {
            self.pages.push(Page::new(id));
        }
        if self.writer.is_some() {
            self.info = Some(DocumentInfo::default());
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(PdfError::DocumentClosed)
        } else {
            Ok(())
        }
    }

    fn add_object_internal(&mut self, object: Object) -> Result<ObjectId> {
        let id = self.xref.allocate();
        self.xref.set(id, object)?;
        Ok(id)
    }

    /// Stores a new indirect object and returns its address.
    pub fn add_object(&mut self, object: Object) -> Result<ObjectId> {
        self.check_open()?;
        self.add_object_internal(object)
    }

    /// Resolves an address, materializing from the source on first access.
    pub fn object(&mut self, id: ObjectId) -> Result<&Object> {
        self.xref.resolve(id)
    }

    /// Mutable resolve; fails with `ImmutableObject` on a flushed entry.
    pub fn object_mut(&mut self, id: ObjectId) -> Result<&mut Object> {
        self.check_open()?;
        self.xref.resolve_mut(id)
    }

    pub fn is_flushed(&self, id: ObjectId) -> bool {
        self.xref.is_flushed(id)
    }

    pub fn object_count(&self) -> usize {
        self.xref.len()
    }

    /// The catalog address, binding the source-declared root on first access
    /// or creating a fresh catalog dictionary if there is none.
    pub fn catalog(&mut self) -> Result<ObjectId> {
        if let Some(id) = self.catalog_id {
            return Ok(id);
        }
        if let Some(root) = self.xref.source_root() {
            self.xref.resolve(root)?;
            self.catalog_id = Some(root);
            return Ok(root);
        }
        self.check_open()?;
        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name("Catalog".into()));
        let id = self.add_object_internal(Object::Dictionary(dict))?;
        self.catalog_id = Some(id);
        Ok(id)
    }

    pub(crate) fn ensure_page_tree(&mut self) -> Result<ObjectId> {
        if let Some(id) = self.pages_root {
            return Ok(id);
        }
        let catalog = self.catalog()?;
        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name("Pages".into()));
        dict.set("Kids", Object::Array(Vec::new()));
        dict.set("Count", 0);
        let id = self.add_object_internal(Object::Dictionary(dict))?;

        let object = self.xref.resolve_mut(catalog)?;
        let catalog_dict = object
            .as_dict_mut()
            .ok_or(PdfError::CorruptReference(catalog))?;
        catalog_dict.set("Pages", Object::Reference(id));

        self.pages_root = Some(id);
        Ok(id)
    }

    /// Links an existing page object into the page tree and page list.
    pub(crate) fn attach_page(&mut self, id: ObjectId) -> Result<()> {
        let tree = self.ensure_page_tree()?;
        let object = self.xref.resolve_mut(tree)?;
        let dict = object.as_dict_mut().ok_or(PdfError::CorruptReference(tree))?;
        match dict.get_mut("Kids") {
            Some(Object::Array(kids)) => kids.push(Object::Reference(id)),
            _ => dict.set("Kids", Object::Array(vec![Object::Reference(id)])),
        }
        let count = dict.get("Count").and_then(Object::as_integer).unwrap_or(0) + 1;
        dict.set("Count", count);
        self.pages.push(Page::new(id));
        Ok(())
    }

    /// Appends a new empty page to the document's page tree.
    pub fn add_page(&mut self) -> Result<Page> {
        self.check_open()?;
        let tree = self.ensure_page_tree()?;
        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name("Page".into()));
        dict.set("Parent", Object::Reference(tree));
        dict.set("Resources", Object::Dictionary(Dictionary::new()));
        let id = self.add_object_internal(Object::Dictionary(dict))?;
        self.attach_page(id)?;
        Ok(Page::new(id))
    }

    /// 1-based page access.
    pub fn page(&self, number: u32) -> Result<Page> {
        if number == 0 {
            return Err(PdfError::InvalidPageNumber(number));
        }
        self.pages
            .get((number - 1) as usize)
            .copied()
            .ok_or(PdfError::InvalidPageNumber(number))
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Registers an optional-content dictionary under the page's
    /// Resources/Properties map and returns the generated property key.
    pub fn add_page_property(&mut self, page: Page, ocg: ObjectId) -> Result<String> {
        self.check_open()?;
        let indirect_resources = {
            let dict = self
                .xref
                .resolve(page.id)?
                .as_dict()
                .ok_or(PdfError::CorruptReference(page.id))?;
            match dict.get("Resources") {
                Some(Object::Reference(id)) => Some(*id),
                _ => None,
            }
        };
        match indirect_resources {
            Some(resources_id) => {
                let object = self.xref.resolve_mut(resources_id)?;
                let resources = object
                    .as_dict_mut()
                    .ok_or(PdfError::CorruptReference(resources_id))?;
                add_property(resources, ocg)
            }
            None => {
                let object = self.xref.resolve_mut(page.id)?;
                let dict = object
                    .as_dict_mut()
                    .ok_or(PdfError::CorruptReference(page.id))?;
                if !matches!(dict.get("Resources"), Some(Object::Dictionary(_))) {
                    dict.set("Resources", Object::Dictionary(Dictionary::new()));
                }
                match dict.get_mut("Resources") {
                    Some(Object::Dictionary(resources)) => add_property(resources, ocg),
                    _ => Err(PdfError::CorruptReference(page.id)),
                }
            }
        }
    }

    /// Moves a page's inline resources into their own indirect object so they
    /// can be shared between pages. Returns the resources address.
    pub fn make_page_resources_indirect(&mut self, page: Page) -> Result<ObjectId> {
        self.check_open()?;
        let resources = {
            let dict = self
                .xref
                .resolve(page.id)?
                .as_dict()
                .ok_or(PdfError::CorruptReference(page.id))?;
            match dict.get("Resources") {
                Some(Object::Reference(id)) => return Ok(*id),
                Some(Object::Dictionary(d)) => d.clone(),
                _ => Dictionary::new(),
            }
        };
        let resources_id = self.add_object_internal(Object::Dictionary(resources))?;
        self.set_page_resources(page, resources_id)?;
        Ok(resources_id)
    }

    /// Points a page's Resources entry at an existing indirect object.
    pub fn set_page_resources(&mut self, page: Page, resources: ObjectId) -> Result<()> {
        self.check_open()?;
        let object = self.xref.resolve_mut(page.id)?;
        let dict = object
            .as_dict_mut()
            .ok_or(PdfError::CorruptReference(page.id))?;
        dict.set("Resources", Object::Reference(resources));
        Ok(())
    }

    fn ensure_oc_properties(&mut self) -> Result<()> {
        if self.oc_properties.is_some() {
            return Ok(());
        }
        let catalog = self.catalog()?;

        // A parsed catalog may already carry optional-content properties;
        // adopt them so existing layers take part in dedup and renaming. An
        // inline dictionary is promoted to its own indirect object first.
        let existing = self
            .xref
            .resolve(catalog)?
            .as_dict()
            .and_then(|dict| dict.get("OCProperties"))
            .cloned();
        match existing {
            Some(Object::Reference(id)) => {
                self.oc_properties = Some(OcProperties::from_existing(&mut self.xref, id)?);
                return Ok(());
            }
            Some(Object::Dictionary(inline)) => {
                let id = self.add_object_internal(Object::Dictionary(inline))?;
                let object = self.xref.resolve_mut(catalog)?;
                let catalog_dict = object
                    .as_dict_mut()
                    .ok_or(PdfError::CorruptReference(catalog))?;
                catalog_dict.set("OCProperties", Object::Reference(id));
                self.oc_properties = Some(OcProperties::from_existing(&mut self.xref, id)?);
                return Ok(());
            }
            _ => {}
        }

        let mut dict = Dictionary::new();
        dict.set("OCGs", Object::Array(Vec::new()));
        let id = self.add_object_internal(Object::Dictionary(dict))?;

        let object = self.xref.resolve_mut(catalog)?;
        let catalog_dict = object
            .as_dict_mut()
            .ok_or(PdfError::CorruptReference(catalog))?;
        catalog_dict.set("OCProperties", Object::Reference(id));

        self.oc_properties = Some(OcProperties::new(id));
        Ok(())
    }

    /// The optional-content properties, created lazily on request.
    pub fn oc_properties(&mut self, create_if_absent: bool) -> Result<Option<&OcProperties>> {
        if self.oc_properties.is_none() && create_if_absent {
            self.check_open()?;
            self.ensure_oc_properties()?;
        }
        Ok(self.oc_properties.as_ref())
    }

    /// Registers a layer dictionary, deduplicating by identity and renaming
    /// on name collisions between distinct objects.
    pub fn register_layer(&mut self, id: ObjectId) -> Result<&Layer> {
        self.ensure_oc_properties()?;
        let properties = self
            .oc_properties
            .as_mut()
            .ok_or(PdfError::CorruptReference(id))?;
        properties.register(&mut self.xref, id)
    }

    /// Lazily materialized document info. Not available after close.
    pub fn document_info(&mut self) -> Result<&DocumentInfo> {
        self.check_open()?;
        Ok(self.info.get_or_insert_with(DocumentInfo::default))
    }

    pub fn document_info_mut(&mut self) -> Result<&mut DocumentInfo> {
        self.check_open()?;
        Ok(self.info.get_or_insert_with(DocumentInfo::default))
    }

    /// Whether the info was materialized, without forcing it.
    pub fn document_info_initialized(&self) -> bool {
        self.info.is_some()
    }

    /// Conformance-level marker, read from the source on first call only.
    pub fn conformance_level(&mut self) -> Option<String> {
        if self.conformance.is_none() {
            self.conformance = Some(self.xref.source_conformance_level());
        }
        self.conformance.clone().flatten()
    }

    /// Whether the conformance marker was materialized, without forcing it.
    pub fn conformance_level_initialized(&self) -> bool {
        self.conformance.is_some()
    }

    pub(crate) fn write_and_mark(&mut self, id: ObjectId) -> Result<()> {
        if self.xref.is_flushed(id) {
            return Ok(());
        }
        let object = self.xref.resolve(id)?.clone();
        if let Some(writer) = self.writer.as_mut() {
            writer.write_object(id, &object)?;
        }
        self.xref.mark_flushed(id)
    }

    fn flush_reachable(&mut self, extras: &[ObjectId]) -> Result<()> {
        let root = self.catalog()?;
        let mut pending: Vec<ObjectId> = vec![root];
        pending.extend_from_slice(extras);
        let mut seen: HashSet<u32> = HashSet::new();
        let mut reachable: Vec<ObjectId> = Vec::new();

        while let Some(id) = pending.pop() {
            if !seen.insert(id.number()) {
                continue;
            }
            let object = self.xref.resolve(id)?.clone();
            reachable.push(id);
            let mut references = Vec::new();
            object.collect_references(&mut references);
            pending.extend(references);
        }

        reachable.sort_by_key(ObjectId::number);
        for id in reachable {
            self.write_and_mark(id)?;
        }
        Ok(())
    }

    /// Serializes every in-memory entry reachable from the catalog to the
    /// sink, ascending object number, and marks each flushed.
    pub fn flush_all(&mut self) -> Result<()> {
        self.check_open()?;
        self.flush_reachable(&[])
    }

    /// Partial flush of an explicit set of addresses. Every listed entry and
    /// every object it directly references must already be materialized.
    pub fn flush_objects(&mut self, ids: &[ObjectId]) -> Result<()> {
        self.check_open()?;
        let mut ordered = ids.to_vec();
        ordered.sort_by_key(ObjectId::number);
        for id in &ordered {
            if self.xref.is_flushed(*id) {
                continue;
            }
            if !self.xref.is_materialized(*id) {
                return Err(PdfError::UnresolvedObject(*id));
            }
            let mut references = Vec::new();
            self.xref.resolve(*id)?.collect_references(&mut references);
            for reference in references {
                if !self.xref.is_materialized(reference) {
                    return Err(PdfError::UnresolvedObject(reference));
                }
            }
        }
        for id in ordered {
            self.write_and_mark(id)?;
        }
        Ok(())
    }

    /// Finalizes the document: flushes everything reachable, writes the end
    /// of the output, and closes. Fails with `NoPages` on an empty document.
    ///
    /// Close never populates lazily initialized metadata: the info dictionary
    /// is serialized only if it was materialized before this call.
    pub fn close(&mut self) -> Result<()> {
        self.check_open()?;
        if self.pages.is_empty() {
            return Err(PdfError::NoPages);
        }
        let catalog = self.catalog()?;
        let info_id = match &self.info {
            Some(info) => {
                let dict = info.to_dictionary();
                Some(self.add_object_internal(Object::Dictionary(dict))?)
            }
            None => None,
        };
        let extras: Vec<ObjectId> = info_id.into_iter().collect();
        self.flush_reachable(&extras)?;
        if let Some(writer) = self.writer.as_mut() {
            writer.finish(Some(catalog), info_id)?;
        }
        self.closed = true;
        Ok(())
    }
}

fn add_property(resources: &mut Dictionary, ocg: ObjectId) -> Result<String> {
    if !matches!(resources.get("Properties"), Some(Object::Dictionary(_))) {
        resources.set("Properties", Object::Dictionary(Dictionary::new()));
    }
    match resources.get_mut("Properties") {
        Some(Object::Dictionary(properties)) => {
            let key = format!("MC{}", properties.len());
            properties.set(key.clone(), Object::Reference(ocg));
            Ok(key)
        }
        _ => Err(PdfError::CorruptReference(ocg)),
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
