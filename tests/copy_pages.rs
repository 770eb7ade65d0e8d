//! End-to-end scenarios for cross-document page copying, layer merging, and
//! document lifecycle.

use pdf_dom::{
    Dictionary, Document, MemorySource, Object, ObjectId, ObjectSink, Page, PdfError, PdfWriter,
    Result,
};
use std::cell::RefCell;
use std::rc::Rc;

fn add_layer(doc: &mut Document, name: &str) -> ObjectId {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name("OCG".into()));
    dict.set("Name", Object::String(name.into()));
    doc.add_object(Object::Dictionary(dict)).unwrap()
}

fn page_with_layer(doc: &mut Document, name: &str) -> Page {
    let page = doc.add_page().unwrap();
    let layer = add_layer(doc, name);
    doc.add_page_property(page, layer).unwrap();
    page
}

fn layer_names(doc: &mut Document) -> Vec<String> {
    doc.oc_properties(false)
        .unwrap()
        .map(|props| {
            props
                .layers()
                .iter()
                .map(|layer| layer.name().to_string())
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn copying_pages_merges_distinct_layer_names() {
    let mut target = Document::new();

    let mut first = Document::new();
    page_with_layer(&mut first, "Background");
    first.copy_pages_to(1, 1, &mut target).unwrap();

    let mut second = Document::new();
    page_with_layer(&mut second, "Foreground");
    second.copy_pages_to(1, 1, &mut target).unwrap();

    assert_eq!(target.page_count(), 2);
    assert_eq!(layer_names(&mut target), vec!["Background", "Foreground"]);
    let props = target.oc_properties(false).unwrap().unwrap();
    assert_eq!(props.conflict_count(), 0);
}

#[test]
fn colliding_layer_names_are_suffixed_in_arrival_order() {
    let mut target = Document::new();

    for _ in 0..4 {
        let mut source = Document::new();
        page_with_layer(&mut source, "Name1");
        source.copy_pages_to(1, 1, &mut target).unwrap();
    }

    assert_eq!(
        layer_names(&mut target),
        vec!["Name1", "Name1_0", "Name1_1", "Name1_2"]
    );
    let props = target.oc_properties(false).unwrap().unwrap();
    assert_eq!(props.conflict_count(), 3);
}

#[test]
fn layer_shared_by_two_pages_registers_once() {
    let mut source = Document::new();
    let mut target = Document::new();

    let layer = add_layer(&mut source, "Grid");
    let page1 = source.add_page().unwrap();
    let page2 = source.add_page().unwrap();
    source.add_page_property(page1, layer).unwrap();
    source.add_page_property(page2, layer).unwrap();

    source.copy_pages_to(1, 2, &mut target).unwrap();

    assert_eq!(target.page_count(), 2);
    assert_eq!(layer_names(&mut target), vec!["Grid"]);
}

#[test]
fn flushed_source_resources_are_not_copied_again() {
    let mut source = Document::new();
    let mut target = Document::new();

    // Two pages sharing one indirect resources dictionary with a layer.
    let page1 = source.add_page().unwrap();
    let page2 = source.add_page().unwrap();
    let resources = source.make_page_resources_indirect(page1).unwrap();
    source.set_page_resources(page2, resources).unwrap();
    let layer = add_layer(&mut source, "Dimensions");
    source.add_page_property(page1, layer).unwrap();

    source.copy_pages_to(1, 1, &mut target).unwrap();
    assert_eq!(layer_names(&mut target), vec!["Dimensions"]);
    let copied_layer = target.oc_properties(false).unwrap().unwrap().layers()[0].object_id();

    // Freeze the shared resources on both sides.
    source.flush_objects(&[resources, layer]).unwrap();
    let flushed = target.flush_copied_objects(&source).unwrap();
    assert!(flushed >= 2);
    assert!(target.is_flushed(copied_layer));

    // The second page still copies, but its resources cannot be followed:
    // the reference is replaced with null and no new layer appears.
    let copied = source.copy_pages_to(2, 2, &mut target).unwrap();
    let page_dict = target
        .object(copied[0].object_id())
        .unwrap()
        .as_dict()
        .unwrap();
    assert_eq!(page_dict.get("Resources"), Some(&Object::Null));
    assert_eq!(layer_names(&mut target), vec!["Dimensions"]);
}

#[test]
fn registering_the_same_layer_twice_is_a_no_op() {
    let mut doc = Document::new();
    doc.add_page().unwrap();
    let layer = add_layer(&mut doc, "Once");

    let first = doc.register_layer(layer).unwrap().object_id();
    let second = doc.register_layer(layer).unwrap().object_id();

    assert_eq!(first, second);
    assert_eq!(layer_names(&mut doc), vec!["Once"]);
}

#[test]
fn objects_shared_across_copy_calls_are_deduplicated() {
    let mut source = Document::new();
    let mut target = Document::new();

    // One font dictionary referenced by both pages.
    let mut font = Dictionary::new();
    font.set("Type", Object::Name("Font".into()));
    font.set("BaseFont", Object::Name("Helvetica".into()));
    let font_id = source.add_object(Object::Dictionary(font)).unwrap();

    let mut pages = Vec::new();
    for _ in 0..2 {
        let page = source.add_page().unwrap();
        let resources_id = source.make_page_resources_indirect(page).unwrap();
        let resources = source
            .object_mut(resources_id)
            .unwrap()
            .as_dict_mut()
            .unwrap();
        let mut fonts = Dictionary::new();
        fonts.set("F1", Object::Reference(font_id));
        resources.set("Font", Object::Dictionary(fonts));
        pages.push(page);
    }

    source.copy_pages_to(1, 1, &mut target).unwrap();
    let before = target.object_count();
    source.copy_pages_to(2, 2, &mut target).unwrap();
    let added = target.object_count() - before;

    // Second call adds the page and its resources, not another font copy.
    assert_eq!(added, 2);
}

#[test]
fn invalid_ranges_and_closed_documents_are_rejected() {
    let mut source = Document::new();
    source.add_page().unwrap();
    let mut target = Document::new();

    assert!(matches!(
        source.copy_pages_to(1, 3, &mut target),
        Err(PdfError::InvalidPageRange {
            from: 1,
            to: 3,
            count: 1
        })
    ));

    source.close().unwrap();
    assert!(matches!(
        source.copy_pages_to(1, 1, &mut target),
        Err(PdfError::DocumentClosed)
    ));
}

#[test]
fn closing_an_empty_document_fails() {
    let mut doc = Document::new();
    assert!(matches!(doc.close(), Err(PdfError::NoPages)));
    // Still usable after the failed close.
    doc.add_page().unwrap();
    doc.close().unwrap();
}

#[test]
fn pages_copy_lazily_from_a_source() {
    let mut backing = MemorySource::new();

    let mut properties = Dictionary::new();
    properties.set("MC0", Object::Reference(ObjectId::new(2, 0)));
    let mut resources = Dictionary::new();
    resources.set("Properties", Object::Dictionary(properties));
    let mut page = Dictionary::new();
    page.set("Type", Object::Name("Page".into()));
    page.set("Resources", Object::Dictionary(resources));
    backing.insert(1, Object::Dictionary(page));
    backing.add_page_object(ObjectId::new(1, 0));

    let mut ocg = Dictionary::new();
    ocg.set("Type", Object::Name("OCG".into()));
    ocg.set("Name", Object::String("Remote".into()));
    backing.insert(2, Object::Dictionary(ocg));

    let mut source = Document::with_source(Box::new(backing));
    assert_eq!(source.object_count(), 0);

    let mut target = Document::new();
    source.copy_pages_to(1, 1, &mut target).unwrap();

    // The copy forced materialization of exactly the page and its layer.
    assert_eq!(source.object_count(), 2);
    assert_eq!(layer_names(&mut target), vec!["Remote"]);
}

#[test]
fn fresh_allocations_do_not_shadow_source_objects() {
    let mut backing = MemorySource::new();

    let mut ocg = Dictionary::new();
    ocg.set("Type", Object::Name("OCG".into()));
    ocg.set("Name", Object::String("Lazy".into()));
    backing.insert(1, Object::Dictionary(ocg.clone()));

    let mut properties = Dictionary::new();
    properties.set("MC0", Object::Reference(ObjectId::new(1, 0)));
    let mut resources = Dictionary::new();
    resources.set("Properties", Object::Dictionary(properties));
    let mut page = Dictionary::new();
    page.set("Type", Object::Name("Page".into()));
    page.set("Resources", Object::Dictionary(resources));
    backing.insert(2, Object::Dictionary(page));
    backing.add_page_object(ObjectId::new(2, 0));

    let mut source = Document::with_source(Box::new(backing));

    // Adding before anything materializes must not reuse a source number.
    let added = source
        .add_object(Object::String("fresh".into()))
        .unwrap();
    assert!(added.number() > 2);
    assert_eq!(
        source.object(ObjectId::new(1, 0)).unwrap(),
        &Object::Dictionary(ocg)
    );

    // The un-shadowed layer survives a copy.
    let mut target = Document::new();
    source.copy_pages_to(1, 1, &mut target).unwrap();
    assert_eq!(layer_names(&mut target), vec!["Lazy"]);
}

#[test]
fn closing_writes_a_complete_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.pdf");

    let writer = PdfWriter::new(&path).unwrap();
    let mut doc = Document::with_writer(Box::new(writer));
    doc.document_info_mut().unwrap().title = Some("Copied".into());
    doc.add_page().unwrap();
    doc.close().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.starts_with("%PDF-1.7"));
    assert!(text.contains("/Type /Catalog"));
    assert!(text.contains("(Copied)"));
    assert!(text.contains("/Info"));
    assert!(text.trim_end().ends_with("%%EOF"));
}

struct RecordingSink {
    written: Rc<RefCell<Vec<u32>>>,
}

impl ObjectSink for RecordingSink {
    fn write_object(&mut self, id: ObjectId, _object: &Object) -> Result<()> {
        self.written.borrow_mut().push(id.number());
        Ok(())
    }

    fn finish(&mut self, _root: Option<ObjectId>, _info: Option<ObjectId>) -> Result<()> {
        Ok(())
    }
}

#[test]
fn objects_are_flushed_in_ascending_address_order() {
    let written = Rc::new(RefCell::new(Vec::new()));
    let sink = RecordingSink {
        written: Rc::clone(&written),
    };

    let mut doc = Document::with_writer(Box::new(sink));
    for _ in 0..3 {
        page_with_layer(&mut doc, "Order");
    }
    doc.close().unwrap();

    let written = written.borrow();
    assert!(!written.is_empty());
    let mut sorted = written.clone();
    sorted.sort_unstable();
    assert_eq!(*written, sorted);

    // Every address written exactly once.
    let mut deduped = sorted.clone();
    deduped.dedup();
    assert_eq!(sorted, deduped);
}
