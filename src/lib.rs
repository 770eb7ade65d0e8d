//! In-memory PDF document object model with lazy loading, one-way flushing,
//! and cross-document page copying.
//!
//! A [`Document`] owns a cross-reference table mapping object numbers to
//! indirect objects. Objects backed by an [`ObjectSource`] are materialized on
//! first access; flushing serializes objects to an [`ObjectSink`] and freezes
//! them, which is a one-way transition. Pages can be copied between documents
//! with their resources and optional-content layers, deduplicated per
//! (source, target) pair.
//!
//! Documents are single-owner values with no internal locking: cross-document
//! operations take `&mut` on both documents, so the borrow checker rules out
//! concurrent access to either side.
//!
//! # Example
//!
//! ```
//! use pdf_dom::{Dictionary, Document, Object};
//!
//! let mut source = Document::new();
//! let page = source.add_page()?;
//!
//! let mut layer = Dictionary::new();
//! layer.set("Type", Object::Name("OCG".into()));
//! layer.set("Name", Object::String("Watermark".into()));
//! let layer_id = source.add_object(Object::Dictionary(layer))?;
//! source.add_page_property(page, layer_id)?;
//!
//! let mut target = Document::new();
//! source.copy_pages_to(1, 1, &mut target)?;
//!
//! assert_eq!(target.page_count(), 1);
//! let layers = target.oc_properties(false)?.unwrap().layers();
//! assert_eq!(layers[0].name(), "Watermark");
//! # Ok::<(), pdf_dom::PdfError>(())
//! ```

mod copy;
pub mod document;
pub mod error;
pub mod layers;
pub mod objects;
pub mod reader;
pub mod writer;
pub mod xref;

pub use document::{Document, DocumentId, DocumentInfo, Page};
pub use error::{PdfError, Result};
pub use layers::{Layer, OcProperties};
pub use objects::{Dictionary, Object, ObjectId};
pub use reader::{MemorySource, ObjectSource};
pub use writer::{ObjectSink, PdfWriter};
pub use xref::{EntryState, XrefTable};

/// Library version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
