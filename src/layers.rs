use crate::error::{PdfError, Result};
use crate::objects::{Object, ObjectId};
use crate::xref::XrefTable;
use std::collections::HashMap;

/// One optional-content layer: a handle to exactly one underlying dictionary
/// object plus the display name it ended up with after conflict resolution.
#[derive(Debug, Clone)]
pub struct Layer {
    object: ObjectId,
    name: String,
}

impl Layer {
    pub fn object_id(&self) -> ObjectId {
        self.object
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Catalog-held collection of optional-content layers.
///
/// Registration deduplicates by underlying object identity and disambiguates
/// name collisions between distinct objects by suffixing `_0`, `_1`, ... in
/// collision order; the first holder of a name keeps it unsuffixed.
pub struct OcProperties {
    /// The /OCProperties dictionary object carrying the /OCGs array.
    dictionary: ObjectId,
    layers: Vec<Layer>,
    by_identity: HashMap<u32, usize>,
    collisions: HashMap<String, u32>,
    renamed: u32,
}

impl OcProperties {
    pub(crate) fn new(dictionary: ObjectId) -> Self {
        Self {
            dictionary,
            layers: Vec::new(),
            by_identity: HashMap::new(),
            collisions: HashMap::new(),
            renamed: 0,
        }
    }

    /// Adopts an /OCProperties dictionary that already exists in the
    /// registry, loading its /OCGs array so identity dedup and name-collision
    /// detection see the pre-existing layers.
    pub(crate) fn from_existing(xref: &mut XrefTable, dictionary: ObjectId) -> Result<Self> {
        let ocgs: Vec<ObjectId> = xref
            .resolve(dictionary)?
            .as_dict()
            .and_then(|dict| dict.get("OCGs"))
            .and_then(Object::as_array)
            .map(|items| items.iter().filter_map(Object::as_reference).collect())
            .unwrap_or_default();

        let mut properties = Self::new(dictionary);
        for id in ocgs {
            if properties.by_identity.contains_key(&id.number()) {
                continue;
            }
            let name = xref
                .resolve(id)?
                .as_dict()
                .and_then(|dict| dict.get("Name"))
                .and_then(Object::as_string)
                .unwrap_or_default()
                .to_string();
            let index = properties.layers.len();
            properties.by_identity.insert(id.number(), index);
            properties.layers.push(Layer { object: id, name });
        }
        Ok(properties)
    }

    /// The registry address of the /OCProperties dictionary.
    pub fn object_id(&self) -> ObjectId {
        self.dictionary
    }

    /// Ordered read-only view of the registered layers.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Number of automatic renames performed so far.
    pub fn conflict_count(&self) -> u32 {
        self.renamed
    }

    pub(crate) fn register(&mut self, xref: &mut XrefTable, id: ObjectId) -> Result<&Layer> {
        if let Some(&index) = self.by_identity.get(&id.number()) {
            // Same underlying object: the existing layer, untouched.
            return Ok(&self.layers[index]);
        }

        let base = xref
            .resolve(id)?
            .as_dict()
            .and_then(|dict| dict.get("Name"))
            .and_then(Object::as_string)
            .unwrap_or_default()
            .to_string();

        let name = if self.layers.iter().any(|layer| layer.name == base) {
            let mut suffix = self.collisions.get(&base).copied().unwrap_or(0);
            let renamed = loop {
                let candidate = format!("{base}_{suffix}");
                suffix += 1;
                if self.layers.iter().all(|layer| layer.name != candidate) {
                    break candidate;
                }
            };
            // Rewrite the dictionary before touching the bookkeeping: a
            // flushed layer cannot be renamed and must leave the collision
            // state and conflict count unchanged.
            let object = xref.resolve_mut(id)?;
            if let Some(dict) = object.as_dict_mut() {
                dict.set("Name", Object::String(renamed.clone()));
            }
            self.collisions.insert(base.clone(), suffix);
            self.renamed += 1;
            tracing::warn!(
                original = %base,
                renamed_to = %renamed,
                "conflicting optional content group names, layer renamed"
            );
            renamed
        } else {
            base
        };

        {
            let object = xref.resolve_mut(self.dictionary)?;
            let dict = object
                .as_dict_mut()
                .ok_or(PdfError::CorruptReference(self.dictionary))?;
            match dict.get_mut("OCGs") {
                Some(Object::Array(ocgs)) => ocgs.push(Object::Reference(id)),
                _ => dict.set("OCGs", Object::Array(vec![Object::Reference(id)])),
            }
        }

        let index = self.layers.len();
        self.by_identity.insert(id.number(), index);
        self.layers.push(Layer { object: id, name });
        Ok(&self.layers[index])
    }
}
