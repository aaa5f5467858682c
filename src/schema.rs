//! Entity type declarations.
//!
//! An [`EntityType`] is built up front (fields, relations, nested attribute
//! options) and then handed to a [`Schema`], which keeps it behind an `Arc` so
//! every document of that type shares the same declarations.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use convert_case::{Case, Casing};
use tracing::debug;

use crate::datatype::FieldType;
use crate::error::{DocmapError, Result};
use crate::field::{Field, FieldRegistry};
use crate::identity::IdentityHasher;
use crate::relations::metadata::{
    NestedOptions, RelationMacro, RelationMetadata, RelationOptions, pluralize,
};
use crate::value::Value;

pub const NESTED_SUFFIX: &str = "_attributes";

// ------------- EntityType -------------
#[derive(Debug, Clone)]
pub struct EntityType {
    name: String,
    collection: String,
    fields: FieldRegistry,
    relations: HashMap<String, Arc<RelationMetadata>, IdentityHasher>,
    relation_order: Vec<String>,
    nested: HashMap<String, NestedOptions, IdentityHasher>,
}

impl EntityType {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            collection: pluralize(&name.to_case(Case::Snake)),
            fields: FieldRegistry::new(),
            relations: HashMap::default(),
            relation_order: Vec::new(),
            nested: HashMap::default(),
        }
    }
    pub fn with_collection(mut self, collection: &str) -> Self {
        self.collection = collection.to_string();
        self
    }
    pub fn add_field(&mut self, field: Field) -> &mut Self {
        self.fields.keep(field);
        self
    }
    /// Declares a relation. An unrecognized macro fails here and leaves the
    /// type exactly as it was.
    pub fn add_relation(
        &mut self,
        name: &str,
        macro_name: &str,
        options: RelationOptions,
    ) -> Result<&mut Self> {
        let metadata = RelationMetadata::new(&self.name, name, macro_name, options)?;
        if let Some(foreign_key) = metadata.foreign_key().filter(|_| metadata.stores_foreign_key()) {
            let field = match metadata.relation_macro() {
                RelationMacro::ReferencesAndReferencedInMany => {
                    Field::new(foreign_key, FieldType::Array).with_default(Vec::<Value>::new())
                }
                _ => Field::new(foreign_key, FieldType::Identity),
            };
            self.fields.keep(field);
        }
        debug!(entity_type = %self.name, relation = %metadata, "relation declared");
        if !self.relations.contains_key(name) {
            self.relation_order.push(name.to_string());
        }
        self.relations.insert(name.to_string(), Arc::new(metadata));
        Ok(self)
    }
    pub fn accepts_nested_attributes_for(
        &mut self,
        name: &str,
        options: NestedOptions,
    ) -> Result<&mut Self> {
        if !self.relations.contains_key(name) {
            return Err(DocmapError::UnknownRelation {
                entity_type: self.name.clone(),
                relation: name.to_string(),
            });
        }
        self.nested.insert(name.to_string(), options);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn collection(&self) -> &str {
        &self.collection
    }
    pub fn fields(&self) -> &FieldRegistry {
        &self.fields
    }
    pub fn relation(&self, name: &str) -> Option<Arc<RelationMetadata>> {
        self.relations.get(name).map(Arc::clone)
    }
    pub fn is_relation(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }
    pub fn relations(&self) -> impl Iterator<Item = &Arc<RelationMetadata>> {
        self.relation_order
            .iter()
            .filter_map(|name| self.relations.get(name))
    }
    pub fn nested_options(&self, name: &str) -> Option<NestedOptions> {
        self.nested.get(name).copied()
    }
    /// The relation a `<relation>_attributes` key assigns to, when the type
    /// accepts nested attributes for it.
    pub fn nested_relation(&self, key: &str) -> Option<&str> {
        let name = key.strip_suffix(NESTED_SUFFIX)?;
        self.nested.get_key_value(name).map(|(name, _)| name.as_str())
    }
}

// ------------- Schema -------------
#[derive(Debug, Default)]
pub struct Schema {
    kept: HashMap<String, Arc<EntityType>, IdentityHasher>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn keep(&mut self, entity_type: EntityType) -> (Arc<EntityType>, bool) {
        match self.kept.entry(entity_type.name().to_string()) {
            Entry::Vacant(e) => (Arc::clone(e.insert(Arc::new(entity_type))), false),
            Entry::Occupied(e) => (Arc::clone(e.get()), true),
        }
    }
    pub fn get(&self, name: &str) -> Result<Arc<EntityType>> {
        self.kept
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| DocmapError::UnknownEntityType(name.to_string()))
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}

/// Generates a trait with a typed getter and setter per declared field and
/// implements it for [`crate::document::Document`]. The getter's name is the
/// field name.
///
/// ```
/// docmap::accessors! {
///     pub trait BookFields {
///         title / set_title: String,
///         pages / set_pages: i64,
///     }
/// }
/// ```
#[macro_export]
macro_rules! accessors {
    ( $vis:vis trait $name:ident { $( $getter:ident / $setter:ident : $ty:ty ),* $(,)? } ) => {
        $vis trait $name {
            $(
                fn $getter(&self) -> $crate::error::Result<::std::option::Option<$ty>>;
                fn $setter(&mut self, value: $ty) -> $crate::error::Result<()>;
            )*
        }
        impl $name for $crate::document::Document {
            $(
                fn $getter(&self) -> $crate::error::Result<::std::option::Option<$ty>> {
                    self.get::<$ty>(stringify!($getter))
                }
                fn $setter(&mut self, value: $ty) -> $crate::error::Result<()> {
                    self.set::<$ty>(stringify!($getter), value)
                }
            )*
        }
    };
}
