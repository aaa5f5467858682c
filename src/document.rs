//! Documents and the identity map that owns them.
//!
//! A [`Document`] is one entity instance: its attributes plus the identities of
//! whatever relations have been realized on it. Documents never point at each
//! other directly; the [`DocumentKeeper`] owns every document of a session and
//! relations refer to their targets by [`Identity`].

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use crate::attributes::{Attributes, Changes, Pending};
use crate::datatype::DataType;
use crate::error::{DocmapError, Result};
use crate::field::ID_FIELD;
use crate::identity::{Identity, IdentityHasher};
use crate::relations::metadata::RelationMacro;
use crate::schema::EntityType;
use crate::value::{RawDocument, Value};

/// Where an embedded document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parent {
    pub identity: Identity,
    pub relation: String,
}

#[derive(Debug, Clone)]
pub struct Document {
    attributes: Attributes,
    new_record: bool,
    destroyed: bool,
    relations: HashMap<String, Vec<Identity>, IdentityHasher>,
    embedded_in: Option<Parent>,
}

impl Document {
    /// A fresh, unsaved document with its defaults applied.
    pub fn new(entity_type: Arc<EntityType>, dynamic: bool) -> Result<Self> {
        let mut attributes = Attributes::new(entity_type, dynamic);
        attributes.apply_defaults()?;
        Ok(Self::with_attributes(attributes, true))
    }
    /// A document read back from a store.
    pub fn instantiate(entity_type: Arc<EntityType>, raw: RawDocument, dynamic: bool) -> Result<Self> {
        let mut attributes = Attributes::from_raw(entity_type, raw, dynamic);
        attributes.apply_defaults()?;
        Ok(Self::with_attributes(attributes, false))
    }
    fn with_attributes(attributes: Attributes, new_record: bool) -> Self {
        Self {
            attributes,
            new_record,
            destroyed: false,
            relations: HashMap::default(),
            embedded_in: None,
        }
    }

    pub fn entity_type(&self) -> &Arc<EntityType> {
        self.attributes.entity_type()
    }
    pub fn identity(&self) -> Option<Identity> {
        self.attributes.identity()
    }
    pub fn set_identity(&mut self, identity: Identity) -> Result<()> {
        self.attributes
            .write_internal(ID_FIELD, Value::Identity(identity), false)
            .map(|_| ())
    }
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn read(&self, name: &str) -> Result<Value> {
        self.attributes.read(name)
    }
    pub fn read_raw(&self, name: &str) -> Option<&Value> {
        self.attributes.read_raw(name)
    }
    pub fn write<V: Into<Value>>(&mut self, name: &str, value: V) -> Result<Value> {
        self.attributes.write(name, value.into())
    }
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }
    pub(crate) fn write_internal(&mut self, name: &str, value: Value, track: bool) -> Result<Value> {
        self.attributes.write_internal(name, value, track)
    }
    pub fn process(&mut self, attributes: RawDocument, allow_dynamic: bool) -> Result<Vec<Pending>> {
        self.attributes.process(attributes, allow_dynamic)
    }

    /// Typed read. The value is cast to `T`'s field type first, so dynamic
    /// attributes can be read typed as well.
    pub fn get<T: DataType>(&self, name: &str) -> Result<Option<T>> {
        let value = self.read(name)?;
        let value = T::FIELD_TYPE
            .cast(value)
            .map_err(|value| DocmapError::InvalidType {
                field: name.to_string(),
                value: value.to_string(),
                target: T::FIELD_TYPE.name(),
            })?;
        Ok(T::from_value(&value))
    }
    pub fn set<T: DataType>(&mut self, name: &str, value: T) -> Result<()> {
        self.write(name, value.into_value()).map(|_| ())
    }

    pub fn changes(&self) -> &Changes {
        self.attributes.changes()
    }
    pub fn changed(&self) -> bool {
        self.attributes.changed()
    }

    // ------------- foreign keys -------------
    pub fn foreign_key_identities(&self, foreign_key: &str) -> Vec<Identity> {
        self.read_raw(foreign_key)
            .map(Value::identities)
            .unwrap_or_default()
    }
    pub fn set_foreign_key(&mut self, foreign_key: &str, value: Value, track: bool) -> Result<()> {
        self.write_internal(foreign_key, value, track).map(|_| ())
    }
    /// Adds `identity` to an array foreign key unless it is already there.
    pub fn push_foreign_key(&mut self, foreign_key: &str, identity: Identity, track: bool) -> Result<bool> {
        let mut identities = self.foreign_key_identities(foreign_key);
        if identities.contains(&identity) {
            return Ok(false);
        }
        identities.push(identity);
        self.set_foreign_key(foreign_key, identity_array(identities), track)?;
        Ok(true)
    }
    pub fn pull_foreign_key(&mut self, foreign_key: &str, identity: Identity, track: bool) -> Result<bool> {
        let mut identities = self.foreign_key_identities(foreign_key);
        let before = identities.len();
        identities.retain(|i| *i != identity);
        if identities.len() == before {
            return Ok(false);
        }
        self.set_foreign_key(foreign_key, identity_array(identities), track)?;
        Ok(true)
    }

    // ------------- lifecycle -------------
    pub fn is_new_record(&self) -> bool {
        self.new_record
    }
    pub fn is_persisted(&self) -> bool {
        !self.new_record && !self.destroyed
    }
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
    pub fn mark_persisted(&mut self) -> Changes {
        self.new_record = false;
        self.attributes.move_changes()
    }
    pub(crate) fn mark_new_record(&mut self) {
        self.new_record = true;
    }
    pub fn mark_destroyed(&mut self) {
        self.destroyed = true;
    }

    // ------------- realized relations -------------
    pub fn realized(&self, relation: &str) -> Option<&Vec<Identity>> {
        self.relations.get(relation)
    }
    pub fn realized_mut(&mut self, relation: &str) -> Option<&mut Vec<Identity>> {
        self.relations.get_mut(relation)
    }
    pub fn set_realized(&mut self, relation: &str, targets: Vec<Identity>) {
        self.relations.insert(relation.to_string(), targets);
    }
    /// Forgets a realized relation so that the next access builds it again.
    pub fn reset_relation(&mut self, relation: &str) -> Option<Vec<Identity>> {
        self.relations.remove(relation)
    }
    pub fn reset_relations(&mut self) {
        self.relations.clear();
    }
    pub fn embedded_in(&self) -> Option<&Parent> {
        self.embedded_in.as_ref()
    }
    pub fn set_embedded_in(&mut self, parent: Option<Parent>) {
        self.embedded_in = parent;
    }
}

pub fn identity_array(identities: Vec<Identity>) -> Value {
    Value::Array(identities.into_iter().map(Value::Identity).collect())
}

// ------------- DocumentKeeper -------------
// The identity map: at most one document per identity.
#[derive(Debug, Default)]
pub struct DocumentKeeper {
    kept: HashMap<Identity, Document, IdentityHasher>,
}

impl DocumentKeeper {
    pub fn new() -> Self {
        Self::default()
    }
    /// Keeps the document unless one with the same identity is already kept,
    /// in which case the kept one wins.
    pub fn keep(&mut self, document: Document) -> Result<(Identity, bool)> {
        let identity = document
            .identity()
            .ok_or_else(|| DocmapError::Invariant(String::from("cannot keep a document without identity")))?;
        match self.kept.entry(identity) {
            Entry::Vacant(e) => {
                e.insert(document);
                Ok((identity, false))
            }
            Entry::Occupied(_) => Ok((identity, true)),
        }
    }
    pub fn get(&self, identity: Identity) -> Option<&Document> {
        self.kept.get(&identity)
    }
    pub fn get_mut(&mut self, identity: Identity) -> Option<&mut Document> {
        self.kept.get_mut(&identity)
    }
    pub fn require(&self, identity: Identity) -> Result<&Document> {
        self.get(identity).ok_or(DocmapError::Detached(identity))
    }
    pub fn require_mut(&mut self, identity: Identity) -> Result<&mut Document> {
        self.get_mut(identity).ok_or(DocmapError::Detached(identity))
    }
    pub fn remove(&mut self, identity: Identity) -> Option<Document> {
        let removed = self.kept.remove(&identity)?;
        for document in self.kept.values_mut() {
            for targets in document.relations.values_mut() {
                targets.retain(|target| *target != identity);
            }
        }
        Some(removed)
    }
    pub fn contains(&self, identity: Identity) -> bool {
        self.kept.contains_key(&identity)
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&Identity, &Document)> {
        self.kept.iter()
    }

    /// The stored shape of a document. Realized embedded relations are
    /// authoritative and replace whatever inline value was read earlier.
    pub fn as_document(&self, identity: Identity) -> Result<RawDocument> {
        let document = self.require(identity)?;
        let mut raw = document.attributes.raw().clone();
        for metadata in document.entity_type().relations() {
            if !metadata.is_embedded() {
                continue;
            }
            let Some(children) = document.realized(metadata.name()) else {
                continue;
            };
            let value = match metadata.relation_macro() {
                RelationMacro::EmbedsOne => match children.first() {
                    Some(child) => Value::Document(self.as_document(*child)?),
                    None => Value::Null,
                },
                _ => Value::Array(
                    children
                        .iter()
                        .map(|child| self.as_document(*child).map(Value::Document))
                        .collect::<Result<_>>()?,
                ),
            };
            raw.insert(metadata.name().to_string(), value);
        }
        Ok(raw)
    }
}
