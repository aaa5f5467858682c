//! Per-document attribute storage.
//!
//! [`Attributes`] owns the raw values of one document. Declared fields are
//! cast on the way in and on the way out, undeclared names are served straight
//! from the raw map when dynamic fields are allowed, and every tracked write
//! records an `(old, new)` pair for the persistence layer.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{DocmapError, Result};
use crate::field::ID_FIELD;
use crate::identity::Identity;
use crate::schema::EntityType;
use crate::value::{RawDocument, Value};

/// Relation-valued entries of a bulk assignment, resolved once the document
/// has an identity.
#[derive(Debug, Clone, PartialEq)]
pub enum Pending {
    Relation { name: String, value: Value },
    Nested { name: String, value: Value },
}

pub type Changes = BTreeMap<String, (Value, Value)>;

#[derive(Debug, Clone)]
pub struct Attributes {
    entity_type: Arc<EntityType>,
    raw: RawDocument,
    changes: Changes,
    accessed: RefCell<BTreeSet<String>>,
    dynamic: bool,
}

impl Attributes {
    pub fn new(entity_type: Arc<EntityType>, dynamic: bool) -> Self {
        Self::from_raw(entity_type, RawDocument::new(), dynamic)
    }
    pub fn from_raw(entity_type: Arc<EntityType>, raw: RawDocument, dynamic: bool) -> Self {
        Self {
            entity_type,
            raw,
            changes: Changes::new(),
            accessed: RefCell::new(BTreeSet::new()),
            dynamic,
        }
    }
    /// Fills in declared defaults for missing attributes without recording
    /// changes.
    pub fn apply_defaults(&mut self) -> Result<()> {
        let mut defaults = Vec::new();
        for field in self.entity_type.fields().iter() {
            if self.raw.contains_key(field.name()) {
                continue;
            }
            if let Some(value) = field.default_value()? {
                defaults.push((field.name().to_string(), value));
            }
        }
        self.raw.extend(defaults);
        Ok(())
    }
    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }
    pub fn identity(&self) -> Option<Identity> {
        self.raw.get(ID_FIELD).and_then(Value::as_identity)
    }

    fn undeclared(&self, name: &str) -> DocmapError {
        DocmapError::UndeclaredAttribute {
            entity_type: self.entity_type.name().to_string(),
            attribute: name.to_string(),
        }
    }

    pub fn read(&self, name: &str) -> Result<Value> {
        let raw = self.raw.get(name).cloned().unwrap_or_default();
        let value = match self.entity_type.fields().get(name) {
            Some(field) => field.cast(raw)?,
            None if self.dynamic || self.entity_type.is_relation(name) => raw,
            None => return Err(self.undeclared(name)),
        };
        self.accessed.borrow_mut().insert(name.to_string());
        Ok(value)
    }
    /// The stored value, uncast and unguarded.
    pub fn read_raw(&self, name: &str) -> Option<&Value> {
        self.raw.get(name)
    }
    pub fn write(&mut self, name: &str, value: Value) -> Result<Value> {
        if !self.dynamic && !self.entity_type.fields().contains(name) {
            return Err(self.undeclared(name));
        }
        self.write_internal(name, value, true)
    }
    /// Writes without the dynamic-field guard. Used for foreign keys and
    /// inline embedded documents, which the mapper itself maintains.
    pub fn write_internal(&mut self, name: &str, value: Value, track: bool) -> Result<Value> {
        let value = match self.entity_type.fields().get(name) {
            Some(field) => field.cast(value)?,
            None => value,
        };
        let old = self.raw.insert(name.to_string(), value.clone()).unwrap_or_default();
        if track {
            self.track(name, old, value.clone());
        }
        Ok(value)
    }
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let old = self.raw.remove(name)?;
        self.track(name, old.clone(), Value::Null);
        Some(old)
    }

    fn track(&mut self, name: &str, old: Value, new: Value) {
        match self.changes.get_mut(name) {
            Some((original, _)) if *original == new => {
                self.changes.remove(name);
            }
            Some((_, current)) => *current = new,
            None if old != new => {
                self.changes.insert(name.to_string(), (old, new));
            }
            None => {}
        }
    }

    /// Bulk assignment. Every entry is validated and cast before anything is
    /// written, so a failing entry leaves the attributes untouched. Relation
    /// entries are handed back instead of written.
    pub fn process(&mut self, attributes: RawDocument, allow_dynamic: bool) -> Result<Vec<Pending>> {
        let mut pending = Vec::new();
        let mut staged = Vec::new();
        for (name, value) in attributes {
            if self.entity_type.is_relation(&name) {
                pending.push(Pending::Relation { name, value });
            } else if let Some(relation) = self.entity_type.nested_relation(&name) {
                pending.push(Pending::Nested {
                    name: relation.to_string(),
                    value,
                });
            } else if let Some(field) = self.entity_type.fields().get(&name) {
                staged.push((name, field.cast(value)?));
            } else if allow_dynamic {
                staged.push((name, value));
            } else {
                return Err(DocmapError::UnknownAttribute {
                    entity_type: self.entity_type.name().to_string(),
                    attribute: name,
                });
            }
        }
        for (name, value) in staged {
            self.write_internal(&name, value, true)?;
        }
        Ok(pending)
    }

    pub fn changes(&self) -> &Changes {
        &self.changes
    }
    pub fn changed(&self) -> bool {
        !self.changes.is_empty()
    }
    pub fn is_changed(&self, name: &str) -> bool {
        self.changes.contains_key(name)
    }
    /// Hands over the recorded changes, typically after a successful save.
    pub fn move_changes(&mut self) -> Changes {
        std::mem::take(&mut self.changes)
    }
    pub fn accessed(&self) -> BTreeSet<String> {
        self.accessed.borrow().clone()
    }
    pub fn raw(&self) -> &RawDocument {
        &self.raw
    }
}
