use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

use crate::datatype::FieldType;
use crate::error::{DocmapError, Result};
use crate::identity::IdentityHasher;
use crate::value::Value;

pub const ID_FIELD: &str = "_id";

// ------------- Field -------------
#[derive(Debug, Clone)]
pub enum FieldDefault {
    Literal(Value),
    Computed(fn() -> Value),
}

impl FieldDefault {
    pub fn value(&self) -> Value {
        match self {
            FieldDefault::Literal(value) => value.clone(),
            FieldDefault::Computed(compute) => compute(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    field_type: FieldType,
    default: Option<FieldDefault>,
}

impl Field {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            default: None,
        }
    }
    pub fn with_default<V: Into<Value>>(mut self, value: V) -> Self {
        self.default = Some(FieldDefault::Literal(value.into()));
        self
    }
    pub fn with_computed_default(mut self, compute: fn() -> Value) -> Self {
        self.default = Some(FieldDefault::Computed(compute));
        self
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }
    pub fn default(&self) -> Option<&FieldDefault> {
        self.default.as_ref()
    }
    /// The default, already cast to the field type.
    pub fn default_value(&self) -> Result<Option<Value>> {
        self.default
            .as_ref()
            .map(|default| self.cast(default.value()))
            .transpose()
    }
    /// Applies the field's coercion. Reads and writes share the same rule,
    /// which keeps a stored document stable across load and save.
    pub fn cast(&self, value: Value) -> Result<Value> {
        self.field_type
            .cast(value)
            .map_err(|value| DocmapError::InvalidType {
                field: self.name.clone(),
                value: value.to_string(),
                target: self.field_type.name(),
            })
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}::<{}>", self.name, self.field_type)
    }
}

// ------------- FieldRegistry -------------
// Declared fields of one entity type, kept in declaration order.
#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    kept: HashMap<String, Arc<Field>, IdentityHasher>,
    order: Vec<String>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        let mut registry = Self::default();
        registry.keep(Field::new(ID_FIELD, FieldType::Identity));
        registry
    }
    // A redeclared field replaces the earlier declaration.
    pub fn keep(&mut self, field: Field) -> (Arc<Field>, bool) {
        let name = field.name().to_string();
        let field = Arc::new(field);
        let previously_kept = match self.kept.entry(name.clone()) {
            Entry::Vacant(e) => {
                e.insert(Arc::clone(&field));
                self.order.push(name);
                false
            }
            Entry::Occupied(mut e) => {
                e.insert(Arc::clone(&field));
                true
            }
        };
        (field, previously_kept)
    }
    pub fn get(&self, name: &str) -> Option<Arc<Field>> {
        self.kept.get(name).map(Arc::clone)
    }
    pub fn contains(&self, name: &str) -> bool {
        self.kept.contains_key(name)
    }
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Field>> {
        self.order.iter().filter_map(|name| self.kept.get(name))
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}
