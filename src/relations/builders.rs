//! Turning raw relation input into kept documents.
//!
//! A [`Builder`] realizes the targets of one relation from whatever the base
//! holds: inline documents (embedded relations, no store access), attribute
//! maps (new documents), foreign keys (one lookup for the identities not kept
//! yet) or a selector (one query). A [`NestedBuilder`] applies a nested
//! attribute assignment through the relation's proxy.

use std::collections::BTreeMap;

use tracing::debug;

use crate::criteria::{Criteria, FindMode};
use crate::datatype::FieldType;
use crate::document::Document;
use crate::error::{DocmapError, Result};
use crate::field::ID_FIELD;
use crate::identity::Identity;
use crate::relations::metadata::{DESTROY_FLAG, NestedOptions, RelationMacro, RelationMetadata};
use crate::schema::NESTED_SUFFIX;
use crate::session::Session;
use crate::value::{RawDocument, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum BuildSource {
    /// Documents stored inline in the base.
    Inline(Value),
    /// Attribute maps for new documents.
    Attributes(Value),
    ForeignKey(Value),
    Query(Criteria),
}

impl BuildSource {
    /// What the base document currently holds for `metadata`.
    pub fn from_base(metadata: &RelationMetadata, base: &Document) -> BuildSource {
        let held = |name: &str| base.read_raw(name).cloned().unwrap_or_default();
        match metadata.relation_macro() {
            RelationMacro::EmbedsOne | RelationMacro::EmbedsMany => BuildSource::Inline(held(metadata.name())),
            RelationMacro::ReferencesOne | RelationMacro::ReferencesAndReferencedInMany => {
                BuildSource::ForeignKey(metadata.foreign_key().map(held).unwrap_or_default())
            }
            RelationMacro::ReferencesMany => match metadata.criteria(base) {
                Some(criteria) => BuildSource::Query(criteria),
                None => BuildSource::ForeignKey(Value::Null),
            },
        }
    }
}

pub struct Builder<'a> {
    metadata: &'a RelationMetadata,
    source: BuildSource,
}

impl<'a> Builder<'a> {
    pub fn new(metadata: &'a RelationMetadata, source: BuildSource) -> Self {
        Self { metadata, source }
    }

    pub fn build(self, session: &mut Session, base: Identity) -> Result<Vec<Identity>> {
        let Builder { metadata, source } = self;
        let class_name = metadata.class_name();
        let targets = match source {
            BuildSource::Inline(value) => {
                let entity_type = session.entity_type(class_name)?;
                let persisted = session.document(base)?.is_persisted();
                let mut documents = documents_of(metadata.name(), value)?;
                if metadata.relation_macro() == RelationMacro::EmbedsOne {
                    documents.truncate(1);
                }
                documents
                    .into_iter()
                    .map(|raw| session.instantiate_inline(&entity_type, raw, persisted))
                    .collect::<Result<Vec<_>>>()?
            }
            BuildSource::Attributes(value) => documents_of(metadata.name(), value)?
                .into_iter()
                .map(|raw| session.instantiate(class_name, raw))
                .collect::<Result<Vec<_>>>()?,
            BuildSource::ForeignKey(value) => {
                let identities = value.identities();
                session.load_missing(class_name, &identities)?;
                identities
                    .into_iter()
                    .filter(|identity| session.keeper.contains(*identity))
                    .collect()
            }
            BuildSource::Query(criteria) => query(metadata, session, base, criteria)?,
        };
        debug!(relation = %metadata, %base, targets = targets.len(), "relation built");
        Ok(targets)
    }
}

// The store knows what was saved; the keeper knows what was bound since.
// In-memory foreign keys win.
fn query(
    metadata: &RelationMetadata,
    session: &mut Session,
    base: Identity,
    criteria: Criteria,
) -> Result<Vec<Identity>> {
    let class_name = metadata.class_name();
    let mut targets = if session.document(base)?.is_new_record() {
        Vec::new()
    } else {
        session.where_(class_name, criteria, FindMode::All)?
    };
    let Some(foreign_key) = metadata.foreign_key() else {
        return Ok(targets);
    };
    let points_at_base =
        |document: &Document| document.foreign_key_identities(foreign_key).contains(&base);
    targets.retain(|target| session.keeper.get(*target).is_some_and(points_at_base));
    let mut bound: Vec<Identity> = session
        .keeper
        .iter()
        .filter(|&(identity, document)| {
            document.entity_type().name() == class_name
                && points_at_base(document)
                && !targets.contains(identity)
        })
        .map(|(identity, _)| *identity)
        .collect();
    bound.sort();
    targets.extend(bound);
    Ok(targets)
}

fn documents_of(relation: &str, value: Value) -> Result<Vec<RawDocument>> {
    let invalid = |value: &Value| DocmapError::InvalidType {
        field: relation.to_string(),
        value: value.to_string(),
        target: "Document",
    };
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Document(document) => Ok(vec![document]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Document(document) => Ok(document),
                other => Err(invalid(&other)),
            })
            .collect(),
        other => Err(invalid(&other)),
    }
}

// ------------- Nested attributes -------------
pub struct NestedBuilder<'a> {
    metadata: &'a RelationMetadata,
    attributes: Value,
    options: NestedOptions,
}

impl<'a> NestedBuilder<'a> {
    pub fn new(metadata: &'a RelationMetadata, attributes: Value, options: NestedOptions) -> Self {
        Self {
            metadata,
            attributes,
            options,
        }
    }

    /// Accepts a list of attribute maps, a map keyed by position ("0", "1",
    /// ...) or a single map.
    fn entries(&self) -> Result<Vec<RawDocument>> {
        let field = format!("{}{}", self.metadata.name(), NESTED_SUFFIX);
        match &self.attributes {
            Value::Document(map) if !map.is_empty() && map.keys().all(|k| k.parse::<usize>().is_ok()) => {
                let ordered: BTreeMap<usize, Value> = map
                    .iter()
                    .filter_map(|(k, v)| k.parse::<usize>().ok().map(|k| (k, v.clone())))
                    .collect();
                documents_of(&field, Value::Array(ordered.into_values().collect()))
            }
            other => documents_of(&field, other.clone()),
        }
    }

    pub fn build(self, session: &mut Session, base: Identity) -> Result<()> {
        let entries = self.entries()?;
        if let Some(limit) = self.options.limit {
            if entries.len() > limit {
                return Err(DocmapError::TooManyNestedRecords {
                    relation: self.metadata.name().to_string(),
                    limit,
                });
            }
        }
        for entry in entries {
            if self.options.reject_if.is_some_and(|rule| rule.rejects(&entry)) {
                debug!(relation = %self.metadata, "nested attributes rejected");
                continue;
            }
            if self.metadata.is_many() {
                self.apply_many(session, base, entry)?;
            } else {
                self.apply_one(session, base, entry)?;
            }
        }
        Ok(())
    }

    fn apply_many(&self, session: &mut Session, base: Identity, mut entry: RawDocument) -> Result<()> {
        let destroy = take_destroy_flag(&mut entry);
        let name = self.metadata.name();
        match take_identity(&mut entry) {
            Some(identity) => {
                if !session.many(base, name)?.target()?.contains(&identity) {
                    return Err(self.not_found(identity));
                }
                if destroy && self.options.allow_destroy {
                    session.many(base, name)?.delete(identity)?;
                    self.discard(session, identity)
                } else {
                    session.assign_attributes(identity, entry)
                }
            }
            None if destroy || self.options.update_only => Ok(()),
            None => session.many(base, name)?.build(entry).map(|_| ()),
        }
    }

    fn apply_one(&self, session: &mut Session, base: Identity, mut entry: RawDocument) -> Result<()> {
        let destroy = take_destroy_flag(&mut entry);
        let name = self.metadata.name();
        let current = session.one(base, name)?.target()?;
        match (take_identity(&mut entry), current) {
            (Some(identity), Some(current)) if identity == current => {
                if destroy && self.options.allow_destroy {
                    session.one(base, name)?.nullify()?;
                    self.discard(session, identity)
                } else {
                    session.assign_attributes(identity, entry)
                }
            }
            (Some(identity), _) => Err(self.not_found(identity)),
            (None, Some(current)) if self.options.update_only => session.assign_attributes(current, entry),
            (None, _) if destroy || self.options.update_only => Ok(()),
            (None, _) => session.one(base, name)?.build(entry).map(|_| ()),
        }
    }

    // Embedded children disappear with the parent's next save; referenced
    // ones are destroyed in the store.
    fn discard(&self, session: &mut Session, identity: Identity) -> Result<()> {
        if self.metadata.is_embedded() {
            session.evict(identity);
            Ok(())
        } else {
            session.destroy(identity)
        }
    }

    fn not_found(&self, identity: Identity) -> DocmapError {
        DocmapError::NotFound {
            entity_type: self.metadata.class_name().to_string(),
            identities: vec![identity],
        }
    }
}

fn take_destroy_flag(entry: &mut RawDocument) -> bool {
    match entry.remove(DESTROY_FLAG) {
        Some(Value::Boolean(flag)) => flag,
        Some(Value::Integer(flag)) => flag == 1,
        Some(Value::String(flag)) => matches!(flag.trim(), "1" | "true"),
        _ => false,
    }
}

fn take_identity(entry: &mut RawDocument) -> Option<Identity> {
    entry
        .remove(ID_FIELD)
        .and_then(|value| FieldType::Identity.cast(value).ok())
        .and_then(|value| value.as_identity())
}
