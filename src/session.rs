//! The session: schema, identity map and store wired together.
//!
//! Every document a session touches is kept in its [`DocumentKeeper`], so a
//! given identity maps to exactly one in-memory document per session. Relation
//! proxies are handed out by [`Session::relation`], [`Session::one`] and
//! [`Session::many`].

use std::sync::Arc;

use tracing::{debug, info};

use crate::attributes::Pending;
use crate::criteria::{Criteria, FindMode};
use crate::document::{Document, DocumentKeeper, Parent};
use crate::error::{DocmapError, Result};
use crate::field::ID_FIELD;
use crate::identity::Identity;
use crate::relations::bindings::BindingOptions;
use crate::relations::builders::BuildSource;
use crate::relations::metadata::RelationMetadata;
use crate::relations::proxy::{Many, One, Relation, RelationInput};
use crate::schema::{EntityType, Schema};
use crate::settings::{self, Settings};
use crate::store::Store;
use crate::value::{RawDocument, Value};

/// Store-side removal semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Delete,
    /// Runs the store's destroy hooks.
    Destroy,
}

pub struct Session {
    schema: Arc<Schema>,
    store: Box<dyn Store>,
    pub(crate) keeper: DocumentKeeper,
    settings: Settings,
}

impl Session {
    /// A session using the process-wide settings as they are right now.
    pub fn new(schema: Arc<Schema>, store: Box<dyn Store>) -> Self {
        Self::with_settings(schema, store, settings::current())
    }
    pub fn with_settings(schema: Arc<Schema>, store: Box<dyn Store>, settings: Settings) -> Self {
        debug!(entity_types = schema.len(), dynamic = settings.allow_dynamic_fields, "session opened");
        Self {
            schema,
            store,
            keeper: DocumentKeeper::new(),
            settings,
        }
    }
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
    pub fn keeper(&self) -> &DocumentKeeper {
        &self.keeper
    }
    pub fn entity_type(&self, name: &str) -> Result<Arc<EntityType>> {
        self.schema.get(name)
    }
    fn dynamic(&self) -> bool {
        self.settings.allow_dynamic_fields
    }

    // ------------- documents -------------
    pub fn document(&self, identity: Identity) -> Result<&Document> {
        self.keeper.require(identity)
    }
    pub fn document_mut(&mut self, identity: Identity) -> Result<&mut Document> {
        self.keeper.require_mut(identity)
    }
    /// Forgets every realized relation of the document. Relations are built
    /// again on their next access.
    pub fn reset(&mut self, identity: Identity) -> Result<()> {
        self.keeper.require_mut(identity)?.reset_relations();
        debug!(%identity, "relations reset");
        Ok(())
    }
    /// The document as it would be stored, embedded children included.
    pub fn as_document(&self, identity: Identity) -> Result<RawDocument> {
        self.keeper.as_document(identity)
    }

    /// Creates a new document from attributes. Plain attributes are applied
    /// first, the document gets its identity, and only then are relation and
    /// nested entries resolved.
    pub fn instantiate(&mut self, entity_type: &str, attributes: RawDocument) -> Result<Identity> {
        let entity_type = self.schema.get(entity_type)?;
        let mut document = Document::new(entity_type, self.dynamic())?;
        let pending = document.process(attributes, self.dynamic())?;
        self.ensure_identity(&mut document)?;
        let (identity, previously_kept) = self.keeper.keep(document)?;
        if previously_kept {
            return Err(DocmapError::Invariant(format!("document {identity} is already kept")));
        }
        debug!(entity_type = %self.document(identity)?.entity_type().name(), %identity, "instantiated");
        self.resolve_pending(identity, pending)?;
        Ok(identity)
    }
    pub fn assign_attributes(&mut self, identity: Identity, attributes: RawDocument) -> Result<()> {
        let dynamic = self.dynamic();
        let pending = self.keeper.require_mut(identity)?.process(attributes, dynamic)?;
        self.resolve_pending(identity, pending)
    }

    pub(crate) fn ensure_identity(&mut self, document: &mut Document) -> Result<Identity> {
        match document.identity() {
            Some(identity) => Ok(identity),
            None => {
                let identity = self.store.generate_identity()?;
                document.set_identity(identity)?;
                Ok(identity)
            }
        }
    }
    pub(crate) fn resolve_pending(&mut self, identity: Identity, pending: Vec<Pending>) -> Result<()> {
        for entry in pending {
            match entry {
                Pending::Relation { name, value } => {
                    let input = RelationInput::from_value(&name, value)?;
                    self.set_relation(identity, &name, input)?;
                }
                Pending::Nested { name, value } => self.assign_nested(identity, &name, value)?,
            }
        }
        Ok(())
    }

    // ------------- loading -------------
    pub(crate) fn instantiate_loaded(&mut self, entity_type: &Arc<EntityType>, raw: RawDocument) -> Result<Identity> {
        let identity = raw
            .get(ID_FIELD)
            .and_then(Value::as_identity)
            .ok_or_else(|| DocmapError::DataCorruption {
                message: format!("stored {} document without identity", entity_type.name()),
            })?;
        if !self.keeper.contains(identity) {
            let document = Document::instantiate(Arc::clone(entity_type), raw, self.dynamic())?;
            self.keeper.keep(document)?;
        }
        Ok(identity)
    }
    /// Keeps an embedded document read from its parent. Children without an
    /// identity get one.
    pub(crate) fn instantiate_inline(
        &mut self,
        entity_type: &Arc<EntityType>,
        raw: RawDocument,
        persisted: bool,
    ) -> Result<Identity> {
        if let Some(identity) = raw.get(ID_FIELD).and_then(Value::as_identity) {
            if self.keeper.contains(identity) {
                return Ok(identity);
            }
        }
        let mut document = Document::instantiate(Arc::clone(entity_type), raw, self.dynamic())?;
        if !persisted {
            document.mark_new_record();
        }
        let identity = self.ensure_identity(&mut document)?;
        self.keeper.keep(document)?;
        Ok(identity)
    }
    /// Reads the given identities not kept yet, in a single store call.
    pub(crate) fn load_missing(&mut self, entity_type: &str, identities: &[Identity]) -> Result<()> {
        let entity_type = self.schema.get(entity_type)?;
        let mut missing: Vec<Identity> = identities
            .iter()
            .copied()
            .filter(|identity| !self.keeper.contains(*identity))
            .collect();
        missing.sort();
        missing.dedup();
        if missing.is_empty() {
            return Ok(());
        }
        for raw in self.store.find_by_identity(entity_type.collection(), &missing)? {
            self.instantiate_loaded(&entity_type, raw)?;
        }
        Ok(())
    }
    /// The targets of a relation, built and bound on first access.
    pub(crate) fn load_relation(&mut self, base: Identity, metadata: &RelationMetadata) -> Result<Vec<Identity>> {
        let document = self.keeper.require(base)?;
        if let Some(targets) = document.realized(metadata.name()) {
            return Ok(targets.clone());
        }
        let source = BuildSource::from_base(metadata, document);
        let targets = metadata.builder(source).build(self, base)?;
        self.keeper
            .require_mut(base)?
            .set_realized(metadata.name(), targets.clone());
        metadata
            .binding(base, &targets)
            .bind(&mut self.keeper, BindingOptions::binding())?;
        Ok(targets)
    }

    // ------------- queries -------------
    pub fn find(&mut self, entity_type: &str, identity: Identity) -> Result<Identity> {
        let found = self.find_many(entity_type, &[identity])?;
        found.first().copied().ok_or_else(|| DocmapError::NotFound {
            entity_type: entity_type.to_string(),
            identities: vec![identity],
        })
    }
    /// All of the given identities, or `NotFound` naming the missing ones.
    pub fn find_many(&mut self, entity_type: &str, identities: &[Identity]) -> Result<Vec<Identity>> {
        self.load_missing(entity_type, identities)?;
        let missing: Vec<Identity> = identities
            .iter()
            .copied()
            .filter(|identity| {
                self.keeper
                    .get(*identity)
                    .is_none_or(|document| document.entity_type().name() != entity_type)
            })
            .collect();
        if !missing.is_empty() {
            return Err(DocmapError::NotFound {
                entity_type: entity_type.to_string(),
                identities: missing,
            });
        }
        Ok(identities.to_vec())
    }
    pub fn where_(&mut self, entity_type: &str, criteria: Criteria, mode: FindMode) -> Result<Vec<Identity>> {
        let entity_type = self.schema.get(entity_type)?;
        let raws = self
            .store
            .find_by_selector(entity_type.collection(), &criteria, mode)?;
        raws.into_iter()
            .map(|raw| self.instantiate_loaded(&entity_type, raw))
            .collect()
    }

    // ------------- persistence -------------
    fn root_of(&self, identity: Identity) -> Result<Identity> {
        let mut current = identity;
        while let Some(parent) = self.document(current)?.embedded_in() {
            current = parent.identity;
        }
        Ok(current)
    }
    /// Saves the document. An embedded document is saved through its root.
    pub fn save(&mut self, identity: Identity) -> Result<()> {
        let root = self.root_of(identity)?;
        let collection = self.document(root)?.entity_type().collection().to_string();
        let raw = self.keeper.as_document(root)?;
        self.store.persist(&collection, root, &raw)?;
        self.mark_persisted(root)?;
        info!(collection, identity = %root, "saved");
        Ok(())
    }
    fn mark_persisted(&mut self, identity: Identity) -> Result<()> {
        let document = self.keeper.require_mut(identity)?;
        document.mark_persisted();
        let children: Vec<Identity> = document
            .entity_type()
            .relations()
            .filter(|metadata| metadata.is_embedded())
            .filter_map(|metadata| document.realized(metadata.name()))
            .flatten()
            .copied()
            .collect();
        for child in children {
            self.mark_persisted(child)?;
        }
        Ok(())
    }
    pub fn delete(&mut self, identity: Identity) -> Result<()> {
        self.remove_document(identity, Removal::Delete)
    }
    /// Like `delete`, but the store runs its destroy hooks.
    pub fn destroy(&mut self, identity: Identity) -> Result<()> {
        self.remove_document(identity, Removal::Destroy)
    }
    fn remove_document(&mut self, identity: Identity, removal: Removal) -> Result<()> {
        let document = self.document(identity)?;
        if let Some(Parent { identity: parent, relation }) = document.embedded_in().cloned() {
            match self.relation(parent, &relation)? {
                Relation::One(mut one) => one.nullify()?,
                Relation::Many(mut many) => {
                    many.delete(identity)?;
                }
            }
            self.evict(identity);
            if self.document(parent)?.is_persisted() {
                self.save(parent)?;
            }
            return Ok(());
        }
        if document.is_persisted() {
            let entity_type = document.entity_type().name().to_string();
            self.remove_matching(&entity_type, &Criteria::new().identities_in(&[identity]), removal)?;
        }
        self.evict(identity);
        Ok(())
    }
    pub(crate) fn remove_matching(&mut self, entity_type: &str, criteria: &Criteria, removal: Removal) -> Result<usize> {
        let entity_type = self.schema.get(entity_type)?;
        match removal {
            Removal::Delete => self.store.delete_matching(entity_type.collection(), criteria),
            Removal::Destroy => self.store.destroy_matching(entity_type.collection(), criteria),
        }
    }
    /// Drops a document, and any embedded children it realized, from the
    /// identity map.
    pub(crate) fn evict(&mut self, identity: Identity) {
        let Some(mut document) = self.keeper.remove(identity) else {
            return;
        };
        document.mark_destroyed();
        let children: Vec<Identity> = document
            .entity_type()
            .relations()
            .filter(|metadata| metadata.is_embedded())
            .filter_map(|metadata| document.realized(metadata.name()))
            .flatten()
            .copied()
            .collect();
        for child in children {
            self.evict(child);
        }
    }

    // ------------- relations -------------
    fn metadata(&self, identity: Identity, name: &str) -> Result<Arc<RelationMetadata>> {
        let entity_type = self.document(identity)?.entity_type();
        entity_type
            .relation(name)
            .ok_or_else(|| DocmapError::UnknownRelation {
                entity_type: entity_type.name().to_string(),
                relation: name.to_string(),
            })
    }
    pub fn relation(&mut self, identity: Identity, name: &str) -> Result<Relation<'_>> {
        let metadata = self.metadata(identity, name)?;
        Ok(if metadata.is_many() {
            Relation::Many(Many::new(self, identity, metadata))
        } else {
            Relation::One(One::new(self, identity, metadata))
        })
    }
    pub fn one(&mut self, identity: Identity, name: &str) -> Result<One<'_>> {
        match self.relation(identity, name)? {
            Relation::One(one) => Ok(one),
            Relation::Many(_) => Err(DocmapError::RelationMismatch {
                relation: name.to_string(),
                expected: "to-one",
            }),
        }
    }
    pub fn many(&mut self, identity: Identity, name: &str) -> Result<Many<'_>> {
        match self.relation(identity, name)? {
            Relation::Many(many) => Ok(many),
            Relation::One(_) => Err(DocmapError::RelationMismatch {
                relation: name.to_string(),
                expected: "to-many",
            }),
        }
    }
    /// The relation mutator: replaces the targets with kept or loadable
    /// documents, with documents built from attribute maps, or with nothing.
    pub fn set_relation(&mut self, identity: Identity, name: &str, input: RelationInput) -> Result<()> {
        let metadata = self.metadata(identity, name)?;
        let targets = match input {
            RelationInput::Nil => None,
            RelationInput::Documents(identities) => Some(self.find_many(metadata.class_name(), &identities)?),
            RelationInput::Attributes(attributes) => {
                let source = BuildSource::Attributes(Value::Array(attributes.into_iter().map(Value::Document).collect()));
                Some(metadata.builder(source).build(self, identity)?)
            }
        };
        match self.relation(identity, name)? {
            Relation::One(mut one) => one.substitute(targets.and_then(|t| t.first().copied())),
            Relation::Many(mut many) => many.substitute(targets),
        }
    }
    /// Nested attribute assignment for a relation the entity type accepts
    /// nested attributes for.
    pub fn assign_nested(&mut self, identity: Identity, name: &str, attributes: Value) -> Result<()> {
        let metadata = self.metadata(identity, name)?;
        let options = self
            .document(identity)?
            .entity_type()
            .nested_options(name)
            .ok_or_else(|| DocmapError::UnknownAttribute {
                entity_type: metadata.owner().to_string(),
                attribute: format!("{name}_attributes"),
            })?;
        metadata.nested_builder(attributes, options).build(self, identity)
    }
}
