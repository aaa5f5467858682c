//! Relation proxies.
//!
//! A proxy is a short-lived handle on one relation of one base document. It
//! borrows the [`Session`] mutably, loads the relation on first use (the
//! result is cached on the base until reloaded), and combines the relation's
//! builder, binding and store calls into the operations below.
//!
//! Every kind of relation is served by the same two proxies: [`One`] for
//! `embeds_one` and `references_one`, [`Many`] for the rest. The difference
//! between kinds lives in [`RelationMetadata`] and [`Binding`].
//!
//! [`Binding`]: crate::relations::bindings::Binding

use std::sync::Arc;

use tracing::debug;

use crate::criteria::{Criteria, FindMode};
use crate::error::{DocmapError, Result};
use crate::identity::Identity;
use crate::relations::bindings::BindingOptions;
use crate::relations::metadata::RelationMetadata;
use crate::session::{Removal, Session};
use crate::value::{RawDocument, Value};

/// What `Many::find` looks for. Identity lookups ignore the relation; the
/// selector forms are scoped to it.
#[derive(Debug, Clone, PartialEq)]
pub enum Find {
    Id(Identity),
    Ids(Vec<Identity>),
    All(Criteria),
    First(Criteria),
    Last(Criteria),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Found {
    One(Identity),
    Many(Vec<Identity>),
}

/// What a relation mutator accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationInput {
    Documents(Vec<Identity>),
    Attributes(Vec<RawDocument>),
    Nil,
}

impl RelationInput {
    pub fn from_value(relation: &str, value: Value) -> Result<RelationInput> {
        match value {
            Value::Null => Ok(RelationInput::Nil),
            Value::Identity(identity) => Ok(RelationInput::Documents(vec![identity])),
            Value::Document(document) => Ok(RelationInput::Attributes(vec![document])),
            Value::Array(items) if items.iter().all(|item| item.as_identity().is_some()) => {
                Ok(RelationInput::Documents(value_identities(&items)))
            }
            Value::Array(items) if items.iter().all(|item| item.as_document().is_some()) => {
                Ok(RelationInput::Attributes(
                    items
                        .into_iter()
                        .filter_map(|item| match item {
                            Value::Document(document) => Some(document),
                            _ => None,
                        })
                        .collect(),
                ))
            }
            other => Err(DocmapError::InvalidType {
                field: relation.to_string(),
                value: other.to_string(),
                target: "relation input",
            }),
        }
    }
}

fn value_identities(items: &[Value]) -> Vec<Identity> {
    items.iter().filter_map(Value::as_identity).collect()
}

// Targets must be kept and of the relation's class.
fn require_targets(session: &Session, metadata: &RelationMetadata, targets: &[Identity]) -> Result<()> {
    let class_name = metadata.class_name();
    let foreign: Vec<Identity> = targets
        .iter()
        .copied()
        .filter(|target| {
            session
                .keeper
                .get(*target)
                .is_none_or(|document| document.entity_type().name() != class_name)
        })
        .collect();
    if foreign.is_empty() {
        Ok(())
    } else {
        Err(DocmapError::NotFound {
            entity_type: class_name.to_string(),
            identities: foreign,
        })
    }
}

pub enum Relation<'s> {
    One(One<'s>),
    Many(Many<'s>),
}

// ------------- One -------------
pub struct One<'s> {
    session: &'s mut Session,
    base: Identity,
    metadata: Arc<RelationMetadata>,
}

impl<'s> One<'s> {
    pub(crate) fn new(session: &'s mut Session, base: Identity, metadata: Arc<RelationMetadata>) -> Self {
        Self {
            session,
            base,
            metadata,
        }
    }
    pub fn metadata(&self) -> &RelationMetadata {
        &self.metadata
    }
    pub fn base(&self) -> Identity {
        self.base
    }
    pub fn target(&mut self) -> Result<Option<Identity>> {
        let targets = self.session.load_relation(self.base, &self.metadata)?;
        Ok(targets.first().copied())
    }
    /// Replaces the target, unbinding the old one first.
    pub fn substitute(&mut self, target: Option<Identity>) -> Result<()> {
        if let Some(target) = target {
            require_targets(self.session, &self.metadata, &[target])?;
        }
        let current = self.target()?;
        if current.is_some() && current == target {
            return Ok(());
        }
        if let Some(current) = current {
            self.metadata
                .binding(self.base, &[])
                .unbind_one(&mut self.session.keeper, current, BindingOptions::default())?;
        }
        self.session
            .document_mut(self.base)?
            .set_realized(self.metadata.name(), target.into_iter().collect());
        if let Some(target) = target {
            self.metadata
                .binding(self.base, &[])
                .bind_one(&mut self.session.keeper, target, BindingOptions::default())?;
        }
        if let Some(current) = current.filter(|_| self.metadata.is_embedded()) {
            self.session.evict(current);
        }
        debug!(relation = %self.metadata, base = %self.base, ?current, ?target, "substituted");
        Ok(())
    }
    /// Builds a new target from attributes and makes it the target.
    pub fn build(&mut self, attributes: RawDocument) -> Result<Identity> {
        let target = self.session.instantiate(self.metadata.class_name(), attributes)?;
        self.substitute(Some(target))?;
        Ok(target)
    }
    pub fn nullify(&mut self) -> Result<()> {
        self.substitute(None)
    }
    pub fn reload(&mut self) -> Result<Option<Identity>> {
        self.session
            .document_mut(self.base)?
            .reset_relation(self.metadata.name());
        self.target()
    }
}

// ------------- Many -------------
pub struct Many<'s> {
    session: &'s mut Session,
    base: Identity,
    metadata: Arc<RelationMetadata>,
}

impl<'s> Many<'s> {
    pub(crate) fn new(session: &'s mut Session, base: Identity, metadata: Arc<RelationMetadata>) -> Self {
        Self {
            session,
            base,
            metadata,
        }
    }
    pub fn metadata(&self) -> &RelationMetadata {
        &self.metadata
    }
    pub fn base(&self) -> Identity {
        self.base
    }

    /// The targets in order, loading them on first use.
    pub fn target(&mut self) -> Result<Vec<Identity>> {
        self.session.load_relation(self.base, &self.metadata)
    }
    /// Identities of the targets. For relations keeping an array key on the
    /// base this is the key itself and needs no load.
    pub fn ids(&mut self) -> Result<Vec<Identity>> {
        let metadata = Arc::clone(&self.metadata);
        match metadata.foreign_key().filter(|_| metadata.stores_foreign_key()) {
            Some(foreign_key) => Ok(self
                .session
                .document(self.base)?
                .foreign_key_identities(foreign_key)),
            None => self.target(),
        }
    }
    pub fn len(&mut self) -> Result<usize> {
        Ok(self.target()?.len())
    }
    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.target()?.is_empty())
    }

    fn set_target(&mut self, targets: Vec<Identity>) -> Result<()> {
        self.session
            .document_mut(self.base)?
            .set_realized(self.metadata.name(), targets);
        Ok(())
    }

    /// Appends a kept document and binds it. Pushing a current target is a
    /// no-op.
    pub fn push(&mut self, target: Identity) -> Result<()> {
        require_targets(self.session, &self.metadata, &[target])?;
        let mut targets = self.target()?;
        if targets.contains(&target) {
            return Ok(());
        }
        targets.push(target);
        self.set_target(targets)?;
        self.metadata
            .binding(self.base, &[])
            .bind_one(&mut self.session.keeper, target, BindingOptions::default())?;
        debug!(relation = %self.metadata, base = %self.base, %target, "pushed");
        Ok(())
    }
    pub fn build(&mut self, attributes: RawDocument) -> Result<Identity> {
        let target = self.session.instantiate(self.metadata.class_name(), attributes)?;
        self.push(target)?;
        Ok(target)
    }
    /// Builds and saves a new target. A base holding the foreign key is saved
    /// too when it is already persisted.
    pub fn create(&mut self, attributes: RawDocument) -> Result<Identity> {
        let target = self.build(attributes)?;
        self.session.save(target)?;
        if self.metadata.stores_foreign_key() && self.session.document(self.base)?.is_persisted() {
            self.session.save(self.base)?;
        }
        Ok(target)
    }

    /// Removes `target` from the relation and unbinds it. The target itself is
    /// kept. Returns `None` when it was not a target.
    pub fn delete(&mut self, target: Identity) -> Result<Option<Identity>> {
        let mut targets = self.target()?;
        if !targets.contains(&target) {
            return Ok(None);
        }
        targets.retain(|t| *t != target);
        self.set_target(targets)?;
        self.metadata
            .binding(self.base, &[])
            .unbind_one(&mut self.session.keeper, target, BindingOptions::default())?;
        debug!(relation = %self.metadata, base = %self.base, %target, "deleted from relation");
        Ok(Some(target))
    }

    pub fn delete_all(&mut self, criteria: Criteria) -> Result<usize> {
        self.remove_all(criteria, Removal::Delete)
    }
    pub fn destroy_all(&mut self, criteria: Criteria) -> Result<usize> {
        self.remove_all(criteria, Removal::Destroy)
    }

    // One store call scoped to the relation, then the matching in-memory
    // targets are unbound and evicted.
    fn remove_all(&mut self, criteria: Criteria, removal: Removal) -> Result<usize> {
        let targets = self.target()?;
        let mut matching = Vec::new();
        for target in &targets {
            if criteria.matches(&self.session.as_document(*target)?) {
                matching.push(*target);
            }
        }
        let removed = if self.metadata.is_embedded() {
            matching.len()
        } else {
            let scope = self.scope()?.and(criteria.clone());
            self.session
                .remove_matching(self.metadata.class_name(), &scope, removal)?
        };
        self.set_target(targets.into_iter().filter(|t| !matching.contains(t)).collect())?;
        self.metadata
            .binding(self.base, &matching)
            .unbind(&mut self.session.keeper, BindingOptions::default())?;
        for target in &matching {
            self.session.evict(*target);
        }
        if self.metadata.is_embedded() && self.session.document(self.base)?.is_persisted() {
            self.session.save(self.base)?;
        }
        debug!(relation = %self.metadata, base = %self.base, %criteria, ?removal, removed, "removed matching");
        Ok(removed)
    }

    fn scope(&self) -> Result<Criteria> {
        let base = self.session.document(self.base)?;
        Ok(self.metadata.criteria(base).unwrap_or_default())
    }

    pub fn find(&mut self, find: Find) -> Result<Found> {
        let class_name = self.metadata.class_name().to_string();
        match find {
            Find::Id(identity) => Ok(Found::One(self.session.find(&class_name, identity)?)),
            Find::Ids(identities) => Ok(Found::Many(self.session.find_many(&class_name, &identities)?)),
            Find::All(criteria) => Ok(Found::Many(self.select(criteria, FindMode::All)?)),
            Find::First(criteria) => self.select_one(criteria, FindMode::First),
            Find::Last(criteria) => self.select_one(criteria, FindMode::Last),
        }
    }

    fn select_one(&mut self, criteria: Criteria, mode: FindMode) -> Result<Found> {
        match self.select(criteria, mode)?.first() {
            Some(identity) => Ok(Found::One(*identity)),
            None => Err(DocmapError::NotFound {
                entity_type: self.metadata.class_name().to_string(),
                identities: Vec::new(),
            }),
        }
    }

    // Embedded targets are only searched in memory.
    fn select(&mut self, criteria: Criteria, mode: FindMode) -> Result<Vec<Identity>> {
        if !self.metadata.is_embedded() {
            let scope = self.scope()?.and(criteria);
            return self.session.where_(self.metadata.class_name(), scope, mode);
        }
        let mut matching = Vec::new();
        for target in self.target()? {
            if criteria.matches(&self.session.as_document(target)?) {
                matching.push(target);
            }
        }
        Ok(match mode {
            FindMode::All => matching,
            FindMode::First => matching.into_iter().take(1).collect(),
            FindMode::Last => matching.pop().into_iter().collect(),
        })
    }

    /// Unbinds every target and empties the relation. The targets stay kept
    /// and in the store.
    pub fn nullify(&mut self) -> Result<()> {
        let targets = self.target()?;
        self.metadata
            .binding(self.base, &targets)
            .unbind(&mut self.session.keeper, BindingOptions::default())?;
        self.set_target(Vec::new())?;
        debug!(relation = %self.metadata, base = %self.base, count = targets.len(), "nullified");
        Ok(())
    }
    pub fn nullify_all(&mut self) -> Result<()> {
        self.nullify()
    }

    /// Replaces the targets. The current ones are unbound before the new ones
    /// are bound, so an identity present in both ends up bound.
    pub fn substitute(&mut self, targets: Option<Vec<Identity>>) -> Result<()> {
        let targets = targets.unwrap_or_default();
        require_targets(self.session, &self.metadata, &targets)?;
        let current = self.target()?;
        self.metadata
            .binding(self.base, &current)
            .unbind(&mut self.session.keeper, BindingOptions::default())?;
        self.set_target(targets.clone())?;
        self.metadata
            .binding(self.base, &targets)
            .bind(&mut self.session.keeper, BindingOptions::default())?;
        if self.metadata.is_embedded() {
            for dropped in current.iter().filter(|c| !targets.contains(c)) {
                self.session.evict(*dropped);
            }
        }
        debug!(relation = %self.metadata, base = %self.base, count = targets.len(), "substituted");
        Ok(())
    }

    /// Empties the relation. When the base is persisted, referenced targets
    /// are deleted from the store first.
    pub fn unbind(&mut self) -> Result<Vec<Identity>> {
        let targets = self.target()?;
        let deleting = !self.metadata.is_embedded() && self.session.document(self.base)?.is_persisted();
        if deleting && !targets.is_empty() {
            self.session.remove_matching(
                self.metadata.class_name(),
                &Criteria::new().identities_in(&targets),
                Removal::Delete,
            )?;
        }
        self.metadata
            .binding(self.base, &targets)
            .unbind(&mut self.session.keeper, BindingOptions::default())?;
        self.set_target(Vec::new())?;
        if deleting || self.metadata.is_embedded() {
            for target in &targets {
                self.session.evict(*target);
            }
        }
        Ok(Vec::new())
    }
    pub fn clear(&mut self) -> Result<Vec<Identity>> {
        self.unbind()
    }

    /// Drops the cached targets and loads them again.
    pub fn reload(&mut self) -> Result<Vec<Identity>> {
        self.session
            .document_mut(self.base)?
            .reset_relation(self.metadata.name());
        self.target()
    }
}
