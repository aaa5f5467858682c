//! Keeps both sides of a relation in step.
//!
//! A [`Binding`] edits foreign keys and realized inverse relations of the
//! documents in a [`DocumentKeeper`]. It never touches the store, and it does
//! not edit the base's own realized target list: the proxy owns that.

use tracing::trace;

use crate::document::{DocumentKeeper, Parent};
use crate::error::Result;
use crate::identity::Identity;
use crate::relations::metadata::{RelationMacro, RelationMetadata, singularize};
use crate::value::Value;

#[derive(Debug, Clone, Copy, Default)]
pub struct BindingOptions {
    /// Set while wiring documents that were just read or built from raw
    /// attributes; foreign key edits are then not recorded as changes.
    pub binding: bool,
}

impl BindingOptions {
    pub fn binding() -> Self {
        Self { binding: true }
    }
    fn track(&self) -> bool {
        !self.binding
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Binding<'a> {
    metadata: &'a RelationMetadata,
    base: Identity,
    targets: &'a [Identity],
}

impl<'a> Binding<'a> {
    pub fn new(metadata: &'a RelationMetadata, base: Identity, targets: &'a [Identity]) -> Self {
        Self {
            metadata,
            base,
            targets,
        }
    }

    pub fn bind(&self, keeper: &mut DocumentKeeper, options: BindingOptions) -> Result<()> {
        for target in self.targets {
            self.bind_one(keeper, *target, options)?;
        }
        Ok(())
    }
    pub fn unbind(&self, keeper: &mut DocumentKeeper, options: BindingOptions) -> Result<()> {
        for target in self.targets {
            self.unbind_one(keeper, *target, options)?;
        }
        Ok(())
    }

    pub fn bind_one(&self, keeper: &mut DocumentKeeper, target: Identity, options: BindingOptions) -> Result<()> {
        let track = options.track();
        let inverse = self.metadata.inverse_name();
        trace!(relation = %self.metadata, base = %self.base, target = %target, "bind");
        match self.metadata.relation_macro() {
            RelationMacro::ReferencesAndReferencedInMany => {
                let inverse_key = self.inverse_foreign_key(keeper, target)?;
                if let Some(foreign_key) = self.metadata.foreign_key() {
                    keeper
                        .require_mut(self.base)?
                        .push_foreign_key(foreign_key, target, track)?;
                }
                let document = keeper.require_mut(target)?;
                document.push_foreign_key(&inverse_key, self.base, track)?;
                push_realized(document.realized_mut(inverse), self.base);
            }
            RelationMacro::ReferencesOne => {
                if let Some(foreign_key) = self.metadata.foreign_key() {
                    keeper
                        .require_mut(self.base)?
                        .set_foreign_key(foreign_key, Value::Identity(target), track)?;
                }
                let inverse_key = self.inverse_one_key(keeper, target)?;
                let document = keeper.require_mut(target)?;
                if let Some(inverse_key) = inverse_key {
                    document.set_foreign_key(&inverse_key, Value::Identity(self.base), track)?;
                }
                push_realized(document.realized_mut(inverse), self.base);
            }
            RelationMacro::ReferencesMany => {
                let Some(foreign_key) = self.metadata.foreign_key() else {
                    return Ok(());
                };
                let document = keeper.require_mut(target)?;
                let previous = document.foreign_key_identities(foreign_key).first().copied();
                document.set_foreign_key(foreign_key, Value::Identity(self.base), track)?;
                if let Some(realized) = document.realized_mut(inverse) {
                    *realized = vec![self.base];
                }
                // a target moving between owners leaves the old owner's list
                if let Some(previous) = previous.filter(|p| *p != self.base) {
                    if let Some(owner) = keeper.get_mut(previous) {
                        if let Some(realized) = owner.realized_mut(self.metadata.name()) {
                            realized.retain(|t| *t != target);
                        }
                    }
                }
            }
            RelationMacro::EmbedsOne | RelationMacro::EmbedsMany => {
                let document = keeper.require_mut(target)?;
                document.set_embedded_in(Some(Parent {
                    identity: self.base,
                    relation: self.metadata.name().to_string(),
                }));
                if let Some(realized) = document.realized_mut(inverse) {
                    *realized = vec![self.base];
                }
            }
        }
        Ok(())
    }

    /// Clears the link between base and `target`. The target itself stays
    /// kept; a target that is no longer kept is skipped.
    pub fn unbind_one(&self, keeper: &mut DocumentKeeper, target: Identity, options: BindingOptions) -> Result<()> {
        let track = options.track();
        let inverse = self.metadata.inverse_name();
        trace!(relation = %self.metadata, base = %self.base, target = %target, "unbind");
        match self.metadata.relation_macro() {
            RelationMacro::ReferencesAndReferencedInMany => {
                if let Some(foreign_key) = self.metadata.foreign_key() {
                    if let Some(base) = keeper.get_mut(self.base) {
                        base.pull_foreign_key(foreign_key, target, track)?;
                    }
                }
                if !keeper.contains(target) {
                    return Ok(());
                }
                let inverse_key = self.inverse_foreign_key(keeper, target)?;
                let document = keeper.require_mut(target)?;
                document.pull_foreign_key(&inverse_key, self.base, track)?;
                pull_realized(document.realized_mut(inverse), self.base);
            }
            RelationMacro::ReferencesOne => {
                if let Some(foreign_key) = self.metadata.foreign_key() {
                    if let Some(base) = keeper.get_mut(self.base) {
                        if base.foreign_key_identities(foreign_key).contains(&target) {
                            base.set_foreign_key(foreign_key, Value::Null, track)?;
                        }
                    }
                }
                if !keeper.contains(target) {
                    return Ok(());
                }
                let inverse_key = self.inverse_one_key(keeper, target)?;
                let document = keeper.require_mut(target)?;
                if let Some(inverse_key) = inverse_key {
                    if document.foreign_key_identities(&inverse_key).contains(&self.base) {
                        document.set_foreign_key(&inverse_key, Value::Null, track)?;
                    }
                }
                pull_realized(document.realized_mut(inverse), self.base);
            }
            RelationMacro::ReferencesMany => {
                let (Some(foreign_key), Some(document)) = (self.metadata.foreign_key(), keeper.get_mut(target))
                else {
                    return Ok(());
                };
                if document.foreign_key_identities(foreign_key).contains(&self.base) {
                    document.set_foreign_key(foreign_key, Value::Null, track)?;
                }
                pull_realized(document.realized_mut(inverse), self.base);
            }
            RelationMacro::EmbedsOne | RelationMacro::EmbedsMany => {
                if let Some(document) = keeper.get_mut(target) {
                    document.set_embedded_in(None);
                    pull_realized(document.realized_mut(inverse), self.base);
                }
            }
        }
        Ok(())
    }

    // The array key on the target pointing back at base. Taken from the
    // target type's inverse declaration when there is one.
    fn inverse_foreign_key(&self, keeper: &DocumentKeeper, target: Identity) -> Result<String> {
        let document = keeper.require(target)?;
        let declared = document
            .entity_type()
            .relation(self.metadata.inverse_name())
            .and_then(|inverse| inverse.foreign_key().map(String::from));
        Ok(declared.unwrap_or_else(|| format!("{}_ids", singularize(self.metadata.inverse_name()))))
    }

    // A to-one inverse that also stores its key on the target.
    fn inverse_one_key(&self, keeper: &DocumentKeeper, target: Identity) -> Result<Option<String>> {
        let document = keeper.require(target)?;
        Ok(document
            .entity_type()
            .relation(self.metadata.inverse_name())
            .filter(|inverse| inverse.relation_macro() == RelationMacro::ReferencesOne)
            .and_then(|inverse| inverse.foreign_key().map(String::from)))
    }
}

fn push_realized(realized: Option<&mut Vec<Identity>>, identity: Identity) {
    if let Some(realized) = realized {
        if !realized.contains(&identity) {
            realized.push(identity);
        }
    }
}

fn pull_realized(realized: Option<&mut Vec<Identity>>, identity: Identity) {
    if let Some(realized) = realized {
        realized.retain(|i| *i != identity);
    }
}
