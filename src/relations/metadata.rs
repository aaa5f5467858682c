use std::fmt;

use convert_case::{Case, Casing};

use crate::criteria::Criteria;
use crate::document::Document;
use crate::error::{DocmapError, Result};
use crate::field::ID_FIELD;
use crate::identity::Identity;
use crate::relations::bindings::Binding;
use crate::relations::builders::{BuildSource, Builder, NestedBuilder};
use crate::value::{RawDocument, Value};

// ------------- RelationMacro -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationMacro {
    EmbedsOne,
    EmbedsMany,
    ReferencesOne,
    ReferencesMany,
    ReferencesAndReferencedInMany,
}

impl RelationMacro {
    pub const ALL: [RelationMacro; 5] = [
        RelationMacro::EmbedsOne,
        RelationMacro::EmbedsMany,
        RelationMacro::ReferencesOne,
        RelationMacro::ReferencesMany,
        RelationMacro::ReferencesAndReferencedInMany,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RelationMacro::EmbedsOne => "embeds_one",
            RelationMacro::EmbedsMany => "embeds_many",
            RelationMacro::ReferencesOne => "references_one",
            RelationMacro::ReferencesMany => "references_many",
            RelationMacro::ReferencesAndReferencedInMany => "references_and_referenced_in_many",
        }
    }
    pub fn parse(name: &str) -> Option<RelationMacro> {
        RelationMacro::ALL.into_iter().find(|m| m.name() == name)
    }
    pub fn is_embedded(&self) -> bool {
        matches!(self, RelationMacro::EmbedsOne | RelationMacro::EmbedsMany)
    }
    pub fn is_many(&self) -> bool {
        !matches!(self, RelationMacro::EmbedsOne | RelationMacro::ReferencesOne)
    }
    // references_many keeps its key on the target instead
    pub fn stores_foreign_key(&self) -> bool {
        matches!(
            self,
            RelationMacro::ReferencesOne | RelationMacro::ReferencesAndReferencedInMany
        )
    }
    pub fn foreign_key_suffix(&self) -> Option<&'static str> {
        match self {
            RelationMacro::EmbedsOne | RelationMacro::EmbedsMany => None,
            RelationMacro::ReferencesOne | RelationMacro::ReferencesMany => Some("_id"),
            RelationMacro::ReferencesAndReferencedInMany => Some("_ids"),
        }
    }
}

impl fmt::Display for RelationMacro {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ------------- Nested attribute options -------------
#[derive(Debug, Clone, Copy)]
pub enum RejectIf {
    /// Skips attribute sets whose values (ignoring the destroy flag) are all blank.
    AllBlank,
    Predicate(fn(&RawDocument) -> bool),
}

impl RejectIf {
    pub fn rejects(&self, attributes: &RawDocument) -> bool {
        match self {
            RejectIf::AllBlank => attributes
                .iter()
                .filter(|(name, _)| name.as_str() != DESTROY_FLAG)
                .all(|(_, value)| value.is_blank()),
            RejectIf::Predicate(predicate) => predicate(attributes),
        }
    }
}

pub const DESTROY_FLAG: &str = "_destroy";

#[derive(Debug, Clone, Copy, Default)]
pub struct NestedOptions {
    pub allow_destroy: bool,
    pub limit: Option<usize>,
    pub reject_if: Option<RejectIf>,
    pub update_only: bool,
}

// ------------- RelationOptions -------------
#[derive(Debug, Clone, Default)]
pub struct RelationOptions {
    pub class_name: Option<String>,
    pub inverse_of: Option<String>,
    pub foreign_key: Option<String>,
}

impl RelationOptions {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn class_name(mut self, class_name: &str) -> Self {
        self.class_name = Some(class_name.to_string());
        self
    }
    pub fn inverse_of(mut self, inverse_of: &str) -> Self {
        self.inverse_of = Some(inverse_of.to_string());
        self
    }
    pub fn foreign_key(mut self, foreign_key: &str) -> Self {
        self.foreign_key = Some(foreign_key.to_string());
        self
    }
}

// ------------- RelationMetadata -------------
// Built once per (owner type, relation name) and shared by every instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationMetadata {
    owner: String,
    name: String,
    relation_macro: RelationMacro,
    class_name: String,
    foreign_key: Option<String>,
    inverse_name: String,
}

impl RelationMetadata {
    pub fn new(owner: &str, name: &str, macro_name: &str, options: RelationOptions) -> Result<Self> {
        let relation_macro =
            RelationMacro::parse(macro_name).ok_or_else(|| DocmapError::InvalidRelationType {
                entity_type: owner.to_string(),
                relation: name.to_string(),
                macro_name: macro_name.to_string(),
            })?;
        let owner_name = owner.to_case(Case::Snake);
        let class_name = options
            .class_name
            .unwrap_or_else(|| singularize(name).to_case(Case::Pascal));
        let inverse_name = options.inverse_of.unwrap_or_else(|| match relation_macro {
            RelationMacro::ReferencesOne | RelationMacro::ReferencesAndReferencedInMany => {
                pluralize(&owner_name)
            }
            _ => owner_name.clone(),
        });
        let foreign_key = match relation_macro {
            RelationMacro::EmbedsOne | RelationMacro::EmbedsMany => None,
            RelationMacro::ReferencesOne => {
                Some(options.foreign_key.unwrap_or_else(|| format!("{name}_id")))
            }
            RelationMacro::ReferencesMany => {
                Some(options.foreign_key.unwrap_or_else(|| format!("{inverse_name}_id")))
            }
            RelationMacro::ReferencesAndReferencedInMany => Some(
                options
                    .foreign_key
                    .unwrap_or_else(|| format!("{}_ids", singularize(name))),
            ),
        };
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            relation_macro,
            class_name,
            foreign_key,
            inverse_name,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn relation_macro(&self) -> RelationMacro {
        self.relation_macro
    }
    pub fn class_name(&self) -> &str {
        &self.class_name
    }
    /// Name of the key attribute. It lives on the owner when
    /// `stores_foreign_key` holds, otherwise on the target.
    pub fn foreign_key(&self) -> Option<&str> {
        self.foreign_key.as_deref()
    }
    pub fn foreign_key_suffix(&self) -> Option<&'static str> {
        self.relation_macro.foreign_key_suffix()
    }
    pub fn foreign_key_default(&self) -> Option<Value> {
        match self.relation_macro {
            RelationMacro::EmbedsOne | RelationMacro::EmbedsMany => None,
            RelationMacro::ReferencesOne | RelationMacro::ReferencesMany => Some(Value::Null),
            RelationMacro::ReferencesAndReferencedInMany => Some(Value::Array(Vec::new())),
        }
    }
    pub fn inverse_name(&self) -> &str {
        &self.inverse_name
    }
    pub fn is_embedded(&self) -> bool {
        self.relation_macro.is_embedded()
    }
    pub fn is_many(&self) -> bool {
        self.relation_macro.is_many()
    }
    pub fn stores_foreign_key(&self) -> bool {
        self.relation_macro.stores_foreign_key()
    }

    /// Selects the builder for this relation kind.
    pub fn builder(&self, source: BuildSource) -> Builder<'_> {
        Builder::new(self, source)
    }
    pub fn nested_builder(&self, attributes: Value, options: NestedOptions) -> NestedBuilder<'_> {
        NestedBuilder::new(self, attributes, options)
    }
    pub fn binding<'a>(&'a self, base: Identity, targets: &'a [Identity]) -> Binding<'a> {
        Binding::new(self, base, targets)
    }

    /// Store selector scoping the target collection to this base, if the
    /// targets live in their own collection.
    pub fn criteria(&self, base: &Document) -> Option<Criteria> {
        let foreign_key = self.foreign_key.as_deref()?;
        match self.relation_macro {
            RelationMacro::ReferencesAndReferencedInMany => {
                Some(Criteria::new().identities_in(&base.foreign_key_identities(foreign_key)))
            }
            RelationMacro::ReferencesMany => Some(Criteria::new().where_eq(foreign_key, base.identity()?)),
            RelationMacro::ReferencesOne => {
                let identity = base.foreign_key_identities(foreign_key);
                Some(Criteria::new().where_eq(ID_FIELD, identity.first().copied()))
            }
            RelationMacro::EmbedsOne | RelationMacro::EmbedsMany => None,
        }
    }
}

impl fmt::Display for RelationMetadata {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{} ({} {})", self.owner, self.name, self.relation_macro, self.class_name)
    }
}

// ------------- Naming -------------
pub(crate) fn singularize(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("ies") {
        format!("{stem}y")
    } else if ["sses", "xes", "ches", "shes"].iter().any(|s| name.ends_with(s)) {
        name[..name.len() - 2].to_string()
    } else if name.ends_with('s') && !name.ends_with("ss") {
        name[..name.len() - 1].to_string()
    } else {
        name.to_string()
    }
}

pub(crate) fn pluralize(name: &str) -> String {
    let consonant_y = name.ends_with('y')
        && !["ay", "ey", "oy", "uy"].iter().any(|s| name.ends_with(s));
    if consonant_y {
        format!("{}ies", &name[..name.len() - 1])
    } else if ["s", "x", "ch", "sh"].iter().any(|s| name.ends_with(s)) {
        format!("{name}es")
    } else {
        format!("{name}s")
    }
}
