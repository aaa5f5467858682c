//! Selectors handed to the store, and their structural evaluation.
//!
//! A [`Criteria`] is a conjunction of per-attribute conditions. Matching
//! follows document store semantics: a condition on an array-valued attribute
//! holds when any element satisfies it, and a missing attribute reads as null.

use std::fmt;

use crate::field::ID_FIELD;
use crate::identity::Identity;
use crate::value::{RawDocument, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindMode {
    All,
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
}

impl Condition {
    pub fn holds(&self, actual: &Value) -> bool {
        match self {
            Condition::Eq(expected) => equals(actual, expected),
            Condition::Ne(expected) => !equals(actual, expected),
            Condition::In(candidates) => candidates.iter().any(|c| equals(actual, c)),
            Condition::Nin(candidates) => !candidates.iter().any(|c| equals(actual, c)),
        }
    }
}

fn equals(actual: &Value, expected: &Value) -> bool {
    if actual.loosely_eq(expected) {
        return true;
    }
    match (actual, expected) {
        (Value::Array(elements), expected) if !matches!(expected, Value::Array(_)) => {
            elements.iter().any(|element| element.loosely_eq(expected))
        }
        _ => false,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    conditions: Vec<(String, Condition)>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn where_eq<V: Into<Value>>(mut self, name: &str, value: V) -> Self {
        self.conditions.push((name.to_string(), Condition::Eq(value.into())));
        self
    }
    pub fn where_ne<V: Into<Value>>(mut self, name: &str, value: V) -> Self {
        self.conditions.push((name.to_string(), Condition::Ne(value.into())));
        self
    }
    pub fn any_in(mut self, name: &str, values: Vec<Value>) -> Self {
        self.conditions.push((name.to_string(), Condition::In(values)));
        self
    }
    pub fn not_in(mut self, name: &str, values: Vec<Value>) -> Self {
        self.conditions.push((name.to_string(), Condition::Nin(values)));
        self
    }
    /// Restricts to documents whose identity is one of `identities`.
    pub fn identities_in(self, identities: &[Identity]) -> Self {
        let values = identities.iter().copied().map(Value::Identity).collect();
        self.any_in(ID_FIELD, values)
    }
    pub fn and(mut self, other: Criteria) -> Self {
        self.conditions.extend(other.conditions);
        self
    }
    pub fn conditions(&self) -> &[(String, Condition)] {
        &self.conditions
    }
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
    pub fn matches(&self, document: &RawDocument) -> bool {
        self.conditions.iter().all(|(name, condition)| {
            condition.holds(document.get(name).unwrap_or(&Value::Null))
        })
    }
}

// Every pair becomes an equality condition.
impl From<RawDocument> for Criteria {
    fn from(document: RawDocument) -> Self {
        Self {
            conditions: document
                .into_iter()
                .map(|(name, value)| (name, Condition::Eq(value)))
                .collect(),
        }
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = String::new();
        for (name, condition) in &self.conditions {
            let rendered = match condition {
                Condition::Eq(v) => format!("{name} = {v}"),
                Condition::Ne(v) => format!("{name} != {v}"),
                Condition::In(vs) => format!("{name} in {}", Value::Array(vs.clone())),
                Condition::Nin(vs) => format!("{name} not in {}", Value::Array(vs.clone())),
            };
            s += &(rendered + " and ");
        }
        write!(f, "{{{}}}", s.trim_end_matches(" and "))
    }
}
