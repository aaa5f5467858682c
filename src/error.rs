
use thiserror::Error;

use crate::identity::Identity;

#[derive(Error, Debug)]
pub enum DocmapError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Data corruption: {message}")]
    DataCorruption { message: String },
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
    // declaration time
    #[error("Invalid relation type '{macro_name}' for relation '{relation}' on {entity_type}")]
    InvalidRelationType {
        entity_type: String,
        relation: String,
        macro_name: String,
    },
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),
    // attribute access
    #[error("Unknown attribute '{attribute}' for {entity_type}")]
    UnknownAttribute { entity_type: String, attribute: String },
    #[error("Undeclared attribute '{attribute}' on {entity_type} (dynamic fields are disabled)")]
    UndeclaredAttribute { entity_type: String, attribute: String },
    #[error("Invalid value {value} for field '{field}', expected {target}")]
    InvalidType {
        field: String,
        value: String,
        target: &'static str,
    },
    // relations and lookups
    #[error("Unknown relation '{relation}' on {entity_type}")]
    UnknownRelation { entity_type: String, relation: String },
    #[error("Relation '{relation}' is not a {expected} relation")]
    RelationMismatch {
        relation: String,
        expected: &'static str,
    },
    #[error("Relation '{relation}' accepts at most {limit} nested records")]
    TooManyNestedRecords { relation: String, limit: usize },
    #[error("Document(s) of type {entity_type} not found for identities {identities:?}")]
    NotFound {
        entity_type: String,
        identities: Vec<Identity>,
    },
    #[error("Document {0} is not kept by this session")]
    Detached(Identity),
}

pub type Result<T> = std::result::Result<T, DocmapError>;

// Helper conversions
impl From<rusqlite::Error> for DocmapError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<serde_json::Error> for DocmapError {
    fn from(e: serde_json::Error) -> Self { Self::DataCorruption { message: e.to_string() } }
}
impl From<config::ConfigError> for DocmapError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
