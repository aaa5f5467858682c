//! The storage collaborator.
//!
//! Everything the mapper needs from a document store fits in [`Store`]. The
//! crate ships one implementation, [`crate::persist::Persistor`].

use crate::criteria::{Criteria, FindMode};
use crate::error::Result;
use crate::identity::Identity;
use crate::value::RawDocument;

pub trait Store {
    fn generate_identity(&mut self) -> Result<Identity>;
    /// Documents of `collection` with any of the given identities. Missing
    /// identities are simply absent from the result.
    fn find_by_identity(&self, collection: &str, identities: &[Identity]) -> Result<Vec<RawDocument>>;
    fn find_by_selector(&self, collection: &str, criteria: &Criteria, mode: FindMode) -> Result<Vec<RawDocument>>;
    fn delete_matching(&mut self, collection: &str, criteria: &Criteria) -> Result<usize>;
    /// Like `delete_matching`, but runs the collection's destroy hooks first.
    fn destroy_matching(&mut self, collection: &str, criteria: &Criteria) -> Result<usize>;
    /// Inserts or replaces the document stored under `identity`.
    fn persist(&mut self, collection: &str, identity: Identity, document: &RawDocument) -> Result<()>;
}
