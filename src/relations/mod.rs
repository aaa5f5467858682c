//! Relations between documents: how they are declared, built, bound and
//! handed to callers.

pub mod bindings;
pub mod builders;
pub mod metadata;
pub mod proxy;

pub use bindings::{Binding, BindingOptions};
pub use builders::{BuildSource, Builder, NestedBuilder};
pub use metadata::{NestedOptions, RejectIf, RelationMacro, RelationMetadata, RelationOptions};
pub use proxy::{Find, Found, Many, One, Relation, RelationInput};
