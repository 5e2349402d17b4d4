//! modelgraph-core: a schema-driven element store with integrity validation.
//!
//! The crate manages the full object graph of a project (requirement
//! definitions, relationships between them, and arbitrary schema-defined
//! entities), loaded from and persisted to a per-project store, queried
//! generically, mutated via partial updates, and checked for structural
//! consistency (duplicate identifiers, derive/refine cycles, dangling
//! relationship endpoints).

pub mod accessor;
pub mod error;
pub mod models;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod storage;
pub mod store;
pub mod validation;

// Re-export commonly used types
pub use accessor::AttributeAccessor;
pub use error::{CoreError, Result};
pub use models::{
    relation_kind_of, AttrValue, Element, ModelGraph, RefValue, RelationKind,
    CLASS_MODEL_ELEMENT, CLASS_RELATIONSHIP, CLASS_REQUIREMENT, CLASS_USAGE, FIELD_CREATED_AT,
    FIELD_FROM, FIELD_KIND, FIELD_REQ_ID, FIELD_TO, IMMUTABLE_FIELDS,
};
pub use registry::{get_registry_path, ProjectEntry, ProjectRegistry};
pub use resolver::ReferenceResolver;
pub use schema::{AttrType, ClassDef, FieldDef, RawClassDef, SchemaProvider, SchemaRegistry};
pub use storage::{StorageBackend, YamlBackend};
pub use store::{ElementStore, QueryFilter, RelationOutcome};
pub use validation::{
    check_relation_classes, RuleCode, ValidationEngine, ValidationReport, Violation,
    REPORT_FORMAT_VERSION,
};
