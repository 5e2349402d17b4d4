use thiserror::Error;

/// Error type for all core operations
#[derive(Debug, Error)]
pub enum CoreError {
    /// The schema provider has no definition for the requested class
    #[error("unknown class: {0}")]
    UnknownClass(String),

    /// Operation on an element id that does not exist in the project graph
    #[error("element not found: {0}")]
    NotFound(String),

    /// An element with the requested id already exists in the project graph
    #[error("element id already exists: {0}")]
    DuplicateId(String),

    /// The target of a reference-setting call does not exist
    #[error("reference target not found: {0}")]
    ReferenceTargetNotFound(String),

    /// The reference target's class is not compatible with the field's declared target type
    #[error("type mismatch: element '{target_id}' of class {actual} is not compatible with {expected}")]
    TypeMismatch {
        target_id: String,
        actual: String,
        expected: String,
    },

    /// The named field exists but is an attribute, not a reference
    #[error("field '{0}' is not a reference")]
    NotAReference(String),

    /// The named field is not declared on the class (own or inherited)
    #[error("class {class} has no field '{field}'")]
    UnknownField { class: String, field: String },

    /// A container has no containment field that can hold the new element's class
    #[error("class {container_class} cannot contain elements of class {class}")]
    NoContainmentField {
        container_class: String,
        class: String,
    },

    /// Relationships must connect two distinct elements
    #[error("relationship source and target must differ")]
    SelfReference,

    /// The relation kind string is not one of derive, satisfy, refine, trace
    #[error("invalid relation kind: {0}")]
    InvalidRelationKind(String),

    /// A semantic constraint forbids this relation between these classes
    #[error("relation '{kind}' is not allowed from {from_class} to {to_class}")]
    RelationNotAllowed {
        kind: String,
        from_class: String,
        to_class: String,
    },

    /// The project is not known to the registry or backend
    #[error("project not found: {0}")]
    UnknownProject(String),

    /// Timed out waiting for the store file lock
    #[error("timeout waiting for file lock - another process may be editing: {0}")]
    LockTimeout(String),

    /// Malformed schema document
    #[error("schema error: {0}")]
    Schema(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
