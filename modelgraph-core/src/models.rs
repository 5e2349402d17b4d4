use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Class name of relationship elements
pub const CLASS_RELATIONSHIP: &str = "Relationship";
/// Base class of requirement definitions (the DUP_REQID rule groups its subtypes)
pub const CLASS_REQUIREMENT: &str = "RequirementDefinition";
/// Base class of behavioral/structural usages (legal `satisfy` sources)
pub const CLASS_USAGE: &str = "AbstractUsage";
/// Root class every element's class must inherit from
pub const CLASS_MODEL_ELEMENT: &str = "ModelElement";

/// Designated short-identifier attribute on requirement definitions
pub const FIELD_REQ_ID: &str = "reqId";
/// Relation kind attribute on relationship elements
pub const FIELD_KIND: &str = "kind";
/// Source reference field on relationship elements
pub const FIELD_FROM: &str = "from";
/// Target reference field on relationship elements
pub const FIELD_TO: &str = "to";
/// Creation timestamp attribute, present on every element
pub const FIELD_CREATED_AT: &str = "createdAt";

/// Fields a partial update may never change
pub const IMMUTABLE_FIELDS: [&str; 3] = ["id", "className", FIELD_CREATED_AT];

/// A scalar or list attribute value.
///
/// Untagged so stored YAML reads naturally (`priority: high`, `tags: [a, b]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<AttrValue>),
}

impl AttrValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Short name of the value's shape, for messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            AttrValue::Null => "null",
            AttrValue::Bool(_) => "boolean",
            AttrValue::Int(_) => "integer",
            AttrValue::Float(_) => "float",
            AttrValue::Str(_) => "string",
            AttrValue::List(_) => "list",
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Null => write!(f, "~"),
            AttrValue::Bool(b) => write!(f, "{}", b),
            AttrValue::Int(i) => write!(f, "{}", i),
            AttrValue::Float(x) => write!(f, "{}", x),
            AttrValue::Str(s) => write!(f, "{}", s),
            AttrValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// A reference field's stored value: one target id or a list of them.
///
/// References are plain ids; they are dereferenced on demand through the
/// graph's id index, so nothing ever holds a direct pointer to an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RefValue {
    One(String),
    Many(Vec<String>),
}

impl RefValue {
    pub fn ids(&self) -> Vec<&str> {
        match self {
            RefValue::One(id) => vec![id.as_str()],
            RefValue::Many(ids) => ids.iter().map(String::as_str).collect(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        match self {
            RefValue::One(stored) => stored == id,
            RefValue::Many(ids) => ids.iter().any(|stored| stored == id),
        }
    }

    /// Removes `id` from the value. Returns true if it was present.
    /// A `One` value that matched becomes an empty `Many`.
    pub fn remove(&mut self, id: &str) -> bool {
        match self {
            RefValue::One(stored) => {
                if stored == id {
                    *self = RefValue::Many(Vec::new());
                    true
                } else {
                    false
                }
            }
            RefValue::Many(ids) => {
                let before = ids.len();
                ids.retain(|stored| stored != id);
                ids.len() != before
            }
        }
    }
}

/// A typed, identified node in the project graph: a requirement, a
/// relationship, or any other schema-defined entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Unique within the whole project graph
    pub id: String,

    /// Type tag, defined by the schema provider
    #[serde(rename = "className")]
    pub class_name: String,

    /// Attribute values keyed by field name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttrValue>,

    /// Reference targets keyed by field name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub references: BTreeMap<String, RefValue>,

    /// Id of the containing parent element; `None` for root elements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

impl Element {
    pub fn new(id: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            class_name: class_name.into(),
            attributes: BTreeMap::new(),
            references: BTreeMap::new(),
            container: None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    pub fn reference(&self, name: &str) -> Option<&RefValue> {
        self.references.get(name)
    }

    /// Single referenced id for `name`, if the field holds exactly one
    pub fn reference_id(&self, name: &str) -> Option<&str> {
        match self.references.get(name)? {
            RefValue::One(id) => Some(id.as_str()),
            RefValue::Many(ids) if ids.len() == 1 => Some(ids[0].as_str()),
            RefValue::Many(_) => None,
        }
    }
}

/// The four relation kinds a relationship element may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Derive,
    Satisfy,
    Refine,
    Trace,
}

impl RelationKind {
    pub const ALL: [RelationKind; 4] = [
        RelationKind::Derive,
        RelationKind::Satisfy,
        RelationKind::Refine,
        RelationKind::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Derive => "derive",
            RelationKind::Satisfy => "satisfy",
            RelationKind::Refine => "refine",
            RelationKind::Trace => "trace",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RelationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "derive" => Ok(RelationKind::Derive),
            "satisfy" => Ok(RelationKind::Satisfy),
            "refine" => Ok(RelationKind::Refine),
            "trace" => Ok(RelationKind::Trace),
            _ => Err(CoreError::InvalidRelationKind(s.to_string())),
        }
    }
}

/// Relation kind carried by a relationship element, if its class and `kind`
/// attribute are well-formed
pub fn relation_kind_of(element: &Element) -> Option<RelationKind> {
    if element.class_name != CLASS_RELATIONSHIP {
        return None;
    }
    element.attribute(FIELD_KIND)?.as_str()?.parse().ok()
}

/// The full object graph of one project: an id-indexed arena of elements
/// plus the ordered list of root element ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelGraph {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub elements: BTreeMap<String, Element>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roots: Vec<String>,
}

impl ModelGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.elements.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Element> {
        self.elements.get_mut(id)
    }

    /// Inserts an element into the arena without touching the root list.
    /// Used for contained children; the caller wires the containment field.
    pub fn insert(&mut self, element: Element) -> crate::error::Result<()> {
        if self.elements.contains_key(&element.id) {
            return Err(CoreError::DuplicateId(element.id));
        }
        self.elements.insert(element.id.clone(), element);
        Ok(())
    }

    /// Inserts an element and appends it to the root list
    pub fn insert_root(&mut self, element: Element) -> crate::error::Result<()> {
        let id = element.id.clone();
        self.insert(element)?;
        self.roots.push(id);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<Element> {
        self.roots.retain(|root| root != id);
        self.elements.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_kind_round_trip() {
        for kind in RelationKind::ALL {
            assert_eq!(kind.as_str().parse::<RelationKind>().unwrap(), kind);
        }
        assert_eq!("DERIVE".parse::<RelationKind>().unwrap(), RelationKind::Derive);
    }

    #[test]
    fn test_relation_kind_rejects_unknown() {
        let err = "implements".parse::<RelationKind>().unwrap_err();
        assert!(err.to_string().contains("invalid relation kind"));
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let mut graph = ModelGraph::new();
        graph.insert_root(Element::new("e-1", "Package")).unwrap();
        let err = graph.insert(Element::new("e-1", "Package")).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateId(_)));
    }

    #[test]
    fn test_remove_detaches_root() {
        let mut graph = ModelGraph::new();
        graph.insert_root(Element::new("e-1", "Package")).unwrap();
        assert!(graph.remove("e-1").is_some());
        assert!(graph.roots.is_empty());
        assert!(graph.remove("e-1").is_none());
    }

    #[test]
    fn test_ref_value_remove() {
        let mut many = RefValue::Many(vec!["a".into(), "b".into()]);
        assert!(many.remove("a"));
        assert!(!many.remove("a"));
        assert_eq!(many.ids(), vec!["b"]);

        let mut one = RefValue::One("x".into());
        assert!(one.remove("x"));
        assert!(one.ids().is_empty());
    }

    #[test]
    fn test_attr_value_yaml_round_trip() {
        let value = AttrValue::List(vec![
            AttrValue::Str("high".into()),
            AttrValue::Int(3),
            AttrValue::Bool(true),
        ]);
        let text = serde_yaml::to_string(&value).unwrap();
        let back: AttrValue = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_element_yaml_round_trip() {
        let mut element = Element::new("req-1", "RequirementDefinition");
        element
            .attributes
            .insert("reqId".into(), AttrValue::Str("SR-001".into()));
        element
            .references
            .insert("from".into(), RefValue::One("other".into()));

        let text = serde_yaml::to_string(&element).unwrap();
        let back: Element = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back, element);
    }
}
