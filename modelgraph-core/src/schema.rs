//! Schema provider: class and field definitions, including inheritance.
//!
//! The schema is supplied at runtime (a YAML document or the built-in class
//! set) and consumed read-only by the accessor, resolver and store. Class
//! hierarchies are flattened once at load time so no component ever walks a
//! parent chain at call time.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::{CoreError, Result};

/// Value type of a scalar attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrType {
    String,
    Integer,
    Float,
    Boolean,
    /// RFC 3339 timestamp, stored as a string
    Timestamp,
}

/// A single field declared on a class: either a plain attribute or a
/// reference to another element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldDef {
    Attribute {
        name: String,
        #[serde(rename = "type")]
        value_type: AttrType,
        #[serde(default)]
        many: bool,
    },
    Reference {
        name: String,
        #[serde(rename = "target")]
        target_type: String,
        #[serde(default)]
        containment: bool,
        #[serde(default)]
        many: bool,
    },
}

impl FieldDef {
    pub fn name(&self) -> &str {
        match self {
            FieldDef::Attribute { name, .. } => name,
            FieldDef::Reference { name, .. } => name,
        }
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self, FieldDef::Attribute { .. })
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldDef::Reference { .. })
    }

    pub fn is_containment(&self) -> bool {
        matches!(self, FieldDef::Reference { containment: true, .. })
    }

    pub fn is_many(&self) -> bool {
        match self {
            FieldDef::Attribute { many, .. } => *many,
            FieldDef::Reference { many, .. } => *many,
        }
    }
}

/// Read-only source of class field definitions, including inherited fields.
///
/// Implementations must return the *flattened* field list for a class: own
/// fields plus everything inherited from ancestors.
pub trait SchemaProvider: Send + Sync {
    /// Ordered field list for the class (inherited first, own fields after;
    /// an own field shadows an inherited field of the same name). `None` if
    /// the class is unknown.
    fn fields_of(&self, class_name: &str) -> Option<&[FieldDef]>;

    /// Whether `class_name` equals `ancestor` or transitively inherits from it.
    fn is_subtype_of(&self, class_name: &str, ancestor: &str) -> bool;

    /// Looks up a single field by name on the flattened field list.
    fn field(&self, class_name: &str, field_name: &str) -> Option<&FieldDef> {
        self.fields_of(class_name)?
            .iter()
            .find(|f| f.name() == field_name)
    }

    fn has_class(&self, class_name: &str) -> bool {
        self.fields_of(class_name).is_some()
    }
}

/// A class definition as written in a schema document, before flattening.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawClassDef {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

/// Top-level shape of a schema YAML document
#[derive(Debug, Deserialize)]
struct SchemaDoc {
    classes: Vec<RawClassDef>,
}

/// A class with its full inherited field list and ancestor set resolved.
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub parent: Option<String>,
    pub is_abstract: bool,
    /// Inherited fields first, own fields after; shadowed names replaced in place
    pub fields: Vec<FieldDef>,
    /// All ancestor class names, including the class itself
    pub ancestors: BTreeSet<String>,
}

/// Concrete [`SchemaProvider`] backed by a set of flattened class definitions.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    classes: BTreeMap<String, ClassDef>,
}

impl SchemaRegistry {
    /// Builds a registry from raw class definitions, resolving inheritance.
    ///
    /// Fails on duplicate class names, unknown parents, or hierarchy cycles.
    pub fn from_raw(raw: Vec<RawClassDef>) -> Result<Self> {
        let mut by_name: BTreeMap<String, RawClassDef> = BTreeMap::new();
        for class in raw {
            if by_name.contains_key(&class.name) {
                return Err(CoreError::Schema(format!(
                    "duplicate class definition: {}",
                    class.name
                )));
            }
            by_name.insert(class.name.clone(), class);
        }

        let mut classes = BTreeMap::new();
        for name in by_name.keys() {
            let resolved = resolve_class(name, &by_name)?;
            classes.insert(name.clone(), resolved);
        }

        Ok(Self { classes })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let doc: SchemaDoc = serde_yaml::from_str(text)?;
        Self::from_raw(doc.classes)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    /// All class definitions, sorted by name
    pub fn classes(&self) -> impl Iterator<Item = &ClassDef> {
        self.classes.values()
    }

    /// The built-in class set: requirement definitions, packages, components,
    /// usages and the relationship class, with the inheritance chain the rest
    /// of the crate relies on. Real deployments extend or replace it with a
    /// schema document of their own.
    pub fn builtin() -> Self {
        let attr = |name: &str, value_type: AttrType| FieldDef::Attribute {
            name: name.to_string(),
            value_type,
            many: false,
        };
        let attr_many = |name: &str, value_type: AttrType| FieldDef::Attribute {
            name: name.to_string(),
            value_type,
            many: true,
        };
        let reference = |name: &str, target: &str| FieldDef::Reference {
            name: name.to_string(),
            target_type: target.to_string(),
            containment: false,
            many: false,
        };
        let contains_many = |name: &str, target: &str| FieldDef::Reference {
            name: name.to_string(),
            target_type: target.to_string(),
            containment: true,
            many: true,
        };
        let class = |name: &str, parent: Option<&str>, is_abstract: bool, fields: Vec<FieldDef>| {
            RawClassDef {
                name: name.to_string(),
                parent: parent.map(str::to_string),
                is_abstract,
                fields,
            }
        };

        let raw = vec![
            class(
                "ModelElement",
                None,
                true,
                vec![attr("createdAt", AttrType::Timestamp)],
            ),
            class(
                "NamedElement",
                Some("ModelElement"),
                true,
                vec![
                    attr("name", AttrType::String),
                    attr("description", AttrType::String),
                ],
            ),
            class(
                "Package",
                Some("NamedElement"),
                false,
                vec![contains_many("ownedElements", "ModelElement")],
            ),
            class(
                "RequirementsFolder",
                Some("NamedElement"),
                false,
                vec![
                    contains_many("ownedFolders", "RequirementsFolder"),
                    contains_many("ownedRequirements", "RequirementDefinition"),
                ],
            ),
            class(
                "RequirementDefinition",
                Some("NamedElement"),
                false,
                vec![
                    attr("reqId", AttrType::String),
                    attr("text", AttrType::String),
                    attr("priority", AttrType::String),
                    attr("verificationMethod", AttrType::String),
                    attr_many("tags", AttrType::String),
                ],
            ),
            class(
                "FunctionalRequirement",
                Some("RequirementDefinition"),
                false,
                vec![],
            ),
            class(
                "InterfaceRequirement",
                Some("RequirementDefinition"),
                false,
                vec![attr("protocol", AttrType::String)],
            ),
            class(
                "PerformanceRequirement",
                Some("RequirementDefinition"),
                false,
                vec![
                    attr("threshold", AttrType::Float),
                    attr("unit", AttrType::String),
                ],
            ),
            class(
                "Component",
                Some("NamedElement"),
                true,
                vec![
                    contains_many("ownedUsages", "AbstractUsage"),
                    attr("multiplicity", AttrType::Integer),
                ],
            ),
            class("LogicalComponent", Some("Component"), false, vec![]),
            class("PhysicalComponent", Some("Component"), false, vec![]),
            class(
                "AbstractUsage",
                Some("NamedElement"),
                true,
                vec![reference("of", "Component")],
            ),
            class("FunctionUsage", Some("AbstractUsage"), false, vec![]),
            class("ComponentUsage", Some("AbstractUsage"), false, vec![]),
            class(
                "Relationship",
                Some("ModelElement"),
                false,
                vec![
                    attr("kind", AttrType::String),
                    reference("from", "ModelElement"),
                    reference("to", "ModelElement"),
                ],
            ),
        ];

        Self::from_raw(raw).expect("built-in schema is well-formed")
    }
}

impl SchemaProvider for SchemaRegistry {
    fn fields_of(&self, class_name: &str) -> Option<&[FieldDef]> {
        self.classes.get(class_name).map(|c| c.fields.as_slice())
    }

    fn is_subtype_of(&self, class_name: &str, ancestor: &str) -> bool {
        self.classes
            .get(class_name)
            .map(|c| c.ancestors.contains(ancestor))
            .unwrap_or(false)
    }
}

/// Resolves one class against the raw definition table, walking the parent
/// chain and flattening fields. Walks at most the chain length; cycles abort.
fn resolve_class(name: &str, by_name: &BTreeMap<String, RawClassDef>) -> Result<ClassDef> {
    // Collect the chain from root ancestor down to the class itself
    let mut chain: Vec<&RawClassDef> = Vec::new();
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut current = Some(name);
    while let Some(class_name) = current {
        if !seen.insert(class_name) {
            return Err(CoreError::Schema(format!(
                "inheritance cycle involving class {}",
                class_name
            )));
        }
        let raw = by_name.get(class_name).ok_or_else(|| {
            CoreError::Schema(format!(
                "class {} inherits from undefined class {}",
                name, class_name
            ))
        })?;
        chain.push(raw);
        current = raw.parent.as_deref();
    }
    chain.reverse();

    let mut fields: Vec<FieldDef> = Vec::new();
    for raw in &chain {
        for field in &raw.fields {
            // Own fields shadow inherited fields of the same name, in place
            if let Some(existing) = fields.iter_mut().find(|f| f.name() == field.name()) {
                *existing = field.clone();
            } else {
                fields.push(field.clone());
            }
        }
    }

    let ancestors: BTreeSet<String> = chain.iter().map(|r| r.name.clone()).collect();
    let own = chain.last().ok_or_else(|| {
        CoreError::Schema(format!("class {} resolved to an empty chain", name))
    })?;

    Ok(ClassDef {
        name: own.name.clone(),
        parent: own.parent.clone(),
        is_abstract: own.is_abstract,
        fields,
        ancestors,
    })
}
