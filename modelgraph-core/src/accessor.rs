//! Generic attribute access driven by the schema provider.
//!
//! This is the uniform accessor that lets the store handle a large,
//! heterogeneous class set without per-class code. Failures to set a field
//! (unknown name, wrong shape, coercion failure) are reported as `false`,
//! never raised, so callers with partial knowledge of the schema can apply
//! whatever subset of fields they carry.

use chrono::DateTime;

use crate::models::{AttrValue, Element};
use crate::schema::{AttrType, FieldDef, SchemaProvider};

pub struct AttributeAccessor<'a> {
    schema: &'a dyn SchemaProvider,
}

impl<'a> AttributeAccessor<'a> {
    pub fn new(schema: &'a dyn SchemaProvider) -> Self {
        Self { schema }
    }

    /// Sets `field` on `element` if the class declares it as an attribute.
    ///
    /// Multi-valued fields are cleared and rewritten: a scalar value becomes
    /// a one-element list, a list value replaces the whole list. A list value
    /// offered to a single-valued field is rejected and the field is left
    /// untouched. Returns whether the field was written.
    pub fn set_if_exists(&self, element: &mut Element, field: &str, value: AttrValue) -> bool {
        let Some(def) = self.schema.field(&element.class_name, field) else {
            return false;
        };
        let FieldDef::Attribute { value_type, many, .. } = def else {
            // Reference fields go through the resolver
            return false;
        };

        if *many {
            let items = match value {
                AttrValue::List(items) => items,
                AttrValue::Null => return false,
                scalar => vec![scalar],
            };
            let mut coerced = Vec::with_capacity(items.len());
            for item in items {
                match coerce(item, *value_type) {
                    Some(item) => coerced.push(item),
                    None => return false,
                }
            }
            element
                .attributes
                .insert(field.to_string(), AttrValue::List(coerced));
            true
        } else {
            if matches!(value, AttrValue::List(_)) {
                return false;
            }
            match coerce(value, *value_type) {
                Some(value) => {
                    element.attributes.insert(field.to_string(), value);
                    true
                }
                None => false,
            }
        }
    }

    /// Raw stored value of `field`, if the class declares it as an attribute
    /// and the element carries a value for it.
    pub fn get_value<'e>(&self, element: &'e Element, field: &str) -> Option<&'e AttrValue> {
        let def = self.schema.field(&element.class_name, field)?;
        if !def.is_attribute() {
            return None;
        }
        element.attributes.get(field)
    }
}

/// Coerces a scalar into the declared attribute type. `None` on mismatch.
fn coerce(value: AttrValue, ty: AttrType) -> Option<AttrValue> {
    match (value, ty) {
        (AttrValue::Str(s), AttrType::String) => Some(AttrValue::Str(s)),
        (AttrValue::Int(i), AttrType::Integer) => Some(AttrValue::Int(i)),
        (AttrValue::Int(i), AttrType::Float) => Some(AttrValue::Float(i as f64)),
        (AttrValue::Float(x), AttrType::Float) => Some(AttrValue::Float(x)),
        (AttrValue::Bool(b), AttrType::Boolean) => Some(AttrValue::Bool(b)),
        (AttrValue::Str(s), AttrType::Timestamp) => {
            DateTime::parse_from_rfc3339(&s).ok()?;
            Some(AttrValue::Str(s))
        }
        _ => None,
    }
}
