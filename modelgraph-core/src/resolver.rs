//! Reference resolution: turning string identifiers into checked references
//! inside reference-typed fields.
//!
//! Unlike the attribute accessor, reference-setting calls fail loudly: the
//! field must be a declared reference and the target must exist with a
//! compatible class before anything is written.

use crate::error::{CoreError, Result};
use crate::models::{Element, ModelGraph, RefValue};
use crate::schema::{FieldDef, SchemaProvider};

pub struct ReferenceResolver<'a> {
    schema: &'a dyn SchemaProvider,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(schema: &'a dyn SchemaProvider) -> Self {
        Self { schema }
    }

    /// Resolves `target_id` and stores it in the reference field `field` of
    /// element `element_id`.
    ///
    /// The target must already exist when the reference is set; there is no
    /// deferred-resolution queue.
    pub fn set_reference(
        &self,
        graph: &mut ModelGraph,
        element_id: &str,
        field: &str,
        target_id: &str,
    ) -> Result<()> {
        let element = graph
            .get(element_id)
            .ok_or_else(|| CoreError::NotFound(element_id.to_string()))?;
        let class_name = element.class_name.clone();

        let def = self.schema.field(&class_name, field).ok_or_else(|| {
            CoreError::UnknownField {
                class: class_name.clone(),
                field: field.to_string(),
            }
        })?;
        let FieldDef::Reference {
            target_type, many, ..
        } = def
        else {
            return Err(CoreError::NotAReference(field.to_string()));
        };
        let target_type = target_type.clone();
        let many = *many;

        let target = graph
            .get(target_id)
            .ok_or_else(|| CoreError::ReferenceTargetNotFound(target_id.to_string()))?;
        if !self.schema.is_subtype_of(&target.class_name, &target_type) {
            return Err(CoreError::TypeMismatch {
                target_id: target_id.to_string(),
                actual: target.class_name.clone(),
                expected: target_type,
            });
        }

        let Some(element) = graph.get_mut(element_id) else {
            return Err(CoreError::NotFound(element_id.to_string()));
        };
        if many {
            match element.references.get_mut(field) {
                Some(RefValue::Many(ids)) => ids.push(target_id.to_string()),
                Some(one @ RefValue::One(_)) => {
                    let mut ids = one.ids().iter().map(|s| s.to_string()).collect::<Vec<_>>();
                    ids.push(target_id.to_string());
                    *one = RefValue::Many(ids);
                }
                None => {
                    element.references.insert(
                        field.to_string(),
                        RefValue::Many(vec![target_id.to_string()]),
                    );
                }
            }
        } else {
            element
                .references
                .insert(field.to_string(), RefValue::One(target_id.to_string()));
        }
        Ok(())
    }

    /// Extension point for a future batch-resolution pass over references
    /// recorded before their targets existed. Currently nothing is queued,
    /// so there is nothing to resolve.
    pub fn resolve_pending_references(&self, _project: &str) -> Result<()> {
        Ok(())
    }

    /// Counts non-containment reference targets that no longer belong to the
    /// graph. Diagnostic only; nothing is mutated or rejected.
    pub fn validate_reference_integrity(&self, graph: &ModelGraph) -> usize {
        let mut broken = 0;
        for element in graph.elements.values() {
            broken += self.broken_targets_of(element, graph);
        }
        broken
    }

    fn broken_targets_of(&self, element: &Element, graph: &ModelGraph) -> usize {
        let mut broken = 0;
        for (name, value) in &element.references {
            let containment = self
                .schema
                .field(&element.class_name, name)
                .map(FieldDef::is_containment)
                .unwrap_or(false);
            if containment {
                continue;
            }
            for id in value.ids() {
                if !graph.contains(id) {
                    broken += 1;
                }
            }
        }
        broken
    }
}
