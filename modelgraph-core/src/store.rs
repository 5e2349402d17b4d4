//! Element store: schema-driven CRUD over the full object graph of a project.
//!
//! Every mutating call is a read-modify-write of the whole graph through the
//! storage backend, guarded by one in-process mutex per project id on top of
//! the backend's advisory file lock. All operations take an explicit project
//! id; there is no implicit default project.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::accessor::AttributeAccessor;
use crate::error::{CoreError, Result};
use crate::models::{
    relation_kind_of, AttrValue, Element, ModelGraph, RefValue, RelationKind,
    CLASS_RELATIONSHIP, FIELD_CREATED_AT, FIELD_FROM, FIELD_KIND, FIELD_TO, IMMUTABLE_FIELDS,
};
use crate::resolver::ReferenceResolver;
use crate::schema::{FieldDef, SchemaProvider};
use crate::storage::StorageBackend;
use crate::validation::{ValidationEngine, ValidationReport};

/// Query options for [`ElementStore::query`]
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    /// Exact class name to keep; `None` keeps everything
    pub class_name: Option<String>,
    pub offset: usize,
    pub limit: Option<usize>,
}

/// Result of a relation-creation call. `created` distinguishes a fresh
/// relationship from an idempotent return of a pre-existing one.
#[derive(Debug, Clone)]
pub struct RelationOutcome {
    pub element: Element,
    pub created: bool,
}

pub struct ElementStore {
    backend: Box<dyn StorageBackend>,
    schema: Arc<dyn SchemaProvider>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ElementStore {
    pub fn new(backend: Box<dyn StorageBackend>, schema: Arc<dyn SchemaProvider>) -> Self {
        Self {
            backend,
            schema,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn schema(&self) -> &dyn SchemaProvider {
        &*self.schema
    }

    fn project_lock(&self, project: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(project.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn guard(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
        lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates an element of `class_name`, applies `attributes` through the
    /// generic accessor (unknown keys are ignored) and persists the graph.
    ///
    /// With `container` set, the element is appended to the container's first
    /// containment collection whose target type fits; otherwise it becomes a
    /// root element. An `id` attribute overrides the generated id.
    pub fn create(
        &self,
        project: &str,
        class_name: &str,
        attributes: BTreeMap<String, AttrValue>,
        container: Option<&str>,
    ) -> Result<Element> {
        if !self.schema.has_class(class_name) {
            return Err(CoreError::UnknownClass(class_name.to_string()));
        }

        let lock = self.project_lock(project);
        let _guard = Self::guard(&lock);
        let mut graph = self.backend.load(project)?;

        let id = match attributes.get("id").and_then(AttrValue::as_str) {
            Some(explicit) if !explicit.is_empty() => explicit.to_string(),
            _ => format!("{}-{}", class_name.to_lowercase(), Uuid::new_v4()),
        };
        if graph.contains(&id) {
            return Err(CoreError::DuplicateId(id));
        }

        let mut element = Element::new(id, class_name);
        let accessor = AttributeAccessor::new(&*self.schema);
        for (name, value) in attributes {
            if name == "id" {
                continue;
            }
            let _ = accessor.set_if_exists(&mut element, &name, value);
        }
        if element.attribute(FIELD_CREATED_AT).is_none() {
            let _ = accessor.set_if_exists(
                &mut element,
                FIELD_CREATED_AT,
                AttrValue::Str(Utc::now().to_rfc3339()),
            );
        }

        let created = match container {
            Some(container_id) => {
                let container_el = graph
                    .get(container_id)
                    .ok_or_else(|| CoreError::NotFound(container_id.to_string()))?;
                let slot = self.containment_slot(container_el, class_name)?;

                element.container = Some(container_id.to_string());
                let child_id = element.id.clone();
                let created = element.clone();
                graph.insert(element)?;

                let Some(container_el) = graph.get_mut(container_id) else {
                    return Err(CoreError::NotFound(container_id.to_string()));
                };
                append_child(container_el, &slot, child_id);
                created
            }
            None => {
                let created = element.clone();
                graph.insert_root(element)?;
                created
            }
        };

        self.backend.save(project, &graph)?;
        tracing::debug!(project, id = %created.id, class = class_name, "created element");
        Ok(created)
    }

    /// Looks up an element by id through the graph's id index
    pub fn find(&self, project: &str, id: &str) -> Result<Option<Element>> {
        let graph = self.backend.load(project)?;
        Ok(graph.get(id).cloned())
    }

    /// All elements in deterministic depth-first order (roots in insertion
    /// order, children through containment fields in schema field order),
    /// optionally filtered by exact class name and paginated.
    pub fn query(&self, project: &str, filter: &QueryFilter) -> Result<Vec<Element>> {
        let graph = self.backend.load(project)?;
        let order = self.traversal_order(&graph);

        let elements = order
            .into_iter()
            .filter_map(|id| graph.get(&id).cloned())
            .filter(|element| match &filter.class_name {
                Some(class) => element.class_name == *class,
                None => true,
            })
            .skip(filter.offset);

        Ok(match filter.limit {
            Some(limit) => elements.take(limit).collect(),
            None => elements.collect(),
        })
    }

    /// Applies a partial update. `Null` values mean "leave unchanged";
    /// immutable fields (id, class, creation timestamp) are skipped; unknown
    /// or ill-typed fields are ignored per the accessor contract.
    pub fn update(
        &self,
        project: &str,
        id: &str,
        patch: BTreeMap<String, AttrValue>,
    ) -> Result<Element> {
        let lock = self.project_lock(project);
        let _guard = Self::guard(&lock);
        let mut graph = self.backend.load(project)?;

        let element = graph
            .get_mut(id)
            .ok_or_else(|| CoreError::NotFound(id.to_string()))?;
        let accessor = AttributeAccessor::new(&*self.schema);
        for (name, value) in patch {
            if value.is_null() || IMMUTABLE_FIELDS.contains(&name.as_str()) {
                continue;
            }
            let _ = accessor.set_if_exists(element, &name, value);
        }
        let updated = element.clone();

        self.backend.save(project, &graph)?;
        tracing::debug!(project, id, "updated element");
        Ok(updated)
    }

    /// Removes the element and everything it contains. Returns whether
    /// anything was removed; the graph is only re-persisted when it was.
    pub fn delete(&self, project: &str, id: &str) -> Result<bool> {
        let lock = self.project_lock(project);
        let _guard = Self::guard(&lock);
        let mut graph = self.backend.load(project)?;

        if !graph.contains(id) {
            return Ok(false);
        }

        // Detach from the containing collection or the root list
        if let Some(parent_id) = graph.get(id).and_then(|e| e.container.clone()) {
            let containment_fields: Vec<String> = graph
                .get(&parent_id)
                .map(|parent| self.containment_field_names(&parent.class_name))
                .unwrap_or_default();
            if let Some(parent) = graph.get_mut(&parent_id) {
                for field in containment_fields {
                    if let Some(value) = parent.references.get_mut(&field) {
                        value.remove(id);
                    }
                }
            }
        }

        for victim in self.containment_subtree(&graph, id) {
            graph.remove(&victim);
        }

        self.backend.save(project, &graph)?;
        tracing::debug!(project, id, "deleted element");
        Ok(true)
    }

    /// Creates a directed relationship element between two existing elements.
    ///
    /// An existing `(from, to, kind)` triple is returned as-is with
    /// `created: false` instead of creating a duplicate.
    pub fn create_relation(
        &self,
        project: &str,
        kind: RelationKind,
        from_id: &str,
        to_id: &str,
    ) -> Result<RelationOutcome> {
        if from_id == to_id {
            return Err(CoreError::SelfReference);
        }

        let lock = self.project_lock(project);
        let _guard = Self::guard(&lock);
        let mut graph = self.backend.load(project)?;

        for endpoint in [from_id, to_id] {
            if !graph.contains(endpoint) {
                return Err(CoreError::ReferenceTargetNotFound(endpoint.to_string()));
            }
        }

        if let Some(existing) = graph.elements.values().find(|element| {
            relation_kind_of(element) == Some(kind)
                && element.reference_id(FIELD_FROM) == Some(from_id)
                && element.reference_id(FIELD_TO) == Some(to_id)
        }) {
            return Ok(RelationOutcome {
                element: existing.clone(),
                created: false,
            });
        }

        let id = format!("relationship-{}", Uuid::new_v4());
        let mut element = Element::new(&id, CLASS_RELATIONSHIP);
        let accessor = AttributeAccessor::new(&*self.schema);
        let _ = accessor.set_if_exists(
            &mut element,
            FIELD_KIND,
            AttrValue::Str(kind.as_str().to_string()),
        );
        let _ = accessor.set_if_exists(
            &mut element,
            FIELD_CREATED_AT,
            AttrValue::Str(Utc::now().to_rfc3339()),
        );
        graph.insert_root(element)?;

        let resolver = ReferenceResolver::new(&*self.schema);
        resolver.set_reference(&mut graph, &id, FIELD_FROM, from_id)?;
        resolver.set_reference(&mut graph, &id, FIELD_TO, to_id)?;

        let element = graph
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(id.clone()))?;
        self.backend.save(project, &graph)?;
        tracing::debug!(project, id = %element.id, kind = %kind, from = from_id, to = to_id, "created relationship");
        Ok(RelationOutcome {
            element,
            created: true,
        })
    }

    /// Resolves and stores a reference on an existing element, then persists
    pub fn set_reference(
        &self,
        project: &str,
        element_id: &str,
        field: &str,
        target_id: &str,
    ) -> Result<Element> {
        let lock = self.project_lock(project);
        let _guard = Self::guard(&lock);
        let mut graph = self.backend.load(project)?;

        let resolver = ReferenceResolver::new(&*self.schema);
        resolver.set_reference(&mut graph, element_id, field, target_id)?;
        let updated = graph
            .get(element_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(element_id.to_string()))?;

        self.backend.save(project, &graph)?;
        Ok(updated)
    }

    /// Runs the validation engine over the project's current graph
    pub fn validate(&self, project: &str) -> Result<ValidationReport> {
        let graph = self.backend.load(project)?;
        Ok(ValidationEngine::new(&*self.schema).validate(&graph))
    }

    /// Count of dangling non-containment reference targets
    pub fn reference_integrity(&self, project: &str) -> Result<usize> {
        let graph = self.backend.load(project)?;
        Ok(ReferenceResolver::new(&*self.schema).validate_reference_integrity(&graph))
    }

    /// First containment field on the container's class that can hold an
    /// element of `class_name`. A single-valued slot that is already
    /// occupied is passed over.
    fn containment_slot(&self, container: &Element, class_name: &str) -> Result<FieldDef> {
        let fields = self
            .schema
            .fields_of(&container.class_name)
            .ok_or_else(|| CoreError::UnknownClass(container.class_name.clone()))?;

        for field in fields {
            let FieldDef::Reference {
                name,
                target_type,
                containment: true,
                many,
            } = field
            else {
                continue;
            };
            if !self.schema.is_subtype_of(class_name, target_type) {
                continue;
            }
            if !many {
                let occupied = container
                    .references
                    .get(name)
                    .map(|value| !value.ids().is_empty())
                    .unwrap_or(false);
                if occupied {
                    continue;
                }
            }
            return Ok(field.clone());
        }

        Err(CoreError::NoContainmentField {
            container_class: container.class_name.clone(),
            class: class_name.to_string(),
        })
    }

    fn containment_field_names(&self, class_name: &str) -> Vec<String> {
        self.schema
            .fields_of(class_name)
            .map(|fields| {
                fields
                    .iter()
                    .filter(|f| f.is_containment())
                    .map(|f| f.name().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ids of `id` and every element transitively contained in it
    fn containment_subtree(&self, graph: &ModelGraph, id: &str) -> Vec<String> {
        let mut subtree = Vec::new();
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(element) = graph.get(&current) {
                for field in self.containment_field_names(&element.class_name) {
                    if let Some(value) = element.references.get(&field) {
                        stack.extend(value.ids().iter().map(|s| s.to_string()));
                    }
                }
            }
            subtree.push(current);
        }
        subtree
    }

    /// Deterministic depth-first id order over the whole graph. Elements
    /// unreachable from the root list (hand-edited stores) come last, in id
    /// order.
    fn traversal_order(&self, graph: &ModelGraph) -> Vec<String> {
        let mut order = Vec::with_capacity(graph.len());
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut stack: Vec<String> = graph.roots.iter().rev().cloned().collect();

        while let Some(id) = stack.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let Some(element) = graph.get(&id) else {
                continue;
            };
            order.push(id);

            let mut children: Vec<&str> = Vec::new();
            for field in self.containment_field_names(&element.class_name) {
                if let Some(value) = element.references.get(&field) {
                    children.extend(value.ids());
                }
            }
            for child in children.into_iter().rev() {
                stack.push(child.to_string());
            }
        }

        for id in graph.elements.keys() {
            if !visited.contains(id) {
                order.push(id.clone());
            }
        }
        order
    }
}

/// Appends a child id to the container's containment slot, respecting the
/// slot's multiplicity
fn append_child(container: &mut Element, slot: &FieldDef, child_id: String) {
    let name = slot.name().to_string();
    if slot.is_many() {
        match container.references.get_mut(&name) {
            Some(RefValue::Many(ids)) => ids.push(child_id),
            Some(one @ RefValue::One(_)) => {
                let mut ids: Vec<String> = one.ids().iter().map(|s| s.to_string()).collect();
                ids.push(child_id);
                *one = RefValue::Many(ids);
            }
            None => {
                container
                    .references
                    .insert(name, RefValue::Many(vec![child_id]));
            }
        }
    } else {
        container.references.insert(name, RefValue::One(child_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use crate::storage::YamlBackend;
    use crate::validation::RuleCode;
    use tempfile::TempDir;

    const PROJECT: &str = "test";

    fn store() -> (ElementStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let backend = YamlBackend::new(dir.path());
        let schema: Arc<dyn SchemaProvider> = Arc::new(SchemaRegistry::builtin());
        (ElementStore::new(Box::new(backend), schema), dir)
    }

    fn attrs(pairs: &[(&str, AttrValue)]) -> BTreeMap<String, AttrValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn new_requirement(store: &ElementStore, req_id: &str) -> Element {
        store
            .create(
                PROJECT,
                "RequirementDefinition",
                attrs(&[
                    ("reqId", AttrValue::Str(req_id.into())),
                    ("text", AttrValue::Str(format!("the system shall {}", req_id))),
                ]),
                None,
            )
            .unwrap()
    }

    #[test]
    fn test_create_unknown_class_fails_without_mutation() {
        let (store, _dir) = store();

        let err = store
            .create(PROJECT, "NoSuchClass", BTreeMap::new(), None)
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownClass(_)));
        assert!(store.query(PROJECT, &QueryFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_create_then_find_round_trips_attributes() {
        let (store, _dir) = store();
        let created = new_requirement(&store, "SR-001");

        let found = store.find(PROJECT, &created.id).unwrap().unwrap();
        assert_eq!(found, created);
        assert_eq!(found.attribute("reqId"), Some(&AttrValue::Str("SR-001".into())));
        assert!(found.attribute(FIELD_CREATED_AT).is_some());
    }

    #[test]
    fn test_generated_id_carries_class_prefix() {
        let (store, _dir) = store();
        let created = new_requirement(&store, "SR-001");
        assert!(created.id.starts_with("requirementdefinition-"));
    }

    #[test]
    fn test_explicit_id_is_honored_and_duplicates_rejected() {
        let (store, _dir) = store();
        let created = store
            .create(
                PROJECT,
                "Package",
                attrs(&[("id", AttrValue::Str("pkg-main".into()))]),
                None,
            )
            .unwrap();
        assert_eq!(created.id, "pkg-main");

        let err = store
            .create(
                PROJECT,
                "Package",
                attrs(&[("id", AttrValue::Str("pkg-main".into()))]),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateId(_)));
    }

    #[test]
    fn test_unknown_attributes_are_ignored_at_creation() {
        let (store, _dir) = store();
        let created = store
            .create(
                PROJECT,
                "RequirementDefinition",
                attrs(&[
                    ("reqId", AttrValue::Str("SR-001".into())),
                    ("mystery", AttrValue::Str("ignored".into())),
                ]),
                None,
            )
            .unwrap();
        assert!(created.attribute("mystery").is_none());
        assert_eq!(created.attribute("reqId"), Some(&AttrValue::Str("SR-001".into())));
    }

    #[test]
    fn test_create_under_container_wires_both_sides() {
        let (store, _dir) = store();
        let folder = store
            .create(
                PROJECT,
                "RequirementsFolder",
                attrs(&[("name", AttrValue::Str("system".into()))]),
                None,
            )
            .unwrap();
        let child = store
            .create(
                PROJECT,
                "RequirementDefinition",
                attrs(&[("reqId", AttrValue::Str("SR-001".into()))]),
                Some(&folder.id),
            )
            .unwrap();

        assert_eq!(child.container.as_deref(), Some(folder.id.as_str()));
        let folder = store.find(PROJECT, &folder.id).unwrap().unwrap();
        assert!(folder
            .reference("ownedRequirements")
            .unwrap()
            .contains(&child.id));
        // Contained elements are not roots
        let all = store.query(PROJECT, &QueryFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_create_under_unfit_container_fails() {
        let (store, _dir) = store();
        let req = new_requirement(&store, "SR-001");

        // A requirement has no containment field that can hold a package
        let err = store
            .create(PROJECT, "Package", BTreeMap::new(), Some(&req.id))
            .unwrap_err();
        assert!(matches!(err, CoreError::NoContainmentField { .. }));
    }

    #[test]
    fn test_query_depth_first_parent_before_child() {
        let (store, _dir) = store();
        let folder = store
            .create(PROJECT, "RequirementsFolder", BTreeMap::new(), None)
            .unwrap();
        let child = store
            .create(
                PROJECT,
                "RequirementDefinition",
                attrs(&[("reqId", AttrValue::Str("SR-001".into()))]),
                Some(&folder.id),
            )
            .unwrap();
        let sibling = store
            .create(PROJECT, "Package", BTreeMap::new(), None)
            .unwrap();

        let ids: Vec<String> = store
            .query(PROJECT, &QueryFilter::default())
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![folder.id, child.id, sibling.id]);
    }

    #[test]
    fn test_query_class_filter_and_pagination() {
        let (store, _dir) = store();
        for i in 0..5 {
            new_requirement(&store, &format!("SR-{:03}", i));
        }
        store.create(PROJECT, "Package", BTreeMap::new(), None).unwrap();

        let reqs = store
            .query(
                PROJECT,
                &QueryFilter {
                    class_name: Some("RequirementDefinition".into()),
                    ..QueryFilter::default()
                },
            )
            .unwrap();
        assert_eq!(reqs.len(), 5);

        let page = store
            .query(
                PROJECT,
                &QueryFilter {
                    class_name: Some("RequirementDefinition".into()),
                    offset: 2,
                    limit: Some(2),
                },
            )
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, reqs[2].id);

        // Exact match only; subtypes are not included
        let functional = store
            .query(
                PROJECT,
                &QueryFilter {
                    class_name: Some("FunctionalRequirement".into()),
                    ..QueryFilter::default()
                },
            )
            .unwrap();
        assert!(functional.is_empty());
    }

    #[test]
    fn test_update_applies_patch_and_skips_null() {
        let (store, _dir) = store();
        let created = new_requirement(&store, "SR-001");

        let updated = store
            .update(
                PROJECT,
                &created.id,
                attrs(&[
                    ("text", AttrValue::Str("revised".into())),
                    ("reqId", AttrValue::Null),
                ]),
            )
            .unwrap();
        assert_eq!(updated.attribute("text"), Some(&AttrValue::Str("revised".into())));
        // Null means "leave unchanged", never "clear"
        assert_eq!(updated.attribute("reqId"), Some(&AttrValue::Str("SR-001".into())));
    }

    #[test]
    fn test_update_skips_immutable_fields() {
        let (store, _dir) = store();
        let created = new_requirement(&store, "SR-001");
        let original_created_at = created.attribute(FIELD_CREATED_AT).cloned();

        let updated = store
            .update(
                PROJECT,
                &created.id,
                attrs(&[
                    (FIELD_CREATED_AT, AttrValue::Str("1999-01-01T00:00:00Z".into())),
                    ("id", AttrValue::Str("hijacked".into())),
                ]),
            )
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.attribute(FIELD_CREATED_AT).cloned(), original_created_at);
    }

    #[test]
    fn test_update_missing_element_fails() {
        let (store, _dir) = store();
        let err = store.update(PROJECT, "ghost", BTreeMap::new()).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn test_delete_root_element() {
        let (store, _dir) = store();
        let created = new_requirement(&store, "SR-001");

        assert!(store.delete(PROJECT, &created.id).unwrap());
        assert!(store.find(PROJECT, &created.id).unwrap().is_none());
        assert!(!store.delete(PROJECT, &created.id).unwrap());
    }

    #[test]
    fn test_delete_container_drops_contained_subtree() {
        let (store, _dir) = store();
        let outer = store
            .create(PROJECT, "RequirementsFolder", BTreeMap::new(), None)
            .unwrap();
        let inner = store
            .create(PROJECT, "RequirementsFolder", BTreeMap::new(), Some(&outer.id))
            .unwrap();
        let leaf = store
            .create(
                PROJECT,
                "RequirementDefinition",
                attrs(&[("reqId", AttrValue::Str("SR-001".into()))]),
                Some(&inner.id),
            )
            .unwrap();

        assert!(store.delete(PROJECT, &outer.id).unwrap());
        for id in [&outer.id, &inner.id, &leaf.id] {
            assert!(store.find(PROJECT, id).unwrap().is_none());
        }
    }

    #[test]
    fn test_delete_child_detaches_from_container() {
        let (store, _dir) = store();
        let folder = store
            .create(PROJECT, "RequirementsFolder", BTreeMap::new(), None)
            .unwrap();
        let child = store
            .create(
                PROJECT,
                "RequirementDefinition",
                attrs(&[("reqId", AttrValue::Str("SR-001".into()))]),
                Some(&folder.id),
            )
            .unwrap();

        assert!(store.delete(PROJECT, &child.id).unwrap());
        let folder = store.find(PROJECT, &folder.id).unwrap().unwrap();
        assert!(!folder
            .reference("ownedRequirements")
            .map(|v| v.contains(&child.id))
            .unwrap_or(false));
    }

    #[test]
    fn test_create_relation_is_idempotent() {
        let (store, _dir) = store();
        let a = new_requirement(&store, "SR-001");
        let b = new_requirement(&store, "SR-002");

        let first = store
            .create_relation(PROJECT, RelationKind::Derive, &a.id, &b.id)
            .unwrap();
        assert!(first.created);

        let second = store
            .create_relation(PROJECT, RelationKind::Derive, &a.id, &b.id)
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.element.id, first.element.id);

        let relationships = store
            .query(
                PROJECT,
                &QueryFilter {
                    class_name: Some(CLASS_RELATIONSHIP.into()),
                    ..QueryFilter::default()
                },
            )
            .unwrap();
        assert_eq!(relationships.len(), 1);
    }

    #[test]
    fn test_same_endpoints_different_kind_is_a_new_relation() {
        let (store, _dir) = store();
        let a = new_requirement(&store, "SR-001");
        let b = new_requirement(&store, "SR-002");

        let derive = store
            .create_relation(PROJECT, RelationKind::Derive, &a.id, &b.id)
            .unwrap();
        let trace = store
            .create_relation(PROJECT, RelationKind::Trace, &a.id, &b.id)
            .unwrap();
        assert!(trace.created);
        assert_ne!(trace.element.id, derive.element.id);
    }

    #[test]
    fn test_self_relation_is_rejected_for_every_kind() {
        let (store, _dir) = store();
        let a = new_requirement(&store, "SR-001");

        for kind in RelationKind::ALL {
            let err = store
                .create_relation(PROJECT, kind, &a.id, &a.id)
                .unwrap_err();
            assert!(matches!(err, CoreError::SelfReference));
        }
    }

    #[test]
    fn test_relation_to_missing_target_is_rejected() {
        let (store, _dir) = store();
        let a = new_requirement(&store, "SR-001");

        let err = store
            .create_relation(PROJECT, RelationKind::Satisfy, &a.id, "ghost")
            .unwrap_err();
        assert!(matches!(err, CoreError::ReferenceTargetNotFound(_)));
    }

    #[test]
    fn test_validate_reflects_store_contents() {
        let (store, _dir) = store();
        let a = new_requirement(&store, "SR-001");
        let b = new_requirement(&store, "SR-002");
        store
            .create_relation(PROJECT, RelationKind::Satisfy, &a.id, &b.id)
            .unwrap();

        let report = store.validate(PROJECT).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.element_count, 3);

        // Deleting an endpoint leaves the relationship dangling
        store.delete(PROJECT, &b.id).unwrap();
        let report = store.validate(PROJECT).unwrap();
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].rule_code, RuleCode::BrokenRef);
        assert_eq!(report.violations[0].details.get("missingId").unwrap(), &b.id);
    }

    #[test]
    fn test_reference_integrity_counts_broken_targets() {
        let (store, _dir) = store();
        let a = new_requirement(&store, "SR-001");
        let b = new_requirement(&store, "SR-002");
        store
            .create_relation(PROJECT, RelationKind::Trace, &a.id, &b.id)
            .unwrap();

        assert_eq!(store.reference_integrity(PROJECT).unwrap(), 0);
        store.delete(PROJECT, &b.id).unwrap();
        assert_eq!(store.reference_integrity(PROJECT).unwrap(), 1);
    }

    #[test]
    fn test_set_reference_persists() {
        let (store, _dir) = store();
        let component = store
            .create(PROJECT, "LogicalComponent", BTreeMap::new(), None)
            .unwrap();
        let usage = store
            .create(PROJECT, "FunctionUsage", BTreeMap::new(), None)
            .unwrap();

        let updated = store
            .set_reference(PROJECT, &usage.id, "of", &component.id)
            .unwrap();
        assert_eq!(updated.reference_id("of"), Some(component.id.as_str()));

        let reloaded = store.find(PROJECT, &usage.id).unwrap().unwrap();
        assert_eq!(reloaded.reference_id("of"), Some(component.id.as_str()));
    }
}
