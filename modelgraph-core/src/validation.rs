//! Integrity validation: three fixed consistency rules over the complete
//! element set of a project graph.
//!
//! The engine is diagnostic: it never mutates the graph and never fails.
//! Every finding is a data value in the returned report. All three rules are
//! near-linear in element count; none performs a nested full-graph scan per
//! element.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use crate::error::{CoreError, Result};
use crate::models::{
    relation_kind_of, Element, ModelGraph, RelationKind, CLASS_REQUIREMENT, CLASS_USAGE,
    FIELD_CREATED_AT, FIELD_FROM, FIELD_REQ_ID, FIELD_TO,
};
use crate::schema::SchemaProvider;

/// Report format version, bumped when the report shape changes
pub const REPORT_FORMAT_VERSION: &str = "1.0";

/// Stable rule codes; consumers must treat these as an enumerated set
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RuleCode {
    #[serde(rename = "DUP_REQID")]
    DupReqId,
    #[serde(rename = "CYCLE_DERIVE_REFINE")]
    CycleDeriveRefine,
    #[serde(rename = "BROKEN_REF")]
    BrokenRef,
}

impl std::fmt::Display for RuleCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            RuleCode::DupReqId => "DUP_REQID",
            RuleCode::CycleDeriveRefine => "CYCLE_DERIVE_REFINE",
            RuleCode::BrokenRef => "BROKEN_REF",
        };
        write!(f, "{}", code)
    }
}

/// One reported consistency-rule failure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub rule_code: RuleCode,
    /// Id of the offending element
    pub target_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

/// Result of one whole-graph validation pass.
///
/// Violations are ordered duplicates first, then cycles, then broken
/// references; no further ordering is guaranteed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
    pub validated_at: DateTime<Utc>,
    pub element_count: usize,
    pub processing_time_ms: u64,
    pub format_version: String,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

pub struct ValidationEngine<'a> {
    schema: &'a dyn SchemaProvider,
}

impl<'a> ValidationEngine<'a> {
    pub fn new(schema: &'a dyn SchemaProvider) -> Self {
        Self { schema }
    }

    /// Runs the three consistency rules over the current graph
    pub fn validate(&self, graph: &ModelGraph) -> ValidationReport {
        let started = Instant::now();

        let mut violations = self.check_duplicate_req_ids(graph);
        violations.extend(self.check_derive_refine_cycles(graph));
        violations.extend(self.check_broken_references(graph));

        let elapsed = started.elapsed();
        tracing::info!(
            elements = graph.len(),
            violations = violations.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "validation pass complete"
        );

        ValidationReport {
            violations,
            validated_at: Utc::now(),
            element_count: graph.len(),
            processing_time_ms: elapsed.as_millis() as u64,
            format_version: REPORT_FORMAT_VERSION.to_string(),
        }
    }

    /// DUP_REQID: requirement definitions grouped by their short identifier.
    /// Every group member beyond the first (in creation order) is flagged.
    fn check_duplicate_req_ids(&self, graph: &ModelGraph) -> Vec<Violation> {
        let mut groups: BTreeMap<&str, Vec<&Element>> = BTreeMap::new();
        for element in graph.elements.values() {
            if !self.schema.is_subtype_of(&element.class_name, CLASS_REQUIREMENT) {
                continue;
            }
            let Some(req_id) = element.attribute(FIELD_REQ_ID).and_then(|v| v.as_str()) else {
                continue;
            };
            if req_id.is_empty() {
                continue;
            }
            groups.entry(req_id).or_default().push(element);
        }

        let mut violations = Vec::new();
        for (req_id, mut members) in groups {
            if members.len() < 2 {
                continue;
            }
            members.sort_by_key(|e| {
                (
                    e.attribute(FIELD_CREATED_AT)
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string(),
                    e.id.clone(),
                )
            });
            let first = members[0].id.clone();
            for member in &members[1..] {
                let mut details = BTreeMap::new();
                details.insert("reqId".to_string(), req_id.to_string());
                details.insert("firstId".to_string(), first.clone());
                violations.push(Violation {
                    rule_code: RuleCode::DupReqId,
                    target_id: member.id.clone(),
                    message: format!(
                        "duplicate requirement identifier '{}' (first used by {})",
                        req_id, first
                    ),
                    details,
                });
            }
        }
        violations
    }

    /// CYCLE_DERIVE_REFINE: back-edge search over the directed graph formed
    /// by derive and refine relationships. Only the first cycle found is
    /// reported; the scan stops there.
    fn check_derive_refine_cycles(&self, graph: &ModelGraph) -> Vec<Violation> {
        let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for element in graph.elements.values() {
            match relation_kind_of(element) {
                Some(RelationKind::Derive) | Some(RelationKind::Refine) => {}
                _ => continue,
            }
            let (Some(from), Some(to)) = (
                element.reference_id(FIELD_FROM),
                element.reference_id(FIELD_TO),
            ) else {
                continue;
            };
            adjacency.entry(from).or_default().push(to);
        }

        let mut color: BTreeMap<&str, Color> = BTreeMap::new();
        let starts: Vec<&str> = adjacency.keys().copied().collect();
        for start in starts {
            if color.get(start).copied().unwrap_or(Color::White) != Color::White {
                continue;
            }
            if let Some((at, back_to)) = find_back_edge(start, &adjacency, &mut color) {
                let mut details = BTreeMap::new();
                details.insert("backEdgeTo".to_string(), back_to.to_string());
                return vec![Violation {
                    rule_code: RuleCode::CycleDeriveRefine,
                    target_id: at.to_string(),
                    message: format!(
                        "derive/refine cycle detected at '{}' (back edge to '{}')",
                        at, back_to
                    ),
                    details,
                }];
            }
        }
        Vec::new()
    }

    /// BROKEN_REF: every relationship endpoint must name an element that
    /// still belongs to the graph. One violation per missing endpoint.
    fn check_broken_references(&self, graph: &ModelGraph) -> Vec<Violation> {
        let known: BTreeSet<&str> = graph.elements.keys().map(String::as_str).collect();

        let mut violations = Vec::new();
        for element in graph.elements.values() {
            let Some(kind) = relation_kind_of(element) else {
                continue;
            };
            for endpoint in [FIELD_FROM, FIELD_TO] {
                let Some(value) = element.reference(endpoint) else {
                    violations.push(Violation {
                        rule_code: RuleCode::BrokenRef,
                        target_id: element.id.clone(),
                        message: format!(
                            "{} relationship '{}' has no '{}' endpoint",
                            kind, element.id, endpoint
                        ),
                        details: BTreeMap::from([(
                            "endpoint".to_string(),
                            endpoint.to_string(),
                        )]),
                    });
                    continue;
                };
                for id in value.ids() {
                    if known.contains(id) {
                        continue;
                    }
                    let mut details = BTreeMap::new();
                    details.insert("endpoint".to_string(), endpoint.to_string());
                    details.insert("missingId".to_string(), id.to_string());
                    details.insert("kind".to_string(), kind.to_string());
                    violations.push(Violation {
                        rule_code: RuleCode::BrokenRef,
                        target_id: element.id.clone(),
                        message: format!(
                            "{} relationship '{}' references missing element '{}'",
                            kind, element.id, id
                        ),
                        details,
                    });
                }
            }
        }
        violations
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Classic coloring DFS. Returns the edge (node, target) that closes the
/// first cycle encountered, if any.
fn find_back_edge<'g>(
    node: &'g str,
    adjacency: &BTreeMap<&'g str, Vec<&'g str>>,
    color: &mut BTreeMap<&'g str, Color>,
) -> Option<(&'g str, &'g str)> {
    color.insert(node, Color::Gray);
    if let Some(targets) = adjacency.get(node) {
        for &target in targets {
            match color.get(target).copied().unwrap_or(Color::White) {
                Color::Gray => return Some((node, target)),
                Color::White => {
                    if let Some(hit) = find_back_edge(target, adjacency, color) {
                        return Some(hit);
                    }
                }
                Color::Black => {}
            }
        }
    }
    color.insert(node, Color::Black);
    None
}

/// Semantic constraints on which classes may participate in a relation of a
/// given kind. This is an optional layer on top of the structural creation
/// policy; callers opt in (e.g. the CLI's `--strict` flag).
///
/// - derive/refine connect requirement definitions to requirement definitions
/// - satisfy runs from a behavioral or structural usage to a requirement
/// - trace is unconstrained
pub fn check_relation_classes(
    schema: &dyn SchemaProvider,
    kind: RelationKind,
    from_class: &str,
    to_class: &str,
) -> Result<()> {
    let allowed = match kind {
        RelationKind::Derive | RelationKind::Refine => {
            schema.is_subtype_of(from_class, CLASS_REQUIREMENT)
                && schema.is_subtype_of(to_class, CLASS_REQUIREMENT)
        }
        RelationKind::Satisfy => {
            schema.is_subtype_of(from_class, CLASS_USAGE)
                && schema.is_subtype_of(to_class, CLASS_REQUIREMENT)
        }
        RelationKind::Trace => true,
    };
    if allowed {
        Ok(())
    } else {
        Err(CoreError::RelationNotAllowed {
            kind: kind.to_string(),
            from_class: from_class.to_string(),
            to_class: to_class.to_string(),
        })
    }
}
