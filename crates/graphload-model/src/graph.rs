//! In-memory graph built by one parser invocation.
//!
//! Nodes live in an arena (`Vec<Node>`) with a secondary index keyed by
//! `(entity type, id)`. Edges are owned by the node being parsed and point at
//! either another arena slot or a placeholder that the consuming database
//! resolves by lookup key. Pruning hooks never delete edges in place: they set
//! a removal marker and every reader skips marked edges.

use crate::mapping::{Direction, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;

pub const PROP_ID: &str = "id";
pub const PROP_NAME: &str = "name";
pub const PROP_SYNONYMS: &str = "synonyms";
pub const PROP_DATA_SOURCE: &str = "data_source";
pub const PROP_COMMENT: &str = "comment";

/// Separator used when a multi-valued attribute is flattened.
pub const MULTI_VALUE_SEPARATOR: &str = "|";

// ============================================================================
// Attribute values
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Text(String),
    List(Vec<String>),
    Int(i64),
    Number(f64),
}

impl AttrValue {
    /// Individual values, in insertion order.
    pub fn values(&self) -> Vec<String> {
        match self {
            AttrValue::Text(s) => vec![s.clone()],
            AttrValue::List(items) => items.clone(),
            AttrValue::Int(i) => vec![i.to_string()],
            AttrValue::Number(f) => vec![f.to_string()],
        }
    }

    /// Flat text form used in output files.
    pub fn to_field(&self) -> String {
        match self {
            AttrValue::Text(s) => s.clone(),
            AttrValue::List(items) => items.join(MULTI_VALUE_SEPARATOR),
            AttrValue::Int(i) => i.to_string(),
            AttrValue::Number(f) => f.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            AttrValue::Text(s) => s.is_empty(),
            AttrValue::List(items) => items.iter().all(|s| s.is_empty()),
            AttrValue::Int(_) | AttrValue::Number(_) => false,
        }
    }
}

/// Coerce a raw value to `value_type`. Failed coercion keeps the raw text.
pub fn coerce(property: &str, raw: &str, value_type: ValueType) -> AttrValue {
    match value_type {
        ValueType::Str => AttrValue::Text(raw.to_string()),
        ValueType::Int => {
            if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(i) = raw.parse::<i64>() {
                    return AttrValue::Int(i);
                }
            }
            warn!(property, value = raw, "not an integer, keeping raw text");
            AttrValue::Text(raw.to_string())
        }
        ValueType::Number => {
            if raw != "NIL" {
                if let Ok(f) = raw.parse::<f64>() {
                    if f.is_finite() {
                        return AttrValue::Number(f);
                    }
                }
            }
            warn!(property, value = raw, "not a number, keeping raw text");
            AttrValue::Text(raw.to_string())
        }
    }
}

// ============================================================================
// Edges
// ============================================================================

/// Index of a node in its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef(usize);

impl NodeRef {
    pub fn index(self) -> usize {
        self.0
    }
}

/// An edge target that has not been matched to a node in this batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PendingRef {
    pub entity_type: String,
    pub lookup_key: String,
    pub raw_id: String,
}

impl PendingRef {
    pub fn new(entity_type: &str, lookup_key: &str, raw_id: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            lookup_key: lookup_key.to_string(),
            raw_id: raw_id.to_string(),
        }
    }

    /// `GO:1234` for a `db_GO` placeholder, `Gene:G0-1` otherwise.
    pub fn composite_key(&self) -> String {
        let namespace = self
            .entity_type
            .strip_prefix("db_")
            .unwrap_or(&self.entity_type);
        format!("{}:{}", namespace, self.raw_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeTarget {
    Resolved(NodeRef),
    Pending(PendingRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    Relationship,
    DbLink,
}

/// Directed edge owned by the parsed node.
///
/// `direction` records which end is the subject: with `From` the target is the
/// subject and the owner the object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub label: String,
    pub direction: Direction,
    pub kind: EdgeKind,
    pub target: EdgeTarget,
    pub attributes: BTreeMap<String, String>,
    /// External database of a db-link edge.
    #[serde(default)]
    db_name: Option<String>,
    removed: bool,
}

impl Edge {
    pub fn pending(label: &str, direction: Direction, target: PendingRef) -> Self {
        Self {
            label: label.to_string(),
            direction,
            kind: EdgeKind::Relationship,
            target: EdgeTarget::Pending(target),
            attributes: BTreeMap::new(),
            db_name: None,
            removed: false,
        }
    }

    pub fn dblink(label: &str, db_name: &str, target: PendingRef) -> Self {
        Self {
            kind: EdgeKind::DbLink,
            db_name: Some(db_name.to_string()),
            ..Self::pending(label, Direction::To, target)
        }
    }

    pub fn db_name(&self) -> Option<&str> {
        self.db_name.as_deref()
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub fn mark_removed(&mut self) {
        self.removed = true;
    }

    pub fn pending_target(&self) -> Option<&PendingRef> {
        match &self.target {
            EdgeTarget::Pending(p) => Some(p),
            EdgeTarget::Resolved(_) => None,
        }
    }

    fn same_link(&self, other: &Edge) -> bool {
        self.label == other.label
            && self.direction == other.direction
            && self.target == other.target
            && self.attributes == other.attributes
    }
}

// ============================================================================
// Nodes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    entity_type: String,
    id: String,
    labels: BTreeSet<String>,
    attributes: BTreeMap<String, AttrValue>,
    edges: Vec<Edge>,
}

impl Node {
    pub fn new(entity_type: &str, id: &str) -> Self {
        let mut labels = BTreeSet::new();
        labels.insert(entity_type.to_string());
        let mut attributes = BTreeMap::new();
        attributes.insert(PROP_ID.to_string(), AttrValue::Text(id.to_string()));
        Self {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
            labels,
            attributes,
            edges: Vec::new(),
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn add_label(&mut self, label: &str) {
        self.labels.insert(label.to_string());
    }

    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Flattened value, or an empty string when absent.
    pub fn field(&self, key: &str) -> String {
        self.attributes
            .get(key)
            .map(AttrValue::to_field)
            .unwrap_or_default()
    }

    pub fn values(&self, key: &str) -> Vec<String> {
        self.attributes
            .get(key)
            .map(AttrValue::values)
            .unwrap_or_default()
    }

    pub fn set_attribute(&mut self, key: &str, value: AttrValue) {
        self.attributes.insert(key.to_string(), value);
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<AttrValue> {
        self.attributes.remove(key)
    }

    /// Add one raw value. Repeated string values accumulate into a list
    /// (comments fold into one text); typed values replace.
    pub fn push_value(&mut self, key: &str, raw: &str, value_type: ValueType) {
        let raw = raw.trim();
        if raw.is_empty() {
            return;
        }
        if value_type != ValueType::Str {
            self.attributes
                .insert(key.to_string(), coerce(key, raw, value_type));
            return;
        }
        let Some(slot) = self.attributes.get_mut(key) else {
            self.attributes
                .insert(key.to_string(), AttrValue::Text(raw.to_string()));
            return;
        };
        match slot {
            AttrValue::Text(existing) if key == PROP_COMMENT => {
                existing.push(' ');
                existing.push_str(raw);
            }
            AttrValue::Text(existing) => {
                let first = std::mem::take(existing);
                *slot = AttrValue::List(vec![first, raw.to_string()]);
            }
            AttrValue::List(items) => items.push(raw.to_string()),
            other => *other = AttrValue::Text(raw.to_string()),
        }
    }

    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    /// Live (not removed) edges.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(|e| !e.removed)
    }

    pub fn edges_mut(&mut self) -> impl Iterator<Item = &mut Edge> {
        self.edges.iter_mut().filter(|e| !e.removed)
    }

    pub fn last_edge_mut(&mut self) -> Option<&mut Edge> {
        self.edges.last_mut().filter(|e| !e.removed)
    }

    /// Soft-delete every live edge matching `pred`; returns how many were marked.
    pub fn remove_edges_where(&mut self, mut pred: impl FnMut(&Edge) -> bool) -> usize {
        let mut marked = 0;
        for edge in self.edges.iter_mut().filter(|e| !e.removed) {
            if pred(edge) {
                edge.removed = true;
                marked += 1;
            }
        }
        marked
    }

    /// Fold a second record for the same entity into this one.
    pub fn merge(&mut self, other: Node) {
        self.labels.extend(other.labels);
        for (key, value) in other.attributes {
            match self.attributes.get_mut(&key) {
                None => {
                    self.attributes.insert(key, value);
                }
                Some(existing @ (AttrValue::Text(_) | AttrValue::List(_))) => {
                    let mut merged = existing.values();
                    for v in value.values() {
                        if !merged.contains(&v) {
                            merged.push(v);
                        }
                    }
                    *existing = if merged.len() == 1 {
                        AttrValue::Text(merged.remove(0))
                    } else {
                        AttrValue::List(merged)
                    };
                }
                Some(_) => {}
            }
        }
        for edge in other.edges.into_iter().filter(|e| !e.removed) {
            if !self.edges().any(|e| e.same_link(&edge)) {
                self.edges.push(edge);
            }
        }
    }

    fn drop_removed_edges(&mut self) {
        self.edges.retain(|e| !e.removed);
    }
}

// ============================================================================
// Graph arena
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    index: HashMap<(String, String), NodeRef>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert a node, merging into an existing node with the same identity.
    pub fn insert(&mut self, node: Node) -> NodeRef {
        let key = (node.entity_type.clone(), node.id.clone());
        if let Some(&existing) = self.index.get(&key) {
            self.nodes[existing.0].merge(node);
            return existing;
        }
        let r = NodeRef(self.nodes.len());
        self.nodes.push(node);
        self.index.insert(key, r);
        r
    }

    pub fn find(&self, entity_type: &str, id: &str) -> Option<NodeRef> {
        self.index
            .get(&(entity_type.to_string(), id.to_string()))
            .copied()
    }

    pub fn node(&self, r: NodeRef) -> &Node {
        &self.nodes[r.0]
    }

    pub fn node_mut(&mut self, r: NodeRef) -> &mut Node {
        &mut self.nodes[r.0]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.edges().count()).sum()
    }

    /// Id of an edge's far end, whether resolved or still a placeholder.
    pub fn target_id<'a>(&'a self, edge: &'a Edge) -> &'a str {
        match &edge.target {
            EdgeTarget::Resolved(r) => self.nodes[r.0].id(),
            EdgeTarget::Pending(p) => &p.raw_id,
        }
    }

    pub fn target_type<'a>(&'a self, edge: &'a Edge) -> &'a str {
        match &edge.target {
            EdgeTarget::Resolved(r) => self.nodes[r.0].entity_type(),
            EdgeTarget::Pending(p) => &p.entity_type,
        }
    }

    /// Match a placeholder against this batch: the indexed id must exist and
    /// the node's lookup property must carry the same value.
    pub fn resolve(&self, pending: &PendingRef) -> Option<NodeRef> {
        let r = self.find(&pending.entity_type, &pending.raw_id)?;
        let node = self.node(r);
        if pending.lookup_key == PROP_ID
            || node.values(&pending.lookup_key).contains(&pending.raw_id)
        {
            Some(r)
        } else {
            None
        }
    }

    /// Resolve every placeholder whose target was parsed in this batch.
    /// Unmatched placeholders stay pending for the consuming database.
    pub fn link_local_targets(&mut self) -> usize {
        let mut resolutions = Vec::new();
        for (ni, node) in self.nodes.iter().enumerate() {
            for (ei, edge) in node.edges.iter().enumerate() {
                if edge.removed || edge.kind == EdgeKind::DbLink {
                    continue;
                }
                if let Some(target) = edge.pending_target().and_then(|p| self.resolve(p)) {
                    resolutions.push((ni, ei, target));
                }
            }
        }
        let linked = resolutions.len();
        for (ni, ei, target) in resolutions {
            self.nodes[ni].edges[ei].target = EdgeTarget::Resolved(target);
        }
        linked
    }

    /// Sort nodes by (type, id) and edges by (label, direction, target id),
    /// dropping soft-deleted edges. Resolved references are remapped.
    pub fn canonicalize(&mut self) {
        let mut order: Vec<usize> = (0..self.nodes.len()).collect();
        order.sort_by(|&a, &b| {
            let (na, nb) = (&self.nodes[a], &self.nodes[b]);
            (&na.entity_type, &na.id).cmp(&(&nb.entity_type, &nb.id))
        });
        let mut remap = vec![0usize; order.len()];
        for (new, &old) in order.iter().enumerate() {
            remap[old] = new;
        }

        let mut slots: Vec<Option<Node>> = std::mem::take(&mut self.nodes)
            .into_iter()
            .map(Some)
            .collect();
        let mut sorted = Vec::with_capacity(slots.len());
        for old in order {
            if let Some(node) = slots[old].take() {
                sorted.push(node);
            }
        }
        for node in &mut sorted {
            node.drop_removed_edges();
            for edge in &mut node.edges {
                if let EdgeTarget::Resolved(r) = &mut edge.target {
                    *r = NodeRef(remap[r.0]);
                }
            }
        }

        let ids: Vec<String> = sorted.iter().map(|n| n.id.clone()).collect();
        for node in &mut sorted {
            node.edges.sort_by(|a, b| {
                let ta = edge_sort_target(a, &ids);
                let tb = edge_sort_target(b, &ids);
                (&a.label, a.direction, ta).cmp(&(&b.label, b.direction, tb))
            });
        }

        self.index = sorted
            .iter()
            .enumerate()
            .map(|(i, n)| ((n.entity_type.clone(), n.id.clone()), NodeRef(i)))
            .collect();
        self.nodes = sorted;
    }

    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }
}

fn edge_sort_target<'a>(edge: &'a Edge, ids: &'a [String]) -> &'a str {
    match &edge.target {
        EdgeTarget::Resolved(r) => &ids[r.0],
        EdgeTarget::Pending(p) => &p.raw_id,
    }
}

impl FromIterator<Node> for Graph {
    fn from_iter<T: IntoIterator<Item = Node>>(iter: T) -> Self {
        let mut graph = Graph::new();
        for node in iter {
            graph.insert(node);
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gene(id: &str) -> Node {
        Node::new("Gene", id)
    }

    #[test]
    fn repeated_string_values_accumulate() {
        let mut node = gene("G1");
        node.push_value("synonyms", "alpha", ValueType::Str);
        node.push_value("synonyms", "beta", ValueType::Str);
        node.push_value("synonyms", "  ", ValueType::Str);
        assert_eq!(node.values("synonyms"), vec!["alpha", "beta"]);
        assert_eq!(node.field("synonyms"), "alpha|beta");
    }

    #[test]
    fn comments_fold_into_one_text() {
        let mut node = gene("G1");
        node.push_value(PROP_COMMENT, "first part", ValueType::Str);
        node.push_value(PROP_COMMENT, "second", ValueType::Str);
        assert_eq!(node.field(PROP_COMMENT), "first part second");
    }

    #[test]
    fn coercion_falls_back_to_text() {
        assert_eq!(coerce("len", "42", ValueType::Int), AttrValue::Int(42));
        assert_eq!(coerce("len", "-4", ValueType::Int), AttrValue::Text("-4".into()));
        assert_eq!(coerce("kd", "12.5", ValueType::Number), AttrValue::Number(12.5));
        assert_eq!(coerce("kd", "NIL", ValueType::Number), AttrValue::Text("NIL".into()));
        assert_eq!(coerce("kd", "abc", ValueType::Number), AttrValue::Text("abc".into()));
    }

    #[test]
    fn insert_merges_same_identity() {
        let mut graph = Graph::new();
        let mut a = gene("G1");
        a.push_value(PROP_NAME, "thrA", ValueType::Str);
        let mut b = gene("G1");
        b.push_value(PROP_NAME, "thrA", ValueType::Str);
        b.push_value("synonyms", "thrA1", ValueType::Str);
        b.add_label("Complex");
        let r1 = graph.insert(a);
        let r2 = graph.insert(b);
        assert_eq!(r1, r2);
        assert_eq!(graph.len(), 1);
        let node = graph.node(r1);
        assert_eq!(node.field(PROP_NAME), "thrA");
        assert_eq!(node.field("synonyms"), "thrA1");
        assert!(node.has_label("Complex"));
    }

    #[test]
    fn soft_deleted_edges_are_hidden() {
        let mut node = gene("G1");
        node.add_edge(Edge::pending("TYPE_OF", Direction::To, PendingRef::new("Class", "id", "Genes")));
        node.add_edge(Edge::pending("ENCODES", Direction::To, PendingRef::new("Protein", "id", "P1")));
        let marked = node.remove_edges_where(|e| e.label == "TYPE_OF");
        assert_eq!(marked, 1);
        let labels: Vec<_> = node.edges().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["ENCODES"]);
    }

    #[test]
    fn local_targets_resolve_and_survive_canonicalize() {
        let mut graph = Graph::new();
        let mut b = gene("B");
        b.add_edge(Edge::pending("IS_A", Direction::To, PendingRef::new("Gene", "id", "A")));
        b.add_edge(Edge::pending("IS_A", Direction::To, PendingRef::new("Gene", "id", "Z")));
        graph.insert(b);
        graph.insert(gene("A"));

        assert_eq!(graph.link_local_targets(), 1);
        graph.canonicalize();

        let ids: Vec<_> = graph.nodes().map(Node::id).collect();
        assert_eq!(ids, vec!["A", "B"]);
        let b = graph.node(graph.find("Gene", "B").expect("B indexed"));
        let targets: Vec<_> = b.edges().map(|e| graph.target_id(e)).collect();
        assert_eq!(targets, vec!["A", "Z"]);
        assert!(matches!(b.edges().next().map(|e| &e.target), Some(EdgeTarget::Resolved(_))));
    }

    #[test]
    fn composite_key_strips_db_namespace() {
        let p = PendingRef::new("db_GO", "id", "0005829");
        assert_eq!(p.composite_key(), "GO:0005829");
        let p = PendingRef::new("Gene", "biocyc_id", "G0-1");
        assert_eq!(p.composite_key(), "Gene:G0-1");
    }
}
