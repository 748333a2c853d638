use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::{NodeKind, UriScheme, Xref, XrefKind};
use crate::error::KiraError;

/// Property names shared by readers, the warehouse builder and the merger.
pub mod props {
    pub const XREF: &str = "xref";
    pub const ORGANISM: &str = "organism";
    pub const DATA_SOURCE: &str = "dataSource";
    pub const MEMBER_ENTITY_REFERENCE: &str = "memberEntityReference";
    pub const ENTITY_REFERENCE: &str = "entityReference";
    pub const ENTITY_FEATURE: &str = "entityFeature";
    pub const PATHWAY_COMPONENT: &str = "pathwayComponent";
    pub const PARTICIPANT: &str = "participant";

    pub const NAME: &str = "name";
    pub const DISPLAY_NAME: &str = "displayName";
    pub const DB: &str = "db";
    pub const ID: &str = "id";
    pub const VERSION: &str = "version";
    pub const XREF_TYPE: &str = "xrefType";
    pub const RELATIONSHIP_TYPE: &str = "relationshipType";
    pub const COMMENT: &str = "comment";
    pub const CHEMICAL_FORMULA: &str = "chemicalFormula";
    pub const STRUCTURE: &str = "structure";
    pub const MOLECULAR_WEIGHT: &str = "molecularWeight";
    pub const SEQUENCE_LENGTH: &str = "sequenceLength";
}

/// Name of the relation a target node exposes for an incoming `prop` edge.
pub fn inverse(prop: &str) -> String {
    format!("{prop}Of")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Literal {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Literal::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(value) => write!(f, "{value}"),
            Literal::Float(value) => write!(f, "{value}"),
            Literal::Text(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Text(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Text(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Integer(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub uri: String,
    pub kind: NodeKind,
    pub literals: BTreeMap<String, Vec<Literal>>,
}

impl Node {
    pub fn new(uri: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            uri: uri.into(),
            kind,
            literals: BTreeMap::new(),
        }
    }

    pub fn with_literal(mut self, prop: &str, value: impl Into<Literal>) -> Self {
        self.push_literal(prop, value);
        self
    }

    pub fn text(&self, prop: &str) -> Option<&str> {
        self.literals
            .get(prop)
            .and_then(|values| values.iter().find_map(Literal::as_text))
    }

    pub fn texts(&self, prop: &str) -> Vec<&str> {
        self.literals
            .get(prop)
            .map(|values| values.iter().filter_map(Literal::as_text).collect())
            .unwrap_or_default()
    }

    /// Appends a value unless an equal one is already present.
    pub fn push_literal(&mut self, prop: &str, value: impl Into<Literal>) {
        let value = value.into();
        let values = self.literals.entry(prop.to_string()).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }

    pub fn set_literal(&mut self, prop: &str, value: impl Into<Literal>) {
        self.literals.insert(prop.to_string(), vec![value.into()]);
    }

    pub fn union_literals(&mut self, other: &Node) {
        for (prop, values) in &other.literals {
            for value in values {
                self.push_literal(prop, value.clone());
            }
        }
    }

    /// Typed view of a cross-reference node. `None` for other kinds, when
    /// the collection or id is missing, or when `xrefType` is absent or
    /// not a known type.
    pub fn as_xref(&self) -> Option<Xref> {
        if self.kind != NodeKind::CrossReference {
            return None;
        }
        let collection = self.text(props::DB)?.trim();
        let id = self.text(props::ID)?.trim();
        if collection.is_empty() || id.is_empty() {
            return None;
        }
        let kind = self.text(props::XREF_TYPE)?.parse::<XrefKind>().ok()?;
        Some(Xref {
            collection: collection.to_string(),
            id: id.to_string(),
            version: self
                .text(props::VERSION)
                .filter(|value| !value.trim().is_empty())
                .map(str::to_string),
            kind,
            relationship_type: self.text(props::RELATIONSHIP_TYPE).map(str::to_string),
        })
    }

    pub fn from_xref(uri: impl Into<String>, xref: &Xref) -> Self {
        let mut node = Node::new(uri, NodeKind::CrossReference)
            .with_literal(props::DB, xref.collection.as_str())
            .with_literal(props::ID, xref.id.as_str())
            .with_literal(props::XREF_TYPE, xref.kind.to_string());
        if let Some(version) = &xref.version {
            node.set_literal(props::VERSION, version.as_str());
        }
        if let Some(rel) = &xref.relationship_type {
            node.set_literal(props::RELATIONSHIP_TYPE, rel.as_str());
        }
        node
    }
}

/// Forward and inverse edge lists keyed by node URI. Each list keeps
/// insertion order and holds no duplicate `(prop, uri)` pairs.
#[derive(Debug, Clone, Default)]
struct EdgeIndex {
    /// src -> [(prop, dst)]
    outgoing: HashMap<String, Vec<(String, String)>>,
    /// dst -> [(prop, src)]
    incoming: HashMap<String, Vec<(String, String)>>,
}

impl EdgeIndex {
    fn contains(&self, src: &str, prop: &str, dst: &str) -> bool {
        self.outgoing
            .get(src)
            .is_some_and(|edges| edges.iter().any(|(p, d)| p == prop && d == dst))
    }

    fn insert(&mut self, src: &str, prop: &str, dst: &str) -> bool {
        if self.contains(src, prop, dst) {
            return false;
        }
        self.outgoing
            .entry(src.to_string())
            .or_default()
            .push((prop.to_string(), dst.to_string()));
        self.incoming
            .entry(dst.to_string())
            .or_default()
            .push((prop.to_string(), src.to_string()));
        true
    }

    fn remove(&mut self, src: &str, prop: &str, dst: &str) -> bool {
        let mut removed = false;
        if let Some(edges) = self.outgoing.get_mut(src) {
            let before = edges.len();
            edges.retain(|(p, d)| !(p == prop && d == dst));
            removed = edges.len() != before;
            if edges.is_empty() {
                self.outgoing.remove(src);
            }
        }
        if let Some(edges) = self.incoming.get_mut(dst) {
            edges.retain(|(p, s)| !(p == prop && s == src));
            if edges.is_empty() {
                self.incoming.remove(dst);
            }
        }
        removed
    }

    fn detach(&mut self, uri: &str) {
        if let Some(edges) = self.outgoing.remove(uri) {
            for (prop, dst) in edges {
                if let Some(incoming) = self.incoming.get_mut(&dst) {
                    incoming.retain(|(p, s)| !(p == &prop && s == uri));
                    if incoming.is_empty() {
                        self.incoming.remove(&dst);
                    }
                }
            }
        }
        if let Some(edges) = self.incoming.remove(uri) {
            for (prop, src) in edges {
                if let Some(outgoing) = self.outgoing.get_mut(&src) {
                    outgoing.retain(|(p, d)| !(p == &prop && d == uri));
                    if outgoing.is_empty() {
                        self.outgoing.remove(&src);
                    }
                }
            }
        }
    }
}

/// Arena of nodes keyed by URI plus a bidirectional adjacency index.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: BTreeMap<String, Node>,
    edges: EdgeIndex,
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

    pub fn contains(&self, uri: &str) -> bool {
        self.nodes.contains_key(uri)
    }

    pub fn node(&self, uri: &str) -> Option<&Node> {
        self.nodes.get(uri)
    }

    pub fn node_mut(&mut self, uri: &str) -> Option<&mut Node> {
        self.nodes.get_mut(uri)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn uris(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.outgoing.values().map(Vec::len).sum()
    }

    pub fn add_node(&mut self, node: Node) -> Result<(), KiraError> {
        if self.nodes.contains_key(&node.uri) {
            return Err(KiraError::DuplicateNode(node.uri));
        }
        self.nodes.insert(node.uri.clone(), node);
        Ok(())
    }

    /// Adds the node, or unions its literals into an existing node of the
    /// same kind. Returns true when the node was new.
    pub fn upsert_node(&mut self, node: Node) -> Result<bool, KiraError> {
        match self.nodes.get_mut(&node.uri) {
            Some(existing) if existing.kind == node.kind => {
                existing.union_literals(&node);
                Ok(false)
            }
            Some(existing) => Err(KiraError::IntegrityViolation(format!(
                "{} is a {} and cannot be extended as a {}",
                node.uri, existing.kind, node.kind
            ))),
            None => {
                self.nodes.insert(node.uri.clone(), node);
                Ok(true)
            }
        }
    }

    /// Removes a node together with every incident edge.
    pub fn remove_node(&mut self, uri: &str) -> Option<Node> {
        let node = self.nodes.remove(uri)?;
        self.edges.detach(uri);
        Some(node)
    }

    /// Adds `src --prop--> dst` and its inverse. Returns false when the edge
    /// already existed.
    pub fn add_edge(&mut self, src: &str, prop: &str, dst: &str) -> Result<bool, KiraError> {
        for uri in [src, dst] {
            if !self.nodes.contains_key(uri) {
                return Err(KiraError::NodeNotFound(uri.to_string()));
            }
        }
        Ok(self.edges.insert(src, prop, dst))
    }

    pub fn remove_edge(&mut self, src: &str, prop: &str, dst: &str) -> bool {
        self.edges.remove(src, prop, dst)
    }

    /// Drops every `prop` edge leaving `src`, returning the former targets.
    pub fn clear_property(&mut self, src: &str, prop: &str) -> Vec<String> {
        let targets: Vec<String> = self.refs(src, prop).into_iter().map(str::to_string).collect();
        for dst in &targets {
            self.edges.remove(src, prop, dst);
        }
        targets
    }

    /// Ordered targets of `src.prop`.
    pub fn refs(&self, src: &str, prop: &str) -> Vec<&str> {
        self.edges
            .outgoing
            .get(src)
            .map(|edges| {
                edges
                    .iter()
                    .filter(|(p, _)| p == prop)
                    .map(|(_, dst)| dst.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Sources of `prop` edges pointing at `dst`, i.e. `dst.propOf`.
    pub fn inverse_refs(&self, dst: &str, prop: &str) -> Vec<&str> {
        self.edges
            .incoming
            .get(dst)
            .map(|edges| {
                edges
                    .iter()
                    .filter(|(p, _)| p == prop)
                    .map(|(_, src)| src.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `(prop, dst)` pairs leaving `uri`, in insertion order.
    pub fn outgoing(&self, uri: &str) -> &[(String, String)] {
        self.edges
            .outgoing
            .get(uri)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// `(prop, src)` pairs arriving at `uri`, in insertion order.
    pub fn incoming(&self, uri: &str) -> &[(String, String)] {
        self.edges
            .incoming
            .get(uri)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn in_degree(&self, uri: &str) -> usize {
        self.incoming(uri).len()
    }

    /// Redirects every edge into `old` so that it points at `new`, keeping
    /// each source's ordering. Returns the number of edges touched.
    pub fn replace_references(&mut self, old: &str, new: &str) -> Result<usize, KiraError> {
        if !self.nodes.contains_key(new) {
            return Err(KiraError::NodeNotFound(new.to_string()));
        }
        if old == new {
            return Ok(0);
        }
        let incoming = self.edges.incoming.remove(old).unwrap_or_default();
        let touched = incoming.len();
        for (prop, src) in incoming {
            let duplicate = self.edges.contains(&src, &prop, new);
            if let Some(edges) = self.edges.outgoing.get_mut(&src) {
                if duplicate {
                    edges.retain(|(p, d)| !(p == &prop && d == old));
                } else if let Some(slot) = edges.iter_mut().find(|(p, d)| p == &prop && d == old) {
                    slot.1 = new.to_string();
                }
            }
            if !duplicate {
                self.edges
                    .incoming
                    .entry(new.to_string())
                    .or_default()
                    .push((prop, src));
            }
        }
        Ok(touched)
    }

    /// Gives a node a new URI, carrying all of its edges along.
    pub fn rename_node(&mut self, old: &str, new: &str) -> Result<(), KiraError> {
        if self.nodes.contains_key(new) {
            return Err(KiraError::DuplicateNode(new.to_string()));
        }
        let mut node = self
            .nodes
            .remove(old)
            .ok_or_else(|| KiraError::NodeNotFound(old.to_string()))?;
        node.uri = new.to_string();
        self.nodes.insert(new.to_string(), node);

        if let Some(outgoing) = self.edges.outgoing.remove(old) {
            for (prop, dst) in &outgoing {
                if let Some(incoming) = self.edges.incoming.get_mut(dst) {
                    for slot in incoming.iter_mut() {
                        if &slot.0 == prop && slot.1 == old {
                            slot.1 = new.to_string();
                        }
                    }
                }
            }
            self.edges.outgoing.insert(new.to_string(), outgoing);
        }
        if let Some(incoming) = self.edges.incoming.remove(old) {
            for (prop, src) in &incoming {
                if let Some(outgoing) = self.edges.outgoing.get_mut(src) {
                    for slot in outgoing.iter_mut() {
                        if &slot.0 == prop && slot.1 == old {
                            slot.1 = new.to_string();
                        }
                    }
                }
            }
            self.edges.incoming.insert(new.to_string(), incoming);
        }
        Ok(())
    }

    /// Folds `victim` into `survivor`: literals and outgoing edges are
    /// unioned, incoming edges redirected, then `victim` is removed.
    pub fn merge_node_into(&mut self, victim: &str, survivor: &str) -> Result<(), KiraError> {
        if victim == survivor {
            return Ok(());
        }
        let victim_node = self
            .nodes
            .get(victim)
            .cloned()
            .ok_or_else(|| KiraError::NodeNotFound(victim.to_string()))?;
        let target = self
            .nodes
            .get_mut(survivor)
            .ok_or_else(|| KiraError::NodeNotFound(survivor.to_string()))?;
        if target.kind != victim_node.kind {
            return Err(KiraError::IntegrityViolation(format!(
                "cannot merge {} ({}) into {} ({})",
                victim, victim_node.kind, survivor, target.kind
            )));
        }
        target.union_literals(&victim_node);

        let outgoing = self.outgoing(victim).to_vec();
        self.replace_references(victim, survivor)?;
        for (prop, dst) in outgoing {
            let dst = if dst == victim { survivor.to_string() } else { dst };
            self.edges.insert(survivor, &prop, &dst);
        }
        self.remove_node(victim);
        Ok(())
    }

    /// Typed cross-references attached to `uri`, with their node URIs.
    pub fn xrefs(&self, uri: &str) -> Vec<(String, Xref)> {
        self.refs(uri, props::XREF)
            .into_iter()
            .filter_map(|xref_uri| {
                self.node(xref_uri)
                    .and_then(Node::as_xref)
                    .map(|xref| (xref_uri.to_string(), xref))
            })
            .collect()
    }

    pub fn unification_xrefs(&self, uri: &str) -> Vec<Xref> {
        self.xrefs(uri)
            .into_iter()
            .map(|(_, xref)| xref)
            .filter(|xref| xref.kind == XrefKind::Unification)
            .collect()
    }

    /// Returns the URI of the cross-reference node for `xref`, creating it
    /// when absent.
    pub fn ensure_xref(&mut self, scheme: &UriScheme, xref: &Xref) -> Result<String, KiraError> {
        let uri = scheme.xref(xref);
        match self.nodes.get(&uri) {
            Some(node) if node.kind == NodeKind::CrossReference => {}
            Some(node) => {
                return Err(KiraError::IntegrityViolation(format!(
                    "{uri} is a {} and cannot hold a cross-reference",
                    node.kind
                )));
            }
            None => self.add_node(Node::from_xref(uri.clone(), xref))?,
        }
        Ok(uri)
    }

    /// Copies `root` and everything reachable from it in `source` into this
    /// graph. Existing nodes get their literals unioned and edges are
    /// added as a set union. Returns how many nodes were created.
    pub fn import_closure(&mut self, source: &Graph, root: &str) -> Result<usize, KiraError> {
        if !source.contains(root) {
            return Err(KiraError::NodeNotFound(root.to_string()));
        }
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([root.to_string()]);
        let mut created = 0;
        let mut pending_edges = Vec::new();
        while let Some(uri) = queue.pop_front() {
            if !seen.insert(uri.clone()) {
                continue;
            }
            let Some(node) = source.node(&uri) else {
                continue;
            };
            if self.upsert_node(node.clone())? {
                created += 1;
            }
            for (prop, dst) in source.outgoing(&uri) {
                pending_edges.push((uri.clone(), prop.clone(), dst.clone()));
                if !seen.contains(dst) {
                    queue.push_back(dst.clone());
                }
            }
        }
        for (src, prop, dst) in pending_edges {
            self.add_edge(&src, &prop, &dst)?;
        }
        Ok(created)
    }

    /// Moves every node and edge of `other` into this graph.
    pub fn absorb(&mut self, other: Graph) -> Result<usize, KiraError> {
        let Graph { nodes, edges } = other;
        let mut created = 0;
        for (_, node) in nodes {
            if self.upsert_node(node)? {
                created += 1;
            }
        }
        for (src, list) in edges.outgoing {
            for (prop, dst) in list {
                self.add_edge(&src, &prop, &dst)?;
            }
        }
        Ok(created)
    }

    /// Every edge must join two existing nodes and appear in both the
    /// forward and the inverse list.
    pub fn check_integrity(&self) -> Result<(), KiraError> {
        for (src, list) in &self.edges.outgoing {
            if !self.nodes.contains_key(src) {
                return Err(KiraError::IntegrityViolation(format!(
                    "edge source {src} is not a node"
                )));
            }
            for (prop, dst) in list {
                if !self.nodes.contains_key(dst) {
                    return Err(KiraError::IntegrityViolation(format!(
                        "{src}.{prop} points at missing node {dst}"
                    )));
                }
                let mirrored = self
                    .edges
                    .incoming
                    .get(dst)
                    .is_some_and(|inc| inc.iter().any(|(p, s)| p == prop && s == src));
                if !mirrored {
                    return Err(KiraError::IntegrityViolation(format!(
                        "{dst}.{} lacks {src}",
                        inverse(prop)
                    )));
                }
            }
        }
        for (dst, list) in &self.edges.incoming {
            for (prop, src) in list {
                if !self.edges.contains(src, prop, dst) {
                    return Err(KiraError::IntegrityViolation(format!(
                        "{dst}.{} names {src} without a forward edge",
                        inverse(prop)
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn to_document(&self) -> GraphDocument {
        let nodes = self
            .nodes
            .values()
            .map(|node| {
                let mut refs: BTreeMap<String, Vec<String>> = BTreeMap::new();
                for (prop, dst) in self.outgoing(&node.uri) {
                    refs.entry(prop.clone()).or_default().push(dst.clone());
                }
                NodeDocument {
                    uri: node.uri.clone(),
                    kind: node.kind,
                    literals: node.literals.clone(),
                    refs,
                }
            })
            .collect();
        GraphDocument { nodes }
    }

    /// Builds a graph from a document. A duplicate URI or a reference to a
    /// node missing from the document is an error.
    pub fn from_document(document: GraphDocument) -> Result<Self, KiraError> {
        let mut graph = Graph::new();
        let mut edges = Vec::new();
        for doc in document.nodes {
            let mut node = Node::new(doc.uri.clone(), doc.kind);
            node.literals = doc.literals;
            graph.add_node(node)?;
            for (prop, targets) in doc.refs {
                for dst in targets {
                    edges.push((doc.uri.clone(), prop.clone(), dst));
                }
            }
        }
        for (src, prop, dst) in edges {
            if !graph.contains(&dst) {
                return Err(KiraError::IntegrityViolation(format!(
                    "{src}.{prop} references unknown node {dst}"
                )));
            }
            graph.add_edge(&src, &prop, &dst)?;
        }
        Ok(graph)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: Vec<NodeDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDocument {
    pub uri: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub literals: BTreeMap<String, Vec<Literal>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub refs: BTreeMap<String, Vec<String>>,
}

impl Serialize for Graph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_document().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Graph {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let document = GraphDocument::deserialize(deserializer)?;
        Graph::from_document(document).map_err(serde::de::Error::custom)
    }
}
