use std::collections::{BTreeSet, HashSet};
use std::io::BufRead;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{NodeKind, REL_IDENTITY, ReferenceKind, UriScheme, Xref};
use crate::error::KiraError;
use crate::graph::{Graph, Literal, Node, props};
use crate::mapping::{MappingIndex, MappingIndexBuilder};
use crate::normalize::Normalizer;
use crate::reference::{RecordBatch, RecordKind, ReferenceRecord};

/// The canonical entity repository. Read-only once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warehouse {
    pub build_id: String,
    pub built_at: String,
    pub scheme: UriScheme,
    graph: Graph,
}

impl Warehouse {
    pub fn new(build_id: &str, built_at: &str, scheme: UriScheme, graph: Graph) -> Self {
        Self {
            build_id: build_id.to_string(),
            built_at: built_at.to_string(),
            scheme,
            graph,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn node(&self, uri: &str) -> Option<&Node> {
        self.graph.node(uri)
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarehouseReport {
    pub build_id: String,
    pub records: usize,
    pub skipped_records: usize,
    pub filtered_records: usize,
    pub nodes: usize,
    pub entity_references: usize,
    pub organisms: usize,
    pub mapping_rows: usize,
    pub skipped_mapping_rows: usize,
    pub member_edges: usize,
    pub cycles_rejected: usize,
    #[serde(default)]
    pub sources: Vec<SourceReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: String,
    pub records: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct WarehouseBuild {
    pub warehouse: Warehouse,
    pub index: MappingIndex,
    pub report: WarehouseReport,
}

pub struct WarehouseBuilder {
    normalizer: Normalizer,
    scheme: UriScheme,
    organisms: HashSet<String>,
    records: Vec<ReferenceRecord>,
    skipped: usize,
    mapping: MappingIndexBuilder,
}

impl WarehouseBuilder {
    pub fn new(normalizer: Normalizer, scheme: UriScheme) -> Self {
        Self {
            mapping: MappingIndexBuilder::new(normalizer.clone()),
            normalizer,
            scheme,
            organisms: HashSet::new(),
            records: Vec::new(),
            skipped: 0,
        }
    }

    /// Restricts protein records to these NCBI taxonomy ids. Empty keeps all.
    pub fn with_organisms(mut self, organisms: impl IntoIterator<Item = String>) -> Self {
        self.organisms = organisms.into_iter().collect();
        self
    }

    pub fn add_record(&mut self, record: ReferenceRecord) {
        self.records.push(record);
    }

    pub fn add_batch(&mut self, batch: RecordBatch) {
        self.skipped += batch.skipped;
        self.records.extend(batch.records);
    }

    pub fn add_curated_tsv<R: BufRead>(&mut self, reader: R, source_name: &str) -> Result<usize, KiraError> {
        self.mapping.add_curated_tsv(reader, source_name)
    }

    pub fn build(self, build_id: &str, built_at: &str) -> Result<WarehouseBuild, KiraError> {
        let Self {
            normalizer,
            scheme,
            organisms,
            records,
            skipped,
            mut mapping,
        } = self;
        let mut report = WarehouseReport {
            build_id: build_id.to_string(),
            records: records.len(),
            skipped_records: skipped,
            ..WarehouseReport::default()
        };
        let mut graph = Graph::new();
        let mut pending_members = Vec::new();

        for record in &records {
            if let Err(err) = record.validate("warehouse") {
                warn!(error = %err, "skipping reference record");
                report.skipped_records += 1;
                continue;
            }
            if record.kind == RecordKind::Protein && !organisms.is_empty() {
                let wanted = record
                    .organism
                    .as_ref()
                    .is_some_and(|taxon| organisms.contains(taxon));
                if !wanted {
                    report.filtered_records += 1;
                    continue;
                }
            }
            match add_record(&mut graph, &normalizer, &scheme, record) {
                Ok(uri) => {
                    if !record.member_of.is_empty() {
                        pending_members.push((uri, record));
                    }
                }
                Err(err) if err.is_skippable() || matches!(err, KiraError::IntegrityViolation(_)) => {
                    warn!(
                        collection = %record.collection,
                        id = %record.primary_id,
                        error = %err,
                        "skipping reference record"
                    );
                    report.skipped_records += 1;
                }
                Err(err) => return Err(err),
            }
        }

        for (child, record) in pending_members {
            let collection = normalizer.collection(&record.collection);
            for parent_id in &record.member_of {
                let parent = scheme.canonical(&collection, &normalizer.normalize(&collection, parent_id));
                if !graph.contains(&parent) {
                    debug!(child = %child, parent = %parent, "member-of target not in warehouse");
                    continue;
                }
                if parent == child || reaches(&graph, &child, &parent) {
                    warn!(child = %child, parent = %parent, "rejecting member-of edge that would close a cycle");
                    report.cycles_rejected += 1;
                    continue;
                }
                if graph.add_edge(&parent, props::MEMBER_ENTITY_REFERENCE, &child)? {
                    report.member_edges += 1;
                }
            }
        }

        mapping.add_from_warehouse(&graph);
        report.skipped_mapping_rows = mapping.skipped();
        let index = mapping.build();
        report.mapping_rows = index.len();

        attach_mapped_synonyms(&mut graph, &scheme, &index)?;
        graph.check_integrity()?;

        report.nodes = graph.len();
        report.entity_references = graph
            .nodes()
            .filter(|node| matches!(node.kind, NodeKind::EntityReference(_)))
            .count();
        report.organisms = graph
            .nodes()
            .filter(|node| node.kind == NodeKind::Organism)
            .count();
        info!(
            build = build_id,
            nodes = report.nodes,
            mapping_rows = report.mapping_rows,
            skipped = report.skipped_records,
            "warehouse built"
        );

        Ok(WarehouseBuild {
            warehouse: Warehouse::new(build_id, built_at, scheme, graph),
            index,
            report,
        })
    }
}

fn node_kind(kind: RecordKind) -> NodeKind {
    match kind {
        RecordKind::Protein => NodeKind::EntityReference(ReferenceKind::Protein),
        RecordKind::SmallMolecule => NodeKind::EntityReference(ReferenceKind::SmallMolecule),
        RecordKind::Vocabulary => NodeKind::ControlledVocabularyTerm,
        RecordKind::Organism => NodeKind::Organism,
    }
}

/// Creates or extends the canonical node for one record and returns its URI.
fn add_record(
    graph: &mut Graph,
    normalizer: &Normalizer,
    scheme: &UriScheme,
    record: &ReferenceRecord,
) -> Result<String, KiraError> {
    let collection = normalizer.collection(&record.collection);
    let primary_id = normalizer.normalize(&collection, &record.primary_id);
    let uri = scheme.canonical(&collection, &primary_id);

    let mut node = Node::new(uri.clone(), node_kind(record.kind));
    if let Some(display) = &record.display_name {
        node.push_literal(props::DISPLAY_NAME, display.as_str());
    }
    for name in &record.names {
        node.push_literal(props::NAME, name.as_str());
    }
    if let Some(formula) = &record.formula {
        node.push_literal(props::CHEMICAL_FORMULA, formula.as_str());
    }
    if let Some(structure) = &record.structure {
        node.push_literal(props::STRUCTURE, structure.as_str());
    }
    if let Some(weight) = record.molecular_weight {
        node.push_literal(props::MOLECULAR_WEIGHT, Literal::Float(weight));
    }
    if let Some(length) = record.sequence_length {
        node.push_literal(props::SEQUENCE_LENGTH, length);
    }
    for comment in &record.comments {
        node.push_literal(props::COMMENT, comment.as_str());
    }
    graph.upsert_node(node)?;

    let unification = Xref::unification(&collection, &primary_id);
    let xref_uri = graph.ensure_xref(scheme, &unification)?;
    graph.add_edge(&uri, props::XREF, &xref_uri)?;

    for synonym in &record.synonyms {
        if synonym.collection.trim().is_empty() || synonym.id.trim().is_empty() {
            debug!(uri = %uri, "ignoring blank synonym");
            continue;
        }
        let syn_collection = normalizer.collection(&synonym.collection);
        let syn_id = normalizer.normalize(&syn_collection, &synonym.id);
        if syn_collection == collection && syn_id == primary_id {
            continue;
        }
        let xref = Xref::relationship(
            &syn_collection,
            &syn_id,
            synonym.relation.as_relationship_type(),
        );
        let xref_uri = graph.ensure_xref(scheme, &xref)?;
        graph.add_edge(&uri, props::XREF, &xref_uri)?;
    }

    if let Some(taxon) = record.organism.as_deref().filter(|t| !t.trim().is_empty()) {
        let taxon = taxon.trim();
        let organism_uri = scheme.canonical("taxonomy", taxon);
        let mut organism = Node::new(organism_uri.clone(), NodeKind::Organism);
        if let Some(name) = &record.organism_name {
            organism.push_literal(props::NAME, name.as_str());
        }
        graph.upsert_node(organism)?;
        let xref_uri = graph.ensure_xref(scheme, &Xref::unification("taxonomy", taxon))?;
        graph.add_edge(&organism_uri, props::XREF, &xref_uri)?;
        graph.add_edge(&uri, props::ORGANISM, &organism_uri)?;
    }
    Ok(uri)
}

/// True when `to` is reachable from `from` along member edges.
fn reaches(graph: &Graph, from: &str, to: &str) -> bool {
    let mut stack = vec![from.to_string()];
    let mut seen = BTreeSet::new();
    while let Some(uri) = stack.pop() {
        if uri == to {
            return true;
        }
        if !seen.insert(uri.clone()) {
            continue;
        }
        for member in graph.refs(&uri, props::MEMBER_ENTITY_REFERENCE) {
            stack.push(member.to_string());
        }
    }
    false
}

/// Every synonym the index knows for a canonical node becomes a
/// relationship xref on it, unioned with what is already there.
fn attach_mapped_synonyms(graph: &mut Graph, scheme: &UriScheme, index: &MappingIndex) -> Result<(), KiraError> {
    let mut additions = Vec::new();
    for node in graph.nodes() {
        if !node.kind.is_resolvable() {
            continue;
        }
        let existing: BTreeSet<(String, String)> = graph
            .xrefs(&node.uri)
            .into_iter()
            .map(|(_, xref)| (xref.collection, xref.id))
            .collect();
        for primary in graph.unification_xrefs(&node.uri) {
            for (collection, id) in index.synonyms(&primary.collection, &primary.id) {
                if !existing.contains(&(collection.clone(), id.clone())) {
                    additions.push((node.uri.clone(), Xref::relationship(&collection, &id, REL_IDENTITY)));
                }
            }
        }
    }
    for (uri, xref) in additions {
        let xref_uri = graph.ensure_xref(scheme, &xref)?;
        graph.add_edge(&uri, props::XREF, &xref_uri)?;
    }
    Ok(())
}
