use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{
    BioKind, NodeKind, ProvenanceLabel, REL_ADDITIONAL_INFORMATION, ReferenceKind, UriScheme, Xref,
    XrefKind,
};
use crate::error::KiraError;
use crate::graph::{Graph, Node, props};
use crate::mapping::MappingIndex;
use crate::warehouse::Warehouse;

pub const DEFAULT_MAX_XREFS_BY_MAPPING: usize = 5;
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSettings {
    pub max_xrefs_by_mapping: usize,
    /// Resolution runs on the rayon pool once a dataset has at least this
    /// many candidates.
    pub parallel_threshold: usize,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            max_xrefs_by_mapping: DEFAULT_MAX_XREFS_BY_MAPPING,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePhase {
    Prepare,
    Discovery,
    Resolution,
    Rewire,
    OrganismFilter,
    Deduplicate,
    Annotate,
    BreakCycles,
    Provenance,
    Prune,
    Fold,
}

impl fmt::Display for MergePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MergePhase::Prepare => "prepare",
            MergePhase::Discovery => "discovery",
            MergePhase::Resolution => "resolution",
            MergePhase::Rewire => "rewire",
            MergePhase::OrganismFilter => "organism-filter",
            MergePhase::Deduplicate => "deduplicate",
            MergePhase::Annotate => "annotate",
            MergePhase::BreakCycles => "break-cycles",
            MergePhase::Provenance => "provenance",
            MergePhase::Prune => "prune",
            MergePhase::Fold => "fold",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(String),
    Ambiguous(BTreeSet<String>),
    Unresolved,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub dataset: String,
    pub discovered: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub ambiguous: usize,
    pub deduplicated: usize,
    pub xrefs_pruned: usize,
    pub xrefs_migrated: usize,
    pub annotated: usize,
    pub renamed: usize,
    pub cycles_broken: usize,
    pub dangling_pruned: usize,
    pub organism_filtered: usize,
    pub skipped_records: usize,
    pub nodes_added: usize,
}

/// Folds dataset graphs into a target graph, one dataset at a time, using a
/// read-only warehouse and mapping index.
pub struct Merger<'a> {
    warehouse: &'a Warehouse,
    index: &'a MappingIndex,
    settings: MergeSettings,
    organisms: BTreeSet<String>,
}

impl<'a> Merger<'a> {
    pub fn new(warehouse: &'a Warehouse, index: &'a MappingIndex, settings: MergeSettings) -> Self {
        Self {
            warehouse,
            index,
            settings,
            organisms: BTreeSet::new(),
        }
    }

    /// Supported taxonomy ids. Empty means every organism is kept.
    pub fn with_organisms(mut self, taxa: impl IntoIterator<Item = String>) -> Self {
        self.organisms = taxa.into_iter().collect();
        self
    }

    fn scheme(&self) -> &UriScheme {
        &self.warehouse.scheme
    }

    /// Merges one dataset into `target`. On error `target` is left as it was.
    pub fn merge(
        &self,
        dataset: Graph,
        provenance: &ProvenanceLabel,
        target: &mut Graph,
    ) -> Result<MergeReport, KiraError> {
        let (prepared, mut report) = self.prepare(dataset, provenance, target)?;
        report.nodes_added = self.fold(prepared, target)?;
        info!(
            dataset = provenance.as_str(),
            resolved = report.resolved,
            unresolved = report.unresolved,
            ambiguous = report.ambiguous,
            deduplicated = report.deduplicated,
            dangling_pruned = report.dangling_pruned,
            added = report.nodes_added,
            "dataset merged"
        );
        Ok(report)
    }

    /// Runs every phase up to the fold and returns the dataset ready to be
    /// added to `target`. Reads `target` only to avoid URI clashes.
    pub fn prepare(
        &self,
        mut dataset: Graph,
        provenance: &ProvenanceLabel,
        target: &Graph,
    ) -> Result<(Graph, MergeReport), KiraError> {
        let mut report = MergeReport {
            dataset: provenance.to_string(),
            ..MergeReport::default()
        };
        let label = provenance.as_str();

        self.enter(MergePhase::Prepare, label);
        dataset
            .check_integrity()
            .map_err(|err| KiraError::DatasetInvalid {
                label: label.to_string(),
                message: err.to_string(),
            })?;
        report.skipped_records += self.cleanup_xrefs(&mut dataset, label);
        report.renamed += self.rename_conflicts(&mut dataset, provenance)?;

        self.enter(MergePhase::Discovery, label);
        let candidates = self.discover(&dataset);
        report.discovered = candidates.len();

        self.enter(MergePhase::Resolution, label);
        let resolutions = self.resolve_all(&dataset, &candidates);

        self.enter(MergePhase::Rewire, label);
        let mut leftovers = Vec::new();
        for (uri, resolution) in &resolutions {
            match resolution {
                Resolution::Resolved(canonical) => {
                    self.rewire(&mut dataset, target, uri, canonical, &mut report)?;
                    report.resolved += 1;
                }
                Resolution::Ambiguous(found) => {
                    debug!(dataset = label, uri = %uri, candidates = ?found, "ambiguous resolution, keeping node");
                    report.ambiguous += 1;
                    leftovers.push(uri.clone());
                }
                Resolution::Unresolved => {
                    report.unresolved += 1;
                    leftovers.push(uri.clone());
                }
            }
        }

        self.enter(MergePhase::OrganismFilter, label);
        report.organism_filtered = self.filter_organisms(&mut dataset, label);

        self.enter(MergePhase::Deduplicate, label);
        report.deduplicated += self.dedup_xrefs(&mut dataset, target)?;
        report.deduplicated += self.dedup_unresolved(&mut dataset, &leftovers)?;

        self.enter(MergePhase::Annotate, label);
        report.annotated = self.annotate_by_mapping(&mut dataset, &leftovers)?;

        self.enter(MergePhase::BreakCycles, label);
        report.cycles_broken = break_pathway_cycles(&mut dataset);

        self.enter(MergePhase::Provenance, label);
        self.assign_provenance(&mut dataset, provenance)?;

        self.enter(MergePhase::Prune, label);
        report.dangling_pruned = prune_dangling(&mut dataset, None);

        report.renamed += self.rename_target_conflicts(&mut dataset, target)?;
        Ok((dataset, report))
    }

    /// Adds a prepared dataset to the target and returns how many nodes
    /// were new.
    pub fn fold(&self, prepared: Graph, target: &mut Graph) -> Result<usize, KiraError> {
        debug!(phase = %MergePhase::Fold, "entering merge phase");
        fold_into(prepared, target)
    }

    fn enter(&self, phase: MergePhase, label: &str) {
        debug!(dataset = label, phase = %phase, "entering merge phase");
    }

    /// Drops xrefs without a collection or id and canonicalizes collection
    /// names. Returns how many xrefs were dropped.
    fn cleanup_xrefs(&self, dataset: &mut Graph, label: &str) -> usize {
        let normalizer = self.index.normalizer();
        let mut dropped = 0;
        for uri in dataset.uris() {
            let Some(node) = dataset.node(&uri) else {
                continue;
            };
            if node.kind != NodeKind::CrossReference {
                continue;
            }
            match node.as_xref() {
                Some(xref) => {
                    let collection = normalizer.collection(&xref.collection);
                    if let Some(node) = dataset.node_mut(&uri) {
                        node.set_literal(props::DB, collection);
                    }
                }
                None => {
                    let err = KiraError::InvalidXref(uri.clone());
                    warn!(dataset = label, error = %err, "dropping cross-reference");
                    dataset.remove_node(&uri);
                    dropped += 1;
                }
            }
        }
        dropped
    }

    /// Renames dataset nodes whose URI is taken by a warehouse node of a
    /// different kind, or that squat on the provenance URI.
    fn rename_conflicts(&self, dataset: &mut Graph, provenance: &ProvenanceLabel) -> Result<usize, KiraError> {
        let provenance_uri = self.scheme().provenance(provenance);
        let conflicts: Vec<(String, NodeKind)> = dataset
            .nodes()
            .filter(|node| {
                let warehouse_clash = self
                    .warehouse
                    .node(&node.uri)
                    .is_some_and(|existing| existing.kind != node.kind);
                let provenance_clash = node.uri == provenance_uri && node.kind != NodeKind::Provenance;
                warehouse_clash || provenance_clash
            })
            .map(|node| (node.uri.clone(), node.kind))
            .collect();
        for (uri, kind) in &conflicts {
            let fresh = self.free_uri(*kind, uri, |candidate| {
                dataset.contains(candidate) || self.warehouse.node(candidate).is_some()
            });
            rename_with_note(dataset, uri, &fresh)?;
        }
        Ok(conflicts.len())
    }

    fn rename_target_conflicts(&self, dataset: &mut Graph, target: &Graph) -> Result<usize, KiraError> {
        let conflicts: Vec<(String, NodeKind)> = dataset
            .nodes()
            .filter(|node| {
                target
                    .node(&node.uri)
                    .is_some_and(|existing| existing.kind != node.kind)
            })
            .map(|node| (node.uri.clone(), node.kind))
            .collect();
        for (uri, kind) in &conflicts {
            let fresh = self.free_uri(*kind, uri, |candidate| {
                let taken_in_target = target
                    .node(candidate)
                    .is_some_and(|existing| existing.kind != *kind);
                dataset.contains(candidate) || taken_in_target
            });
            rename_with_note(dataset, uri, &fresh)?;
        }
        Ok(conflicts.len())
    }

    /// Deterministic replacement URI, suffixed until `taken` says it is free.
    fn free_uri(&self, kind: NodeKind, uri: &str, taken: impl Fn(&str) -> bool) -> String {
        let base = self.scheme().derived(kind, uri);
        let mut candidate = base.clone();
        let mut n = 1;
        while taken(&candidate) {
            n += 1;
            candidate = format!("{base}_{n}");
        }
        candidate
    }

    /// Nodes eligible for resolution, in URI order.
    pub fn discover(&self, dataset: &Graph) -> Vec<String> {
        dataset
            .nodes()
            .filter(|node| node.kind.is_resolvable())
            .filter(|node| {
                let canonical = self
                    .warehouse
                    .node(&node.uri)
                    .is_some_and(|existing| existing.kind == node.kind);
                canonical
                    || self.scheme().parse_canonical(&node.uri).is_some()
                    || !dataset.unification_xrefs(&node.uri).is_empty()
            })
            .map(|node| node.uri.clone())
            .collect()
    }

    fn resolve_all(&self, dataset: &Graph, candidates: &[String]) -> Vec<(String, Resolution)> {
        if candidates.len() >= self.settings.parallel_threshold {
            candidates
                .par_iter()
                .map(|uri| (uri.clone(), self.resolve(dataset, uri)))
                .collect()
        } else {
            candidates
                .iter()
                .map(|uri| (uri.clone(), self.resolve(dataset, uri)))
                .collect()
        }
    }

    /// Exact canonical URI first, then each unification xref and the id
    /// part of a standard URI: its own canonical URI, then the mapping
    /// index. Only warehouse nodes of the same kind count as candidates.
    pub fn resolve(&self, dataset: &Graph, uri: &str) -> Resolution {
        let Some(node) = dataset.node(uri) else {
            return Resolution::Unresolved;
        };
        if self
            .warehouse
            .node(uri)
            .is_some_and(|existing| existing.kind == node.kind)
        {
            return Resolution::Resolved(uri.to_string());
        }

        let mut keys: Vec<(String, String)> = dataset
            .unification_xrefs(uri)
            .into_iter()
            .map(|xref| (xref.collection, xref.id))
            .collect();
        keys.extend(self.scheme().parse_canonical(uri));

        let normalizer = self.index.normalizer();
        let mut found = BTreeSet::new();
        for (raw_collection, raw_id) in keys {
            let collection = normalizer.collection(&raw_collection);
            let id = normalizer.normalize(&collection, &raw_id);
            let target_collection = node
                .kind
                .target_collection()
                .map(str::to_string)
                .unwrap_or_else(|| collection.clone());

            if collection == target_collection {
                let direct = self.scheme().canonical(&collection, &id);
                if self.is_canonical_of(&direct, node.kind) {
                    found.insert(direct);
                    continue;
                }
            }
            for primary in self.index.map(&raw_id, &target_collection, Some(&collection)) {
                let mapped = self.scheme().canonical(&target_collection, &primary);
                if self.is_canonical_of(&mapped, node.kind) {
                    found.insert(mapped);
                }
            }
        }

        match found.len() {
            0 => Resolution::Unresolved,
            1 => found
                .into_iter()
                .next()
                .map(Resolution::Resolved)
                .unwrap_or(Resolution::Unresolved),
            _ => Resolution::Ambiguous(found),
        }
    }

    fn is_canonical_of(&self, uri: &str, kind: NodeKind) -> bool {
        self.warehouse
            .node(uri)
            .is_some_and(|existing| existing.kind == kind)
    }

    /// Points everything that referenced `uri` at `canonical`, carries over
    /// relationship xrefs and features, and drops the dataset node.
    fn rewire(
        &self,
        dataset: &mut Graph,
        target: &Graph,
        uri: &str,
        canonical: &str,
        report: &mut MergeReport,
    ) -> Result<(), KiraError> {
        if !dataset.contains(uri) {
            return Ok(());
        }
        let outgoing = dataset.outgoing(uri).to_vec();
        if uri == canonical {
            for (prop, dst) in &outgoing {
                dataset.remove_edge(uri, prop, dst);
            }
            if let (Some(node), Some(original)) = (dataset.node_mut(uri), self.warehouse.node(canonical)) {
                node.literals = original.literals.clone();
            }
            dataset.import_closure(self.warehouse.graph(), canonical)?;
        } else {
            dataset.import_closure(self.warehouse.graph(), canonical)?;
            dataset.replace_references(uri, canonical)?;
            dataset.remove_node(uri);
            if let Some(node) = dataset.node_mut(canonical) {
                node.push_literal(props::COMMENT, format!("REPLACED {uri}"));
            }
        }

        let mut known: HashSet<_> = dataset
            .xrefs(canonical)
            .into_iter()
            .map(|(_, xref)| xref.identity_key())
            .collect();
        for (prop, dst) in outgoing {
            if !dataset.contains(&dst) || dst == uri {
                continue;
            }
            match prop.as_str() {
                props::XREF => {
                    let Some(xref) = dataset.node(&dst).and_then(Node::as_xref) else {
                        continue;
                    };
                    if xref.kind == XrefKind::Unification {
                        report.xrefs_pruned += 1;
                        continue;
                    }
                    if known.insert(xref.identity_key()) {
                        dataset.add_edge(canonical, props::XREF, &dst)?;
                        report.xrefs_migrated += 1;
                    }
                }
                props::ENTITY_FEATURE => {
                    match equivalent_feature(dataset, target, canonical, &dst) {
                        Some(existing) => {
                            if !dataset.contains(&existing) {
                                dataset.import_closure(target, &existing)?;
                            }
                            dataset.replace_references(&dst, &existing)?;
                            dataset.remove_node(&dst);
                            dataset.add_edge(canonical, props::ENTITY_FEATURE, &existing)?;
                            report.deduplicated += 1;
                        }
                        None => {
                            dataset.add_edge(canonical, props::ENTITY_FEATURE, &dst)?;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Merges identity-equal cross-references. A URI already known to the
    /// warehouse or the target wins, then the smallest URI.
    fn dedup_xrefs(&self, dataset: &mut Graph, target: &Graph) -> Result<usize, KiraError> {
        let mut groups: BTreeMap<_, Vec<String>> = BTreeMap::new();
        for node in dataset.nodes() {
            if let Some(xref) = node.as_xref() {
                groups
                    .entry(xref.identity_key())
                    .or_default()
                    .push(node.uri.clone());
            }
        }
        let mut merged = 0;
        for (_, mut uris) in groups {
            if uris.len() < 2 {
                continue;
            }
            uris.sort_by_key(|uri| {
                let rank = if self.warehouse.node(uri).is_some() {
                    0
                } else if target.contains(uri) {
                    1
                } else {
                    2
                };
                (rank, uri.clone())
            });
            let survivor = &uris[0];
            for victim in &uris[1..] {
                dataset.merge_node_into(victim, survivor)?;
                merged += 1;
            }
        }
        Ok(merged)
    }

    /// Merges unresolved nodes of the same kind carrying the same set of
    /// unification xrefs into the smallest URI of the group.
    fn dedup_unresolved(
        &self,
        dataset: &mut Graph,
        leftovers: &[String],
    ) -> Result<usize, KiraError> {
        let mut groups: BTreeMap<(NodeKind, Vec<_>), Vec<String>> = BTreeMap::new();
        for uri in leftovers {
            let Some(node) = dataset.node(uri) else {
                continue;
            };
            let mut keys: Vec<_> = dataset
                .unification_xrefs(uri)
                .iter()
                .map(Xref::identity_key)
                .collect();
            if keys.is_empty() {
                continue;
            }
            keys.sort();
            keys.dedup();
            groups.entry((node.kind, keys)).or_default().push(uri.clone());
        }
        let mut merged = 0;
        for (_, mut uris) in groups {
            if uris.len() < 2 {
                continue;
            }
            uris.sort();
            let survivor = uris[0].clone();
            for victim in &uris[1..] {
                dataset.merge_node_into(victim, &survivor)?;
                merged += 1;
            }
        }
        Ok(merged)
    }

    /// Gives unresolved or ambiguous entity references advisory xrefs to the
    /// primary ids their xrefs map to, unless there are too many.
    fn annotate_by_mapping(
        &self,
        dataset: &mut Graph,
        leftovers: &[String],
    ) -> Result<usize, KiraError> {
        let normalizer = self.index.normalizer();
        let mut annotated = 0;
        for uri in leftovers {
            let Some(node) = dataset.node(uri) else {
                continue;
            };
            let NodeKind::EntityReference(kind) = node.kind else {
                continue;
            };
            let Some(target_collection) = kind.target_collection() else {
                continue;
            };
            let mut primaries = BTreeSet::new();
            for (_, xref) in dataset.xrefs(uri) {
                if xref.kind == XrefKind::Publication {
                    continue;
                }
                let collection = normalizer.collection(&xref.collection);
                if collection == target_collection {
                    continue;
                }
                primaries.extend(self.index.map(&xref.id, target_collection, Some(&collection)));
            }
            if primaries.is_empty() || primaries.len() > self.settings.max_xrefs_by_mapping {
                continue;
            }
            for primary in primaries {
                let xref = Xref::relationship(target_collection, &primary, REL_ADDITIONAL_INFORMATION);
                let xref_uri = dataset.ensure_xref(self.scheme(), &xref)?;
                dataset.add_edge(uri, props::XREF, &xref_uri)?;
            }
            annotated += 1;
        }
        Ok(annotated)
    }

    /// Drops interactions whose sequence participants all come from
    /// unsupported organisms, and unresolved sequence references from
    /// unsupported organisms that no physical entity uses. Returns how many
    /// nodes were removed.
    fn filter_organisms(&self, dataset: &mut Graph, label: &str) -> usize {
        if self.organisms.is_empty() {
            return 0;
        }
        let mut removed = 0;

        let references: Vec<String> = dataset
            .nodes()
            .filter(|node| is_sequence_reference(node.kind))
            .filter(|node| !self.is_canonical_of(&node.uri, node.kind))
            .map(|node| node.uri.clone())
            .collect();
        for uri in references {
            if !dataset.inverse_refs(&uri, props::ENTITY_REFERENCE).is_empty()
                || self.organism_supported(dataset, &uri)
            {
                continue;
            }
            info!(dataset = label, uri = %uri, "unresolved member reference removed, unsupported organism");
            dataset.remove_node(&uri);
            removed += 1;
        }

        let interactions: Vec<String> = dataset
            .nodes()
            .filter(|node| node.kind == NodeKind::BiologicalEntity(BioKind::Interaction))
            .map(|node| node.uri.clone())
            .collect();
        for uri in interactions {
            let participants: Vec<String> = dataset
                .refs(&uri, props::PARTICIPANT)
                .into_iter()
                .map(str::to_string)
                .collect();
            let graph: &Graph = dataset;
            let verdicts: Vec<Participant> = participants
                .iter()
                .map(|participant| self.participant(graph, participant))
                .collect();
            let unwanted = verdicts.contains(&Participant::Unsupported)
                && !verdicts.contains(&Participant::Keep);
            if !unwanted {
                continue;
            }
            info!(dataset = label, uri = %uri, "interaction removed, all participants come from unsupported organisms");
            dataset.remove_node(&uri);
            removed += 1;
            for participant in participants {
                let orphan = dataset.node(&participant).is_some_and(|node| {
                    node.kind == NodeKind::BiologicalEntity(BioKind::PhysicalEntity)
                }) && dataset
                    .incoming(&participant)
                    .iter()
                    .all(|(_, src)| src == &participant);
                if orphan {
                    dataset.remove_node(&participant);
                    removed += 1;
                }
            }
        }
        removed
    }

    fn participant(&self, dataset: &Graph, uri: &str) -> Participant {
        let Some(node) = dataset.node(uri) else {
            return Participant::Keep;
        };
        if node.kind != NodeKind::BiologicalEntity(BioKind::PhysicalEntity) {
            return Participant::Keep;
        }
        let Some(reference) = dataset.refs(uri, props::ENTITY_REFERENCE).first().copied() else {
            return Participant::Keep;
        };
        match dataset.node(reference).map(|node| node.kind) {
            Some(NodeKind::EntityReference(ReferenceKind::SmallMolecule)) => Participant::Neutral,
            Some(kind) if is_sequence_reference(kind) => {
                let unknown = dataset.refs(reference, props::ORGANISM).is_empty();
                if unknown || self.organism_supported(dataset, reference) {
                    Participant::Keep
                } else {
                    Participant::Unsupported
                }
            }
            _ => Participant::Keep,
        }
    }

    /// True when the organism of `reference` carries a supported taxon id.
    fn organism_supported(&self, dataset: &Graph, reference: &str) -> bool {
        dataset.refs(reference, props::ORGANISM).into_iter().any(|organism| {
            let from_uri = self
                .scheme()
                .parse_canonical(organism)
                .map(|(_, id)| id);
            dataset
                .xrefs(organism)
                .into_iter()
                .map(|(_, xref)| xref.id)
                .chain(from_uri)
                .any(|taxon| self.organisms.contains(taxon.trim()))
        })
    }

    /// Every top-level entity ends up with exactly this dataset's provenance.
    fn assign_provenance(&self, dataset: &mut Graph, provenance: &ProvenanceLabel) -> Result<(), KiraError> {
        let provenance_uri = self.scheme().provenance(provenance);
        let node = Node::new(provenance_uri.clone(), NodeKind::Provenance)
            .with_literal(props::NAME, provenance.as_str())
            .with_literal(props::DISPLAY_NAME, provenance.as_str());
        dataset.upsert_node(node)?;
        let top_level: Vec<String> = dataset
            .nodes()
            .filter(|node| node.kind.is_top_level())
            .map(|node| node.uri.clone())
            .collect();
        for uri in top_level {
            dataset.clear_property(&uri, props::DATA_SOURCE);
            dataset.add_edge(&uri, props::DATA_SOURCE, &provenance_uri)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Participant {
    Keep,
    Neutral,
    Unsupported,
}

fn is_sequence_reference(kind: NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::EntityReference(ReferenceKind::Protein | ReferenceKind::Dna | ReferenceKind::Rna)
    )
}

/// A feature already attached to `canonical`, in the dataset or the
/// target, with the same literals and outgoing edges as `feature`.
fn equivalent_feature(dataset: &Graph, target: &Graph, canonical: &str, feature: &str) -> Option<String> {
    let node = dataset.node(feature)?;
    let edges = sorted_outgoing(dataset, feature);
    [dataset, target].into_iter().find_map(|graph| {
        graph
            .refs(canonical, props::ENTITY_FEATURE)
            .into_iter()
            .filter(|candidate| *candidate != feature)
            .find(|candidate| {
                graph.node(candidate).is_some_and(|other| {
                    other.kind == node.kind
                        && other.literals == node.literals
                        && sorted_outgoing(graph, candidate) == edges
                })
            })
            .map(str::to_string)
    })
}

fn sorted_outgoing(graph: &Graph, uri: &str) -> Vec<(String, String)> {
    let mut edges = graph.outgoing(uri).to_vec();
    edges.sort();
    edges
}

fn rename_with_note(graph: &mut Graph, old: &str, new: &str) -> Result<(), KiraError> {
    graph.rename_node(old, new)?;
    if let Some(node) = graph.node_mut(new) {
        node.push_literal(props::COMMENT, format!("REPLACED {old}"));
    }
    warn!(from = old, to = new, "renamed node with a clashing URI");
    Ok(())
}

/// Removes `pathwayComponent` edges that lead back to a pathway already on
/// the current path. Returns how many edges were dropped.
pub fn break_pathway_cycles(graph: &mut Graph) -> usize {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Active,
        Done,
    }

    let mut marks: HashMap<String, Mark> = HashMap::new();
    let mut back_edges = Vec::new();
    let roots: Vec<String> = graph
        .nodes()
        .filter(|node| node.kind == NodeKind::BiologicalEntity(BioKind::Pathway))
        .map(|node| node.uri.clone())
        .collect();

    for root in roots {
        if marks.contains_key(&root) {
            continue;
        }
        let mut stack: Vec<(String, Vec<String>)> = Vec::new();
        marks.insert(root.clone(), Mark::Active);
        let children = components(graph, &root);
        stack.push((root, children));
        loop {
            let Some((uri, children)) = stack.last_mut() else {
                break;
            };
            let next = children.pop();
            let uri = uri.clone();
            match next {
                Some(child) => match marks.get(&child) {
                    Some(Mark::Active) => back_edges.push((uri, child)),
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(child.clone(), Mark::Active);
                        let grandchildren = components(graph, &child);
                        stack.push((child, grandchildren));
                    }
                },
                None => {
                    marks.insert(uri, Mark::Done);
                    stack.pop();
                }
            }
        }
    }

    for (src, dst) in &back_edges {
        warn!(pathway = %src, component = %dst, "breaking pathway component cycle");
        graph.remove_edge(src, props::PATHWAY_COMPONENT, dst);
    }
    back_edges.len()
}

fn components(graph: &Graph, uri: &str) -> Vec<String> {
    let mut children: Vec<String> = graph
        .refs(uri, props::PATHWAY_COMPONENT)
        .into_iter()
        .map(str::to_string)
        .collect();
    children.reverse();
    children
}

/// Removes non-top-level nodes nobody else points at, until none are left.
/// With `only`, the sweep starts from those URIs instead of the whole graph.
pub fn prune_dangling(graph: &mut Graph, only: Option<Vec<String>>) -> usize {
    let mut queue: VecDeque<String> = match only {
        Some(uris) => uris.into(),
        None => graph.uris().into(),
    };
    let mut removed = 0;
    while let Some(uri) = queue.pop_front() {
        let Some(node) = graph.node(&uri) else {
            continue;
        };
        if node.kind.is_top_level() {
            continue;
        }
        let referenced = graph.incoming(&uri).iter().any(|(_, src)| src != &uri);
        if referenced {
            continue;
        }
        let targets: Vec<String> = graph
            .outgoing(&uri)
            .iter()
            .map(|(_, dst)| dst.clone())
            .filter(|dst| dst != &uri)
            .collect();
        graph.remove_node(&uri);
        removed += 1;
        queue.extend(targets);
    }
    removed
}

/// Adds the prepared dataset to the target. Top-level entities already in
/// the target lose their old provenance; provenance nodes left without
/// referrers are dropped.
fn fold_into(dataset: Graph, target: &mut Graph) -> Result<usize, KiraError> {
    if let Some(node) = dataset
        .nodes()
        .find(|node| target.node(&node.uri).is_some_and(|existing| existing.kind != node.kind))
    {
        return Err(KiraError::IntegrityViolation(format!(
            "{} still clashes with the target graph",
            node.uri
        )));
    }
    let mut previous_sources = Vec::new();
    let overwritten: Vec<String> = dataset
        .nodes()
        .filter(|node| node.kind.is_top_level() && target.contains(&node.uri))
        .map(|node| node.uri.clone())
        .collect();
    for uri in overwritten {
        previous_sources.extend(target.clear_property(&uri, props::DATA_SOURCE));
    }
    let added = target.absorb(dataset)?;
    prune_dangling(target, Some(previous_sources));
    Ok(added)
}
