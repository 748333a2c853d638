mod common;

use assert_matches::assert_matches;

use kira_pathway_merger::domain::{
    BioKind, NodeKind, REL_ADDITIONAL_INFORMATION, ReferenceKind, XrefKind,
};
use kira_pathway_merger::error::KiraError;
use kira_pathway_merger::graph::{Graph, Node, props};
use kira_pathway_merger::merger::{
    MergeSettings, Merger, Resolution, break_pathway_cycles, prune_dangling,
};
use kira_pathway_merger::warehouse::WarehouseBuild;

const INSULIN: &str = "http://identifiers.org/uniprot/P01308";
const LACTIC_ACID: &str = "http://identifiers.org/chebi/CHEBI:422";
const HUMAN: &str = "http://identifiers.org/taxonomy/9606";
const REACTOME_PROVENANCE: &str = "http://pathwaycommons.org/pc2/provenance/reactome";

fn merger(build: &WarehouseBuild) -> Merger<'_> {
    Merger::new(&build.warehouse, &build.index, MergeSettings::default())
}

fn pathway(uri: &str) -> Node {
    Node::new(uri, NodeKind::BiologicalEntity(BioKind::Pathway))
}

fn entity(uri: &str) -> Node {
    Node::new(uri, NodeKind::BiologicalEntity(BioKind::PhysicalEntity))
}

fn protein(uri: &str) -> Node {
    Node::new(uri, NodeKind::EntityReference(ReferenceKind::Protein))
}

fn xref(uri: &str, db: &str, id: &str, kind: &str) -> Node {
    Node::new(uri, NodeKind::CrossReference)
        .with_literal(props::DB, db)
        .with_literal(props::ID, id)
        .with_literal(props::XREF_TYPE, kind)
}

/// `pe --entityReference--> er --xref--> x(db:id)`
fn referenced_protein(graph: &mut Graph, prefix: &str, db: &str, id: &str) {
    let pe = format!("{prefix}/pe");
    let er = format!("{prefix}/er");
    let x = format!("{prefix}/x");
    graph.add_node(entity(&pe)).unwrap();
    graph.add_node(protein(&er)).unwrap();
    graph.add_node(xref(&x, db, id, "unification")).unwrap();
    graph.add_edge(&pe, props::ENTITY_REFERENCE, &er).unwrap();
    graph.add_edge(&er, props::XREF, &x).unwrap();
}

fn document(graph: &Graph) -> serde_json::Value {
    serde_json::to_value(graph.to_document()).unwrap()
}

#[test]
fn refseq_version_resolves_to_uniprot_primary() {
    let build = common::build_warehouse();
    let dataset = common::load("dataset_reactome.json", "reactome");
    let mut target = Graph::new();

    let report = merger(&build)
        .merge(dataset, &common::label("reactome"), &mut target)
        .unwrap();

    assert_eq!(report.dataset, "reactome");
    assert_eq!(report.discovered, 3);
    assert_eq!(report.resolved, 3);
    assert_eq!(report.unresolved, 0);
    assert_eq!(report.ambiguous, 0);
    assert_eq!(report.skipped_records, 1);
    assert_eq!(report.xrefs_pruned, 3);
    assert_eq!(report.xrefs_migrated, 2);
    assert_eq!(report.deduplicated, 2);
    assert_eq!(report.dangling_pruned, 3);
    assert_eq!(report.nodes_added, target.len());

    let protein_entity = "http://www.reactome.org/biopax/68/Protein1";
    assert_eq!(target.refs(protein_entity, props::ENTITY_REFERENCE), vec![INSULIN]);
    assert!(!target.contains("http://www.reactome.org/biopax/68/ProteinReference1"));
    assert!(!target.contains("http://www.reactome.org/biopax/68/BioSource1"));
    assert_eq!(target.refs(INSULIN, props::ORGANISM), vec![HUMAN]);

    let insulin_xrefs: Vec<_> = target.xrefs(INSULIN).into_iter().map(|(uri, _)| uri).collect();
    assert!(insulin_xrefs.contains(&"http://www.reactome.org/biopax/68/RelationshipXref_ensembl".to_string()));
    assert_eq!(target.unification_xrefs(INSULIN).len(), 1);
    assert!(!target.contains("http://www.reactome.org/biopax/68/UnificationXref_refseq"));

    target.check_integrity().unwrap();
    common::assert_no_dangling(&target);
}

#[test]
fn provenance_replaces_dataset_values() {
    let build = common::build_warehouse();
    let dataset = common::load("dataset_reactome.json", "reactome");
    let mut target = Graph::new();
    merger(&build)
        .merge(dataset, &common::label("reactome"), &mut target)
        .unwrap();

    for node in target.nodes().filter(|n| n.kind.is_top_level()) {
        assert_eq!(target.refs(&node.uri, props::DATA_SOURCE), vec![REACTOME_PROVENANCE]);
    }
    assert!(!target.contains("http://www.reactome.org/biopax/68/Provenance1"));
    let provenance = target.node(REACTOME_PROVENANCE).unwrap();
    assert_eq!(provenance.kind, NodeKind::Provenance);
    assert_eq!(provenance.text(props::DISPLAY_NAME), Some("reactome"));
}

#[test]
fn two_datasets_share_one_canonical_small_molecule() {
    let build = common::build_warehouse();
    let merger = merger(&build);
    let mut target = Graph::new();

    merger
        .merge(common::load("dataset_reactome.json", "reactome"), &common::label("reactome"), &mut target)
        .unwrap();
    let report = merger
        .merge(common::load("dataset_kegg.json", "kegg"), &common::label("kegg"), &mut target)
        .unwrap();

    assert_eq!(report.resolved, 1);
    let molecules: Vec<_> = target
        .nodes()
        .filter(|n| n.kind == NodeKind::EntityReference(ReferenceKind::SmallMolecule))
        .map(|n| n.uri.as_str())
        .collect();
    assert_eq!(molecules, vec![LACTIC_ACID]);
    assert_eq!(
        target.inverse_refs(LACTIC_ACID, props::ENTITY_REFERENCE),
        vec![
            "http://www.reactome.org/biopax/68/SmallMolecule1",
            "http://www.kegg.jp/compound/C00186/entity",
        ]
    );
    assert_eq!(
        target.refs("http://www.kegg.jp/pathway/map00620", props::DATA_SOURCE),
        vec!["http://pathwaycommons.org/pc2/provenance/kegg"]
    );
    assert!(!target.contains("http://www.kegg.jp/compound/C00186"));

    target.check_integrity().unwrap();
    common::assert_no_dangling(&target);
}

#[test]
fn merging_the_same_dataset_twice_is_idempotent() {
    let build = common::build_warehouse();
    let merger = merger(&build);
    let mut target = Graph::new();

    merger
        .merge(common::load("dataset_reactome.json", "reactome"), &common::label("reactome"), &mut target)
        .unwrap();
    let once = document(&target);
    let again = merger
        .merge(common::load("dataset_reactome.json", "reactome"), &common::label("reactome"), &mut target)
        .unwrap();

    assert_eq!(again.nodes_added, 0);
    assert_eq!(document(&target), once);
}

#[test]
fn parallel_resolution_matches_sequential() {
    let build = common::build_warehouse();
    let settings = MergeSettings {
        parallel_threshold: 1,
        ..MergeSettings::default()
    };
    let parallel = Merger::new(&build.warehouse, &build.index, settings);

    let mut a = Graph::new();
    let mut b = Graph::new();
    merger(&build)
        .merge(common::load("dataset_reactome.json", "reactome"), &common::label("reactome"), &mut a)
        .unwrap();
    parallel
        .merge(common::load("dataset_reactome.json", "reactome"), &common::label("reactome"), &mut b)
        .unwrap();

    assert_eq!(document(&a), document(&b));
}

#[test]
fn ambiguous_nodes_stay_unresolved() {
    let build = common::build_warehouse();
    let mut dataset = Graph::new();
    referenced_protein(&mut dataset, "http://ex.org", "RefSeq", "NP_999999.3");

    let merger = merger(&build);
    assert_matches!(
        merger.resolve(&dataset, "http://ex.org/er"),
        Resolution::Ambiguous(found) if found.len() == 2
    );

    let mut target = Graph::new();
    let report = merger.merge(dataset, &common::label("ex"), &mut target).unwrap();

    assert_eq!(report.ambiguous, 1);
    assert_eq!(report.resolved, 0);
    assert_eq!(report.annotated, 1);
    assert!(target.contains("http://ex.org/er"));
    assert!(!target.contains("http://identifiers.org/uniprot/Q11111"));
    assert!(!target.contains("http://identifiers.org/uniprot/Q22222"));

    let advisory: Vec<_> = target
        .xrefs("http://ex.org/er")
        .into_iter()
        .map(|(_, x)| x)
        .filter(|x| x.relationship_type.as_deref() == Some(REL_ADDITIONAL_INFORMATION))
        .map(|x| x.id)
        .collect();
    assert_eq!(advisory, vec!["Q11111", "Q22222"]);
    target.check_integrity().unwrap();
}

#[test]
fn annotation_respects_the_limit() {
    let build = common::build_warehouse();
    let settings = MergeSettings {
        max_xrefs_by_mapping: 1,
        ..MergeSettings::default()
    };
    let merger = Merger::new(&build.warehouse, &build.index, settings);
    let mut dataset = Graph::new();
    referenced_protein(&mut dataset, "http://ex.org", "refseq", "NP_999999");

    let mut target = Graph::new();
    let report = merger.merge(dataset, &common::label("ex"), &mut target).unwrap();

    assert_eq!(report.annotated, 0);
    assert!(target
        .xrefs("http://ex.org/er")
        .iter()
        .all(|(_, x)| x.kind == XrefKind::Unification));
}

#[test]
fn identical_unresolved_nodes_are_merged() {
    let build = common::build_warehouse();
    let mut dataset = Graph::new();
    referenced_protein(&mut dataset, "http://ex.org/a", "uniprot", "P99999");
    referenced_protein(&mut dataset, "http://ex.org/b", "UniProt", "P99999");

    let mut target = Graph::new();
    let report = merger(&build)
        .merge(dataset, &common::label("ex"), &mut target)
        .unwrap();

    assert_eq!(report.unresolved, 2);
    assert_eq!(report.deduplicated, 2);
    assert!(!target.contains("http://ex.org/b/er"));
    assert!(!target.contains("http://ex.org/b/x"));
    assert_eq!(target.refs("http://ex.org/b/pe", props::ENTITY_REFERENCE), vec!["http://ex.org/a/er"]);
    assert_eq!(target.inverse_refs("http://ex.org/a/er", props::ENTITY_REFERENCE).len(), 2);
    target.check_integrity().unwrap();
}

#[test]
fn later_dataset_overwrites_provenance() {
    let build = common::build_warehouse();
    let merger = merger(&build);
    let mut target = Graph::new();

    let mut first = Graph::new();
    first.add_node(pathway("http://ex.org/pw")).unwrap();
    first.add_node(pathway("http://ex.org/pw_other")).unwrap();
    first
        .add_node(Node::new("http://ex.org/prov", NodeKind::Provenance))
        .unwrap();
    first
        .add_edge("http://ex.org/pw", props::DATA_SOURCE, "http://ex.org/prov")
        .unwrap();
    merger.merge(first, &common::label("alpha"), &mut target).unwrap();

    let alpha = "http://pathwaycommons.org/pc2/provenance/alpha";
    let beta = "http://pathwaycommons.org/pc2/provenance/beta";
    assert_eq!(target.refs("http://ex.org/pw", props::DATA_SOURCE), vec![alpha]);
    assert!(!target.contains("http://ex.org/prov"));

    let mut second = Graph::new();
    second.add_node(pathway("http://ex.org/pw")).unwrap();
    merger.merge(second, &common::label("beta"), &mut target).unwrap();

    assert_eq!(target.refs("http://ex.org/pw", props::DATA_SOURCE), vec![beta]);
    assert_eq!(target.refs("http://ex.org/pw_other", props::DATA_SOURCE), vec![alpha]);

    let mut third = Graph::new();
    third.add_node(pathway("http://ex.org/pw_other")).unwrap();
    merger.merge(third, &common::label("beta"), &mut target).unwrap();

    assert!(!target.contains(alpha));
    assert_eq!(target.inverse_refs(beta, props::DATA_SOURCE).len(), 2);
    target.check_integrity().unwrap();
}

#[test]
fn pathway_cycles_are_broken() {
    let build = common::build_warehouse();
    let mut dataset = Graph::new();
    for uri in ["http://ex.org/a", "http://ex.org/b", "http://ex.org/c"] {
        dataset.add_node(pathway(uri)).unwrap();
    }
    dataset.add_edge("http://ex.org/a", props::PATHWAY_COMPONENT, "http://ex.org/b").unwrap();
    dataset.add_edge("http://ex.org/b", props::PATHWAY_COMPONENT, "http://ex.org/c").unwrap();
    dataset.add_edge("http://ex.org/c", props::PATHWAY_COMPONENT, "http://ex.org/a").unwrap();

    let mut target = Graph::new();
    let report = merger(&build)
        .merge(dataset, &common::label("ex"), &mut target)
        .unwrap();

    assert_eq!(report.cycles_broken, 1);
    assert_eq!(target.refs("http://ex.org/a", props::PATHWAY_COMPONENT), vec!["http://ex.org/b"]);
    assert_eq!(target.refs("http://ex.org/b", props::PATHWAY_COMPONENT), vec!["http://ex.org/c"]);
    assert!(target.refs("http://ex.org/c", props::PATHWAY_COMPONENT).is_empty());
}

#[test]
fn clashing_uri_is_renamed() {
    let build = common::build_warehouse();
    let mut dataset = Graph::new();
    dataset.add_node(entity(INSULIN)).unwrap();
    dataset.add_node(protein("http://ex.org/er")).unwrap();
    dataset
        .add_node(xref("http://ex.org/x", "refseq", "NP_000001.1", "unification"))
        .unwrap();
    dataset.add_edge(INSULIN, props::ENTITY_REFERENCE, "http://ex.org/er").unwrap();
    dataset.add_edge("http://ex.org/er", props::XREF, "http://ex.org/x").unwrap();

    let mut target = Graph::new();
    let report = merger(&build)
        .merge(dataset, &common::label("ex"), &mut target)
        .unwrap();

    let renamed = "http://pathwaycommons.org/pc2/physical_entity_http:__identifiers.org_uniprot_P01308";
    assert_eq!(report.renamed, 1);
    assert_eq!(report.resolved, 1);
    assert_eq!(
        target.node(INSULIN).unwrap().kind,
        NodeKind::EntityReference(ReferenceKind::Protein)
    );
    let node = target.node(renamed).unwrap();
    assert_eq!(node.text(props::COMMENT), Some("REPLACED http://identifiers.org/uniprot/P01308"));
    assert_eq!(target.refs(renamed, props::ENTITY_REFERENCE), vec![INSULIN]);
    target.check_integrity().unwrap();
}

#[test]
fn node_on_canonical_uri_takes_warehouse_content() {
    let build = common::build_warehouse();
    let mut dataset = Graph::new();
    dataset.add_node(entity("http://ex.org/pe")).unwrap();
    dataset
        .add_node(protein(INSULIN).with_literal(props::NAME, "my insulin"))
        .unwrap();
    dataset
        .add_node(xref("http://ex.org/rel", "Ensembl", "ENSG00000254647", "relationship"))
        .unwrap();
    dataset.add_edge("http://ex.org/pe", props::ENTITY_REFERENCE, INSULIN).unwrap();
    dataset.add_edge(INSULIN, props::XREF, "http://ex.org/rel").unwrap();

    let mut target = Graph::new();
    let report = merger(&build)
        .merge(dataset, &common::label("ex"), &mut target)
        .unwrap();

    assert_eq!(report.resolved, 1);
    let insulin = target.node(INSULIN).unwrap();
    assert!(!insulin.texts(props::NAME).contains(&"my insulin"));
    assert_eq!(insulin.text(props::DISPLAY_NAME), Some("INS"));
    assert!(target.refs(INSULIN, props::XREF).contains(&"http://ex.org/rel"));
    assert_eq!(target.refs(INSULIN, props::ORGANISM), vec![HUMAN]);
    target.check_integrity().unwrap();
}

#[test]
fn features_follow_the_canonical_node() {
    let build = common::build_warehouse();
    let mut dataset = Graph::new();
    referenced_protein(&mut dataset, "http://ex.org", "refseq", "NP_000001.1");
    dataset
        .add_node(Node::new("http://ex.org/feature", NodeKind::Feature))
        .unwrap();
    dataset
        .add_edge("http://ex.org/er", props::ENTITY_FEATURE, "http://ex.org/feature")
        .unwrap();

    let mut target = Graph::new();
    merger(&build)
        .merge(dataset, &common::label("ex"), &mut target)
        .unwrap();

    assert_eq!(target.refs(INSULIN, props::ENTITY_FEATURE), vec!["http://ex.org/feature"]);
    assert!(!target.contains("http://ex.org/er"));
}

#[test]
fn broken_documents_are_dataset_errors() {
    let label = common::label("broken");
    let invalid = kira_pathway_merger::dataset::load_dataset(&common::fixture("dataset_broken.json"), &label)
        .unwrap_err();
    assert_matches!(invalid, KiraError::DatasetInvalid { .. });
    assert!(invalid.is_dataset_abort());

    let unreadable =
        kira_pathway_merger::dataset::load_dataset(&common::fixture("dataset_truncated.json"), &label)
            .unwrap_err();
    assert_matches!(unreadable, KiraError::DatasetUnreadable { .. });
    assert!(!unreadable.is_fatal());
}

#[test]
fn prune_dangling_reaches_a_fixed_point() {
    let mut graph = Graph::new();
    graph.add_node(pathway("pw")).unwrap();
    graph.add_node(protein("kept")).unwrap();
    graph.add_node(protein("orphan")).unwrap();
    graph
        .add_node(xref("orphan-x", "uniprot", "P1", "unification"))
        .unwrap();
    graph.add_node(protein("self")).unwrap();
    graph.add_edge("pw", props::PARTICIPANT, "kept").unwrap();
    graph.add_edge("orphan", props::XREF, "orphan-x").unwrap();
    graph.add_edge("self", props::MEMBER_ENTITY_REFERENCE, "self").unwrap();

    assert_eq!(prune_dangling(&mut graph, None), 3);
    assert_eq!(graph.uris(), vec!["kept", "pw"]);
}

#[test]
fn cycle_breaking_leaves_dags_alone() {
    let mut graph = Graph::new();
    for uri in ["a", "b", "c"] {
        graph.add_node(pathway(uri)).unwrap();
    }
    graph.add_edge("a", props::PATHWAY_COMPONENT, "c").unwrap();
    graph.add_edge("b", props::PATHWAY_COMPONENT, "c").unwrap();
    graph.add_edge("a", props::PATHWAY_COMPONENT, "b").unwrap();

    assert_eq!(break_pathway_cycles(&mut graph), 0);
    assert_eq!(graph.edge_count(), 3);
}

#[test]
fn xref_without_a_known_type_never_drives_identity() {
    let build = common::build_warehouse();
    for xref_type in [Some("related-to"), None] {
        let mut dataset = Graph::new();
        dataset.add_node(entity("http://ex.org/pe")).unwrap();
        dataset.add_node(protein("http://ex.org/er")).unwrap();
        let mut x = Node::new("http://ex.org/x", NodeKind::CrossReference)
            .with_literal(props::DB, "uniprot")
            .with_literal(props::ID, "P01308");
        if let Some(value) = xref_type {
            x = x.with_literal(props::XREF_TYPE, value);
        }
        dataset.add_node(x).unwrap();
        dataset.add_edge("http://ex.org/pe", props::ENTITY_REFERENCE, "http://ex.org/er").unwrap();
        dataset.add_edge("http://ex.org/er", props::XREF, "http://ex.org/x").unwrap();

        let mut target = Graph::new();
        let report = merger(&build)
            .merge(dataset, &common::label("ex"), &mut target)
            .unwrap();

        assert_eq!(report.skipped_records, 1);
        assert_eq!(report.discovered, 0);
        assert_eq!(report.resolved, 0);
        assert_eq!(target.refs("http://ex.org/pe", props::ENTITY_REFERENCE), vec!["http://ex.org/er"]);
        assert!(!target.contains("http://ex.org/x"));
        assert!(!target.contains(INSULIN));
    }
}

#[test]
fn standard_uri_id_part_resolves() {
    let build = common::build_warehouse();
    let isoform = "http://identifiers.org/uniprot/P01308-2";
    let mut dataset = Graph::new();
    dataset.add_node(entity("http://ex.org/pe")).unwrap();
    dataset.add_node(protein(isoform)).unwrap();
    dataset.add_edge("http://ex.org/pe", props::ENTITY_REFERENCE, isoform).unwrap();

    let merger = merger(&build);
    assert_eq!(merger.discover(&dataset), vec![isoform]);
    assert_eq!(merger.resolve(&dataset, isoform), Resolution::Resolved(INSULIN.to_string()));

    let mut target = Graph::new();
    let report = merger.merge(dataset, &common::label("ex"), &mut target).unwrap();

    assert_eq!(report.resolved, 1);
    assert_eq!(target.refs("http://ex.org/pe", props::ENTITY_REFERENCE), vec![INSULIN]);
    assert!(!target.contains(isoform));
    assert!(target
        .node(INSULIN)
        .unwrap()
        .texts(props::COMMENT)
        .contains(&"REPLACED http://identifiers.org/uniprot/P01308-2"));
}

#[test]
fn equivalent_features_are_reused() {
    let build = common::build_warehouse();
    let merger = merger(&build);
    let phospho = |uri: &str| {
        Node::new(uri, NodeKind::Feature).with_literal(props::COMMENT, "phosphorylation at S12")
    };

    let mut dataset = Graph::new();
    for prefix in ["http://ex.org/a", "http://ex.org/b"] {
        referenced_protein(&mut dataset, prefix, "refseq", "NP_000001.1");
        let feature = format!("{prefix}/feature");
        dataset.add_node(phospho(&feature)).unwrap();
        dataset
            .add_edge(&format!("{prefix}/er"), props::ENTITY_FEATURE, &feature)
            .unwrap();
    }
    let mut target = Graph::new();
    merger.merge(dataset, &common::label("ex"), &mut target).unwrap();

    assert_eq!(target.refs(INSULIN, props::ENTITY_FEATURE), vec!["http://ex.org/a/feature"]);
    assert!(!target.contains("http://ex.org/b/feature"));
    let comments = target.node(INSULIN).unwrap().texts(props::COMMENT);
    assert!(comments.contains(&"REPLACED http://ex.org/a/er"));
    assert!(comments.contains(&"REPLACED http://ex.org/b/er"));

    let mut later = Graph::new();
    referenced_protein(&mut later, "http://ex.org/c", "refseq", "NP_000001.1");
    later.add_node(phospho("http://ex.org/c/feature")).unwrap();
    later
        .add_edge("http://ex.org/c/er", props::ENTITY_FEATURE, "http://ex.org/c/feature")
        .unwrap();
    merger.merge(later, &common::label("other"), &mut target).unwrap();

    assert_eq!(target.refs(INSULIN, props::ENTITY_FEATURE), vec!["http://ex.org/a/feature"]);
    assert!(!target.contains("http://ex.org/c/feature"));
    target.check_integrity().unwrap();
}

/// Human and mouse interactions plus a generic reference with a mouse member.
fn mixed_organism_dataset() -> Graph {
    let mut dataset = Graph::new();
    let interaction = |uri: &str| Node::new(uri, NodeKind::BiologicalEntity(BioKind::Interaction));
    let molecule = |uri: &str| Node::new(uri, NodeKind::EntityReference(ReferenceKind::SmallMolecule));

    referenced_protein(&mut dataset, "http://ex.org/human", "refseq", "NP_000001.1");
    dataset.add_node(interaction("http://ex.org/human_int")).unwrap();
    dataset
        .add_edge("http://ex.org/human_int", props::PARTICIPANT, "http://ex.org/human/pe")
        .unwrap();

    dataset
        .add_node(Node::new("http://ex.org/mouse", NodeKind::Organism))
        .unwrap();
    dataset
        .add_node(xref("http://ex.org/mouse_x", "NCBI Taxonomy", "10090", "unification"))
        .unwrap();
    dataset.add_edge("http://ex.org/mouse", props::XREF, "http://ex.org/mouse_x").unwrap();
    for uri in ["http://ex.org/mouse_er", "http://ex.org/mouse_member"] {
        dataset.add_node(protein(uri)).unwrap();
        dataset.add_edge(uri, props::ORGANISM, "http://ex.org/mouse").unwrap();
    }
    dataset.add_node(entity("http://ex.org/mouse_pe")).unwrap();
    dataset
        .add_edge("http://ex.org/mouse_pe", props::ENTITY_REFERENCE, "http://ex.org/mouse_er")
        .unwrap();
    dataset.add_node(entity("http://ex.org/sm_pe")).unwrap();
    dataset.add_node(molecule("http://ex.org/sm")).unwrap();
    dataset.add_edge("http://ex.org/sm_pe", props::ENTITY_REFERENCE, "http://ex.org/sm").unwrap();
    dataset.add_node(interaction("http://ex.org/mouse_int")).unwrap();
    for participant in ["http://ex.org/mouse_pe", "http://ex.org/sm_pe"] {
        dataset
            .add_edge("http://ex.org/mouse_int", props::PARTICIPANT, participant)
            .unwrap();
    }

    dataset.add_node(interaction("http://ex.org/sm_int")).unwrap();
    dataset.add_node(entity("http://ex.org/sm_pe2")).unwrap();
    dataset.add_edge("http://ex.org/sm_pe2", props::ENTITY_REFERENCE, "http://ex.org/sm").unwrap();
    dataset.add_edge("http://ex.org/sm_int", props::PARTICIPANT, "http://ex.org/sm_pe2").unwrap();

    let generic = Node::new("http://ex.org/generic", NodeKind::EntityReference(ReferenceKind::Generic));
    dataset.add_node(generic).unwrap();
    dataset
        .add_edge("http://ex.org/generic", props::MEMBER_ENTITY_REFERENCE, "http://ex.org/mouse_member")
        .unwrap();
    dataset.add_node(entity("http://ex.org/generic_pe")).unwrap();
    dataset
        .add_edge("http://ex.org/generic_pe", props::ENTITY_REFERENCE, "http://ex.org/generic")
        .unwrap();
    dataset
}

#[test]
fn unsupported_organisms_are_filtered() {
    let build = common::build_warehouse();
    let merger = merger(&build).with_organisms(vec!["9606".to_string()]);

    let mut target = Graph::new();
    let report = merger
        .merge(mixed_organism_dataset(), &common::label("ex"), &mut target)
        .unwrap();

    assert_eq!(report.organism_filtered, 4);
    for gone in [
        "http://ex.org/mouse_int",
        "http://ex.org/mouse_pe",
        "http://ex.org/sm_pe",
        "http://ex.org/mouse_member",
        "http://ex.org/mouse_er",
    ] {
        assert!(!target.contains(gone), "{gone} should be gone");
    }
    assert_eq!(target.refs("http://ex.org/human_int", props::PARTICIPANT), vec!["http://ex.org/human/pe"]);
    assert!(target.contains("http://ex.org/sm_int"));
    assert!(target
        .refs("http://ex.org/generic", props::MEMBER_ENTITY_REFERENCE)
        .is_empty());
    target.check_integrity().unwrap();
    common::assert_no_dangling(&target);
}

#[test]
fn empty_organism_list_keeps_everything() {
    let build = common::build_warehouse();
    let mut target = Graph::new();
    let report = merger(&build)
        .merge(mixed_organism_dataset(), &common::label("ex"), &mut target)
        .unwrap();

    assert_eq!(report.organism_filtered, 0);
    assert!(target.contains("http://ex.org/mouse_int"));
    assert!(target.contains("http://ex.org/mouse_member"));
}
