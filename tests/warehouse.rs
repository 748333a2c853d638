mod common;

use std::collections::BTreeSet;

use kira_pathway_merger::domain::{
    NodeKind, REL_IDENTITY, REL_SECONDARY_ACCESSION, ReferenceKind, UriScheme, XrefKind,
};
use kira_pathway_merger::graph::{Literal, props};
use kira_pathway_merger::normalize::Normalizer;
use kira_pathway_merger::reference::{RecordKind, ReferenceRecord, Synonym, SynonymRelation};
use kira_pathway_merger::warehouse::WarehouseBuilder;

const INSULIN: &str = "http://identifiers.org/uniprot/P01308";
const LACTIC_ACID: &str = "http://identifiers.org/chebi/CHEBI:422";
const CARBOXYLIC_ACID: &str = "http://identifiers.org/chebi/CHEBI:33584";

fn empty_builder() -> WarehouseBuilder {
    WarehouseBuilder::new(Normalizer::with_default_rules().unwrap(), UriScheme::default())
}

fn set(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[test]
fn report_counts_records() {
    let build = common::build_warehouse();
    let report = &build.report;

    assert_eq!(report.build_id, "20260101T000000000Z");
    assert_eq!(report.records, 8);
    assert_eq!(report.skipped_records, 4);
    assert_eq!(report.filtered_records, 0);
    assert_eq!(report.entity_references, 7);
    assert_eq!(report.organisms, 2);
    assert_eq!(report.member_edges, 1);
    assert_eq!(report.cycles_rejected, 0);
    assert_eq!(report.skipped_mapping_rows, 2);
    assert_eq!(report.mapping_rows, build.index.len());
    assert_eq!(report.nodes, build.warehouse.len());
    build.warehouse.graph().check_integrity().unwrap();
}

#[test]
fn protein_node_carries_metadata_and_xrefs() {
    let build = common::build_warehouse();
    let graph = build.warehouse.graph();
    let insulin = graph.node(INSULIN).unwrap();

    assert_eq!(insulin.kind, NodeKind::EntityReference(ReferenceKind::Protein));
    assert_eq!(insulin.text(props::DISPLAY_NAME), Some("INS"));
    assert_eq!(insulin.literals[props::SEQUENCE_LENGTH], vec![Literal::Integer(110)]);

    let organisms = graph.refs(INSULIN, props::ORGANISM);
    assert_eq!(organisms, vec!["http://identifiers.org/taxonomy/9606"]);
    let organism = graph.node(organisms[0]).unwrap();
    assert_eq!(organism.text(props::NAME), Some("Homo sapiens"));

    let xrefs: Vec<_> = graph.xrefs(INSULIN).into_iter().map(|(_, x)| x).collect();
    let unification: Vec<_> = xrefs.iter().filter(|x| x.kind == XrefKind::Unification).collect();
    assert_eq!(unification.len(), 1);
    assert_eq!((unification[0].collection.as_str(), unification[0].id.as_str()), ("uniprot", "P01308"));

    let has = |collection: &str, id: &str, rel: &str| {
        xrefs.iter().any(|x| {
            x.kind == XrefKind::Relationship
                && x.collection == collection
                && x.id == id
                && x.relationship_type.as_deref() == Some(rel)
        })
    };
    assert!(has("refseq", "NP_000001", REL_IDENTITY));
    assert!(has("uniprot", "Q5EEX2", REL_SECONDARY_ACCESSION));
    assert!(has("hgnc symbol", "INS", REL_IDENTITY));
    // contributed only by the curated mapping file
    assert!(has("refseq", "NP_000002", REL_IDENTITY));
    assert!(has("refseq", "NP_000003", REL_IDENTITY));
}

#[test]
fn mapping_index_covers_synonyms() {
    let build = common::build_warehouse();
    let index = &build.index;

    assert_eq!(index.map("NP_000001.1", "uniprot", Some("refseq")), set(&["P01308"]));
    assert_eq!(index.map("Q5EEX2", "uniprot", Some("uniprot")), set(&["P01308"]));
    assert_eq!(index.map("P01308-2", "uniprot", Some("uniprot")), set(&["P01308"]));
    assert_eq!(index.map("ins", "uniprot", Some("hgnc symbol")), set(&["P01308"]));
    assert_eq!(index.map("C00186", "chebi", Some("kegg compound")), set(&["CHEBI:422"]));
    assert_eq!(index.map("6358", "chebi", Some("chebi")), set(&["CHEBI:422"]));
    // a mouse gene name is advisory only
    assert!(index.map("Bcl2", "uniprot", Some("hgnc symbol")).is_empty());
    // PDB structures are not identity synonyms
    assert!(index.map("1A7F", "uniprot", Some("pdb")).is_empty());
}

#[test]
fn member_of_becomes_member_edge() {
    let build = common::build_warehouse();
    let graph = build.warehouse.graph();

    assert_eq!(graph.refs(CARBOXYLIC_ACID, props::MEMBER_ENTITY_REFERENCE), vec![LACTIC_ACID]);
    let lactic = graph.node(LACTIC_ACID).unwrap();
    assert_eq!(lactic.text(props::CHEMICAL_FORMULA), Some("C3H6O3"));
    assert_eq!(lactic.literals[props::MOLECULAR_WEIGHT], vec![Literal::Float(90.07794)]);
}

#[test]
fn vocabulary_terms_are_canonical_nodes() {
    let build = common::build_warehouse();
    let term = build.warehouse.node("http://identifiers.org/mi/MI:0326").unwrap();
    assert_eq!(term.kind, NodeKind::ControlledVocabularyTerm);
    assert_eq!(term.text(props::DISPLAY_NAME), Some("protein"));
}

#[test]
fn organism_filter_drops_other_species() {
    let build = common::builder()
        .with_organisms(vec!["9606".to_string()])
        .build("b", "t")
        .unwrap();

    assert_eq!(build.report.filtered_records, 1);
    assert!(build.warehouse.node("http://identifiers.org/uniprot/P10415").is_none());
    assert!(build.warehouse.node("http://identifiers.org/taxonomy/10090").is_none());
    assert!(build.warehouse.node(INSULIN).is_some());
    // small molecules are never filtered by organism
    assert!(build.warehouse.node(LACTIC_ACID).is_some());
}

#[test]
fn repeated_records_extend_one_node() {
    let mut builder = empty_builder();
    let mut first = ReferenceRecord::new(RecordKind::Protein, "UniProt", "P01308");
    first.names.push("Insulin".to_string());
    let mut second = ReferenceRecord::new(RecordKind::Protein, "swissprot", "p01308-1");
    second.names.push("Preproinsulin".to_string());
    second
        .synonyms
        .push(Synonym::new("refseq", "NP_000198.1", SynonymRelation::Identity));
    builder.add_record(first);
    builder.add_record(second);

    let build = builder.build("b", "t").unwrap();
    let graph = build.warehouse.graph();

    let proteins: Vec<_> = graph
        .nodes()
        .filter(|n| n.kind == NodeKind::EntityReference(ReferenceKind::Protein))
        .collect();
    assert_eq!(proteins.len(), 1);
    assert_eq!(proteins[0].uri, INSULIN);
    assert_eq!(proteins[0].texts(props::NAME), vec!["Insulin", "Preproinsulin"]);
    assert_eq!(graph.unification_xrefs(INSULIN).len(), 1);
    assert_eq!(build.index.map("NP_000198.2", "uniprot", Some("refseq")), set(&["P01308"]));
}

#[test]
fn member_cycles_are_rejected() {
    let mut builder = empty_builder();
    let mut a = ReferenceRecord::new(RecordKind::SmallMolecule, "chebi", "CHEBI:1");
    a.member_of.push("CHEBI:2".to_string());
    let mut b = ReferenceRecord::new(RecordKind::SmallMolecule, "chebi", "CHEBI:2");
    b.member_of.push("CHEBI:1".to_string());
    let mut c = ReferenceRecord::new(RecordKind::SmallMolecule, "chebi", "CHEBI:3");
    c.member_of.push("CHEBI:3".to_string());
    c.member_of.push("CHEBI:404".to_string());
    builder.add_record(a);
    builder.add_record(b);
    builder.add_record(c);

    let build = builder.build("b", "t").unwrap();

    assert_eq!(build.report.member_edges, 1);
    assert_eq!(build.report.cycles_rejected, 2);
    let graph = build.warehouse.graph();
    assert_eq!(
        graph.refs("http://identifiers.org/chebi/CHEBI:2", props::MEMBER_ENTITY_REFERENCE),
        vec!["http://identifiers.org/chebi/CHEBI:1"]
    );
    assert!(graph
        .refs("http://identifiers.org/chebi/CHEBI:1", props::MEMBER_ENTITY_REFERENCE)
        .is_empty());
}

#[test]
fn invalid_records_are_skipped() {
    let mut builder = empty_builder();
    builder.add_record(ReferenceRecord::new(RecordKind::Protein, "uniprot", " "));
    builder.add_record(ReferenceRecord::new(RecordKind::Protein, "uniprot", "P01308"));

    let build = builder.build("b", "t").unwrap();
    assert_eq!(build.report.skipped_records, 1);
    assert!(build.warehouse.node(INSULIN).is_some());
}

#[test]
fn rebuilding_yields_the_same_warehouse() {
    let first = common::build_warehouse();
    let second = common::build_warehouse();

    assert_eq!(
        serde_json::to_value(&first.warehouse).unwrap(),
        serde_json::to_value(&second.warehouse).unwrap()
    );
    let a: Vec<_> = first.index.records().cloned().collect();
    let b: Vec<_> = second.index.records().cloned().collect();
    assert_eq!(a, b);
}
