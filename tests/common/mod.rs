#![allow(dead_code)]

use std::fs::File;
use std::io::BufReader;

use camino::Utf8PathBuf;

use kira_pathway_merger::chebi::read_chebi_obo;
use kira_pathway_merger::domain::{ProvenanceLabel, UriScheme};
use kira_pathway_merger::graph::Graph;
use kira_pathway_merger::normalize::Normalizer;
use kira_pathway_merger::reference::read_json_lines;
use kira_pathway_merger::uniprot::read_uniprot_json;
use kira_pathway_merger::warehouse::{WarehouseBuild, WarehouseBuilder};

pub fn fixture(name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn label(value: &str) -> ProvenanceLabel {
    value.parse().unwrap()
}

/// Warehouse over every reference fixture plus the curated TSV.
pub fn build_warehouse() -> WarehouseBuild {
    builder().build("20260101T000000000Z", "2026-01-01T00:00:00Z").unwrap()
}

pub fn builder() -> WarehouseBuilder {
    let normalizer = Normalizer::with_default_rules().unwrap();
    let mut builder = WarehouseBuilder::new(normalizer, UriScheme::default());

    let uniprot = File::open(fixture("uniprot_entries.json")).unwrap();
    builder.add_batch(read_uniprot_json(uniprot, "uniprot_entries.json").unwrap());

    let chebi = BufReader::new(File::open(fixture("chebi_subset.obo")).unwrap());
    builder.add_batch(read_chebi_obo(chebi, "chebi_subset.obo").unwrap().batch);

    let records = BufReader::new(File::open(fixture("records.jsonl")).unwrap());
    builder.add_batch(read_json_lines(records, "records.jsonl").unwrap());

    let tsv = BufReader::new(File::open(fixture("refseq_to_uniprot.tsv")).unwrap());
    builder.add_curated_tsv(tsv, "refseq_to_uniprot.tsv").unwrap();
    builder
}

pub fn load(name: &str, label_value: &str) -> Graph {
    kira_pathway_merger::dataset::load_dataset(&fixture(name), &label(label_value)).unwrap()
}

/// Non-top-level nodes must have at least one referrer other than themselves.
pub fn assert_no_dangling(graph: &Graph) {
    for node in graph.nodes() {
        if node.kind.is_top_level() {
            continue;
        }
        let referenced = graph.incoming(&node.uri).iter().any(|(_, src)| src != &node.uri);
        assert!(referenced, "{} ({}) is dangling", node.uri, node.kind);
    }
}
