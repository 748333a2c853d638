use std::io::Read;

use serde_json::Value;
use tracing::warn;

use crate::error::KiraError;
use crate::reference::{RecordBatch, RecordKind, ReferenceRecord, Synonym, SynonymRelation};

const HUMAN_TAXON: &str = "9606";

/// Reads a UniProtKB JSON export: either a bare array of entries or the
/// REST search shape `{"results": [...]}`.
pub fn read_uniprot_json<R: Read>(reader: R, source_name: &str) -> Result<RecordBatch, KiraError> {
    let raw: Value = serde_json::from_reader(reader).map_err(|err| KiraError::MalformedRecord {
        source_name: source_name.to_string(),
        message: err.to_string(),
    })?;
    let entries = raw
        .get("results")
        .and_then(|v| v.as_array())
        .or_else(|| raw.as_array())
        .ok_or_else(|| KiraError::MalformedRecord {
            source_name: source_name.to_string(),
            message: "expected an array of entries or an object with `results`".to_string(),
        })?;

    let mut batch = RecordBatch::default();
    for entry in entries {
        match record_from_uniprot_json(entry, source_name) {
            Ok(record) => batch.records.push(record),
            Err(err) => {
                warn!(source = source_name, error = %err, "skipping UniProt entry");
                batch.skipped += 1;
            }
        }
    }
    Ok(batch)
}

pub fn record_from_uniprot_json(raw: &Value, source_name: &str) -> Result<ReferenceRecord, KiraError> {
    let accession = raw
        .get("primaryAccession")
        .and_then(|v| v.as_str())
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| KiraError::MalformedRecord {
            source_name: source_name.to_string(),
            message: "entry without primaryAccession".to_string(),
        })?;
    let mut record = ReferenceRecord::new(RecordKind::Protein, "uniprot", accession);

    let protein_name = raw
        .get("proteinDescription")
        .and_then(|v| v.get("recommendedName"))
        .and_then(|v| v.get("fullName"))
        .and_then(|v| v.get("value"))
        .and_then(|v| v.as_str())
        .or_else(|| {
            raw.get("proteinDescription")
                .and_then(|v| v.get("submissionNames"))
                .and_then(|v| v.as_array())
                .and_then(|arr| arr.first())
                .and_then(|v| v.get("fullName"))
                .and_then(|v| v.get("value"))
                .and_then(|v| v.as_str())
        });
    if let Some(name) = protein_name {
        record.names.push(name.to_string());
    }

    record.organism = raw
        .get("organism")
        .and_then(|v| v.get("taxonId"))
        .and_then(|v| v.as_u64().map(|id| id.to_string()).or_else(|| v.as_str().map(str::to_string)));
    record.organism_name = raw
        .get("organism")
        .and_then(|v| v.get("scientificName"))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    record.sequence_length = raw
        .get("sequence")
        .and_then(|v| v.get("length"))
        .and_then(|v| v.as_i64());

    if let Some(accessions) = raw.get("secondaryAccessions").and_then(|v| v.as_array()) {
        for acc in accessions.iter().filter_map(|v| v.as_str()) {
            record
                .synonyms
                .push(Synonym::new("uniprot", acc, SynonymRelation::SecondaryAccession));
        }
    }

    let is_human = record.organism.as_deref() == Some(HUMAN_TAXON);
    if let Some(genes) = raw.get("genes").and_then(|v| v.as_array()) {
        for gene in genes {
            if let Some(name) = gene
                .get("geneName")
                .and_then(|v| v.get("value"))
                .and_then(|v| v.as_str())
            {
                if record.display_name.is_none() {
                    record.display_name = Some(name.to_string());
                }
                push_unique(&mut record.names, name);
                let relation = if is_human {
                    SynonymRelation::Identity
                } else {
                    SynonymRelation::Other
                };
                record
                    .synonyms
                    .push(Synonym::new("hgnc symbol", name, relation));
            }
            if let Some(syns) = gene.get("synonyms").and_then(|v| v.as_array()) {
                for syn in syns {
                    if let Some(name) = syn.get("value").and_then(|v| v.as_str()) {
                        push_unique(&mut record.names, name);
                    }
                }
            }
        }
    }

    if let Some(comments) = raw.get("comments").and_then(|v| v.as_array()) {
        for comment in comments {
            if comment.get("commentType").and_then(|v| v.as_str()) != Some("FUNCTION") {
                continue;
            }
            if let Some(texts) = comment.get("texts").and_then(|v| v.as_array()) {
                for text in texts {
                    if let Some(value) = text.get("value").and_then(|v| v.as_str()) {
                        record.comments.push(format!("FUNCTION: {value}"));
                    }
                }
            }
        }
    }

    if let Some(xrefs) = raw
        .get("uniProtKBCrossReferences")
        .and_then(|v| v.as_array())
    {
        for xref in xrefs {
            let db = xref.get("database").and_then(|v| v.as_str()).unwrap_or("");
            let Some(id) = xref.get("id").and_then(|v| v.as_str()) else {
                continue;
            };
            let synonym = match db {
                "RefSeq" => Synonym::new("refseq", id, SynonymRelation::Identity),
                "GeneID" => Synonym::new("ncbi gene", id, SynonymRelation::Identity),
                "Ensembl" => Synonym::new("ensembl", id, SynonymRelation::Identity),
                "PDB" => Synonym::new("pdb", id, SynonymRelation::Other),
                _ => continue,
            };
            record.synonyms.push(synonym);
        }
    }

    Ok(record)
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|existing| existing == value) {
        values.push(value.to_string());
    }
}
