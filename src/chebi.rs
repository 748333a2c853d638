use std::io::BufRead;

use tracing::{debug, warn};

use crate::error::KiraError;
use crate::reference::{RecordBatch, RecordKind, ReferenceRecord, Synonym, SynonymRelation};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OboHeader {
    pub data_version: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Default)]
pub struct ChebiDump {
    pub header: OboHeader,
    pub batch: RecordBatch,
    pub obsolete: usize,
}

#[derive(Default)]
struct Stanza {
    lines: Vec<(String, String)>,
    first_line: usize,
}

/// Reads a ChEBI OBO file. Only `[Term]` stanzas become records; obsolete
/// terms are dropped and stanzas without an id are skipped.
pub fn read_chebi_obo<R: BufRead>(reader: R, source_name: &str) -> Result<ChebiDump, KiraError> {
    let mut dump = ChebiDump::default();
    let mut in_header = true;
    let mut current: Option<Stanza> = None;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('!') {
            continue;
        }
        if line.starts_with('[') {
            in_header = false;
            if let Some(stanza) = current.take() {
                finish_stanza(stanza, source_name, &mut dump);
            }
            if line == "[Term]" {
                current = Some(Stanza {
                    lines: Vec::new(),
                    first_line: line_no + 1,
                });
            }
            continue;
        }
        let Some((tag, value)) = line.split_once(':') else {
            continue;
        };
        let (tag, value) = (tag.trim(), value.trim());
        if in_header {
            match tag {
                "data-version" => dump.header.data_version = Some(value.to_string()),
                "date" => dump.header.date = Some(value.to_string()),
                _ => {}
            }
            continue;
        }
        if let Some(stanza) = current.as_mut() {
            stanza.lines.push((tag.to_string(), value.to_string()));
        }
    }
    if let Some(stanza) = current.take() {
        finish_stanza(stanza, source_name, &mut dump);
    }
    debug!(
        source = source_name,
        records = dump.batch.records.len(),
        obsolete = dump.obsolete,
        "read ChEBI ontology"
    );
    Ok(dump)
}

fn finish_stanza(stanza: Stanza, source_name: &str, dump: &mut ChebiDump) {
    if stanza
        .lines
        .iter()
        .any(|(tag, value)| tag == "is_obsolete" && value == "true")
    {
        dump.obsolete += 1;
        return;
    }
    match record_from_stanza(&stanza, source_name) {
        Ok(record) => dump.batch.records.push(record),
        Err(err) => {
            warn!(source = source_name, line = stanza.first_line, error = %err, "skipping ChEBI term");
            dump.batch.skipped += 1;
        }
    }
}

fn record_from_stanza(stanza: &Stanza, source_name: &str) -> Result<ReferenceRecord, KiraError> {
    let id = stanza
        .lines
        .iter()
        .find(|(tag, _)| tag == "id")
        .map(|(_, value)| strip_trailing_comment(value))
        .filter(|value| value.starts_with("CHEBI:"))
        .ok_or_else(|| KiraError::MalformedRecord {
            source_name: source_name.to_string(),
            message: "term without a CHEBI id".to_string(),
        })?;
    let mut record = ReferenceRecord::new(RecordKind::SmallMolecule, "chebi", id);

    for (tag, value) in &stanza.lines {
        match tag.as_str() {
            "name" => {
                record.display_name = Some(value.clone());
                if !record.names.contains(value) {
                    record.names.insert(0, value.clone());
                }
            }
            "alt_id" => record.synonyms.push(Synonym::new(
                "chebi",
                strip_trailing_comment(value),
                SynonymRelation::SecondaryAccession,
            )),
            "synonym" => {
                if let Some(text) = quoted(value) {
                    if !record.names.iter().any(|name| name == text) {
                        record.names.push(text.to_string());
                    }
                }
            }
            "def" => {
                if let Some(text) = quoted(value) {
                    record.comments.push(text.to_string());
                }
            }
            "is_a" => record
                .member_of
                .push(strip_trailing_comment(value).to_string()),
            "property_value" => apply_property(&mut record, value),
            "xref" => {
                if let Some(synonym) = xref_synonym(value) {
                    record.synonyms.push(synonym);
                }
            }
            _ => {}
        }
    }
    Ok(record)
}

fn apply_property(record: &mut ReferenceRecord, value: &str) {
    let Some((key, rest)) = value.split_once(' ') else {
        return;
    };
    let key = key.rsplit(['/', ':']).next().unwrap_or(key);
    let Some(text) = quoted(rest) else {
        return;
    };
    match key {
        "formula" => record.formula = Some(text.to_string()),
        "inchi" => record.structure = Some(text.to_string()),
        "inchikey" => record
            .synonyms
            .push(Synonym::new("inchikey", text, SynonymRelation::Identity)),
        "mass" => record.molecular_weight = text.parse().ok(),
        _ => {}
    }
}

fn xref_synonym(value: &str) -> Option<Synonym> {
    let value = value.split(" {").next().unwrap_or(value).trim();
    let (prefix, id) = value.split_once(':')?;
    if id.trim().is_empty() {
        return None;
    }
    let collection = match prefix {
        "KEGG" | "KEGG COMPOUND" => "kegg compound",
        "PubChem" => "pubchem-substance",
        "HMDB" => "hmdb",
        "CAS" => "cas",
        "DrugBank" => "drugbank",
        _ => return None,
    };
    Some(Synonym::new(collection, id.trim(), SynonymRelation::Identity))
}

fn strip_trailing_comment(value: &str) -> &str {
    value.split(" !").next().unwrap_or(value).trim()
}

fn quoted(value: &str) -> Option<&str> {
    let start = value.find('"')?;
    let rest = &value[start + 1..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}
