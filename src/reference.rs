use std::io::BufRead;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{REL_IDENTITY, REL_SECONDARY_ACCESSION};
use crate::error::KiraError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Protein,
    SmallMolecule,
    Vocabulary,
    Organism,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SynonymRelation {
    Identity,
    SecondaryAccession,
    Other,
}

impl SynonymRelation {
    pub fn as_relationship_type(&self) -> &'static str {
        match self {
            SynonymRelation::Identity => REL_IDENTITY,
            SynonymRelation::SecondaryAccession => REL_SECONDARY_ACCESSION,
            SynonymRelation::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synonym {
    pub collection: String,
    pub id: String,
    #[serde(default = "default_relation")]
    pub relation: SynonymRelation,
}

fn default_relation() -> SynonymRelation {
    SynonymRelation::Identity
}

impl Synonym {
    pub fn new(collection: &str, id: &str, relation: SynonymRelation) -> Self {
        Self {
            collection: collection.to_string(),
            id: id.to_string(),
            relation,
        }
    }
}

/// One entry of a reference database, in the shape every reader produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub kind: RecordKind,
    pub collection: String,
    pub primary_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub names: Vec<String>,
    /// NCBI taxonomy id, proteins only.
    #[serde(default)]
    pub organism: Option<String>,
    #[serde(default)]
    pub organism_name: Option<String>,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub structure: Option<String>,
    #[serde(default)]
    pub molecular_weight: Option<f64>,
    #[serde(default)]
    pub sequence_length: Option<i64>,
    #[serde(default)]
    pub comments: Vec<String>,
    #[serde(default)]
    pub synonyms: Vec<Synonym>,
    /// Primary ids (same collection) this record is a member of.
    #[serde(default)]
    pub member_of: Vec<String>,
}

impl ReferenceRecord {
    pub fn new(kind: RecordKind, collection: &str, primary_id: &str) -> Self {
        Self {
            kind,
            collection: collection.to_string(),
            primary_id: primary_id.to_string(),
            display_name: None,
            names: Vec::new(),
            organism: None,
            organism_name: None,
            formula: None,
            structure: None,
            molecular_weight: None,
            sequence_length: None,
            comments: Vec::new(),
            synonyms: Vec::new(),
            member_of: Vec::new(),
        }
    }

    pub fn validate(&self, source_name: &str) -> Result<(), KiraError> {
        if self.collection.trim().is_empty() || self.primary_id.trim().is_empty() {
            return Err(KiraError::MalformedRecord {
                source_name: source_name.to_string(),
                message: "record without collection or primary id".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordBatch {
    pub records: Vec<ReferenceRecord>,
    pub skipped: usize,
}

/// Reads one JSON record per line. Blank lines are ignored; lines that do
/// not parse are logged and counted.
pub fn read_json_lines<R: BufRead>(reader: R, source_name: &str) -> Result<RecordBatch, KiraError> {
    let mut batch = RecordBatch::default();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|err| KiraError::Filesystem(err.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed = serde_json::from_str::<ReferenceRecord>(&line)
            .map_err(|err| KiraError::MalformedRecord {
                source_name: source_name.to_string(),
                message: format!("line {}: {err}", line_no + 1),
            })
            .and_then(|record| record.validate(source_name).map(|_| record));
        match parsed {
            Ok(record) => batch.records.push(record),
            Err(err) => {
                warn!(source = source_name, error = %err, "skipping reference record");
                batch.skipped += 1;
            }
        }
    }
    Ok(batch)
}
