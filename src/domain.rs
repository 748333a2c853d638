use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

pub const DEFAULT_XML_BASE: &str = "http://pathwaycommons.org/pc2/";
pub const DEFAULT_IDENTIFIERS_BASE: &str = "http://identifiers.org/";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum XrefKind {
    Unification,
    Relationship,
    Publication,
}

impl fmt::Display for XrefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XrefKind::Unification => write!(f, "unification"),
            XrefKind::Relationship => write!(f, "relationship"),
            XrefKind::Publication => write!(f, "publication"),
        }
    }
}

impl FromStr for XrefKind {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "unification" | "unificationxref" => Ok(XrefKind::Unification),
            "relationship" | "relationshipxref" => Ok(XrefKind::Relationship),
            "publication" | "publicationxref" => Ok(XrefKind::Publication),
            _ => Err(KiraError::InvalidXrefKind(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReferenceKind {
    Protein,
    SmallMolecule,
    Dna,
    Rna,
    Generic,
}

impl ReferenceKind {
    /// Collection whose primary ids identify canonical references of this kind.
    pub fn target_collection(&self) -> Option<&'static str> {
        match self {
            ReferenceKind::Protein => Some("uniprot"),
            ReferenceKind::SmallMolecule => Some("chebi"),
            ReferenceKind::Dna | ReferenceKind::Rna | ReferenceKind::Generic => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Protein => "protein",
            ReferenceKind::SmallMolecule => "small_molecule",
            ReferenceKind::Dna => "dna",
            ReferenceKind::Rna => "rna",
            ReferenceKind::Generic => "generic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BioKind {
    Interaction,
    Pathway,
    PhysicalEntity,
}

impl BioKind {
    fn as_str(&self) -> &'static str {
        match self {
            BioKind::Interaction => "interaction",
            BioKind::Pathway => "pathway",
            BioKind::PhysicalEntity => "physical_entity",
        }
    }
}

/// Closed set of node types a graph may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NodeKind {
    EntityReference(ReferenceKind),
    CrossReference,
    Organism,
    Provenance,
    BiologicalEntity(BioKind),
    ControlledVocabularyTerm,
    Feature,
}

impl NodeKind {
    /// Top-level biological entities survive dangling pruning.
    pub fn is_top_level(&self) -> bool {
        matches!(self, NodeKind::BiologicalEntity(_))
    }

    /// Kinds that carry identity through unification xrefs.
    pub fn is_resolvable(&self) -> bool {
        matches!(
            self,
            NodeKind::EntityReference(_) | NodeKind::Organism | NodeKind::ControlledVocabularyTerm
        )
    }

    /// Collection the canonical counterpart lives in. `None` means the
    /// collection of the node's own unification xref decides.
    pub fn target_collection(&self) -> Option<&'static str> {
        match self {
            NodeKind::EntityReference(kind) => kind.target_collection(),
            NodeKind::Organism => Some("taxonomy"),
            _ => None,
        }
    }

    pub fn slug(&self) -> String {
        match self {
            NodeKind::EntityReference(kind) => format!("entityreference_{}", kind.as_str()),
            NodeKind::CrossReference => "crossreference".to_string(),
            NodeKind::Organism => "organism".to_string(),
            NodeKind::Provenance => "provenance".to_string(),
            NodeKind::BiologicalEntity(kind) => kind.as_str().to_string(),
            NodeKind::ControlledVocabularyTerm => "vocabulary".to_string(),
            NodeKind::Feature => "feature".to_string(),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::EntityReference(kind) => write!(f, "EntityReference/{}", kind.as_str()),
            NodeKind::CrossReference => write!(f, "CrossReference"),
            NodeKind::Organism => write!(f, "Organism"),
            NodeKind::Provenance => write!(f, "Provenance"),
            NodeKind::BiologicalEntity(kind) => write!(f, "BiologicalEntity/{}", kind.as_str()),
            NodeKind::ControlledVocabularyTerm => write!(f, "ControlledVocabularyTerm"),
            NodeKind::Feature => write!(f, "Feature"),
        }
    }
}

impl FromStr for NodeKind {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (head, sub) = match trimmed.split_once('/') {
            Some((head, sub)) => (head, Some(sub)),
            None => (trimmed, None),
        };
        let kind = match (head, sub) {
            ("EntityReference", Some(sub)) => NodeKind::EntityReference(match sub {
                "protein" => ReferenceKind::Protein,
                "small_molecule" => ReferenceKind::SmallMolecule,
                "dna" => ReferenceKind::Dna,
                "rna" => ReferenceKind::Rna,
                "generic" => ReferenceKind::Generic,
                _ => return Err(KiraError::InvalidNodeKind(value.to_string())),
            }),
            ("BiologicalEntity", Some(sub)) => NodeKind::BiologicalEntity(match sub {
                "interaction" => BioKind::Interaction,
                "pathway" => BioKind::Pathway,
                "physical_entity" => BioKind::PhysicalEntity,
                _ => return Err(KiraError::InvalidNodeKind(value.to_string())),
            }),
            ("CrossReference", None) => NodeKind::CrossReference,
            ("Organism", None) => NodeKind::Organism,
            ("Provenance", None) => NodeKind::Provenance,
            ("ControlledVocabularyTerm", None) => NodeKind::ControlledVocabularyTerm,
            ("Feature", None) => NodeKind::Feature,
            _ => return Err(KiraError::InvalidNodeKind(value.to_string())),
        };
        Ok(kind)
    }
}

impl TryFrom<String> for NodeKind {
    type Error = KiraError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.to_string()
    }
}

/// Typed view of a cross-reference node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Xref {
    pub collection: String,
    pub id: String,
    pub version: Option<String>,
    pub kind: XrefKind,
    pub relationship_type: Option<String>,
}

impl Xref {
    pub fn new(collection: &str, id: &str, kind: XrefKind) -> Self {
        Self {
            collection: collection.to_string(),
            id: id.to_string(),
            version: None,
            kind,
            relationship_type: None,
        }
    }

    pub fn unification(collection: &str, id: &str) -> Self {
        Self::new(collection, id, XrefKind::Unification)
    }

    pub fn relationship(collection: &str, id: &str, relationship_type: &str) -> Self {
        let mut xref = Self::new(collection, id, XrefKind::Relationship);
        xref.relationship_type = Some(relationship_type.to_string());
        xref
    }

    /// Identity-equality key: collection (case-folded), id, version and type.
    /// The relationship type is advisory and not part of identity.
    pub fn identity_key(&self) -> (String, String, Option<String>, XrefKind) {
        (
            self.collection.trim().to_lowercase(),
            self.id.clone(),
            self.version.clone(),
            self.kind,
        )
    }

    pub fn is_identity_equal(&self, other: &Xref) -> bool {
        self.identity_key() == other.identity_key()
    }
}

impl fmt::Display for Xref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}:{}.{} ({})", self.collection, self.id, version, self.kind),
            None => write!(f, "{}:{} ({})", self.collection, self.id, self.kind),
        }
    }
}

/// Relationship types whose xrefs may feed the id-mapping index.
pub const REL_IDENTITY: &str = "identity";
pub const REL_SECONDARY_ACCESSION: &str = "secondary-accession";
pub const REL_ADDITIONAL_INFORMATION: &str = "additional-information";

/// Derives every URI the engine mints, so canonical identity stays a pure
/// function of `(collection, primary id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UriScheme {
    pub xml_base: String,
    pub identifiers_base: String,
}

impl Default for UriScheme {
    fn default() -> Self {
        Self {
            xml_base: DEFAULT_XML_BASE.to_string(),
            identifiers_base: DEFAULT_IDENTIFIERS_BASE.to_string(),
        }
    }
}

impl UriScheme {
    pub fn canonical(&self, collection: &str, id: &str) -> String {
        format!(
            "{}{}/{}",
            self.identifiers_base,
            sanitize(&collection.trim().to_lowercase()),
            sanitize(id)
        )
    }

    pub fn is_canonical(&self, uri: &str) -> bool {
        uri.starts_with(&self.identifiers_base)
    }

    /// `(collection, id)` encoded in a standard URI, e.g.
    /// `http://identifiers.org/uniprot/P01308-2` -> `("uniprot", "P01308-2")`.
    pub fn parse_canonical(&self, uri: &str) -> Option<(String, String)> {
        let rest = uri.strip_prefix(&self.identifiers_base)?;
        let (collection, id) = rest.split_once('/')?;
        if collection.trim().is_empty() || id.trim().is_empty() {
            return None;
        }
        Some((collection.to_string(), id.to_string()))
    }

    pub fn xref(&self, xref: &Xref) -> String {
        let mut uri = format!(
            "{}{}xref/{}_{}",
            self.xml_base,
            xref.kind,
            sanitize(&xref.collection.trim().to_lowercase()),
            sanitize(&xref.id)
        );
        if let Some(version) = &xref.version {
            uri.push('_');
            uri.push_str(&sanitize(version));
        }
        uri
    }

    pub fn provenance(&self, label: &ProvenanceLabel) -> String {
        format!("{}provenance/{}", self.xml_base, label.as_str())
    }

    /// Deterministic replacement URI for a node whose URI collides with a
    /// node of another kind.
    pub fn derived(&self, kind: NodeKind, seed: &str) -> String {
        format!("{}{}_{}", self.xml_base, kind.slug(), sanitize(seed))
    }
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, ':' | '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProvenanceLabel(String);

impl ProvenanceLabel {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProvenanceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProvenanceLabel {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'));
        if !is_valid {
            return Err(KiraError::InvalidProvenanceLabel(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// A dataset graph file to merge, written as `label=path` or just `path`
/// (the label then comes from the file name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetInput {
    pub label: ProvenanceLabel,
    pub path: Utf8PathBuf,
}

impl FromStr for DatasetInput {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(KiraError::InvalidDatasetInput(value.to_string()));
        }
        if let Some((label, path)) = trimmed.split_once('=') {
            if path.is_empty() {
                return Err(KiraError::InvalidDatasetInput(value.to_string()));
            }
            return Ok(Self {
                label: label.parse()?,
                path: Utf8PathBuf::from(path),
            });
        }
        let path = Utf8PathBuf::from(trimmed);
        let file_name = path
            .file_name()
            .ok_or_else(|| KiraError::InvalidDatasetInput(value.to_string()))?;
        let stem = file_name
            .trim_end_matches(".gz")
            .trim_end_matches(".json");
        Ok(Self {
            label: stem.parse()?,
            path,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Uniprot,
    Chebi,
    Records,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Uniprot => write!(f, "uniprot"),
            SourceFormat::Chebi => write!(f, "chebi"),
            SourceFormat::Records => write!(f, "records"),
        }
    }
}

/// A reference-database extract, written as `format:path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSource {
    pub format: SourceFormat,
    pub path: Utf8PathBuf,
}

impl FromStr for ReferenceSource {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (kind, rest) = trimmed
            .split_once(':')
            .ok_or_else(|| KiraError::InvalidSource(value.to_string()))?;
        if rest.is_empty() {
            return Err(KiraError::InvalidSource(value.to_string()));
        }
        let format = match kind {
            "uniprot" => SourceFormat::Uniprot,
            "chebi" => SourceFormat::Chebi,
            "records" => SourceFormat::Records,
            _ => return Err(KiraError::InvalidSource(value.to_string())),
        };
        Ok(Self {
            format,
            path: Utf8PathBuf::from(rest),
        })
    }
}
