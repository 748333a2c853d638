use std::collections::{BTreeSet, HashMap};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

/// Closed list of id normalization strategies. A collection picks exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NormalizationRule {
    /// `P01308-2` -> `P01308`
    StripIsoform,
    /// `NP_000001.1` -> `NP_000001`
    StripVersion,
    /// `hsa:3630` -> `3630`
    KeggGene,
    /// `5793` -> `CID:5793`
    PubchemCompound,
    /// `3333` -> `SID:3333`
    PubchemSubstance,
    /// `422` -> `CHEBI:422`
    ChebiPrefix,
    Verbatim,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRule {
    pub name: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    pub rule: NormalizationRule,
    #[serde(default)]
    pub case_sensitive: bool,
}

impl CollectionRule {
    pub fn new(name: &str, rule: NormalizationRule, case_sensitive: bool, synonyms: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
            rule,
            case_sensitive,
        }
    }
}

pub fn default_rules() -> Vec<CollectionRule> {
    use NormalizationRule::*;
    vec![
        CollectionRule::new(
            "uniprot",
            StripIsoform,
            false,
            &[
                "uniprot knowledgebase",
                "uniprotkb",
                "uniprot isoform",
                "uniprotkb/swiss-prot",
                "uniprotkb/trembl",
                "swissprot",
                "swiss-prot",
                "trembl",
            ],
        ),
        CollectionRule::new("refseq", StripVersion, true, &["ncbi refseq"]),
        CollectionRule::new("ensembl", StripVersion, true, &[]),
        CollectionRule::new("chebi", ChebiPrefix, false, &[]),
        CollectionRule::new(
            "pubchem-compound",
            PubchemCompound,
            false,
            &["pubchem compound", "pubchem cid", "pubchem-cid", "cid"],
        ),
        CollectionRule::new(
            "pubchem-substance",
            PubchemSubstance,
            false,
            &["pubchem substance", "pubchem sid", "pubchem-sid", "sid"],
        ),
        CollectionRule::new("kegg", KeggGene, true, &["kegg genes", "kegg gene"]),
        CollectionRule::new("hgnc symbol", Verbatim, false, &["hgnc-symbol", "gene symbol"]),
        CollectionRule::new(
            "ncbi gene",
            Verbatim,
            true,
            &["entrez gene", "entrezgene", "geneid", "ncbigene"],
        ),
        CollectionRule::new(
            "taxonomy",
            Verbatim,
            true,
            &["ncbi taxonomy", "ncbitaxon", "taxon"],
        ),
    ]
}

/// Canonicalizes collection names and external ids. Built once and shared by
/// the mapping index build and merge-time resolution.
#[derive(Debug, Clone)]
pub struct Normalizer {
    rules: Vec<CollectionRule>,
    by_name: HashMap<String, usize>,
    isoform: Regex,
    version: Regex,
    kegg: Regex,
}

impl Normalizer {
    pub fn new(rules: Vec<CollectionRule>) -> Result<Self, KiraError> {
        let mut by_name = HashMap::new();
        for (idx, rule) in rules.iter().enumerate() {
            let name = fold(&rule.name);
            if name.is_empty() {
                return Err(KiraError::InvalidConfig(
                    "collection rule with empty name".to_string(),
                ));
            }
            by_name.insert(name, idx);
            for synonym in &rule.synonyms {
                by_name.insert(fold(synonym), idx);
            }
        }
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|err| KiraError::InvalidConfig(err.to_string()))
        };
        Ok(Self {
            rules,
            by_name,
            isoform: compile(r"^(.+)-\d+$")?,
            version: compile(r"^(.+)\.\d+$")?,
            kegg: compile(r"^[A-Za-z]{2,5}:(\d+)$")?,
        })
    }

    pub fn with_default_rules() -> Result<Self, KiraError> {
        Self::new(default_rules())
    }

    pub fn rules(&self) -> &[CollectionRule] {
        &self.rules
    }

    fn rule_for(&self, collection: &str) -> Option<&CollectionRule> {
        self.by_name
            .get(&fold(collection))
            .map(|idx| &self.rules[*idx])
    }

    /// Canonical collection name: lower-cased, trimmed, synonyms folded.
    pub fn collection(&self, raw: &str) -> String {
        match self.rule_for(raw) {
            Some(rule) => rule.name.clone(),
            None => fold(raw),
        }
    }

    pub fn is_known(&self, collection: &str) -> bool {
        self.rule_for(collection).is_some()
    }

    /// Ids of unrecognized collections pass through unchanged.
    pub fn normalize(&self, collection: &str, raw_id: &str) -> String {
        match self.rule_for(collection) {
            Some(rule) => self.apply(rule, raw_id),
            None => raw_id.to_string(),
        }
    }

    /// Every normalization any registered rule would produce, plus the
    /// trimmed id itself. Used when the source collection is unknown.
    pub fn candidates(&self, raw_id: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let trimmed = raw_id.trim();
        if trimmed.is_empty() {
            return out;
        }
        out.insert(trimmed.to_string());
        for rule in &self.rules {
            out.insert(self.apply(rule, raw_id));
        }
        out
    }

    fn apply(&self, rule: &CollectionRule, raw_id: &str) -> String {
        let id = raw_id.trim();
        let normalized = match rule.rule {
            NormalizationRule::StripIsoform => strip(&self.isoform, id),
            NormalizationRule::StripVersion => strip(&self.version, id),
            NormalizationRule::KeggGene => strip(&self.kegg, id),
            NormalizationRule::PubchemCompound => prefixed(id, "CID:"),
            NormalizationRule::PubchemSubstance => prefixed(id, "SID:"),
            NormalizationRule::ChebiPrefix => prefixed(id, "CHEBI:"),
            NormalizationRule::Verbatim => id.to_string(),
        };
        if rule.case_sensitive {
            normalized
        } else {
            normalized.to_uppercase()
        }
    }
}

fn fold(value: &str) -> String {
    value.trim().to_lowercase()
}

fn strip(pattern: &Regex, id: &str) -> String {
    pattern
        .captures(id)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| id.to_string())
}

fn prefixed(id: &str, prefix: &str) -> String {
    let compact: String = id.chars().filter(|ch| !ch.is_whitespace()).collect();
    if !compact.is_empty() && compact.chars().all(|ch| ch.is_ascii_digit()) {
        format!("{prefix}{compact}")
    } else {
        compact.to_uppercase()
    }
}
