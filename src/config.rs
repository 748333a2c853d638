use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{DEFAULT_IDENTIFIERS_BASE, DEFAULT_XML_BASE, UriScheme};
use crate::error::KiraError;
use crate::merger::{DEFAULT_MAX_XREFS_BY_MAPPING, DEFAULT_PARALLEL_THRESHOLD, MergeSettings};
use crate::normalize::{CollectionRule, NormalizationRule, default_rules};

pub const DEFAULT_CONFIG_FILE: &str = "kira-pm.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub xml_base: Option<String>,
    #[serde(default)]
    pub identifiers_base: Option<String>,
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default)]
    pub collections: Vec<CollectionEntry>,
    #[serde(default)]
    pub organisms: Vec<String>,
    #[serde(default)]
    pub max_xrefs_by_mapping: Option<usize>,
    #[serde(default)]
    pub parallel_threshold: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CollectionEntry {
    Shorthand(String),
    Detailed(CollectionEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CollectionEntryObject {
    pub name: String,
    #[serde(default)]
    pub rule: Option<NormalizationRule>,
    #[serde(default)]
    pub case_sensitive: Option<bool>,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub scheme: UriScheme,
    pub store: Option<Utf8PathBuf>,
    pub collections: Vec<CollectionRule>,
    pub organisms: Vec<String>,
    pub merge: MergeSettings,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            scheme: UriScheme::default(),
            store: None,
            collections: default_rules(),
            organisms: Vec::new(),
            merge: MergeSettings::default(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `kira-pm.json` when no path is given. A missing
    /// default file yields the built-in defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }
        if !config_path.exists() {
            return Err(KiraError::MissingConfig(config_path));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, KiraError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(KiraError::InvalidConfig(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let scheme = UriScheme {
            xml_base: base_url(config.xml_base, DEFAULT_XML_BASE, "xml_base")?,
            identifiers_base: base_url(
                config.identifiers_base,
                DEFAULT_IDENTIFIERS_BASE,
                "identifiers_base",
            )?,
        };

        let mut collections = default_rules();
        for entry in config.collections {
            let rule = match entry {
                CollectionEntry::Shorthand(name) => known_rule(&collections, &name)
                    .unwrap_or_else(|| {
                        let name = name.trim().to_lowercase();
                        CollectionRule::new(&name, NormalizationRule::Verbatim, false, &[])
                    }),
                CollectionEntry::Detailed(obj) => {
                    let base = known_rule(&collections, &obj.name);
                    CollectionRule {
                        name: obj.name.trim().to_lowercase(),
                        synonyms: if obj.synonyms.is_empty() {
                            base.as_ref().map(|r| r.synonyms.clone()).unwrap_or_default()
                        } else {
                            obj.synonyms
                        },
                        rule: obj
                            .rule
                            .or(base.as_ref().map(|r| r.rule))
                            .unwrap_or(NormalizationRule::Verbatim),
                        case_sensitive: obj
                            .case_sensitive
                            .or(base.as_ref().map(|r| r.case_sensitive))
                            .unwrap_or(false),
                    }
                }
            };
            if rule.name.trim().is_empty() {
                return Err(KiraError::InvalidConfig("collection with empty name".to_string()));
            }
            collections.retain(|existing| existing.name != rule.name);
            collections.push(rule);
        }

        let max_xrefs_by_mapping = config
            .max_xrefs_by_mapping
            .unwrap_or(DEFAULT_MAX_XREFS_BY_MAPPING);
        let parallel_threshold = config.parallel_threshold.unwrap_or(DEFAULT_PARALLEL_THRESHOLD);
        if parallel_threshold == 0 {
            return Err(KiraError::InvalidConfig(
                "parallel_threshold must be at least 1".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            schema_version,
            scheme,
            store: config.store.map(Utf8PathBuf::from),
            collections,
            organisms: config
                .organisms
                .into_iter()
                .map(|taxon| taxon.trim().to_string())
                .filter(|taxon| !taxon.is_empty())
                .collect(),
            merge: MergeSettings {
                max_xrefs_by_mapping,
                parallel_threshold,
            },
        })
    }
}

fn known_rule(rules: &[CollectionRule], name: &str) -> Option<CollectionRule> {
    let name = name.trim().to_lowercase();
    rules
        .iter()
        .find(|rule| rule.name == name || rule.synonyms.iter().any(|s| s == &name))
        .cloned()
}

fn base_url(value: Option<String>, default: &str, field: &str) -> Result<String, KiraError> {
    let value = value.unwrap_or_else(|| default.to_string());
    let value = value.trim();
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(KiraError::InvalidConfig(format!(
            "{field} must be an http(s) URL, got {value:?}"
        )));
    }
    if value.ends_with('/') || value.ends_with('#') {
        Ok(value.to_string())
    } else {
        Ok(format!("{value}/"))
    }
}
