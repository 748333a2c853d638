use std::collections::{BTreeSet, HashMap};
use std::io::BufRead;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{REL_IDENTITY, REL_SECONDARY_ACCESSION, XrefKind};
use crate::error::KiraError;
use crate::graph::Graph;
use crate::normalize::Normalizer;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MappingRecord {
    pub source_collection: String,
    pub source_id: String,
    pub target_collection: String,
    pub primary_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingSnapshot {
    pub build_id: String,
    pub built_at: String,
    pub records: Vec<MappingRecord>,
}

/// Multi-map from `(collection, id)` to primary ids of a target collection.
#[derive(Debug, Clone)]
pub struct MappingIndex {
    normalizer: Normalizer,
    records: BTreeSet<MappingRecord>,
    by_source: HashMap<(String, String, String), BTreeSet<String>>,
    by_id: HashMap<(String, String), BTreeSet<String>>,
    by_primary: HashMap<(String, String), BTreeSet<(String, String)>>,
}

impl MappingIndex {
    pub fn from_records(
        normalizer: Normalizer,
        records: impl IntoIterator<Item = MappingRecord>,
    ) -> Self {
        let mut index = Self {
            normalizer,
            records: BTreeSet::new(),
            by_source: HashMap::new(),
            by_id: HashMap::new(),
            by_primary: HashMap::new(),
        };
        for record in records {
            index.insert(record);
        }
        index
    }

    pub fn from_snapshot(normalizer: Normalizer, snapshot: MappingSnapshot) -> Self {
        Self::from_records(normalizer, snapshot.records)
    }

    pub fn to_snapshot(&self, build_id: &str, built_at: &str) -> MappingSnapshot {
        MappingSnapshot {
            build_id: build_id.to_string(),
            built_at: built_at.to_string(),
            records: self.records.iter().cloned().collect(),
        }
    }

    fn insert(&mut self, record: MappingRecord) {
        self.by_source
            .entry((
                record.source_collection.clone(),
                record.source_id.clone(),
                record.target_collection.clone(),
            ))
            .or_default()
            .insert(record.primary_id.clone());
        self.by_id
            .entry((record.target_collection.clone(), record.source_id.clone()))
            .or_default()
            .insert(record.primary_id.clone());
        self.by_primary
            .entry((record.target_collection.clone(), record.primary_id.clone()))
            .or_default()
            .insert((record.source_collection.clone(), record.source_id.clone()));
        self.records.insert(record);
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &MappingRecord> {
        self.records.iter()
    }

    /// Primary ids of `target` that `from_id` maps to. With a source hint the
    /// id is normalized by that collection's rule; without one every rule's
    /// normalization is tried. An empty set means no mapping is known.
    pub fn map(&self, from_id: &str, target: &str, source_hint: Option<&str>) -> BTreeSet<String> {
        let target = self.normalizer.collection(target);
        let mut out = BTreeSet::new();
        match source_hint {
            Some(hint) => {
                let collection = self.normalizer.collection(hint);
                let id = self.normalizer.normalize(&collection, from_id);
                if let Some(found) = self.by_source.get(&(collection, id, target.clone())) {
                    out.extend(found.iter().cloned());
                }
            }
            None => {
                for candidate in self.normalizer.candidates(from_id) {
                    if let Some(found) = self.by_id.get(&(target.clone(), candidate)) {
                        out.extend(found.iter().cloned());
                    }
                }
            }
        }
        debug!(id = from_id, target = %target, hits = out.len(), "id mapping lookup");
        out
    }

    /// Every `(collection, id)` known to map onto `primary_id`.
    pub fn synonyms(&self, target: &str, primary_id: &str) -> Vec<(String, String)> {
        let target = self.normalizer.collection(target);
        self.by_primary
            .get(&(target, primary_id.to_string()))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct MappingIndexBuilder {
    normalizer: Normalizer,
    records: BTreeSet<MappingRecord>,
    skipped: usize,
}

impl MappingIndexBuilder {
    pub fn new(normalizer: Normalizer) -> Self {
        Self {
            normalizer,
            records: BTreeSet::new(),
            skipped: 0,
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Normalizes and inserts one row. Rows with a blank field are rejected.
    pub fn add(
        &mut self,
        source_collection: &str,
        source_id: &str,
        target_collection: &str,
        primary_id: &str,
    ) -> Result<bool, KiraError> {
        if [source_collection, source_id, target_collection, primary_id]
            .iter()
            .any(|field| field.trim().is_empty())
        {
            return Err(KiraError::MalformedRecord {
                source_name: source_collection.to_string(),
                message: format!(
                    "blank field in mapping row {source_id:?} -> {target_collection}:{primary_id:?}"
                ),
            });
        }
        let source_collection = self.normalizer.collection(source_collection);
        let target_collection = self.normalizer.collection(target_collection);
        let record = MappingRecord {
            source_id: self.normalizer.normalize(&source_collection, source_id),
            primary_id: self.normalizer.normalize(&target_collection, primary_id),
            source_collection,
            target_collection,
        };
        Ok(self.records.insert(record))
    }

    fn add_or_skip(&mut self, origin: &str, row: [&str; 4]) {
        if let Err(err) = self.add(row[0], row[1], row[2], row[3]) {
            warn!(source = origin, error = %err, "skipping mapping row");
            self.skipped += 1;
        }
    }

    /// Unification xrefs of warehouse entities map to themselves; identity
    /// and secondary-accession relationship xrefs map to the owner's
    /// primary id.
    pub fn add_from_warehouse(&mut self, graph: &Graph) {
        for node in graph.nodes() {
            if !node.kind.is_resolvable() {
                continue;
            }
            let xrefs = graph.xrefs(&node.uri);
            let primaries: Vec<_> = xrefs
                .iter()
                .filter(|(_, xref)| xref.kind == XrefKind::Unification)
                .map(|(_, xref)| xref)
                .collect();
            for primary in &primaries {
                self.add_or_skip(
                    &node.uri,
                    [&primary.collection, &primary.id, &primary.collection, &primary.id],
                );
            }
            for (_, xref) in &xrefs {
                let maps = xref.kind == XrefKind::Relationship
                    && matches!(
                        xref.relationship_type.as_deref(),
                        Some(REL_IDENTITY) | Some(REL_SECONDARY_ACCESSION)
                    );
                if !maps {
                    continue;
                }
                for primary in &primaries {
                    self.add_or_skip(
                        &node.uri,
                        [&xref.collection, &xref.id, &primary.collection, &primary.id],
                    );
                }
            }
        }
    }

    /// Reads a curated two-column TSV. The header line names the source and
    /// target collections; each following line is `source_id<TAB>primary_id`.
    /// Returns the number of rows accepted.
    pub fn add_curated_tsv<R: BufRead>(
        &mut self,
        reader: R,
        source_name: &str,
    ) -> Result<usize, KiraError> {
        let mut lines = reader.lines();
        let header = lines
            .next()
            .transpose()
            .map_err(|err| KiraError::Filesystem(err.to_string()))?
            .ok_or_else(|| KiraError::MalformedRecord {
                source_name: source_name.to_string(),
                message: "empty mapping file".to_string(),
            })?;
        let (from, to) = header
            .trim_end_matches('\r')
            .split_once('\t')
            .filter(|(from, to)| !from.trim().is_empty() && !to.trim().is_empty())
            .ok_or_else(|| KiraError::MalformedRecord {
                source_name: source_name.to_string(),
                message: format!("header must name two collections, got {header:?}"),
            })?;
        let (from, to) = (from.trim().to_string(), to.trim().to_string());

        let mut accepted = 0;
        for (line_no, line) in lines.enumerate() {
            let line = line.map_err(|err| KiraError::Filesystem(err.to_string()))?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let columns: Vec<&str> = line.split('\t').collect();
            if columns.len() != 2 {
                warn!(
                    source = source_name,
                    line = line_no + 2,
                    "skipping mapping row without exactly two columns"
                );
                self.skipped += 1;
                continue;
            }
            match self.add(&from, columns[0], &to, columns[1]) {
                Ok(_) => accepted += 1,
                Err(err) => {
                    warn!(source = source_name, line = line_no + 2, error = %err, "skipping mapping row");
                    self.skipped += 1;
                }
            }
        }
        Ok(accepted)
    }

    pub fn build(self) -> MappingIndex {
        MappingIndex::from_records(self.normalizer, self.records)
    }
}
