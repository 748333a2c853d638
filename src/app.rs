use std::fs::File;
use std::io::BufReader;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{info, warn};

use crate::chebi::read_chebi_obo;
use crate::config::ResolvedConfig;
use crate::dataset::load_dataset;
use crate::domain::{DatasetInput, ReferenceSource, SourceFormat};
use crate::error::KiraError;
use crate::graph::Graph;
use crate::merger::{MergeReport, Merger};
use crate::normalize::Normalizer;
use crate::reference::{RecordBatch, read_json_lines};
use crate::store::{Store, TargetSnapshot};
use crate::uniprot::read_uniprot_json;
use crate::warehouse::{SourceReport, WarehouseBuilder, WarehouseReport};

#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub build_id: String,
    pub report: WarehouseReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildList {
    pub builds: Vec<BuildEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildEntry {
    pub build_id: String,
    pub current: bool,
    pub nodes: Option<usize>,
    pub mapping_rows: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Ignore any existing target snapshot.
    pub fresh: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeRunResult {
    pub build_id: String,
    pub resumed: bool,
    pub reports: Vec<MergeReport>,
    pub failures: Vec<DatasetFailure>,
    pub target_nodes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetFailure {
    pub dataset: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MapResult {
    pub id: String,
    pub target: String,
    pub source: Option<String>,
    pub primary_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResult {
    pub store_root: String,
    pub current_build: Option<String>,
    pub builds: usize,
    pub target: Option<TargetStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetStatus {
    pub build_id: String,
    pub updated_at: String,
    pub datasets: Vec<String>,
    pub nodes: usize,
    pub stale: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Clone)]
pub struct App {
    store: Store,
    config: ResolvedConfig,
    normalizer: Normalizer,
}

impl App {
    pub fn new(store: Store, config: ResolvedConfig) -> Result<Self, KiraError> {
        let normalizer = Normalizer::new(config.collections.clone())?;
        Ok(Self {
            store,
            config,
            normalizer,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Reads every reference source and curated mapping file, builds the
    /// warehouse and mapping index, and makes the result the current build.
    /// Sources that cannot be read are reported and skipped.
    pub fn build_warehouse(
        &self,
        sources: &[ReferenceSource],
        mappings: &[Utf8PathBuf],
        sink: &dyn ProgressSink,
    ) -> Result<BuildResult, KiraError> {
        let start = Instant::now();
        let mut builder = WarehouseBuilder::new(self.normalizer.clone(), self.config.scheme.clone())
            .with_organisms(self.config.organisms.iter().cloned());
        let mut source_reports = Vec::new();

        for source in sources {
            sink.event(ProgressEvent {
                message: format!("phase=Read; {}:{}", source.format, source.path),
                elapsed: Some(start.elapsed()),
            });
            match read_source(source) {
                Ok(batch) => {
                    source_reports.push(SourceReport {
                        source: format!("{}:{}", source.format, source.path),
                        records: batch.records.len(),
                        skipped: batch.skipped,
                        error: None,
                    });
                    builder.add_batch(batch);
                }
                Err(err) => {
                    warn!(source = %source.path, error = %err, "skipping reference source");
                    source_reports.push(SourceReport {
                        source: format!("{}:{}", source.format, source.path),
                        records: 0,
                        skipped: 0,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        for path in mappings {
            sink.event(ProgressEvent {
                message: format!("phase=Read; mapping {path}"),
                elapsed: Some(start.elapsed()),
            });
            let result = File::open(path.as_std_path())
                .map_err(|err| KiraError::Filesystem(format!("{path}: {err}")))
                .and_then(|file| builder.add_curated_tsv(BufReader::new(file), path.as_str()));
            match result {
                Ok(rows) => source_reports.push(SourceReport {
                    source: format!("mapping:{path}"),
                    records: rows,
                    skipped: 0,
                    error: None,
                }),
                Err(err) => {
                    warn!(source = %path, error = %err, "skipping mapping file");
                    source_reports.push(SourceReport {
                        source: format!("mapping:{path}"),
                        records: 0,
                        skipped: 0,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        sink.event(ProgressEvent {
            message: "phase=Build; assembling warehouse".to_string(),
            elapsed: Some(start.elapsed()),
        });
        let build_id = self.unused_build_id();
        let built_at = chrono::Utc::now().to_rfc3339();
        let mut build = builder.build(&build_id, &built_at)?;
        build.report.sources = source_reports;

        sink.event(ProgressEvent {
            message: "phase=Store; writing build artifacts".to_string(),
            elapsed: Some(start.elapsed()),
        });
        self.store.save_build(&build)?;
        info!(build = %build_id, nodes = build.report.nodes, "warehouse build stored");

        Ok(BuildResult {
            build_id,
            report: build.report,
        })
    }

    pub fn list_builds(&self) -> Result<BuildList, KiraError> {
        let current = self.store.current_build()?;
        let mut builds = Vec::new();
        for build_id in self.store.list_builds()? {
            let report = self.store.read_report(&build_id)?;
            builds.push(BuildEntry {
                current: current.as_deref() == Some(build_id.as_str()),
                nodes: report.as_ref().map(|r| r.nodes),
                mapping_rows: report.as_ref().map(|r| r.mapping_rows),
                build_id,
            });
        }
        Ok(BuildList { builds })
    }

    fn unused_build_id(&self) -> String {
        let base = Store::new_build_id();
        let mut candidate = base.clone();
        let mut n = 1;
        while self.store.build_dir(&candidate).as_std_path().exists() {
            candidate = format!("{base}-{n}");
            n += 1;
        }
        candidate
    }

    fn require_current_build(&self) -> Result<String, KiraError> {
        self.store
            .current_build()?
            .ok_or_else(|| KiraError::MissingWarehouse(self.store.root().to_string()))
    }

    /// Merges datasets one after another into the target snapshot. A dataset
    /// that fails is recorded and skipped; a missing or corrupt warehouse
    /// aborts the run before anything is written.
    pub fn merge(
        &self,
        datasets: &[DatasetInput],
        options: MergeOptions,
        sink: &dyn ProgressSink,
    ) -> Result<MergeRunResult, KiraError> {
        let start = Instant::now();
        let _lock = self.store.lock()?;
        let build_id = self.require_current_build()?;

        sink.event(ProgressEvent {
            message: format!("phase=Load; warehouse {build_id}"),
            elapsed: Some(start.elapsed()),
        });
        let warehouse = self.store.load_warehouse(&build_id)?;
        let index = self.store.load_mapping(&build_id, self.normalizer.clone())?;

        let previous = if options.fresh {
            None
        } else {
            self.store.load_target()?
        };
        let (mut target, mut merged_labels, resumed) = match previous {
            Some(snapshot) if snapshot.build_id == build_id => {
                info!(nodes = snapshot.graph.len(), "resuming from existing target snapshot");
                (snapshot.graph, snapshot.datasets, true)
            }
            Some(snapshot) => {
                info!(
                    previous = %snapshot.build_id,
                    current = %build_id,
                    "target snapshot belongs to another build, starting fresh"
                );
                (Graph::new(), Vec::new(), false)
            }
            None => (Graph::new(), Vec::new(), false),
        };

        let merger = Merger::new(&warehouse, &index, self.config.merge)
            .with_organisms(self.config.organisms.iter().cloned());
        let mut reports = Vec::new();
        let mut failures = Vec::new();

        for input in datasets {
            sink.event(ProgressEvent {
                message: format!("phase=Merge; dataset {}", input.label),
                elapsed: Some(start.elapsed()),
            });
            match self.merge_one(&merger, input, &mut target) {
                Ok(report) => {
                    info!(
                        dataset = %input.label,
                        resolved = report.resolved,
                        unresolved = report.unresolved,
                        ambiguous = report.ambiguous,
                        added = report.nodes_added,
                        "dataset merged"
                    );
                    if !merged_labels.contains(&report.dataset) {
                        merged_labels.push(report.dataset.clone());
                    }
                    reports.push(report);
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(dataset = %input.label, error = %err, "dataset skipped");
                    failures.push(DatasetFailure {
                        dataset: input.label.to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }

        sink.event(ProgressEvent {
            message: "phase=Store; writing target snapshot".to_string(),
            elapsed: Some(start.elapsed()),
        });
        let target_nodes = target.len();
        let snapshot = TargetSnapshot {
            build_id: build_id.clone(),
            updated_at: chrono::Utc::now().to_rfc3339(),
            datasets: merged_labels,
            graph: target,
        };
        self.store.save_target(&snapshot)?;

        Ok(MergeRunResult {
            build_id,
            resumed,
            reports,
            failures,
            target_nodes,
        })
    }

    fn merge_one(
        &self,
        merger: &Merger<'_>,
        input: &DatasetInput,
        target: &mut Graph,
    ) -> Result<MergeReport, KiraError> {
        let dataset = load_dataset(&input.path, &input.label)?;
        let (prepared, mut report) = merger.prepare(dataset, &input.label, target)?;
        self.store.save_dataset_snapshot(&input.label, &prepared)?;
        report.nodes_added = merger.fold(prepared, target)?;
        Ok(report)
    }

    pub fn map(&self, id: &str, target: &str, source: Option<&str>) -> Result<MapResult, KiraError> {
        let build_id = self.require_current_build()?;
        let index = self.store.load_mapping(&build_id, self.normalizer.clone())?;
        let primary_ids = index.map(id, target, source).into_iter().collect();
        Ok(MapResult {
            id: id.to_string(),
            target: self.normalizer.collection(target),
            source: source.map(|s| self.normalizer.collection(s)),
            primary_ids,
        })
    }

    pub fn status(&self) -> Result<StatusResult, KiraError> {
        let current_build = self.store.current_build()?;
        let builds = self.store.list_builds()?.len();
        let target = self.store.load_target()?.map(|snapshot| TargetStatus {
            stale: current_build.as_deref() != Some(snapshot.build_id.as_str()),
            nodes: snapshot.graph.len(),
            build_id: snapshot.build_id,
            updated_at: snapshot.updated_at,
            datasets: snapshot.datasets,
        });
        Ok(StatusResult {
            store_root: self.store.root().to_string(),
            current_build,
            builds,
            target,
        })
    }
}

fn read_source(source: &ReferenceSource) -> Result<RecordBatch, KiraError> {
    let file = File::open(source.path.as_std_path())
        .map_err(|err| KiraError::Filesystem(format!("{}: {err}", source.path)))?;
    let reader = BufReader::new(file);
    let name = source.path.as_str();
    match source.format {
        SourceFormat::Uniprot => read_uniprot_json(reader, name),
        SourceFormat::Chebi => read_chebi_obo(reader, name).map(|dump| dump.batch),
        SourceFormat::Records => read_json_lines(reader, name),
    }
}
