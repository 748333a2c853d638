use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use directories::ProjectDirs;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::Builder;
use tracing::{debug, warn};

use crate::domain::ProvenanceLabel;
use crate::error::KiraError;
use crate::graph::Graph;
use crate::mapping::{MappingIndex, MappingSnapshot};
use crate::normalize::Normalizer;
use crate::warehouse::{Warehouse, WarehouseBuild, WarehouseReport};

const LOCAL_ROOT: &str = ".kira-pm";

/// The accumulated merge result, tagged with the warehouse build it was
/// produced against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSnapshot {
    pub build_id: String,
    pub updated_at: String,
    #[serde(default)]
    pub datasets: Vec<String>,
    pub graph: Graph,
}

#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    /// `./.kira-pm` when it exists, otherwise the per-user data directory.
    pub fn new() -> Result<Self, KiraError> {
        let cwd = std::env::current_dir().map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let local = Utf8PathBuf::from_path_buf(cwd.join(LOCAL_ROOT))
            .map_err(|_| KiraError::Filesystem("invalid project path".to_string()))?;
        if local.as_std_path().is_dir() {
            return Ok(Self { root: local });
        }
        let root = ProjectDirs::from("org", "kira", "kira-pathway-merger")
            .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().to_path_buf()).ok())
            .ok_or_else(|| KiraError::Filesystem("unable to resolve data directory".to_string()))?;
        Ok(Self { root })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn build_dir(&self, build_id: &str) -> Utf8PathBuf {
        self.root.join("builds").join(build_id)
    }

    pub fn warehouse_path(&self, build_id: &str) -> Utf8PathBuf {
        self.build_dir(build_id).join("warehouse.json.gz")
    }

    pub fn mapping_path(&self, build_id: &str) -> Utf8PathBuf {
        self.build_dir(build_id).join("mapping.json.gz")
    }

    pub fn report_path(&self, build_id: &str) -> Utf8PathBuf {
        self.build_dir(build_id).join("report.json")
    }

    pub fn current_path(&self) -> Utf8PathBuf {
        self.root.join("CURRENT")
    }

    pub fn target_path(&self) -> Utf8PathBuf {
        self.root.join("merged").join("main.json.gz")
    }

    pub fn dataset_snapshot_path(&self, label: &ProvenanceLabel) -> Utf8PathBuf {
        self.root.join("merged").join(format!("{label}.json.gz"))
    }

    pub fn lock_path(&self) -> Utf8PathBuf {
        self.root.join("merge.lock")
    }

    pub fn ensure_root(&self) -> Result<(), KiraError> {
        fs::create_dir_all(self.root.as_std_path()).map_err(|err| KiraError::Filesystem(err.to_string()))
    }

    /// Timestamp id for a new warehouse build.
    pub fn new_build_id() -> String {
        chrono::Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string()
    }

    /// Writes `value` as gzipped JSON through a temp file in the same
    /// directory, then renames it into place.
    pub fn write_artifact<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), KiraError> {
        let parent = path
            .parent()
            .ok_or_else(|| KiraError::Filesystem(format!("invalid artifact path {path}")))?;
        fs::create_dir_all(parent.as_std_path()).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let temp = Builder::new()
            .prefix(".kira-pm-artifact")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        {
            let mut encoder = GzEncoder::new(BufWriter::new(temp.as_file()), Compression::default());
            serde_json::to_writer(&mut encoder, value).map_err(|err| KiraError::Filesystem(err.to_string()))?;
            let mut inner = encoder.finish().map_err(|err| KiraError::Filesystem(err.to_string()))?;
            inner.flush().map_err(|err| KiraError::Filesystem(err.to_string()))?;
        }
        temp.persist(path.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        debug!(path = %path, "wrote artifact");
        Ok(())
    }

    pub fn read_artifact<T: DeserializeOwned>(path: &Utf8Path) -> Result<T, KiraError> {
        let file = File::open(path.as_std_path()).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        serde_json::from_reader(GzDecoder::new(BufReader::new(file))).map_err(|err| {
            KiraError::CorruptArtifact {
                path: path.to_string(),
                message: err.to_string(),
            }
        })
    }

    pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), KiraError> {
        let content = serde_json::to_vec_pretty(value).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), KiraError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(())
    }

    /// Persists a finished build and makes it the current one.
    pub fn save_build(&self, build: &WarehouseBuild) -> Result<(), KiraError> {
        let build_id = &build.warehouse.build_id;
        Self::write_artifact(&self.warehouse_path(build_id), &build.warehouse)?;
        let snapshot = build.index.to_snapshot(build_id, &build.warehouse.built_at);
        Self::write_artifact(&self.mapping_path(build_id), &snapshot)?;
        Self::write_json_atomic(&self.report_path(build_id), &build.report)?;
        self.set_current_build(build_id)
    }

    pub fn set_current_build(&self, build_id: &str) -> Result<(), KiraError> {
        Self::write_bytes_atomic(&self.current_path(), build_id.as_bytes())
    }

    pub fn current_build(&self) -> Result<Option<String>, KiraError> {
        match fs::read_to_string(self.current_path().as_std_path()) {
            Ok(content) => {
                let id = content.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(KiraError::Filesystem(err.to_string())),
        }
    }

    /// Build ids found on disk, oldest first.
    pub fn list_builds(&self) -> Result<Vec<String>, KiraError> {
        let builds_dir = self.root.join("builds");
        if !builds_dir.as_std_path().is_dir() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(builds_dir.as_std_path()).map_err(|err| KiraError::Filesystem(err.to_string()))? {
            let entry = entry.map_err(|err| KiraError::Filesystem(err.to_string()))?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn read_report(&self, build_id: &str) -> Result<Option<WarehouseReport>, KiraError> {
        let path = self.report_path(build_id);
        match fs::read_to_string(path.as_std_path()) {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|err| KiraError::CorruptArtifact {
                    path: path.to_string(),
                    message: err.to_string(),
                }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(KiraError::Filesystem(err.to_string())),
        }
    }

    pub fn load_warehouse(&self, build_id: &str) -> Result<Warehouse, KiraError> {
        let path = self.warehouse_path(build_id);
        if !path.as_std_path().is_file() {
            return Err(KiraError::MissingWarehouse(path.to_string()));
        }
        Self::read_artifact(&path)
    }

    pub fn load_mapping(&self, build_id: &str, normalizer: Normalizer) -> Result<MappingIndex, KiraError> {
        let path = self.mapping_path(build_id);
        if !path.as_std_path().is_file() {
            return Err(KiraError::MissingMappingIndex(build_id.to_string()));
        }
        let snapshot: MappingSnapshot = Self::read_artifact(&path)?;
        Ok(MappingIndex::from_snapshot(normalizer, snapshot))
    }

    pub fn load_target(&self) -> Result<Option<TargetSnapshot>, KiraError> {
        let path = self.target_path();
        if !path.as_std_path().is_file() {
            return Ok(None);
        }
        Self::read_artifact(&path).map(Some)
    }

    pub fn save_target(&self, snapshot: &TargetSnapshot) -> Result<(), KiraError> {
        Self::write_artifact(&self.target_path(), snapshot)
    }

    pub fn save_dataset_snapshot(&self, label: &ProvenanceLabel, graph: &Graph) -> Result<(), KiraError> {
        Self::write_artifact(&self.dataset_snapshot_path(label), graph)
    }

    /// Takes the merge lock. Fails when another run holds it.
    pub fn lock(&self) -> Result<StoreLock, KiraError> {
        self.ensure_root()?;
        let path = self.lock_path();
        match OpenOptions::new().write(true).create_new(true).open(path.as_std_path()) {
            Ok(mut file) => {
                let lock = StoreLock { path };
                writeln!(file, "{}", std::process::id())
                    .map_err(|err| KiraError::Filesystem(err.to_string()))?;
                Ok(lock)
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                Err(KiraError::StoreLocked(path.to_string()))
            }
            Err(err) => Err(KiraError::Filesystem(err.to_string())),
        }
    }
}

/// Removes the lock file when dropped.
#[derive(Debug)]
pub struct StoreLock {
    path: Utf8PathBuf,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(self.path.as_std_path()) {
            warn!(path = %self.path, error = %err, "failed to release merge lock");
        }
    }
}
