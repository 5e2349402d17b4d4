//! Persistence gateway: opaque load/save of a whole project graph.
//!
//! The only contract is round-trip fidelity: every element's id, class,
//! attributes and reference targets must be identical before and after a
//! load/save cycle. The YAML backend stores one file per project with
//! advisory file locking for rudimentary multi-process support.

use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, Result};
use crate::models::ModelGraph;
use crate::registry::ProjectRegistry;

/// Storage backend for whole project graphs, keyed by project id
pub trait StorageBackend: Send + Sync {
    /// Loads the entire graph for a project. A project that has never been
    /// saved loads as an empty graph.
    fn load(&self, project: &str) -> Result<ModelGraph>;

    /// Saves the entire graph for a project
    fn save(&self, project: &str, graph: &ModelGraph) -> Result<()>;

    /// Whether the project has been persisted at least once
    fn exists(&self, project: &str) -> bool;
}

/// YAML file backend: `<base_dir>/<project>.yaml`, with registered projects
/// allowed to live at arbitrary paths.
pub struct YamlBackend {
    base_dir: PathBuf,
    overrides: BTreeMap<String, PathBuf>,
}

impl YamlBackend {
    /// Backend storing every project under `base_dir`
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            overrides: BTreeMap::new(),
        }
    }

    /// Backend that honors registered project paths, falling back to
    /// `base_dir` for unregistered project ids
    pub fn with_registry<P: AsRef<Path>>(base_dir: P, registry: &ProjectRegistry) -> Self {
        let overrides = registry
            .entries()
            .map(|(name, entry)| (name.to_string(), PathBuf::from(&entry.path)))
            .collect();
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            overrides,
        }
    }

    /// Resolves the on-disk location of a project's store file
    pub fn path_for(&self, project: &str) -> PathBuf {
        match self.overrides.get(project) {
            Some(path) => path.clone(),
            None => self.base_dir.join(format!("{}.yaml", project)),
        }
    }

    fn lock_path_for(&self, project: &str) -> PathBuf {
        self.path_for(project).with_extension("yaml.lock")
    }

    /// Acquire an exclusive lock for writing. The returned handle must be
    /// held for the duration of the operation.
    fn acquire_write_lock(&self, project: &str) -> Result<File> {
        let lock_path = self.lock_path_for(project);
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&lock_path)?;

        wait_for_lock(&lock_path, || FileExt::try_lock_exclusive(&lock_file))?;
        Ok(lock_file)
    }

    /// Acquire a shared lock for reading, if a lock file exists at all
    fn acquire_read_lock(&self, project: &str) -> Result<Option<File>> {
        let lock_path = self.lock_path_for(project);
        if !lock_path.exists() {
            return Ok(None);
        }

        let lock_file = OpenOptions::new().read(true).open(&lock_path)?;
        wait_for_lock(&lock_path, || FileExt::try_lock_shared(&lock_file))?;
        Ok(Some(lock_file))
    }
}

/// Retry an advisory-lock acquisition until it succeeds or times out
fn wait_for_lock<F>(lock_path: &Path, mut try_lock: F) -> Result<()>
where
    F: FnMut() -> std::io::Result<()>,
{
    let start = std::time::Instant::now();
    let timeout = Duration::from_secs(5);

    loop {
        match try_lock() {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if start.elapsed() > timeout {
                    return Err(CoreError::LockTimeout(lock_path.display().to_string()));
                }
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(e) => return Err(CoreError::Io(e)),
        }
    }
}

impl StorageBackend for YamlBackend {
    fn load(&self, project: &str) -> Result<ModelGraph> {
        let path = self.path_for(project);

        // First touch of a project creates its (empty) store file
        if !path.exists() {
            let graph = ModelGraph::new();
            self.save(project, &graph)?;
            return Ok(graph);
        }

        let _lock = self.acquire_read_lock(project)?;

        let file = File::open(&path)?;
        let reader = BufReader::new(file);
        let graph: ModelGraph = serde_yaml::from_reader(reader)?;

        tracing::debug!(project, elements = graph.len(), "loaded project graph");
        Ok(graph)
    }

    fn save(&self, project: &str, graph: &ModelGraph) -> Result<()> {
        let path = self.path_for(project);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut lock_file = self.acquire_write_lock(project)?;

        // Lock holder info, for debugging stuck locks
        let _ = writeln!(
            lock_file,
            "Locked by PID {} at {}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );

        let yaml = serde_yaml::to_string(graph)?;
        fs::write(&path, yaml)?;

        tracing::debug!(project, elements = graph.len(), "saved project graph");
        Ok(())
    }

    fn exists(&self, project: &str) -> bool {
        self.path_for(project).exists()
    }
}
