use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};

/// A registered project: where its store file lives and what it is
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectEntry {
    /// Path to the project's store file
    pub path: String,
    /// Description of the project
    pub description: String,
}

/// Registry of all known projects
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectRegistry {
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectEntry>,
    /// Optional default project name
    #[serde(default)]
    pub default_project: Option<String>,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the registry from the provided path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Save the registry to the specified path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(&self)?;
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(())
    }

    /// Creates a default registry file if it doesn't exist
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<()> {
        if path.as_ref().exists() {
            return Ok(());
        }
        let mut registry = Self::new();
        registry.register(
            "default".to_string(),
            "modelgraph.yaml".to_string(),
            "Default project".to_string(),
        );
        registry.save(path)
    }

    pub fn get(&self, name: &str) -> Option<&ProjectEntry> {
        self.projects.get(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &ProjectEntry)> {
        self.projects.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Registers a new project or updates an existing one
    pub fn register(&mut self, name: String, path: String, description: String) {
        self.projects.insert(name, ProjectEntry { path, description });
    }

    /// Sets a project as the default
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.projects.contains_key(name) {
            return Err(CoreError::UnknownProject(name.to_string()));
        }
        self.default_project = Some(name.to_string());
        Ok(())
    }

    pub fn default_project(&self) -> Option<(&str, &ProjectEntry)> {
        let name = self.default_project.as_deref()?;
        self.projects.get(name).map(|entry| (name, entry))
    }

    /// Determines which project id to use, in priority order: the explicit
    /// option, the `MODELGRAPH_PROJECT` environment variable, the sole
    /// registry entry, the registry default, the literal "default".
    pub fn resolve_project(&self, explicit: Option<&str>) -> Result<String> {
        // Unregistered names are still usable; they land in the base dir
        if let Some(name) = explicit {
            return Ok(name.to_string());
        }

        if let Ok(name) = env::var("MODELGRAPH_PROJECT") {
            if self.projects.contains_key(&name) {
                return Ok(name);
            }
            return Err(CoreError::UnknownProject(name));
        }

        if self.projects.len() == 1 {
            if let Some(name) = self.projects.keys().next() {
                return Ok(name.clone());
            }
        }

        if let Some((name, _)) = self.default_project() {
            return Ok(name.to_string());
        }

        Ok("default".to_string())
    }
}

/// Gets the path to the registry file.
///
/// `MODELGRAPH_REGISTRY` overrides the default of
/// `~/.modelgraph/registry.yaml`.
pub fn get_registry_path() -> Result<PathBuf> {
    if let Ok(path) = env::var("MODELGRAPH_REGISTRY") {
        return Ok(PathBuf::from(path));
    }

    let home_dir = dirs::home_dir().ok_or_else(|| {
        CoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "failed to determine home directory",
        ))
    })?;
    Ok(home_dir.join(".modelgraph").join("registry.yaml"))
}
