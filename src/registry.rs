use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::version::{Requirement, Version};

/// User plugin registry, stored as `plugins.json` in the tool home.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PluginRegistry {
    #[serde(default = "default_format")]
    pub version: String,
    #[serde(default)]
    pub installed: BTreeMap<String, PluginEntry>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self {
            version: default_format(),
            installed: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PluginEntry {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vagabond_version: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

impl PluginEntry {
    pub fn parsed_version(&self) -> Result<Version, RegistryError> {
        self.version
            .parse()
            .map_err(|_| RegistryError::InvalidVersion(self.version.clone()))
    }

    pub fn core_requirement(&self) -> Result<Requirement, RegistryError> {
        match &self.vagabond_version {
            Some(raw) => raw
                .parse()
                .map_err(|_| RegistryError::InvalidRequirement(raw.clone())),
            None => Ok(Requirement::any()),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unsupported plugin registry format '{0}'")]
    UnsupportedFormat(String),
    #[error("plugin registry contains an entry with an empty name")]
    EmptyName,
    #[error("plugin registry has an invalid version '{0}'")]
    InvalidVersion(String),
    #[error("plugin registry has an invalid requirement '{0}'")]
    InvalidRequirement(String),
}

fn default_format() -> String {
    "1".to_string()
}

pub fn load_registry(path: &Path) -> anyhow::Result<PluginRegistry> {
    if !path.exists() {
        return Ok(PluginRegistry::default());
    }

    let data = fs::read_to_string(path)
        .with_context(|| format!("reading plugin registry at {}", path.display()))?;
    let registry: PluginRegistry = serde_json::from_str(&data)
        .with_context(|| format!("parsing plugin registry at {}", path.display()))?;
    validate_registry(registry)
        .with_context(|| format!("validating plugin registry at {}", path.display()))
}

fn validate_registry(registry: PluginRegistry) -> Result<PluginRegistry, RegistryError> {
    if registry.version != "1" {
        return Err(RegistryError::UnsupportedFormat(registry.version));
    }

    for (name, entry) in registry.installed.iter() {
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        entry.parsed_version()?;
        entry.core_requirement()?;
        for requirement in entry.dependencies.values() {
            requirement
                .parse::<Requirement>()
                .map_err(|_| RegistryError::InvalidRequirement(requirement.clone()))?;
        }
    }

    Ok(registry)
}
