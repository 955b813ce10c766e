use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};

use crate::env::{self, ProcessEnv};

pub const DEFAULT_PROJECT_FILE: &str = "Vagabondfile";

/// Experimental feature switch read from `VAGABOND_EXPERIMENTAL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Experimental {
    Disabled,
    All,
    Features(Vec<String>),
}

impl Experimental {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim) else {
            return Experimental::Disabled;
        };
        match raw {
            "" | "0" => Experimental::Disabled,
            "1" => Experimental::All,
            list => {
                let features: Vec<String> = list
                    .split(',')
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect();
                if features.is_empty() {
                    Experimental::Disabled
                } else {
                    Experimental::Features(features)
                }
            }
        }
    }
}

/// Paths and switches derived from the process environment once the
/// runtime guard has passed.
#[derive(Debug, Clone)]
pub struct Settings {
    pub home: PathBuf,
    pub cwd: PathBuf,
    pub project_file_name: String,
    pub plugins_enabled: bool,
    pub in_installer: bool,
    pub very_quiet: bool,
    pub experimental: Experimental,
}

impl Settings {
    pub fn from_env(env: &ProcessEnv) -> anyhow::Result<Self> {
        let home = match env.get(env::HOME).filter(|v| !v.is_empty()) {
            Some(home) => PathBuf::from(home),
            None => dirs::home_dir()
                .ok_or_else(|| anyhow!("could not determine the user home directory"))?
                .join(".vagabond.d"),
        };

        let cwd = match env.get(env::CWD).filter(|v| !v.is_empty()) {
            Some(cwd) => PathBuf::from(cwd),
            None => std::env::current_dir().context("resolving working directory")?,
        };

        let project_file_name = env
            .get(env::PROJECT_FILE)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_PROJECT_FILE)
            .to_string();

        Ok(Self {
            home: absolutize(&home, &cwd),
            cwd,
            project_file_name,
            plugins_enabled: !env.is_set(env::NO_PLUGINS),
            in_installer: env.is_set(env::INSTALLER_ENV),
            very_quiet: env.is_set(env::VERY_QUIET),
            experimental: Experimental::parse(env.get(env::EXPERIMENTAL)),
        })
    }

    pub fn plugins_file(&self) -> PathBuf {
        self.home.join("plugins.json")
    }

    pub fn gems_dir(&self) -> PathBuf {
        self.home.join("gems")
    }

    pub fn boxes_dir(&self) -> PathBuf {
        self.home.join("boxes")
    }
}

fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
