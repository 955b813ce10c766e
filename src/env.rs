use std::collections::BTreeMap;
use std::process::Command;

pub const INTERNAL_BUNDLERIZED: &str = "VAGABOND_INTERNAL_BUNDLERIZED";
pub const NO_PLUGINS: &str = "VAGABOND_NO_PLUGINS";
pub const PROJECT_FILE: &str = "VAGABOND_PROJECTFILE";
pub const LOG: &str = "VAGABOND_LOG";
pub const NO_COLOR: &str = "VAGABOND_NO_COLOR";
pub const FORCE_COLOR: &str = "VAGABOND_FORCE_COLOR";
pub const INSTALLER_ENV: &str = "VAGABOND_INSTALLER_ENV";
pub const VERY_QUIET: &str = "VAGABOND_I_KNOW_WHAT_IM_DOING_PLEASE_BE_QUIET";
pub const HOME: &str = "VAGABOND_HOME";
pub const CWD: &str = "VAGABOND_CWD";
pub const EXPERIMENTAL: &str = "VAGABOND_EXPERIMENTAL";
pub const RUNTIME_INTERPRETER: &str = "VAGABOND_RUNTIME_INTERPRETER";
pub const PREPARE_SCRIPT: &str = "VAGABOND_PREPARE_SCRIPT";
pub const EXECUTABLE: &str = "VAGABOND_EXECUTABLE";
pub const PLUGIN_PATH: &str = "VAGABOND_PLUGIN_PATH";

/// Process-wide variables, seeded from the real environment and threaded
/// explicitly through the bootstrap stages.
///
/// The real environment of this process is never written. Every `set` and
/// `remove` is recorded, and [`ProcessEnv::apply`] replays only those
/// changes on top of what a child inherits, so inherited variables reach it
/// byte for byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessEnv {
    vars: BTreeMap<String, String>,
    changes: BTreeMap<String, Option<String>>,
}

impl ProcessEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from the process. Variables that are not valid unicode are left
    /// out of the lookup table; they are still inherited by children.
    pub fn from_process() -> Self {
        std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Presence check; an empty value still counts as set.
    pub fn is_set(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        self.changes.insert(key.clone(), Some(value.clone()));
        self.vars.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.changes.insert(key.to_string(), None);
        self.vars.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Variables set or removed since seeding; `None` marks a removal.
    pub fn changes(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.changes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Overlay the recorded changes on the child's inherited environment.
    pub fn apply(&self, command: &mut Command) {
        for (key, value) in self.changes() {
            match value {
                Some(value) => command.env(key, value),
                None => command.env_remove(key),
            };
        }
    }
}

/// Seeds the lookup table without recording changes, like
/// [`ProcessEnv::from_process`].
impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ProcessEnv {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            changes: BTreeMap::new(),
        }
    }
}
