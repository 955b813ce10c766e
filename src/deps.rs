use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::env::{self, ProcessEnv};
use crate::registry::{PluginRegistry, load_registry};
use crate::version::{Requirement, Version};

/// Named dependency groups, activated in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    Default,
    Plugins,
}

impl Group {
    pub fn name(&self) -> &'static str {
        match self {
            Group::Default => "default",
            Group::Plugins => "plugins",
        }
    }
}

#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("could not find plugin '{name}' version {version} in {}", location.display())]
    PluginMissing {
        name: String,
        version: String,
        location: PathBuf,
    },
    #[error("could not find '{dependency}' ({requirement}) required by plugin '{plugin}'")]
    DependencyMissing {
        plugin: String,
        dependency: String,
        requirement: String,
    },
    #[error("plugin '{plugin}' requires vagabond {requirement}, but {running} is running")]
    CoreConflict {
        plugin: String,
        requirement: String,
        running: String,
    },
    #[error(
        "plugin '{plugin}' requires '{dependency}' ({requirement}), but only {installed} is installed"
    )]
    DependencyConflict {
        plugin: String,
        dependency: String,
        requirement: String,
        installed: String,
    },
}

impl DependencyError {
    /// Missing pieces can be skipped; conflicts cannot.
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            DependencyError::PluginMissing { .. } | DependencyError::DependencyMissing { .. }
        )
    }
}

/// Groups that were activated for this process.
#[derive(Debug, Default)]
pub struct Runtime {
    groups: Vec<Group>,
    plugins: Vec<String>,
    load_path: Vec<PathBuf>,
}

impl Runtime {
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn plugins(&self) -> &[String] {
        &self.plugins
    }

    pub fn load_path(&self) -> &[PathBuf] {
        &self.load_path
    }
}

#[derive(Debug)]
pub enum Activation {
    Ready(Runtime),
    /// Continuing is unsafe; exit with `status` without dispatching.
    Abort { status: i32 },
}

pub fn core_version() -> anyhow::Result<Version> {
    env!("CARGO_PKG_VERSION")
        .parse()
        .context("parsing the running vagabond version")
}

/// Activate the `default` and `plugins` groups.
///
/// A missing plugin or dependency is reported on `stderr` and the process
/// continues without the plugins group. A version conflict is reported and
/// turned into [`Activation::Abort`].
pub fn initialize(
    settings: &Settings,
    env: &mut ProcessEnv,
    stderr: &mut dyn Write,
) -> anyhow::Result<Activation> {
    let mut runtime = Runtime::default();

    let gems_dir = settings.gems_dir();
    fs::create_dir_all(&gems_dir)
        .with_context(|| format!("creating gem directory {}", gems_dir.display()))?;
    runtime.groups.push(Group::Default);
    runtime.load_path.push(gems_dir.clone());
    debug!(group = Group::Default.name(), path = %gems_dir.display(), "activated group");

    if settings.plugins_enabled {
        let registry = load_registry(&settings.plugins_file())?;
        let inventory = installed_gems(&gems_dir)?;
        match resolve_plugins(&registry, &inventory, &gems_dir, &core_version()?) {
            Ok(resolved) => {
                for (name, path) in resolved {
                    runtime.plugins.push(name);
                    runtime.load_path.push(path);
                }
                runtime.groups.push(Group::Plugins);
                info!(plugins = ?runtime.plugins, "activated group plugins");
            }
            Err(err) if err.is_missing() => {
                warn!(error = %err, "continuing without plugins");
                write!(stderr, "{}", missing_dependency_notice(settings, &err))?;
            }
            Err(err) => {
                warn!(error = %err, "plugin version conflict");
                write!(stderr, "{}", version_conflict_notice(settings, &err))?;
                return Ok(Activation::Abort { status: 1 });
            }
        }
    } else {
        info!("plugin loading disabled for this invocation");
    }

    let joined = std::env::join_paths(&runtime.load_path).context("building plugin load path")?;
    env.set(env::PLUGIN_PATH, joined.to_string_lossy());

    Ok(Activation::Ready(runtime))
}

type Inventory = BTreeMap<String, Vec<(Version, PathBuf)>>;

/// Installed gems keyed by name, read from `<name>-<version>` directories.
fn installed_gems(gems_dir: &Path) -> anyhow::Result<Inventory> {
    let mut inventory = Inventory::new();
    let entries = fs::read_dir(gems_dir)
        .with_context(|| format!("listing gem directory {}", gems_dir.display()))?;

    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        let Some((name, version)) = file_name.rsplit_once('-') else {
            continue;
        };
        let Ok(version) = version.parse::<Version>() else {
            continue;
        };
        inventory
            .entry(name.to_string())
            .or_default()
            .push((version, entry.path()));
    }

    Ok(inventory)
}

fn resolve_plugins(
    registry: &PluginRegistry,
    inventory: &Inventory,
    gems_dir: &Path,
    running: &Version,
) -> Result<Vec<(String, PathBuf)>, DependencyError> {
    let mut resolved = Vec::new();

    for (name, entry) in registry.installed.iter() {
        // Entries were validated when the registry was loaded.
        let wanted = entry.parsed_version().ok();
        let location = inventory.get(name).and_then(|installed| {
            installed
                .iter()
                .find(|(version, _)| Some(version) == wanted.as_ref())
                .map(|(_, path)| path.clone())
        });
        let Some(location) = location else {
            return Err(DependencyError::PluginMissing {
                name: name.clone(),
                version: entry.version.clone(),
                location: gems_dir.to_path_buf(),
            });
        };

        let core = entry.core_requirement().unwrap_or_else(|_| Requirement::any());
        if !core.matches(running) {
            return Err(DependencyError::CoreConflict {
                plugin: name.clone(),
                requirement: core.to_string(),
                running: running.to_string(),
            });
        }

        for (dependency, raw) in entry.dependencies.iter() {
            let requirement: Requirement = raw.parse().unwrap_or_else(|_| Requirement::any());
            let Some(candidates) = inventory.get(dependency) else {
                return Err(DependencyError::DependencyMissing {
                    plugin: name.clone(),
                    dependency: dependency.clone(),
                    requirement: raw.clone(),
                });
            };
            if !candidates.iter().any(|(v, _)| requirement.matches(v)) {
                let installed: Vec<String> = candidates.iter().map(|(v, _)| v.to_string()).collect();
                return Err(DependencyError::DependencyConflict {
                    plugin: name.clone(),
                    dependency: dependency.clone(),
                    requirement: raw.clone(),
                    installed: installed.join(", "),
                });
            }
        }

        debug!(plugin = %name, path = %location.display(), "resolved plugin");
        resolved.push((name.clone(), location));
    }

    Ok(resolved)
}

fn missing_dependency_notice(settings: &Settings, err: &DependencyError) -> String {
    format!(
        "Vagabond failed to resolve one of your installed plugins or one of\n\
         their dependencies. This usually means a plugin installation was\n\
         interrupted or a plugin was removed by hand. The reported error is:\n\
         \n\
         \x20   {err}\n\
         \n\
         To fix this, remove the plugin registry and reinstall your plugins:\n\
         \n\
         \x20   rm {}\n\
         \n\
         Vagabond will continue without loading any plugins.\n\n",
        settings.plugins_file().display()
    )
}

fn version_conflict_notice(settings: &Settings, err: &DependencyError) -> String {
    format!(
        "Vagabond experienced a version conflict with some installed plugins!\n\
         This usually happens after upgrading Vagabond: some of the existing\n\
         plugins are no longer compatible with this version. Remove your\n\
         existing plugins and reinstall them one by one:\n\
         \n\
         \x20   rm -r {} {}\n\
         \n\
         If VAGABOND_HOME is set, these paths live inside that directory\n\
         rather than your home directory.\n\
         \n\
         The error message is shown below:\n\
         \n\
         {err}\n",
        settings.plugins_file().display(),
        settings.gems_dir().display()
    )
}

#[cfg(test)]
mod tests {
    use super::{Activation, Group, initialize};
    use crate::config::Settings;
    use crate::env::{self, ProcessEnv};

    fn settings_for(home: &std::path::Path, extra: &[(&str, &str)]) -> (Settings, ProcessEnv) {
        let mut env = ProcessEnv::new();
        env.set(env::HOME, home.to_string_lossy());
        env.set(env::CWD, home.to_string_lossy());
        for (k, v) in extra {
            env.set(*k, *v);
        }
        (Settings::from_env(&env).unwrap(), env)
    }

    fn write_registry(home: &std::path::Path, body: &str) {
        std::fs::write(home.join("plugins.json"), body).unwrap();
    }

    #[test]
    fn empty_home_activates_both_groups() {
        let dir = tempfile::tempdir().unwrap();
        let (settings, mut env) = settings_for(dir.path(), &[]);
        let mut stderr = Vec::new();

        let Activation::Ready(runtime) = initialize(&settings, &mut env, &mut stderr).unwrap() else {
            panic!("expected activation");
        };
        assert_eq!(runtime.groups(), &[Group::Default, Group::Plugins]);
        assert!(stderr.is_empty());
        assert!(dir.path().join("gems").is_dir());
        assert!(env.get(env::PLUGIN_PATH).unwrap().contains("gems"));
    }

    #[test]
    fn resolves_installed_plugin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("gems/vagabond-qemu-0.3.1")).unwrap();
        std::fs::create_dir_all(dir.path().join("gems/ffi-1.16.3")).unwrap();
        write_registry(
            dir.path(),
            r#"{"version":"1","installed":{"vagabond-qemu":{"version":"0.3.1","vagabond_version":">= 0.1","dependencies":{"ffi":"~> 1.15"}}}}"#,
        );
        let (settings, mut env) = settings_for(dir.path(), &[]);
        let mut stderr = Vec::new();

        let Activation::Ready(runtime) = initialize(&settings, &mut env, &mut stderr).unwrap() else {
            panic!("expected activation");
        };
        assert_eq!(runtime.plugins(), &["vagabond-qemu".to_string()]);
        assert_eq!(runtime.load_path().len(), 2);
    }

    #[test]
    fn missing_plugin_degrades_without_plugins() {
        let dir = tempfile::tempdir().unwrap();
        write_registry(
            dir.path(),
            r#"{"version":"1","installed":{"vagabond-qemu":{"version":"0.3.1"}}}"#,
        );
        let (settings, mut env) = settings_for(dir.path(), &[]);
        let mut stderr = Vec::new();

        let Activation::Ready(runtime) = initialize(&settings, &mut env, &mut stderr).unwrap() else {
            panic!("missing plugins must not abort");
        };
        assert_eq!(runtime.groups(), &[Group::Default]);
        let notice = String::from_utf8(stderr).unwrap();
        assert!(notice.contains("plugins.json"));
        assert!(notice.contains("continue without loading any plugins"));
    }

    #[test]
    fn core_version_conflict_aborts_with_status_one() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("gems/vagabond-old-1.0.0")).unwrap();
        write_registry(
            dir.path(),
            r#"{"version":"1","installed":{"vagabond-old":{"version":"1.0.0","vagabond_version":">= 99.0"}}}"#,
        );
        let (settings, mut env) = settings_for(dir.path(), &[]);
        let mut stderr = Vec::new();

        let activation = initialize(&settings, &mut env, &mut stderr).unwrap();
        assert!(matches!(activation, Activation::Abort { status: 1 }));
        let notice = String::from_utf8(stderr).unwrap();
        assert!(notice.contains("version conflict"));
        assert!(notice.contains("requires vagabond >= 99.0"));
    }

    #[test]
    fn dependency_conflict_aborts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("gems/vagabond-qemu-0.3.1")).unwrap();
        std::fs::create_dir_all(dir.path().join("gems/ffi-1.9.0")).unwrap();
        write_registry(
            dir.path(),
            r#"{"version":"1","installed":{"vagabond-qemu":{"version":"0.3.1","dependencies":{"ffi":"~> 1.15"}}}}"#,
        );
        let (settings, mut env) = settings_for(dir.path(), &[]);
        let mut stderr = Vec::new();

        let activation = initialize(&settings, &mut env, &mut stderr).unwrap();
        assert!(matches!(activation, Activation::Abort { status: 1 }));
    }

    #[test]
    fn disabled_plugins_skip_the_registry() {
        let dir = tempfile::tempdir().unwrap();
        write_registry(dir.path(), "{not json");
        let (settings, mut env) = settings_for(dir.path(), &[(env::NO_PLUGINS, "1")]);
        let mut stderr = Vec::new();

        let Activation::Ready(runtime) = initialize(&settings, &mut env, &mut stderr).unwrap() else {
            panic!("expected activation");
        };
        assert_eq!(runtime.groups(), &[Group::Default]);
    }
}
