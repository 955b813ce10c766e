use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::cli;
use crate::config::Settings;
use crate::env::ProcessEnv;
use crate::error::VagabondError;
use crate::signals;
use crate::ui::{Ui, UiMode};

/// Options gathered during bootstrap, consumed by the dispatch context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOptions {
    pub ui_mode: UiMode,
    pub plugins: Vec<String>,
    /// Environment prepared by the bootstrap, overlaid on child processes.
    pub env: ProcessEnv,
}

/// The command layer as seen from the bootstrap.
///
/// `teardown` must be idempotent; the bootstrap calls it exactly once on
/// every exit path.
pub trait Dispatcher {
    fn ui(&mut self) -> &mut Ui;
    fn run(&mut self, args: &[String]) -> anyhow::Result<i32>;
    fn teardown(&mut self);
}

/// Dispatch context rooted in the tool home and the current project.
pub struct Environment {
    ui: Ui,
    settings: Settings,
    plugins: Vec<String>,
    process_env: ProcessEnv,
    project_file: Option<PathBuf>,
    loaded: bool,
}

impl Environment {
    pub fn new(options: BootstrapOptions, settings: Settings) -> Result<Self, VagabondError> {
        Ok(Self::with_ui(Ui::new(options.ui_mode), options.plugins, settings)?
            .with_process_env(options.env))
    }

    pub fn with_ui(ui: Ui, plugins: Vec<String>, settings: Settings) -> Result<Self, VagabondError> {
        for dir in [settings.home.clone(), settings.boxes_dir()] {
            fs::create_dir_all(&dir).map_err(|source| {
                VagabondError::HomeDirectoryNotAccessible {
                    path: dir.clone(),
                    source,
                }
            })?;
        }

        let project_file = find_project_file(&settings.cwd, &settings.project_file_name);
        debug!(project_file = ?project_file, plugins = ?plugins, "environment created");

        Ok(Self {
            ui,
            settings,
            plugins,
            process_env: ProcessEnv::new(),
            project_file,
            loaded: true,
        })
    }

    pub fn with_process_env(mut self, process_env: ProcessEnv) -> Self {
        self.process_env = process_env;
        self
    }

    pub fn process_env(&self) -> &ProcessEnv {
        &self.process_env
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn plugins(&self) -> &[String] {
        &self.plugins
    }

    pub fn project_file(&self) -> Option<&Path> {
        self.project_file.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

impl Dispatcher for Environment {
    fn ui(&mut self) -> &mut Ui {
        &mut self.ui
    }

    fn run(&mut self, args: &[String]) -> anyhow::Result<i32> {
        signals::install_graceful();
        cli::dispatch(self, args)
    }

    fn teardown(&mut self) {
        if !self.loaded {
            return;
        }
        self.loaded = false;
        info!("environment unloaded");
    }
}

fn find_project_file(start: &Path, file_name: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(file_name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::{Dispatcher, Environment};
    use crate::config::Settings;
    use crate::env::{self, ProcessEnv};
    use crate::ui::testing::Capture;
    use crate::ui::{Ui, UiMode};

    fn settings(home: &std::path::Path, cwd: &std::path::Path, project: Option<&str>) -> Settings {
        let mut env = ProcessEnv::new();
        env.set(env::HOME, home.to_string_lossy());
        env.set(env::CWD, cwd.to_string_lossy());
        if let Some(project) = project {
            env.set(env::PROJECT_FILE, project);
        }
        Settings::from_env(&env).unwrap()
    }

    fn quiet_ui() -> Ui {
        Ui::with_writers(UiMode::Basic, Box::new(Capture::default()), Box::new(Capture::default()))
    }

    #[test]
    fn creates_home_layout() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home");
        Environment::with_ui(quiet_ui(), Vec::new(), settings(&home, dir.path(), None)).unwrap();
        assert!(home.join("boxes").is_dir());
    }

    #[test]
    fn finds_project_file_in_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("Vagabondfile"), "").unwrap();

        let environment =
            Environment::with_ui(quiet_ui(), Vec::new(), settings(dir.path(), &nested, None)).unwrap();
        assert_eq!(environment.project_file(), Some(dir.path().join("Vagabondfile").as_path()));
    }

    #[test]
    fn pinned_project_name_hides_ambient_project() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Vagabondfile"), "").unwrap();

        let environment = Environment::with_ui(
            quiet_ui(),
            Vec::new(),
            settings(dir.path(), dir.path(), Some("plugin_command_1")),
        )
        .unwrap();
        assert!(environment.project_file().is_none());
    }

    #[test]
    fn teardown_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut environment =
            Environment::with_ui(quiet_ui(), Vec::new(), settings(dir.path(), dir.path(), None))
                .unwrap();
        environment.teardown();
        environment.teardown();
        assert!(!environment.is_loaded());
    }

    #[test]
    fn unusable_home_is_a_domain_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();

        let err = Environment::with_ui(quiet_ui(), Vec::new(), settings(&blocker, dir.path(), None))
            .err()
            .expect("home under a file must fail");
        assert_eq!(err.class_name(), "HomeDirectoryNotAccessible");
    }
}
