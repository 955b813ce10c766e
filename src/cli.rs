use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::Command;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use which::which;

use crate::boundary::GENERIC_FAILURE_STATUS;
use crate::environment::{Dispatcher, Environment};
use crate::error::VagabondError;
use crate::registry::load_registry;
use crate::signals;

#[derive(Debug, Parser)]
#[command(
    name = "vagabond",
    about = "Manage development machines and their plugins",
    disable_version_flag = true
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Manage installed boxes
    #[command(name = "box")]
    Boxes {
        #[command(subcommand)]
        command: BoxCommand,
    },
    /// Manage plugins
    Plugin {
        #[command(subcommand)]
        command: PluginCommand,
    },
    /// Show which project file this directory belongs to
    Status,
    /// Connect to a box over SSH; arguments after `--` go to ssh
    Ssh {
        name: String,
        #[arg(last = true)]
        extra: Vec<String>,
    },
    /// Print the installed version
    Version,
}

#[derive(Debug, Subcommand)]
enum BoxCommand {
    /// List installed boxes
    List,
    /// Remove an installed box
    Remove { name: String },
}

#[derive(Debug, Subcommand)]
enum PluginCommand {
    /// List installed plugins
    List,
}

#[derive(Debug, Deserialize)]
struct BoxMetadata {
    ssh: Option<SshInfo>,
}

#[derive(Debug, Deserialize)]
struct SshInfo {
    host: String,
    #[serde(default = "default_ssh_port")]
    port: u16,
    #[serde(default = "default_ssh_user")]
    user: String,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_ssh_user() -> String {
    "vagabond".to_string()
}

/// Parse `args` and run the matching command against `env`.
pub fn dispatch(env: &mut Environment, args: &[String]) -> anyhow::Result<i32> {
    let argv = std::iter::once("vagabond".to_string()).chain(args.iter().cloned());
    let cli = match Cli::try_parse_from(argv) {
        Ok(cli) => cli,
        Err(err) => {
            let rendered = err.to_string();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    env.ui().info(rendered.trim_end());
                    Ok(0)
                }
                ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                    env.ui().info(rendered.trim_end());
                    Ok(1)
                }
                _ => Err(VagabondError::CliInvalidUsage {
                    help: rendered.trim_end().to_string(),
                }
                .into()),
            };
        }
    };

    match cli.command {
        Commands::Boxes { command } => match command {
            BoxCommand::List => box_list(env),
            BoxCommand::Remove { name } => box_remove(env, &name),
        },
        Commands::Plugin { command } => match command {
            PluginCommand::List => plugin_list(env),
        },
        Commands::Status => status(env),
        Commands::Ssh { name, extra } => ssh(env, &name, &extra),
        Commands::Version => {
            let line = format!("Installed Version: {}", env!("CARGO_PKG_VERSION"));
            env.ui().info(&line);
            env.ui().machine("version-installed", &[env!("CARGO_PKG_VERSION")]);
            Ok(0)
        }
    }
}

fn box_list(env: &mut Environment) -> anyhow::Result<i32> {
    let boxes_dir = env.settings().boxes_dir();
    let mut names = Vec::new();
    for entry in fs::read_dir(&boxes_dir)
        .with_context(|| format!("listing boxes in {}", boxes_dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();

    if names.is_empty() {
        env.ui().info("There are no installed boxes!");
        return Ok(0);
    }

    for name in &names {
        env.ui().info(name);
        env.ui().machine_for(name, "box-name", &[name.as_str()]);
    }
    Ok(0)
}

fn box_remove(env: &mut Environment, name: &str) -> anyhow::Result<i32> {
    let path = box_path(env, name)?;
    if signals::interrupted() {
        return Err(VagabondError::Interrupted.into());
    }

    fs::remove_dir_all(&path).with_context(|| format!("removing box at {}", path.display()))?;
    env.ui().success(&format!("Removed box '{name}'."));
    Ok(0)
}

fn plugin_list(env: &mut Environment) -> anyhow::Result<i32> {
    let registry = load_registry(&env.settings().plugins_file())?;
    if registry.installed.is_empty() {
        env.ui().info("No plugins installed.");
        return Ok(0);
    }

    for (name, entry) in registry.installed.iter() {
        let line = if env.plugins().contains(name) {
            format!("{name} ({}, global)", entry.version)
        } else {
            format!("{name} ({}, global, not loaded)", entry.version)
        };
        env.ui().info(&line);
        env.ui().machine_for(name, "plugin-name", &[name.as_str()]);
        env.ui().machine_for(name, "plugin-version", &[entry.version.as_str()]);
    }
    Ok(0)
}

fn status(env: &mut Environment) -> anyhow::Result<i32> {
    let Some(project) = env.project_file().map(Path::to_path_buf) else {
        return Err(VagabondError::NoProject {
            file_name: env.settings().project_file_name.clone(),
            cwd: env.settings().cwd.clone(),
        }
        .into());
    };

    let shown = project.display().to_string();
    env.ui().info(&format!("Project: {shown}"));
    env.ui().machine("project-file", &[shown.as_str()]);
    Ok(0)
}

fn ssh(env: &mut Environment, name: &str, extra: &[String]) -> anyhow::Result<i32> {
    let metadata_path = box_path(env, name)?.join("metadata.json");
    let metadata: BoxMetadata = match fs::read_to_string(&metadata_path) {
        Ok(data) => serde_json::from_str(&data)
            .with_context(|| format!("parsing box metadata at {}", metadata_path.display()))?,
        Err(_) => BoxMetadata { ssh: None },
    };
    let Some(info) = metadata.ssh else {
        return Err(VagabondError::BoxSshUnavailable {
            name: name.to_string(),
        }
        .into());
    };

    let program = which("ssh").context("locating the ssh client")?;
    let status = ssh_command(env, &program, &info, extra)
        .status()
        .with_context(|| format!("running {}", program.display()))?;

    if !status.success() {
        return Err(VagabondError::SubprocessFailed {
            program: "ssh".to_string(),
            status: status.code().unwrap_or(GENERIC_FAILURE_STATUS),
        }
        .into());
    }
    Ok(0)
}

fn ssh_command(env: &Environment, program: &Path, info: &SshInfo, extra: &[String]) -> Command {
    let mut command = Command::new(program);
    command
        .arg("-p")
        .arg(info.port.to_string())
        .arg(format!("{}@{}", info.user, info.host))
        .args(extra);
    env.process_env().apply(&mut command);
    command
}

/// Installed box directory for `name`; names must be a single path segment.
fn box_path(env: &Environment, name: &str) -> Result<PathBuf, VagabondError> {
    let not_found = || VagabondError::BoxNotFound {
        name: name.to_string(),
    };

    let mut components = Path::new(name).components();
    if !matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) {
        return Err(not_found());
    }

    let path = env.settings().boxes_dir().join(name);
    if !path.is_dir() {
        return Err(not_found());
    }
    Ok(path)
}
