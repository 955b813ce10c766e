use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, anyhow};
use thiserror::Error;
use tracing::debug;
use which::which;

use crate::env::{self, ProcessEnv};

const DEFAULT_INTERPRETER: &str = "sh";
const PREPARE_SCRIPT: &str = "libexec/vagabond/prepare.sh";

#[derive(Debug, Error)]
pub enum ReexecError {
    #[error("fatal: the runtime re-exec of {} returned control: {source}", program.display())]
    Returned {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Replacement process image that prepares the plugin runtime.
#[derive(Debug, Clone)]
pub struct RuntimeCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: ProcessEnv,
}

impl RuntimeCommand {
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        self.env.apply(&mut command);
        command
    }
}

pub fn runtime_active(env: &ProcessEnv) -> bool {
    env.is_set(env::INTERNAL_BUNDLERIZED)
}

/// Build `<interpreter> <prepare-script> <raw args...>`.
pub fn plan(raw: &[String], env: &ProcessEnv) -> anyhow::Result<RuntimeCommand> {
    let executable = std::env::current_exe().context("resolving the running executable")?;
    let cwd = std::env::current_dir().context("resolving working directory")?;
    let interpreter = resolve_interpreter(env, &cwd)?;
    let script = resolve_prepare_script(env, &executable, &cwd)?;

    let mut child_env = env.clone();
    child_env.set(env::EXECUTABLE, executable.to_string_lossy());

    let mut args = Vec::with_capacity(raw.len() + 1);
    args.push(script.to_string_lossy().into_owned());
    args.extend(raw.iter().cloned());

    debug!(interpreter = %interpreter.display(), script = %script.display(), "runtime not active, re-executing");
    Ok(RuntimeCommand {
        program: interpreter,
        args,
        env: child_env,
    })
}

fn resolve_interpreter(env: &ProcessEnv, cwd: &Path) -> anyhow::Result<PathBuf> {
    if let Some(explicit) = env.get(env::RUNTIME_INTERPRETER).filter(|v| !v.is_empty()) {
        return Ok(resolve_root(Path::new(explicit), cwd));
    }

    which(DEFAULT_INTERPRETER)
        .with_context(|| format!("locating runtime interpreter '{DEFAULT_INTERPRETER}'"))
}

fn resolve_prepare_script(env: &ProcessEnv, executable: &Path, cwd: &Path) -> anyhow::Result<PathBuf> {
    let script = match env.get(env::PREPARE_SCRIPT).filter(|v| !v.is_empty()) {
        Some(explicit) => resolve_root(Path::new(explicit), cwd),
        None => {
            // <prefix>/bin/vagabond -> <prefix>/libexec/vagabond/prepare.sh
            let prefix = executable
                .parent()
                .and_then(Path::parent)
                .ok_or_else(|| anyhow!("cannot derive install prefix from {}", executable.display()))?;
            prefix.join(PREPARE_SCRIPT)
        }
    };

    if !script.is_file() {
        return Err(anyhow!(
            "runtime preparation script not found at {}",
            script.display()
        ));
    }
    Ok(script)
}

fn resolve_root(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// Replace the current process with `command`. Only returns on failure.
#[cfg(unix)]
pub fn replace_process(command: &RuntimeCommand) -> std::io::Error {
    use std::os::unix::process::CommandExt;

    command.to_command().exec()
}

/// Without exec, run the child to completion and exit with its status.
#[cfg(not(unix))]
pub fn replace_process(command: &RuntimeCommand) -> std::io::Error {
    match command.to_command().status() {
        Ok(status) => std::process::exit(status.code().unwrap_or(1)),
        Err(err) => err,
    }
}
