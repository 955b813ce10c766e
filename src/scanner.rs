use tracing::debug;

use crate::env::{self, ProcessEnv};

/// True when the version fast path should short-circuit the bootstrap.
pub fn wants_version(native: &[String]) -> bool {
    native.iter().any(|arg| arg == "-v" || arg == "--version")
}

pub fn version_banner() -> String {
    format!("Vagabond {}", env!("CARGO_PKG_VERSION"))
}

/// Project file name that cannot match anything on disk.
pub fn synthetic_project_pin(stamp_millis: i64) -> String {
    format!("plugin_command_{stamp_millis}")
}

/// Inspect the leading subcommand word and pin the environment for
/// meta-commands that must not see project configuration or third-party
/// plugin code. Only the first token decides; a leading flag means no
/// decision at all.
///
/// Returns notices meant for the user's error stream.
pub fn inject_mode_env(native: &[String], env: &mut ProcessEnv, stamp_millis: i64) -> Vec<String> {
    let mut notices = Vec::new();

    let Some(command) = native.first().filter(|arg| !arg.starts_with('-')) else {
        return notices;
    };

    match command.as_str() {
        "login" => notices.push(
            "WARNING: `vagabond login` is deprecated and will be removed in a future release"
                .to_string(),
        ),
        "help" => pin_project(env, stamp_millis),
        "box" if native.get(1).map(String::as_str) == Some("list") => {
            pin_project(env, stamp_millis)
        }
        "plugin" => {
            debug!("plugin command detected, disabling plugin loading");
            env.set(env::NO_PLUGINS, "1");
            pin_project(env, stamp_millis);
        }
        _ => {}
    }

    notices
}

fn pin_project(env: &mut ProcessEnv, stamp_millis: i64) {
    env.set(env::PROJECT_FILE, synthetic_project_pin(stamp_millis));
}
