use std::io::IsTerminal;

use sysinfo::System;

use crate::env::ProcessEnv;

/// Facts about the attached terminal, gathered once before the UI is picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalProbe {
    pub stdout_tty: bool,
    pub supports_color: bool,
    /// Cygwin/MSYS report pipes where a real terminal is attached.
    pub cygwin: bool,
}

pub fn probe_terminal(env: &ProcessEnv) -> TerminalProbe {
    let os = std::env::consts::OS;
    TerminalProbe {
        stdout_tty: std::io::stdout().is_terminal(),
        supports_color: terminal_supports_colors(os, env, windows_major_version),
        cygwin: is_cygwin(os, env),
    }
}

fn windows_major_version() -> Option<u64> {
    System::os_version()
        .and_then(|version| version.split('.').next().map(str::to_string))
        .and_then(|major| major.trim().parse().ok())
}

fn terminal_supports_colors(
    os: &str,
    env: &ProcessEnv,
    windows_major: impl Fn() -> Option<u64>,
) -> bool {
    if env.get("TERM") == Some("dumb") {
        return false;
    }

    if os != "windows" {
        return true;
    }

    env.is_set("ANSICON")
        || env.get("ConEmuANSI") == Some("ON")
        || env.get("TERM") == Some("cygwin")
        || env.is_set("WT_SESSION")
        || is_cygwin(os, env)
        || windows_major().is_some_and(|major| major >= 10)
}

fn is_cygwin(os: &str, env: &ProcessEnv) -> bool {
    if os == "cygwin" {
        return true;
    }
    env.get("OSTYPE")
        .is_some_and(|ostype| ostype.to_lowercase().contains("cygwin"))
        || env.is_set("MSYSTEM")
}
