use std::path::PathBuf;

use thiserror::Error;

/// Application-level failures that the top-level boundary knows how to
/// present. Anything else reaching the boundary is re-raised untouched.
#[derive(Debug, Error)]
pub enum VagabondError {
    #[error("{help}")]
    CliInvalidUsage { help: String },

    #[error(
        "The box '{name}' does not exist. Run `vagabond box list` to see the installed boxes."
    )]
    BoxNotFound { name: String },

    #[error("The box '{name}' has no SSH information in its metadata.")]
    BoxSshUnavailable { name: String },

    #[error(
        "A Vagabond environment is required to run this command. No `{file_name}` was found in \
         {} or any parent directory.",
        cwd.display()
    )]
    NoProject { file_name: String, cwd: PathBuf },

    #[error("The home directory {} is not accessible: {source}", path.display())]
    HomeDirectoryNotAccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with status {status}.")]
    SubprocessFailed { program: String, status: i32 },

    #[error("Vagabond was interrupted.")]
    Interrupted,
}

impl VagabondError {
    /// Name used in logs and in the `error-exit` machine record.
    pub fn class_name(&self) -> &'static str {
        match self {
            VagabondError::CliInvalidUsage { .. } => "CliInvalidUsage",
            VagabondError::BoxNotFound { .. } => "BoxNotFound",
            VagabondError::BoxSshUnavailable { .. } => "BoxSshUnavailable",
            VagabondError::NoProject { .. } => "NoProject",
            VagabondError::HomeDirectoryNotAccessible { .. } => "HomeDirectoryNotAccessible",
            VagabondError::SubprocessFailed { .. } => "SubprocessFailed",
            VagabondError::Interrupted => "Interrupted",
        }
    }

    /// Exit status declared by the error; `None` means the generic 255.
    pub fn status_code(&self) -> Option<i32> {
        match self {
            VagabondError::CliInvalidUsage { .. } => Some(1),
            VagabondError::SubprocessFailed { status, .. } => Some(*status),
            VagabondError::Interrupted => Some(130),
            _ => None,
        }
    }
}
