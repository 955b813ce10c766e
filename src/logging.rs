use tracing_subscriber::EnvFilter;

use crate::env::{self, ProcessEnv};

/// Install the log subscriber for `VAGABOND_LOG`. Without the variable the
/// tool stays silent apart from its UI.
pub fn init(env: &ProcessEnv) {
    let Some(level) = env.get(env::LOG).map(str::trim).filter(|v| !v.is_empty()) else {
        return;
    };

    let filter = EnvFilter::try_new(format!("vagabond={}", normalize_level(level)))
        .unwrap_or_else(|_| EnvFilter::new("vagabond=warn"));

    // A subscriber may already be installed (tests, embedding).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

fn normalize_level(raw: &str) -> &'static str {
    match raw.to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "error" | "fatal" => "error",
        _ => "warn",
    }
}
