/// Token separating tool-native arguments from pass-through arguments.
pub const SENTINEL: &str = "--";

/// Arguments split on the first `--` sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitArguments {
    pub native: Vec<String>,
    pub passthrough: Vec<String>,
}

impl SplitArguments {
    /// Rebuild the sequence handed to the command layer. The sentinel is
    /// only emitted when there is something behind it.
    pub fn into_dispatch_args(self) -> Vec<String> {
        let SplitArguments {
            mut native,
            passthrough,
        } = self;
        if !passthrough.is_empty() {
            native.push(SENTINEL.to_string());
            native.extend(passthrough);
        }
        native
    }
}

pub fn split_arguments(raw: &[String]) -> SplitArguments {
    match raw.iter().position(|arg| arg == SENTINEL) {
        Some(idx) => SplitArguments {
            native: raw[..idx].to_vec(),
            passthrough: raw[idx + 1..].to_vec(),
        },
        None => SplitArguments {
            native: raw.to_vec(),
            passthrough: Vec::new(),
        },
    }
}

/// Remove every occurrence of `flag`, reporting whether it was present.
pub fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    let before = args.len();
    args.retain(|arg| arg != flag);
    args.len() != before
}
