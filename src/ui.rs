use std::fmt;
use std::io::{self, Write};

use tracing::{debug, info, warn};

use crate::args::take_flag;
use crate::env::{self, ProcessEnv};
use crate::platform::TerminalProbe;

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

const MACHINE_COMMA: &str = "%!(VAGABOND_COMMA)";

/// Output strategy handed to the dispatch context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiMode {
    Colored,
    Basic,
    MachineReadable,
}

impl fmt::Display for UiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UiMode::Colored => "colored",
            UiMode::Basic => "basic",
            UiMode::MachineReadable => "machine-readable",
        })
    }
}

/// Pick the UI mode and consume the flags that influenced it.
///
/// Later rules override earlier ones; `--machine-readable` always wins.
pub fn select_mode(native: &mut Vec<String>, env: &ProcessEnv, probe: &TerminalProbe) -> UiMode {
    let mut mode = UiMode::Colored;

    if !probe.supports_color {
        mode = UiMode::Basic;
    }

    if !probe.stdout_tty && !probe.cygwin {
        mode = UiMode::Basic;
    }

    let no_color = take_flag(native, "--no-color");
    if no_color || env.is_set(env::NO_COLOR) {
        mode = UiMode::Basic;
    }

    let color = take_flag(native, "--color");
    let force_color = take_flag(native, "--force-color");
    if color || force_color || env.is_set(env::FORCE_COLOR) {
        mode = UiMode::Colored;
    }

    if take_flag(native, "--machine-readable") {
        mode = UiMode::MachineReadable;
    }

    debug!(%mode, ?probe, "selected ui");
    mode
}

/// Writer that flushes after every write so interleaved streams keep order.
pub struct Unbuffered<W: Write>(W);

impl<W: Write> Unbuffered<W> {
    pub fn new(inner: W) -> Self {
        Self(inner)
    }
}

impl<W: Write> Write for Unbuffered<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.0.write(buf)?;
        self.0.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

/// Renders messages for the selected [`UiMode`].
pub struct Ui {
    mode: UiMode,
    out: Box<dyn Write + Send>,
    err: Box<dyn Write + Send>,
}

impl Ui {
    pub fn new(mode: UiMode) -> Self {
        Self::with_writers(
            mode,
            Box::new(Unbuffered::new(io::stdout())),
            Box::new(Unbuffered::new(io::stderr())),
        )
    }

    pub fn with_writers(mode: UiMode, out: Box<dyn Write + Send>, err: Box<dyn Write + Send>) -> Self {
        Self { mode, out, err }
    }

    pub fn mode(&self) -> UiMode {
        self.mode
    }

    pub fn info(&mut self, message: &str) {
        self.say("info", message, None, false);
    }

    pub fn success(&mut self, message: &str) {
        self.say("success", message, Some(GREEN), false);
    }

    pub fn warn(&mut self, message: &str) {
        self.say("warn", message, Some(YELLOW), true);
    }

    pub fn error(&mut self, message: &str) {
        self.say("error", message, Some(RED), true);
    }

    /// Emit a machine record with no target.
    pub fn machine(&mut self, kind: &str, data: &[&str]) {
        self.machine_for("", kind, data);
    }

    /// Emit a machine record. Outside machine-readable mode the record only
    /// reaches the log.
    pub fn machine_for(&mut self, target: &str, kind: &str, data: &[&str]) {
        if self.mode != UiMode::MachineReadable {
            info!(record_target = target, kind, data = ?data, "machine record");
            return;
        }

        let line = machine_line(chrono::Utc::now().timestamp(), target, kind, data);
        report_write(writeln!(self.out, "{line}"));
    }

    fn say(&mut self, level: &str, message: &str, color: Option<&str>, to_err: bool) {
        match self.mode {
            UiMode::MachineReadable => self.machine("ui", &[level, message]),
            UiMode::Basic => {
                let stream = if to_err { &mut self.err } else { &mut self.out };
                report_write(writeln!(stream, "{message}"));
            }
            UiMode::Colored => {
                let stream = if to_err { &mut self.err } else { &mut self.out };
                report_write(match color {
                    Some(color) => writeln!(stream, "{BOLD}{color}{message}{RESET}"),
                    None => writeln!(stream, "{message}"),
                });
            }
        }
    }
}

/// A closed terminal must not abort the command; the failure goes to the log.
fn report_write(result: io::Result<()>) {
    if let Err(err) = result {
        warn!(error = %err, "could not write ui output");
    }
}

fn machine_line(timestamp: i64, target: &str, kind: &str, data: &[&str]) -> String {
    let mut fields = vec![timestamp.to_string(), target.to_string(), kind.to_string()];
    fields.extend(
        data.iter()
            .map(|d| d.replace(',', MACHINE_COMMA).replace('\n', "\\n").replace('\r', "\\r")),
    );
    fields.join(",")
}


#[cfg(test)]
mod tests {
    use super::testing::{Broken, Capture};
    use super::{Ui, UiMode, machine_line, select_mode};
    use crate::env::{self, ProcessEnv};
    use crate::platform::TerminalProbe;

    const TTY: TerminalProbe = TerminalProbe {
        stdout_tty: true,
        supports_color: true,
        cygwin: false,
    };

    fn argv(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn colored_by_default_on_a_capable_tty() {
        let mut args = argv(&["status"]);
        assert_eq!(select_mode(&mut args, &ProcessEnv::new(), &TTY), UiMode::Colored);
    }

    #[test]
    fn pipes_fall_back_to_basic_unless_cygwin() {
        let piped = TerminalProbe {
            stdout_tty: false,
            ..TTY
        };
        let mut args = argv(&["status"]);
        assert_eq!(select_mode(&mut args, &ProcessEnv::new(), &piped), UiMode::Basic);

        let cygwin = TerminalProbe {
            cygwin: true,
            ..piped
        };
        assert_eq!(select_mode(&mut args, &ProcessEnv::new(), &cygwin), UiMode::Colored);
    }

    #[test]
    fn no_color_flag_is_consumed() {
        let mut args = argv(&["status", "--no-color"]);
        assert_eq!(select_mode(&mut args, &ProcessEnv::new(), &TTY), UiMode::Basic);
        assert_eq!(args, argv(&["status"]));
    }

    #[test]
    fn no_color_env_selects_basic() {
        let env: ProcessEnv = [(env::NO_COLOR, "1")].into_iter().collect();
        let mut args = argv(&["status"]);
        assert_eq!(select_mode(&mut args, &env, &TTY), UiMode::Basic);
    }

    #[test]
    fn force_color_beats_no_color() {
        let mut args = argv(&["--no-color", "status", "--force-color"]);
        assert_eq!(select_mode(&mut args, &ProcessEnv::new(), &TTY), UiMode::Colored);
        assert_eq!(args, argv(&["status"]));

        let no_caps = TerminalProbe {
            stdout_tty: false,
            supports_color: false,
            cygwin: false,
        };
        let env: ProcessEnv = [(env::FORCE_COLOR, "1")].into_iter().collect();
        assert_eq!(select_mode(&mut argv(&["status"]), &env, &no_caps), UiMode::Colored);
    }

    #[test]
    fn machine_readable_overrides_everything() {
        let mut args = argv(&["--color", "box", "list", "--machine-readable", "--no-color"]);
        assert_eq!(
            select_mode(&mut args, &ProcessEnv::new(), &TTY),
            UiMode::MachineReadable
        );
        assert_eq!(args, argv(&["box", "list"]));
    }

    #[test]
    fn machine_line_escapes_commas_and_newlines() {
        assert_eq!(
            machine_line(1700000000, "", "error-exit", &["BoxNotFound", "a, b\nc"]),
            "1700000000,,error-exit,BoxNotFound,a%!(VAGABOND_COMMA) b\\nc"
        );
    }

    #[test]
    fn machine_mode_wraps_plain_messages() {
        let out = Capture::default();
        let mut ui = Ui::with_writers(
            UiMode::MachineReadable,
            Box::new(out.clone()),
            Box::new(Capture::default()),
        );
        ui.warn("careful");
        assert!(out.contents().ends_with(",,ui,warn,careful\n"));
    }

    #[test]
    fn basic_mode_routes_errors_to_stderr_without_escapes() {
        let out = Capture::default();
        let err = Capture::default();
        let mut ui = Ui::with_writers(UiMode::Basic, Box::new(out.clone()), Box::new(err.clone()));
        ui.info("hello");
        ui.error("boom");
        ui.machine("error-exit", &["X", "boom"]);
        assert_eq!(out.contents(), "hello\n");
        assert_eq!(err.contents(), "boom\n");
    }

    #[test]
    fn closed_streams_do_not_abort_rendering() {
        let mut ui = Ui::with_writers(UiMode::Colored, Box::new(Broken), Box::new(Broken));
        ui.info("hello");
        ui.error("boom");
        assert_eq!(ui.mode(), UiMode::Colored);

        let mut machine = Ui::with_writers(UiMode::MachineReadable, Box::new(Broken), Box::new(Broken));
        machine.machine("error-exit", &["X", "boom"]);
    }
}
