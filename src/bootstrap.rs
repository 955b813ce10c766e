//! Process bootstrap.
//!
//! Turns the raw invocation into a dispatched command:
//! split arguments, version fast path, mode-sensitive environment pins,
//! runtime re-exec, dependency activation, UI selection, dispatch. Every
//! failure after the re-exec guard is settled by [`crate::boundary`].

use std::ffi::OsString;
use std::io::{self, Write};

use anyhow::{Context, anyhow};
use tracing::{debug, info};

use crate::args::{SplitArguments, split_arguments, take_flag};
use crate::boundary::{FailureRecord, Session, settle};
use crate::config::{Experimental, Settings};
use crate::deps::{self, Activation};
use crate::env::{self, ProcessEnv};
use crate::environment::{BootstrapOptions, Dispatcher, Environment};
use crate::logging;
use crate::platform::{TerminalProbe, probe_terminal};
use crate::reexec::{self, ReexecError, RuntimeCommand};
use crate::scanner;
use crate::ui::{self, Unbuffered};

/// Raw process input.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub args: Vec<OsString>,
    pub env: ProcessEnv,
}

impl Invocation {
    pub fn from_process() -> Self {
        Self {
            args: std::env::args_os().skip(1).collect(),
            env: ProcessEnv::from_process(),
        }
    }
}

/// Process-level side effects the bootstrap depends on.
pub trait Host {
    type Context: Dispatcher;

    fn stdout(&mut self) -> &mut dyn Write;
    fn stderr(&mut self) -> &mut dyn Write;
    fn terminal(&self, env: &ProcessEnv) -> TerminalProbe;
    /// Replace the process image. Returning at all is a failure.
    fn replace_process(&mut self, command: &RuntimeCommand) -> io::Error;
    fn create_context(
        &mut self,
        options: BootstrapOptions,
        settings: Settings,
    ) -> anyhow::Result<Self::Context>;
}

/// The real process: unbuffered std streams, exec, [`Environment`].
pub struct SystemHost {
    stdout: Unbuffered<io::Stdout>,
    stderr: Unbuffered<io::Stderr>,
}

impl SystemHost {
    pub fn new() -> Self {
        Self {
            stdout: Unbuffered::new(io::stdout()),
            stderr: Unbuffered::new(io::stderr()),
        }
    }
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for SystemHost {
    type Context = Environment;

    fn stdout(&mut self) -> &mut dyn Write {
        &mut self.stdout
    }

    fn stderr(&mut self) -> &mut dyn Write {
        &mut self.stderr
    }

    fn terminal(&self, env: &ProcessEnv) -> TerminalProbe {
        probe_terminal(env)
    }

    fn replace_process(&mut self, command: &RuntimeCommand) -> io::Error {
        reexec::replace_process(command)
    }

    fn create_context(
        &mut self,
        options: BootstrapOptions,
        settings: Settings,
    ) -> anyhow::Result<Environment> {
        Ok(Environment::new(options, settings)?)
    }
}

/// Run the whole bootstrap and return the process exit status.
///
/// `Err` carries failures the boundary does not format: anything before the
/// domain layer is up, and errors it does not recognize.
pub fn run<H: Host>(invocation: Invocation, host: &mut H) -> Result<i32, FailureRecord> {
    let Invocation { args, mut env } = invocation;
    let raw = unicode_arguments(args).map_err(FailureRecord::pre_init)?;
    let mut split = split_arguments(&raw);

    if scanner::wants_version(&split.native) {
        writeln!(host.stdout(), "{}", scanner::version_banner())
            .map_err(|err| FailureRecord::pre_init(err.into()))?;
        return Ok(0);
    }

    let stamp = chrono::Utc::now().timestamp_millis();
    for notice in scanner::inject_mode_env(&split.native, &mut env, stamp) {
        writeln!(host.stderr(), "{notice}").map_err(|err| FailureRecord::pre_init(err.into()))?;
    }

    if !reexec::runtime_active(&env) {
        let command = reexec::plan(&raw, &env).map_err(FailureRecord::pre_init)?;
        let source = host.replace_process(&command);
        return Err(FailureRecord::pre_init(
            ReexecError::Returned {
                program: command.program,
                source,
            }
            .into(),
        ));
    }

    if take_flag(&mut split.native, "--debug") {
        env.set(env::LOG, "debug");
    }
    logging::init(&env);
    info!(args = ?raw, "vagabond invoked");

    let settings = Settings::from_env(&env)
        .context("resolving vagabond settings")
        .map_err(FailureRecord::pre_init)?;

    let mut session = Session::new();
    let outcome = activate_and_dispatch(&mut session, host, &mut env, settings, split);
    settle(outcome, session, host.stderr())
}

fn unicode_arguments(args: Vec<OsString>) -> anyhow::Result<Vec<String>> {
    args.into_iter()
        .map(|arg| {
            arg.into_string().map_err(|raw| {
                anyhow!(
                    "command line argument {} is not valid unicode",
                    raw.to_string_lossy()
                )
            })
        })
        .collect()
}

fn activate_and_dispatch<H: Host>(
    session: &mut Session<H::Context>,
    host: &mut H,
    env: &mut ProcessEnv,
    settings: Settings,
    split: SplitArguments,
) -> anyhow::Result<i32> {
    let runtime = match deps::initialize(&settings, env, host.stderr())? {
        Activation::Ready(runtime) => runtime,
        Activation::Abort { status } => return Ok(status),
    };
    session.mark_loaded();

    let SplitArguments {
        mut native,
        passthrough,
    } = split;
    let probe = host.terminal(env);
    let options = BootstrapOptions {
        ui_mode: ui::select_mode(&mut native, env, &probe),
        plugins: runtime.plugins().to_vec(),
        env: env.clone(),
    };

    let advisories = advisories(&settings);
    debug!(ui_mode = %options.ui_mode, plugins = ?options.plugins, "creating environment");
    let context = session.attach(host.create_context(options, settings)?);
    for advisory in advisories {
        context.ui().warn(&advisory);
    }

    let args = SplitArguments {
        native,
        passthrough,
    }
    .into_dispatch_args();
    context.run(&args)
}

fn advisories(settings: &Settings) -> Vec<String> {
    let mut notes = Vec::new();

    if !settings.in_installer && !settings.very_quiet {
        notes.push(
            "You appear to be running Vagabond outside of the official installers.\n\
             Some features may behave differently. Set VAGABOND_INSTALLER_ENV or\n\
             VAGABOND_I_KNOW_WHAT_IM_DOING_PLEASE_BE_QUIET to silence this warning.\n"
                .to_string(),
        );
    }

    match &settings.experimental {
        Experimental::Disabled => {}
        Experimental::All => notes.push(
            "You have enabled all experimental features. They may be unstable or change \
             without notice."
                .to_string(),
        ),
        Experimental::Features(features) => notes.push(format!(
            "You have requested experimental features: {}. They may be unstable or change \
             without notice.",
            features.join(", ")
        )),
    }

    notes
}
