pub mod args;
pub mod boundary;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod deps;
pub mod env;
pub mod environment;
pub mod error;
pub mod logging;
pub mod platform;
pub mod reexec;
pub mod registry;
pub mod scanner;
pub mod signals;
pub mod ui;
pub mod version;

use bootstrap::{Invocation, SystemHost};

/// Run the command line interface and return an exit code.
pub fn run_cli() -> i32 {
    let mut host = SystemHost::new();
    match bootstrap::run(Invocation::from_process(), &mut host) {
        Ok(code) => code,
        Err(failure) => {
            eprintln!("{failure}");
            failure.exit_code()
        }
    }
}
