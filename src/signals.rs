//! Interrupt handling.
//!
//! A single Ctrl-C handler is registered at process start. Until dispatch
//! begins it terminates the process on the spot; afterwards it only records
//! the interrupt so commands can stop at a safe point.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

static GRACEFUL: AtomicBool = AtomicBool::new(false);
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Exit status used when an early interrupt aborts startup.
pub const EARLY_INTERRUPT_STATUS: i32 = 1;

pub fn trap_early_interrupts() {
    trap_early_interrupts_into(&mut io::stderr());
}

/// Install the handler, reporting a failure on `stderr`; logging is not
/// initialized this early.
fn trap_early_interrupts_into(stderr: &mut dyn Write) {
    if let Err(err) = ctrlc::set_handler(on_interrupt) {
        let _ = writeln!(stderr, "vagabond: could not install interrupt handler: {err}");
    }
}

fn on_interrupt() {
    if !record_interrupt(&GRACEFUL, &INTERRUPTED) {
        std::process::exit(EARLY_INTERRUPT_STATUS);
    }
}

/// Returns false when the process should terminate immediately.
fn record_interrupt(graceful: &AtomicBool, interrupted: &AtomicBool) -> bool {
    if !graceful.load(Ordering::SeqCst) {
        return false;
    }
    interrupted.store(true, Ordering::SeqCst);
    true
}

pub fn install_graceful() {
    GRACEFUL.store(true, Ordering::SeqCst);
}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}
