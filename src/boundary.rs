//! Top-level failure boundary.
//!
//! Everything from dependency activation to command dispatch runs inside a
//! [`Session`]. Whatever happens, [`settle`] computes the exit status for
//! recognized domain errors, hands everything else back untouched, and tears
//! the dispatch context down exactly once.

use std::fmt;
use std::io::Write;

use tracing::error;

use crate::environment::Dispatcher;
use crate::error::VagabondError;

/// Status used for domain errors that do not declare their own.
pub const GENERIC_FAILURE_STATUS: i32 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Failure before the domain layer was reached.
    PreInit,
    /// Recognized [`VagabondError`].
    Domain,
    /// Anything else; always re-raised.
    UnknownCrash,
}

/// Classified failure captured at the boundary.
#[derive(Debug)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub class_name: Option<&'static str>,
    pub message: String,
    pub status_code: Option<i32>,
    pub cause: anyhow::Error,
}

impl FailureRecord {
    pub fn classify(cause: anyhow::Error, loaded: bool) -> Self {
        if !loaded {
            return Self::pre_init(cause);
        }

        match cause.downcast_ref::<VagabondError>() {
            Some(domain) => Self {
                kind: FailureKind::Domain,
                class_name: Some(domain.class_name()),
                message: domain.to_string(),
                status_code: domain.status_code(),
                cause,
            },
            None => Self {
                kind: FailureKind::UnknownCrash,
                class_name: None,
                message: cause.to_string(),
                status_code: None,
                cause,
            },
        }
    }

    pub fn pre_init(cause: anyhow::Error) -> Self {
        Self {
            kind: FailureKind::PreInit,
            class_name: None,
            message: cause.to_string(),
            status_code: None,
            cause,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.kind {
            FailureKind::Domain | FailureKind::PreInit => {
                self.status_code.unwrap_or(GENERIC_FAILURE_STATUS)
            }
            FailureKind::UnknownCrash => 1,
        }
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.cause)
    }
}

/// Bootstrap state the boundary needs when something fails.
pub struct Session<C: Dispatcher> {
    context: Option<C>,
    loaded: bool,
}

impl<C: Dispatcher> Session<C> {
    pub fn new() -> Self {
        Self {
            context: None,
            loaded: false,
        }
    }

    /// The domain layer is up; failures from here on can be classified.
    pub fn mark_loaded(&mut self) {
        self.loaded = true;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn attach(&mut self, context: C) -> &mut C {
        self.context.insert(context)
    }

    pub fn context(&mut self) -> Option<&mut C> {
        self.context.as_mut()
    }

    fn release(&mut self) {
        if let Some(mut context) = self.context.take() {
            context.teardown();
        }
    }
}

impl<C: Dispatcher> Default for Session<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Dispatcher> Drop for Session<C> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Turn the guarded body's outcome into an exit status.
///
/// Domain errors are rendered and mapped to a status. Pre-init and unknown
/// failures come back as `Err` for the caller to re-raise.
pub fn settle<C: Dispatcher>(
    outcome: anyhow::Result<i32>,
    mut session: Session<C>,
    stderr: &mut dyn Write,
) -> Result<i32, FailureRecord> {
    let result = match outcome {
        Ok(status) => Ok(status),
        Err(cause) => {
            let record = FailureRecord::classify(cause, session.is_loaded());
            match record.kind {
                FailureKind::Domain => Ok(report_domain(&record, &mut session, stderr)),
                FailureKind::PreInit | FailureKind::UnknownCrash => Err(record),
            }
        }
    };
    session.release();
    result
}

fn report_domain<C: Dispatcher>(
    record: &FailureRecord,
    session: &mut Session<C>,
    stderr: &mut dyn Write,
) -> i32 {
    let class_name = record.class_name.unwrap_or("VagabondError");

    error!("Vagabond experienced an error! Details:");
    error!(class = class_name, "{}", record.message);
    for cause in record.cause.chain().skip(1) {
        error!("caused by: {cause}");
    }

    match session.context() {
        Some(context) => {
            let ui = context.ui();
            ui.error(&record.message);
            ui.machine("error-exit", &[class_name, record.message.as_str()]);
        }
        None => {
            if let Err(err) = writeln!(
                stderr,
                "Vagabond failed to initialize at a very early stage:\n\n{}",
                record.message
            ) {
                error!(error = %err, "could not write the failure report");
            }
        }
    }

    record.exit_code()
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use anyhow::anyhow;

    use super::{FailureKind, Session, settle};
    use crate::environment::Dispatcher;
    use crate::error::VagabondError;
    use crate::ui::testing::{Broken, Capture};
    use crate::ui::{Ui, UiMode};

    struct Probe {
        ui: Ui,
        teardowns: Rc<Cell<usize>>,
    }

    impl Dispatcher for Probe {
        fn ui(&mut self) -> &mut Ui {
            &mut self.ui
        }

        fn run(&mut self, _args: &[String]) -> anyhow::Result<i32> {
            Ok(0)
        }

        fn teardown(&mut self) {
            self.teardowns.set(self.teardowns.get() + 1);
        }
    }

    fn loaded_session(out: &Capture, teardowns: &Rc<Cell<usize>>) -> Session<Probe> {
        let mut session = Session::new();
        session.mark_loaded();
        session.attach(Probe {
            ui: Ui::with_writers(
                UiMode::MachineReadable,
                Box::new(out.clone()),
                Box::new(Capture::default()),
            ),
            teardowns: teardowns.clone(),
        });
        session
    }

    #[test]
    fn success_tears_down_once() {
        let out = Capture::default();
        let teardowns = Rc::new(Cell::new(0));
        let session = loaded_session(&out, &teardowns);

        let status = settle(Ok(0), session, &mut Vec::new()).unwrap();
        assert_eq!(status, 0);
        assert_eq!(teardowns.get(), 1);
    }

    #[test]
    fn domain_error_uses_declared_status_and_emits_one_record() {
        let out = Capture::default();
        let teardowns = Rc::new(Cell::new(0));
        let session = loaded_session(&out, &teardowns);
        let err = VagabondError::SubprocessFailed {
            program: "ssh".to_string(),
            status: 7,
        };

        let status = settle(Err(err.into()), session, &mut Vec::new()).unwrap();
        assert_eq!(status, 7);
        assert_eq!(teardowns.get(), 1);
        let output = out.contents();
        assert_eq!(output.matches(",error-exit,").count(), 1);
        assert!(output.contains(",error-exit,SubprocessFailed,`ssh` exited with status 7."));
    }

    #[test]
    fn domain_error_without_declared_status_exits_255() {
        let out = Capture::default();
        let teardowns = Rc::new(Cell::new(0));
        let session = loaded_session(&out, &teardowns);
        let err = VagabondError::BoxNotFound {
            name: "web".to_string(),
        };

        let status = settle(Err(err.into()), session, &mut Vec::new()).unwrap();
        assert_eq!(status, 255);
    }

    #[test]
    fn unknown_errors_are_reraised_after_teardown() {
        let out = Capture::default();
        let teardowns = Rc::new(Cell::new(0));
        let session = loaded_session(&out, &teardowns);

        let record = settle(Err(anyhow!("disk on fire")), session, &mut Vec::new())
            .expect_err("unknown errors must propagate");
        assert_eq!(record.kind, FailureKind::UnknownCrash);
        assert_eq!(record.cause.to_string(), "disk on fire");
        assert_eq!(teardowns.get(), 1);
        assert!(out.contents().is_empty());
    }

    #[test]
    fn failures_before_loading_are_pre_init() {
        let session: Session<Probe> = Session::new();
        let err = VagabondError::BoxNotFound {
            name: "web".to_string(),
        };

        let record = settle(Err(err.into()), session, &mut Vec::new())
            .expect_err("pre-init failures must propagate");
        assert_eq!(record.kind, FailureKind::PreInit);
        assert_eq!(record.exit_code(), 255);
    }

    #[test]
    fn domain_error_without_context_goes_to_stderr() {
        let mut session: Session<Probe> = Session::new();
        session.mark_loaded();
        let err = VagabondError::BoxNotFound {
            name: "web".to_string(),
        };
        let mut stderr = Vec::new();

        let status = settle(Err(err.into()), session, &mut stderr).unwrap();
        assert_eq!(status, 255);
        let printed = String::from_utf8(stderr).unwrap();
        assert!(printed.contains("very early stage"));
        assert!(printed.contains("'web'"));
    }

    #[test]
    fn unwritable_stderr_keeps_the_exit_status() {
        let mut session: Session<Probe> = Session::new();
        session.mark_loaded();
        let err = VagabondError::BoxNotFound {
            name: "web".to_string(),
        };

        let status = settle(Err(err.into()), session, &mut Broken).unwrap();
        assert_eq!(status, 255);
    }

    #[test]
    fn dropping_a_session_tears_down() {
        let out = Capture::default();
        let teardowns = Rc::new(Cell::new(0));
        drop(loaded_session(&out, &teardowns));
        assert_eq!(teardowns.get(), 1);
    }
}
