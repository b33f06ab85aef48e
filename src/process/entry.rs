use enum_dispatch::enum_dispatch;
use nix::{
    sys::signal::{signal, SigHandler, Signal},
    unistd::execvp,
};

use super::{report::ReportWriter, status::EXEC_FAILED_STATUS, tee::TeeStage};
use crate::{cmd::Command, prelude::*};

/// What a forked role does once its descriptors are wired.
#[enum_dispatch(RoleEntries)]
pub trait RoleEntry {
    fn role(&self) -> ProcessRole;

    /// Runs in the child. Returns the status to exit with; entries that
    /// replace the process image only return when that fails.
    fn enter(&self, report: &mut ReportWriter) -> i32;
}

#[enum_dispatch]
#[derive(Debug)]
pub enum RoleEntries {
    Exec(ExecEntry),
    Tee(TeeStage),
}

/// Replaces the child's image with a command.
#[derive(Debug, Clone)]
pub struct ExecEntry {
    role: ProcessRole,
    command: Command,
}

impl ExecEntry {
    pub fn new(role: ProcessRole, command: Command) -> Self {
        Self { role, command }
    }
}

impl RoleEntry for ExecEntry {
    fn role(&self) -> ProcessRole {
        self.role
    }

    fn enter(&self, report: &mut ReportWriter) -> i32 {
        let argv = match self.command.to_argv() {
            Ok(argv) if !argv.is_empty() => argv,
            _ => {
                report.send(Report::LaunchFailed {
                    role: self.role,
                    errno: Errno::EINVAL,
                });
                return EXEC_FAILED_STATUS;
            }
        };

        // the parent ignores SIGPIPE; programs we run expect the default
        // SAFETY: restoring the default disposition installs no handler.
        if let Err(errno) = unsafe { signal(Signal::SIGPIPE, SigHandler::SigDfl) } {
            debug!(role = %self.role, %errno, "failed to reset SIGPIPE");
        }

        trace!(role = %self.role, command = %self.command, "replacing image");

        let errno = match execvp(&argv[0], &argv) {
            Ok(never) => match never {},
            Err(errno) => errno,
        };

        debug!(role = %self.role, executable = self.command.executable(), %errno, "exec failed");
        report.send(Report::LaunchFailed {
            role: self.role,
            errno,
        });

        EXEC_FAILED_STATUS
    }
}
