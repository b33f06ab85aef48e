use std::panic::{self, AssertUnwindSafe};

use nix::unistd::{fork, ForkResult};

use super::{
    entry::{RoleEntries, RoleEntry},
    fd::{close, syscall, FdPlan, Pipe},
    report::{ReportReader, ReportWriter},
    status::{EXEC_FAILED_STATUS, PANIC_STATUS},
    ProcessHandle,
};
use crate::prelude::*;

/// Forks a child that applies `plan` and then runs `entry`.
///
/// The child never returns into the caller: it either replaces its image or
/// exits with the status `entry` produced. Failures after the fork surface
/// through the child's reports and its wait status.
pub fn spawn(plan: &FdPlan, entry: RoleEntries) -> nix::Result<ProcessHandle> {
    debug_assert_eq!(plan.role, entry.role());

    let report = Pipe::new()?;

    // SAFETY: every caller is single threaded, so the child only touches state
    // it owns until it execs or exits.
    match syscall(|| unsafe { fork() })? {
        ForkResult::Parent { child, .. } => {
            let ends = report.into_ends();
            let _ = close(ends.write);

            debug!(role = %plan.role, pid = %child, "spawned role");

            Ok(ProcessHandle::new(
                plan.role,
                child,
                ReportReader::new(ends.read),
            ))
        }
        ForkResult::Child => {
            let ends = report.into_ends();
            let _ = close(ends.read);

            let mut writer = ReportWriter::new(ends.write);
            let code = enter(plan, &entry, &mut writer);

            // SAFETY: _exit skips atexit handlers and stdio flushing, which
            // belong to the parent's copy of this address space.
            unsafe { nix::libc::_exit(code) }
        }
    }
}

fn enter(plan: &FdPlan, entry: &RoleEntries, report: &mut ReportWriter) -> i32 {
    if let Err(errno) = plan.apply() {
        error!(role = %plan.role, %errno, "failed to wire descriptors");
        report.send(Report::LaunchFailed {
            role: plan.role,
            errno,
        });
        return EXEC_FAILED_STATUS;
    }

    panic::catch_unwind(AssertUnwindSafe(|| entry.enter(report))).unwrap_or_else(|_| {
        error!(role = %plan.role, "role panicked");
        PANIC_STATUS
    })
}
