use nix::sys::wait::waitpid;

use self::{fd::syscall, report::ReportReader, status::RoleStatus};
use crate::prelude::*;

pub mod entry;
pub mod fd;
pub mod report;
pub mod spawn;
pub mod status;
pub mod tee;

pub use spawn::spawn;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::FromRepr,
)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum ProcessRole {
    Source = 1,
    Tee = 2,
    Sink = 3,
    Parent = 4,
}

/// A spawned role as seen from the process that spawned it.
#[derive(Debug)]
pub struct ProcessHandle {
    pub role: ProcessRole,
    pub pid: Pid,
    reports: ReportReader,
    status: Option<RoleStatus>,
}

impl ProcessHandle {
    pub(crate) fn new(role: ProcessRole, pid: Pid, reports: ReportReader) -> Self {
        Self {
            role,
            pid,
            reports,
            status: None,
        }
    }

    /// Blocks until the role has replaced its image or failed to. Only
    /// meaningful for roles that exec; the tee role holds its report pipe
    /// open until it exits.
    pub fn launch_failure(&mut self) -> nix::Result<Option<Errno>> {
        let role = self.role;
        let failure = self.reports.drain()?.iter().find_map(|report| match report {
            Report::LaunchFailed { role: failed, errno } if *failed == role => Some(*errno),
            _ => None,
        });

        Ok(failure)
    }

    pub fn reports(&mut self) -> nix::Result<&[Report]> {
        self.reports.drain()
    }

    pub fn wait(&mut self) -> nix::Result<RoleStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }

        loop {
            let status = syscall(|| waitpid(self.pid, None))?;
            if let Some(status) = RoleStatus::from_wait(status) {
                trace!(role = %self.role, pid = %self.pid, %status, "role terminated");
                self.status = Some(status);
                return Ok(status);
            }
        }
    }
}
