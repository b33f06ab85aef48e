use std::fmt;

use nix::sys::{signal::Signal, wait::WaitStatus};

use crate::prelude::*;

/// Reserved status of a role whose image could not be replaced.
pub const EXEC_FAILED_STATUS: i32 = 127;
/// Status of a tee role that could not finish copying its input.
pub const TEE_FAILED_STATUS: i32 = 74;
/// Status of a forked role that panicked instead of finishing.
pub const PANIC_STATUS: i32 = 101;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleStatus {
    Exited(i32),
    Signaled(Signal),
    CouldNotStart(Errno),
}

impl RoleStatus {
    pub fn new_success() -> Self {
        Self::Exited(0)
    }

    /// Maps a terminal wait status. Returns `None` for stops and continues.
    pub fn from_wait(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(Self::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Some(Self::Signaled(signal)),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Exited(code) => *code,
            Self::Signaled(signal) => 128 + *signal as i32,
            Self::CouldNotStart(_) => EXEC_FAILED_STATUS,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    pub fn failure(&self) -> bool {
        !self.success()
    }
}

impl fmt::Display for RoleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with status {code}"),
            Self::Signaled(signal) => write!(f, "was killed by {signal}"),
            Self::CouldNotStart(errno) => write!(f, "could not start: {errno}"),
        }
    }
}
