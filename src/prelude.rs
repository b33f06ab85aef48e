pub use std::os::unix::io::RawFd;

pub use nix::{errno::Errno, unistd::Pid};

pub use crate::process::{report::Report, status::RoleStatus, ProcessRole};
