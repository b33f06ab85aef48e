//! The four-role wiring, written down as data.
//!
//! ```text
//! source --top--> tee --inner--> sink
//!                  |
//!                  +--> OUTFILE
//! ```
//!
//! Each role keeps exactly the ends it duplicated onto a standard stream and
//! closes every other end it inherited; a pipe whose write end lingers in some
//! process never delivers end of input to its reader.

use crate::{
    prelude::*,
    process::fd::{FdPlan, PipeEnds, StdStream},
};

/// Descriptors the parent holds when it spawns its two direct children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wiring {
    pub top: PipeEnds,
    pub output: RawFd,
}

pub fn source_plan(wiring: &Wiring) -> FdPlan {
    FdPlan::new(ProcessRole::Source)
        .redirect(wiring.top.write, StdStream::Stdout)
        .close(wiring.top.read)
        .close(wiring.top.write)
        .close(wiring.output)
}

/// The tee role keeps `wiring.output`; it is the only writer of OUTFILE.
pub fn tee_plan(wiring: &Wiring) -> FdPlan {
    FdPlan::new(ProcessRole::Tee)
        .redirect(wiring.top.read, StdStream::Stdin)
        .close(wiring.top.read)
        .close(wiring.top.write)
}

/// Applied by the tee role to itself after the sink is running.
pub fn tee_stdout_plan(inner: PipeEnds) -> FdPlan {
    FdPlan::new(ProcessRole::Tee)
        .redirect(inner.write, StdStream::Stdout)
        .close(inner.read)
        .close(inner.write)
}

/// `report` is the tee role's own report pipe, which the sink inherits.
pub fn sink_plan(inner: PipeEnds, output: RawFd, report: RawFd) -> FdPlan {
    FdPlan::new(ProcessRole::Sink)
        .redirect(inner.read, StdStream::Stdin)
        .close(inner.read)
        .close(inner.write)
        .close(output)
        .close(report)
}
