use std::io::{self, Read, Write};

use super::{
    entry::{ExecEntry, RoleEntry},
    fd::{close, FdReader, FdWriter, Pipe, StdStream},
    report::ReportWriter,
    spawn,
    status::{EXEC_FAILED_STATUS, TEE_FAILED_STATUS},
};
use crate::{cmd::Command, orchestrate::topology, prelude::*};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeeStats {
    pub bytes: u64,
    /// Set when the downstream reader went away before end of input. The
    /// copy stops there, as a plain pipe would.
    pub downstream_closed: bool,
}

/// Copies `input` into both `file` and `downstream` until end of input.
///
/// Every byte read reaches `file`. If `downstream` stops accepting data
/// (broken pipe) the chunk in hand still goes to `file` and copying stops.
pub fn tee_copy<R, F, D>(
    input: &mut R,
    file: &mut F,
    downstream: &mut D,
    buffer_size: usize,
) -> io::Result<TeeStats>
where
    R: Read + ?Sized,
    F: Write + ?Sized,
    D: Write + ?Sized,
{
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut stats = TeeStats::default();

    loop {
        let len = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(len) => len,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        let chunk = &buf[..len];

        file.write_all(chunk)?;
        stats.bytes += len as u64;

        match downstream.write_all(chunk) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                debug!(copied = stats.bytes, "downstream closed, stopping");
                stats.downstream_closed = true;
                break;
            }
            Err(err) => return Err(err),
        }
    }

    file.flush()?;
    if !stats.downstream_closed {
        downstream.flush()?;
    }

    Ok(stats)
}

/// The middle role: reads the source's output on stdin, writes it to the
/// output file and to a sink it spawns itself.
#[derive(Debug, Clone)]
pub struct TeeStage {
    sink: Command,
    output: RawFd,
    buffer_size: usize,
}

impl TeeStage {
    pub fn new(sink: Command, output: RawFd, buffer_size: usize) -> Self {
        Self {
            sink,
            output,
            buffer_size,
        }
    }

    fn run(&self, report: &mut ReportWriter) -> i32 {
        let inner = match Pipe::new() {
            Ok(inner) => inner.into_ends(),
            Err(errno) => {
                error!(%errno, "failed to create sink pipe");
                report.send(Report::CopyFailed { errno });
                return TEE_FAILED_STATUS;
            }
        };

        let sink_plan = topology::sink_plan(inner, self.output, report.fd());
        let sink_entry = ExecEntry::new(ProcessRole::Sink, self.sink.clone());

        let mut sink = match spawn(&sink_plan, sink_entry.into()) {
            Ok(sink) => Some(sink),
            Err(errno) => {
                debug!(%errno, "failed to spawn sink");
                report.send(Report::LaunchFailed {
                    role: ProcessRole::Sink,
                    errno,
                });
                None
            }
        };

        if let Some(handle) = sink.as_mut() {
            match handle.launch_failure() {
                Ok(Some(errno)) => report.send(Report::LaunchFailed {
                    role: ProcessRole::Sink,
                    errno,
                }),
                Ok(None) => {}
                Err(errno) => debug!(%errno, "failed to read sink launch report"),
            }
        }

        let copied = match topology::tee_stdout_plan(inner).apply() {
            Ok(()) => tee_copy(
                &mut FdReader(StdStream::Stdin.fd()),
                &mut FdWriter(self.output),
                &mut FdWriter(StdStream::Stdout.fd()),
                self.buffer_size,
            ),
            Err(errno) => {
                let _ = close(inner.read);
                let _ = close(inner.write);
                Err(io::Error::from(errno))
            }
        };

        // the sink only sees end of input once our copy of its pipe is gone,
        // and the source only sees a broken pipe once ours is
        let _ = close(self.output);
        let _ = close(StdStream::Stdout.fd());
        let _ = close(StdStream::Stdin.fd());

        let copy_failed = match copied {
            Ok(stats) => {
                debug!(
                    bytes = stats.bytes,
                    downstream_closed = stats.downstream_closed,
                    "tee finished"
                );
                if stats.downstream_closed {
                    report.send(Report::DownstreamClosed);
                }
                report.send(Report::Copied { bytes: stats.bytes });
                false
            }
            Err(err) => {
                let errno = err
                    .raw_os_error()
                    .map(Errno::from_i32)
                    .unwrap_or(Errno::EIO);
                debug!(%errno, "tee copy failed");
                report.send(Report::CopyFailed { errno });
                true
            }
        };

        let sink_status = match sink.as_mut().map(|handle| handle.wait()) {
            Some(Ok(status)) => {
                report.send(Report::Finished {
                    role: ProcessRole::Sink,
                    status,
                });
                status.code()
            }
            Some(Err(errno)) => {
                error!(%errno, "failed to wait for sink");
                TEE_FAILED_STATUS
            }
            None => EXEC_FAILED_STATUS,
        };

        if copy_failed {
            TEE_FAILED_STATUS
        } else {
            sink_status
        }
    }
}

impl RoleEntry for TeeStage {
    fn role(&self) -> ProcessRole {
        ProcessRole::Tee
    }

    fn enter(&self, report: &mut ReportWriter) -> i32 {
        self.run(report)
    }
}
