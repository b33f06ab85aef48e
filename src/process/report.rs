//! Records a child role sends back to whoever spawned it.
//!
//! Each spawned role gets its own close-on-exec report pipe. An exec'd role
//! writes at most one [`Report::LaunchFailed`]; a successful exec closes the
//! pipe with nothing written. The tee role keeps its pipe for the whole run
//! and forwards what it learns about the sink it spawned.

use std::io::{Read, Write};

use nix::sys::signal::Signal;

use super::fd::{close, FdReader, FdWriter};
use crate::prelude::*;

pub const RECORD_LEN: usize = 10;

const LAUNCH_FAILED: u8 = 1;
const EXITED: u8 = 2;
const SIGNALED: u8 = 3;
const COPY_FAILED: u8 = 4;
const COPIED: u8 = 5;
const DOWNSTREAM_CLOSED: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    LaunchFailed { role: ProcessRole, errno: Errno },
    Finished { role: ProcessRole, status: RoleStatus },
    CopyFailed { errno: Errno },
    Copied { bytes: u64 },
    /// The sink stopped reading before the source finished writing.
    DownstreamClosed,
}

impl Report {
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let (role, kind, value) = match *self {
            Self::LaunchFailed { role, errno } => (role, LAUNCH_FAILED, errno as i64),
            Self::Finished { role, status } => match status {
                RoleStatus::Exited(code) => (role, EXITED, code as i64),
                RoleStatus::Signaled(signal) => (role, SIGNALED, signal as i64),
                RoleStatus::CouldNotStart(errno) => (role, LAUNCH_FAILED, errno as i64),
            },
            Self::CopyFailed { errno } => (ProcessRole::Tee, COPY_FAILED, errno as i64),
            Self::Copied { bytes } => (ProcessRole::Tee, COPIED, bytes as i64),
            Self::DownstreamClosed => (ProcessRole::Tee, DOWNSTREAM_CLOSED, 0),
        };

        let mut record = [0u8; RECORD_LEN];
        record[0] = role as u8;
        record[1] = kind;
        record[2..].copy_from_slice(&value.to_le_bytes());
        record
    }

    pub fn decode(record: &[u8]) -> Option<Self> {
        if record.len() != RECORD_LEN {
            return None;
        }

        let role = ProcessRole::from_repr(record[0])?;
        let mut value = [0u8; 8];
        value.copy_from_slice(&record[2..]);
        let value = i64::from_le_bytes(value);

        let report = match record[1] {
            LAUNCH_FAILED => Self::LaunchFailed {
                role,
                errno: Errno::from_i32(i32::try_from(value).ok()?),
            },
            EXITED => Self::Finished {
                role,
                status: RoleStatus::Exited(i32::try_from(value).ok()?),
            },
            SIGNALED => Self::Finished {
                role,
                status: RoleStatus::Signaled(Signal::try_from(i32::try_from(value).ok()?).ok()?),
            },
            COPY_FAILED => Self::CopyFailed {
                errno: Errno::from_i32(i32::try_from(value).ok()?),
            },
            COPIED => Self::Copied {
                bytes: u64::try_from(value).ok()?,
            },
            DOWNSTREAM_CLOSED => Self::DownstreamClosed,
            _ => return None,
        };

        Some(report)
    }

    /// Decodes a whole stream of records, dropping a trailing partial record.
    pub fn decode_all(buf: &[u8]) -> Vec<Self> {
        buf.chunks_exact(RECORD_LEN)
            .filter_map(|record| {
                let report = Self::decode(record);
                if report.is_none() {
                    warn!(?record, "dropping malformed report record");
                }
                report
            })
            .collect()
    }
}

/// Child side of a report pipe.
#[derive(Debug)]
pub struct ReportWriter {
    fd: RawFd,
}

impl ReportWriter {
    pub fn new(fd: RawFd) -> Self {
        Self { fd }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Best effort: a parent that stopped listening is not an error for the
    /// child.
    pub fn send(&mut self, report: Report) {
        if let Err(err) = FdWriter(self.fd).write_all(&report.encode()) {
            debug!(?report, %err, "failed to send report");
        }
    }
}

/// Parent side of a report pipe.
#[derive(Debug)]
pub struct ReportReader {
    fd: Option<RawFd>,
    received: Vec<Report>,
}

impl ReportReader {
    pub fn new(fd: RawFd) -> Self {
        Self {
            fd: Some(fd),
            received: Vec::new(),
        }
    }

    /// Reads until every holder of the write end has closed it. Later calls
    /// return the same records without touching the descriptor.
    pub fn drain(&mut self) -> nix::Result<&[Report]> {
        if let Some(fd) = self.fd.take() {
            let mut buf = Vec::new();
            let res = FdReader(fd).read_to_end(&mut buf);
            let _ = close(fd);
            res.map_err(|err| {
                err.raw_os_error()
                    .map(Errno::from_i32)
                    .unwrap_or(Errno::EIO)
            })?;
            self.received = Report::decode_all(&buf);
        }

        Ok(&self.received)
    }
}

impl Drop for ReportReader {
    fn drop(&mut self) {
        if let Some(fd) = self.fd.take() {
            let _ = close(fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fd::Pipe;

    #[test]
    fn records_decode_to_what_was_encoded() {
        let reports = [
            Report::LaunchFailed {
                role: ProcessRole::Sink,
                errno: Errno::ENOENT,
            },
            Report::Finished {
                role: ProcessRole::Sink,
                status: RoleStatus::Exited(1),
            },
            Report::Finished {
                role: ProcessRole::Sink,
                status: RoleStatus::Signaled(Signal::SIGPIPE),
            },
            Report::CopyFailed { errno: Errno::ENOSPC },
            Report::Copied { bytes: 1 << 40 },
            Report::DownstreamClosed,
        ];

        let stream: Vec<u8> = reports.iter().flat_map(Report::encode).collect();

        assert_eq!(Report::decode_all(&stream), reports);
    }

    #[test]
    fn could_not_start_is_sent_as_launch_failure() {
        let record = Report::Finished {
            role: ProcessRole::Source,
            status: RoleStatus::CouldNotStart(Errno::EACCES),
        }
        .encode();

        assert_eq!(
            Report::decode(&record),
            Some(Report::LaunchFailed {
                role: ProcessRole::Source,
                errno: Errno::EACCES,
            })
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(Report::decode(&[0xff; RECORD_LEN]), None);
        assert_eq!(Report::decode(&[1, 2, 3]), None);

        let mut record = Report::Copied { bytes: 3 }.encode();
        record[1] = 99;
        assert_eq!(Report::decode(&record), None);
    }

    #[test]
    fn trailing_partial_record_is_dropped() {
        let mut stream = Report::Copied { bytes: 6 }.encode().to_vec();
        stream.extend_from_slice(&[1, 2, 3]);

        assert_eq!(Report::decode_all(&stream), vec![Report::Copied { bytes: 6 }]);
    }

    #[test]
    fn reader_drains_until_writer_closes() {
        let ends = Pipe::new().unwrap().into_ends();
        let mut writer = ReportWriter::new(ends.write);
        let mut reader = ReportReader::new(ends.read);

        writer.send(Report::Copied { bytes: 12 });
        close(writer.fd()).unwrap();

        assert_eq!(reader.drain().unwrap(), &[Report::Copied { bytes: 12 }]);
        assert_eq!(reader.drain().unwrap(), &[Report::Copied { bytes: 12 }]);
    }
}
