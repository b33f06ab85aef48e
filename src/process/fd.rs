use std::io;

use nix::{
    fcntl::OFlag,
    unistd::{self, dup2, pipe2},
};

use crate::prelude::*;

/// Retries a system call interrupted by a signal.
pub fn syscall<F, T>(f: F) -> nix::Result<T>
where
    F: FnMut() -> nix::Result<T>,
{
    let mut f = f;
    loop {
        match f() {
            Err(Errno::EINTR) => continue,
            result => return result,
        }
    }
}

pub fn close(fd: RawFd) -> nix::Result<()> {
    // close(2) must not be retried on EINTR, the descriptor is already gone
    match unistd::close(fd) {
        Err(Errno::EINTR) => Ok(()),
        result => result,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum StdStream {
    Stdin,
    Stdout,
    Stderr,
}

impl StdStream {
    pub fn fd(self) -> RawFd {
        match self {
            Self::Stdin => 0,
            Self::Stdout => 1,
            Self::Stderr => 2,
        }
    }
}

/// The two ends of a pipe as plain descriptor numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeEnds {
    pub read: RawFd,
    pub write: RawFd,
}

/// An owned pipe. Both ends are close-on-exec and are closed on drop unless
/// ownership is released with [`Pipe::into_ends`].
#[derive(Debug)]
pub struct Pipe {
    ends: PipeEnds,
    owned: bool,
}

impl Pipe {
    pub fn new() -> nix::Result<Self> {
        let (read, write) = syscall(|| pipe2(OFlag::O_CLOEXEC))?;
        Ok(Self {
            ends: PipeEnds { read, write },
            owned: true,
        })
    }

    pub fn ends(&self) -> PipeEnds {
        self.ends
    }

    pub fn into_ends(mut self) -> PipeEnds {
        self.owned = false;
        self.ends
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        if self.owned {
            let _ = close(self.ends.read);
            let _ = close(self.ends.write);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redirect {
    pub from: RawFd,
    pub to: StdStream,
}

/// Which descriptors a role duplicates onto its standard streams and which
/// it closes before its terminal action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FdPlan {
    pub role: ProcessRole,
    pub redirects: Vec<Redirect>,
    pub close: Vec<RawFd>,
}

impl FdPlan {
    pub fn new(role: ProcessRole) -> Self {
        Self {
            role,
            redirects: Vec::new(),
            close: Vec::new(),
        }
    }

    pub fn redirect(mut self, from: RawFd, to: StdStream) -> Self {
        self.redirects.push(Redirect { from, to });
        self
    }

    pub fn close(mut self, fd: RawFd) -> Self {
        if !self.close.contains(&fd) {
            self.close.push(fd);
        }
        self
    }

    pub fn keeps(&self, fd: RawFd) -> bool {
        !self.close.contains(&fd)
    }

    pub fn redirects_to(&self, stream: StdStream) -> Option<RawFd> {
        self.redirects
            .iter()
            .find(|redirect| redirect.to == stream)
            .map(|redirect| redirect.from)
    }

    /// Performs every duplication, then every close.
    pub fn apply(&self) -> nix::Result<()> {
        for redirect in &self.redirects {
            let target = redirect.to.fd();
            if redirect.from != target {
                syscall(|| dup2(redirect.from, target))?;
            }
        }

        for &fd in &self.close {
            if self.redirects.iter().any(|redirect| redirect.to.fd() == fd) {
                continue;
            }
            close(fd)?;
        }

        Ok(())
    }
}

/// `io::Read` over a descriptor the caller owns.
pub struct FdReader(pub RawFd);

impl io::Read for FdReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        syscall(|| unistd::read(self.0, buf)).map_err(io::Error::from)
    }
}

/// `io::Write` over a descriptor the caller owns.
pub struct FdWriter(pub RawFd);

impl io::Write for FdWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        syscall(|| unistd::write(self.0, buf)).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    #[test]
    fn plan_builder_dedupes_closes() {
        let plan = FdPlan::new(ProcessRole::Source)
            .redirect(7, StdStream::Stdout)
            .close(7)
            .close(7)
            .close(6);

        assert_eq!(plan.close, vec![7, 6]);
        assert_eq!(plan.redirects_to(StdStream::Stdout), Some(7));
        assert_eq!(plan.redirects_to(StdStream::Stdin), None);
        assert!(plan.keeps(5));
        assert!(!plan.keeps(6));
    }

    #[test]
    fn pipe_carries_bytes_and_eof() {
        let ends = Pipe::new().unwrap().into_ends();

        FdWriter(ends.write).write_all(b"hello").unwrap();
        close(ends.write).unwrap();

        let mut out = Vec::new();
        FdReader(ends.read).read_to_end(&mut out).unwrap();
        close(ends.read).unwrap();

        assert_eq!(out, b"hello");
    }
}
