use std::path::{Path, PathBuf};

use nix::{
    fcntl::{open, OFlag},
    sys::stat::Mode,
};

use crate::{
    error::ResourceError,
    prelude::*,
    process::fd::{close, syscall},
};

/// OUTFILE, opened for writing. Closed on drop.
#[derive(Debug)]
pub struct OutputFile {
    path: PathBuf,
    fd: RawFd,
}

impl OutputFile {
    /// Creates the file, truncating it if it exists.
    pub fn create(path: impl AsRef<Path>, mode: u32) -> Result<Self, ResourceError> {
        let path = path.as_ref();
        let flags = OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC | OFlag::O_CLOEXEC;
        let mode = Mode::from_bits_truncate(mode as nix::libc::mode_t);

        let fd = syscall(|| open(path, flags, mode)).map_err(|source| ResourceError::OpenOutput {
            path: path.to_owned(),
            source,
        })?;

        debug!(path = %path.display(), fd, "opened output file");

        Ok(Self {
            path: path.to_owned(),
            fd,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for OutputFile {
    fn drop(&mut self) {
        let _ = close(self.fd);
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, io::Write, os::unix::fs::PermissionsExt};

    use super::*;
    use crate::process::fd::FdWriter;

    #[test]
    fn creates_with_requested_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");

        let file = OutputFile::create(&path, 0o600).unwrap();
        FdWriter(file.fd()).write_all(b"hi\n").unwrap();
        drop(file);

        assert_eq!(fs::read(&path).unwrap(), b"hi\n");
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn truncates_existing_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, b"stale data").unwrap();

        let file = OutputFile::create(&path, 0o600).unwrap();
        assert_eq!(file.path(), path);
        drop(file);

        assert_eq!(fs::read(&path).unwrap(), b"");
    }

    #[test]
    fn missing_directory_is_a_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.txt");

        match OutputFile::create(&path, 0o600) {
            Err(ResourceError::OpenOutput { path: failed, source }) => {
                assert_eq!(failed, path);
                assert_eq!(source, Errno::ENOENT);
            }
            other => panic!("expected OpenOutput, got {other:?}"),
        }
    }
}
