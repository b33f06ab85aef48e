use std::path::PathBuf;

use thiserror::Error;

use crate::{
    prelude::*,
    process::status::{EXEC_FAILED_STATUS, TEE_FAILED_STATUS},
};

pub const USAGE_STATUS: i32 = 64;
pub const PARSE_STATUS: i32 = 65;
pub const OS_STATUS: i32 = 71;
pub const CANT_CREATE_STATUS: i32 = 73;

#[derive(Debug, Error)]
pub enum PipeTeeError {
    #[error("usage error: {0}")]
    Usage(#[from] UsageError),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),
}

impl PipeTeeError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => USAGE_STATUS,
            Self::Parse(_) => PARSE_STATUS,
            Self::Resource(err) => err.exit_code(),
            Self::Execution(err) => err.exit_code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("missing OUTFILE")]
    MissingOutfile,
    #[error("expected 2 bracketed commands, found {found}")]
    MissingCommand { found: usize },
    #[error("unexpected argument `{token}` at position {index} after the second command")]
    TrailingArguments { index: usize, token: String },
    #[error("argument at position {index} is not valid UTF-8")]
    NotUnicode { index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unmatched `]` at position {index}")]
    UnmatchedClose { index: usize },
    #[error("unmatched `[` at position {index}")]
    UnmatchedOpen { index: usize },
    #[error("`{token}` at position {index} is outside of any [ ... ] group")]
    StrayToken { index: usize, token: String },
    #[error("command {group} has an empty executable name")]
    EmptyExecutable { group: usize },
    #[error("command {group} has more than {limit} arguments")]
    TooManyArguments { group: usize, limit: usize },
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("failed to open {}: {source}", .path.display())]
    OpenOutput {
        path: PathBuf,
        #[source]
        source: Errno,
    },
    #[error("failed to create pipe: {0}")]
    CreatePipe(#[source] Errno),
    #[error("failed to spawn {role}: {source}")]
    Spawn {
        role: ProcessRole,
        #[source]
        source: Errno,
    },
    #[error("failed to wait for {role}: {source}")]
    Wait {
        role: ProcessRole,
        #[source]
        source: Errno,
    },
    #[error("failed to read reports from {role}: {source}")]
    Report {
        role: ProcessRole,
        #[source]
        source: Errno,
    },
}

impl ResourceError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::OpenOutput { .. } => CANT_CREATE_STATUS,
            _ => OS_STATUS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("{role} could not start `{executable}`: {errno}")]
    CouldNotStart {
        role: ProcessRole,
        executable: String,
        errno: Errno,
    },
    #[error("{role} `{executable}` {status}")]
    Failed {
        role: ProcessRole,
        executable: String,
        status: RoleStatus,
    },
    #[error("tee failed to copy the stream: {errno}")]
    TeeFailed { errno: Errno },
}

impl ExecutionError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CouldNotStart { .. } => EXEC_FAILED_STATUS,
            Self::Failed { status, .. } => status.code(),
            Self::TeeFailed { .. } => TEE_FAILED_STATUS,
        }
    }

    pub fn role(&self) -> ProcessRole {
        match self {
            Self::CouldNotStart { role, .. } | Self::Failed { role, .. } => *role,
            Self::TeeFailed { .. } => ProcessRole::Tee,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_exec_failures_map_to_distinct_codes() {
        let parse: PipeTeeError = ParseError::UnmatchedOpen { index: 1 }.into();
        let exec: PipeTeeError = ExecutionError::CouldNotStart {
            role: ProcessRole::Source,
            executable: "nope".into(),
            errno: Errno::ENOENT,
        }
        .into();

        assert_eq!(parse.exit_code(), PARSE_STATUS);
        assert_eq!(exec.exit_code(), EXEC_FAILED_STATUS);
        assert_ne!(parse.exit_code(), exec.exit_code());
    }

    #[test]
    fn failed_role_surfaces_its_own_code() {
        let err = ExecutionError::Failed {
            role: ProcessRole::Sink,
            executable: "grep".into(),
            status: RoleStatus::Exited(1),
        };

        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.role(), ProcessRole::Sink);
    }

    #[test]
    fn output_open_failure_is_cant_create() {
        let err: PipeTeeError = ResourceError::OpenOutput {
            path: "/nope/out".into(),
            source: Errno::ENOENT,
        }
        .into();

        assert_eq!(err.exit_code(), CANT_CREATE_STATUS);
        assert!(err.to_string().contains("/nope/out"));
    }
}
