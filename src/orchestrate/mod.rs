use nix::sys::signal::Signal;
use tracing::instrument;

use crate::{
    cmd::Command,
    config::Settings,
    error::{ExecutionError, PipeTeeError, ResourceError},
    output::OutputFile,
    prelude::*,
    process::{
        entry::ExecEntry, fd::Pipe, spawn, status::TEE_FAILED_STATUS, tee::TeeStage,
        ProcessHandle,
    },
};

pub mod topology;

use self::topology::Wiring;

/// Aggregate outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// Terminal status of each role that was spawned, in observation order.
    pub statuses: Vec<(ProcessRole, RoleStatus)>,
    pub bytes_teed: Option<u64>,
    /// The sink stopped reading before the source was done.
    pub downstream_closed: bool,
    /// The first failing role in the order source, tee, sink.
    pub failure: Option<ExecutionError>,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn exit_code(&self) -> i32 {
        self.failure.as_ref().map_or(0, ExecutionError::exit_code)
    }

    pub fn status_of(&self, role: ProcessRole) -> Option<RoleStatus> {
        self.statuses
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, status)| *status)
    }

    fn source_not_started(source: &Command, errno: Errno) -> Self {
        Self {
            statuses: vec![(ProcessRole::Source, RoleStatus::CouldNotStart(errno))],
            bytes_teed: None,
            downstream_closed: false,
            failure: Some(ExecutionError::CouldNotStart {
                role: ProcessRole::Source,
                executable: source.executable().to_owned(),
                errno,
            }),
        }
    }

    /// Combines the parent's own wait results with what the tee role
    /// reported about itself and the sink.
    pub fn collect(
        source: &Command,
        sink: &Command,
        source_status: RoleStatus,
        tee_status: RoleStatus,
        reports: &[Report],
    ) -> Self {
        let mut sink_status = None;
        let mut sink_launch = None;
        let mut copy_failed = None;
        let mut bytes_teed = None;
        let mut downstream_closed = false;

        for report in reports {
            match *report {
                Report::LaunchFailed {
                    role: ProcessRole::Sink,
                    errno,
                } => sink_launch = Some(errno),
                Report::Finished {
                    role: ProcessRole::Sink,
                    status,
                } => sink_status = Some(status),
                Report::CopyFailed { errno } => copy_failed = Some(errno),
                Report::Copied { bytes } => bytes_teed = Some(bytes),
                Report::DownstreamClosed => downstream_closed = true,
                _ => debug!(?report, "ignoring unexpected report"),
            }
        }

        let sink_status = sink_launch.map(RoleStatus::CouldNotStart).or(sink_status);

        // the tee's exit code mirrors the sink's; it only failed itself when
        // it says so or when nothing came back about the sink
        let tee_own = match (copy_failed, sink_status) {
            (Some(_), _) => RoleStatus::Exited(TEE_FAILED_STATUS),
            (None, Some(_)) if !matches!(tee_status, RoleStatus::Signaled(_)) => {
                RoleStatus::new_success()
            }
            _ => tee_status,
        };

        let mut statuses = vec![
            (ProcessRole::Source, source_status),
            (ProcessRole::Tee, tee_own),
        ];
        if let Some(status) = sink_status {
            statuses.push((ProcessRole::Sink, status));
        }

        // a source cut off by a sink that stopped reading ends the way it
        // would in a shell pipeline
        let cut_off = |role: ProcessRole, status: RoleStatus| {
            downstream_closed
                && role == ProcessRole::Source
                && status == RoleStatus::Signaled(Signal::SIGPIPE)
        };

        let failure = statuses
            .iter()
            .find(|&&(role, status)| status.failure() && !cut_off(role, status))
            .map(|&(role, status)| match (role, status, copy_failed) {
                (ProcessRole::Tee, _, Some(errno)) => ExecutionError::TeeFailed { errno },
                (_, RoleStatus::CouldNotStart(errno), _) => ExecutionError::CouldNotStart {
                    role,
                    executable: executable_of(role, source, sink),
                    errno,
                },
                _ => ExecutionError::Failed {
                    role,
                    executable: executable_of(role, source, sink),
                    status,
                },
            });

        Self {
            statuses,
            bytes_teed,
            downstream_closed,
            failure,
        }
    }
}

fn executable_of(role: ProcessRole, source: &Command, sink: &Command) -> String {
    match role {
        ProcessRole::Source => source.executable().to_owned(),
        ProcessRole::Sink => sink.executable().to_owned(),
        role => role.to_string(),
    }
}

/// Runs `source | sink` with the piped bytes teed into an output file.
#[derive(Debug)]
pub struct Orchestrator<'a> {
    settings: &'a Settings,
}

impl<'a> Orchestrator<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// The process calling this must be single threaded: every role is a
    /// fork of it.
    #[instrument(skip_all, fields(role = %ProcessRole::Parent, %source, %sink))]
    pub fn run(
        &self,
        source: &Command,
        sink: &Command,
        output: OutputFile,
    ) -> Result<RunResult, PipeTeeError> {
        source.validate(1)?;
        sink.validate(2)?;

        let top = Pipe::new().map_err(ResourceError::CreatePipe)?;
        let wiring = Wiring {
            top: top.ends(),
            output: output.fd(),
        };

        let mut source_handle = spawn(
            &topology::source_plan(&wiring),
            ExecEntry::new(ProcessRole::Source, source.clone()).into(),
        )
        .map_err(|errno| ResourceError::Spawn {
            role: ProcessRole::Source,
            source: errno,
        })?;

        let launch = match source_handle.launch_failure() {
            Ok(launch) => launch,
            Err(errno) => {
                drop(top);
                drop(output);
                reap(&mut source_handle);
                return Err(ResourceError::Report {
                    role: ProcessRole::Source,
                    source: errno,
                }
                .into());
            }
        };

        if let Some(errno) = launch {
            drop(top);
            drop(output);
            reap(&mut source_handle);
            debug!(executable = source.executable(), %errno, "source could not start");
            return Ok(RunResult::source_not_started(source, errno));
        }

        let tee = TeeStage::new(sink.clone(), output.fd(), self.settings.buffer_size);
        let tee_handle = spawn(&topology::tee_plan(&wiring), tee.into());

        // from here on the tee role is the only holder of OUTFILE and of the
        // top pipe's read end
        drop(top);
        drop(output);

        let source_status = source_handle.wait().map_err(|errno| ResourceError::Wait {
            role: ProcessRole::Source,
            source: errno,
        })?;

        let mut tee_handle = tee_handle.map_err(|errno| ResourceError::Spawn {
            role: ProcessRole::Tee,
            source: errno,
        })?;

        let tee_status = tee_handle.wait().map_err(|errno| ResourceError::Wait {
            role: ProcessRole::Tee,
            source: errno,
        })?;

        let reports = tee_handle
            .reports()
            .map_err(|errno| ResourceError::Report {
                role: ProcessRole::Tee,
                source: errno,
            })?
            .to_vec();

        let result = RunResult::collect(source, sink, source_status, tee_status, &reports);

        // the driver reports failures itself
        match &result.failure {
            Some(failure) => debug!(%failure, "pipeline failed"),
            None => info!(bytes = ?result.bytes_teed, "pipeline finished"),
        }

        Ok(result)
    }
}

fn reap(handle: &mut ProcessHandle) {
    if let Err(errno) = handle.wait() {
        warn!(role = %handle.role, %errno, "failed to reap role");
    }
}
