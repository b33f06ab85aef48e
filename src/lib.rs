//! Runs `cmd1 | cmd2` while copying every byte that crosses the pipe into a
//! file.
//!
//! ```text
//! pipetee OUTFILE [ EXE ARGS... ] [ EXE ARGS... ]
//! ```

use crate::{
    cli::Invocation, config::Settings, error::PipeTeeError, orchestrate::Orchestrator,
    output::OutputFile, parse::BracketParser,
};

#[macro_use]
extern crate tracing;

pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrate;
pub mod output;
pub mod parse;
pub mod prelude;
pub mod process;

pub use orchestrate::RunResult;

/// Parses `args` (without the program name), creates OUTFILE and runs the
/// pipeline. Must be called from a single threaded process.
pub fn run<S: AsRef<str>>(args: &[S], settings: &Settings) -> Result<RunResult, PipeTeeError> {
    let parser = BracketParser::new(settings.max_arguments);
    let invocation = Invocation::from_args(args, &parser)?;

    let output = OutputFile::create(&invocation.output, settings.file_mode)?;

    Orchestrator::new(settings).run(&invocation.source, &invocation.sink, output)
}
