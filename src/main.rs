use std::env;

use color_eyre::Result;
use itertools::Itertools;
use pipetee::{
    cli::{self, USAGE},
    config::Settings,
    error::{ExecutionError, PipeTeeError},
};

#[macro_use]
extern crate tracing;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    pipetee::logging::init(&settings)?;

    color_eyre::install()?;

    let code = match cli::collect_args(env::args_os().skip(1)) {
        Ok(args) => {
            trace!(argv = %args.iter().format(" "), "starting");
            run(&args, &settings)
        }
        Err(err) => report(&PipeTeeError::from(err)),
    };

    std::process::exit(code);
}

fn run(args: &[String], settings: &Settings) -> i32 {
    match pipetee::run(args, settings) {
        Ok(result) => {
            // a role that ran and exited non-zero has already spoken for itself
            if let Some(
                failure @ (ExecutionError::CouldNotStart { .. } | ExecutionError::TeeFailed { .. }),
            ) = &result.failure
            {
                eprintln!("pipetee: {failure}");
            }
            result.exit_code()
        }
        Err(err) => report(&err),
    }
}

fn report(err: &PipeTeeError) -> i32 {
    eprintln!("pipetee: {err}");
    if let PipeTeeError::Usage(_) = err {
        eprintln!("{USAGE}");
    }
    err.exit_code()
}
