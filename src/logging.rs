use std::{
    io::{self, IsTerminal},
    path::Path,
};

use color_eyre::{eyre::eyre, Result};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Settings;

/// Installs the global subscriber.
///
/// Writers are blocking on purpose: every role is a fork of this process and
/// a forked child has no copy of a background writer thread.
pub fn init(settings: &Settings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))?;

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_error::ErrorLayer::default());

    match &settings.log_file {
        Some(path) => {
            let appender = file_appender(path)?;
            registry
                .with(fmt::layer().with_writer(appender).with_ansi(false))
                .try_init()?;
        }
        None => {
            registry
                .with(
                    fmt::layer()
                        .with_writer(io::stderr)
                        .with_ansi(io::stderr().is_terminal()),
                )
                .try_init()?;
        }
    }

    Ok(())
}

fn file_appender(path: &Path) -> Result<RollingFileAppender> {
    let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("log file {} has no file name", path.display()))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    Ok(RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(dir)?)
}
