use std::{
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_ENV: &str = "PIPETEE_CONFIG";
pub const BUFFER_SIZE_ENV: &str = "PIPETEE_BUFFER_SIZE";
pub const LOG_LEVEL_ENV: &str = "PIPETEE_LOG_LEVEL";
pub const LOG_FILE_ENV: &str = "PIPETEE_LOG_FILE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value `{value}` for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Bytes moved per read in the tee role. `1` copies byte by byte.
    pub buffer_size: usize,
    /// Permission bits OUTFILE is created with.
    pub file_mode: u32,
    /// Most tokens a single bracket group may hold.
    pub max_arguments: usize,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            buffer_size: 4096,
            file_mode: 0o600,
            max_arguments: 8192,
            log_level: "error".into(),
            log_file: None,
        }
    }
}

impl Settings {
    /// Defaults, then the TOML file named by `PIPETEE_CONFIG`, then
    /// individual environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    pub fn load_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match lookup(CONFIG_ENV) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(value) = lookup(BUFFER_SIZE_ENV) {
            settings.buffer_size = parse_value(BUFFER_SIZE_ENV, &value)?;
        }
        if let Some(value) = lookup(LOG_LEVEL_ENV) {
            settings.log_level = value;
        }
        if let Some(value) = lookup(LOG_FILE_ENV) {
            settings.log_file = Some(value.into());
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "buffer_size",
                value: self.buffer_size.to_string(),
                reason: "must be at least 1",
            });
        }
        if self.file_mode > 0o7777 {
            return Err(ConfigError::InvalidValue {
                key: "file_mode",
                value: format!("{:o}", self.file_mode),
                reason: "must be a permission mode no larger than 0o7777",
            });
        }
        if self.max_arguments == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_arguments",
                value: self.max_arguments.to_string(),
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_owned(),
        reason: "not a number",
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let settings = Settings::load_with(lookup(&[])).unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.file_mode, 0o600);
        assert_eq!(settings.max_arguments, 8192);
    }

    #[test]
    fn toml_overrides_defaults() {
        let settings = Settings::from_toml(
            r#"
            buffer_size = 1
            file_mode = 0o644
            log_file = "logs/pipetee.log"
            "#,
        )
        .unwrap();

        assert_eq!(settings.buffer_size, 1);
        assert_eq!(settings.file_mode, 0o644);
        assert_eq!(settings.log_file, Some(PathBuf::from("logs/pipetee.log")));
        assert_eq!(settings.log_level, "error");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            Settings::from_toml("buffer = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn file_then_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipetee.toml");
        fs::write(&path, "buffer_size = 64\nlog_level = \"debug\"\n").unwrap();
        let path = path.to_string_lossy().into_owned();

        let settings = Settings::load_with(lookup(&[
            (CONFIG_ENV, path.as_str()),
            (BUFFER_SIZE_ENV, "128"),
        ]))
        .unwrap();

        assert_eq!(settings.buffer_size, 128);
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Settings::load_with(lookup(&[(CONFIG_ENV, "/nonexistent/pipetee.toml")]))
            .unwrap_err();

        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            Settings::load_with(lookup(&[(BUFFER_SIZE_ENV, "0")])),
            Err(ConfigError::InvalidValue {
                key: "buffer_size",
                ..
            })
        ));
        assert!(matches!(
            Settings::load_with(lookup(&[(BUFFER_SIZE_ENV, "lots")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(Settings::from_toml("file_mode = 0o17777")
            .unwrap()
            .validate()
            .is_err());
    }
}
