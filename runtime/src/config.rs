//! Settings: TOML file first, then `QUIRE_*` environment overrides.

use chrono::Duration;
use quire_core::WorkerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_TIME_EXPIRED_TEXT: &str = "You have exceeded your time limit for this survey";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for {var}: {reason}")]
    Env {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Run validate rules. Turning this off lets testers click through.
    pub validate: bool,
    /// Session time limit, counted from enrolment.
    pub time_limit_secs: Option<u64>,
    /// Error shown on the current page once the time limit has passed.
    pub time_expired_text: String,
    /// Where redirects and loading pages send the participant.
    pub survey_url: String,
    pub workers: WorkerConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            validate: true,
            time_limit_secs: None,
            time_expired_text: DEFAULT_TIME_EXPIRED_TEXT.to_string(),
            survey_url: "/survey".to_string(),
            workers: WorkerConfig::default(),
        }
    }
}

impl Settings {
    /// Read a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env()
    }

    /// Apply `QUIRE_*` overrides from the process environment.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from any variable lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(v) = lookup("QUIRE_VALIDATE") {
            self.validate = parse_bool("QUIRE_VALIDATE", &v)?;
        }
        if let Some(v) = lookup("QUIRE_TIME_LIMIT_SECS") {
            self.time_limit_secs = match v.trim() {
                "" | "none" => None,
                s => Some(parse_num("QUIRE_TIME_LIMIT_SECS", s)?),
            };
        }
        if let Some(v) = lookup("QUIRE_SURVEY_URL") {
            self.survey_url = v;
        }
        if let Some(v) = lookup("QUIRE_WORKERS") {
            self.workers.concurrency = parse_num("QUIRE_WORKERS", &v)?;
        }
        if let Some(v) = lookup("QUIRE_JOB_ATTEMPTS") {
            self.workers.max_attempts = parse_num("QUIRE_JOB_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("QUIRE_JOB_RESULT_TTL_SECS") {
            self.workers.result_ttl_secs = parse_num("QUIRE_JOB_RESULT_TTL_SECS", &v)?;
        }
        Ok(self)
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_secs
            .and_then(|s| i64::try_from(s).ok())
            .map(Duration::seconds)
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(ConfigError::Env {
            var,
            value: value.to_string(),
            reason: "expected a boolean".into(),
        }),
    }
}

fn parse_num<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert!(s.validate);
        assert_eq!(s.time_limit(), None);
        assert_eq!(s.time_expired_text, DEFAULT_TIME_EXPIRED_TEXT);
        assert_eq!(s.survey_url, "/survey");
        assert_eq!(s.workers.concurrency, 4);
        assert_eq!(s.workers.max_attempts, 1);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quire.toml");
        std::fs::write(
            &path,
            "validate = false\ntime_limit_secs = 600\n\n[workers]\nconcurrency = 8\n",
        )
        .unwrap();

        let s = Settings::load(&path).unwrap();
        assert!(!s.validate);
        assert_eq!(s.time_limit(), Some(Duration::minutes(10)));
        assert_eq!(s.workers.concurrency, 8);
        assert_eq!(s.workers.max_attempts, 1);
        assert_eq!(s.survey_url, "/survey");
    }

    #[test]
    fn test_bad_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quire.toml");
        std::fs::write(&path, "validate = \"sometimes\"").unwrap();
        assert!(matches!(Settings::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let s = Settings::default()
            .with_overrides(env(&[
                ("QUIRE_VALIDATE", "off"),
                ("QUIRE_TIME_LIMIT_SECS", "90"),
                ("QUIRE_SURVEY_URL", "/s"),
                ("QUIRE_WORKERS", "2"),
                ("QUIRE_JOB_ATTEMPTS", "3"),
                ("QUIRE_JOB_RESULT_TTL_SECS", "60"),
            ]))
            .unwrap();
        assert!(!s.validate);
        assert_eq!(s.time_limit_secs, Some(90));
        assert_eq!(s.survey_url, "/s");
        assert_eq!(
            s.workers,
            WorkerConfig {
                concurrency: 2,
                max_attempts: 3,
                result_ttl_secs: 60,
            }
        );
    }

    #[test]
    fn test_invalid_env_value() {
        let err = Settings::default()
            .with_overrides(env(&[("QUIRE_WORKERS", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "QUIRE_WORKERS", .. }));
    }
}
