//! Service configuration
//!
//! Loaded in three layers: built-in defaults, an optional JSON5 file, then
//! environment variables. Every field has a default, so an empty file (or no
//! file) yields a runnable service.
//!
//! | Variable | Field |
//! |---|---|
//! | `HOST`, `PORT` | `server.host`, `server.port` |
//! | `REDIS_URL` | `leaderboard.redisUrl` |
//! | `LAMUMU_NS` | `leaderboard.namespace` |
//! | `X_BEARER_TOKEN` / `TWITTER_BEARER_TOKEN` | `avatar.bearerToken` |
//! | `AVATAR_SOURCES` | `avatar.sources` (comma-separated) |
//! | `LOG_LEVEL`, `LOG_FORMAT` | `logging.level`, `logging.format` |

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::avatar::config::{AvatarConfig, SourceKind};
use crate::leaderboard::config::LeaderboardConfig;
use crate::logging::{LogFormat, LoggingConfig};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "SENTIENT_RACE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
                key: "server.host".to_string(),
                message: e.to_string(),
            })
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub server: ServerConfig,
    pub avatar: AvatarConfig,
    pub leaderboard: LeaderboardConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load using the process environment. `path` wins over `SENTIENT_RACE_CONFIG`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Load with an injectable environment lookup.
    pub fn load_with_env<F>(path: Option<&Path>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env(CONFIG_PATH_ENV).filter(|p| !p.trim().is_empty()).map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(env)?;
        Ok(config)
    }

    /// Parse a JSON5 file without applying environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        json5::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn apply_env<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("PORT") {
            self.server.port = port.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidValue {
                    key: "PORT".to_string(),
                    message: e.to_string(),
                }
            })?;
        }

        if let Some(url) = get("REDIS_URL") {
            self.leaderboard.redis_url = Some(url);
        }
        if let Some(ns) = get("LAMUMU_NS") {
            self.leaderboard.namespace = Some(ns);
        }

        if let Some(token) = get("X_BEARER_TOKEN").or_else(|| get("TWITTER_BEARER_TOKEN")) {
            self.avatar.bearer_token = Some(token);
        }
        if let Some(list) = get("AVATAR_SOURCES") {
            self.avatar.sources = parse_source_list(&list)?;
        }

        if let Some(level) = get("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = get("LOG_FORMAT") {
            self.logging.format =
                format
                    .parse::<LogFormat>()
                    .map_err(|e| ConfigError::InvalidValue {
                        key: "LOG_FORMAT".to_string(),
                        message: e.to_string(),
                    })?;
        }
        Ok(())
    }

    /// Pretty JSON with secrets omitted, for `config show`.
    pub fn to_redacted_json(&self) -> String {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if self.avatar.bearer_token.is_some() {
            value["avatar"]["bearerToken"] = serde_json::json!("[REDACTED]");
        }
        if self.leaderboard.redis_url.is_some() {
            value["leaderboard"]["redisUrl"] = serde_json::json!("[REDACTED]");
        }
        serde_json::to_string_pretty(&value).unwrap_or_default()
    }
}

fn parse_source_list(list: &str) -> Result<Vec<SourceKind>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<SourceKind>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "AVATAR_SOURCES".to_string(),
                    message: e.to_string(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_file_or_env() {
        let cfg = Config::load_with_env(None, env_of(&[])).unwrap();
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.leaderboard.redis_url, None);
        assert_eq!(cfg.leaderboard.effective_namespace(), "sentient-race");
        assert_eq!(cfg.avatar.fetch_timeout_ms, 6000);
        assert_eq!(cfg.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_json5_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                // local dev
                server: {{ port: 8080 }},
                avatar: {{ sources: ["redirect", "public"], fetchTimeoutMs: 1500 }},
                leaderboard: {{ namespace: "dev" }},
                logging: {{ format: "text" }},
            }}"#
        )
        .unwrap();

        let cfg = Config::load_with_env(Some(file.path()), env_of(&[])).unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.avatar.sources, vec![SourceKind::Redirect, SourceKind::Public]);
        assert_eq!(cfg.avatar.fetch_timeout_ms, 1500);
        assert_eq!(cfg.avatar.attempt_timeout_ms, 7000);
        assert_eq!(cfg.leaderboard.effective_namespace(), "dev");
        assert_eq!(cfg.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_path_from_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ server: {{ port: 9999 }} }}").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let cfg = Config::load_with_env(None, env_of(&[(CONFIG_PATH_ENV, path.as_str())])).unwrap();
        assert_eq!(cfg.server.port, 9999);
    }

    #[test]
    fn test_empty_file_is_default() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let cfg = Config::load_with_env(Some(file.path()), env_of(&[])).unwrap();
        assert_eq!(cfg.server, ServerConfig::default());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ server: {{ port: 8080 }}, leaderboard: {{ namespace: 'file' }} }}").unwrap();

        let cfg = Config::load_with_env(
            Some(file.path()),
            env_of(&[
                ("PORT", "4000"),
                ("HOST", "127.0.0.1"),
                ("REDIS_URL", "rediss://cache:6380"),
                ("LAMUMU_NS", "  season-3 "),
                ("TWITTER_BEARER_TOKEN", "legacy"),
                ("AVATAR_SOURCES", "official, aggregator-json ,public"),
                ("LOG_LEVEL", "debug"),
                ("LOG_FORMAT", "text"),
            ]),
        )
        .unwrap();

        assert_eq!(cfg.server.socket_addr().unwrap().to_string(), "127.0.0.1:4000");
        assert_eq!(cfg.leaderboard.redis_url.as_deref(), Some("rediss://cache:6380"));
        assert_eq!(cfg.leaderboard.effective_namespace(), "season-3");
        assert_eq!(cfg.avatar.bearer_token.as_deref(), Some("legacy"));
        assert_eq!(
            cfg.avatar.sources,
            vec![SourceKind::Official, SourceKind::AggregatorJson, SourceKind::Public]
        );
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_primary_token_wins_over_alias() {
        let cfg = Config::load_with_env(
            None,
            env_of(&[("X_BEARER_TOKEN", "primary"), ("TWITTER_BEARER_TOKEN", "legacy")]),
        )
        .unwrap();
        assert_eq!(cfg.avatar.bearer_token.as_deref(), Some("primary"));
    }

    #[test]
    fn test_invalid_env_values() {
        assert!(matches!(
            Config::load_with_env(None, env_of(&[("PORT", "http")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            Config::load_with_env(None, env_of(&[("AVATAR_SOURCES", "official,gravatar")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            Config::load_with_env(None, env_of(&[("LOG_FORMAT", "xml")])),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::from_file(&dir.path().join("absent.json5")),
            Err(ConfigError::Io { .. })
        ));

        let bad = dir.path().join("bad.json5");
        std::fs::write(&bad, "{ server: ").unwrap();
        assert!(matches!(Config::from_file(&bad), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_redacted_json_hides_secrets() {
        let cfg = Config::load_with_env(
            None,
            env_of(&[("X_BEARER_TOKEN", "s3cret"), ("REDIS_URL", "redis://:pw@host")]),
        )
        .unwrap();
        let shown = cfg.to_redacted_json();
        assert!(!shown.contains("s3cret"));
        assert!(!shown.contains(":pw@"));
        assert!(shown.contains("[REDACTED]"));
        assert!(!format!("{cfg:?}").contains("s3cret"));
    }
}
