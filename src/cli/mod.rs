//! CLI subcommand definitions and handlers.
//!
//! - `serve` (default): run the HTTP service
//! - `resolve <handle>`: run the avatar pipeline once
//! - `config show|get`: print the loaded configuration
//! - `version`: print build/version info

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use crate::avatar::{cache_control, AvatarResolver, Handle, SizeToken};
use crate::config::Config;

/// Avatar proxy and leaderboard service for Sentient Race.
#[derive(Parser, Debug)]
#[command(
    name = "sentient-race",
    version = env!("CARGO_PKG_VERSION"),
    about = "Avatar proxy and leaderboard service for Sentient Race"
)]
pub struct Cli {
    /// JSON5 config file (overrides SENTIENT_RACE_CONFIG).
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP service (default when no subcommand is given).
    Serve,

    /// Resolve one handle through the avatar pipeline and print what was served.
    Resolve {
        /// Handle to look up; a leading `@` is fine.
        handle: String,

        /// mini, normal, bigger, 400x400 or original.
        #[arg(short, long, default_value = "400x400")]
        size: SizeToken,

        /// Write the image bytes to this file.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Inspect configuration.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Print version, build date, and git commit information.
    Version,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the fully loaded configuration (secrets redacted) as JSON.
    Show,

    /// Print a single value by dot-notation path (e.g. "avatar.sources").
    Get { key: String },
}

/// Run the `config show` subcommand.
pub fn handle_config_show(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", config.to_redacted_json());
    Ok(())
}

/// Run the `config get <key>` subcommand.
pub fn handle_config_get(config: &Config, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let root: Value = serde_json::from_str(&config.to_redacted_json())?;
    match get_value_at_path(&root, key) {
        Some(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        None => Err(format!("Key not found: {}", key).into()),
    }
}

/// Run the `resolve` subcommand.
pub async fn handle_resolve(
    config: &Config,
    handle: &str,
    size: SizeToken,
    out: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let resolver = AvatarResolver::from_config(&config.avatar);
    let handle = Handle::normalize(handle);
    let image = resolver.resolve(&handle, size).await;

    if let Some(path) = out {
        std::fs::write(path, &image.bytes)?;
    }

    let summary = json!({
        "handle": handle.as_str(),
        "size": size.as_str(),
        "source": image.source,
        "tier": image.tier.as_str(),
        "contentType": image.content_type,
        "bytes": image.bytes.len(),
        "etag": image.etag(),
        "cacheControl": cache_control(&image),
        "written": out.map(|p| p.display().to_string()),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Run the `version` subcommand.
pub fn handle_version() {
    println!("sentient-race {}", env!("CARGO_PKG_VERSION"));
    println!("  Build date: {}", env!("SENTIENT_RACE_BUILD_DATE"));
    println!("  Git commit: {}", env!("SENTIENT_RACE_GIT_HASH"));
    println!(
        "  Platform:   {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

/// Navigate a JSON value by dot-notation path and return the leaf value.
fn get_value_at_path(root: &Value, path: &str) -> Option<Value> {
    let mut current = root;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_no_args_defaults_to_none() {
        let cli = Cli::try_parse_from(["sentient-race"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config_path.is_none());
    }

    #[test]
    fn test_cli_serve_with_config() {
        let cli = Cli::try_parse_from(["sentient-race", "serve", "--config", "dev.json5"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Serve)));
        assert_eq!(cli.config_path, Some(PathBuf::from("dev.json5")));
    }

    #[test]
    fn test_cli_resolve() {
        let cli = Cli::try_parse_from([
            "sentient-race",
            "resolve",
            "@Someone",
            "--size",
            "original",
            "--out",
            "a.png",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Resolve {
                ref handle,
                size,
                ref out,
            }) => {
                assert_eq!(handle, "@Someone");
                assert_eq!(size, SizeToken::Original);
                assert_eq!(out.as_deref(), Some(Path::new("a.png")));
            }
            other => panic!("Expected Resolve, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_resolve_default_size() {
        let cli = Cli::try_parse_from(["sentient-race", "resolve", "x"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Resolve {
                size: SizeToken::Large,
                ..
            })
        ));
    }

    #[test]
    fn test_cli_rejects_unknown_size() {
        assert!(Cli::try_parse_from(["sentient-race", "resolve", "x", "--size", "huge"]).is_err());
    }

    #[test]
    fn test_cli_config_subcommands() {
        let cli = Cli::try_parse_from(["sentient-race", "config", "show"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Config(ConfigCommand::Show))));

        let cli = Cli::try_parse_from(["sentient-race", "config", "get", "server.port"]).unwrap();
        match cli.command {
            Some(Command::Config(ConfigCommand::Get { ref key })) => assert_eq!(key, "server.port"),
            other => panic!("Expected Config(Get), got {:?}", other),
        }
    }

    #[test]
    fn test_cli_version_subcommand() {
        let cli = Cli::try_parse_from(["sentient-race", "version"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Version)));
    }

    #[test]
    fn test_get_value_at_path() {
        let root = json!({ "server": { "port": 3000 } });
        assert_eq!(get_value_at_path(&root, "server.port"), Some(json!(3000)));
        assert_eq!(get_value_at_path(&root, "server.nope"), None);
        assert_eq!(get_value_at_path(&root, "server.port.deeper"), None);
    }

    #[test]
    fn test_config_get_missing_key_errors() {
        assert!(handle_config_get(&Config::default(), "nope.nothing").is_err());
        assert!(handle_config_get(&Config::default(), "server.port").is_ok());
    }
}
