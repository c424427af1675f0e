//! Configuration resolution and the `check-config` command.

use std::path::{Path, PathBuf};

use serde_json::json;

use crate::adapter::inbound::cli::command::ConfigPathArg;
use crate::adapter::inbound::cli::output;
use crate::error::Result;
use crate::infrastructure::config::{Config, JWT_SECRET_ENV};

/// Configuration file looked up in the working directory.
pub const DEFAULT_CONFIG: &str = "config.toml";

/// Path that [`load`] reads, if any.
#[must_use]
pub fn resolve(arg: &ConfigPathArg) -> Option<PathBuf> {
    match &arg.config {
        Some(path) => Some(path.clone()),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG);
            default.exists().then_some(default)
        }
    }
}

/// Load the configuration named by `arg`, or built-in defaults when no
/// file is given and `config.toml` does not exist.
pub fn load(arg: &ConfigPathArg) -> Result<Config> {
    match resolve(arg) {
        Some(path) => Config::load(path),
        None => Config::parse_toml(""),
    }
}

fn source_label(path: Option<&Path>) -> String {
    path.map_or_else(|| "(defaults)".to_string(), |p| p.display().to_string())
}

/// Validate configuration and print the effective values.
pub fn execute(arg: &ConfigPathArg) -> Result<()> {
    let path = resolve(arg);
    let config = load(arg)?;
    let secret_present = config.require_secret().is_ok();

    if output::is_json() {
        output::document(&json!({
            "command": "check-config",
            "config": source_label(path.as_deref()),
            "valid": true,
            "secret_present": secret_present,
            "effective": config,
        }));
        return Ok(());
    }

    output::section("Configuration Check");
    output::field("Config", source_label(path.as_deref()));
    output::success("Configuration is valid");

    output::section("Summary");
    output::field("Bind address", &config.server.bind_address);
    output::field("Max connections", config.pool.max_connections);
    output::field("Per subject", config.pool.max_connections_per_subject);
    output::field("Per source", config.pool.max_connections_per_source);
    output::field("Idle timeout", format!("{}s", config.pool.idle_timeout_secs));
    output::field("Auth timeout", format!("{}s", config.server.auth_timeout_secs));
    output::field("Guest mode", config.auth.guest_mode);
    output::field(
        "Status file",
        config.server.status_file.as_deref().unwrap_or("disabled"),
    );

    if secret_present {
        output::success("Signing secret configured");
    } else {
        output::warning(&format!(
            "No signing secret (set auth.jwt_secret or {JWT_SECRET_ENV}); `serve` will refuse to start"
        ));
    }

    if output::verbosity() > 0 {
        output::section("Effective configuration");
        output::block(&config.to_toml()?);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_is_used_even_when_missing() {
        let arg = ConfigPathArg {
            config: Some(PathBuf::from("/nonexistent/wsgate.toml")),
        };
        assert_eq!(resolve(&arg), Some(PathBuf::from("/nonexistent/wsgate.toml")));
        assert!(load(&arg).is_err());
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gw.toml");
        std::fs::write(&path, "[pool]\nmax_connections = 42\n").unwrap();

        let config = load(&ConfigPathArg { config: Some(path) }).unwrap();
        assert_eq!(config.pool.max_connections, 42);
    }

    #[test]
    fn source_label_names_defaults() {
        assert_eq!(source_label(None), "(defaults)");
        assert_eq!(source_label(Some(Path::new("a.toml"))), "a.toml");
    }
}
