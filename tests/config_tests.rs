//! Configuration loading from files on disk.

use std::path::PathBuf;

use wsgate::infrastructure::config::{Config, ServerConfig};

fn example_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config.example.toml")
}

#[test]
fn example_config_loads_with_documented_defaults() {
    let config = Config::load(example_path()).unwrap();

    let mut expected = Config::default();
    expected.server = ServerConfig {
        status_file: Some("/tmp/wsgate-status.json".to_string()),
        ..ServerConfig::default()
    };
    expected.auth.jwt_secret = config.auth.jwt_secret.clone();
    assert_eq!(config, expected);
}

#[test]
fn missing_file_is_a_read_error() {
    let err = Config::load("/nonexistent/wsgate.toml").unwrap_err();
    assert!(err.to_string().to_lowercase().contains("read"), "{err}");
}

#[test]
fn invalid_file_names_the_field() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[pool]\nmax_connections = 0\n").unwrap();

    let err = Config::load(&path).unwrap_err();
    assert!(err.to_string().contains("max_connections"), "{err}");
}

#[test]
fn rendered_config_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rendered.toml");
    let config = Config::load(example_path()).unwrap();
    std::fs::write(&path, config.to_toml().unwrap()).unwrap();

    let reloaded = Config::load(&path).unwrap();
    assert_eq!(reloaded.pool, config.pool);
    assert_eq!(reloaded.server, config.server);
}
