use super::data::{
    path_display, Config, ExternalServer, BASE_URL_ENV_VAR, DEFAULT_BASE_URL,
    DEFAULT_ROUTE_PREFIX,
};
use super::io::ConfigError;
use crate::mcp::DEFAULT_PROTOCOL_VERSION;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_load_nonexistent_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent_config.toml");

    let config = Config::load_from_path(&config_path).expect("Failed to load config");

    assert_eq!(config, Config::default());
    assert_eq!(config.base_url(), DEFAULT_BASE_URL);
    assert_eq!(config.route_prefix(), DEFAULT_ROUTE_PREFIX);
    assert_eq!(config.protocol_version(), DEFAULT_PROTOCOL_VERSION);
    assert!(config.sends_initialized_notification());
    assert!(config.persists_sessions());
    assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    assert_eq!(config.request_timeout(), Duration::from_secs(60));
}

#[test]
fn test_config_persistence_lifecycle() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let mut config = Config {
        base_url: Some("https://dash.example.com".to_string()),
        route_prefix: Some("api/tools".to_string()),
        initialized_notification: Some(false),
        ..Default::default()
    };
    config.add_server(ExternalServer {
        id: "Search".to_string(),
        url: "https://search.example.com/mcp".to_string(),
    });
    config.save_to_path(&config_path).expect("Failed to save config");

    let loaded = Config::load_from_path(&config_path).expect("Failed to load config");
    assert_eq!(loaded, config);
    assert!(!loaded.sends_initialized_notification());

    let mut loaded = loaded;
    assert!(loaded.remove_server("search"));
    assert!(!loaded.remove_server("search"));
    loaded.save_to_path(&config_path).expect("Failed to save config");
    let reloaded = Config::load_from_path(&config_path).expect("Failed to reload config");
    assert!(reloaded.servers.is_empty());
}

#[test]
fn test_parse_error_names_the_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, "base_url = [").expect("write");

    let err = Config::load_from_path(&config_path).expect_err("invalid toml");
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().starts_with("Failed to parse config at "));
}

#[test]
fn test_servers_table_parses_from_toml() {
    let config: Config = toml::from_str(
        r#"
base_url = "http://localhost:9000"
request_timeout_seconds = 5

[[servers]]
id = "weather"
url = "https://weather.example.com/mcp"
"#,
    )
    .expect("parse");

    assert_eq!(config.base_url(), "http://localhost:9000");
    assert_eq!(config.request_timeout(), Duration::from_secs(5));
    assert_eq!(
        config.resolve_server_url("WEATHER"),
        "https://weather.example.com/mcp"
    );
    assert_eq!(
        config.resolve_server_url("https://other.example.com/mcp"),
        "https://other.example.com/mcp"
    );
}

#[test]
fn test_add_server_replaces_same_id() {
    let mut config = Config::default();
    config.add_server(ExternalServer {
        id: "a".to_string(),
        url: "https://one".to_string(),
    });
    config.add_server(ExternalServer {
        id: "A".to_string(),
        url: "https://two".to_string(),
    });
    assert_eq!(config.servers.len(), 1);
    assert_eq!(config.resolve_server_url("a"), "https://two");
}

#[test]
fn test_blank_protocol_version_falls_back() {
    let config = Config {
        protocol_version: Some("  ".to_string()),
        ..Default::default()
    };
    assert_eq!(config.protocol_version(), DEFAULT_PROTOCOL_VERSION);
}

#[test]
fn test_env_override_replaces_base_url() {
    let mut config = Config {
        base_url: Some("http://from-file".to_string()),
        ..Default::default()
    };
    std::env::set_var(BASE_URL_ENV_VAR, "http://from-env");
    config.apply_env_overrides();
    std::env::remove_var(BASE_URL_ENV_VAR);
    assert_eq!(config.base_url(), "http://from-env");
}

#[test]
fn test_path_display_uses_tilde_for_home() {
    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let path = std::path::PathBuf::from(home).join(".config/toolwire/config.toml");
            assert_eq!(path_display(&path), "~/.config/toolwire/config.toml");
        }
    }
}
