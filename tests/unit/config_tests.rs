use std::path::PathBuf;
use std::time::Duration;

use bot_supervisor::{config::GlobalConfig, AppError};

const SAMPLE: &str = r#"
[server]
url = "https://control.example.com:8443"

[bot]
directory = "/srv/bots"
auto_restart = false
start_on_boot = true
interpreter = "python3"
script_extension = "py"

[system]
heartbeat_interval = 15
name = "garage-pi"
"#;

#[test]
fn empty_file_yields_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("empty config is valid");

    assert_eq!(config.server.url, "http://localhost:3001");
    assert_eq!(config.bot.directory, PathBuf::from("/home/pi/bots"));
    assert!(config.bot.auto_restart);
    assert!(!config.bot.start_on_boot);
    assert_eq!(config.bot.interpreter, "node");
    assert_eq!(config.bot.script_extension, "js");
    assert_eq!(config.system.heartbeat_interval, 30);
    assert_eq!(config.system.name, "RaspberryPi-01");
    assert_eq!(config, GlobalConfig::default());
}

#[test]
fn parses_every_section() {
    let config = GlobalConfig::from_toml_str(SAMPLE).expect("valid config");

    assert_eq!(config.server.url, "https://control.example.com:8443");
    assert_eq!(config.bot.directory, PathBuf::from("/srv/bots"));
    assert!(!config.bot.auto_restart);
    assert!(config.bot.start_on_boot);
    assert_eq!(config.bot.interpreter, "python3");
    assert_eq!(config.bot.script_extension, "py");
    assert_eq!(config.system.name, "garage-pi");
    assert_eq!(config.heartbeat_interval(), Duration::from_secs(15));
}

#[test]
fn partial_sections_keep_remaining_defaults() {
    let config = GlobalConfig::from_toml_str("[system]\nname = \"shed\"\n").expect("valid config");

    assert_eq!(config.system.name, "shed");
    assert_eq!(config.system.heartbeat_interval, 30);
    assert_eq!(config.server.url, "http://localhost:3001");
}

#[test]
fn rejects_zero_heartbeat_interval() {
    let result = GlobalConfig::from_toml_str("[system]\nheartbeat_interval = 0\n");

    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn rejects_non_http_server_url() {
    let result = GlobalConfig::from_toml_str("[server]\nurl = \"ftp://files.example.com\"\n");
    assert!(matches!(result, Err(AppError::Config(_))));

    let result = GlobalConfig::from_toml_str("[server]\nurl = \"not a url\"\n");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn rejects_dotted_or_empty_extension() {
    let dotted = GlobalConfig::from_toml_str("[bot]\nscript_extension = \".js\"\n");
    let empty = GlobalConfig::from_toml_str("[bot]\nscript_extension = \"\"\n");

    assert!(matches!(dotted, Err(AppError::Config(_))));
    assert!(matches!(empty, Err(AppError::Config(_))));
}

#[test]
fn rejects_blank_host_name_and_interpreter() {
    assert!(GlobalConfig::from_toml_str("[system]\nname = \"  \"\n").is_err());
    assert!(GlobalConfig::from_toml_str("[bot]\ninterpreter = \"\"\n").is_err());
}

#[test]
fn malformed_toml_is_a_config_error() {
    let err = GlobalConfig::from_toml_str("[server\nurl = 3").expect_err("must fail");

    assert!(matches!(err, AppError::Config(_)));
    assert!(err.to_string().starts_with("config: invalid config"));
}

#[test]
fn load_or_init_writes_default_file_when_missing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("nested").join("config.toml");

    let config = GlobalConfig::load_or_init(&path).expect("defaults");

    assert_eq!(config, GlobalConfig::default());
    assert!(path.is_file(), "default config file should be written");
    let reloaded = GlobalConfig::load_from_path(&path).expect("written file parses");
    assert_eq!(reloaded, config);
}

#[test]
fn load_or_init_reads_existing_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("config.toml");
    std::fs::write(&path, SAMPLE).expect("write config");

    let config = GlobalConfig::load_or_init(&path).expect("valid config");

    assert_eq!(config.system.name, "garage-pi");
}

#[test]
fn load_or_init_fails_on_invalid_existing_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("config.toml");
    std::fs::write(&path, "[system]\nheartbeat_interval = 0\n").expect("write config");

    assert!(GlobalConfig::load_or_init(&path).is_err());
}
