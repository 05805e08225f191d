use nightmother_daemon::config::Config;
use nightmother_daemon::error::ConfigError;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

const MINIMAL: &str = r#"
[logging]
file = "logs/nightmother.log"

[database]
path = "data/events.db"

[agent]
check_interval = 60
"#;

#[test]
fn test_load_from_toml() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(MINIMAL.as_bytes()).unwrap();
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.logging.file, Path::new("logs/nightmother.log"));
    assert_eq!(config.database.path, Path::new("data/events.db"));
    assert_eq!(config.check_interval().unwrap(), Duration::from_secs(60));
}

#[test]
fn test_optional_values_have_defaults() {
    let config = Config::from_toml_str(MINIMAL).unwrap();
    assert_eq!(config.detection.cpu_threshold_percent, 70.0);
    assert_eq!(config.sample_window(), Duration::from_millis(100));
}

#[test]
fn test_fractional_interval_and_overrides() {
    let toml = r#"
[logging]
file = "agent.log"

[database]
path = "events.db"

[agent]
check_interval = 0.5
sample_window_ms = 250

[detection]
cpu_threshold_percent = 85.5
"#;
    let config = Config::from_toml_str(toml).unwrap();
    assert_eq!(config.check_interval().unwrap(), Duration::from_millis(500));
    assert_eq!(config.sample_window(), Duration::from_millis(250));
    assert_eq!(config.detection.cpu_threshold_percent, 85.5);
}

#[test]
fn test_missing_section_is_parse_error() {
    let toml = r#"
[logging]
file = "agent.log"

[agent]
check_interval = 5
"#;
    assert!(matches!(Config::from_toml_str(toml), Err(ConfigError::Parse(_))));
}

#[test]
fn test_non_positive_interval_is_rejected() {
    for interval in ["0", "-3", "nan", "inf"] {
        let toml = MINIMAL.replace("check_interval = 60", &format!("check_interval = {interval}"));
        match Config::from_toml_str(&toml) {
            Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, "agent.check_interval"),
            other => panic!("interval {interval} accepted: {other:?}"),
        }
    }
}

#[test]
fn test_bad_threshold_and_window_are_rejected() {
    let toml = format!("{MINIMAL}sample_window_ms = 0\n");
    assert!(matches!(
        Config::from_toml_str(&toml),
        Err(ConfigError::Invalid { key: "agent.sample_window_ms", .. })
    ));

    let toml = format!("{MINIMAL}\n[detection]\ncpu_threshold_percent = -1.0\n");
    assert!(matches!(
        Config::from_toml_str(&toml),
        Err(ConfigError::Invalid { key: "detection.cpu_threshold_percent", .. })
    ));
}

#[test]
fn test_missing_file_is_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = Config::load(&dir.path().join("nope.toml"));
    assert!(matches!(result, Err(ConfigError::Read { .. })));
}
