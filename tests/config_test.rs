//! Tests for config loading

use std::io::Write;

use adrotate::config::Config;
use adrotate::session::SessionBackend;
use serial_test::serial;
use tempfile::NamedTempFile;

const ENV_KEYS: &[&str] = &[
    "ADROTATE_AD_SCRIPTS",
    "ADROTATE_VIEWS_PER_AD",
    "ADROTATE_UTC_OFFSET",
    "ADROTATE_BIND",
    "ADROTATE_SESSION_BACKEND",
];

fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_full_config_file() {
    let file = write_config(
        r#"
[server]
bind_address = "127.0.0.1:9090"
enable_cors = false
api_key = "admin-key"

[rotation]
views_per_ad = 3
utc_offset = "-05:00"
ad_scripts = """
<script src="https://ads.example.com/a.js"></script>

<script src="https://ads.example.com/b.js"></script>
"""

[session]
backend = "memory"
cookie_name = "rot_sid"
ttl_secs = 3600

[gate]
auth_cookie_prefixes = ["wordpress_logged_in_", "sessionid"]
extra_bot_signatures = ["HeadlessChrome"]

[logging]
level = "debug"
format = "json"
"#,
    );

    let config = Config::load(Some(file.path())).unwrap();

    assert_eq!(config.server.bind_address.port(), 9090);
    assert!(!config.server.enable_cors);
    assert_eq!(config.server.api_key.as_deref(), Some("admin-key"));
    assert_eq!(config.session.cookie_name, "rot_sid");
    assert_eq!(config.session.ttl_secs, 3600);
    assert_eq!(config.gate.auth_cookie_prefixes.len(), 2);
    assert_eq!(config.logging.format, "json");

    let rotation = config.rotation.rotation_config().unwrap();
    assert_eq!(rotation.len(), 2);
    assert_eq!(rotation.views_per_ad(), 3);
    assert_eq!(
        config.rotation.clock().unwrap().offset().local_minus_utc(),
        -5 * 3600
    );
}

#[test]
fn test_ad_scripts_file_takes_precedence() {
    let ads = write_config("<a>\n<b>\n\n<c>\n");
    let file = write_config(&format!(
        "[rotation]\nad_scripts = \"<inline>\"\nad_scripts_file = {:?}\n",
        ads.path().display().to_string()
    ));

    let config = Config::load(Some(file.path())).unwrap();
    let rotation = config.rotation.rotation_config().unwrap();
    assert_eq!(rotation.ads(), &["<a>", "<b>", "<c>"]);
}

#[test]
fn test_invalid_files_rejected() {
    let bad_toml = write_config("[rotation\nviews_per_ad = 3");
    assert!(Config::load(Some(bad_toml.path())).is_err());

    let bad_backend = write_config("[session]\nbackend = \"sqlite\"\n");
    assert!(Config::load(Some(bad_backend.path())).is_err());

    let bad_offset = write_config("[rotation]\nutc_offset = \"Asia/Seoul\"\n");
    assert!(Config::load(Some(bad_offset.path())).is_err());

    let missing = std::path::Path::new("/nonexistent/adrotate.toml");
    assert!(Config::load(Some(missing)).is_err());
}

#[test]
fn test_negative_threshold_loads_and_clamps() {
    let file = write_config("[rotation]\nad_scripts = \"A\"\nviews_per_ad = -4\n");
    let config = Config::load(Some(file.path())).unwrap();
    assert_eq!(config.rotation.rotation_config().unwrap().views_per_ad(), 1);
}

#[test]
#[serial]
fn test_from_env() {
    clear_env();
    std::env::set_var("ADROTATE_AD_SCRIPTS", "<x>\n<y>");
    std::env::set_var("ADROTATE_VIEWS_PER_AD", "2");
    std::env::set_var("ADROTATE_UTC_OFFSET", "+05:30");
    std::env::set_var("ADROTATE_BIND", "127.0.0.1:7000");

    let config = Config::load(None).unwrap();
    clear_env();

    assert_eq!(config.rotation.rotation_config().unwrap().daily_quota(), 4);
    assert_eq!(config.rotation.utc_offset, "+05:30");
    assert_eq!(config.server.bind_address.port(), 7000);
}

#[test]
#[serial]
fn test_from_env_rejects_unknown_backend() {
    clear_env();
    std::env::set_var("ADROTATE_SESSION_BACKEND", "cassandra");
    let result = Config::from_env();
    clear_env();

    assert!(result.is_err());
}

#[test]
#[serial]
fn test_from_env_defaults() {
    clear_env();
    let config = Config::from_env().unwrap();

    assert_eq!(config.session.backend, SessionBackend::Memory);
    assert_eq!(config.rotation.views_per_ad, 5);
    assert!(config.rotation.rotation_config().unwrap().is_empty());
}
