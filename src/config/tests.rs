use super::load_config;
use super::settings::Settings;
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.mqtt.broker, "localhost");
    assert_eq!(settings.mqtt.port, 1883);
    assert_eq!(settings.mqtt.keepalive_secs, 60);
    assert_eq!(settings.mqtt.reconnect_base_delay_ms, 1_000);
    assert_eq!(settings.mqtt.reconnect_max_delay_ms, 300_000);
    assert!(settings.mqtt.birth_message.is_none());
    assert_eq!(settings.persistence.path, "hub_state_db");
    assert_eq!(settings.logging.level, "info");
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [mqtt]
        broker = "mqtt.local"
        port = 8883
        reconnect_base_delay_ms = 500

        [mqtt.birth_message]
        topic = "hub/status"
        payload = "online"
        retain = true

        [logging]
        level = "debug"
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let cfg = load_config();
    env::set_current_dir(orig).expect("restore cwd");
    let cfg = cfg.expect("load_config failed");

    assert_eq!(cfg.mqtt.broker, "mqtt.local");
    assert_eq!(cfg.mqtt.port, 8883);
    assert_eq!(cfg.mqtt.reconnect_base_delay_ms, 500);
    assert_eq!(cfg.mqtt.reconnect_max_delay_ms, 300_000);
    let birth = cfg.mqtt.birth_message.expect("birth message");
    assert_eq!(birth.topic, "hub/status");
    assert_eq!(birth.payload, "online");
    assert_eq!(birth.qos, 0);
    assert!(birth.retain);
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.persistence.path, "hub_state_db");
}

#[test]
#[serial]
fn load_config_reads_prefixed_environment() {
    temp_env::with_vars(
        [
            ("HUB__MQTT__BROKER", Some("broker.example")),
            ("HUB__PERSISTENCE__PATH", Some("/var/lib/hub")),
        ],
        || {
            let cfg = load_config().expect("load_config failed");
            assert_eq!(cfg.mqtt.broker, "broker.example");
            assert_eq!(cfg.persistence.path, "/var/lib/hub");
            assert_eq!(cfg.mqtt.port, 1883);
        },
    );
}
