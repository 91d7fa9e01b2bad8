use rstest::rstest;
use shelf_config::{load_file, load_toml};
use std::fs;
use tempfile::tempdir;

const BASE: &str = r#"
[device]
id_prefix = "ESP32S3"

[wifi]
networks = [{ ssid = "store-main", password = "pw1" }, { ssid = "store-backup", password = "pw2" }]
attempt_timeout_ms = 10000
poll_ms = 60000

[broker]
host = "raspberrypi.local"
fallback_addr = "192.168.1.100"
port = 1883
reconnect_ms = 5000

[[slots]]
id = "A1"
gpio = 4

[[slots]]
id = "A2"
gpio = 5

[[slots]]
id = "B1"
gpio = 6
"#;

#[test]
fn accepts_complete_config() {
    let cfg = load_toml(BASE).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.slots.len(), 3);
    assert_eq!(cfg.wifi.networks[1].ssid, "store-backup");
    assert_eq!(cfg.broker.fallback_addr.to_string(), "192.168.1.100");
}

#[rstest]
#[case("attempt_timeout_ms = 10000", "attempt_timeout_ms = 0", "wifi.attempt_timeout_ms must be >= 1")]
#[case("poll_ms = 60000", "poll_ms = 0", "wifi.poll_ms must be >= 1")]
#[case("reconnect_ms = 5000", "reconnect_ms = 0", "broker.reconnect_ms must be >= 1")]
#[case("port = 1883", "port = 0", "broker.port must be > 0")]
#[case("host = \"raspberrypi.local\"", "host = \"  \"", "broker.host must not be empty")]
#[case("id = \"A2\"", "id = \"A1\"", "is duplicated")]
#[case("id = \"A2\"", "id = \"a2\"", "uppercase letters and digits")]
#[case("id = \"A2\"", "id = \"SHELFNUMBER12\"", "at most 11 characters")]
#[case("gpio = 5", "gpio = 4", "used by another slot")]
#[case("ssid = \"store-main\"", "ssid = \"\"", "ssid must be 1..=32 bytes")]
#[case("id_prefix = \"ESP32S3\"", "id = \" SHELF_1\"", "device.id must be non-empty, without whitespace")]
#[case("id_prefix = \"ESP32S3\"", "id = \"SHELF/1\"", "device.id must be non-empty")]
#[case("id_prefix = \"ESP32S3\"", "id_prefix = \"ESP+S3\"", "device.id_prefix must be non-empty")]
#[case("id_prefix = \"ESP32S3\"", "id_prefix = \"ESP S3\"", "device.id_prefix must be non-empty")]
fn rejects_invalid_values(#[case] from: &str, #[case] to: &str, #[case] needle: &str) {
    let toml = BASE.replacen(from, to, 1);
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}").contains(needle),
        "expected {needle:?} in {err}"
    );
}

#[test]
fn rejects_min_valid_above_samples() {
    let toml = format!("{BASE}\n[calibration]\nsamples = 4\nmin_valid = 5\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(format!("{err}").contains("calibration.min_valid"));
}

#[test]
fn rejects_inverted_range() {
    let toml = format!("{BASE}\n[ranging]\nmin_mm = 4000\nmax_mm = 20\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(format!("{err}").contains("ranging.min_mm must be < ranging.max_mm"));
}

#[test]
fn rejects_empty_network_list() {
    let toml = BASE.replacen(
        r#"networks = [{ ssid = "store-main", password = "pw1" }, { ssid = "store-backup", password = "pw2" }]"#,
        "networks = []",
        1,
    );
    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(format!("{err}").contains("at least one network"));
}

#[test]
fn rejects_unknown_rotation() {
    let toml = format!("{BASE}\n[logging]\nrotation = \"weekly\"\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    assert!(cfg.validate().is_err());
}

#[test]
fn bad_fallback_address_fails_to_parse() {
    let toml = BASE.replacen("192.168.1.100", "not-an-ip", 1);
    assert!(load_toml(&toml).is_err());
}

#[test]
fn load_file_reports_path_on_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("node.toml");
    fs::write(&path, "[wifi]\nnetworks = 3\n").unwrap();
    let err = load_file(&path).expect_err("should fail");
    let msg = format!("{err}");
    assert!(msg.contains("invalid configuration"));
    assert!(msg.contains("node.toml"));
}

#[test]
fn load_file_validates() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("node.toml");
    fs::write(&path, BASE.replacen("poll_ms = 60000", "poll_ms = 0", 1)).unwrap();
    let err = load_file(&path).expect_err("should fail validation");
    assert!(format!("{err}").contains("wifi.poll_ms"));
}
