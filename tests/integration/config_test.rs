use tempfile::TempDir;
use ufora::core::{Config, ConfigKey, Course, SessionStore, TwoFactorMethod};

use super::support::cookie;

#[test]
fn test_config_default() {
    let config = Config::default();
    assert!(config.email.is_none());
    assert!(config.base_directory.is_none());
    assert_eq!(config.twofa_method, TwoFactorMethod::App);
    assert!(config.base_directory().ends_with("uni"));
}

#[test]
fn test_config_load_missing_file_returns_default() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::load_from(&temp_dir.path().join("config.json")).unwrap();
    assert!(config.courses.is_empty());
}

#[test]
fn test_config_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("config.json");

    let mut config = Config::default();
    config.set(ConfigKey::DefaultEmail, "student@ugent.be").unwrap();
    config.set(ConfigKey::BaseDirectory, "/data/uni").unwrap();
    config.set(ConfigKey::TwoFactorMethod, "SMS").unwrap();
    config.courses = vec![Course {
        id: "101".to_string(),
        code: "C003".to_string(),
        name: "Algoritmen".to_string(),
        title: "C003 - Algoritmen".to_string(),
        start: None,
    }];
    config.save_to(&path).unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("\"2fa_method\""), "method is stored under its legacy key");

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded.email.as_deref(), Some("student@ugent.be"));
    assert_eq!(loaded.base_directory().to_str(), Some("/data/uni"));
    assert_eq!(loaded.twofa_method, TwoFactorMethod::Sms);
    assert_eq!(loaded.course_by_index(1).map(|c| c.id.as_str()), Some("101"));
    assert!(loaded.course_by_index(0).is_none());
    assert!(loaded.course_by_index(2).is_none());
}

#[test]
fn test_config_rejects_bad_values() {
    let mut config = Config::default();
    assert!(config.set(ConfigKey::DefaultEmail, "not-an-email").is_err());
    assert!(config.set(ConfigKey::TwoFactorMethod, "carrier pigeon").is_err());
    assert!(config.set(ConfigKey::BaseDirectory, "   ").is_err());
    assert!(config.email.is_none());
}

#[test]
fn test_config_keys_parse_by_name() {
    for key in ConfigKey::ALL {
        assert_eq!(key.name().parse::<ConfigKey>().unwrap(), key);
    }
    assert!("work".parse::<ConfigKey>().is_err());
}

#[test]
fn test_corrupt_config_falls_back_to_default() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    let config = Config::load_from(&path).unwrap();
    assert!(config.email.is_none());
}

#[test]
fn test_session_store_roundtrip_and_clear() {
    let temp_dir = TempDir::new().unwrap();
    let store = SessionStore::new(temp_dir.path().join("session.json"));
    assert!(store.load().is_none());

    let session = ufora::core::Session::new(vec![cookie("d2lSessionVal", "abc")]);
    store.save(&session).unwrap();
    let loaded = store.load().expect("stored session loads");
    assert_eq!(loaded.cookies(), session.cookies());
    assert!(loaded.is_valid());

    store.clear().unwrap();
    assert!(store.load().is_none());
    store.clear().unwrap();
}
