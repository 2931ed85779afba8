use serial_test::serial;

use crate::Settings;

// Env overrides are matched under both prefix-separator conventions so
// the assertions don't depend on the config crate's default.
const ENV_KEYS: [&str; 2] = [
    "PULLEY__CONSUMER__ACK_WAIT_IN_MS",
    "PULLEY_CONSUMER__ACK_WAIT_IN_MS",
];

#[test]
#[serial]
fn test_defaults_without_sources() {
    temp_env::with_vars(
        ENV_KEYS.map(|key| (key, None::<&str>)),
        || {
            let settings = Settings::load(None).unwrap();
            assert_eq!(settings.consumer.ack_wait_in_ms, 30_000);
            assert_eq!(settings.consumer.max_ack_pending, 1000);
            assert_eq!(settings.flow.min_batch, 10);
            assert_eq!(settings.stream.num_replicas, 3);
        },
    );
}

#[test]
#[serial]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pulley.toml");
    std::fs::write(
        &path,
        r#"
[consumer]
ack_wait_in_ms = 5000

[flow]
min_batch = 5

[stream]
num_replicas = 1
"#,
    )
    .unwrap();

    temp_env::with_vars(ENV_KEYS.map(|key| (key, None::<&str>)), || {
        let settings = Settings::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(settings.consumer.ack_wait_in_ms, 5000);
        assert_eq!(settings.flow.min_batch, 5);
        assert_eq!(settings.stream.num_replicas, 1);
        // Untouched sections keep their defaults.
        assert_eq!(settings.consumer.max_ack_pending, 1000);
    });
}

#[test]
#[serial]
fn test_env_overrides() {
    temp_env::with_vars(ENV_KEYS.map(|key| (key, Some("7000"))), || {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.consumer.ack_wait_in_ms, 7000);
    });
}

#[test]
#[serial]
fn test_invalid_settings_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pulley.toml");
    std::fs::write(
        &path,
        r#"
[consumer]
ack_wait_in_ms = 0
"#,
    )
    .unwrap();

    temp_env::with_vars(ENV_KEYS.map(|key| (key, None::<&str>)), || {
        assert!(Settings::load(Some(path.to_str().unwrap())).is_err());
    });
}
