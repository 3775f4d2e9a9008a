use ezmb::config::{load_config, ConfigError, Endpoint};
use ezmb::core::queue::OverflowPolicy;
use ezmb::Topology;

fn write_temp(name: &str, body: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("{name}_{}.toml", std::process::id()));
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn loads_the_sample_config() {
    let cfg = load_config("ezmb.toml").expect("sample config should load");
    assert_eq!(
        cfg.north_endpoint().unwrap(),
        Endpoint::Ipc("/tmp/ezmb_north.ipc".into())
    );
    assert_eq!(
        cfg.south_endpoint().unwrap(),
        Endpoint::Ipc("/tmp/ezmb_south.ipc".into())
    );
    assert_eq!(cfg.routing.topology, Topology::Bidirectional);
}

#[test]
fn loads_partial_file_over_defaults() {
    let path = write_temp(
        "ezmb_partial",
        r#"
        [queues]
        capacity = 32
        overflow_policy = "disconnect"

        [metrics]
        report_interval_ms = 10000
        "#,
    );

    let cfg = load_config(&path).unwrap();
    assert_eq!(cfg.queues.capacity, 32);
    assert_eq!(cfg.queues.overflow_policy, OverflowPolicy::Disconnect);
    assert_eq!(cfg.limits.max_payload_bytes, 1024 * 1024);
    assert_eq!(
        cfg.report_interval(),
        Some(std::time::Duration::from_secs(10))
    );
    std::fs::remove_file(path).unwrap();
}

#[test]
fn rejects_invalid_files() {
    let path = write_temp("ezmb_invalid", "[queues]\ncapacity = 0\n");
    assert!(matches!(load_config(&path), Err(ConfigError::Invalid(_))));
    std::fs::remove_file(path).unwrap();

    let path = write_temp("ezmb_garbled", "[queues\ncapacity = ");
    assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    std::fs::remove_file(path).unwrap();
}

#[test]
fn missing_file_is_an_io_error() {
    assert!(matches!(
        load_config("/definitely/not/here/ezmb.toml"),
        Err(ConfigError::Io(_))
    ));
}
