use mimir::config::{CacheConfig, ConfigError};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

fn write_temp_config(yaml: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("mimir_config_{}.yaml", uuid::Uuid::new_v4()));
    let mut f = File::create(&path).unwrap();
    f.write_all(yaml.as_bytes()).unwrap();
    path
}

#[tokio::test]
async fn test_config_file_loads_with_defaults() {
    let path = write_temp_config("host: \"cache.internal\"\n");
    let config = CacheConfig::from_yaml_file(path.to_str().unwrap())
        .await
        .expect("config should load");

    assert_eq!(config.host, "cache.internal");
    assert_eq!(config.port, 6379);
    assert_eq!(config.ttl_secs, 1200);
    assert_eq!(config.max_retries, 10);
}

#[tokio::test]
async fn test_config_file_with_all_fields() {
    let path = write_temp_config(
        r#"
host: "cache.internal"
port: 6380
use_tls: true
credential: "p4ss"
ttl_secs: 5
max_retries: 2
base_delay_ms: 50
max_delay_ms: 200
connect_timeout_ms: 500
retry_forever: false
fallback_capacity: 32
"#,
    );
    let config = CacheConfig::from_yaml_file(path.to_str().unwrap())
        .await
        .expect("config should load");

    assert_eq!(config.port, 6380);
    assert!(config.use_tls);
    assert_eq!(config.ttl_secs, 5);
    assert_eq!(config.max_retries, 2);
    assert_eq!(config.base_delay_ms, 50);
    assert_eq!(config.max_delay_ms, 200);
    assert_eq!(config.connect_timeout_ms, 500);
    assert_eq!(config.fallback_capacity, Some(32));
    assert!(config.redis_url().starts_with("rediss://"));
}

#[tokio::test]
async fn test_missing_file_is_io_error() {
    let result = CacheConfig::from_yaml_file("/nonexistent/mimir.yaml").await;
    assert!(matches!(result, Err(ConfigError::IoError(_))));
}

#[tokio::test]
async fn test_invalid_yaml_is_parse_error() {
    let path = write_temp_config("host: [unclosed\n");
    let result = CacheConfig::from_yaml_file(path.to_str().unwrap()).await;
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[tokio::test]
async fn test_invalid_values_fail_validation() {
    let path = write_temp_config("host: \"h\"\nttl_secs: 0\n");
    let result = CacheConfig::from_yaml_file(path.to_str().unwrap()).await;

    match result {
        Err(ConfigError::ValidationError(msg)) => {
            assert!(msg.contains("ttl_secs"));
        }
        other => panic!("Expected validation error, got {:?}", other.map(|_| ())),
    }
}
