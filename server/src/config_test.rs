use super::*;
use std::collections::HashMap;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn postgres_store_requires_database_url() {
    let err = ServerConfig::from_lookup(lookup(&[])).unwrap_err();
    assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
}

#[test]
fn memory_store_needs_no_database() {
    let config = ServerConfig::from_lookup(lookup(&[("STORE", "memory")])).expect("config");
    assert_eq!(config.store, StoreKind::Memory);
    assert_eq!(config.port, 3000);
    assert_eq!(config.board_layer_count, 3);
    assert_eq!(config.layer_max_bytes, 16 * 1024 * 1024);
}

#[test]
fn overrides_are_parsed_and_garbage_falls_back() {
    let config = ServerConfig::from_lookup(lookup(&[
        ("DATABASE_URL", "postgres://x"),
        ("PORT", "8080"),
        ("BOARD_LAYER_COUNT", "5"),
        ("CLIENT_CHANNEL_CAPACITY", "lots"),
    ]))
    .expect("config");
    assert_eq!(config.store, StoreKind::Postgres);
    assert_eq!(config.port, 8080);
    assert_eq!(config.board_layer_count, 5);
    assert_eq!(config.client_channel_capacity, 256);
}

#[test]
fn rejects_unknown_store_and_zero_sizes() {
    assert!(matches!(
        ServerConfig::from_lookup(lookup(&[("STORE", "redis")])),
        Err(ConfigError::Invalid { key: "STORE", .. })
    ));
    assert!(matches!(
        ServerConfig::from_lookup(lookup(&[("STORE", "memory"), ("BOARD_LAYER_COUNT", "0")])),
        Err(ConfigError::Invalid { key: "BOARD_LAYER_COUNT", .. })
    ));
    assert!(matches!(
        ServerConfig::from_lookup(lookup(&[("STORE", "memory"), ("CLIENT_CHANNEL_CAPACITY", "0")])),
        Err(ConfigError::Invalid { key: "CLIENT_CHANNEL_CAPACITY", .. })
    ));
}
