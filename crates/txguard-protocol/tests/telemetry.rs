//! Subscriber installation. Kept in its own test binary because the global
//! subscriber can only be set once per process.

use txguard_protocol::telemetry::init_tracing;
use txguard_types::LogConfig;

#[test]
fn init_tracing_is_idempotent() {
    let config = LogConfig {
        filter: "txguard=debug".to_string(),
        json: true,
    };
    assert!(init_tracing(&config).unwrap());
    assert!(!init_tracing(&LogConfig::default()).unwrap());
    tracing::info!(request_id = "abc", "event after init");
}
