use super::*;

#[test]
fn test_defaults_validate() {
    let config = ListenerConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.runtime.postrun_idle_secs, 300);
    assert_eq!(config.notifier.alive_idle_secs, 300);
    assert_eq!(config.directory.operation_timeout_secs, 300);
    // Unlimited reconnects by default; an external supervisor restarts us.
    assert_eq!(config.notifier.retry.max_retries, 0);
}

#[test]
fn test_backoff_policy_rejects_inverted_delays() {
    let policy = BackoffPolicy {
        max_retries: 3,
        timeout_ms: 100,
        base_delay_ms: 5_000,
        max_delay_ms: 1_000,
    };
    assert!(policy.validate("test").is_err());
}

#[test]
fn test_backoff_policy_accepts_unlimited_retries() {
    let policy = BackoffPolicy {
        max_retries: 0,
        timeout_ms: 100,
        base_delay_ms: 1_000,
        max_delay_ms: 32_000,
    };
    assert!(policy.validate("test").is_ok());
}

#[test]
fn test_runtime_rejects_zero_postrun_idle() {
    let mut config = ListenerConfig::default();
    config.runtime.postrun_idle_secs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_directory_rejects_non_ldap_uri() {
    let mut config = ListenerConfig::default();
    config.directory.uri = "https://example.org".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_notifier_address_formatting() {
    let mut config = NotifierConfig::default();
    config.host = "primary.example.org".to_string();
    config.port = 6669;
    assert_eq!(config.address(), "primary.example.org:6669");
}

#[test]
fn test_cache_paths_derive_from_data_dir() {
    let mut runtime = RuntimeConfig::default();
    runtime.data_dir = std::path::PathBuf::from("/tmp/listener");
    assert_eq!(runtime.cache_dir(), std::path::PathBuf::from("/tmp/listener/cache"));
    assert_eq!(
        runtime.quarantine_sentinel(),
        std::path::PathBuf::from("/tmp/listener/failed.ldif")
    );
}
