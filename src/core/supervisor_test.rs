use tempfile::tempdir;

use super::Supervisor;
use crate::config::RuntimeConfig;
use crate::Error;
use crate::PipelineError;

fn runtime_for(data_dir: &std::path::Path) -> RuntimeConfig {
    let mut runtime = RuntimeConfig::default();
    runtime.data_dir = data_dir.to_path_buf();
    runtime
}

#[test]
fn test_clean_data_dir_passes() {
    let dir = tempdir().expect("tempdir");
    let supervisor = Supervisor::new(&runtime_for(dir.path()));
    assert!(supervisor.check().is_ok());
}

#[test]
fn test_quarantine_sentinel_halts() {
    let dir = tempdir().expect("tempdir");
    std::fs::write(dir.path().join("failed.ldif"), "dn: cn=broken\n").expect("write sentinel");

    let supervisor = Supervisor::new(&runtime_for(dir.path()));
    let err = supervisor.check().expect_err("must halt");
    assert!(matches!(
        err,
        Error::Pipeline(PipelineError::Quarantined(_))
    ));
}

#[test]
fn test_free_space_threshold_breach_is_fatal() {
    let dir = tempdir().expect("tempdir");
    std::fs::create_dir_all(dir.path().join("cache")).expect("mkdir");

    let mut runtime = runtime_for(dir.path());
    // No filesystem has this much headroom.
    runtime.min_free_mib = u64::MAX >> 21;

    let supervisor = Supervisor::new(&runtime);
    let err = supervisor.check().expect_err("must breach");
    assert!(matches!(err, Error::Pipeline(PipelineError::FreeSpace { .. })));
}

#[test]
fn test_disabled_watchdog_ignores_free_space() {
    let dir = tempdir().expect("tempdir");
    std::fs::create_dir_all(dir.path().join("cache")).expect("mkdir");

    let mut runtime = runtime_for(dir.path());
    runtime.min_free_mib = 0;

    let supervisor = Supervisor::new(&runtime);
    assert!(supervisor.check().is_ok());
}

#[test]
fn test_missing_monitored_dir_is_skipped() {
    let dir = tempdir().expect("tempdir");
    let mut runtime = runtime_for(dir.path());
    runtime.min_free_mib = 1;
    runtime.monitored_dirs = vec![dir.path().join("does-not-exist")];

    let supervisor = Supervisor::new(&runtime);
    assert!(supervisor.check().is_ok());
}
