use std::sync::Arc;

use tempfile::tempdir;
use tempfile::TempDir;

use super::get_meta_u64;
use super::init_cache_db;
use super::set_meta_u64;
use super::EntryCache;
use super::SledEntryCache;
use crate::constants::META_KEY_NOTIFIER_ID;
use crate::model::entry_with;
use crate::model::Dn;

struct TestContext {
    _dir: TempDir,
    cache: SledEntryCache,
}

fn setup() -> TestContext {
    let dir = tempdir().expect("tempdir");
    let db = init_cache_db(dir.path()).expect("open db");
    let cache = SledEntryCache::new(Arc::new(db)).expect("open trees");
    TestContext { _dir: dir, cache }
}

#[test]
fn test_put_get_delete() {
    let c = setup();
    let dn = Dn::new("cn=alice,ou=people");
    let mut entry = entry_with(&[("uid", &["alice"]), ("sn", &["Doe"])]);
    entry.module_add("replication");

    c.cache.put(&dn, &entry).expect("put");
    assert_eq!(c.cache.get(&dn).expect("get"), Some(entry));

    c.cache.delete(&dn).expect("delete");
    assert_eq!(c.cache.get(&dn).expect("get"), None);
}

#[test]
fn test_put_overwrites_previous_image() {
    let c = setup();
    let dn = Dn::new("cn=alice,ou=people");

    c.cache
        .put(&dn, &entry_with(&[("uid", &["alice"])]))
        .expect("put");
    let second = entry_with(&[("uid", &["alice2"]), ("description", &["x"])]);
    c.cache.put(&dn, &second).expect("overwrite");

    assert_eq!(c.cache.get(&dn).expect("get"), Some(second));
    assert_eq!(c.cache.len(), 1);
}

#[test]
fn test_scan_returns_all_records() {
    let c = setup();
    for name in ["cn=a", "cn=b", "cn=c"] {
        c.cache
            .put(&Dn::new(name), &entry_with(&[("cn", &[&name[3..]])]))
            .expect("put");
    }

    let all = c.cache.scan().expect("scan");
    let mut dns: Vec<String> = all.iter().map(|r| r.dn.to_string()).collect();
    dns.sort();
    assert_eq!(dns, vec!["cn=a", "cn=b", "cn=c"]);
}

#[test]
fn test_meta_counters() {
    let c = setup();
    assert_eq!(get_meta_u64(&c.cache, META_KEY_NOTIFIER_ID).expect("get"), None);

    set_meta_u64(&c.cache, META_KEY_NOTIFIER_ID, 42).expect("set");
    assert_eq!(
        get_meta_u64(&c.cache, META_KEY_NOTIFIER_ID).expect("get"),
        Some(42)
    );
}

#[test]
fn test_state_survives_reopen() {
    let dir = tempdir().expect("tempdir");
    let dn = Dn::new("cn=alice,ou=people");
    let mut entry = entry_with(&[("uid", &["alice"])]);
    entry.module_add("replication");

    {
        let db = init_cache_db(dir.path()).expect("open db");
        let cache = SledEntryCache::new(Arc::new(db)).expect("open trees");
        cache.put(&dn, &entry).expect("put");
        cache.flush().expect("flush");
    }

    let db = init_cache_db(dir.path()).expect("reopen db");
    let cache = SledEntryCache::new(Arc::new(db)).expect("open trees");
    assert_eq!(cache.get(&dn).expect("get"), Some(entry));
}
