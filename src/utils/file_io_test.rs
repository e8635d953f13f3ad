use std::fs;

use tempfile::tempdir;

use super::file_io::atomic_write;
use super::file_io::create_parent_dir_if_not_exist;
use super::file_io::open_file_for_append;

#[test]
fn test_atomic_write_creates_and_replaces() {
    let dir = tempdir().expect("tempdir");
    let target = dir.path().join("state").join("master.state");

    atomic_write(&target, b"first").expect("initial write");
    assert_eq!(fs::read(&target).expect("read back"), b"first");

    atomic_write(&target, b"second").expect("overwrite");
    assert_eq!(fs::read(&target).expect("read back"), b"second");

    // No temp leftovers after a successful rename.
    let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, vec![std::ffi::OsString::from("master.state")]);
}

#[test]
fn test_create_parent_dir_for_file_path() {
    let dir = tempdir().expect("tempdir");
    let target = dir.path().join("a").join("b").join("x.txt");

    create_parent_dir_if_not_exist(&target).expect("mkdir");
    assert!(target.parent().unwrap().is_dir());
    assert!(!target.exists());
}

#[test]
fn test_open_file_for_append_appends() {
    use std::io::Write;

    let dir = tempdir().expect("tempdir");
    let target = dir.path().join("log").join("transaction");

    let mut f = open_file_for_append(target.clone()).expect("open");
    f.write_all(b"1 cn=a a\n").expect("write");
    drop(f);

    let mut f = open_file_for_append(target.clone()).expect("reopen");
    f.write_all(b"2 cn=b m\n").expect("write");
    drop(f);

    assert_eq!(fs::read(&target).expect("read"), b"1 cn=a a\n2 cn=b m\n");
}
