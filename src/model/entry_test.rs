use super::entry_with;
use super::Attribute;
use super::Entry;

#[test]
fn test_attribute_names_are_case_insensitive() {
    let mut entry = Entry::new();
    entry.add_value("objectClass", b"person".to_vec());
    entry.add_value("OBJECTCLASS", b"top".to_vec());

    assert_eq!(entry.attribute_count(), 1);
    let attr = entry.attribute("objectclass").expect("attribute");
    assert_eq!(attr.values().len(), 2);
}

#[test]
fn test_duplicate_values_are_rejected() {
    let mut attr = Attribute::new("mail");
    attr.push_value(b"a@example.org".to_vec());
    attr.push_value(b"a@example.org".to_vec());
    assert_eq!(attr.values().len(), 1);
}

#[test]
fn test_value_insertion_order_is_preserved() {
    let mut attr = Attribute::new("memberUid");
    attr.push_value(b"zeta".to_vec());
    attr.push_value(b"alpha".to_vec());
    assert_eq!(attr.values(), &[b"zeta".to_vec(), b"alpha".to_vec()]);
    assert_eq!(attr.sorted_values(), vec![b"alpha".as_slice(), b"zeta".as_slice()]);
}

#[test]
fn test_module_present_set() {
    let mut entry = entry_with(&[("uid", &["alice"])]);
    assert!(!entry.module_present("replication"));

    entry.module_add("replication");
    entry.module_add("home-dir");
    entry.module_add("replication");
    assert_eq!(entry.module_count(), 2);
    assert!(entry.module_present("home-dir"));

    entry.module_remove("home-dir");
    assert!(!entry.module_present("home-dir"));
}
