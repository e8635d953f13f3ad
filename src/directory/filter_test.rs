use super::Filter;
use crate::model::entry_with;

fn parse(raw: &str) -> Filter {
    Filter::parse(raw).expect(raw)
}

#[test]
fn test_equality_match_is_octet_exact() {
    let entry = entry_with(&[("uid", &["alice"])]);

    assert!(parse("(uid=alice)").matches(&entry));
    assert!(!parse("(uid=Alice)").matches(&entry));
    assert!(!parse("(uid=bob)").matches(&entry));
    assert!(!parse("(mail=alice)").matches(&entry));
}

#[test]
fn test_attribute_names_match_case_insensitively() {
    let entry = entry_with(&[("objectClass", &["person"])]);
    assert!(parse("(ObjectClass=person)").matches(&entry));
}

#[test]
fn test_presence() {
    let entry = entry_with(&[("uid", &["alice"])]);
    assert!(parse("(uid=*)").matches(&entry));
    assert!(!parse("(mail=*)").matches(&entry));
}

#[test]
fn test_substring_patterns() {
    let entry = entry_with(&[("mail", &["alice@example.org"])]);

    assert!(parse("(mail=alice@*)").matches(&entry));
    assert!(parse("(mail=*@example.org)").matches(&entry));
    assert!(parse("(mail=*example*)").matches(&entry));
    assert!(parse("(mail=a*@*.org)").matches(&entry));
    assert!(!parse("(mail=bob@*)").matches(&entry));
    assert!(!parse("(mail=*@example.com)").matches(&entry));
}

#[test]
fn test_boolean_combinators() {
    let entry = entry_with(&[("objectclass", &["person", "posixAccount"]), ("uid", &["alice"])]);

    assert!(parse("(&(objectclass=person)(uid=alice))").matches(&entry));
    assert!(!parse("(&(objectclass=person)(uid=bob))").matches(&entry));
    assert!(parse("(|(uid=bob)(uid=alice))").matches(&entry));
    assert!(parse("(!(uid=bob))").matches(&entry));
    assert!(!parse("(!(uid=alice))").matches(&entry));
    assert!(parse("(&(objectclass=person)(!(uid=bob)))").matches(&entry));
}

#[test]
fn test_empty_and_matches_everything() {
    let entry = entry_with(&[("uid", &["alice"])]);
    assert!(Filter::match_all().matches(&entry));
    assert!(parse("(&)").matches(&entry));
}

#[test]
fn test_escapes_decode_to_octets() {
    let entry = entry_with(&[("cn", &["a*b"])]);
    assert!(parse("(cn=a\\2ab)").matches(&entry));

    let entry = entry_with(&[("cn", &["(paren)"])]);
    assert!(parse("(cn=\\28paren\\29)").matches(&entry));
}

#[test]
fn test_multivalued_attributes_match_any_value() {
    let entry = entry_with(&[("objectclass", &["top", "person"])]);
    assert!(parse("(objectclass=person)").matches(&entry));
    assert!(parse("(objectclass=top)").matches(&entry));
}

#[test]
fn test_parse_errors() {
    assert!(Filter::parse("uid=alice").is_err());
    assert!(Filter::parse("(uid=alice").is_err());
    assert!(Filter::parse("(uid=alice))").is_err());
    assert!(Filter::parse("(=alice)").is_err());
    assert!(Filter::parse("(uid)").is_err());
    assert!(Filter::parse("").is_err());
}
