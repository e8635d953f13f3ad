use super::Dn;

#[test]
fn test_canonicalization_lowercases_ascii() {
    assert_eq!(Dn::new("CN=Alice,OU=People").as_str(), "cn=alice,ou=people");
}

#[test]
fn test_canonicalization_trims_and_collapses_separator_whitespace() {
    assert_eq!(
        Dn::new("  cn = alice , ou = people  ").as_str(),
        "cn=alice,ou=people"
    );
    assert_eq!(Dn::new("cn=alice+sn=doe").as_str(), "cn=alice+sn=doe");
    assert_eq!(Dn::new("cn = alice + sn = doe").as_str(), "cn=alice+sn=doe");
}

#[test]
fn test_inner_value_whitespace_is_preserved_collapsed() {
    assert_eq!(
        Dn::new("cn=Alice   Liddell,ou=people").as_str(),
        "cn=alice liddell,ou=people"
    );
}

#[test]
fn test_equal_dns_compare_equal_after_ingest() {
    let a = Dn::new("cn=Bob, ou=People");
    let b = Dn::new("CN=bob,OU=people");
    assert_eq!(a, b);
}

#[test]
fn test_from_canonical_accepts_only_fixed_points() {
    assert!(Dn::from_canonical("cn=alice,ou=people").is_some());
    assert!(Dn::from_canonical("CN=alice,ou=people").is_none());
    assert!(Dn::from_canonical(" cn=alice").is_none());
}
