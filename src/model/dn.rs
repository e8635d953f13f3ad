use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Canonicalized distinguished name, the primary key of every entry.
///
/// Two DNs that differ only in ASCII case or in whitespace around the
/// component separators refer to the same entry; canonicalization happens
/// once on ingest so the rest of the pipeline compares byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dn(String);

impl Dn {
    /// Canonicalizes `raw`: trims, collapses whitespace around the `,`, `=`
    /// and `+` separators, lower-cases ASCII.
    pub fn new(raw: &str) -> Self {
        let mut out = String::with_capacity(raw.len());
        let mut pending_space = false;

        for c in raw.trim().chars() {
            if c.is_ascii_whitespace() {
                pending_space = true;
                continue;
            }
            if pending_space {
                // Whitespace survives only inside a value, not next to a
                // separator.
                if !matches!(c, ',' | '=' | '+') && !out.is_empty() && !out.ends_with([',', '=', '+']) {
                    out.push(' ');
                }
                pending_space = false;
            }
            out.push(c.to_ascii_lowercase());
        }

        Dn(out)
    }

    /// Wraps a string that is already canonical. Returns `None` when the
    /// input would change under canonicalization.
    pub fn from_canonical(raw: &str) -> Option<Self> {
        let canonical = Dn::new(raw);
        if canonical.0 == raw {
            Some(canonical)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Dn {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Dn {
    fn from(raw: &str) -> Self {
        Dn::new(raw)
    }
}
