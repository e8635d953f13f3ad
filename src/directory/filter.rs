//! Client-side LDAP filter matching.
//!
//! Handler gating matches filters against the listener's own view of the
//! new entry, so evaluation happens here and not on the server. The
//! supported grammar is the subset handler modules use: equality, presence,
//! substrings, and the `&`/`|`/`!` combinators. Attribute names compare
//! case-insensitively; values compare octet-exact (after `\xx` unescaping),
//! the same rule the diff engine applies.

use crate::model::Entry;
use crate::DirectoryError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Present(String),
    Equality(String, Vec<u8>),
    Substring(String, SubstringPattern),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstringPattern {
    pub initial: Option<Vec<u8>>,
    pub any: Vec<Vec<u8>>,
    pub fin: Option<Vec<u8>>,
}

impl Filter {
    pub fn parse(raw: &str) -> Result<Filter> {
        let mut parser = Parser {
            raw,
            bytes: raw.as_bytes(),
            pos: 0,
        };
        let filter = parser.filter()?;
        if parser.pos != parser.bytes.len() {
            return Err(parser.error("trailing characters"));
        }
        Ok(filter)
    }

    /// Matches all entries; used when a handler declares no filter.
    pub fn match_all() -> Filter {
        Filter::And(Vec::new())
    }

    pub fn matches(
        &self,
        entry: &Entry,
    ) -> bool {
        match self {
            Filter::And(inner) => inner.iter().all(|f| f.matches(entry)),
            Filter::Or(inner) => inner.iter().any(|f| f.matches(entry)),
            Filter::Not(inner) => !inner.matches(entry),
            Filter::Present(attr) => entry.attribute(attr).is_some(),
            Filter::Equality(attr, value) => entry
                .attribute(attr)
                .map(|a| a.values().iter().any(|v| v == value))
                .unwrap_or(false),
            Filter::Substring(attr, pattern) => entry
                .attribute(attr)
                .map(|a| a.values().iter().any(|v| pattern.matches(v)))
                .unwrap_or(false),
        }
    }
}

impl SubstringPattern {
    fn matches(
        &self,
        value: &[u8],
    ) -> bool {
        let mut rest = value;

        if let Some(initial) = &self.initial {
            if !rest.starts_with(initial) {
                return false;
            }
            rest = &rest[initial.len()..];
        }

        for any in &self.any {
            match find(rest, any) {
                Some(pos) => rest = &rest[pos + any.len()..],
                None => return false,
            }
        }

        match &self.fin {
            Some(fin) => rest.len() >= fin.len() && rest.ends_with(fin),
            None => true,
        }
    }
}

fn find(
    haystack: &[u8],
    needle: &[u8],
) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

struct Parser<'a> {
    raw: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(
        &self,
        reason: &str,
    ) -> crate::Error {
        DirectoryError::InvalidFilter {
            filter: self.raw.to_string(),
            reason: format!("{reason} at offset {}", self.pos),
        }
        .into()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect(
        &mut self,
        c: u8,
    ) -> Result<()> {
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected {:?}", c as char)))
        }
    }

    fn filter(&mut self) -> Result<Filter> {
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.filter_list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.filter_list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => return Err(self.error("unexpected end of filter")),
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn filter_list(&mut self) -> Result<Vec<Filter>> {
        let mut list = Vec::new();
        while self.peek() == Some(b'(') {
            list.push(self.filter()?);
        }
        Ok(list)
    }

    fn item(&mut self) -> Result<Filter> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c != b'=' && c != b')' && c != b'(') {
            self.pos += 1;
        }
        if self.peek() != Some(b'=') {
            return Err(self.error("expected '='"));
        }
        let attr = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|_| self.error("attribute name is not UTF-8"))?
            .trim()
            .to_ascii_lowercase();
        if attr.is_empty() {
            return Err(self.error("empty attribute name"));
        }
        self.pos += 1;

        // Value runs to the closing parenthesis; '*' splits substring parts.
        let mut parts: Vec<Vec<u8>> = vec![Vec::new()];
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated value")),
                Some(b')') => break,
                Some(b'(') => return Err(self.error("unescaped '(' in value")),
                Some(b'*') => {
                    self.pos += 1;
                    parts.push(Vec::new());
                }
                Some(b'\\') => {
                    let value = self.unescape()?;
                    parts.last_mut().expect("parts never empty").push(value);
                }
                Some(c) => {
                    self.pos += 1;
                    parts.last_mut().expect("parts never empty").push(c);
                }
            }
        }

        if parts.len() == 1 {
            return Ok(Filter::Equality(attr, parts.pop().expect("one part")));
        }
        if parts.len() == 2 && parts[0].is_empty() && parts[1].is_empty() {
            return Ok(Filter::Present(attr));
        }

        let fin = parts.pop().expect("at least two parts");
        let initial = parts.remove(0);
        Ok(Filter::Substring(
            attr,
            SubstringPattern {
                initial: (!initial.is_empty()).then_some(initial),
                any: parts.into_iter().filter(|p| !p.is_empty()).collect(),
                fin: (!fin.is_empty()).then_some(fin),
            },
        ))
    }

    /// `\xx` hex escape, as produced by standard filter escaping.
    fn unescape(&mut self) -> Result<u8> {
        self.pos += 1;
        let hex = self
            .bytes
            .get(self.pos..self.pos + 2)
            .ok_or_else(|| self.error("truncated escape"))?;
        let hex = std::str::from_utf8(hex).map_err(|_| self.error("bad escape"))?;
        let value = u8::from_str_radix(hex, 16).map_err(|_| self.error("bad escape"))?;
        self.pos += 2;
        Ok(value)
    }
}
