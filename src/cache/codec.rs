//! Versioned binary codec for cached entry records.
//!
//! Layout (all integers little-endian fixed-width):
//!
//! ```text
//! version: u8
//! attribute_count: u32
//!   [ name_len: u32, name, value_count: u32, [ value_len: u32, value ]* ]*
//! module_count: u32
//!   [ name_len: u32, name ]*            (sorted)
//! ```
//!
//! Decoding re-validates the version byte and every structural bound; any
//! mismatch is cache corruption, which is fatal upstream.

use bytes::Buf;
use bytes::BufMut;

use crate::constants::ENTRY_RECORD_VERSION;
use crate::model::Attribute;
use crate::model::Entry;
use crate::CacheError;
use crate::Result;

pub fn encode_entry(entry: &Entry) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    buf.put_u8(ENTRY_RECORD_VERSION);

    buf.put_u32_le(entry.attribute_count() as u32);
    for attr in entry.attributes() {
        put_bytes(&mut buf, attr.name().as_bytes());
        buf.put_u32_le(attr.values().len() as u32);
        for value in attr.values() {
            put_bytes(&mut buf, value);
        }
    }

    let modules: Vec<&str> = entry.modules().collect();
    buf.put_u32_le(modules.len() as u32);
    for name in modules {
        put_bytes(&mut buf, name.as_bytes());
    }

    buf
}

pub fn decode_entry(
    dn: &str,
    raw: &[u8],
) -> Result<Entry> {
    let corrupt = |reason: &str| -> crate::Error {
        CacheError::Corrupt {
            dn: dn.to_string(),
            reason: reason.to_string(),
        }
        .into()
    };

    let mut buf = raw;
    if buf.remaining() < 1 {
        return Err(corrupt("empty record"));
    }
    let version = buf.get_u8();
    if version != ENTRY_RECORD_VERSION {
        return Err(corrupt(&format!("unsupported record version {version}")));
    }

    let mut entry = Entry::new();

    let attr_count = get_u32(&mut buf).ok_or_else(|| corrupt("truncated attribute count"))?;
    for _ in 0..attr_count {
        let name = get_bytes(&mut buf).ok_or_else(|| corrupt("truncated attribute name"))?;
        let name = std::str::from_utf8(name).map_err(|_| corrupt("attribute name is not UTF-8"))?;

        let mut attribute = Attribute::new(name);
        let value_count = get_u32(&mut buf).ok_or_else(|| corrupt("truncated value count"))?;
        for _ in 0..value_count {
            let value = get_bytes(&mut buf).ok_or_else(|| corrupt("truncated value"))?;
            attribute.push_value(value.to_vec());
        }

        if entry.attribute(attribute.name()).is_some() {
            return Err(corrupt("duplicate attribute name"));
        }
        entry.set_attribute(attribute);
    }

    let module_count = get_u32(&mut buf).ok_or_else(|| corrupt("truncated module count"))?;
    for _ in 0..module_count {
        let name = get_bytes(&mut buf).ok_or_else(|| corrupt("truncated module name"))?;
        let name = std::str::from_utf8(name).map_err(|_| corrupt("module name is not UTF-8"))?;
        entry.module_add(name);
    }

    if buf.has_remaining() {
        return Err(corrupt("trailing bytes after record"));
    }

    Ok(entry)
}

fn put_bytes(
    buf: &mut Vec<u8>,
    raw: &[u8],
) {
    buf.put_u32_le(raw.len() as u32);
    buf.put_slice(raw);
}

fn get_u32(buf: &mut &[u8]) -> Option<u32> {
    if buf.remaining() < 4 {
        return None;
    }
    Some(buf.get_u32_le())
}

fn get_bytes<'a>(buf: &mut &'a [u8]) -> Option<&'a [u8]> {
    let len = get_u32(buf)? as usize;
    if buf.remaining() < len {
        return None;
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Some(head)
}
