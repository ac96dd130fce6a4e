//! Canonical serialization for signed fields.
//!
//! Every signature in the quorum protocol is computed over this same
//! representation: fields sorted in lexical order by key, integers in
//! decimal, binary fields base64url without padding. Both signer and
//! verifier build the identical byte string independently from the same
//! field set, so there is nothing to agree on out of band.

use base64::Engine;
use std::collections::BTreeMap;

/// A single canonical field value.
#[derive(Debug, Clone)]
pub enum Field {
    Text(String),
    Int(i64),
    Bytes(Vec<u8>),
}

/// Build the canonical byte string for a set of named fields.
///
/// Keys are sorted lexically regardless of insertion order, so callers can
/// build the field list in whatever order is convenient.
pub fn canonical_bytes(fields: &[(&str, Field)]) -> Vec<u8> {
    let sorted: BTreeMap<&str, &Field> = fields.iter().map(|(k, v)| (*k, v)).collect();
    let base64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let mut out = Vec::new();
    for (key, value) in sorted {
        if !out.is_empty() {
            out.push(b'&');
        }
        out.extend_from_slice(key.as_bytes());
        out.push(b'=');
        match value {
            Field::Text(s) => out.extend_from_slice(s.as_bytes()),
            Field::Int(i) => out.extend_from_slice(i.to_string().as_bytes()),
            Field::Bytes(b) => out.extend_from_slice(base64.encode(b).as_bytes()),
        }
    }
    out
}
