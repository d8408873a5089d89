//! Keyed 32-bit checksums binding a token's bytes to a filename and secret.
//!
//! Every algorithm here is a named, frozen, pure function over
//! `(key, token bytes, filename bytes)`. New tokens are always sealed with
//! [`current`]; decoding walks [`VERIFIERS`] in order — current algorithm
//! first, then each legacy one — trying the raw filename before its
//! percent-encoded form, and accepts the first match. The legacy entries
//! exist solely to keep previously issued links decodable and must never be
//! reordered or changed.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// A checksum algorithm: `(key, token bytes, filename bytes) -> u32`.
pub type ChecksumFn = fn(&[u8], &[u8], &[u8]) -> u32;

/// The algorithm used to seal new tokens.
pub fn current(key: &[u8], token: &[u8], filename: &[u8]) -> u32 {
    adler32(key, token, filename)
}

/// Verification order: current algorithm first, then the frozen legacy ones.
pub const VERIFIERS: &[(&str, ChecksumFn)] =
    &[("adler32", adler32), ("crc32", crc32), ("digest", digest)];

/// Adler-32 over the concatenated inputs.
pub fn adler32(key: &[u8], token: &[u8], filename: &[u8]) -> u32 {
    let mut hash = simd_adler32::Adler32::new();
    hash.write(key);
    hash.write(token);
    hash.write(filename);
    hash.finish()
}

/// Legacy: CRC-32 rolling hash seeded with the key bytes.
pub fn crc32(key: &[u8], token: &[u8], filename: &[u8]) -> u32 {
    let mut hash = crc32fast::Hasher::new();
    hash.update(key);
    hash.update(token);
    hash.update(filename);
    hash.finalize()
}

/// Legacy: first four bytes of a SHA-256 digest over the flattened
/// [`DigestValue`] list `[key, token, filename]`.
pub fn digest(key: &[u8], token: &[u8], filename: &[u8]) -> u32 {
    structured_digest(&DigestValue::List(vec![
        DigestValue::Bytes(key),
        DigestValue::Bytes(token),
        DigestValue::Bytes(filename),
    ]))
}

/// A structured value the digest algorithm can flatten deterministically.
///
/// Maps iterate in key order (`BTreeMap`), so two maps with the same entries
/// always flatten identically regardless of insertion order.
#[derive(Debug, Clone)]
pub enum DigestValue<'a> {
    Bytes(&'a [u8]),
    Str(&'a str),
    Int(i64),
    List(Vec<DigestValue<'a>>),
    Map(BTreeMap<&'a str, DigestValue<'a>>),
}

/// Recursively flatten `value` into a SHA-256 digest, truncated to 32 bits.
///
/// Each node is written as a type tag, a length (for variable-size nodes),
/// and its content, so distinct structures never flatten to the same byte
/// stream.
pub fn structured_digest(value: &DigestValue) -> u32 {
    let mut hash = Sha256::new();
    flatten_into(&mut hash, value);
    let full = hash.finalize();
    u32::from_be_bytes([full[0], full[1], full[2], full[3]])
}

fn flatten_into(hash: &mut Sha256, value: &DigestValue) {
    match value {
        DigestValue::Bytes(b) => {
            hash.update([0x01]);
            hash.update((b.len() as u64).to_be_bytes());
            hash.update(b);
        }
        DigestValue::Str(s) => {
            hash.update([0x02]);
            hash.update((s.len() as u64).to_be_bytes());
            hash.update(s.as_bytes());
        }
        DigestValue::Int(i) => {
            hash.update([0x03]);
            hash.update(i.to_be_bytes());
        }
        DigestValue::List(items) => {
            hash.update([0x04]);
            hash.update((items.len() as u64).to_be_bytes());
            for item in items {
                flatten_into(hash, item);
            }
        }
        DigestValue::Map(entries) => {
            hash.update([0x05]);
            hash.update((entries.len() as u64).to_be_bytes());
            for (k, v) in entries {
                flatten_into(hash, &DigestValue::Str(k));
                flatten_into(hash, v);
            }
        }
    }
}

/// Everything except unreserved characters gets escaped; `/` is handled
/// separately so path separators survive.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// The percent-encoded form a URL-building caller may have hashed instead of
/// the raw filename: each path segment escaped, separators kept literal.
pub fn quoted_filename(filename: &str) -> String {
    filename
        .split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Try `stored` against the verifier ladder. Versioned tokens only ever used
/// the current algorithm, so callers pass `include_legacy = false` for them.
/// Returns the name of the matching algorithm, or `None` when every
/// combination fails.
pub fn verify(
    stored: u32,
    token: &[u8],
    filename: &str,
    key: &[u8],
    include_legacy: bool,
) -> Option<&'static str> {
    let quoted = quoted_filename(filename);
    let algorithms = if include_legacy {
        VERIFIERS
    } else {
        &VERIFIERS[..1]
    };
    for (name, algorithm) in algorithms {
        for candidate in [filename.as_bytes(), quoted.as_bytes()] {
            if algorithm(key, token, candidate) == stored {
                return Some(name);
            }
        }
    }
    None
}
