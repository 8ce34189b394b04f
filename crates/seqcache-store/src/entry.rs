//! Entry addressing and the per-entry attribute row.
//!
//! Every stored payload is addressed by an [`EntryKey`] `(key, version,
//! subkey)`. The key encodes to an order-preserving byte string:
//!
//! ```text
//! [key bytes] [0x00] [version: 4 bytes, sign bit flipped, big-endian] [subkey bytes]
//! ```
//!
//! so a prefix scan over `key ‖ 0x00` yields one key's entries in ascending
//! version order.

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

const SEPARATOR: u8 = 0x00;
const VERSION_LEN: usize = 4;

/// Address of one stored payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey {
    pub key: String,
    pub version: i32,
    pub subkey: String,
}

impl EntryKey {
    pub fn new(key: &str, version: i32, subkey: &str) -> Self {
        Self {
            key: key.to_string(),
            version,
            subkey: subkey.to_string(),
        }
    }

    /// Encode into the ordered backend key.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        let mut buf = family_prefix(&self.key)?;
        buf.reserve(VERSION_LEN + self.subkey.len());
        buf.extend_from_slice(&encode_version(self.version));
        buf.extend_from_slice(self.subkey.as_bytes());
        Ok(buf)
    }

    /// Decode a backend key produced by [`EntryKey::encode`].
    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        let corrupt = || StoreError::Serialization("malformed entry key".into());

        let sep = bytes.iter().position(|b| *b == SEPARATOR).ok_or_else(corrupt)?;
        let rest = &bytes[sep + 1..];
        if rest.len() < VERSION_LEN {
            return Err(corrupt());
        }
        let (version, subkey) = rest.split_at(VERSION_LEN);
        let version = decode_version(version.try_into().map_err(|_| corrupt())?);

        Ok(Self {
            key: String::from_utf8(bytes[..sep].to_vec()).map_err(|_| corrupt())?,
            version,
            subkey: String::from_utf8(subkey.to_vec()).map_err(|_| corrupt())?,
        })
    }
}

impl std::fmt::Display for EntryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}/{:?}", self.key, self.version, self.subkey)
    }
}

/// Prefix shared by every entry of `key`, across versions and subkeys.
pub fn family_prefix(key: &str) -> StoreResult<Vec<u8>> {
    if key.as_bytes().contains(&SEPARATOR) {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    let mut buf = Vec::with_capacity(key.len() + 1);
    buf.extend_from_slice(key.as_bytes());
    buf.push(SEPARATOR);
    Ok(buf)
}

fn encode_version(version: i32) -> [u8; VERSION_LEN] {
    ((version as u32) ^ 0x8000_0000).to_be_bytes()
}

fn decode_version(bytes: [u8; VERSION_LEN]) -> i32 {
    (u32::from_be_bytes(bytes) ^ 0x8000_0000) as i32
}

/// Metadata row kept for every stored entry; the unit of eviction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub key: String,
    pub version: i32,
    pub subkey: String,
    /// Seconds since the UNIX epoch of the last successful read or write.
    pub last_access: u64,
    /// Payload lives in an overflow file rather than an inline row.
    pub overflow: bool,
}

impl AttributeRecord {
    pub fn new(entry: &EntryKey, last_access: u64, overflow: bool) -> Self {
        Self {
            key: entry.key.clone(),
            version: entry.version,
            subkey: entry.subkey.clone(),
            last_access,
            overflow,
        }
    }

    /// The entry this record describes.
    pub fn entry_key(&self) -> EntryKey {
        EntryKey::new(&self.key, self.version, &self.subkey)
    }

    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let entry = EntryKey::new("10.2-12345", 7, "3");
        let decoded = EntryKey::decode(&entry.encode().unwrap()).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn empty_subkey_roundtrip() {
        let entry = EntryKey::new("10-1", 0, "");
        let decoded = EntryKey::decode(&entry.encode().unwrap()).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn nul_in_key_is_rejected() {
        let err = EntryKey::new("bad\0key", 1, "").encode().unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }

    #[test]
    fn decode_rejects_truncated_keys() {
        assert!(EntryKey::decode(b"no-separator").is_err());
        assert!(EntryKey::decode(b"key\0\x80\x00").is_err());
    }

    #[test]
    fn family_prefix_matches_every_version() {
        let prefix = family_prefix("10-1").unwrap();
        for version in [i32::MIN, -1, 0, 1, i32::MAX] {
            let encoded = EntryKey::new("10-1", version, "x").encode().unwrap();
            assert!(encoded.starts_with(&prefix));
        }
        // A longer key sharing the textual prefix is not part of the family.
        let other = EntryKey::new("10-12", 0, "").encode().unwrap();
        assert!(!other.starts_with(&prefix));
    }

    #[test]
    fn attribute_record_roundtrip() {
        let entry = EntryKey::new("k", 3, "ids");
        let record = AttributeRecord::new(&entry, 1_700_000_000, true);
        let decoded = AttributeRecord::from_bytes(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.entry_key(), entry);
    }

    #[test]
    fn attribute_record_rejects_garbage() {
        assert!(AttributeRecord::from_bytes(&[1, 2, 3]).is_err());
    }

    proptest! {
        #[test]
        fn encoding_preserves_version_order(a in any::<i32>(), b in any::<i32>()) {
            let ea = EntryKey::new("key", a, "").encode().unwrap();
            let eb = EntryKey::new("key", b, "").encode().unwrap();
            prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
        }
    }
}
