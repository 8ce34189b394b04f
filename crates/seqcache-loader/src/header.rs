//! Record header prefixed to every cached blob chunk.
//!
//! ```text
//! [tag: i32 LE] [magic: u32 LE] [payload ...]
//! ```
//!
//! The tag names the producer of the payload encoding; the magic pins the
//! on-disk layout of that producer. A reader accepts a chunk only when the
//! tag is registered and the magic matches, so a layout change is detected
//! as a miss rather than misread.

use std::collections::HashMap;

use crate::error::RecordError;

/// Length of the encoded header.
pub const HEADER_LEN: usize = 8;

/// Tag and magic identifying one payload encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RecordFormat {
    pub tag: i32,
    pub magic: u32,
}

impl RecordFormat {
    pub const fn new(tag: i32, magic: u32) -> Self {
        Self { tag, magic }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[..4].copy_from_slice(&self.tag.to_le_bytes());
        buf[4..].copy_from_slice(&self.magic.to_le_bytes());
        buf
    }

    /// Decode the header at the start of `bytes`; trailing bytes are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        let header: &[u8; HEADER_LEN] = bytes
            .get(..HEADER_LEN)
            .and_then(|h| h.try_into().ok())
            .ok_or(RecordError::Truncated {
                len: bytes.len(),
                need: HEADER_LEN,
            })?;
        let [t0, t1, t2, t3, m0, m1, m2, m3] = *header;
        Ok(Self {
            tag: i32::from_le_bytes([t0, t1, t2, t3]),
            magic: u32::from_le_bytes([m0, m1, m2, m3]),
        })
    }
}

/// Set of payload encodings a reader accepts.
#[derive(Clone, Debug, Default)]
pub struct FormatRegistry {
    formats: HashMap<i32, u32>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, format: RecordFormat) -> Self {
        self.register(format);
        self
    }

    /// Accept `format`. Returns the previously registered format for the
    /// same tag, if any.
    pub fn register(&mut self, format: RecordFormat) -> Option<RecordFormat> {
        self.formats
            .insert(format.tag, format.magic)
            .map(|magic| RecordFormat::new(format.tag, magic))
    }

    /// Registered format for `tag`.
    pub fn get(&self, tag: i32) -> Option<RecordFormat> {
        self.formats.get(&tag).map(|magic| RecordFormat::new(tag, *magic))
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    /// Check a decoded header against the registry.
    pub fn validate(&self, header: RecordFormat) -> Result<RecordFormat, RecordError> {
        let expected = self
            .formats
            .get(&header.tag)
            .ok_or(RecordError::UnknownFormat(header.tag))?;
        if *expected != header.magic {
            return Err(RecordError::MagicMismatch {
                tag: header.tag,
                expected: *expected,
                found: header.magic,
            });
        }
        Ok(header)
    }

    /// Decode and validate the header of `record`, returning the format and
    /// the payload that follows it.
    pub fn split<'a>(&self, record: &'a [u8]) -> Result<(RecordFormat, &'a [u8]), RecordError> {
        let format = self.validate(RecordFormat::decode(record)?)?;
        Ok((format, &record[HEADER_LEN..]))
    }
}

impl FromIterator<RecordFormat> for FormatRegistry {
    fn from_iter<I: IntoIterator<Item = RecordFormat>>(iter: I) -> Self {
        let mut registry = Self::new();
        for format in iter {
            registry.register(format);
        }
        registry
    }
}
