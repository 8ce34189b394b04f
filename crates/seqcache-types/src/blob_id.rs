use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identity of one logical blob across all its versions and chunks.
///
/// Rendered as `"<sat>[.<sub_sat>]-<sat_key>"`; the `.sub_sat` segment is
/// omitted when it is zero, so a zero `sub_sat` and an absent one are the
/// same blob.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobId {
    pub sat: i32,
    pub sub_sat: i32,
    pub sat_key: i32,
}

impl BlobId {
    /// Create a blob identity with explicit components.
    pub const fn new(sat: i32, sub_sat: i32, sat_key: i32) -> Self {
        Self {
            sat,
            sub_sat,
            sat_key,
        }
    }

    /// Create a blob identity without a sub-satellite.
    pub const fn main(sat: i32, sat_key: i32) -> Self {
        Self::new(sat, 0, sat_key)
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({self})")
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sat)?;
        if self.sub_sat != 0 {
            write!(f, ".{}", self.sub_sat)?;
        }
        write!(f, "-{}", self.sat_key)
    }
}

impl FromStr for BlobId {
    type Err = TypeError;

    /// Parse the rendered form back into a `BlobId`.
    ///
    /// Components may be negative, so the separator is the first `-` that
    /// directly follows a digit.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TypeError::InvalidBlobKey(s.to_string());

        let bytes = s.as_bytes();
        let dash = (1..bytes.len())
            .find(|&i| bytes[i] == b'-' && bytes[i - 1].is_ascii_digit())
            .ok_or_else(invalid)?;
        let (head, sat_key) = (&s[..dash], &s[dash + 1..]);

        let (sat, sub_sat) = match head.split_once('.') {
            Some((sat, sub_sat)) => {
                let sub_sat: i32 = sub_sat.parse().map_err(|_| invalid())?;
                // A rendered zero sub_sat never appears; reject it so parsing
                // stays the exact inverse of rendering.
                if sub_sat == 0 {
                    return Err(invalid());
                }
                (sat, sub_sat)
            }
            None => (head, 0),
        };

        Ok(Self {
            sat: sat.parse().map_err(|_| invalid())?,
            sub_sat,
            sat_key: sat_key.parse().map_err(|_| invalid())?,
        })
    }
}

/// Independently addressable piece of a blob.
///
/// Chunk `0` is the main chunk; it is stored under the empty subkey. Every
/// other chunk is stored under its decimal form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(pub i32);

impl ChunkId {
    /// The main chunk.
    pub const MAIN: ChunkId = ChunkId(0);

    /// Returns `true` for the main chunk.
    pub fn is_main(&self) -> bool {
        self.0 == 0
    }

    /// Subkey under which this chunk is stored.
    pub fn subkey(&self) -> String {
        if self.is_main() {
            String::new()
        } else {
            self.0.to_string()
        }
    }
}

impl From<i32> for ChunkId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
