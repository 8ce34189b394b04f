use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A sequence identifier object.
///
/// The canonical string form follows the FASTA-style `namespace|value|`
/// convention: `gi|12345`, `ref|NM_000546.5|`, `lcl|contig7`. Callers are
/// responsible for presenting identifiers in canonical form; no further
/// normalization happens here.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SeqId {
    /// Numeric GenInfo identifier.
    Gi(i64),
    /// Versioned accession in a named namespace (`ref`, `gb`, `emb`, ...).
    Accession {
        namespace: String,
        accession: String,
        version: Option<u32>,
    },
    /// Local, unqualified name.
    Local(String),
}

impl SeqId {
    /// Create an accession identifier.
    pub fn accession(namespace: &str, accession: &str, version: Option<u32>) -> Self {
        Self::Accession {
            namespace: namespace.to_string(),
            accession: accession.to_string(),
            version,
        }
    }

    /// Returns the numeric identifier if this is a gi.
    pub fn as_gi(&self) -> Option<i64> {
        match self {
            Self::Gi(gi) => Some(*gi),
            _ => None,
        }
    }
}

impl fmt::Display for SeqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gi(gi) => write!(f, "gi|{gi}"),
            Self::Accession {
                namespace,
                accession,
                version,
            } => match version {
                Some(v) => write!(f, "{namespace}|{accession}.{v}|"),
                None => write!(f, "{namespace}|{accession}|"),
            },
            Self::Local(name) => write!(f, "lcl|{name}"),
        }
    }
}

impl FromStr for SeqId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TypeError::InvalidSeqId(s.to_string());

        // A bare number is a gi.
        if let Ok(gi) = s.parse::<i64>() {
            return Ok(Self::Gi(gi));
        }

        let (namespace, rest) = s.split_once('|').ok_or_else(invalid)?;
        match namespace {
            "gi" => rest.parse().map(Self::Gi).map_err(|_| invalid()),
            "lcl" if !rest.is_empty() => Ok(Self::Local(rest.to_string())),
            ns if !ns.is_empty() && ns.bytes().all(|b| b.is_ascii_alphabetic()) => {
                let value = rest.strip_suffix('|').unwrap_or(rest);
                if value.is_empty() || value.contains('|') {
                    return Err(invalid());
                }
                let (accession, version) = match value.rsplit_once('.') {
                    Some((acc, ver)) => match ver.parse::<u32>() {
                        Ok(v) => (acc, Some(v)),
                        Err(_) => (value, None),
                    },
                    None => (value, None),
                };
                Ok(Self::accession(ns, accession, version))
            }
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(SeqId::Gi(12345).to_string(), "gi|12345");
        assert_eq!(
            SeqId::accession("ref", "NM_000546", Some(5)).to_string(),
            "ref|NM_000546.5|"
        );
        assert_eq!(SeqId::accession("gb", "AY123", None).to_string(), "gb|AY123|");
        assert_eq!(SeqId::Local("contig7".into()).to_string(), "lcl|contig7");
    }

    #[test]
    fn parse_roundtrip() {
        for id in [
            SeqId::Gi(7),
            SeqId::Gi(-3),
            SeqId::accession("ref", "NM_000546", Some(5)),
            SeqId::accession("gb", "AY123", None),
            SeqId::Local("contig7".into()),
        ] {
            let parsed: SeqId = id.to_string().parse().unwrap();
            assert_eq!(parsed, id);
        }
    }

    #[test]
    fn bare_number_is_gi() {
        assert_eq!("42".parse::<SeqId>().unwrap(), SeqId::Gi(42));
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!("".parse::<SeqId>().is_err());
        assert!("nobar".parse::<SeqId>().is_err());
        assert!("gi|abc".parse::<SeqId>().is_err());
        assert!("lcl|".parse::<SeqId>().is_err());
        assert!("ref||".parse::<SeqId>().is_err());
        assert!("r3f|X|".parse::<SeqId>().is_err());
    }

    #[test]
    fn as_gi() {
        assert_eq!(SeqId::Gi(9).as_gi(), Some(9));
        assert_eq!(SeqId::Local("x".into()).as_gi(), None);
    }

    #[test]
    fn bincode_items_are_self_delimiting() {
        let ids = vec![SeqId::Gi(1), SeqId::accession("ref", "NM_1", Some(2))];
        let mut buf = Vec::new();
        for id in &ids {
            bincode::serialize_into(&mut buf, id).unwrap();
        }
        let mut cursor = std::io::Cursor::new(&buf);
        let mut decoded = Vec::new();
        while (cursor.position() as usize) < buf.len() {
            decoded.push(bincode::deserialize_from::<_, SeqId>(&mut cursor).unwrap());
        }
        assert_eq!(decoded, ids);
    }
}
