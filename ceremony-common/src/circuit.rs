//! Circuit variant identifiers.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::CeremonyError;

/// Extension carried by constraint-system entries in the ceremony catalog.
pub const CATALOG_ENTRY_EXTENSION: &str = ".r1cs";

/// One circuit variant, identified by its nullifier and commitment counts.
///
/// The textual form is `<nullifiers>x<commitments>` and is used verbatim for
/// directory names in the ceremony root, the build tree and the package.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CircuitKey {
    pub nullifiers: u32,
    pub commitments: u32,
}

impl CircuitKey {
    pub const fn new(nullifiers: u32, commitments: u32) -> Self {
        Self {
            nullifiers,
            commitments,
        }
    }

    /// Parse a catalog entry such as `12x34.r1cs`.
    ///
    /// The extension is optional; whatever remains must be a strict
    /// `<int>x<int>` record.
    pub fn from_catalog_entry(name: &str) -> Result<Self, CeremonyError> {
        let record = name.strip_suffix(CATALOG_ENTRY_EXTENSION).unwrap_or(name);
        record
            .parse()
            .map_err(|_| CeremonyError::MalformedCatalogEntry {
                name: name.to_string(),
            })
    }
}

impl fmt::Display for CircuitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.nullifiers, self.commitments)
    }
}

impl FromStr for CircuitKey {
    type Err = CeremonyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || CeremonyError::MalformedCatalogEntry {
            name: s.to_string(),
        };
        let (nullifiers, commitments) = s.split_once('x').ok_or_else(malformed)?;
        Ok(Self {
            nullifiers: parse_count(nullifiers).ok_or_else(malformed)?,
            commitments: parse_count(commitments).ok_or_else(malformed)?,
        })
    }
}

// `u32::from_str` tolerates a leading `+`; catalog names must be bare digits.
fn parse_count(part: &str) -> Option<u32> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parses_record_name() {
        let key: CircuitKey = "12x34".parse().unwrap();
        assert_eq!(key, CircuitKey::new(12, 34));
        assert_eq!(key.nullifiers, 12);
        assert_eq!(key.commitments, 34);
    }

    proptest! {
        #[test]
        fn prop_display_round_trips(nullifiers in any::<u32>(), commitments in any::<u32>()) {
            let key = CircuitKey::new(nullifiers, commitments);
            prop_assert_eq!(key.to_string().parse::<CircuitKey>().unwrap(), key);
            let entry = format!("{key}{CATALOG_ENTRY_EXTENSION}");
            prop_assert_eq!(CircuitKey::from_catalog_entry(&entry).unwrap(), key);
        }
    }

    #[test]
    fn rejects_malformed_names() {
        for name in ["12-34", "abcx34", "12x", "x34", "12x34x5", "+1x2", "1x 2", ""] {
            let err = name.parse::<CircuitKey>().unwrap_err();
            assert!(
                matches!(err, CeremonyError::MalformedCatalogEntry { .. }),
                "{name} should be malformed"
            );
        }
    }

    #[test]
    fn catalog_entry_strips_extension() {
        assert_eq!(
            CircuitKey::from_catalog_entry("2x3.r1cs").unwrap(),
            CircuitKey::new(2, 3)
        );
        assert_eq!(
            CircuitKey::from_catalog_entry("8x4").unwrap(),
            CircuitKey::new(8, 4)
        );
        match CircuitKey::from_catalog_entry("2x3.zkey") {
            Err(CeremonyError::MalformedCatalogEntry { name }) => assert_eq!(name, "2x3.zkey"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn serializes_as_named_pair() {
        let json = serde_json::to_string(&CircuitKey::new(2, 3)).unwrap();
        assert_eq!(json, r#"{"nullifiers":2,"commitments":3}"#);
    }
}
