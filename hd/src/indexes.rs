// Wallet-level libraries for bitcoin protocol by LNP/BP Association
//
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// This software is distributed without any warranty.
//
// You should have received a copy of the Apache-2.0 License
// along with this software.
// If not, see <https://opensource.org/licenses/Apache-2.0>.

use std::cmp::Ordering;
use std::str::FromStr;

use bitcoin::util::bip32::ChildNumber;

use crate::HARDENED_INDEX_BOUNDARY;

/// child index {0} does not fit into 31 bits.
#[derive(
    Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Display, Error
)]
#[display(doc_comments)]
pub struct IndexOverflow(pub u32);

/// Child index used by a single derivation step; ensures that the inner value
/// is always < 2^31. Whether the step is hardened is kept separately by
/// [`crate::BasicStep`] and never folded into the numeric value.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
#[derive(
    Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Default, Display, From
)]
#[display(inner)]
pub struct ChildIndex(
    #[from(u8)]
    #[from(u16)]
    u32,
);

impl PartialEq<u8> for ChildIndex {
    fn eq(&self, other: &u8) -> bool { self.0 == *other as u32 }
}

impl PartialEq<u32> for ChildIndex {
    fn eq(&self, other: &u32) -> bool { self.0 == *other }
}

impl PartialOrd<u32> for ChildIndex {
    fn partial_cmp(&self, other: &u32) -> Option<Ordering> { self.0.partial_cmp(other) }
}

impl ChildIndex {
    /// Index equal to zero
    pub const ZERO: ChildIndex = ChildIndex(0);

    /// Index equal to one
    pub const ONE: ChildIndex = ChildIndex(1);

    /// Constructs child index, failing if the value is equal to or exceeds
    /// [`HARDENED_INDEX_BOUNDARY`].
    pub fn with(index: u32) -> Result<Self, IndexOverflow> {
        if index >= HARDENED_INDEX_BOUNDARY {
            return Err(IndexOverflow(index));
        }
        Ok(ChildIndex(index))
    }

    /// Returns the 31-bit index value
    #[inline]
    pub fn index(self) -> u32 { self.0 }

    /// Converts the index into a BIP-32 child number with the given hardening.
    #[inline]
    pub fn to_child_number(self, is_hardened: bool) -> ChildNumber {
        if is_hardened {
            ChildNumber::Hardened { index: self.0 }
        } else {
            ChildNumber::Normal { index: self.0 }
        }
    }
}

impl From<ChildIndex> for u32 {
    fn from(index: ChildIndex) -> Self { index.0 }
}

impl From<ChildNumber> for ChildIndex {
    fn from(child_number: ChildNumber) -> Self {
        match child_number {
            ChildNumber::Normal { index } | ChildNumber::Hardened { index } => ChildIndex(index),
        }
    }
}

impl FromStr for ChildIndex {
    type Err = crate::PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(crate::PathParseError::InvalidIndex(s.to_owned()));
        }
        let index =
            u32::from_str(s).map_err(|_| crate::PathParseError::InvalidIndex(s.to_owned()))?;
        Ok(ChildIndex::with(index)?)
    }
}

/// Index specification for a derivation step: either a concrete index, or a
/// wildcard substituted at resolution time.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, From)]
pub enum ChildIndexSpec {
    /// Specific child index
    #[from]
    #[display(inner)]
    Index(ChildIndex),

    /// Wildcard implying any unhardened or hardened index, depending on the
    /// step hardening flag
    #[display("*")]
    Wildcard,
}

impl ChildIndexSpec {
    /// Detects wildcard specification
    #[inline]
    pub fn is_wildcard(self) -> bool { self == ChildIndexSpec::Wildcard }

    /// Returns concrete index, if the specification is not a wildcard
    #[inline]
    pub fn index(self) -> Option<ChildIndex> {
        match self {
            ChildIndexSpec::Index(index) => Some(index),
            ChildIndexSpec::Wildcard => None,
        }
    }

    /// Replaces wildcard with a provided index; fails if the wildcard index is
    /// not given.
    #[inline]
    pub fn resolve(self, wildcard: Option<ChildIndex>) -> Option<ChildIndex> {
        match self {
            ChildIndexSpec::Index(index) => Some(index),
            ChildIndexSpec::Wildcard => wildcard,
        }
    }
}

impl FromStr for ChildIndexSpec {
    type Err = crate::PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "*" => Ok(ChildIndexSpec::Wildcard),
            s => ChildIndex::from_str(s).map(ChildIndexSpec::Index),
        }
    }
}

/// Branch of a receive/change index pair (`<0;1>`) selected during key
/// resolution.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, Default)]
pub enum Chain {
    /// Receive addresses (first element of the pair)
    #[default]
    #[display("external")]
    External,

    /// Change addresses (second element of the pair)
    #[display("internal")]
    Internal,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn index_boundary() {
        assert_eq!(ChildIndex::with(0).unwrap(), ChildIndex::ZERO);
        assert_eq!(ChildIndex::with(HARDENED_INDEX_BOUNDARY - 1).unwrap(), HARDENED_INDEX_BOUNDARY - 1);
        assert_eq!(
            ChildIndex::with(HARDENED_INDEX_BOUNDARY),
            Err(IndexOverflow(HARDENED_INDEX_BOUNDARY))
        );
        assert!(ChildIndex::from_str("2147483648").is_err());
        assert!(ChildIndex::from_str("-1").is_err());
        assert!(ChildIndex::from_str("+1").is_err());
        assert_eq!(ChildIndex::from_str("2147483647").unwrap(), 2147483647u32);
    }

    #[test]
    fn hardening_is_not_encoded_in_value() {
        let index = ChildIndex::from(44u8);
        assert_eq!(index.to_child_number(true), ChildNumber::Hardened { index: 44 });
        assert_eq!(index.to_child_number(false), ChildNumber::Normal { index: 44 });
        assert_eq!(ChildIndex::from(ChildNumber::Hardened { index: 44 }), index);
    }

    #[test]
    fn wildcard_spec() {
        assert_eq!(ChildIndexSpec::from_str("*").unwrap(), ChildIndexSpec::Wildcard);
        assert_eq!(ChildIndexSpec::Wildcard.to_string(), "*");
        assert_eq!(ChildIndexSpec::Wildcard.resolve(None), None);
        assert_eq!(
            ChildIndexSpec::Wildcard.resolve(Some(ChildIndex::from(7u8))),
            Some(ChildIndex::from(7u8))
        );
        assert_eq!(
            ChildIndexSpec::Index(ChildIndex::ONE).resolve(Some(ChildIndex::from(7u8))),
            Some(ChildIndex::ONE)
        );
    }
}
