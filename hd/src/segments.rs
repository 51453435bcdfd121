// Descriptor wallet library extending bitcoin & miniscript functionality
// by LNP/BP Association (https://lnp-bp.org)
// Written in 2020-2021 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the Apache-2.0 License
// along with this software.
// If not, see <https://opensource.org/licenses/Apache-2.0>.

use core::fmt::{self, Display, Formatter};
use core::str::FromStr;

use bitcoin::util::bip32::ChildNumber;

use crate::{Chain, ChildIndex, ChildIndexSpec, PathParseError};

/// Single-index derivation step, which may be a wildcard.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct BasicStep {
    /// Index or wildcard
    pub spec: ChildIndexSpec,

    /// Whether the step uses hardened derivation
    pub is_hardened: bool,
}

impl BasicStep {
    /// Constructs step with a concrete index
    #[inline]
    pub fn index(index: ChildIndex, is_hardened: bool) -> Self {
        BasicStep {
            spec: ChildIndexSpec::Index(index),
            is_hardened,
        }
    }

    /// Constructs unhardened step with a concrete index
    #[inline]
    pub fn normal(index: impl Into<ChildIndex>) -> Self { BasicStep::index(index.into(), false) }

    /// Constructs hardened step with a concrete index
    #[inline]
    pub fn hardened(index: impl Into<ChildIndex>) -> Self { BasicStep::index(index.into(), true) }

    /// Constructs wildcard step
    #[inline]
    pub fn wildcard(is_hardened: bool) -> Self {
        BasicStep {
            spec: ChildIndexSpec::Wildcard,
            is_hardened,
        }
    }

    /// Detects wildcard step
    #[inline]
    pub fn is_wildcard(&self) -> bool { self.spec.is_wildcard() }

    /// Converts into BIP-32 child number, substituting wildcard with the
    /// provided index. Returns `None` for a wildcard without substitution.
    #[inline]
    pub fn resolve(&self, wildcard: Option<ChildIndex>) -> Option<ChildNumber> {
        self.spec
            .resolve(wildcard)
            .map(|index| index.to_child_number(self.is_hardened))
    }
}

impl Display for BasicStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.spec, f)?;
        if self.is_hardened {
            f.write_str("'")?;
        }
        Ok(())
    }
}

impl FromStr for BasicStep {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (spec, is_hardened) = match s.strip_suffix(&['\'', 'h', 'H'][..]) {
            Some(stripped) => (stripped, true),
            None => (s, false),
        };
        Ok(BasicStep {
            spec: ChildIndexSpec::from_str(spec)?,
            is_hardened,
        })
    }
}

impl From<ChildNumber> for BasicStep {
    fn from(child_number: ChildNumber) -> Self {
        BasicStep::index(ChildIndex::from(child_number), child_number.is_hardened())
    }
}

/// Receive/change index pair step (`<0;1>`). Both branches are always fixed
/// indexes.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PairStep {
    external: BasicStep,
    internal: BasicStep,
}

impl PairStep {
    /// Constructs pair step, failing if any of the branches is a wildcard.
    pub fn with(external: BasicStep, internal: BasicStep) -> Result<Self, PathParseError> {
        if external.is_wildcard() || internal.is_wildcard() {
            return Err(PathParseError::WildcardInPair);
        }
        Ok(PairStep { external, internal })
    }

    /// Conventional `<0;1>` receive/change pair
    pub fn receive_change() -> Self {
        PairStep {
            external: BasicStep::normal(0u8),
            internal: BasicStep::normal(1u8),
        }
    }

    /// Returns receive branch step
    #[inline]
    pub fn external(&self) -> BasicStep { self.external }

    /// Returns change branch step
    #[inline]
    pub fn internal(&self) -> BasicStep { self.internal }

    /// Returns step for the selected branch
    #[inline]
    pub fn select(&self, chain: Chain) -> BasicStep {
        match chain {
            Chain::External => self.external,
            Chain::Internal => self.internal,
        }
    }
}

impl Display for PairStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<{};{}>", self.external, self.internal)
    }
}

impl FromStr for PairStep {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .ok_or_else(|| PathParseError::InvalidPairStep(s.to_owned()))?;
        let (external, internal) = inner
            .split_once(';')
            .ok_or_else(|| PathParseError::InvalidPairStep(s.to_owned()))?;
        PairStep::with(BasicStep::from_str(external)?, BasicStep::from_str(internal)?)
    }
}

/// Derivation path step: either a single index (possibly a wildcard) or a
/// receive/change index pair.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, From)]
pub enum DerivationStep {
    /// Single index step
    #[from]
    #[display(inner)]
    Basic(BasicStep),

    /// Receive/change index pair
    #[from]
    #[display(inner)]
    Pair(PairStep),
}

impl DerivationStep {
    /// Detects wildcard step
    #[inline]
    pub fn is_wildcard(&self) -> bool {
        matches!(self, DerivationStep::Basic(step) if step.is_wildcard())
    }

    /// Detects index pair step
    #[inline]
    pub fn is_pair(&self) -> bool { matches!(self, DerivationStep::Pair(_)) }

    /// Detects step which resolves to a single concrete child number without
    /// any substitution.
    #[inline]
    pub fn is_fixed(&self) -> bool { !self.is_wildcard() && !self.is_pair() }

    /// Detects hardened derivation. For pairs returns `true` if any of the
    /// branches is hardened.
    #[inline]
    pub fn is_hardened(&self) -> bool {
        match self {
            DerivationStep::Basic(step) => step.is_hardened,
            DerivationStep::Pair(pair) => pair.external.is_hardened || pair.internal.is_hardened,
        }
    }

    /// Returns basic step, if this is not a pair
    #[inline]
    pub fn as_basic(&self) -> Option<&BasicStep> {
        match self {
            DerivationStep::Basic(step) => Some(step),
            DerivationStep::Pair(_) => None,
        }
    }

    /// Converts the step into a BIP-32 child number, substituting wildcard
    /// with `wildcard` index and selecting pair branch according to `chain`.
    pub fn resolve(&self, wildcard: Option<ChildIndex>, chain: Chain) -> Option<ChildNumber> {
        match self {
            DerivationStep::Basic(step) => step.resolve(wildcard),
            DerivationStep::Pair(pair) => pair.select(chain).resolve(None),
        }
    }
}

impl FromStr for DerivationStep {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with('<') {
            PairStep::from_str(s).map(DerivationStep::Pair)
        } else {
            BasicStep::from_str(s).map(DerivationStep::Basic)
        }
    }
}

impl From<ChildNumber> for DerivationStep {
    fn from(child_number: ChildNumber) -> Self { DerivationStep::Basic(child_number.into()) }
}
