// Descriptor wallet library extending bitcoin & miniscript functionality
// by LNP/BP Association (https://lnp-bp.org)
// Written in 2020-2022 by
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

//! Account-level derivation path templates based on BIP-43-related standards,
//! like `44'/COIN_TYPE'/ACCOUNT'`.

use core::fmt::{self, Display, Formatter};
use core::str::FromStr;

use crate::{
    BasicStep, ChildIndex, ChildIndexSpec, DerivationPath, DerivationStep, IndexOverflow,
    PathParseError,
};

/// Placeholder for the coin type in a path template
pub const COIN_TYPE_PLACEHOLDER: &str = "COIN_TYPE";

/// Placeholder for the account number in a path template
pub const ACCOUNT_PLACEHOLDER: &str = "ACCOUNT";

/// Index position of a path template step
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
pub enum TemplateIndex {
    /// Concrete index
    #[display(inner)]
    Fixed(ChildIndex),

    /// Any concrete index
    #[display("*")]
    Wildcard,

    /// Coin type, matching values `0` and `1`
    #[display("COIN_TYPE")]
    CoinType,

    /// Account number, matching any concrete index
    #[display("ACCOUNT")]
    Account,
}

/// Single step of a path template
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TemplateStep {
    /// Index or placeholder
    pub index: TemplateIndex,

    /// Whether the step uses hardened derivation
    pub is_hardened: bool,
}

impl TemplateStep {
    /// Checks whether a concrete derivation step fits this template step.
    ///
    /// The coin type placeholder accepts both mainnet (`0`) and testnet (`1`)
    /// coin types regardless of the network the path is used on.
    pub fn matches(&self, step: &DerivationStep) -> bool {
        let Some(step) = step.as_basic() else {
            return false;
        };
        if step.is_hardened != self.is_hardened {
            return false;
        }
        let ChildIndexSpec::Index(index) = step.spec else {
            return false;
        };
        match self.index {
            TemplateIndex::Fixed(expected) => index == expected,
            TemplateIndex::CoinType => index == ChildIndex::ZERO || index == ChildIndex::ONE,
            TemplateIndex::Account | TemplateIndex::Wildcard => true,
        }
    }
}

impl Display for TemplateStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.index, f)?;
        if self.is_hardened {
            f.write_str("'")?;
        }
        Ok(())
    }
}

impl FromStr for TemplateStep {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (index, is_hardened) = match s.strip_suffix(&['\'', 'h'][..]) {
            Some(stripped) => (stripped, true),
            None => (s, false),
        };
        let index = match index {
            COIN_TYPE_PLACEHOLDER => TemplateIndex::CoinType,
            ACCOUNT_PLACEHOLDER => TemplateIndex::Account,
            "*" => TemplateIndex::Wildcard,
            index => TemplateIndex::Fixed(ChildIndex::from_str(index)?),
        };
        Ok(TemplateStep { index, is_hardened })
    }
}

/// Derivation path template with coin type and account placeholders
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct PathTemplate(Vec<TemplateStep>);

impl PathTemplate {
    /// Returns template steps
    #[inline]
    pub fn steps(&self) -> &[TemplateStep] { &self.0 }

    /// Number of steps in the template
    #[inline]
    pub fn len(&self) -> usize { self.0.len() }

    /// Detects empty template
    #[inline]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Constructs concrete derivation path by replacing placeholders with the
    /// given coin type and account number. Template wildcards are kept.
    pub fn instantiate(&self, coin_type: u32, account: u32) -> Result<DerivationPath, IndexOverflow> {
        let coin_type = ChildIndex::with(coin_type)?;
        let account = ChildIndex::with(account)?;
        Ok(self
            .0
            .iter()
            .map(|step| {
                let spec = match step.index {
                    TemplateIndex::Fixed(index) => ChildIndexSpec::Index(index),
                    TemplateIndex::Wildcard => ChildIndexSpec::Wildcard,
                    TemplateIndex::CoinType => ChildIndexSpec::Index(coin_type),
                    TemplateIndex::Account => ChildIndexSpec::Index(account),
                };
                DerivationStep::Basic(BasicStep {
                    spec,
                    is_hardened: step.is_hardened,
                })
            })
            .collect())
    }

    /// Checks whether a concrete derivation path fits the template: the path
    /// must have the same number of steps, each one matching the template
    /// step (see [`TemplateStep::matches`]).
    pub fn matches(&self, path: &DerivationPath) -> bool {
        self.0.len() == path.len()
            && self
                .0
                .iter()
                .zip(path.steps())
                .all(|(template, step)| template.matches(step))
    }
}

impl Display for PathTemplate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut iter = self.0.iter();
        if let Some(first) = iter.next() {
            Display::fmt(first, f)?;
        }
        for step in iter {
            f.write_str("/")?;
            Display::fmt(step, f)?;
        }
        Ok(())
    }
}

impl FromStr for PathTemplate {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("m/").unwrap_or(s);
        if s.is_empty() {
            return Ok(PathTemplate::default());
        }
        s.split('/')
            .map(|component| {
                if component.is_empty() {
                    Err(PathParseError::EmptyStep)
                } else {
                    TemplateStep::from_str(component)
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .map(PathTemplate)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn template_display() {
        for s in ["44'/COIN_TYPE'/ACCOUNT'", "45'", "48'/COIN_TYPE'/ACCOUNT'/2'"] {
            assert_eq!(PathTemplate::from_str(s).unwrap().to_string(), s);
        }
        assert!(PathTemplate::from_str("44'/COIN'/0'").is_err());
    }

    #[test]
    fn instantiation() {
        let template = PathTemplate::from_str("44'/COIN_TYPE'/ACCOUNT'").unwrap();
        assert_eq!(template.instantiate(0, 0).unwrap().to_string(), "44'/0'/0'");
        assert_eq!(template.instantiate(1, 12).unwrap().to_string(), "44'/1'/12'");
        assert_eq!(template.instantiate(0, 1 << 31), Err(IndexOverflow(1 << 31)));
    }

    #[test]
    fn placeholder_matching() {
        let template = PathTemplate::from_str("48'/COIN_TYPE'/ACCOUNT'/2'").unwrap();
        let path = |s: &str| DerivationPath::from_str(s).unwrap();
        assert!(template.matches(&path("48'/0'/0'/2'")));
        assert!(template.matches(&path("48'/1'/9'/2'")));
        assert!(!template.matches(&path("48'/2'/0'/2'")));
        assert!(!template.matches(&path("48'/0'/0'/1'")));
        assert!(!template.matches(&path("48'/0'/0/2'")));
        assert!(!template.matches(&path("48'/0'/0'")));

        assert!(DerivationPath::from_str("48'/0'/*'/2'").is_err());
        let wildcard_account = ["48'", "0'", "*'", "2'"]
            .into_iter()
            .map(|step| DerivationStep::from_str(step).unwrap())
            .collect::<DerivationPath>();
        assert!(!template.matches(&wildcard_account));
    }
}
