// Descriptor wallet library extending bitcoin & miniscript functionality
// by LNP/BP Association (https://lnp-bp.org)
// Written in 2020-2022 by
//     Dr. Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the Apache-2.0 License
// along with this software.
// If not, see <https://opensource.org/licenses/Apache-2.0>.

use std::str::FromStr;

use bitcoin::util::bip32::{self, ExtendedPubKey};
use bitcoin_hd::{
    Chain, DerivationPath, DerivationPathOrigin, IndexOverflow, Network, PathParseError,
    PathTemplate, UseInfo,
};
use descriptors::{DescriptorKeyExpression, HdKey, KeyMaterial, OutputDescriptor, ParseError, XKey};
use secp256k1::SECP256K1;

/// Placeholder for the account key in descriptor templates
pub const KEY_PLACEHOLDER: &str = "KEY";

/// Errors deriving account keys and descriptors
#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum AccountError {
    /// account keys must be derived from a master key, not a key at depth {0}
    NotMasterKey(u8),

    /// unknown account output type `{0}`
    UnknownOutputType(String),

    /// invalid account derivation path template. Details: {0}
    #[from]
    PathTemplate(PathParseError),

    /// {0}
    #[from]
    IndexOverflow(IndexOverflow),

    /// unable to derive account key. Details: {0}
    #[from]
    Derivation(bip32::Error),

    /// generated account descriptor is invalid. Details: {0}
    #[from]
    Descriptor(ParseError),
}

/// Well-known account-level descriptor template together with its standard
/// derivation path.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[display("{name}")]
pub struct AccountOutputType {
    /// Human-readable name
    pub name: &'static str,

    /// Short identifier
    pub short_name: &'static str,

    /// Descriptor text with `KEY` placeholder for the account key
    pub descriptor_source: &'static str,

    /// Account-level derivation path template with `COIN_TYPE` and `ACCOUNT`
    /// placeholders
    pub account_derivation_path: &'static str,

    /// Children path appended to the account key inside descriptors
    pub address_derivation_path: Option<&'static str>,
}

impl AccountOutputType {
    /// Legacy single-key (BIP-44)
    pub const PKH: AccountOutputType = AccountOutputType {
        name: "Legacy Single Key",
        short_name: "legacy",
        descriptor_source: "pkh(KEY)",
        account_derivation_path: "44'/COIN_TYPE'/ACCOUNT'",
        address_derivation_path: Some("<0;1>/*"),
    };

    /// Nested segwit single-key (BIP-49)
    pub const SH_WPKH: AccountOutputType = AccountOutputType {
        name: "Nested Segwit Single Key",
        short_name: "nested",
        descriptor_source: "sh(wpkh(KEY))",
        account_derivation_path: "49'/COIN_TYPE'/ACCOUNT'",
        address_derivation_path: Some("<0;1>/*"),
    };

    /// Native segwit single-key (BIP-84)
    pub const WPKH: AccountOutputType = AccountOutputType {
        name: "Native Segwit Single Key",
        short_name: "segwit",
        descriptor_source: "wpkh(KEY)",
        account_derivation_path: "84'/COIN_TYPE'/ACCOUNT'",
        address_derivation_path: Some("<0;1>/*"),
    };

    /// Legacy multisig cosigner (BIP-45)
    pub const SH_COSIGNER: AccountOutputType = AccountOutputType {
        name: "Legacy Multisig Cosigner",
        short_name: "legacymultisig",
        descriptor_source: "sh(cosigner(KEY))",
        account_derivation_path: "45'",
        address_derivation_path: Some("<0;1>/*"),
    };

    /// Nested segwit multisig cosigner (BIP-48, script type 1)
    pub const SH_WSH_COSIGNER: AccountOutputType = AccountOutputType {
        name: "Nested Segwit Multisig Cosigner",
        short_name: "nestedmultisig",
        descriptor_source: "sh(wsh(cosigner(KEY)))",
        account_derivation_path: "48'/COIN_TYPE'/ACCOUNT'/1'",
        address_derivation_path: Some("<0;1>/*"),
    };

    /// Native segwit multisig cosigner (BIP-48, script type 2)
    pub const WSH_COSIGNER: AccountOutputType = AccountOutputType {
        name: "Native Segwit Multisig Cosigner",
        short_name: "segwitmultisig",
        descriptor_source: "wsh(cosigner(KEY))",
        account_derivation_path: "48'/COIN_TYPE'/ACCOUNT'/2'",
        address_derivation_path: Some("<0;1>/*"),
    };

    /// Taproot single-key (BIP-86)
    pub const TR_SINGLE: AccountOutputType = AccountOutputType {
        name: "Taproot Single Key",
        short_name: "taproot",
        descriptor_source: "tr(KEY)",
        account_derivation_path: "86'/COIN_TYPE'/ACCOUNT'",
        address_derivation_path: Some("<0;1>/*"),
    };

    /// Output types included into account bundles by default
    pub const BUNDLE_CASES: [AccountOutputType; 7] = [
        AccountOutputType::PKH,
        AccountOutputType::SH_WPKH,
        AccountOutputType::WPKH,
        AccountOutputType::SH_COSIGNER,
        AccountOutputType::SH_WSH_COSIGNER,
        AccountOutputType::WSH_COSIGNER,
        AccountOutputType::TR_SINGLE,
    ];

    /// Identifier of the output type, which is its short name
    #[inline]
    pub fn id(&self) -> &'static str { self.short_name }

    /// Finds one of [`AccountOutputType::BUNDLE_CASES`] by its short name
    pub fn from_short_name(short_name: &str) -> Option<AccountOutputType> {
        AccountOutputType::BUNDLE_CASES
            .into_iter()
            .find(|ty| ty.short_name == short_name)
    }

    /// Parsed account derivation path template
    #[inline]
    pub fn path_template(&self) -> Result<PathTemplate, PathParseError> {
        PathTemplate::from_str(self.account_derivation_path)
    }

    /// Descriptor text for the given key expression text. The address
    /// derivation path, if any, is appended to the key.
    pub fn descriptor_source_for_key(&self, key_expression: &str) -> String {
        let key = match self.address_derivation_path {
            Some(suffix) => format!("{}/{}", key_expression, suffix),
            None => key_expression.to_owned(),
        };
        self.descriptor_source.replace(KEY_PLACEHOLDER, &key)
    }

    /// Account-level derivation path for the network coin type and account
    /// number.
    pub fn account_derivation_path(
        &self,
        network: Network,
        account: u32,
    ) -> Result<DerivationPath, AccountError> {
        let coin_type = UseInfo::with(network).coin_type();
        Ok(self.path_template()?.instantiate(coin_type, account)?)
    }

    /// Derives account-level extended public key from the master key. The
    /// returned expression carries the origin: master key fingerprint and
    /// account derivation path.
    pub fn account_public_key(
        &self,
        master: &XKey,
        network: Network,
        account: u32,
    ) -> Result<DescriptorKeyExpression, AccountError> {
        if !master.is_master() {
            return Err(AccountError::NotMasterKey(master.depth()));
        }
        let path = self.account_derivation_path(network, account)?;
        let children = path
            .to_child_numbers(None, Chain::External)
            .ok_or(PathParseError::NotFixed)?;
        let xpub = match master {
            XKey::Private(xprv) => {
                ExtendedPubKey::from_priv(SECP256K1, &xprv.derive_priv(SECP256K1, &children)?)
            }
            XKey::Public(xpub) => xpub.derive_pub(SECP256K1, &children)?,
        };
        let origin = DerivationPath::with(
            DerivationPathOrigin::with(master.fingerprint()),
            path.steps().to_vec(),
        );
        Ok(DescriptorKeyExpression {
            origin: Some(origin),
            key: KeyMaterial::Hd(HdKey::with(xpub)),
        })
    }

    /// Constructs account descriptor by putting the account public key into
    /// the descriptor template.
    pub fn account_descriptor(
        &self,
        master: &XKey,
        network: Network,
        account: u32,
    ) -> Result<OutputDescriptor, AccountError> {
        let key = self.account_public_key(master, network, account)?;
        let source = self.descriptor_source_for_key(&key.to_string());
        let descriptor = OutputDescriptor::from_str(&source)?;
        debug!("Derived {} account #{} descriptor `{}`", self.short_name, account, source);
        Ok(descriptor)
    }

    /// Checks whether the derivation path is an account path of this output
    /// type. Coin type steps match both mainnet and testnet values.
    pub fn matches_path(&self, path: &DerivationPath) -> bool {
        self.path_template()
            .map(|template| template.matches(path))
            .unwrap_or_default()
    }

    /// Finds first of [`AccountOutputType::BUNDLE_CASES`] matching the path
    #[inline]
    pub fn first_matching(path: &DerivationPath) -> Option<AccountOutputType> {
        AccountOutputType::first_matching_in(&AccountOutputType::BUNDLE_CASES, path)
    }

    /// Finds first of the output types matching the path
    pub fn first_matching_in(
        types: &[AccountOutputType],
        path: &DerivationPath,
    ) -> Option<AccountOutputType> {
        types.iter().find(|ty| ty.matches_path(path)).copied()
    }
}

impl FromStr for AccountOutputType {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccountOutputType::from_short_name(s)
            .ok_or_else(|| AccountError::UnknownOutputType(s.to_owned()))
    }
}

#[cfg(test)]
mod test {
    use bitcoin::util::bip32::ExtendedPrivKey;

    use super::*;

    const TV1_MASTER_XPRV: &str = "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LnF5kejMRNNU3TGtRBeJgk33yuGBxrMPHi";

    fn master() -> XKey { XKey::Private(ExtendedPrivKey::from_str(TV1_MASTER_XPRV).unwrap()) }

    fn path(s: &str) -> DerivationPath { DerivationPath::from_str(s).unwrap() }

    #[test]
    fn catalogue() {
        for ty in AccountOutputType::BUNDLE_CASES {
            assert!(ty.descriptor_source.contains(KEY_PLACEHOLDER));
            assert!(ty.path_template().is_ok());
            assert_eq!(AccountOutputType::from_short_name(ty.id()), Some(ty));
            assert_eq!(AccountOutputType::from_str(ty.short_name).unwrap(), ty);
        }
        assert_eq!(AccountOutputType::from_short_name("nonexistent"), None);
        assert_eq!(AccountOutputType::WPKH.to_string(), "Native Segwit Single Key");
    }

    #[test]
    fn descriptor_source() {
        assert_eq!(
            AccountOutputType::SH_WSH_COSIGNER.descriptor_source_for_key("[d34db33f/48'/0'/0'/1']xpub"),
            "sh(wsh(cosigner([d34db33f/48'/0'/0'/1']xpub/<0;1>/*)))"
        );
        let bare = AccountOutputType {
            address_derivation_path: None,
            ..AccountOutputType::PKH
        };
        assert_eq!(bare.descriptor_source_for_key("xpub"), "pkh(xpub)");
    }

    #[test]
    fn derivation_paths() {
        let ty = AccountOutputType::PKH;
        assert_eq!(ty.account_derivation_path(Network::Mainnet, 0).unwrap().to_string(), "44'/0'/0'");
        assert_eq!(ty.account_derivation_path(Network::Testnet, 3).unwrap().to_string(), "44'/1'/3'");
        assert_eq!(
            AccountOutputType::SH_COSIGNER
                .account_derivation_path(Network::Testnet, 7)
                .unwrap()
                .to_string(),
            "45'"
        );
        assert_eq!(
            ty.account_derivation_path(Network::Mainnet, 1 << 31),
            Err(AccountError::IndexOverflow(IndexOverflow(1 << 31)))
        );
    }

    #[test]
    fn account_keys() {
        let key = AccountOutputType::PKH
            .account_public_key(&master(), Network::Mainnet, 0)
            .unwrap();
        assert_eq!(
            key.to_string(),
            "[3442193e/44'/0'/0']xpub6CDEarkRoiwWPj3n3gYygGwgoGchxYg3g6Zs5L2nB4B6wdojzcWCKKHMu9XuY1GyYygRfrVembjAko1T5xTsxj7ecKXxEPzDxx7nCK8Dxtx"
        );
        let key = AccountOutputType::TR_SINGLE
            .account_public_key(&master(), Network::Mainnet, 0)
            .unwrap();
        assert!(key.to_string().ends_with("xpub6DRX1xNPHKaApgDnqaMNxJ8Lz35KCn3mRcW3LUep3JKhxWisRwaZJPn4BuZiaJ4kJ3cdqwbn4vZcsGiLGJJabZbqa65LGX2uhU9CtPWSgEn"));

        let XKey::Private(xprv) = master() else { unreachable!() };
        let xpub = XKey::Public(ExtendedPubKey::from_priv(SECP256K1, &xprv));
        assert!(matches!(
            AccountOutputType::PKH.account_public_key(&xpub, Network::Mainnet, 0),
            Err(AccountError::Derivation(_))
        ));

        let child = XKey::Private(xprv.derive_priv(SECP256K1, &[bip32::ChildNumber::Normal { index: 0 }]).unwrap());
        assert_eq!(
            AccountOutputType::PKH.account_public_key(&child, Network::Mainnet, 0),
            Err(AccountError::NotMasterKey(1))
        );
    }

    #[test]
    fn path_matching() {
        assert!(AccountOutputType::PKH.matches_path(&path("44'/0'/0'")));
        assert!(AccountOutputType::PKH.matches_path(&path("44'/1'/5'")));
        assert!(!AccountOutputType::PKH.matches_path(&path("44'/2'/0'")));
        assert!(!AccountOutputType::PKH.matches_path(&path("44'/0'/0'/0")));
        assert!(AccountOutputType::SH_COSIGNER.matches_path(&path("45'")));

        assert_eq!(
            AccountOutputType::first_matching(&path("48'/0'/0'/2'")),
            Some(AccountOutputType::WSH_COSIGNER)
        );
        assert_eq!(
            AccountOutputType::first_matching(&path("48'/1'/0'/1'")),
            Some(AccountOutputType::SH_WSH_COSIGNER)
        );
        assert_eq!(AccountOutputType::first_matching(&path("48'/0'/0'/3'")), None);
        assert_eq!(
            AccountOutputType::first_matching_in(
                &[AccountOutputType::PKH, AccountOutputType::WPKH],
                &path("86'/0'/0'")
            ),
            None
        );
    }
}
