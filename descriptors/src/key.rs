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

//! Key expressions used as descriptor function arguments.

use core::fmt::{self, Display, Formatter};

use bitcoin::util::bip32::{ChildNumber, ExtendedPrivKey, ExtendedPubKey, Fingerprint};
use bitcoin::{PrivateKey, PublicKey};
use bitcoin_hd::{DerivationPath, DerivationPathOrigin, DerivationStep};
use secp256k1::SECP256K1;

use crate::ScriptContext;

/// Extended key, public or private
#[derive(Clone, Copy, PartialEq, Eq, Debug, From)]
pub enum XKey {
    /// Extended public key
    #[from]
    Public(ExtendedPubKey),

    /// Extended private key
    #[from]
    Private(ExtendedPrivKey),
}

impl XKey {
    /// Detects private key
    #[inline]
    pub fn is_private(&self) -> bool { matches!(self, XKey::Private(_)) }

    /// Returns extended public key, computing it for private keys
    pub fn to_public(&self) -> ExtendedPubKey {
        match self {
            XKey::Public(xpub) => *xpub,
            XKey::Private(xprv) => ExtendedPubKey::from_priv(SECP256K1, xprv),
        }
    }

    /// Fingerprint of the key itself
    #[inline]
    pub fn fingerprint(&self) -> Fingerprint { self.to_public().fingerprint() }

    /// Network the key is encoded for
    pub fn network(&self) -> bitcoin::Network {
        match self {
            XKey::Public(xpub) => xpub.network,
            XKey::Private(xprv) => xprv.network,
        }
    }

    /// Key depth in the derivation tree
    pub fn depth(&self) -> u8 {
        match self {
            XKey::Public(xpub) => xpub.depth,
            XKey::Private(xprv) => xprv.depth,
        }
    }

    /// Fingerprint of the parent key (all zeros for a master key)
    pub fn parent_fingerprint(&self) -> Fingerprint {
        match self {
            XKey::Public(xpub) => xpub.parent_fingerprint,
            XKey::Private(xprv) => xprv.parent_fingerprint,
        }
    }

    /// Child number the key was derived with
    pub fn child_number(&self) -> ChildNumber {
        match self {
            XKey::Public(xpub) => xpub.child_number,
            XKey::Private(xprv) => xprv.child_number,
        }
    }

    /// Detects master key, i.e. a key at zero depth
    #[inline]
    pub fn is_master(&self) -> bool { self.depth() == 0 }
}

impl Display for XKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            XKey::Public(xpub) => Display::fmt(xpub, f),
            XKey::Private(xprv) => Display::fmt(xprv, f),
        }
    }
}

/// Extended key with an optional path of its own children
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct HdKey {
    /// Extended key
    pub key: XKey,

    /// Children derivation path, which may end with a wildcard and contain a
    /// receive/change pair
    pub children: Option<DerivationPath>,
}

impl HdKey {
    /// Constructs key without children path
    #[inline]
    pub fn with(key: impl Into<XKey>) -> Self {
        HdKey {
            key: key.into(),
            children: None,
        }
    }

    /// Sets children path
    #[inline]
    pub fn with_children(mut self, children: DerivationPath) -> Self {
        self.children = Some(children);
        self
    }
}

impl Display for HdKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.key, f)?;
        if let Some(children) = &self.children {
            children.fmt_children(f)?;
        }
        Ok(())
    }
}

/// Key material of a key expression
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum KeyMaterial {
    /// 33-byte public key
    EcCompressed(PublicKey),

    /// 65-byte public key
    EcUncompressed(PublicKey),

    /// WIF-encoded private key
    Wif(PrivateKey),

    /// Extended key
    Hd(HdKey),
}

impl Display for KeyMaterial {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            KeyMaterial::EcCompressed(pk) | KeyMaterial::EcUncompressed(pk) => Display::fmt(pk, f),
            KeyMaterial::Wif(sk) => f.write_str(&sk.to_wif()),
            KeyMaterial::Hd(hd) => Display::fmt(hd, f),
        }
    }
}

/// Descriptor key expression: `[fingerprint/origin/path]key/children/path`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DescriptorKeyExpression {
    /// Key origin: master key fingerprint and a fixed path
    pub origin: Option<DerivationPath>,

    /// Key material
    pub key: KeyMaterial,
}

impl DescriptorKeyExpression {
    /// Key expression without origin
    #[inline]
    pub fn with(key: KeyMaterial) -> Self { DescriptorKeyExpression { origin: None, key } }

    /// Detects keys which can only be resolved with a wildcard child index
    pub fn requires_wildcard_child_num(&self) -> bool {
        match &self.key {
            KeyMaterial::Hd(HdKey {
                children: Some(children),
                ..
            }) => children.requires_wildcard_child_num(),
            _ => false,
        }
    }

    /// Detects extended keys
    #[inline]
    pub fn is_hd(&self) -> bool { matches!(self.key, KeyMaterial::Hd(_)) }

    /// Detects keys which carry private key material
    pub fn is_private(&self) -> bool {
        match &self.key {
            KeyMaterial::Wif(_) => true,
            KeyMaterial::Hd(hd) => hd.key.is_private(),
            KeyMaterial::EcCompressed(_) | KeyMaterial::EcUncompressed(_) => false,
        }
    }

    /// Detects keys resolving to uncompressed public keys, which are not
    /// allowed in segwit scripts
    pub fn is_uncompressed(&self) -> bool {
        match &self.key {
            KeyMaterial::EcUncompressed(_) => true,
            KeyMaterial::Wif(sk) => !sk.compressed,
            KeyMaterial::EcCompressed(_) | KeyMaterial::Hd(_) => false,
        }
    }

    /// Fingerprint of the master key: taken from the origin, or, for
    /// extended keys without origin, the fingerprint of the key itself
    pub fn master_fingerprint(&self) -> Option<u32> {
        if let Some(fp) = self.origin.as_ref().and_then(DerivationPath::fingerprint) {
            return Some(fp);
        }
        match &self.key {
            KeyMaterial::Hd(hd) => DerivationPathOrigin::with(hd.key.fingerprint()).fingerprint(),
            _ => None,
        }
    }

    /// Resolves the expression into a public key.
    ///
    /// Children paths are derived with the wildcard replaced by
    /// [`ScriptContext::wildcard_child`] and pair steps resolved to the
    /// [`ScriptContext::chain`] branch. Hardened children of an extended
    /// public key are requested from the context private key provider using
    /// the full path from the master key. Returns `None` when the key can't
    /// be resolved with the given context.
    pub fn resolve(&self, context: &ScriptContext) -> Option<PublicKey> {
        match &self.key {
            KeyMaterial::EcCompressed(pk) | KeyMaterial::EcUncompressed(pk) => Some(*pk),
            KeyMaterial::Wif(sk) => Some(sk.public_key(SECP256K1)),
            KeyMaterial::Hd(hd) => self.resolve_hd(hd, context),
        }
    }

    fn resolve_hd(&self, hd: &HdKey, context: &ScriptContext) -> Option<PublicKey> {
        let children = match &hd.children {
            None => vec![],
            Some(children) => children.to_child_numbers(context.wildcard_child, context.chain)?,
        };
        match hd.key {
            XKey::Private(xprv) => {
                let derived = xprv.derive_priv(SECP256K1, &children).ok()?;
                Some(PublicKey::new(ExtendedPubKey::from_priv(SECP256K1, &derived).public_key))
            }
            XKey::Public(_) if children.iter().any(ChildNumber::is_hardened) => {
                let provider = context.private_key_provider?;
                let path = self.full_path(&hd.key, &children);
                let sk = provider.private_key(&path)?;
                Some(sk.public_key(SECP256K1))
            }
            XKey::Public(xpub) => {
                let derived = xpub.derive_pub(SECP256K1, &children).ok()?;
                Some(PublicKey::new(derived.public_key))
            }
        }
    }

    fn full_path(&self, key: &XKey, children: &[ChildNumber]) -> DerivationPath {
        let origin = match self.master_fingerprint() {
            Some(fp) => DerivationPathOrigin::Fingerprint(fp),
            None => DerivationPathOrigin::with(key.fingerprint()),
        };
        let steps = self
            .origin
            .iter()
            .flat_map(|origin| origin.steps().iter().copied())
            .chain(children.iter().copied().map(DerivationStep::from))
            .collect();
        DerivationPath::with(origin, steps)
    }
}

impl Display for DescriptorKeyExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(origin) = &self.origin {
            write!(f, "[{}]", origin)?;
        }
        Display::fmt(&self.key, f)
    }
}
