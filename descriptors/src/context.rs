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

use core::fmt::{self, Debug, Formatter};

use bitcoin::PrivateKey;
use bitcoin_hd::{Chain, ChildIndex, DerivationPath};

/// Source of private keys for derivations which can't be done from public
/// key material alone (hardened children of an extended public key).
pub trait PrivateKeyProvider {
    /// Returns private key for the fixed `path`, which starts at the master
    /// key identified by the path origin fingerprint.
    fn private_key(&self, path: &DerivationPath) -> Option<PrivateKey>;
}

impl<F> PrivateKeyProvider for F
where
    F: Fn(&DerivationPath) -> Option<PrivateKey>,
{
    fn private_key(&self, path: &DerivationPath) -> Option<PrivateKey> { self(path) }
}

/// Output form selected for `combo()` descriptors (BIP-384)
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
pub enum ComboOutput {
    /// P2PK
    #[display("pk")]
    Pk,

    /// P2PKH
    #[display("pkh")]
    Pkh,

    /// P2WPKH, for compressed keys only
    #[display("wpkh")]
    Wpkh,

    /// P2WPKH nested in P2SH, for compressed keys only
    #[display("sh-wpkh")]
    ShWpkh,
}

impl ComboOutput {
    /// All forms in BIP-384 order
    pub const ALL: [ComboOutput; 4] =
        [ComboOutput::Pk, ComboOutput::Pkh, ComboOutput::Wpkh, ComboOutput::ShWpkh];
}

/// Parameters used to turn a descriptor into a concrete script-pubkey.
#[derive(Clone, Copy, Default)]
pub struct ScriptContext<'provider> {
    /// Index substituted for the wildcard step of key children paths
    pub wildcard_child: Option<ChildIndex>,

    /// Branch of receive/change pair steps
    pub chain: Chain,

    /// Source of private keys for hardened derivation from public keys
    pub private_key_provider: Option<&'provider dyn PrivateKeyProvider>,

    /// Output form of `combo()` descriptors
    pub combo_output: Option<ComboOutput>,
}

impl<'provider> ScriptContext<'provider> {
    /// Context without any wildcard substitution, provider or combo form
    #[inline]
    pub fn new() -> Self { ScriptContext::default() }

    /// Sets the wildcard child index
    #[inline]
    pub fn with_wildcard_child(mut self, index: ChildIndex) -> Self {
        self.wildcard_child = Some(index);
        self
    }

    /// Selects receive or change branch
    #[inline]
    pub fn with_chain(mut self, chain: Chain) -> Self {
        self.chain = chain;
        self
    }

    /// Sets private key provider
    #[inline]
    pub fn with_private_key_provider(mut self, provider: &'provider dyn PrivateKeyProvider) -> Self {
        self.private_key_provider = Some(provider);
        self
    }

    /// Selects `combo()` output form
    #[inline]
    pub fn with_combo_output(mut self, combo_output: ComboOutput) -> Self {
        self.combo_output = Some(combo_output);
        self
    }
}

impl Debug for ScriptContext<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptContext")
            .field("wildcard_child", &self.wildcard_child)
            .field("chain", &self.chain)
            .field("private_key_provider", &self.private_key_provider.is_some())
            .field("combo_output", &self.combo_output)
            .finish()
    }
}
