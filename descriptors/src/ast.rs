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

use core::fmt::{self, Display, Formatter};

use bitcoin::blockdata::opcodes;
use bitcoin::blockdata::script::Builder;
use bitcoin::hashes::hex::ToHex;
use bitcoin::{Address, PublicKey, Script};
use secp256k1::{XOnlyPublicKey, SECP256K1};

use crate::{ComboOutput, DescriptorKeyExpression, Keyword, ScriptContext};

/// Maximum number of keys in `multi()` and `sortedmulti()`
pub const MAX_MULTISIG_KEYS: usize = 20;

/// Descriptor script function kinds, listed in the order the parser tries
/// them.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
pub enum NodeKind {
    /// Raw script
    #[display("raw")]
    Raw,

    /// Bare public key
    #[display("pk")]
    Pk,

    /// Public key hash
    #[display("pkh")]
    Pkh,

    /// Witness public key hash
    #[display("wpkh")]
    Wpkh,

    /// Multisig, sorted or not
    #[display("multi")]
    Multi,

    /// Witness script hash
    #[display("wsh")]
    Wsh,

    /// Script hash
    #[display("sh")]
    Sh,

    /// Taproot key-path output
    #[display("tr")]
    Tr,

    /// Address
    #[display("addr")]
    Addr,

    /// Any of the single-key outputs
    #[display("combo")]
    Combo,

    /// Multisig cosigner key
    #[display("cosigner")]
    Cosigner,
}

impl NodeKind {
    /// Kinds in parsing priority order
    pub const PRIORITY: [NodeKind; 11] = [
        NodeKind::Raw,
        NodeKind::Pk,
        NodeKind::Pkh,
        NodeKind::Wpkh,
        NodeKind::Multi,
        NodeKind::Wsh,
        NodeKind::Sh,
        NodeKind::Tr,
        NodeKind::Addr,
        NodeKind::Combo,
        NodeKind::Cosigner,
    ];

    /// Matches script function name against this kind; `multi` accepts
    /// `sortedmulti` as well.
    pub fn accepts(self, keyword: Keyword) -> bool {
        matches!(
            (self, keyword),
            (NodeKind::Raw, Keyword::Raw)
                | (NodeKind::Pk, Keyword::Pk)
                | (NodeKind::Pkh, Keyword::Pkh)
                | (NodeKind::Wpkh, Keyword::Wpkh)
                | (NodeKind::Multi, Keyword::Multi | Keyword::SortedMulti)
                | (NodeKind::Wsh, Keyword::Wsh)
                | (NodeKind::Sh, Keyword::Sh)
                | (NodeKind::Tr, Keyword::Tr)
                | (NodeKind::Addr, Keyword::Addr)
                | (NodeKind::Combo, Keyword::Combo)
                | (NodeKind::Cosigner, Keyword::Cosigner)
        )
    }

    /// Checks whether a script of this kind may be placed inside `parent`;
    /// `None` stands for the top level.
    pub fn allowed_inside(self, parent: Option<NodeKind>) -> bool {
        match (self, parent) {
            (_, None) => true,
            (NodeKind::Wsh | NodeKind::Wpkh, Some(NodeKind::Sh)) => true,
            (NodeKind::Pk | NodeKind::Pkh | NodeKind::Multi | NodeKind::Cosigner, Some(parent)) => {
                matches!(parent, NodeKind::Sh | NodeKind::Wsh)
            }
            _ => false,
        }
    }
}

/// Threshold multisig: `multi(k,KEY,...)` or `sortedmulti(k,KEY,...)`
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Multisig {
    /// Number of required signatures
    pub threshold: usize,

    /// Keys in the order of the descriptor
    pub keys: Vec<DescriptorKeyExpression>,

    /// Whether the keys are sorted (BIP-67) when rendering the script
    pub is_sorted: bool,
}

impl Multisig {
    fn script_pubkey(&self, context: &ScriptContext) -> Option<Script> {
        let mut keys = self
            .keys
            .iter()
            .map(|key| key.resolve(context))
            .collect::<Option<Vec<PublicKey>>>()?;
        if self.is_sorted {
            keys.sort_by_key(|key| key.to_bytes());
        }
        let builder = keys
            .iter()
            .fold(Builder::new().push_int(self.threshold as i64), |builder, key| {
                builder.push_key(key)
            });
        Some(
            builder
                .push_int(keys.len() as i64)
                .push_opcode(opcodes::all::OP_CHECKMULTISIG)
                .into_script(),
        )
    }
}

impl Display for Multisig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = if self.is_sorted { Keyword::SortedMulti } else { Keyword::Multi };
        write!(f, "{}({}", name, self.threshold)?;
        for key in &self.keys {
            write!(f, ",{}", key)?;
        }
        f.write_str(")")
    }
}

/// Descriptor script function tree
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum DescriptorNode {
    /// `raw(HEX)`: literal script
    Raw(Script),

    /// `pk(KEY)`
    Pk(DescriptorKeyExpression),

    /// `pkh(KEY)`
    Pkh(DescriptorKeyExpression),

    /// `wpkh(KEY)`
    Wpkh(DescriptorKeyExpression),

    /// `multi(k,KEY,...)` and `sortedmulti(k,KEY,...)`
    Multi(Multisig),

    /// `wsh(SCRIPT)`
    Wsh(Box<DescriptorNode>),

    /// `sh(SCRIPT)`
    Sh(Box<DescriptorNode>),

    /// `tr(KEY)`: key-path only taproot output
    Tr(DescriptorKeyExpression),

    /// `addr(ADDRESS)`
    Addr(Address),

    /// `combo(KEY)`
    Combo(DescriptorKeyExpression),

    /// `cosigner(KEY)`: key slot of a multisig account template
    Cosigner(DescriptorKeyExpression),
}

impl DescriptorNode {
    /// Kind of the script function
    pub fn kind(&self) -> NodeKind {
        match self {
            DescriptorNode::Raw(_) => NodeKind::Raw,
            DescriptorNode::Pk(_) => NodeKind::Pk,
            DescriptorNode::Pkh(_) => NodeKind::Pkh,
            DescriptorNode::Wpkh(_) => NodeKind::Wpkh,
            DescriptorNode::Multi(_) => NodeKind::Multi,
            DescriptorNode::Wsh(_) => NodeKind::Wsh,
            DescriptorNode::Sh(_) => NodeKind::Sh,
            DescriptorNode::Tr(_) => NodeKind::Tr,
            DescriptorNode::Addr(_) => NodeKind::Addr,
            DescriptorNode::Combo(_) => NodeKind::Combo,
            DescriptorNode::Cosigner(_) => NodeKind::Cosigner,
        }
    }

    /// Key expressions in the order of their appearance
    pub fn keys(&self) -> Vec<&DescriptorKeyExpression> {
        match self {
            DescriptorNode::Raw(_) | DescriptorNode::Addr(_) => vec![],
            DescriptorNode::Pk(key)
            | DescriptorNode::Pkh(key)
            | DescriptorNode::Wpkh(key)
            | DescriptorNode::Tr(key)
            | DescriptorNode::Combo(key)
            | DescriptorNode::Cosigner(key) => vec![key],
            DescriptorNode::Multi(multi) => multi.keys.iter().collect(),
            DescriptorNode::Wsh(inner) | DescriptorNode::Sh(inner) => inner.keys(),
        }
    }

    /// Detects scripts which can only be rendered with a wildcard child
    /// index
    pub fn requires_wildcard_child_num(&self) -> bool {
        self.keys()
            .into_iter()
            .any(DescriptorKeyExpression::requires_wildcard_child_num)
    }

    /// Detects uncompressed keys anywhere in the tree
    pub fn contains_uncompressed_key(&self) -> bool {
        self.keys()
            .into_iter()
            .any(DescriptorKeyExpression::is_uncompressed)
    }

    /// Renders script-pubkey.
    ///
    /// Returns `None` if the script is inapplicable: a key can't be resolved
    /// in the given context, a segwit script contains an uncompressed key,
    /// `combo()` has no output form selected, or the node is a `cosigner()`
    /// key slot.
    pub fn script_pubkey(&self, context: &ScriptContext) -> Option<Script> {
        match self {
            DescriptorNode::Raw(script) => Some(script.clone()),
            DescriptorNode::Pk(key) => Some(Script::new_p2pk(&key.resolve(context)?)),
            DescriptorNode::Pkh(key) => Some(Script::new_p2pkh(&key.resolve(context)?.pubkey_hash())),
            DescriptorNode::Wpkh(key) => {
                let hash = key.resolve(context)?.wpubkey_hash()?;
                Some(Script::new_v0_p2wpkh(&hash))
            }
            DescriptorNode::Multi(multi) => multi.script_pubkey(context),
            DescriptorNode::Wsh(inner) => {
                if inner.contains_uncompressed_key() {
                    return None;
                }
                let witness_script = inner.script_pubkey(context)?;
                Some(Script::new_v0_p2wsh(&witness_script.wscript_hash()))
            }
            DescriptorNode::Sh(inner) => {
                let redeem_script = inner.script_pubkey(context)?;
                Some(Script::new_p2sh(&redeem_script.script_hash()))
            }
            DescriptorNode::Tr(key) => {
                let pk = key.resolve(context)?;
                if !pk.compressed {
                    return None;
                }
                Some(Script::new_v1_p2tr(SECP256K1, XOnlyPublicKey::from(pk.inner), None))
            }
            DescriptorNode::Addr(address) => Some(address.script_pubkey()),
            DescriptorNode::Combo(key) => Self::combo_script_pubkey(key, context),
            DescriptorNode::Cosigner(_) => None,
        }
    }

    fn combo_script_pubkey(key: &DescriptorKeyExpression, context: &ScriptContext) -> Option<Script> {
        let node = match context.combo_output? {
            ComboOutput::Pk => DescriptorNode::Pk(key.clone()),
            ComboOutput::Pkh => DescriptorNode::Pkh(key.clone()),
            ComboOutput::Wpkh => DescriptorNode::Wpkh(key.clone()),
            ComboOutput::ShWpkh => {
                DescriptorNode::Sh(Box::new(DescriptorNode::Wpkh(key.clone())))
            }
        };
        node.script_pubkey(context)
    }
}

impl Display for DescriptorNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorNode::Raw(script) => write!(f, "raw({})", script.as_bytes().to_hex()),
            DescriptorNode::Pk(key) => write!(f, "pk({})", key),
            DescriptorNode::Pkh(key) => write!(f, "pkh({})", key),
            DescriptorNode::Wpkh(key) => write!(f, "wpkh({})", key),
            DescriptorNode::Multi(multi) => Display::fmt(multi, f),
            DescriptorNode::Wsh(inner) => write!(f, "wsh({})", inner),
            DescriptorNode::Sh(inner) => write!(f, "sh({})", inner),
            DescriptorNode::Tr(key) => write!(f, "tr({})", key),
            DescriptorNode::Addr(address) => write!(f, "addr({})", address),
            DescriptorNode::Combo(key) => write!(f, "combo({})", key),
            DescriptorNode::Cosigner(key) => write!(f, "cosigner({})", key),
        }
    }
}
