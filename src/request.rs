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

use bitcoin_hd::cbor::{self, tags, CborDecode, CborEncode, CborMap, DecodeError};
use bitcoin_hd::{DerivationPath, UseInfo};
use ciborium::value::Value;
#[cfg(feature = "serde")]
use serde_with::{As, DisplayFromStr};

/// Kind of the requested key
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
pub enum KeyType {
    /// Private key
    #[display("private")]
    Private,

    /// Public key
    #[display("public")]
    Public,
}

impl KeyType {
    /// Detects private key requests
    #[inline]
    pub fn is_private(self) -> bool { self == KeyType::Private }
}

impl From<bool> for KeyType {
    fn from(is_private: bool) -> Self {
        if is_private {
            KeyType::Private
        } else {
            KeyType::Public
        }
    }
}

/// Request for a key at a derivation path, sent to a signing device.
///
/// In CBOR the use info and derivability flag are omitted when they have
/// default values (bitcoin mainnet and `true`).
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct KeyRequestBody {
    /// Requested key type
    pub key_type: KeyType,

    /// Derivation path of the requested key
    #[cfg_attr(feature = "serde", serde(with = "As::<DisplayFromStr>"))]
    pub path: DerivationPath,

    /// Asset and network the key is requested for
    pub use_info: UseInfo,

    /// Whether the returned key must be usable for further derivation
    pub is_derivable: bool,
}

impl KeyRequestBody {
    /// Constructs request for a derivable key
    pub fn with(key_type: KeyType, path: DerivationPath, use_info: UseInfo) -> Self {
        KeyRequestBody {
            key_type,
            path,
            use_info,
            is_derivable: true,
        }
    }

    /// Decodes request from its untagged CBOR map
    pub fn from_untagged_cbor(value: &Value) -> Result<Self, DecodeError> {
        let map = CborMap::with(value)?;
        let key_type = KeyType::from(cbor::to_bool(map.require(1)?)?);
        let path = DerivationPath::from_tagged_cbor(map.require(2)?)?;
        let use_info = map
            .get(3)
            .map(UseInfo::from_tagged_cbor)
            .transpose()?
            .unwrap_or_default();
        let is_derivable = map.get(4).map(cbor::to_bool).transpose()?.unwrap_or(true);
        Ok(KeyRequestBody {
            key_type,
            path,
            use_info,
            is_derivable,
        })
    }
}

impl CborEncode for KeyRequestBody {
    fn cbor_tag(&self) -> u64 { tags::KEY_REQUEST_BODY }

    fn to_untagged_cbor(&self) -> Value {
        let mut entries = vec![
            (1, Value::Bool(self.key_type.is_private())),
            (2, self.path.to_tagged_cbor()),
        ];
        if !self.use_info.is_default() {
            entries.push((3, self.use_info.to_tagged_cbor()));
        }
        if !self.is_derivable {
            entries.push((4, Value::Bool(false)));
        }
        cbor::map(entries)
    }
}

impl CborDecode for KeyRequestBody {
    fn from_tagged_cbor(value: &Value) -> Result<Self, DecodeError> {
        KeyRequestBody::from_untagged_cbor(cbor::untag(value, tags::KEY_REQUEST_BODY)?)
    }
}
