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

//! Tagged CBOR encoding of key expressions (`crypto-eckey`, `crypto-hdkey`),
//! addresses (`crypto-address`) and descriptor script functions.
//!
//! The encoding does not preserve every detail of the textual form: origins
//! of plain EC keys are not represented. WIF keys carry two extra
//! `crypto-eckey` entries, `4` for the use info (omitted on mainnet) and `5`
//! for the compression flag (omitted when compressed). An extended key
//! without origin is written with an origin key path made of its own child
//! number, depth and no source fingerprint; on decoding origins without a
//! source fingerprint are dropped. Regtest and signet keys and addresses are
//! decoded as testnet.

use bitcoin::hashes::Hash;
use bitcoin::util::address::{Payload, WitnessVersion};
use bitcoin::util::bip32::{ChainCode, ChildNumber, ExtendedPrivKey, ExtendedPubKey, Fingerprint};
use bitcoin::{Address, PrivateKey, PublicKey, Script};
use bitcoin_hd::cbor::{self, tags, CborDecode, CborEncode, CborMap, DecodeError};
use bitcoin_hd::{Chain, DerivationPath, DerivationPathOrigin, DerivationStep, UseInfo};
use ciborium::value::Value;
use secp256k1::SecretKey;

use crate::{DescriptorKeyExpression, DescriptorNode, HdKey, KeyMaterial, Multisig, NodeKind, XKey};

const ADDRESS_TYPE_P2PKH: u64 = 0;
const ADDRESS_TYPE_P2SH: u64 = 1;
const ADDRESS_TYPE_P2WPKH: u64 = 2;

fn invalid(err: impl ToString) -> DecodeError { DecodeError::InvalidValue(err.to_string()) }

fn fingerprint_value(fingerprint: Fingerprint) -> u32 {
    DerivationPathOrigin::with(fingerprint)
        .fingerprint()
        .unwrap_or_default()
}

fn use_info(network: bitcoin::Network) -> UseInfo { UseInfo::with(network.into()) }

fn decode_use_info(map: &CborMap, key: u64) -> Result<UseInfo, DecodeError> {
    map.get(key)
        .map(UseInfo::from_tagged_cbor)
        .transpose()
        .map(Option::unwrap_or_default)
}

/// Untagged `crypto-address` map. Coin info distinguishes only mainnet and
/// testnet, so regtest and signet addresses are written as testnet ones.
pub fn address_to_untagged_cbor(address: &Address) -> Value {
    let mut entries = vec![];
    let use_info = use_info(address.network);
    if !use_info.is_default() {
        entries.push((1, use_info.to_tagged_cbor()));
    }
    match &address.payload {
        Payload::PubkeyHash(hash) => {
            entries.push((2, Value::from(ADDRESS_TYPE_P2PKH)));
            entries.push((3, Value::Bytes(hash[..].to_vec())));
        }
        Payload::ScriptHash(hash) => {
            entries.push((2, Value::from(ADDRESS_TYPE_P2SH)));
            entries.push((3, Value::Bytes(hash[..].to_vec())));
        }
        Payload::WitnessProgram { version, program }
            if *version == WitnessVersion::V0 && program.len() == 20 =>
        {
            entries.push((2, Value::from(ADDRESS_TYPE_P2WPKH)));
            entries.push((3, Value::Bytes(program.clone())));
        }
        Payload::WitnessProgram { .. } => {
            entries.push((3, Value::Bytes(address.script_pubkey().into_bytes())));
        }
    }
    cbor::map(entries)
}

/// Decodes `crypto-address` from its untagged map
pub fn address_from_untagged_cbor(value: &Value) -> Result<Address, DecodeError> {
    let map = CborMap::with(value)?;
    let network = decode_use_info(&map, 1)?.network.into();
    let data = cbor::to_bytes_ref(map.require(3)?)?;
    let payload = match map.get(2).map(cbor::to_u64).transpose()? {
        Some(ADDRESS_TYPE_P2PKH) => {
            Payload::PubkeyHash(bitcoin::PubkeyHash::from_slice(data).map_err(invalid)?)
        }
        Some(ADDRESS_TYPE_P2SH) => {
            Payload::ScriptHash(bitcoin::ScriptHash::from_slice(data).map_err(invalid)?)
        }
        Some(ADDRESS_TYPE_P2WPKH) if data.len() == 20 => Payload::WitnessProgram {
            version: WitnessVersion::V0,
            program: data.to_vec(),
        },
        Some(ADDRESS_TYPE_P2WPKH) => return Err(invalid("P2WPKH program must be 20 bytes")),
        Some(other) => return Err(invalid(format!("unknown address type {}", other))),
        None => {
            return Address::from_script(&Script::from(data.to_vec()), network)
                .map_err(invalid)
        }
    };
    Ok(Address { payload, network })
}

impl XKey {
    fn key_data(&self) -> Vec<u8> {
        match self {
            XKey::Public(xpub) => xpub.public_key.serialize().to_vec(),
            XKey::Private(xprv) => {
                let mut data = Vec::with_capacity(33);
                data.push(0u8);
                data.extend_from_slice(&xprv.private_key.secret_bytes());
                data
            }
        }
    }

    fn chain_code(&self) -> ChainCode {
        match self {
            XKey::Public(xpub) => xpub.chain_code,
            XKey::Private(xprv) => xprv.chain_code,
        }
    }
}

impl DescriptorKeyExpression {
    fn to_untagged_hdkey(&self, hd: &HdKey) -> Value {
        let xkey = hd.key;
        let use_info = use_info(xkey.network());
        if xkey.is_private() && xkey.is_master() && self.origin.is_none() && hd.children.is_none() {
            let mut entries = vec![
                (1, Value::Bool(true)),
                (3, Value::Bytes(xkey.key_data())),
                (4, Value::Bytes(xkey.chain_code()[..].to_vec())),
            ];
            if !use_info.is_default() {
                entries.push((5, use_info.to_tagged_cbor()));
            }
            return cbor::map(entries);
        }

        let mut entries = vec![];
        if xkey.is_private() {
            entries.push((2, Value::Bool(true)));
        }
        entries.push((3, Value::Bytes(xkey.key_data())));
        entries.push((4, Value::Bytes(xkey.chain_code()[..].to_vec())));
        if !use_info.is_default() {
            entries.push((5, use_info.to_tagged_cbor()));
        }
        let origin = match &self.origin {
            Some(origin) => {
                let mut origin = origin.clone();
                origin.set_depth(xkey.depth());
                Some(origin)
            }
            None if xkey.depth() > 0 => {
                let step = DerivationStep::from(xkey.child_number());
                let mut origin = DerivationPath::new(vec![step]);
                origin.set_depth(xkey.depth());
                Some(origin)
            }
            None => None,
        };
        if let Some(origin) = origin {
            entries.push((6, origin.to_tagged_cbor()));
        }
        if let Some(children) = &hd.children {
            entries.push((7, children.to_tagged_cbor()));
        }
        let parent_fingerprint = fingerprint_value(xkey.parent_fingerprint());
        if parent_fingerprint != 0 {
            entries.push((8, Value::from(parent_fingerprint as u64)));
        }
        cbor::map(entries)
    }

    fn from_untagged_eckey(value: &Value) -> Result<Self, DecodeError> {
        let map = CborMap::with(value)?;
        let is_private = map.get(2).map(cbor::to_bool).transpose()?.unwrap_or_default();
        let data = cbor::to_bytes_ref(map.require(3)?)?;
        let key = match (is_private, data.len()) {
            (true, 32) => KeyMaterial::Wif(PrivateKey {
                compressed: map.get(5).map(cbor::to_bool).transpose()?.unwrap_or(true),
                network: decode_use_info(&map, 4)?.network.into(),
                inner: SecretKey::from_slice(data).map_err(invalid)?,
            }),
            (false, 33) => KeyMaterial::EcCompressed(PublicKey::from_slice(data).map_err(invalid)?),
            (false, 65) => {
                KeyMaterial::EcUncompressed(PublicKey::from_slice(data).map_err(invalid)?)
            }
            (_, len) => return Err(invalid(format!("wrong EC key data length {}", len))),
        };
        Ok(DescriptorKeyExpression::with(key))
    }

    fn from_untagged_hdkey(value: &Value) -> Result<Self, DecodeError> {
        let map = CborMap::with(value)?;
        let is_master = map.get(1).map(cbor::to_bool).transpose()?.unwrap_or_default();
        let is_private =
            is_master || map.get(2).map(cbor::to_bool).transpose()?.unwrap_or_default();
        let data = cbor::to_bytes_ref(map.require(3)?)?;
        let chain_code = cbor::to_bytes_ref(map.require(4)?)?;
        if chain_code.len() != 32 {
            return Err(invalid("chain code must be 32 bytes"));
        }
        let chain_code = ChainCode::from(chain_code);
        let network = decode_use_info(&map, 5)?.network.into();
        let origin = map
            .get(6)
            .map(DerivationPath::from_tagged_cbor)
            .transpose()?;
        let children = map
            .get(7)
            .map(DerivationPath::from_tagged_cbor)
            .transpose()?;
        let parent_fingerprint = map.get(8).map(cbor::to_u32).transpose()?.unwrap_or_default();
        let parent_fingerprint = Fingerprint::from(&parent_fingerprint.to_be_bytes()[..]);

        let depth = origin.as_ref().map(DerivationPath::depth).unwrap_or_default();
        let child_number = origin
            .as_ref()
            .and_then(|origin| origin.steps().last())
            .and_then(|step| step.resolve(None, Chain::External))
            .unwrap_or(ChildNumber::Normal { index: 0 });

        let key = if is_private {
            if data.len() != 33 || data[0] != 0 {
                return Err(invalid("private key data must be 33 bytes starting with zero"));
            }
            XKey::Private(ExtendedPrivKey {
                network,
                depth,
                parent_fingerprint,
                child_number,
                private_key: SecretKey::from_slice(&data[1..]).map_err(invalid)?,
                chain_code,
            })
        } else {
            XKey::Public(ExtendedPubKey {
                network,
                depth,
                parent_fingerprint,
                child_number,
                public_key: secp256k1::PublicKey::from_slice(data).map_err(invalid)?,
                chain_code,
            })
        };

        let origin = origin
            .filter(|origin| origin.fingerprint().is_some())
            .map(|mut origin| {
                let len = origin.len() as u8;
                origin.set_depth(len);
                origin
            });
        Ok(DescriptorKeyExpression {
            origin,
            key: KeyMaterial::Hd(HdKey { key, children }),
        })
    }

    /// Decodes key expression from the untagged form of `crypto-eckey`
    /// (`tag` 306) or `crypto-hdkey` (`tag` 303)
    pub fn from_untagged_cbor(tag: u64, value: &Value) -> Result<Self, DecodeError> {
        match tag {
            tags::ECKEY => Self::from_untagged_eckey(value),
            tags::HDKEY => Self::from_untagged_hdkey(value),
            other => Err(DecodeError::UnknownTag(other)),
        }
    }
}

impl CborEncode for DescriptorKeyExpression {
    fn cbor_tag(&self) -> u64 {
        match self.key {
            KeyMaterial::Hd(_) => tags::HDKEY,
            _ => tags::ECKEY,
        }
    }

    fn to_untagged_cbor(&self) -> Value {
        match &self.key {
            KeyMaterial::EcCompressed(pk) | KeyMaterial::EcUncompressed(pk) => {
                cbor::map(vec![(3, Value::Bytes(pk.to_bytes()))])
            }
            KeyMaterial::Wif(sk) => {
                let mut entries = vec![
                    (2, Value::Bool(true)),
                    (3, Value::Bytes(sk.inner.secret_bytes().to_vec())),
                ];
                let use_info = use_info(sk.network);
                if !use_info.is_default() {
                    entries.push((4, use_info.to_tagged_cbor()));
                }
                if !sk.compressed {
                    entries.push((5, Value::Bool(false)));
                }
                cbor::map(entries)
            }
            KeyMaterial::Hd(hd) => self.to_untagged_hdkey(hd),
        }
    }
}

impl CborDecode for DescriptorKeyExpression {
    fn from_tagged_cbor(value: &Value) -> Result<Self, DecodeError> {
        match value {
            Value::Tag(tag, inner) => Self::from_untagged_cbor(*tag, inner),
            _ => Err(DecodeError::UnexpectedType("tagged key")),
        }
    }
}

impl Multisig {
    fn to_untagged_cbor(&self) -> Value {
        cbor::map(vec![
            (1, Value::from(self.threshold as u64)),
            (
                2,
                Value::Array(self.keys.iter().map(CborEncode::to_tagged_cbor).collect()),
            ),
        ])
    }

    fn from_untagged_cbor(value: &Value, is_sorted: bool) -> Result<Self, DecodeError> {
        let map = CborMap::with(value)?;
        let threshold = cbor::to_u64(map.require(1)?)? as usize;
        let keys = cbor::to_array(map.require(2)?)?
            .iter()
            .map(DescriptorKeyExpression::from_tagged_cbor)
            .collect::<Result<Vec<_>, _>>()?;
        if threshold == 0 || threshold > keys.len() || keys.len() > crate::MAX_MULTISIG_KEYS {
            return Err(invalid(format!(
                "invalid {}-of-{} multisig",
                threshold,
                keys.len()
            )));
        }
        Ok(Multisig {
            threshold,
            keys,
            is_sorted,
        })
    }
}

impl DescriptorNode {
    /// Decodes script function from its untagged form; `tag` selects the
    /// function.
    pub fn from_untagged_cbor(tag: u64, value: &Value) -> Result<Self, DecodeError> {
        let key = || DescriptorKeyExpression::from_tagged_cbor(value);
        let inner = |parent: NodeKind| -> Result<Box<DescriptorNode>, DecodeError> {
            let inner = DescriptorNode::from_tagged_cbor(value)?;
            if !inner.kind().allowed_inside(Some(parent)) {
                return Err(invalid(format!("`{}` is not allowed inside `{}`", inner.kind(), parent)));
            }
            Ok(Box::new(inner))
        };
        Ok(match tag {
            tags::OUTPUT_SCRIPT_HASH => DescriptorNode::Sh(inner(NodeKind::Sh)?),
            tags::OUTPUT_WITNESS_SCRIPT_HASH => DescriptorNode::Wsh(inner(NodeKind::Wsh)?),
            tags::OUTPUT_PUBLIC_KEY => DescriptorNode::Pk(key()?),
            tags::OUTPUT_PUBLIC_KEY_HASH => DescriptorNode::Pkh(key()?),
            tags::OUTPUT_WITNESS_PUBLIC_KEY_HASH => DescriptorNode::Wpkh(key()?),
            tags::OUTPUT_COMBO => DescriptorNode::Combo(key()?),
            tags::OUTPUT_MULTISIG => DescriptorNode::Multi(Multisig::from_untagged_cbor(value, false)?),
            tags::OUTPUT_SORTED_MULTISIG => {
                DescriptorNode::Multi(Multisig::from_untagged_cbor(value, true)?)
            }
            tags::OUTPUT_RAW_SCRIPT => {
                DescriptorNode::Raw(Script::from(cbor::to_bytes_ref(value)?.to_vec()))
            }
            tags::OUTPUT_TAPROOT => {
                let key = key()?;
                if key.is_uncompressed() {
                    return Err(invalid("taproot key must be compressed"));
                }
                DescriptorNode::Tr(key)
            }
            tags::OUTPUT_COSIGNER => DescriptorNode::Cosigner(key()?),
            tags::ADDRESS => DescriptorNode::Addr(address_from_untagged_cbor(value)?),
            other => return Err(DecodeError::UnknownTag(other)),
        })
    }
}

impl CborEncode for DescriptorNode {
    fn cbor_tag(&self) -> u64 {
        match self {
            DescriptorNode::Raw(_) => tags::OUTPUT_RAW_SCRIPT,
            DescriptorNode::Pk(_) => tags::OUTPUT_PUBLIC_KEY,
            DescriptorNode::Pkh(_) => tags::OUTPUT_PUBLIC_KEY_HASH,
            DescriptorNode::Wpkh(_) => tags::OUTPUT_WITNESS_PUBLIC_KEY_HASH,
            DescriptorNode::Multi(Multisig { is_sorted: false, .. }) => tags::OUTPUT_MULTISIG,
            DescriptorNode::Multi(Multisig { is_sorted: true, .. }) => {
                tags::OUTPUT_SORTED_MULTISIG
            }
            DescriptorNode::Wsh(_) => tags::OUTPUT_WITNESS_SCRIPT_HASH,
            DescriptorNode::Sh(_) => tags::OUTPUT_SCRIPT_HASH,
            DescriptorNode::Tr(_) => tags::OUTPUT_TAPROOT,
            DescriptorNode::Addr(_) => tags::ADDRESS,
            DescriptorNode::Combo(_) => tags::OUTPUT_COMBO,
            DescriptorNode::Cosigner(_) => tags::OUTPUT_COSIGNER,
        }
    }

    fn to_untagged_cbor(&self) -> Value {
        match self {
            DescriptorNode::Raw(script) => Value::Bytes(script.to_bytes()),
            DescriptorNode::Pk(key)
            | DescriptorNode::Pkh(key)
            | DescriptorNode::Wpkh(key)
            | DescriptorNode::Tr(key)
            | DescriptorNode::Combo(key)
            | DescriptorNode::Cosigner(key) => key.to_tagged_cbor(),
            DescriptorNode::Multi(multi) => multi.to_untagged_cbor(),
            DescriptorNode::Wsh(inner) | DescriptorNode::Sh(inner) => inner.to_tagged_cbor(),
            DescriptorNode::Addr(address) => address_to_untagged_cbor(address),
        }
    }
}

impl CborDecode for DescriptorNode {
    fn from_tagged_cbor(value: &Value) -> Result<Self, DecodeError> {
        match value {
            Value::Tag(tag, inner) => Self::from_untagged_cbor(*tag, inner),
            _ => Err(DecodeError::UnexpectedType("tagged script function")),
        }
    }
}

/// Decodes tagged `crypto-address`
pub fn address_from_cbor(value: &Value) -> Result<Address, DecodeError> {
    address_from_untagged_cbor(cbor::untag(value, tags::ADDRESS)?)
}

/// Encodes address as tagged `crypto-address`
pub fn address_to_cbor(address: &Address) -> Value {
    Value::Tag(tags::ADDRESS, Box::new(address_to_untagged_cbor(address)))
}

#[cfg(test)]
mod test {
    use core::str::FromStr;

    use bitcoin::hashes::hex::{FromHex, ToHex};
    use secp256k1::SECP256K1;

    use super::*;
    use crate::{ComboOutput, Parser, ScriptContext};

    const PUBKEY: &str = "03a34b99f22c790c4e36b2b3c2c35a36db06226e41c692fc82b8b56ac1c540c5bd";
    const TV1_MASTER_XPRV: &str = "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LnF5kejMRNNU3TGtRBeJgk33yuGBxrMPHi";
    const TV1_0H_XPUB: &str = "xpub68Gmy5EdvgibQVfPdqkBBCHxA5htiqg55crXYuXoQRKfDBFA1WEjWgP6LHhwBZeNK1VTsfTFUHCdrfp1bgwQ9xv5ski8PX9rL2dZXvgGDnw";
    const TPUB: &str = "tpubD6NzVbkrYhZ4XHndKkuB8FifXm8r5FQHwrN6oZuWCz13qb93rtgKvD4PQsqC4HP4yhV3tA2fqr2RbY5mNXfM7RxXUoeABoDtsFUq2zJq6YK";

    fn parse(source: &str) -> DescriptorNode { Parser::with(source).unwrap().parse().unwrap() }

    fn round_trip(source: &str) {
        let node = parse(source);
        let bytes = node.to_cbor_bytes();
        let decoded = DescriptorNode::from_cbor_bytes(&bytes).unwrap();
        assert_eq!(decoded, node, "{}", source);
        assert_eq!(decoded.to_string(), source);
    }

    #[test]
    fn pkh_bytes() {
        let node = parse(&format!("pkh({})", PUBKEY));
        assert_eq!(
            node.to_cbor_bytes().to_hex(),
            format!("d90193d90132a1035821{}", PUBKEY)
        );
    }

    #[test]
    fn multisig_bytes() {
        let node = parse(&format!("sortedmulti(1,{})", PUBKEY));
        assert_eq!(
            node.to_cbor_bytes().to_hex(),
            format!("d90197a201010281d90132a1035821{}", PUBKEY)
        );
    }

    #[test]
    fn raw_bytes() {
        assert_eq!(parse("raw(deadbeef)").to_cbor_bytes().to_hex(), "d9019844deadbeef");
    }

    #[test]
    fn master_hdkey_bytes() {
        let xprv = ExtendedPrivKey::from_str(TV1_MASTER_XPRV).unwrap();
        let key = DescriptorKeyExpression::with(KeyMaterial::Hd(HdKey::with(xprv)));
        let bytes = key.to_cbor_bytes();
        assert_eq!(
            bytes.to_hex(),
            "d9012fa301f503582100e8f32e723decf4051aefac8e2c93c9c5b214313817cdb01a1494b917c8436b35045820873dff81c02f525623fd1fe5167eac3a55a049de3d314bb42ee227ffed37d508"
        );
        assert_eq!(DescriptorKeyExpression::from_cbor_bytes(&bytes).unwrap(), key);
    }

    #[test]
    fn hdkey_with_origin() {
        let source = format!("[3442193e/0']{}/<0;1>/*", TV1_0H_XPUB);
        let key = DescriptorKeyExpression::from_str(&source).unwrap();
        let value = key.to_tagged_cbor();
        let map = CborMap::with(cbor::untag(&value, tags::HDKEY).unwrap()).unwrap();
        assert!(map.get(1).is_none());
        assert!(map.get(2).is_none());
        assert!(map.get(5).is_none());
        assert_eq!(cbor::to_u32(map.require(8).unwrap()).unwrap(), 0x3442193e);
        let decoded = DescriptorKeyExpression::from_tagged_cbor(&value).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(decoded.to_string(), source);
    }

    #[test]
    fn hdkey_without_origin_keeps_child_number() {
        let key = DescriptorKeyExpression::from_str(TV1_0H_XPUB).unwrap();
        let value = key.to_tagged_cbor();
        let map = CborMap::with(cbor::untag(&value, tags::HDKEY).unwrap()).unwrap();
        let origin = DerivationPath::from_tagged_cbor(map.require(6).unwrap()).unwrap();
        assert_eq!(origin.fingerprint(), None);
        assert_eq!(origin.to_string(), "0'");
        let decoded = DescriptorKeyExpression::from_tagged_cbor(&value).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(decoded.origin, None);

        let xprv = ExtendedPrivKey::from_str(TV1_MASTER_XPRV).unwrap();
        let path = [ChildNumber::Hardened { index: 0 }, ChildNumber::Normal { index: 1 }];
        let xprv = xprv.derive_priv(SECP256K1, &path).unwrap();
        let key = DescriptorKeyExpression::with(KeyMaterial::Hd(HdKey::with(
            ExtendedPubKey::from_priv(SECP256K1, &xprv),
        )));
        let decoded = DescriptorKeyExpression::from_cbor_bytes(&key.to_cbor_bytes()).unwrap();
        assert_eq!(decoded, key);
        let KeyMaterial::Hd(hd) = decoded.key else {
            panic!("extended key expected")
        };
        assert_eq!(hd.key.depth(), 2);
        assert_eq!(hd.key.child_number(), ChildNumber::Normal { index: 1 });
    }

    #[test]
    fn wif_network_and_compression() {
        let uncompressed = "5HueCGU8rMjxEXxiPuD5BDku4MkFqeZyd4dZ1jvhTVqvbTLvyTJ";
        let testnet = "cVt4o7BGAig1UXywgGSmARhxMdzP5qvQsxKkSsc1XEkw3tDTQFpy";
        round_trip(&format!("combo({})", uncompressed));
        round_trip(&format!("pkh({})", uncompressed));
        round_trip(&format!("wpkh({})", testnet));

        let key = DescriptorKeyExpression::from_str(uncompressed).unwrap();
        let value = key.to_tagged_cbor();
        let map = CborMap::with(cbor::untag(&value, tags::ECKEY).unwrap()).unwrap();
        assert_eq!(map.get(4), None);
        assert_eq!(map.get(5), Some(&Value::Bool(false)));

        let key = DescriptorKeyExpression::from_str(testnet).unwrap();
        let value = key.to_tagged_cbor();
        let map = CborMap::with(cbor::untag(&value, tags::ECKEY).unwrap()).unwrap();
        assert_eq!(
            UseInfo::from_tagged_cbor(map.require(4).unwrap()).unwrap(),
            UseInfo::with(bitcoin_hd::Network::Testnet)
        );
        assert_eq!(map.get(5), None);

        let context = ScriptContext::new().with_combo_output(ComboOutput::Pkh);
        let combo = parse(&format!("combo({})", uncompressed));
        let decoded = DescriptorNode::from_cbor_bytes(&combo.to_cbor_bytes()).unwrap();
        assert_eq!(decoded.script_pubkey(&context), combo.script_pubkey(&context));
    }

    #[test]
    fn testnet_use_info() {
        let key = DescriptorKeyExpression::from_str(TPUB).unwrap();
        let value = key.to_tagged_cbor();
        let map = CborMap::with(cbor::untag(&value, tags::HDKEY).unwrap()).unwrap();
        assert_eq!(
            UseInfo::from_tagged_cbor(map.require(5).unwrap()).unwrap(),
            UseInfo::with(bitcoin_hd::Network::Testnet)
        );
        assert_eq!(DescriptorKeyExpression::from_tagged_cbor(&value).unwrap(), key);
    }

    #[test]
    fn descriptor_round_trips() {
        round_trip(&format!("wpkh([3442193e/0']{}/<0;1>/*)", TV1_0H_XPUB));
        round_trip(&format!("sh(wsh(multi(1,[3442193e/0']{}/0/*,{})))", TV1_0H_XPUB, PUBKEY));
        round_trip(&format!("sh(cosigner([3442193e/0']{}))", TV1_0H_XPUB));
        round_trip(&format!("tr({}/0/*)", TPUB));
        round_trip("combo(L4rK1yDtCWekvXuE6oXD9jCYfFNV2cWRpVuPLBcCU2z8TrisoyY1)");
        round_trip("pk(04a34b99f22c790c4e36b2b3c2c35a36db06226e41c692fc82b8b56ac1c540c5bd5b8dec5235a0fa8722476c7709c02559e3aa73aa03918ba2d492eea75abea235)");
        round_trip("raw(deadbeef)");
        round_trip("addr(bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4)");
        round_trip("addr(bc1qrp33g0q5c5txsp9arysrx4k6zdkfs4nce4xj0gdcccefvpysxf3qccfmv3)");
    }

    #[test]
    fn addresses() {
        let pk = PublicKey::from_str(PUBKEY).unwrap();
        let address = Address::p2pkh(&pk, bitcoin::Network::Bitcoin);
        assert_eq!(
            bitcoin_hd::cbor::to_bytes(&address_to_cbor(&address)).to_hex(),
            "d90133a2020003549a1c78a507689f6f54b847ad1cef1e614ee23f1e"
        );
        let testnet = Address::p2wpkh(&pk, bitcoin::Network::Testnet).unwrap();
        let value = address_to_cbor(&testnet);
        let map = CborMap::with(cbor::untag(&value, tags::ADDRESS).unwrap()).unwrap();
        assert_eq!(cbor::to_u64(map.require(2).unwrap()).unwrap(), 2);
        assert_eq!(address_from_cbor(&value).unwrap(), testnet);

        let p2sh = Address::from_str("3P14159f73E4gFr7JterCCQh9QjiTjiZrG").unwrap();
        assert_eq!(address_from_cbor(&address_to_cbor(&p2sh)).unwrap(), p2sh);

        let regtest = Address::p2wpkh(&pk, bitcoin::Network::Regtest).unwrap();
        let decoded = address_from_cbor(&address_to_cbor(&regtest)).unwrap();
        assert_eq!(decoded.network, bitcoin::Network::Testnet);
        assert_eq!(decoded.payload, regtest.payload);
    }

    #[test]
    fn decode_failures() {
        let pkh = parse(&format!("pkh({})", PUBKEY)).to_tagged_cbor();
        assert_eq!(
            DescriptorNode::from_untagged_cbor(999, &pkh),
            Err(DecodeError::UnknownTag(999))
        );
        let Value::Tag(_, key) = &pkh else { panic!("tagged value expected") };
        assert_eq!(
            DescriptorNode::from_tagged_cbor(key.as_ref()).unwrap_err(),
            DecodeError::UnknownTag(tags::ECKEY)
        );
        assert!(matches!(
            DescriptorNode::from_untagged_cbor(tags::OUTPUT_WITNESS_SCRIPT_HASH, &pkh),
            Ok(DescriptorNode::Wsh(_))
        ));
        let wpkh = parse(&format!("wpkh({})", PUBKEY)).to_tagged_cbor();
        assert!(DescriptorNode::from_untagged_cbor(tags::OUTPUT_WITNESS_SCRIPT_HASH, &wpkh).is_err());

        let empty = cbor::map(vec![]);
        assert_eq!(
            DescriptorKeyExpression::from_untagged_cbor(tags::ECKEY, &empty),
            Err(DecodeError::MissingField(3))
        );
        let multi = cbor::map(vec![(1, Value::from(2u64)), (2, Value::Array(vec![]))]);
        assert!(DescriptorNode::from_untagged_cbor(tags::OUTPUT_MULTISIG, &multi).is_err());
        let truncated = Vec::<u8>::from_hex("d90193d90132a1035821").unwrap();
        assert!(matches!(
            DescriptorNode::from_cbor_bytes(&truncated),
            Err(DecodeError::Malformed(_))
        ));
    }
}
