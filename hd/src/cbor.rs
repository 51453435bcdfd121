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

//! Tagged CBOR encoding shared by the derivation path, key, descriptor and
//! account types.
//!
//! Each encodable type has an *untagged* form (its own map, array or byte
//! string) and a *tagged* form wrapping it into a tag number from the
//! [`tags`] registry. Maps always use unsigned integer keys written in
//! ascending order; optional keys equal to their defaults are omitted.

use ciborium::value::{Integer, Value};

/// CBOR tag numbers from BCR-2020-006 registry.
pub mod tags {
    /// crypto-hdkey
    pub const HDKEY: u64 = 303;
    /// crypto-keypath
    pub const KEYPATH: u64 = 304;
    /// crypto-coin-info
    pub const COIN_INFO: u64 = 305;
    /// crypto-eckey
    pub const ECKEY: u64 = 306;
    /// crypto-address
    pub const ADDRESS: u64 = 307;
    /// crypto-output
    pub const OUTPUT: u64 = 308;
    /// crypto-account
    pub const ACCOUNT: u64 = 311;

    /// script-hash `sh()`
    pub const OUTPUT_SCRIPT_HASH: u64 = 400;
    /// witness-script-hash `wsh()`
    pub const OUTPUT_WITNESS_SCRIPT_HASH: u64 = 401;
    /// public-key `pk()`
    pub const OUTPUT_PUBLIC_KEY: u64 = 402;
    /// public-key-hash `pkh()`
    pub const OUTPUT_PUBLIC_KEY_HASH: u64 = 403;
    /// witness-public-key-hash `wpkh()`
    pub const OUTPUT_WITNESS_PUBLIC_KEY_HASH: u64 = 404;
    /// `combo()`
    pub const OUTPUT_COMBO: u64 = 405;
    /// `multi()`
    pub const OUTPUT_MULTISIG: u64 = 406;
    /// `sortedmulti()`
    pub const OUTPUT_SORTED_MULTISIG: u64 = 407;
    /// `raw()`
    pub const OUTPUT_RAW_SCRIPT: u64 = 408;
    /// `tr()`
    pub const OUTPUT_TAPROOT: u64 = 409;
    /// `cosigner()`
    pub const OUTPUT_COSIGNER: u64 = 410;

    /// Body of a key request
    pub const KEY_REQUEST_BODY: u64 = 501;
}

/// Errors decoding tagged CBOR structures
#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum DecodeError {
    /// malformed CBOR data: {0}
    Malformed(String),

    /// expected CBOR tag {0}, found tag {1}
    WrongTag(u64, u64),

    /// expected CBOR tag {0}, found untagged value
    Untagged(u64),

    /// CBOR tag {0} is not known in this context
    UnknownTag(u64),

    /// expected CBOR {0}
    UnexpectedType(&'static str),

    /// required CBOR map key {0} is absent
    MissingField(u64),

    /// invalid value: {0}
    InvalidValue(String),
}

/// Types which can be serialized into tagged CBOR
pub trait CborEncode {
    /// Tag number wrapping the untagged form of this value
    fn cbor_tag(&self) -> u64;

    /// Untagged CBOR form of this value
    fn to_untagged_cbor(&self) -> Value;

    /// Tagged CBOR form of this value
    fn to_tagged_cbor(&self) -> Value {
        Value::Tag(self.cbor_tag(), Box::new(self.to_untagged_cbor()))
    }

    /// Serializes tagged CBOR form into bytes
    fn to_cbor_bytes(&self) -> Vec<u8> { to_bytes(&self.to_tagged_cbor()) }
}

/// Types which can be deserialized from tagged CBOR
pub trait CborDecode: Sized {
    /// Decodes value from its tagged form, checking the tag first
    fn from_tagged_cbor(value: &Value) -> Result<Self, DecodeError>;

    /// Deserializes value from bytes containing tagged CBOR form
    fn from_cbor_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        Self::from_tagged_cbor(&from_bytes(bytes)?)
    }
}

/// Serializes CBOR value into bytes.
///
/// Writing into a `Vec` has no I/O errors and every [`Value`] variant has a
/// CBOR encoding, so serialization is infallible.
pub fn to_bytes(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .expect("in-memory CBOR writer does not fail on a valid value tree");
    buf
}

/// Deserializes CBOR value from bytes, requiring all of the bytes to be
/// consumed
pub fn from_bytes(mut bytes: &[u8]) -> Result<Value, DecodeError> {
    let value: Value = ciborium::de::from_reader(&mut bytes)
        .map_err(|err| DecodeError::Malformed(err.to_string()))?;
    if !bytes.is_empty() {
        return Err(DecodeError::Malformed(format!("{} trailing bytes", bytes.len())));
    }
    Ok(value)
}

/// Constructs CBOR map with unsigned integer keys, keeping the order of the
/// provided entries
pub fn map(entries: Vec<(u64, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(key, value)| (Value::from(key), value))
            .collect(),
    )
}

/// Returns tag number of a tagged value
pub fn tag_of(value: &Value) -> Option<u64> {
    match value {
        Value::Tag(tag, _) => Some(*tag),
        _ => None,
    }
}

/// Strips expected tag from the value, failing on any other tag
pub fn untag(value: &Value, expected: u64) -> Result<&Value, DecodeError> {
    match value {
        Value::Tag(tag, inner) if *tag == expected => Ok(inner),
        Value::Tag(tag, _) => Err(DecodeError::WrongTag(expected, *tag)),
        _ => Err(DecodeError::Untagged(expected)),
    }
}

/// Read access to a CBOR map with unsigned integer keys
#[derive(Clone, Copy, Debug)]
pub struct CborMap<'value>(&'value [(Value, Value)]);

impl<'value> CborMap<'value> {
    /// Wraps CBOR map value, failing if the value is not a map
    pub fn with(value: &'value Value) -> Result<Self, DecodeError> {
        match value {
            Value::Map(entries) => Ok(CborMap(entries)),
            _ => Err(DecodeError::UnexpectedType("map")),
        }
    }

    /// Returns value for the key, if present
    pub fn get(&self, key: u64) -> Option<&'value Value> {
        let key = Integer::from(key);
        self.0
            .iter()
            .find(|(k, _)| matches!(k, Value::Integer(k) if *k == key))
            .map(|(_, v)| v)
    }

    /// Returns value for the key, failing if it is absent
    pub fn require(&self, key: u64) -> Result<&'value Value, DecodeError> {
        self.get(key).ok_or(DecodeError::MissingField(key))
    }
}

/// Reads unsigned integer
pub fn to_u64(value: &Value) -> Result<u64, DecodeError> {
    match value {
        Value::Integer(int) => {
            u64::try_from(*int).map_err(|_| DecodeError::UnexpectedType("unsigned integer"))
        }
        _ => Err(DecodeError::UnexpectedType("unsigned integer")),
    }
}

/// Reads unsigned 32-bit integer
pub fn to_u32(value: &Value) -> Result<u32, DecodeError> {
    u32::try_from(to_u64(value)?)
        .map_err(|_| DecodeError::InvalidValue(s!("integer does not fit into 32 bits")))
}

/// Reads boolean
pub fn to_bool(value: &Value) -> Result<bool, DecodeError> {
    match value {
        Value::Bool(b) => Ok(*b),
        _ => Err(DecodeError::UnexpectedType("boolean")),
    }
}

/// Reads byte string
pub fn to_bytes_ref(value: &Value) -> Result<&[u8], DecodeError> {
    match value {
        Value::Bytes(bytes) => Ok(bytes),
        _ => Err(DecodeError::UnexpectedType("byte string")),
    }
}

/// Reads array
pub fn to_array(value: &Value) -> Result<&[Value], DecodeError> {
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(DecodeError::UnexpectedType("array")),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn map_lookup() {
        let value = map(vec![(1, Value::Bool(true)), (3, Value::from(7u64))]);
        let map = CborMap::with(&value).unwrap();
        assert_eq!(map.get(1), Some(&Value::Bool(true)));
        assert_eq!(map.get(2), None);
        assert_eq!(map.require(2), Err(DecodeError::MissingField(2)));
        assert_eq!(to_u64(map.require(3).unwrap()), Ok(7));
        assert_eq!(CborMap::with(&Value::Bool(false)).unwrap_err(), DecodeError::UnexpectedType("map"));
    }

    #[test]
    fn tag_checks() {
        let value = Value::Tag(tags::KEYPATH, Box::new(Value::Null));
        assert_eq!(untag(&value, tags::KEYPATH), Ok(&Value::Null));
        assert_eq!(untag(&value, tags::HDKEY), Err(DecodeError::WrongTag(tags::HDKEY, tags::KEYPATH)));
        assert_eq!(untag(&Value::Null, tags::HDKEY), Err(DecodeError::Untagged(tags::HDKEY)));
        assert_eq!(tag_of(&value), Some(tags::KEYPATH));
    }

    #[test]
    fn every_value_kind_serializes() {
        let value = Value::Array(vec![
            Value::from(7u64),
            Value::Bytes(vec![0xde, 0xad]),
            Value::Float(1.5),
            Value::Text(s!("text")),
            Value::Bool(false),
            Value::Null,
            Value::Tag(tags::ADDRESS, Box::new(Value::Array(vec![]))),
            map(vec![(1, Value::Null)]),
        ]);
        assert_eq!(from_bytes(&to_bytes(&value)), Ok(value));
    }

    #[test]
    fn bytes_round_trip() {
        let value = Value::Tag(tags::OUTPUT, Box::new(map(vec![(1, Value::Bytes(vec![1, 2]))])));
        let bytes = to_bytes(&value);
        assert_eq!(bytes, vec![0xd9, 0x01, 0x34, 0xa1, 0x01, 0x42, 0x01, 0x02]);
        assert_eq!(from_bytes(&bytes), Ok(value));
        assert!(matches!(from_bytes(&bytes[..4]), Err(DecodeError::Malformed(_))));
        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(matches!(from_bytes(&trailing), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn integer_types() {
        assert_eq!(to_u32(&Value::from(u32::MAX as u64)), Ok(u32::MAX));
        assert!(to_u32(&Value::from(u32::MAX as u64 + 1)).is_err());
        assert!(to_u64(&Value::from(-1i64)).is_err());
        assert!(to_bool(&Value::from(1u64)).is_err());
    }
}
