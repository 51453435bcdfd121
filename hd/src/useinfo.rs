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

use ciborium::value::Value;

use crate::cbor::{self, CborDecode, CborEncode, CborMap, DecodeError};

/// Network a key or an address is used on
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub enum Network {
    /// Bitcoin mainnet
    #[default]
    #[display("mainnet")]
    Mainnet,

    /// Any of test networks
    #[display("testnet")]
    Testnet,
}

impl From<Network> for bitcoin::Network {
    fn from(network: Network) -> Self {
        match network {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
        }
    }
}

impl From<bitcoin::Network> for Network {
    fn from(network: bitcoin::Network) -> Self {
        match network {
            bitcoin::Network::Bitcoin => Network::Mainnet,
            bitcoin::Network::Testnet | bitcoin::Network::Signet | bitcoin::Network::Regtest => {
                Network::Testnet
            }
        }
    }
}

impl Network {
    /// Integer value used in CBOR encoding
    pub fn value(self) -> u64 {
        match self {
            Network::Mainnet => 0,
            Network::Testnet => 1,
        }
    }

    /// Detects if the network is a testnet
    #[inline]
    pub fn is_testnet(self) -> bool { self == Network::Testnet }
}

impl TryFrom<u64> for Network {
    type Error = DecodeError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Network::Mainnet),
            1 => Ok(Network::Testnet),
            other => Err(DecodeError::InvalidValue(format!("unknown network {}", other))),
        }
    }
}

/// Asset a key is used for, identified by SLIP-44 coin type
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub enum Asset {
    /// Bitcoin
    #[default]
    #[display("btc")]
    Btc,

    /// Ether
    #[display("eth")]
    Eth,
}

impl Asset {
    /// SLIP-44 coin type of the asset on the main network
    pub fn coin_type(self) -> u32 {
        match self {
            Asset::Btc => 0,
            Asset::Eth => 60,
        }
    }
}

impl TryFrom<u64> for Asset {
    type Error = DecodeError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Asset::Btc),
            60 => Ok(Asset::Eth),
            other => Err(DecodeError::InvalidValue(format!("unknown coin type {}", other))),
        }
    }
}

/// Information on the asset and network a key or an address is intended for
/// (`crypto-coin-info`).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[display("{asset}/{network}")]
pub struct UseInfo {
    /// Asset type
    pub asset: Asset,

    /// Network
    pub network: Network,
}

impl UseInfo {
    /// Constructs use info for bitcoin on the given network
    #[inline]
    pub fn with(network: Network) -> Self {
        UseInfo {
            asset: Asset::Btc,
            network,
        }
    }

    /// Detects bitcoin mainnet, which is the default use
    #[inline]
    pub fn is_default(&self) -> bool { *self == UseInfo::default() }

    /// Coin type used in BIP-44-like derivation paths: `1` on any testnet,
    /// SLIP-44 asset value otherwise.
    pub fn coin_type(&self) -> u32 {
        match self.network {
            Network::Testnet => 1,
            Network::Mainnet => self.asset.coin_type(),
        }
    }

    /// Decodes use info from its untagged CBOR map, defaulting absent fields
    pub fn from_untagged_cbor(value: &Value) -> Result<Self, DecodeError> {
        let map = CborMap::with(value)?;
        let asset = match map.get(1) {
            Some(value) => Asset::try_from(cbor::to_u64(value)?)?,
            None => Asset::default(),
        };
        let network = match map.get(2) {
            Some(value) => Network::try_from(cbor::to_u64(value)?)?,
            None => Network::default(),
        };
        Ok(UseInfo { asset, network })
    }
}

impl CborEncode for UseInfo {
    fn cbor_tag(&self) -> u64 { cbor::tags::COIN_INFO }

    fn to_untagged_cbor(&self) -> Value {
        let mut entries = vec![];
        if self.asset != Asset::default() {
            entries.push((1, Value::from(self.asset.coin_type() as u64)));
        }
        if self.network != Network::default() {
            entries.push((2, Value::from(self.network.value())));
        }
        cbor::map(entries)
    }
}

impl CborDecode for UseInfo {
    fn from_tagged_cbor(value: &Value) -> Result<Self, DecodeError> {
        UseInfo::from_untagged_cbor(cbor::untag(value, cbor::tags::COIN_INFO)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn coin_type() {
        assert_eq!(UseInfo::with(Network::Mainnet).coin_type(), 0);
        assert_eq!(UseInfo::with(Network::Testnet).coin_type(), 1);
        let eth = UseInfo {
            asset: Asset::Eth,
            network: Network::Mainnet,
        };
        assert_eq!(eth.coin_type(), 60);
    }

    #[test]
    fn default_is_empty_map() {
        let info = UseInfo::default();
        assert!(info.is_default());
        assert_eq!(info.to_cbor_bytes(), vec![0xd9, 0x01, 0x31, 0xa0]);
        assert_eq!(UseInfo::from_cbor_bytes(&[0xd9, 0x01, 0x31, 0xa0]).unwrap(), info);
    }

    #[test]
    fn testnet_round_trip() {
        let info = UseInfo::with(Network::Testnet);
        assert_eq!(info.to_cbor_bytes(), vec![0xd9, 0x01, 0x31, 0xa1, 0x02, 0x01]);
        assert_eq!(UseInfo::from_cbor_bytes(&info.to_cbor_bytes()).unwrap(), info);
        assert!(UseInfo::from_untagged_cbor(&cbor::map(vec![(2, Value::from(7u64))])).is_err());
    }

    #[test]
    fn bitcoin_network() {
        assert_eq!(Network::from(bitcoin::Network::Signet), Network::Testnet);
        assert_eq!(bitcoin::Network::from(Network::Mainnet), bitcoin::Network::Bitcoin);
    }
}
