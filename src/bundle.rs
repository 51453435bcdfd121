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

//! Bundle of account descriptors of different output types derived from a
//! single master key (`crypto-account`).

use std::collections::BTreeMap;

use bitcoin::hashes::hex::ToHex;
use bitcoin_hd::cbor::{self, tags, CborDecode, CborEncode, CborMap, DecodeError};
use bitcoin_hd::{DerivationPathOrigin, Network};
use ciborium::value::Value;
use descriptors::{OutputDescriptor, XKey};

use crate::AccountOutputType;

const UR_PREFIX: &str = "ur:crypto-account/";

/// Account descriptors of a master key as they are transferred between
/// wallets: master key fingerprint and the list of descriptors.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AccountDescriptors {
    /// Master key fingerprint
    pub master_fingerprint: u32,

    /// Account descriptors
    pub descriptors: Vec<OutputDescriptor>,
}

impl AccountDescriptors {
    /// Decodes account descriptors from the untagged `crypto-account` map
    pub fn from_untagged_cbor(value: &Value) -> Result<Self, DecodeError> {
        let map = CborMap::with(value)?;
        let master_fingerprint = cbor::to_u32(map.require(1)?)?;
        let descriptors = cbor::to_array(map.require(2)?)?
            .iter()
            .map(OutputDescriptor::from_tagged_cbor)
            .collect::<Result<_, _>>()?;
        Ok(AccountDescriptors {
            master_fingerprint,
            descriptors,
        })
    }
}

impl CborEncode for AccountDescriptors {
    fn cbor_tag(&self) -> u64 { tags::ACCOUNT }

    fn to_untagged_cbor(&self) -> Value {
        cbor::map(vec![
            (1, Value::from(self.master_fingerprint as u64)),
            (
                2,
                Value::Array(self.descriptors.iter().map(CborEncode::to_tagged_cbor).collect()),
            ),
        ])
    }
}

impl CborDecode for AccountDescriptors {
    fn from_tagged_cbor(value: &Value) -> Result<Self, DecodeError> {
        AccountDescriptors::from_untagged_cbor(cbor::untag(value, tags::ACCOUNT)?)
    }
}

/// Descriptors for an account of a master key, one per output type.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct OutputDescriptorBundle {
    master_key: XKey,
    network: Network,
    account: u32,
    descriptors: Vec<OutputDescriptor>,
    descriptors_by_output_type: BTreeMap<AccountOutputType, OutputDescriptor>,
}

impl OutputDescriptorBundle {
    /// Derives account descriptors for each of the output types. Returns
    /// `None` if the key is not a master key, the list of output types is
    /// empty, or any of the descriptors can't be derived.
    pub fn new(
        master_key: XKey,
        network: Network,
        account: u32,
        output_types: &[AccountOutputType],
    ) -> Option<Self> {
        if !master_key.is_master() || output_types.is_empty() {
            warn!(
                "Unable to bundle account descriptors: {}",
                if output_types.is_empty() { "no output types given" } else { "not a master key" }
            );
            return None;
        }
        let descriptors = output_types
            .iter()
            .map(|ty| ty.account_descriptor(&master_key, network, account))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| warn!("Unable to bundle account descriptors: {}", err))
            .ok()?;
        let descriptors_by_output_type = output_types
            .iter()
            .copied()
            .zip(descriptors.iter().cloned())
            .collect();
        debug!(
            "Bundled {} descriptors for {} account #{}",
            descriptors.len(),
            network,
            account
        );
        Some(OutputDescriptorBundle {
            master_key,
            network,
            account,
            descriptors,
            descriptors_by_output_type,
        })
    }

    /// Bundles descriptors for all of [`AccountOutputType::BUNDLE_CASES`]
    #[inline]
    pub fn with_bundle_cases(master_key: XKey, network: Network, account: u32) -> Option<Self> {
        OutputDescriptorBundle::new(master_key, network, account, &AccountOutputType::BUNDLE_CASES)
    }

    /// Master key the descriptors are derived from
    #[inline]
    pub fn master_key(&self) -> XKey { self.master_key }

    /// Fingerprint of the master key
    pub fn master_fingerprint(&self) -> u32 {
        DerivationPathOrigin::with(self.master_key.fingerprint())
            .fingerprint()
            .unwrap_or_default()
    }

    /// Network of the account
    #[inline]
    pub fn network(&self) -> Network { self.network }

    /// Account number
    #[inline]
    pub fn account(&self) -> u32 { self.account }

    /// Descriptors in the order of the output types they were derived for
    #[inline]
    pub fn descriptors(&self) -> &[OutputDescriptor] { &self.descriptors }

    /// Descriptor derived for the output type
    #[inline]
    pub fn descriptor_for(&self, output_type: &AccountOutputType) -> Option<&OutputDescriptor> {
        self.descriptors_by_output_type.get(output_type)
    }

    /// Fingerprint and descriptors, as they are encoded into CBOR
    pub fn to_account_descriptors(&self) -> AccountDescriptors {
        AccountDescriptors {
            master_fingerprint: self.master_fingerprint(),
            descriptors: self.descriptors.clone(),
        }
    }

    /// Single-part UR text: `ur:crypto-account/` followed by hex-encoded
    /// untagged CBOR
    pub fn to_ur_string(&self) -> String {
        format!("{}{}", UR_PREFIX, cbor::to_bytes(&self.to_untagged_cbor()).to_hex())
    }
}

impl CborEncode for OutputDescriptorBundle {
    fn cbor_tag(&self) -> u64 { tags::ACCOUNT }

    fn to_untagged_cbor(&self) -> Value { self.to_account_descriptors().to_untagged_cbor() }
}
