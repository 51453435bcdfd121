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

use bitcoin::hashes::hex::ToHex;
use bitcoin::hashes::{hash160, Hash};
use bitcoin::util::bip32::ExtendedPrivKey;
use descriptor_ur::descriptors::{ComboOutput, OutputDescriptor, ScriptContext, XKey};
use descriptor_ur::hd::cbor::{CborDecode, CborEncode};
use descriptor_ur::hd::{Chain, ChildIndex, DerivationPath, DerivationStep, Network, UseInfo};
use descriptor_ur::{
    AccountDescriptors, AccountOutputType, KeyRequestBody, KeyType, OutputDescriptorBundle,
};

const TV1_MASTER_XPRV: &str = "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LnF5kejMRNNU3TGtRBeJgk33yuGBxrMPHi";
const PUBKEY: &str = "03a34b99f22c790c4e36b2b3c2c35a36db06226e41c692fc82b8b56ac1c540c5bd";
const ACCOUNT_XPUB: &str = "xpub6CDEarkRoiwWPj3n3gYygGwgoGchxYg3g6Zs5L2nB4B6wdojzcWCKKHMu9XuY1GyYygRfrVembjAko1T5xTsxj7ecKXxEPzDxx7nCK8Dxtx";
const UNCOMPRESSED: &str = "04a34b99f22c790c4e36b2b3c2c35a36db06226e41c692fc82b8b56ac1c540c5bd5b8dec5235a0fa8722476c7709c02559e3aa73aa03918ba2d492eea75abea235";

fn master() -> XKey { XKey::Private(ExtendedPrivKey::from_str(TV1_MASTER_XPRV).unwrap()) }

fn context(chain: Chain, index: u32) -> ScriptContext<'static> {
    ScriptContext::new()
        .with_chain(chain)
        .with_wildcard_child(ChildIndex::with(index).unwrap())
}

fn address(descriptor: &OutputDescriptor, chain: Chain, index: u32) -> String {
    descriptor
        .address(&context(chain, index), bitcoin::Network::Bitcoin)
        .unwrap()
        .to_string()
}

#[test]
fn pkh_account_addresses() {
    let descriptor = AccountOutputType::PKH
        .account_descriptor(&master(), Network::Mainnet, 0)
        .unwrap();
    assert_eq!(
        descriptor.to_string(),
        "pkh([3442193e/44'/0'/0']xpub6CDEarkRoiwWPj3n3gYygGwgoGchxYg3g6Zs5L2nB4B6wdojzcWCKKHMu9XuY1GyYygRfrVembjAko1T5xTsxj7ecKXxEPzDxx7nCK8Dxtx/<0;1>/*)"
    );
    assert_eq!(address(&descriptor, Chain::External, 0), "1NQpH6Nf8QtR2HphLRcvuVqfhXBXsiWn8r");
    assert_eq!(address(&descriptor, Chain::Internal, 0), "1EKtZ7DbxaSB7HB4JtZhmfoc9W8kvd2AtE");
    assert_eq!(descriptor.script_pubkey(&ScriptContext::new()), None);

    let reparsed = OutputDescriptor::from_str(&format!("{:#}", descriptor)).unwrap();
    assert_eq!(reparsed, descriptor);
    assert_eq!(OutputDescriptor::from_cbor_bytes(&descriptor.to_cbor_bytes()).unwrap(), descriptor);
}

#[test]
fn catalogue_lookup() {
    for ty in AccountOutputType::BUNDLE_CASES {
        assert_eq!(AccountOutputType::from_str(ty.id()).unwrap(), ty);
        let path = ty.account_derivation_path(Network::Testnet, 7).unwrap();
        assert_eq!(AccountOutputType::first_matching(&path), Some(ty));
    }
    assert!(AccountOutputType::from_str("p2pkh").is_err());

    let path = DerivationPath::from_str("84'/0'/0'/0/0").unwrap();
    assert_eq!(AccountOutputType::first_matching(&path), None);
}

#[test]
fn catalogue_coverage_on_mainnet() {
    for ty in AccountOutputType::BUNDLE_CASES {
        let path = ty.account_derivation_path(Network::Mainnet, 0).unwrap();
        for other in AccountOutputType::BUNDLE_CASES {
            assert_eq!(other.matches_path(&path), other == ty, "{} as {}", path, other.id());
        }
        assert_eq!(AccountOutputType::first_matching(&path), Some(ty));

        let mut longer = path.clone();
        longer.push(DerivationStep::from_str("0'").unwrap());
        assert_eq!(AccountOutputType::first_matching(&longer), None, "{}", longer);
    }
    for path in ["44'/0'/0", "44/0'/0'", "45", "48'/0'/0'/2", "86'/0'"] {
        let path = DerivationPath::from_str(path).unwrap();
        assert_eq!(AccountOutputType::first_matching(&path), None, "{}", path);
    }
}

#[test]
fn wpkh_script_from_hd_key() {
    let descriptor = AccountOutputType::WPKH
        .account_descriptor(&master(), Network::Mainnet, 0)
        .unwrap();
    for chain in [Chain::External, Chain::Internal] {
        for index in [0, 1, 1000] {
            let context = context(chain, index);
            let script = descriptor.script_pubkey(&context).unwrap();
            let key = descriptor.base_key().unwrap().resolve(&context).unwrap();
            assert!(key.compressed);
            let mut expected = vec![0x00, 0x14];
            expected.extend_from_slice(&hash160::Hash::hash(&key.to_bytes())[..]);
            assert_eq!(script.as_bytes(), &expected[..]);
        }
    }
}

#[test]
fn rendering_is_idempotent() {
    let sources = [
        "raw(deadbeef)".to_owned(),
        format!("pk({})", PUBKEY),
        format!("pkh([3442193e/44h/0h/0h]{}/<0;1>/*)", ACCOUNT_XPUB),
        format!("wpkh({})", PUBKEY),
        format!("multi(1,{},{}/0/*)", PUBKEY, ACCOUNT_XPUB),
        format!("sortedmulti(2,{},{})", UNCOMPRESSED, PUBKEY),
        format!("wsh(multi(1,{},{}/1/*))", PUBKEY, ACCOUNT_XPUB),
        format!("sh(wpkh({}))", PUBKEY),
        format!("tr({}/<0;1>/*)", ACCOUNT_XPUB),
        "addr(bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4)".to_owned(),
        format!("combo({})", PUBKEY),
        format!("sh(wsh(cosigner([3442193e/48h/0h/0h/1h]{}/<0;1>/*)))", ACCOUNT_XPUB),
    ];
    let context = context(Chain::Internal, 3).with_combo_output(ComboOutput::ShWpkh);
    for source in sources {
        let descriptor = OutputDescriptor::from_str(&source).unwrap();
        let rendered = descriptor.to_string();
        let reparsed = OutputDescriptor::from_str(&rendered).unwrap();
        assert_eq!(reparsed.to_string(), rendered);
        assert_eq!(reparsed, descriptor);
        assert_eq!(descriptor.script_pubkey(&context), descriptor.script_pubkey(&context));
        assert_eq!(reparsed.script_pubkey(&context), descriptor.script_pubkey(&context));
    }
}

#[test]
fn segwit_rejects_uncompressed_keys() {
    let context = ScriptContext::new();
    let legacy = OutputDescriptor::from_str(&format!("pkh({})", UNCOMPRESSED)).unwrap();
    assert!(legacy.script_pubkey(&context).is_some());

    for source in [
        format!("wpkh({})", UNCOMPRESSED),
        format!("wsh(multi(1,{},{}))", PUBKEY, UNCOMPRESSED),
        format!("sh(wpkh({}))", UNCOMPRESSED),
    ] {
        let descriptor = OutputDescriptor::from_str(&source).unwrap();
        assert_eq!(descriptor.script_pubkey(&context), None, "{}", source);
    }
    assert!(OutputDescriptor::from_str(&format!("tr({})", UNCOMPRESSED)).is_err());
}

#[test]
fn bundle_exchange() {
    let bundle = OutputDescriptorBundle::with_bundle_cases(master(), Network::Mainnet, 0).unwrap();
    let decoded = AccountDescriptors::from_cbor_bytes(&bundle.to_cbor_bytes()).unwrap();
    assert_eq!(decoded.master_fingerprint, 0x3442193e);
    assert_eq!(decoded.descriptors, bundle.descriptors());

    let pkh = bundle.descriptor_for(&AccountOutputType::PKH).unwrap();
    assert_eq!(address(pkh, Chain::External, 0), "1NQpH6Nf8QtR2HphLRcvuVqfhXBXsiWn8r");
}

#[test]
fn key_request() {
    let request = KeyRequestBody::with(
        KeyType::Public,
        DerivationPath::from_str("48'/0'/0'/2'").unwrap(),
        UseInfo::default(),
    );
    let bytes = request.to_cbor_bytes();
    assert_eq!(bytes.to_hex(), "d901f5a201f402d90130a101881830f500f500f502f5");
    assert_eq!(KeyRequestBody::from_cbor_bytes(&bytes).unwrap(), request);
}
