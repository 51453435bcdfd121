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
use core::str::FromStr;

use bitcoin::hashes::hex::{FromHex, ToHex};
use bitcoin::{Address, Network, Script};
use bitcoin_hd::cbor::{self, tags, CborDecode, CborEncode, DecodeError};
use ciborium::value::Value;

use crate::{descriptor_checksum, DescriptorKeyExpression, DescriptorNode, ParseError, Parser, ScriptContext};

const UR_PREFIX: &str = "ur:crypto-output/";

/// Parsed output descriptor together with its source text.
///
/// Two descriptors are equal when their script function trees are equal,
/// regardless of the formatting of the source text.
#[derive(Clone, Debug)]
pub struct OutputDescriptor {
    source: String,
    ast: DescriptorNode,
}

impl PartialEq for OutputDescriptor {
    fn eq(&self, other: &Self) -> bool { self.ast == other.ast }
}

impl Eq for OutputDescriptor {}

impl From<DescriptorNode> for OutputDescriptor {
    fn from(ast: DescriptorNode) -> Self {
        OutputDescriptor {
            source: ast.to_string(),
            ast,
        }
    }
}

impl OutputDescriptor {
    /// Source text the descriptor was parsed from, without checksum
    #[inline]
    pub fn source(&self) -> &str { &self.source }

    /// Script function tree
    #[inline]
    pub fn ast(&self) -> &DescriptorNode { &self.ast }

    /// Renders script-pubkey, see [`DescriptorNode::script_pubkey`]
    #[inline]
    pub fn script_pubkey(&self, context: &ScriptContext) -> Option<Script> {
        self.ast.script_pubkey(context)
    }

    /// Address for the script-pubkey on the given network, if the script has
    /// an address form
    pub fn address(&self, context: &ScriptContext, network: Network) -> Option<Address> {
        Address::from_script(&self.script_pubkey(context)?, network).ok()
    }

    /// Detects descriptors which need a wildcard child index to produce
    /// scripts
    #[inline]
    pub fn requires_wildcard_child_num(&self) -> bool { self.ast.requires_wildcard_child_num() }

    /// Detects descriptors containing extended keys
    pub fn is_derivable(&self) -> bool {
        self.ast
            .keys()
            .into_iter()
            .any(DescriptorKeyExpression::is_hd)
    }

    /// Key expressions in the order of their appearance
    #[inline]
    pub fn keys(&self) -> Vec<&DescriptorKeyExpression> { self.ast.keys() }

    /// First key expression of the descriptor
    #[inline]
    pub fn base_key(&self) -> Option<&DescriptorKeyExpression> { self.ast.keys().first().copied() }

    /// Descriptor checksum of the canonical text
    pub fn checksum(&self) -> Option<String> { descriptor_checksum(&self.ast.to_string()) }

    /// Single-part UR text of the descriptor: `ur:crypto-output/` followed by
    /// hex-encoded CBOR payload
    pub fn to_ur_string(&self) -> String {
        format!("{}{}", UR_PREFIX, cbor::to_bytes(&self.to_untagged_cbor()).to_hex())
    }

    /// Parses single-part UR text produced by
    /// [`OutputDescriptor::to_ur_string`]
    pub fn from_ur_string(ur: &str) -> Result<Self, DecodeError> {
        let lowercase = ur.to_lowercase();
        let payload = lowercase
            .strip_prefix(UR_PREFIX)
            .ok_or_else(|| DecodeError::Malformed(format!("UR must start with `{}`", UR_PREFIX)))?;
        let bytes = Vec::<u8>::from_hex(payload)
            .map_err(|err| DecodeError::Malformed(err.to_string()))?;
        Self::from_untagged_cbor(&cbor::from_bytes(&bytes)?)
    }

    /// Decodes descriptor from the untagged `crypto-output` form, which is a
    /// tagged script function
    pub fn from_untagged_cbor(value: &Value) -> Result<Self, DecodeError> {
        DescriptorNode::from_tagged_cbor(value).map(OutputDescriptor::from)
    }
}

impl CborEncode for OutputDescriptor {
    fn cbor_tag(&self) -> u64 { tags::OUTPUT }

    fn to_untagged_cbor(&self) -> Value { self.ast.to_tagged_cbor() }
}

impl CborDecode for OutputDescriptor {
    fn from_tagged_cbor(value: &Value) -> Result<Self, DecodeError> {
        OutputDescriptor::from_untagged_cbor(cbor::untag(value, tags::OUTPUT)?)
    }
}

/// Parses descriptor text with an optional `#checksum` suffix, which is
/// verified when present.
impl FromStr for OutputDescriptor {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (source, checksum) = match s.rsplit_once('#') {
            Some((source, checksum)) => (source, Some(checksum)),
            None => (s, None),
        };
        let ast = Parser::with(source)?.parse()?;
        if let Some(checksum) = checksum {
            let expected = descriptor_checksum(source).ok_or_else(|| {
                ParseError::with_message("descriptor contains non-checksummable characters", s)
            })?;
            if checksum != expected {
                let mut err = ParseError::with_message(
                    format!("invalid checksum `{}`, expected `{}`", checksum, expected),
                    s,
                );
                err.offset = source.len() + 1;
                return Err(err);
            }
        }
        Ok(OutputDescriptor {
            source: source.to_owned(),
            ast,
        })
    }
}

/// Alternate form (`{:#}`) appends the descriptor checksum.
impl Display for OutputDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.ast, f)?;
        match self.checksum() {
            Some(checksum) if f.alternate() => write!(f, "#{}", checksum),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use bitcoin_hd::ChildIndex;

    use super::*;
    use crate::ComboOutput;

    const PUBKEY: &str = "03a34b99f22c790c4e36b2b3c2c35a36db06226e41c692fc82b8b56ac1c540c5bd";
    const TV1_MASTER_XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";

    #[test]
    fn checksum() {
        let descriptor = OutputDescriptor::from_str("raw(deadbeef)#89f8spxm").unwrap();
        assert_eq!(descriptor.source(), "raw(deadbeef)");
        assert_eq!(descriptor.to_string(), "raw(deadbeef)");
        assert_eq!(format!("{:#}", descriptor), "raw(deadbeef)#89f8spxm");

        let err = OutputDescriptor::from_str("raw(deadbeef)#89f8spxx").unwrap_err();
        assert_eq!(err.offset, 14);
        assert_eq!(err.message, "invalid checksum `89f8spxx`, expected `89f8spxm`");
    }

    #[test]
    fn scripts_and_addresses() {
        let pkh = OutputDescriptor::from_str(&format!("pkh({})", PUBKEY)).unwrap();
        let context = ScriptContext::new();
        assert_eq!(
            pkh.script_pubkey(&context).unwrap().to_hex(),
            "76a9149a1c78a507689f6f54b847ad1cef1e614ee23f1e88ac"
        );
        assert_eq!(
            pkh.address(&context, Network::Bitcoin).unwrap().to_string(),
            "1F3sAm6ZtwLAUnj7d38pGFxtP3RVEvtsbV"
        );

        let combo = OutputDescriptor::from_str(&format!("combo({})", PUBKEY)).unwrap();
        assert_eq!(combo.address(&context, Network::Bitcoin), None);
        let context = context.with_combo_output(ComboOutput::ShWpkh);
        assert_eq!(
            combo.address(&context, Network::Bitcoin).unwrap().to_string(),
            "3DnW8JGpPViEZdpqat8qky1zc26EKbXnmM"
        );

        let raw = OutputDescriptor::from_str("raw(deadbeef)").unwrap();
        assert_eq!(raw.address(&ScriptContext::new(), Network::Bitcoin), None);
    }

    #[test]
    fn keys() {
        let source = format!("sh(multi(1,[d34db33f/48'/0'/0'/1']{}/0/*,{}))", TV1_MASTER_XPUB, PUBKEY);
        let descriptor = OutputDescriptor::from_str(&source).unwrap();
        assert!(descriptor.is_derivable());
        assert!(descriptor.requires_wildcard_child_num());
        assert_eq!(descriptor.keys().len(), 2);
        assert_eq!(descriptor.base_key().unwrap().master_fingerprint(), Some(0xd34db33f));
        assert!(descriptor.script_pubkey(&ScriptContext::new()).is_none());
        let context = ScriptContext::new().with_wildcard_child(ChildIndex::with(3).unwrap());
        assert!(descriptor.script_pubkey(&context).is_some());

        let plain = OutputDescriptor::from_str(&format!("wpkh({})", PUBKEY)).unwrap();
        assert!(!plain.is_derivable());
        assert!(!plain.requires_wildcard_child_num());
        assert!(OutputDescriptor::from_str("raw(deadbeef)")
            .unwrap()
            .base_key()
            .is_none());
    }

    #[test]
    fn equality_ignores_formatting() {
        let a = OutputDescriptor::from_str(&format!("wpkh([d34db33f/84h/0h/0h]{}/0/*)", TV1_MASTER_XPUB)).unwrap();
        let b = OutputDescriptor::from_str(&format!("wpkh([d34db33f/84'/0'/0']{}/0/*)", TV1_MASTER_XPUB)).unwrap();
        assert_ne!(a.source(), b.source());
        assert_eq!(a, b);
    }

    #[test]
    fn ur() {
        let descriptor = OutputDescriptor::from_str(&format!("pkh({})", PUBKEY)).unwrap();
        let ur = descriptor.to_ur_string();
        assert_eq!(ur, format!("ur:crypto-output/d90193d90132a1035821{}", PUBKEY));
        assert_eq!(OutputDescriptor::from_ur_string(&ur).unwrap(), descriptor);
        assert_eq!(OutputDescriptor::from_ur_string(&ur.to_uppercase()).unwrap(), descriptor);
        assert!(OutputDescriptor::from_ur_string("ur:crypto-account/d90193").is_err());

        let bytes = descriptor.to_cbor_bytes();
        assert_eq!(bytes[..3], [0xd9, 0x01, 0x34]);
        assert_eq!(OutputDescriptor::from_cbor_bytes(&bytes).unwrap(), descriptor);
    }
}
