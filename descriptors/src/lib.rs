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

// Coding conventions
#![recursion_limit = "256"]
#![deny(dead_code)]
#![warn(missing_docs)]

//! Output descriptors: parsing of the textual form, script-pubkey rendering
//! and tagged CBOR encoding.
//!
//! General workflow:
//! ```text
//! Text -> Tokens -> DescriptorNode -> Script (per wildcard child & chain)
//!
//! DescriptorNode <-> tagged CBOR <-> ur:crypto-output
//! ```

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate log;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde_crate as serde;

mod ast;
mod cbor;
mod checksum;
mod context;
mod descriptor;
mod key;
mod parser;
mod token;

pub use ast::{DescriptorNode, Multisig, NodeKind, MAX_MULTISIG_KEYS};
pub use cbor::{
    address_from_cbor, address_from_untagged_cbor, address_to_cbor, address_to_untagged_cbor,
};
pub use checksum::descriptor_checksum;
pub use context::{ComboOutput, PrivateKeyProvider, ScriptContext};
pub use descriptor::OutputDescriptor;
pub use key::{DescriptorKeyExpression, HdKey, KeyMaterial, XKey};
pub use parser::{ParseError, Parser};
pub use token::{lex, Keyword, LexError, Token, TokenKind};
