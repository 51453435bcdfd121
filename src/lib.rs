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

//! Account-level wallet interchange on top of output descriptors: catalogue
//! of standard account output types, descriptor bundles for an account
//! (`crypto-account`) and key requests, all encoded as tagged CBOR.

// Coding conventions
#![recursion_limit = "256"]
#![deny(dead_code, missing_docs)]

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate log;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde_crate as serde;

pub extern crate bitcoin_hd as hd;
pub extern crate descriptors;

mod account;
mod bundle;
mod request;

pub use account::{AccountError, AccountOutputType, KEY_PLACEHOLDER};
pub use bundle::{AccountDescriptors, OutputDescriptorBundle};
pub use request::{KeyRequestBody, KeyType};
