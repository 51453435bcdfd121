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

//! Library with hierarchical deterministic derivation paths used in output
//! descriptors.
//!
//! Includes wildcard and receive/change pair steps, master key origins,
//! account-level path templates and tagged CBOR encoding of paths and
//! use-info.

// Coding conventions
#![recursion_limit = "256"]
#![deny(dead_code)]
#![warn(missing_docs)]

#[macro_use]
extern crate amplify;

#[cfg(feature = "serde")]
#[macro_use]
extern crate serde_crate as serde;

pub mod cbor;
mod indexes;
mod path;
mod segments;
pub mod standards;
mod useinfo;

pub use indexes::{Chain, ChildIndex, ChildIndexSpec, IndexOverflow};
pub use path::{DerivationPath, DerivationPathOrigin, PathParseError, WildcardPolicy};
pub use segments::{BasicStep, DerivationStep, PairStep};
pub use standards::PathTemplate;
pub use useinfo::{Asset, Network, UseInfo};

/// Constant determining BIP32 boundary for u32 values after which index
/// is treated as hardened
pub const HARDENED_INDEX_BOUNDARY: u32 = 1 << 31;
