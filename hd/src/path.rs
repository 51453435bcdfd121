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

use core::fmt::{self, Display, Formatter};
use core::str::FromStr;
use std::ops::Deref;

use bitcoin::util::bip32::{self, ChildNumber, Fingerprint};
use ciborium::value::Value;

use crate::cbor::{self, CborDecode, CborEncode, CborMap, DecodeError};
use crate::{BasicStep, Chain, ChildIndex, ChildIndexSpec, DerivationStep, IndexOverflow, PairStep};

/// Errors in parsing textual derivation path representation
#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum PathParseError {
    /// invalid derivation index `{0}`
    InvalidIndex(String),

    /// {0}
    #[from]
    IndexOverflow(IndexOverflow),

    /// invalid master key fingerprint `{0}`
    InvalidFingerprint(String),

    /// invalid receive/change index pair `{0}`
    InvalidPairStep(String),

    /// wildcards are not allowed inside receive/change index pair
    WildcardInPair,

    /// wildcard is allowed only as the last derivation step
    WildcardNotLast,

    /// derivation path must contain only fixed indexes
    NotFixed,

    /// derivation path can contain at most one receive/change index pair
    MultiplePairs,

    /// empty derivation path step
    EmptyStep,
}

/// Identifies the key a derivation path starts from.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub enum DerivationPathOrigin {
    /// Unknown origin
    #[default]
    None,

    /// Master key fingerprint, as a big-endian integer of its four bytes
    Fingerprint(u32),
}

impl DerivationPathOrigin {
    /// Constructs origin from BIP-32 key fingerprint
    pub fn with(fingerprint: Fingerprint) -> Self {
        DerivationPathOrigin::Fingerprint(u32::from_be_bytes([
            fingerprint[0],
            fingerprint[1],
            fingerprint[2],
            fingerprint[3],
        ]))
    }

    /// Returns fingerprint value, if known
    #[inline]
    pub fn fingerprint(self) -> Option<u32> {
        match self {
            DerivationPathOrigin::None => None,
            DerivationPathOrigin::Fingerprint(fp) => Some(fp),
        }
    }

    /// Returns fingerprint as a BIP-32 type, if known
    #[inline]
    pub fn bip32_fingerprint(self) -> Option<Fingerprint> {
        self.fingerprint()
            .map(|fp| Fingerprint::from(&fp.to_be_bytes()[..]))
    }
}

/// Where a derivation path is used, defining which steps it may contain.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum WildcardPolicy {
    /// Only fixed steps (key origin paths)
    Forbidden,

    /// A single wildcard as the last step and a single pair step (key children
    /// paths)
    LastStepOnly,
}

/// Derivation path consisting of fixed, wildcard and receive/change pair
/// steps, optionally bound to a master key fingerprint.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct DerivationPath {
    origin: DerivationPathOrigin,
    steps: Vec<DerivationStep>,
    depth: Option<u8>,
}

// This is needed to get methods line `len()`, `is_empty()` and `iter()` working.
impl Deref for DerivationPath {
    type Target = [DerivationStep];

    fn deref(&self) -> &Self::Target { &self.steps }
}

impl AsRef<[DerivationStep]> for DerivationPath {
    #[inline]
    fn as_ref(&self) -> &[DerivationStep] { &self.steps }
}

impl FromIterator<DerivationStep> for DerivationPath {
    fn from_iter<T: IntoIterator<Item = DerivationStep>>(iter: T) -> Self {
        DerivationPath::new(iter.into_iter().collect())
    }
}

impl<'path> IntoIterator for &'path DerivationPath {
    type Item = &'path DerivationStep;
    type IntoIter = std::slice::Iter<'path, DerivationStep>;

    fn into_iter(self) -> Self::IntoIter { self.steps.iter() }
}

impl From<&bip32::DerivationPath> for DerivationPath {
    fn from(path: &bip32::DerivationPath) -> Self {
        path.into_iter().copied().map(DerivationStep::from).collect()
    }
}

impl DerivationPath {
    /// Constructs derivation path with unknown origin
    #[inline]
    pub fn new(steps: Vec<DerivationStep>) -> Self {
        DerivationPath {
            origin: DerivationPathOrigin::None,
            steps,
            depth: None,
        }
    }

    /// Constructs derivation path with a given origin
    #[inline]
    pub fn with(origin: DerivationPathOrigin, steps: Vec<DerivationStep>) -> Self {
        DerivationPath {
            origin,
            steps,
            depth: None,
        }
    }

    /// Constructs empty derivation path (the master key itself).
    #[inline]
    pub fn master() -> Self { DerivationPath::default() }

    /// Returns origin of the path
    #[inline]
    pub fn origin(&self) -> DerivationPathOrigin { self.origin }

    /// Returns master key fingerprint, if known
    #[inline]
    pub fn fingerprint(&self) -> Option<u32> { self.origin.fingerprint() }

    /// Replaces origin of the path
    #[inline]
    pub fn set_origin(&mut self, origin: DerivationPathOrigin) { self.origin = origin }

    /// Returns derivation steps
    #[inline]
    pub fn steps(&self) -> &[DerivationStep] { &self.steps }

    /// Depth of the key this path leads to. Defaults to the number of steps
    /// unless set explicitly.
    #[inline]
    pub fn depth(&self) -> u8 { self.depth.unwrap_or(self.steps.len() as u8) }

    /// Returns explicitly set depth, if it differs from the number of steps
    #[inline]
    pub fn explicit_depth(&self) -> Option<u8> { self.depth }

    /// Sets depth of the key this path leads to
    pub fn set_depth(&mut self, depth: u8) {
        self.depth = if depth as usize == self.steps.len() { None } else { Some(depth) };
    }

    /// Adds step to the end of the path
    #[inline]
    pub fn push(&mut self, step: impl Into<DerivationStep>) { self.steps.push(step.into()) }

    /// Constructs new path by appending steps from `other` to this path; the
    /// origin of `self` is kept.
    pub fn extended(&self, other: &DerivationPath) -> DerivationPath {
        let mut steps = self.steps.clone();
        steps.extend(other.steps.iter().copied());
        DerivationPath::with(self.origin, steps)
    }

    /// Detects path consisting of fixed steps only
    #[inline]
    pub fn is_fixed(&self) -> bool { self.steps.iter().all(DerivationStep::is_fixed) }

    /// Detects whether any of steps is a wildcard
    #[inline]
    pub fn has_wildcard(&self) -> bool { self.steps.iter().any(DerivationStep::is_wildcard) }

    /// Detects whether any of steps is a receive/change pair
    #[inline]
    pub fn has_pair(&self) -> bool { self.steps.iter().any(DerivationStep::is_pair) }

    /// Detects whether path derivation requires substitution of a wildcard
    /// child index.
    #[inline]
    pub fn requires_wildcard_child_num(&self) -> bool { self.has_wildcard() }

    /// Detects whether any step uses hardened derivation
    #[inline]
    pub fn has_hardened_steps(&self) -> bool {
        self.steps.iter().any(DerivationStep::is_hardened)
    }

    /// Checks that the steps satisfy requirements of the context the path is
    /// used in.
    pub fn validate(&self, policy: WildcardPolicy) -> Result<(), PathParseError> {
        match policy {
            WildcardPolicy::Forbidden if !self.is_fixed() => Err(PathParseError::NotFixed),
            WildcardPolicy::Forbidden => Ok(()),
            WildcardPolicy::LastStepOnly => {
                let count = self.steps.len();
                if self.steps.iter().take(count.saturating_sub(1)).any(DerivationStep::is_wildcard)
                {
                    return Err(PathParseError::WildcardNotLast);
                }
                if self.steps.iter().filter(|step| step.is_pair()).count() > 1 {
                    return Err(PathParseError::MultiplePairs);
                }
                Ok(())
            }
        }
    }

    /// Converts path into sequence of BIP-32 child numbers, substituting the
    /// wildcard and selecting pair branch. Returns `None` if the path contains
    /// a wildcard and no `wildcard` index is given.
    pub fn to_child_numbers(
        &self,
        wildcard: Option<ChildIndex>,
        chain: Chain,
    ) -> Option<Vec<ChildNumber>> {
        self.steps
            .iter()
            .map(|step| step.resolve(wildcard, chain))
            .collect()
    }

    /// Converts path into [`bip32::DerivationPath`] (see
    /// [`DerivationPath::to_child_numbers`]).
    #[inline]
    pub fn to_bip32(&self, wildcard: Option<ChildIndex>, chain: Chain) -> Option<bip32::DerivationPath> {
        self.to_child_numbers(wildcard, chain)
            .map(bip32::DerivationPath::from)
    }

    /// Matches `other` path against `self` used as a template: the paths must
    /// have the same length and hardening at each step; a wildcard step of
    /// the template accepts any fixed index, other steps must be equal.
    pub fn matches(&self, other: &DerivationPath) -> bool {
        self.steps.len() == other.steps.len()
            && self
                .steps
                .iter()
                .zip(&other.steps)
                .all(|(template, step)| match (template, step) {
                    (DerivationStep::Basic(template), DerivationStep::Basic(step)) => {
                        template.is_hardened == step.is_hardened
                            && match (template.spec, step.spec) {
                                (ChildIndexSpec::Wildcard, ChildIndexSpec::Index(_)) => true,
                                (ChildIndexSpec::Index(a), ChildIndexSpec::Index(b)) => a == b,
                                (_, ChildIndexSpec::Wildcard) => false,
                            }
                    }
                    (DerivationStep::Pair(template), DerivationStep::Pair(step)) => {
                        template == step
                    }
                    _ => false,
                })
    }

    /// Formats steps with a leading slash before each of them, as used for
    /// children paths in key expressions.
    pub fn fmt_children(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            f.write_str("/")?;
            Display::fmt(step, f)?;
        }
        Ok(())
    }
}

impl Display for DerivationPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut first = true;
        if let DerivationPathOrigin::Fingerprint(fp) = self.origin {
            write!(f, "{:08x}", fp)?;
            first = false;
        } else if self
            .steps
            .first()
            .map(|step| is_fingerprint(&step.to_string()))
            .unwrap_or_default()
        {
            // otherwise the first index reads back as a fingerprint
            f.write_str("m/")?;
        }
        for step in &self.steps {
            if !first {
                f.write_str("/")?;
            }
            Display::fmt(step, f)?;
            first = false;
        }
        if first {
            f.write_str("m")?;
        }
        Ok(())
    }
}

fn is_fingerprint(s: &str) -> bool { s.len() == 8 && s.bytes().all(|b| b.is_ascii_hexdigit()) }

impl FromStr for DerivationPath {
    type Err = PathParseError;

    /// Parses path in form of `m/step/step/...` or `[fingerprint/]step/...`.
    /// Without the `m/` prefix the first component consisting of exactly
    /// eight hex digits is treated as a fingerprint.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (s, from_master) = match s {
            "m" | "" => return Ok(DerivationPath::master()),
            s => match s.strip_prefix("m/") {
                Some(steps) => (steps, true),
                None => (s, false),
            },
        };
        let mut components = s.split('/').peekable();
        let mut origin = DerivationPathOrigin::None;
        if let Some(first) = components.peek() {
            if !from_master && is_fingerprint(first) {
                let fp = u32::from_str_radix(first, 16)
                    .map_err(|_| PathParseError::InvalidFingerprint(first.to_string()))?;
                origin = DerivationPathOrigin::Fingerprint(fp);
                components.next();
            }
        }
        let steps = components
            .map(|component| {
                if component.is_empty() {
                    Err(PathParseError::EmptyStep)
                } else {
                    DerivationStep::from_str(component)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        let path = DerivationPath::with(origin, steps);
        path.validate(WildcardPolicy::LastStepOnly)?;
        Ok(path)
    }
}

const INDEX_HARDENED_PAIR_FLAG: bool = false;

fn step_index_to_cbor(step: &BasicStep) -> Value {
    match step.spec {
        ChildIndexSpec::Index(index) => Value::from(index.index() as u64),
        ChildIndexSpec::Wildcard => Value::Array(vec![]),
    }
}

fn basic_step_from_cbor(index: &Value, hardened: &Value) -> Result<BasicStep, DecodeError> {
    let is_hardened = cbor::to_bool(hardened)?;
    let spec = match index {
        Value::Array(items) if items.is_empty() => ChildIndexSpec::Wildcard,
        Value::Array(_) => {
            return Err(DecodeError::InvalidValue(s!("index ranges are not supported")))
        }
        value => {
            let index = cbor::to_u32(value)?;
            ChildIndexSpec::Index(
                ChildIndex::with(index).map_err(|err| DecodeError::InvalidValue(err.to_string()))?,
            )
        }
    };
    Ok(BasicStep { spec, is_hardened })
}

impl DerivationPath {
    fn components_to_cbor(&self) -> Value {
        let mut components = Vec::with_capacity(self.steps.len() * 2);
        for step in &self.steps {
            match step {
                DerivationStep::Basic(step) => {
                    components.push(step_index_to_cbor(step));
                    components.push(Value::Bool(step.is_hardened));
                }
                DerivationStep::Pair(pair) => {
                    components.push(Value::Array(vec![
                        step_index_to_cbor(&pair.external()),
                        Value::Bool(pair.external().is_hardened),
                        step_index_to_cbor(&pair.internal()),
                        Value::Bool(pair.internal().is_hardened),
                    ]));
                    components.push(Value::Bool(INDEX_HARDENED_PAIR_FLAG));
                }
            }
        }
        Value::Array(components)
    }

    fn components_from_cbor(value: &Value) -> Result<Vec<DerivationStep>, DecodeError> {
        let components = cbor::to_array(value)?;
        if components.len() % 2 != 0 {
            return Err(DecodeError::InvalidValue(s!(
                "path components must come in index/hardened pairs"
            )));
        }
        components
            .chunks(2)
            .map(|chunk| match &chunk[0] {
                Value::Array(pair) if pair.len() == 4 => {
                    cbor::to_bool(&chunk[1])?;
                    let external = basic_step_from_cbor(&pair[0], &pair[1])?;
                    let internal = basic_step_from_cbor(&pair[2], &pair[3])?;
                    PairStep::with(external, internal)
                        .map(DerivationStep::Pair)
                        .map_err(|err| DecodeError::InvalidValue(err.to_string()))
                }
                index => basic_step_from_cbor(index, &chunk[1]).map(DerivationStep::Basic),
            })
            .collect()
    }

    /// Decodes path from its untagged CBOR map
    pub fn from_untagged_cbor(value: &Value) -> Result<Self, DecodeError> {
        let map = CborMap::with(value)?;
        let steps = Self::components_from_cbor(map.require(1)?)?;
        let origin = match map.get(2) {
            Some(fp) => DerivationPathOrigin::Fingerprint(cbor::to_u32(fp)?),
            None => DerivationPathOrigin::None,
        };
        let mut path = DerivationPath::with(origin, steps);
        if let Some(depth) = map.get(3) {
            let depth = u8::try_from(cbor::to_u64(depth)?)
                .map_err(|_| DecodeError::InvalidValue(s!("key depth exceeds 255")))?;
            path.set_depth(depth);
        }
        path.validate(WildcardPolicy::LastStepOnly)
            .map_err(|err| DecodeError::InvalidValue(err.to_string()))?;
        Ok(path)
    }
}

impl CborEncode for DerivationPath {
    fn cbor_tag(&self) -> u64 { cbor::tags::KEYPATH }

    fn to_untagged_cbor(&self) -> Value {
        let mut entries = vec![(1, self.components_to_cbor())];
        if let Some(fp) = self.fingerprint() {
            entries.push((2, Value::from(fp as u64)));
        }
        if let Some(depth) = self.depth {
            entries.push((3, Value::from(depth as u64)));
        }
        cbor::map(entries)
    }
}

impl CborDecode for DerivationPath {
    fn from_tagged_cbor(value: &Value) -> Result<Self, DecodeError> {
        DerivationPath::from_untagged_cbor(cbor::untag(value, cbor::tags::KEYPATH)?)
    }
}
