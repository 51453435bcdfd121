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

//! Recursive-descent descriptor parser with backtracking.
//!
//! The token sequence is immutable; the parser keeps a cursor into it. Each
//! alternative runs inside a transaction: the cursor position is captured
//! before the attempt and restored unless the attempt succeeds, so a failed
//! alternative never consumes tokens.

use core::fmt::{self, Display, Formatter};
use core::str::FromStr;

use bitcoin::hashes::hex::ToHex;
use bitcoin::{Address, PublicKey, Script};
use bitcoin_hd::{
    BasicStep, ChildIndex, ChildIndexSpec, DerivationPath, DerivationPathOrigin, DerivationStep,
    PairStep, WildcardPolicy,
};

use crate::{
    lex, DescriptorKeyExpression, DescriptorNode, HdKey, KeyMaterial, Keyword, LexError,
    Multisig, NodeKind, Token, TokenKind, MAX_MULTISIG_KEYS,
};

/// Descriptor parse error with the position of the offending token
#[derive(Clone, PartialEq, Eq, Hash, Debug, Error)]
pub struct ParseError {
    /// Human-readable description
    pub message: String,

    /// Index of the offending token
    pub position: usize,

    /// Byte offset of the offending token in the source text
    pub offset: usize,

    /// Descriptor source text
    pub source: String,
}

impl ParseError {
    /// Constructs error from a lexer failure
    pub fn with_lex_error(err: LexError, source: &str) -> Self {
        ParseError {
            message: err.to_string(),
            position: 0,
            offset: err.offset(),
            source: source.to_owned(),
        }
    }

    /// Constructs error pointing to the start of the source text
    pub fn with_message(message: impl ToString, source: &str) -> Self {
        ParseError {
            message: message.to_string(),
            position: 0,
            offset: 0,
            source: source.to_owned(),
        }
    }
}

/// Alternate form (`{:#}`) adds the source text with a caret below the
/// offending position.
impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at offset {})", self.message, self.offset)?;
        if f.alternate() {
            write!(f, "\n{}\n{:>width$}", self.source, "^", width = self.offset + 1)?;
        }
        Ok(())
    }
}

/// Descriptor parser over a token sequence
#[derive(Clone, Debug)]
pub struct Parser<'source> {
    source: &'source str,
    tokens: Vec<Token>,
    cursor: usize,
}

impl<'source> Parser<'source> {
    /// Splits source text into tokens and creates parser positioned at the
    /// first token.
    pub fn with(source: &'source str) -> Result<Self, ParseError> {
        let tokens = lex(source).map_err(|err| ParseError::with_lex_error(err, source))?;
        Ok(Parser {
            source,
            tokens,
            cursor: 0,
        })
    }

    /// Index of the next token to consume
    #[inline]
    pub fn cursor(&self) -> usize { self.cursor }

    /// Tokens being parsed
    #[inline]
    pub fn tokens(&self) -> &[Token] { &self.tokens }

    /// Parses the whole token sequence as a single descriptor.
    pub fn parse(mut self) -> Result<DescriptorNode, ParseError> {
        let node = self.parse_script(None)?;
        if self.cursor < self.tokens.len() {
            return Err(self.error("unexpected tokens after the end of descriptor"));
        }
        debug!("Parsed {} descriptor `{}`", node.kind(), self.source);
        Ok(node)
    }

    /// Tries every script function kind in the priority order of
    /// [`NodeKind::PRIORITY`]; `parent` is `None` at the top level.
    pub fn parse_script(&mut self, parent: Option<NodeKind>) -> Result<DescriptorNode, ParseError> {
        for kind in NodeKind::PRIORITY {
            if let Some(node) = self.transaction(|parser| parser.parse_node(kind, parent))? {
                return Ok(node);
            }
            trace!("Descriptor alternative `{}` does not match at token {}", kind, self.cursor);
        }
        Err(match parent {
            None => self.error("expected top-level script function"),
            Some(parent) => self.error(format!("expected script function inside `{}`", parent)),
        })
    }

    /// Runs `f` as a transaction: unless it returns a value, the cursor is
    /// restored to the position it had before the call.
    pub fn transaction<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<Option<T>, ParseError>,
    ) -> Result<Option<T>, ParseError> {
        let start = self.cursor;
        let result = f(self);
        if !matches!(result, Ok(Some(_))) {
            self.cursor = start;
        }
        result
    }

    fn error(&self, message: impl ToString) -> ParseError {
        let offset = self
            .tokens
            .get(self.cursor)
            .map(|token| token.range.start)
            .unwrap_or(self.source.len());
        ParseError {
            message: message.to_string(),
            position: self.cursor,
            offset,
            source: self.source.to_owned(),
        }
    }

    fn peek(&self) -> Option<&TokenKind> { self.tokens.get(self.cursor).map(|token| &token.kind) }

    fn next_token(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.cursor)?;
        self.cursor += 1;
        Some(token)
    }

    fn parse_kind(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == Some(kind) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn expect_kind(&mut self, kind: &TokenKind) -> Result<(), ParseError> {
        if self.parse_kind(kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}", kind)))
        }
    }

    fn parse_keyword(&mut self, kind: NodeKind) -> Option<Keyword> {
        match self.peek() {
            Some(TokenKind::Keyword(keyword)) if kind.accepts(*keyword) => {
                let keyword = *keyword;
                self.cursor += 1;
                Some(keyword)
            }
            _ => None,
        }
    }

    fn parse_fingerprint(&mut self) -> Option<u32> {
        let fingerprint = match self.peek() {
            Some(TokenKind::Data(data)) if data.len() == 4 => {
                u32::from_be_bytes([data[0], data[1], data[2], data[3]])
            }
            _ => return None,
        };
        self.cursor += 1;
        Some(fingerprint)
    }

    fn expect_fingerprint(&mut self) -> Result<u32, ParseError> {
        self.parse_fingerprint()
            .ok_or_else(|| self.error("expected master key fingerprint"))
    }

    fn peek_int(&self) -> Option<u64> {
        match self.peek()? {
            TokenKind::Int(int) => Some(*int),
            TokenKind::Data(data) => u64::from_str(&data.to_hex()).ok(),
            _ => None,
        }
    }

    fn parse_int(&mut self) -> Option<u64> {
        let int = self.peek_int()?;
        self.cursor += 1;
        Some(int)
    }

    fn expect_int(&mut self) -> Result<u64, ParseError> {
        self.parse_int().ok_or_else(|| self.error("expected integer"))
    }

    fn parse_child_index(&mut self) -> Option<ChildIndex> {
        let index = u32::try_from(self.peek_int()?).ok()?;
        let index = ChildIndex::with(index).ok()?;
        self.cursor += 1;
        Some(index)
    }

    fn parse_index(&mut self, require_fixed: bool) -> Result<Option<ChildIndexSpec>, ParseError> {
        if self.parse_kind(&TokenKind::Star) {
            if require_fixed {
                return Err(self.error("wildcard is not allowed here"));
            }
            return Ok(Some(ChildIndexSpec::Wildcard));
        }
        Ok(self.parse_child_index().map(ChildIndexSpec::Index))
    }

    fn parse_basic_step(&mut self, require_fixed: bool) -> Result<Option<BasicStep>, ParseError> {
        let Some(spec) = self.parse_index(require_fixed)? else {
            return Ok(None);
        };
        let is_hardened = self.parse_kind(&TokenKind::Hardened);
        Ok(Some(BasicStep { spec, is_hardened }))
    }

    fn expect_basic_step(&mut self, require_fixed: bool) -> Result<BasicStep, ParseError> {
        self.parse_basic_step(require_fixed)?
            .ok_or_else(|| self.error("expected derivation step"))
    }

    fn parse_index_pair(&mut self) -> Result<Option<PairStep>, ParseError> {
        if !self.parse_kind(&TokenKind::OpenAngle) {
            return Ok(None);
        }
        let external = self.expect_basic_step(true)?;
        self.expect_kind(&TokenKind::Semicolon)?;
        let internal = self.expect_basic_step(true)?;
        self.expect_kind(&TokenKind::CloseAngle)?;
        PairStep::with(external, internal)
            .map(Some)
            .map_err(|err| self.error(err))
    }

    fn parse_derivation_step(
        &mut self,
        require_fixed: bool,
    ) -> Result<Option<DerivationStep>, ParseError> {
        if !self.parse_kind(&TokenKind::Slash) {
            return Ok(None);
        }
        if let Some(pair) = self.parse_index_pair()? {
            if require_fixed {
                return Err(self.error("receive/change index pair is not allowed here"));
            }
            return Ok(Some(DerivationStep::Pair(pair)));
        }
        self.expect_basic_step(require_fixed)
            .map(DerivationStep::Basic)
            .map(Some)
    }

    fn parse_derivation_steps(
        &mut self,
        require_fixed: bool,
    ) -> Result<Vec<DerivationStep>, ParseError> {
        let mut steps = vec![];
        while let Some(step) = self.parse_derivation_step(require_fixed)? {
            steps.push(step);
        }
        let policy = if require_fixed { WildcardPolicy::Forbidden } else { WildcardPolicy::LastStepOnly };
        DerivationPath::new(steps.clone())
            .validate(policy)
            .map_err(|err| self.error(err))?;
        Ok(steps)
    }

    fn parse_origin(&mut self) -> Result<Option<DerivationPath>, ParseError> {
        if !self.parse_kind(&TokenKind::OpenBracket) {
            return Ok(None);
        }
        let fingerprint = self.expect_fingerprint()?;
        let steps = self.parse_derivation_steps(true)?;
        self.expect_kind(&TokenKind::CloseBracket)?;
        Ok(Some(DerivationPath::with(DerivationPathOrigin::Fingerprint(fingerprint), steps)))
    }

    fn parse_children(&mut self) -> Result<Option<DerivationPath>, ParseError> {
        let steps = self.parse_derivation_steps(false)?;
        if steps.is_empty() {
            return Ok(None);
        }
        Ok(Some(DerivationPath::new(steps)))
    }

    /// Parses key expression `[origin]key/children`. With
    /// `allow_uncompressed` unset, 65-byte public keys are not recognized as
    /// keys.
    pub fn parse_key(
        &mut self,
        allow_uncompressed: bool,
    ) -> Result<Option<DescriptorKeyExpression>, ParseError> {
        self.transaction(|parser| {
            let origin = parser.parse_origin()?;
            let Some(token) = parser.next_token() else {
                return Ok(None);
            };
            let key = match token.kind.clone() {
                TokenKind::Data(data) if data.len() == 33 && matches!(data[0], 0x02 | 0x03) => {
                    PublicKey::from_slice(&data).ok().map(KeyMaterial::EcCompressed)
                }
                TokenKind::Data(data) if allow_uncompressed && data.len() == 65 => {
                    PublicKey::from_slice(&data).ok().map(KeyMaterial::EcUncompressed)
                }
                TokenKind::Wif(sk) => Some(KeyMaterial::Wif(sk)),
                TokenKind::HdKey(xkey) => {
                    let children = parser.parse_children()?;
                    Some(KeyMaterial::Hd(HdKey {
                        key: xkey,
                        children,
                    }))
                }
                _ => None,
            };
            Ok(key.map(|key| DescriptorKeyExpression { origin, key }))
        })
    }

    fn expect_key(&mut self, allow_uncompressed: bool) -> Result<DescriptorKeyExpression, ParseError> {
        self.parse_key(allow_uncompressed)?
            .ok_or_else(|| self.error("expected key expression"))
    }

    fn expect_key_list(&mut self) -> Result<Vec<DescriptorKeyExpression>, ParseError> {
        let mut keys = vec![];
        while self.parse_kind(&TokenKind::Comma) {
            keys.push(self.expect_key(true)?);
        }
        if keys.is_empty() {
            return Err(self.error("expected list of keys"));
        }
        Ok(keys)
    }

    fn expect_address(&mut self) -> Result<Address, ParseError> {
        match self.peek() {
            Some(TokenKind::Address(address)) => {
                let address = address.clone();
                self.cursor += 1;
                Ok(address)
            }
            _ => Err(self.error("expected address")),
        }
    }

    fn expect_script(&mut self) -> Result<Script, ParseError> {
        let script = match self.peek() {
            Some(TokenKind::Data(data)) => Script::from(data.clone()),
            _ => return Err(self.error("expected hex-encoded script")),
        };
        if script.instructions().any(|instruction| instruction.is_err()) {
            return Err(self.error("invalid script"));
        }
        self.cursor += 1;
        Ok(script)
    }

    fn parse_node(
        &mut self,
        kind: NodeKind,
        parent: Option<NodeKind>,
    ) -> Result<Option<DescriptorNode>, ParseError> {
        let Some(keyword) = self.parse_keyword(kind) else {
            return Ok(None);
        };
        if !kind.allowed_inside(parent) {
            self.cursor -= 1;
            return Err(match parent {
                Some(parent) => self.error(format!("`{}` is not allowed inside `{}`", keyword, parent)),
                None => self.error(format!("`{}` is not allowed at the top level", keyword)),
            });
        }
        self.expect_kind(&TokenKind::OpenParen)?;
        let node = match kind {
            NodeKind::Raw => DescriptorNode::Raw(self.expect_script()?),
            NodeKind::Pk => DescriptorNode::Pk(self.expect_key(true)?),
            NodeKind::Pkh => DescriptorNode::Pkh(self.expect_key(true)?),
            NodeKind::Wpkh => DescriptorNode::Wpkh(self.expect_key(true)?),
            NodeKind::Multi => DescriptorNode::Multi(self.expect_multisig(keyword)?),
            NodeKind::Wsh => DescriptorNode::Wsh(Box::new(self.parse_script(Some(kind))?)),
            NodeKind::Sh => DescriptorNode::Sh(Box::new(self.parse_script(Some(kind))?)),
            NodeKind::Tr => DescriptorNode::Tr(self.expect_key(false)?),
            NodeKind::Addr => DescriptorNode::Addr(self.expect_address()?),
            NodeKind::Combo => DescriptorNode::Combo(self.expect_key(true)?),
            NodeKind::Cosigner => DescriptorNode::Cosigner(self.expect_key(true)?),
        };
        self.expect_kind(&TokenKind::CloseParen)?;
        Ok(Some(node))
    }

    fn expect_multisig(&mut self, keyword: Keyword) -> Result<Multisig, ParseError> {
        let threshold = self.expect_int()?;
        let keys = self.expect_key_list()?;
        if keys.len() > MAX_MULTISIG_KEYS {
            return Err(self.error(format!(
                "multisig can't have more than {} keys",
                MAX_MULTISIG_KEYS
            )));
        }
        if threshold == 0 || threshold > keys.len() as u64 {
            return Err(self.error(format!(
                "multisig threshold {} must be between 1 and the number of keys {}",
                threshold,
                keys.len()
            )));
        }
        Ok(Multisig {
            threshold: threshold as usize,
            keys,
            is_sorted: keyword == Keyword::SortedMulti,
        })
    }
}

/// Parses a standalone key expression `[origin]key/children`
impl FromStr for DescriptorKeyExpression {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser::with(s)?;
        let key = parser.expect_key(true)?;
        if parser.cursor < parser.tokens.len() {
            return Err(parser.error("unexpected tokens after the end of key expression"));
        }
        Ok(key)
    }
}
