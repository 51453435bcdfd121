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

//! Descriptor lexer splitting source text into typed tokens.

use core::fmt::{self, Display, Formatter};
use core::ops::Range;
use core::str::FromStr;

use bitcoin::hashes::hex::FromHex;
use bitcoin::util::bip32::{ExtendedPrivKey, ExtendedPubKey};
use bitcoin::{Address, PrivateKey};

use crate::XKey;

/// Errors splitting descriptor text into tokens
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum LexError {
    /// unexpected character `{1}` at offset {0}
    UnexpectedChar(usize, char),

    /// unrecognized token `{1}` at offset {0}
    UnrecognizedToken(usize, String),

    /// integer `{1}` at offset {0} is too large
    IntOverflow(usize, String),
}

impl LexError {
    /// Byte offset of the failure in the source text
    pub fn offset(&self) -> usize {
        match self {
            LexError::UnexpectedChar(offset, _)
            | LexError::UnrecognizedToken(offset, _)
            | LexError::IntOverflow(offset, _) => *offset,
        }
    }
}

/// Script function names
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "lowercase")
)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
pub enum Keyword {
    /// `sh()`
    #[display("sh")]
    Sh,

    /// `wsh()`
    #[display("wsh")]
    Wsh,

    /// `pk()`
    #[display("pk")]
    Pk,

    /// `pkh()`
    #[display("pkh")]
    Pkh,

    /// `wpkh()`
    #[display("wpkh")]
    Wpkh,

    /// `combo()`
    #[display("combo")]
    Combo,

    /// `multi()`
    #[display("multi")]
    Multi,

    /// `sortedmulti()`
    #[display("sortedmulti")]
    SortedMulti,

    /// `tr()`
    #[display("tr")]
    Tr,

    /// `addr()`
    #[display("addr")]
    Addr,

    /// `raw()`
    #[display("raw")]
    Raw,

    /// `cosigner()`
    #[display("cosigner")]
    Cosigner,
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "sh" => Keyword::Sh,
            "wsh" => Keyword::Wsh,
            "pk" => Keyword::Pk,
            "pkh" => Keyword::Pkh,
            "wpkh" => Keyword::Wpkh,
            "combo" => Keyword::Combo,
            "multi" => Keyword::Multi,
            "sortedmulti" => Keyword::SortedMulti,
            "tr" => Keyword::Tr,
            "addr" => Keyword::Addr,
            "raw" => Keyword::Raw,
            "cosigner" => Keyword::Cosigner,
            _ => return Err(()),
        })
    }
}

/// Kind of a token together with its value
#[derive(Clone, PartialEq, Debug)]
pub enum TokenKind {
    /// Script function name
    Keyword(Keyword),

    /// Even-length hex string
    Data(Vec<u8>),

    /// Odd-length decimal number
    Int(u64),

    /// WIF-encoded private key
    Wif(PrivateKey),

    /// Extended public or private key
    HdKey(XKey),

    /// Bitcoin address
    Address(Address),

    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// `[`
    OpenBracket,

    /// `]`
    CloseBracket,

    /// `<`
    OpenAngle,

    /// `>`
    CloseAngle,

    /// `,`
    Comma,

    /// `;`
    Semicolon,

    /// `/`
    Slash,

    /// `*`
    Star,

    /// `'`, `h` or `H` marking hardened derivation
    Hardened,
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Keyword(keyword) => write!(f, "`{}`", keyword),
            TokenKind::Data(_) => f.write_str("hex data"),
            TokenKind::Int(_) => f.write_str("integer"),
            TokenKind::Wif(_) => f.write_str("WIF private key"),
            TokenKind::HdKey(_) => f.write_str("extended key"),
            TokenKind::Address(_) => f.write_str("address"),
            TokenKind::OpenParen => f.write_str("`(`"),
            TokenKind::CloseParen => f.write_str("`)`"),
            TokenKind::OpenBracket => f.write_str("`[`"),
            TokenKind::CloseBracket => f.write_str("`]`"),
            TokenKind::OpenAngle => f.write_str("`<`"),
            TokenKind::CloseAngle => f.write_str("`>`"),
            TokenKind::Comma => f.write_str("`,`"),
            TokenKind::Semicolon => f.write_str("`;`"),
            TokenKind::Slash => f.write_str("`/`"),
            TokenKind::Star => f.write_str("`*`"),
            TokenKind::Hardened => f.write_str("hardened marker"),
        }
    }
}

/// Token with its byte range in the source text
#[derive(Clone, PartialEq, Debug)]
pub struct Token {
    /// Token kind and value
    pub kind: TokenKind,

    /// Byte range of the token in the source
    pub range: Range<usize>,
}

impl Token {
    fn with(kind: TokenKind, range: Range<usize>) -> Self { Token { kind, range } }
}

fn punctuation(byte: u8) -> Option<TokenKind> {
    Some(match byte {
        b'(' => TokenKind::OpenParen,
        b')' => TokenKind::CloseParen,
        b'[' => TokenKind::OpenBracket,
        b']' => TokenKind::CloseBracket,
        b'<' => TokenKind::OpenAngle,
        b'>' => TokenKind::CloseAngle,
        b',' => TokenKind::Comma,
        b';' => TokenKind::Semicolon,
        b'/' => TokenKind::Slash,
        b'*' => TokenKind::Star,
        b'\'' => TokenKind::Hardened,
        _ => return None,
    })
}

/// Splits descriptor text into tokens.
///
/// Words made of ASCII letters and digits are classified in order: script
/// function names, hardened markers, numbers (`44h` yields a number and a
/// hardened marker), odd-length decimals as integers, even-length hex strings
/// as data, extended keys, WIF keys and addresses.
pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    let bytes = source.as_bytes();
    let mut tokens = vec![];
    let mut pos = 0usize;
    while pos < bytes.len() {
        let start = pos;
        if let Some(kind) = punctuation(bytes[pos]) {
            tokens.push(Token::with(kind, start..start + 1));
            pos += 1;
            continue;
        }
        if !bytes[pos].is_ascii_alphanumeric() {
            let ch = source[start..].chars().next().unwrap_or(char::REPLACEMENT_CHARACTER);
            return Err(LexError::UnexpectedChar(start, ch));
        }
        while pos < bytes.len() && bytes[pos].is_ascii_alphanumeric() {
            pos += 1;
        }
        lex_word(&source[start..pos], start, &mut tokens)?;
    }
    Ok(tokens)
}

fn number(digits: &str, start: usize) -> Result<TokenKind, LexError> {
    if digits.len() % 2 == 0 {
        // Even-length decimals are valid hex and are kept as data; the parser
        // reads them back as integers where an integer is expected.
        Vec::<u8>::from_hex(digits)
            .map(TokenKind::Data)
            .map_err(|_| LexError::UnrecognizedToken(start, digits.to_owned()))
    } else {
        u64::from_str(digits)
            .map(TokenKind::Int)
            .map_err(|_| LexError::IntOverflow(start, digits.to_owned()))
    }
}

fn lex_word(word: &str, start: usize, tokens: &mut Vec<Token>) -> Result<(), LexError> {
    let end = start + word.len();
    if let Ok(keyword) = Keyword::from_str(word) {
        tokens.push(Token::with(TokenKind::Keyword(keyword), start..end));
        return Ok(());
    }
    if word == "h" || word == "H" {
        tokens.push(Token::with(TokenKind::Hardened, start..end));
        return Ok(());
    }
    if word.bytes().all(|b| b.is_ascii_digit()) {
        tokens.push(Token::with(number(word, start)?, start..end));
        return Ok(());
    }
    if let Some(digits) = word.strip_suffix(&['h', 'H'][..]) {
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            tokens.push(Token::with(number(digits, start)?, start..end - 1));
            tokens.push(Token::with(TokenKind::Hardened, end - 1..end));
            return Ok(());
        }
    }
    if word.len() % 2 == 0 && word.bytes().all(|b| b.is_ascii_hexdigit()) {
        let data = Vec::<u8>::from_hex(word)
            .map_err(|_| LexError::UnrecognizedToken(start, word.to_owned()))?;
        tokens.push(Token::with(TokenKind::Data(data), start..end));
        return Ok(());
    }

    let kind = if word.starts_with("xpub") || word.starts_with("tpub") {
        ExtendedPubKey::from_str(word)
            .map(|xpub| TokenKind::HdKey(XKey::Public(xpub)))
            .ok()
    } else if word.starts_with("xprv") || word.starts_with("tprv") {
        ExtendedPrivKey::from_str(word)
            .map(|xprv| TokenKind::HdKey(XKey::Private(xprv)))
            .ok()
    } else {
        PrivateKey::from_wif(word)
            .map(TokenKind::Wif)
            .or_else(|_| Address::from_str(word).map(TokenKind::Address))
            .ok()
    };
    let kind = kind.ok_or_else(|| LexError::UnrecognizedToken(start, word.to_owned()))?;
    tokens.push(Token::with(kind, start..end));
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).unwrap().into_iter().map(|token| token.kind).collect()
    }

    #[test]
    fn punctuation_and_keywords() {
        assert_eq!(kinds("sh(wsh(*))"), vec![
            TokenKind::Keyword(Keyword::Sh),
            TokenKind::OpenParen,
            TokenKind::Keyword(Keyword::Wsh),
            TokenKind::OpenParen,
            TokenKind::Star,
            TokenKind::CloseParen,
            TokenKind::CloseParen,
        ]);
        assert_eq!(kinds("sortedmulti"), vec![TokenKind::Keyword(Keyword::SortedMulti)]);
    }

    #[test]
    fn numbers() {
        assert_eq!(kinds("1"), vec![TokenKind::Int(1)]);
        assert_eq!(kinds("44"), vec![TokenKind::Data(vec![0x44])]);
        assert_eq!(kinds("44h"), vec![TokenKind::Data(vec![0x44]), TokenKind::Hardened]);
        assert_eq!(kinds("0'"), vec![TokenKind::Int(0), TokenKind::Hardened]);
        assert_eq!(kinds("d34db33f"), vec![TokenKind::Data(vec![0xd3, 0x4d, 0xb3, 0x3f])]);
        assert!(matches!(
            lex("123456789012345678901234567"),
            Err(LexError::IntOverflow(0, _))
        ));
    }

    #[test]
    fn ranges() {
        let tokens = lex("pkh(1h)").unwrap();
        let ranges: Vec<_> = tokens.iter().map(|token| token.range.clone()).collect();
        assert_eq!(ranges, vec![0..3, 3..4, 4..5, 5..6, 6..7]);
    }

    #[test]
    fn keys_and_addresses() {
        let xpub = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";
        assert!(matches!(&kinds(xpub)[..], [TokenKind::HdKey(XKey::Public(_))]));
        let wif = "L4rK1yDtCWekvXuE6oXD9jCYfFNV2cWRpVuPLBcCU2z8TrisoyY1";
        assert!(matches!(&kinds(wif)[..], [TokenKind::Wif(_)]));
        let addr = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
        assert!(matches!(&kinds(addr)[..], [TokenKind::Address(_)]));
    }

    #[test]
    fn failures() {
        assert_eq!(lex("pkh( )"), Err(LexError::UnexpectedChar(4, ' ')));
        assert!(matches!(lex("pkh(zzz)"), Err(LexError::UnrecognizedToken(4, _))));
        assert_eq!(lex("pkh(zzz)").unwrap_err().offset(), 4);
    }
}
