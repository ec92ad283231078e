//! Format-string tokenizer.
//!
//! A format is a comma-separated list of tokens such as `"uint:12, 3*hex8, bits4=0b101"`.
//! Bracket groups (`2*(uint8, bool)`) are expanded first, then each token becomes one or
//! more [`Token`]s:
//!
//! ```text
//! token := [factor "*"] ( key | struct-codes | literal | body ["=" value] )
//! body  := name [":"] [digits] | name ":" keyword | [digits ["*"]]
//! ```
//!
//! Parsing is pure, so results are memoized by `(format, keys)` in a small LRU cache.

use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::{Arc, LazyLock, Mutex, PoisonError},
};

use tracing::trace;

use crate::errors::FormatError;

/// Maximum number of parsed formats kept in the tokenizer cache.
pub const CACHE_SIZE: usize = 256;

const STRUCT_CODES: &str = "bBhHlLqQefd";

/// Length part of a [`Token`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenLength {
    /// An explicit number of bits.
    Bits(usize),
    /// Named keyword argument that supplies the length when the format is used.
    Keyword(String),
}

/// One parsed element of a format string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    /// Family name, reserved key, `"bits"` for bare lengths, or a literal marker
    /// (`"0x"`, `"0o"`, `"0b"`).
    pub name: String,
    pub length: Option<TokenLength>,
    /// Initializer text after `=`, or the digits of a literal.
    pub value: Option<String>,
}

impl Token {
    pub fn new(name: impl Into<String>, length: Option<TokenLength>, value: Option<String>) -> Self {
        Self {
            name: name.into(),
            length,
            value,
        }
    }

    /// The explicit bit length, if the token has one.
    pub fn bit_length(&self) -> Option<usize> {
        match self.length {
            Some(TokenLength::Bits(n)) => Some(n),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.name.as_str(), "0x" | "0o" | "0b")
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_literal() {
            return write!(f, "{}{}", self.name, self.value.as_deref().unwrap_or_default());
        }
        f.write_str(&self.name)?;
        match &self.length {
            Some(TokenLength::Bits(n)) => write!(f, "{n}")?,
            Some(TokenLength::Keyword(k)) => write!(f, ":{k}")?,
            None => {}
        }
        if let Some(value) = &self.value {
            write!(f, "={value}")?;
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
impl From<crate::serde::TokenDef> for Token {
    fn from(value: crate::serde::TokenDef) -> Self {
        let length = value.length.map(|length| match length {
            crate::serde::TokenLengthDef::Bits(n) => TokenLength::Bits(n),
            crate::serde::TokenLengthDef::Keyword(k) => TokenLength::Keyword(k),
        });
        Token::new(value.name, length, value.value)
    }
}

/// Result of [`tokenparser`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ParsedFormat {
    /// Set by an empty token or a bare length ending in `*`: the layout takes
    /// whatever bits remain.
    pub stretchy: bool,
    pub tokens: Vec<Token>,
}

impl fmt::Display for ParsedFormat {
    /// The tokens as a format string that parses back to the same tokens.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{token}")?;
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
impl From<crate::serde::FormatDef> for ParsedFormat {
    fn from(value: crate::serde::FormatDef) -> Self {
        ParsedFormat {
            stretchy: value.stretchy,
            tokens: value.tokens.into_iter().map(Into::into).collect(),
        }
    }
}

type CacheKey = (String, Vec<String>);

#[derive(Default)]
struct FormatCache {
    entries: HashMap<CacheKey, Arc<ParsedFormat>>,
    recency: VecDeque<CacheKey>,
}

impl FormatCache {
    fn get(&mut self, key: &CacheKey) -> Option<Arc<ParsedFormat>> {
        let parsed = self.entries.get(key).cloned()?;
        self.touch(key);
        Some(parsed)
    }

    fn insert(&mut self, key: CacheKey, parsed: Arc<ParsedFormat>) {
        if self.entries.insert(key.clone(), parsed).is_some() {
            self.touch(&key);
            return;
        }
        self.recency.push_back(key);
        while self.entries.len() > CACHE_SIZE {
            let Some(oldest) = self.recency.pop_front() else {
                break;
            };
            trace!(format = %oldest.0, "evicting parsed format");
            self.entries.remove(&oldest);
        }
    }

    /// Marks `key` as the most recently used.
    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            if let Some(k) = self.recency.remove(pos) {
                self.recency.push_back(k);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

static CACHE: LazyLock<Mutex<FormatCache>> = LazyLock::new(Mutex::default);

/// Tokenizes `fmt`. Tokens equal to one of `keys` pass through unchanged.
///
/// Whitespace is ignored and bracket groups are expanded before splitting on commas.
/// Identical arguments always give an equal (and usually the same, cached) result.
pub fn tokenparser(fmt: &str, keys: &[&str]) -> Result<Arc<ParsedFormat>, FormatError> {
    let key: CacheKey = (fmt.to_string(), keys.iter().map(|k| k.to_string()).collect());
    {
        let mut cache = CACHE.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parsed) = cache.get(&key) {
            trace!(format = fmt, "tokenizer cache hit");
            return Ok(parsed);
        }
    }

    let parsed = Arc::new(parse(fmt, keys)?);
    CACHE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(key, Arc::clone(&parsed));
    Ok(parsed)
}

fn parse(fmt: &str, keys: &[&str]) -> Result<ParsedFormat, FormatError> {
    let compact: String = fmt.chars().filter(|c| !c.is_whitespace()).collect();
    let expanded = expand_brackets(&compact)?;
    let mut parsed = ParsedFormat::default();
    for token in expanded.split(',') {
        parse_token(token, keys, &mut parsed)?;
    }
    Ok(parsed)
}

fn parse_token(token: &str, keys: &[&str], out: &mut ParsedFormat) -> Result<(), FormatError> {
    if keys.contains(&token) {
        out.tokens.push(Token::new(token, None, None));
        return Ok(());
    }
    let (factor, element) = split_factor(token)?;
    let (tokens, stretchy) = parse_element(element)?;
    out.stretchy |= stretchy;
    for _ in 0..factor {
        out.tokens.extend(tokens.iter().cloned());
    }
    Ok(())
}

/// Parses one token without its factor. The flag reports a stretchy token.
fn parse_element(token: &str) -> Result<(Vec<Token>, bool), FormatError> {
    if is_struct_token(token) {
        let tokens = structparser(token)?
            .into_iter()
            .map(|name| match split_name_int(&name) {
                Some((family, length)) => Token::new(family, length.map(TokenLength::Bits), None),
                None => Token::new(name.as_str(), None, None),
            })
            .collect();
        return Ok((tokens, false));
    }

    if let Some((marker, digits)) = split_literal(token) {
        return Ok((vec![Token::new(marker, None, Some(digits.to_string()))], false));
    }

    if token.is_empty() {
        return Ok((Vec::new(), true));
    }

    let (body, value) = match token.split_once('=') {
        Some((body, value)) => (body, Some(value.to_string())),
        None => (token, None),
    };

    if let Some((name, length)) = split_name_int(body) {
        let token = Token::new(name, length.map(TokenLength::Bits), value);
        return Ok((vec![token], false));
    }

    if let Some((name, keyword)) = split_name_keyword(body) {
        let length = Some(TokenLength::Keyword(keyword.to_string()));
        return Ok((vec![Token::new(name, length, value)], false));
    }

    let (length, stretchy) = match body.strip_suffix('*') {
        Some(rest) => (rest, true),
        None => (body, false),
    };
    let length = if length.is_empty() {
        None
    } else {
        let n = length
            .parse()
            .map_err(|_| FormatError::InvalidToken(token.to_string()))?;
        Some(TokenLength::Bits(n))
    };
    Ok((vec![Token::new("bits", length, value)], stretchy))
}

/// Splits `factor*rest` at the last `*` that has something after it.
fn split_factor(token: &str) -> Result<(usize, &str), FormatError> {
    let searched = token.strip_suffix('*').unwrap_or(token);
    let Some(star) = searched.rfind('*') else {
        return Ok((1, token));
    };
    let factor = &token[..star];
    let factor = factor
        .parse()
        .map_err(|_| FormatError::InvalidFactor(factor.to_string()))?;
    Ok((factor, &token[star + 1..]))
}

fn split_literal(token: &str) -> Option<(String, &str)> {
    let marker = token.get(..2)?;
    let digits = &token[2..];
    match marker.to_ascii_lowercase().as_str() {
        m @ ("0x" | "0o" | "0b") if !digits.is_empty() => Some((m.to_string(), digits)),
        _ => None,
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `name[:]digits` or a bare `name`. The name keeps any digits inside it
/// (`e4m3mxfp`, `p4binary` in `p4binary8`).
fn split_name_int(body: &str) -> Option<(&str, Option<usize>)> {
    let name_end = body.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let (name, digits) = body.split_at(name_end);
    let name = name.strip_suffix(':').unwrap_or(name);
    if !is_identifier(name) {
        return None;
    }
    if digits.is_empty() {
        return Some((name, None));
    }
    digits.parse().ok().map(|n| (name, Some(n)))
}

fn split_name_keyword(body: &str) -> Option<(&str, &str)> {
    let (name, keyword) = body.split_once(':')?;
    let is_word = !keyword.is_empty()
        && keyword.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !keyword.chars().all(|c| c.is_ascii_digit());
    (is_identifier(name) && is_word).then_some((name, keyword))
}

/// Tokens like `<2hH` or `>d`: an endianness marker followed by struct codes.
fn is_struct_token(token: &str) -> bool {
    token.starts_with(['<', '>', '@', '='])
        && token.len() > 1
        && token[1..].ends_with(|c| STRUCT_CODES.contains(c))
        && token[1..]
            .chars()
            .all(|c| c.is_ascii_digit() || STRUCT_CODES.contains(c))
}

/// Expands `n*( ... )` groups, innermost first. A group without a factor is
/// expanded once.
pub fn expand_brackets(s: &str) -> Result<String, FormatError> {
    let unbalanced = || FormatError::UnbalancedBrackets(s.to_string());
    let mut out = s.to_string();
    while let Some(close) = out.find(')') {
        let open = out[..close].rfind('(').ok_or_else(unbalanced)?;
        let inner = &out[open + 1..close];
        let prefix = &out[..open];

        let (group_start, factor) = match prefix.strip_suffix('*') {
            Some(before) => {
                let digits_start = before.trim_end_matches(|c: char| c.is_ascii_digit()).len();
                let digits = &before[digits_start..];
                if digits.is_empty() {
                    return Err(FormatError::InvalidFactor(prefix.to_string()));
                }
                let factor: usize = digits
                    .parse()
                    .map_err(|_| FormatError::InvalidFactor(digits.to_string()))?;
                (digits_start, factor)
            }
            None => (open, 1),
        };

        let expansion = vec![inner; factor].join(",");
        let mut head = out[..group_start].to_string();
        let mut tail = out[close + 1..].to_string();
        if expansion.is_empty() {
            // Drop one separating comma so an empty group leaves no empty token.
            if tail.starts_with(',') {
                tail.remove(0);
            } else if head.ends_with(',') {
                head.pop();
            }
        }
        out = format!("{head}{expansion}{tail}");
    }
    if out.contains('(') {
        return Err(unbalanced());
    }
    Ok(out)
}

/// Family names for struct codes, in the order the codes appear.
///
/// An optional leading marker picks the byte order: `>` big-endian, `<` little-endian,
/// `=` and `@` native, none native.
pub fn structparser(codes: &str) -> Result<Vec<String>, FormatError> {
    let invalid = || FormatError::InvalidStructFormat(codes.to_string());
    let (endian, body) = match codes.chars().next() {
        Some(c @ ('<' | '>' | '@' | '=')) => (Some(c), &codes[1..]),
        _ => (None, codes),
    };
    if body.is_empty() {
        return Err(invalid());
    }

    let big_host = cfg!(target_endian = "big");
    let suffix = if endian == Some('>') || (!matches!(endian, Some('<' | '=')) && big_host) {
        "be"
    } else if endian == Some('<') || (endian != Some('>') && !big_host) {
        "le"
    } else {
        "ne"
    };

    let mut names = Vec::new();
    let mut count = String::new();
    for c in body.chars() {
        if c.is_ascii_digit() {
            count.push(c);
            continue;
        }
        let name = struct_code_name(c, suffix).ok_or_else(invalid)?;
        let repeat = if count.is_empty() {
            1
        } else {
            count.parse().map_err(|_| invalid())?
        };
        names.extend(std::iter::repeat_n(name, repeat));
        count.clear();
    }
    if !count.is_empty() {
        return Err(invalid());
    }
    Ok(names)
}

fn struct_code_name(code: char, suffix: &str) -> Option<String> {
    let (family, bits) = match code {
        'b' => return Some("int8".to_string()),
        'B' => return Some("uint8".to_string()),
        'h' => ("int", 16),
        'H' => ("uint", 16),
        'l' => ("int", 32),
        'L' => ("uint", 32),
        'q' => ("int", 64),
        'Q' => ("uint", 64),
        'e' => ("float", 16),
        'f' => ("float", 32),
        'd' => ("float", 64),
        _ => return None,
    };
    Some(format!("{family}{suffix}{bits}"))
}

/// Size in bytes of a struct code.
pub fn pack_code_size(code: char) -> Option<usize> {
    match code {
        'b' | 'B' => Some(1),
        'h' | 'H' | 'e' => Some(2),
        'l' | 'L' | 'f' => Some(4),
        'q' | 'Q' | 'd' => Some(8),
        _ => None,
    }
}

/// Byte sizes of each field in a struct code string, e.g. `"<h2l"` gives `[2, 4, 4]`.
pub fn struct_byte_sizes(codes: &str) -> Result<Vec<usize>, FormatError> {
    let invalid = || FormatError::InvalidStructFormat(codes.to_string());
    let body = codes.strip_prefix(['<', '>', '@', '=']).unwrap_or(codes);
    let mut sizes = Vec::new();
    let mut count = String::new();
    for c in body.chars() {
        if c.is_ascii_digit() {
            count.push(c);
            continue;
        }
        let size = pack_code_size(c).ok_or_else(invalid)?;
        let repeat = if count.is_empty() {
            1
        } else {
            count.parse().map_err(|_| invalid())?
        };
        sizes.extend(std::iter::repeat_n(size, repeat));
        count.clear();
    }
    if body.is_empty() || !count.is_empty() {
        return Err(invalid());
    }
    Ok(sizes)
}
