//! Query tokenizer
//!
//! Splits query text into [`Token`]s. Besides plain lexing it applies three
//! rewrites so the parser only sees a simple token stream:
//!
//! - two operands next to each other get a synthetic AND between them
//! - a bare date range `2016..2018` becomes `( >=2016 AND <=2018 )`
//! - a bare partial date `2019` (4+ chars) becomes `( >=2019 AND <=2019 )`
//!
//! Date bounds are resolved to numeric timestamps here, rounding missing
//! components down for `<` / `>=` and up for `<=` / `>`.
//!
//! ```text
//! a,b (c | !d) >=2019.6 @12 @unlabeled "quoted text"
//! ```

use crate::human_time;
use crate::query::error::{QueryError, QueryResult};
use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    combinator::value,
    IResult,
};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Kind of a lexical token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Text,
    Id,
    Unlabeled,
    And,
    Or,
    Not,
    GroupStart,
    GroupEnd,
    DateLt,
    DateLte,
    DateGt,
    DateGte,
}

impl TokenKind {
    pub fn is_date(self) -> bool {
        matches!(
            self,
            TokenKind::DateLt | TokenKind::DateLte | TokenKind::DateGt | TokenKind::DateGte
        )
    }

    /// Whether an operand may directly follow a token of this kind
    fn expects_operand(self) -> bool {
        matches!(
            self,
            TokenKind::And | TokenKind::Or | TokenKind::Not | TokenKind::GroupStart
        )
    }
}

/// How to fill in the components a partial date leaves out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Missing components take their smallest value (`2019` -> Jan 1st 00:00)
    Down,
    /// Missing components take their largest value (`2019` -> Dec 31st 23:59:59.999)
    Up,
}

/// A lexical token with its character position in the query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Record id for [`TokenKind::Id`], timestamp bound for date kinds, else 0
    pub value: i64,
    pub position: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, position: usize) -> Self {
        let text = text.into();
        let value = match kind {
            TokenKind::DateLt | TokenKind::DateGte => resolve_date(&text, Rounding::Down),
            TokenKind::DateLte | TokenKind::DateGt => resolve_date(&text, Rounding::Up),
            TokenKind::Id => text
                .chars()
                .filter(char::is_ascii_digit)
                .collect::<String>()
                .parse()
                .ok(),
            _ => None,
        }
        .unwrap_or(0);

        Self {
            kind,
            text,
            value,
            position,
        }
    }

    pub fn is_one_of(&self, kinds: &[TokenKind]) -> bool {
        kinds.contains(&self.kind)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Text => write!(f, "{}", self.text),
            TokenKind::Id => write!(f, "ID={}", self.value),
            TokenKind::DateLt => write!(f, "<{}", self.value),
            TokenKind::DateLte => write!(f, "<={}", self.value),
            TokenKind::DateGt => write!(f, ">{}", self.value),
            TokenKind::DateGte => write!(f, ">={}", self.value),
            TokenKind::Unlabeled => write!(f, "UNLABELED"),
            TokenKind::And => write!(f, "AND"),
            TokenKind::Or => write!(f, "OR"),
            TokenKind::Not => write!(f, "NOT"),
            TokenKind::GroupStart => write!(f, "GROUP"),
            TokenKind::GroupEnd => write!(f, "GROUP_END"),
        }
    }
}

// Groups: year month day hour minute second millis. Components may be
// separated by any non-digit, may drop a leading zero, and may only be left
// out from the end.
const DATE_PATTERN: &str = concat!(
    r"^[<>=\s]*",
    r"([0-9]{4}|[0-9]{1,3}$)",
    r"(?:[^0-9]?(1[012]|0?[1-9]))?",
    r"(?:[^0-9]?([12][0-9]|3[01]|0?[1-9]))?",
    r"(?:[^0-9]?(1[0-9]|2[0123]|0?[0-9]))?",
    r"(?:[^0-9]?([12345][0-9]|0?[0-9]))?",
    r"(?:[^0-9]?([12345][0-9]|0?[0-9]))?",
    r"(?:[^0-9]?([0-9]{1,3}))?$",
);

fn date_regex() -> Option<&'static Regex> {
    static REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(DATE_PATTERN).ok()).as_ref()
}

/// Resolve partial date text like `2019.6` or `20191227-1234` to a timestamp
///
/// Returns `None` when the text is not a recognisable date.
pub fn resolve_date(text: &str, rounding: Rounding) -> Option<i64> {
    let caps = date_regex()?.captures(text)?;
    let up = rounding == Rounding::Up;
    let part = |i: usize, down: i64, up_value: i64| -> i64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(if up { up_value } else { down })
    };
    // Milliseconds are a fraction: ".1" is 100 ms, ".12" is 120 ms
    let ms = caps
        .get(7)
        .and_then(|m| format!("{:0<3}", m.as_str()).parse().ok())
        .unwrap_or(if up { 999 } else { 0 });

    Some(human_time::to_date_time(
        part(1, 0, 0),
        part(2, 1, 12),
        part(3, 1, 31),
        part(4, 0, 23),
        part(5, 0, 59),
        part(6, 0, 59),
        ms,
    ))
}

fn is_quote(c: char) -> bool {
    matches!(c, '"' | '\'' | '`')
}

fn is_comparator(c: char) -> bool {
    matches!(c, '<' | '>' | '=')
}

fn is_operator(c: char) -> bool {
    matches!(c, '!' | '|' | '&' | ',')
}

fn is_group(c: char) -> bool {
    matches!(c, '(' | ')')
}

fn is_label_char(c: char) -> bool {
    !c.is_whitespace()
        && !c.is_control()
        && !is_quote(c)
        && !is_comparator(c)
        && !is_operator(c)
        && !is_group(c)
}

/// Digits, `-`, `.` and `:` only
fn is_date_text(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | '.' | ':'))
}

/// Starts with a digit and reads like a date (or date range)
fn is_bare_date(text: &str, min_len: usize) -> bool {
    text.starts_with(|c: char| c.is_ascii_digit())
        && text.chars().count() >= min_len
        && is_date_text(text)
}

/// Split on runs of two or more dots
fn split_range(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'.' && bytes.get(i + 1) == Some(&b'.') {
            parts.push(&text[start..i]);
            while i < bytes.len() && bytes[i] == b'.' {
                i += 1;
            }
            start = i;
        } else {
            i += 1;
        }
    }
    parts.push(&text[start..]);
    parts
}

fn operator(input: &str) -> IResult<&str, TokenKind> {
    alt((
        value(TokenKind::Or, take_while1(|c: char| c == '|')),
        value(TokenKind::Or, take_while1(|c: char| c == ',')),
        value(TokenKind::And, take_while1(|c: char| c == '&')),
        value(TokenKind::Not, take_while1(|c: char| c == '!')),
    ))(input)
}

/// Comparator run, optional whitespace, then the compared text
fn comparison(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, cmp) = take_while1(is_comparator)(input)?;
    let (input, _) = take_while(char::is_whitespace)(input)?;
    let (input, rest) =
        take_while(|c: char| !c.is_whitespace() && !is_operator(c) && !is_group(c))(input)?;
    Ok((input, (cmp, rest)))
}

fn label(input: &str) -> IResult<&str, &str> {
    take_while1(is_label_char)(input)
}

/// Quoted text; backslash escapes only inside double quotes. An unterminated
/// quote runs to the end of the input.
fn quoted(input: &str) -> (&str, String) {
    let mut chars = input.char_indices();
    let quote = match chars.next() {
        Some((_, q)) => q,
        None => return (input, String::new()),
    };
    let mut text = String::new();
    while let Some((i, c)) = chars.next() {
        if c == quote {
            return (&input[i + c.len_utf8()..], text);
        }
        if c == '\\' && quote == '"' {
            match chars.next() {
                Some((_, escaped)) => text.push(escaped),
                None => break,
            }
            continue;
        }
        text.push(c);
    }
    (&input[input.len()..], text)
}

/// Turns query text into tokens
pub struct Tokenizer<'a> {
    query: &'a str,
}

impl<'a> Tokenizer<'a> {
    pub fn new(query: &'a str) -> Self {
        Self { query }
    }

    /// Tokenize the whole query
    pub fn tokenize(&self) -> QueryResult<Vec<Token>> {
        let mut tokens = Vec::new();
        let mut expects_operand = true;
        let mut rest = self.query;
        // Character offset of `rest`, advanced by what each step consumes
        let mut position = 0;

        loop {
            let trimmed = rest.trim_start();
            position += consumed_chars(rest, trimmed);
            rest = trimmed;
            if rest.is_empty() {
                break;
            }

            let (remaining, produced) = self.next_tokens(rest, position)?;
            position += consumed_chars(rest, remaining);
            rest = remaining;

            let (Some(first), Some(last)) = (produced.first(), produced.last()) else {
                continue;
            };
            if !expects_operand
                && !first.is_one_of(&[TokenKind::And, TokenKind::Or, TokenKind::GroupEnd])
            {
                tokens.push(Token::new(TokenKind::And, " ", first.position));
            }
            expects_operand = last.kind.expects_operand();
            tokens.extend(produced);
        }
        Ok(tokens)
    }

    fn error(&self, position: usize, message: impl Into<String>) -> QueryError {
        QueryError::parse(self.query, position, message)
    }

    /// Lex one token at the start of `input`, returning one or more tokens
    fn next_tokens(&self, input: &'a str, position: usize) -> QueryResult<(&'a str, Vec<Token>)> {
        let Some(c) = input.chars().next() else {
            return Ok((input, Vec::new()));
        };
        let single = |rest: &'a str,
                      kind: TokenKind,
                      text: &str|
         -> QueryResult<(&'a str, Vec<Token>)> {
            Ok((rest, vec![Token::new(kind, text, position)]))
        };

        match c {
            c if is_quote(c) => {
                let (rest, text) = quoted(input);
                single(rest, TokenKind::Text, &text)
            }
            '(' => single(&input[1..], TokenKind::GroupStart, "("),
            ')' => single(&input[1..], TokenKind::GroupEnd, ")"),
            c if is_operator(c) => {
                let (rest, kind) =
                    operator(input).map_err(|_| self.error(position, "Expected operator"))?;
                single(rest, kind, &input[..input.len() - rest.len()])
            }
            c if is_comparator(c) => {
                let (rest, (cmp, compared)) = comparison(input)
                    .map_err(|_| self.error(position, "Expected comparison"))?;
                self.comparison_token(position, cmp, compared)
                    .map(|token| (rest, vec![token]))
            }
            c if is_label_char(c) => {
                let (rest, word) =
                    label(input).map_err(|_| self.error(position, "Expected label"))?;
                self.word_tokens(position, word).map(|tokens| (rest, tokens))
            }
            c => Err(self.error(
                position,
                format!("Unexpected character: {:?} ({})", c, c as u32),
            )),
        }
    }

    fn comparison_token(&self, position: usize, cmp: &str, compared: &str) -> QueryResult<Token> {
        let kind = match cmp {
            "<" => TokenKind::DateLt,
            "<=" => TokenKind::DateLte,
            ">" => TokenKind::DateGt,
            ">=" => TokenKind::DateGte,
            _ => return Ok(Token::new(TokenKind::Text, format!("{}{}", cmp, compared), position)),
        };
        if !is_date_text(compared) {
            return Ok(Token::new(TokenKind::Text, format!("{}{}", cmp, compared), position));
        }
        if compared.contains("..") {
            return Err(self.error(
                position,
                format!("Prefix operator not allowed with ranges: {}", compared),
            ));
        }
        self.date_token(kind, compared, position)
    }

    fn date_token(&self, kind: TokenKind, text: &str, position: usize) -> QueryResult<Token> {
        let rounding = match kind {
            TokenKind::DateLt | TokenKind::DateGte => Rounding::Down,
            _ => Rounding::Up,
        };
        if resolve_date(text, rounding).is_none() {
            return Err(self.error(position, format!("Invalid date: {}", text)));
        }
        Ok(Token::new(kind, text, position))
    }

    /// Classify an unquoted word
    fn word_tokens(&self, position: usize, word: &str) -> QueryResult<Vec<Token>> {
        let kind = if word.eq_ignore_ascii_case("OR") {
            TokenKind::Or
        } else if word.eq_ignore_ascii_case("AND") {
            TokenKind::And
        } else if word.eq_ignore_ascii_case("NOT") {
            TokenKind::Not
        } else if word.eq_ignore_ascii_case("@unlabeled") || word.eq_ignore_ascii_case("@nolabel")
        {
            TokenKind::Unlabeled
        } else if let Some(digits) = word.strip_prefix('@').filter(|d| {
            !d.is_empty() && d.chars().all(|c| c.is_ascii_digit())
        }) {
            if digits.parse::<u32>().is_err() {
                return Err(self.error(position, format!("Id out of range: {}", word)));
            }
            TokenKind::Id
        } else if is_bare_date(word, 2) && word.contains("..") {
            let parts = split_range(word);
            if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
                return Err(self.error(position, format!("Illegal range: {}", word)));
            }
            return self.range_tokens(position, parts[0], parts[1]);
        } else if is_bare_date(word, 4) {
            return self.range_tokens(position, word, word);
        } else {
            TokenKind::Text
        };
        Ok(vec![Token::new(kind, word, position)])
    }

    /// `( >=from AND <=upto )`
    fn range_tokens(&self, position: usize, from: &str, upto: &str) -> QueryResult<Vec<Token>> {
        Ok(vec![
            Token::new(TokenKind::GroupStart, "(", position),
            self.date_token(TokenKind::DateGte, from, position)?,
            Token::new(TokenKind::And, "&", position),
            self.date_token(TokenKind::DateLte, upto, position)?,
            Token::new(TokenKind::GroupEnd, ")", position),
        ])
    }
}

/// Number of characters between the start of `from` and `rest`, a suffix of it
fn consumed_chars(from: &str, rest: &str) -> usize {
    from[..from.len() - rest.len()].chars().count()
}

/// Tokenize `query`
pub fn tokenize(query: &str) -> QueryResult<Vec<Token>> {
    Tokenizer::new(query).tokenize()
}
