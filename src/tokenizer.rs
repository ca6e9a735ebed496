use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use nom::{
    character::complete::{char, digit1, one_of, space1},
    combinator::{map_res, opt},
    sequence::{pair, preceded, terminated, tuple},
    IResult,
};
use serde::Serialize;

use crate::config::TokenizerConfig;

/// Events whose fields follow their own layout instead of the
/// source/dest unit block.
const META_EVENTS: &[&str] = &[
    "COMBAT_LOG_VERSION",
    "ZONE_CHANGE",
    "MAP_CHANGE",
    "ENCOUNTER_START",
    "ENCOUNTER_END",
    "ENCOUNTER_PHASE_CHANGE",
    "CHALLENGE_MODE_START",
    "CHALLENGE_MODE_END",
    "COMBATANT_INFO",
];

/// sourceGUID, sourceName, sourceFlags, sourceRaidFlags,
/// destGUID, destName, destFlags, destRaidFlags
pub const BASE_FIELD_COUNT: usize = 8;
pub const ABSORBER_FIELD_COUNT: usize = 4;

/// One field of a log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Token {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Token>),
    Tuple(Vec<Token>),
}

impl Token {
    pub fn as_i64(&self) -> i64 {
        match self {
            Token::Int(v) => *v,
            Token::Float(v) => *v as i64,
            Token::Bool(b) => *b as i64,
            Token::Str(s) => match parse_scalar(s) {
                Token::Int(v) => v,
                Token::Float(v) => v as i64,
                _ => 0,
            },
            _ => 0,
        }
    }

    /// Negative values clamp to zero.
    pub fn as_u64(&self) -> u64 {
        self.as_i64().max(0) as u64
    }

    pub fn as_u32(&self) -> u32 {
        self.as_u64().min(u32::MAX as u64) as u32
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Token::Int(v) => *v as f64,
            Token::Float(v) => *v,
            Token::Str(s) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// `nil` and `0` are false, `1`/`true` are true.
    pub fn as_flag(&self) -> bool {
        match self {
            Token::Bool(b) => *b,
            Token::Int(v) => *v != 0,
            Token::Float(v) => *v != 0.0,
            Token::Str(s) => matches!(s.as_str(), "1" | "true" | "TRUE"),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Token::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn text(&self) -> String {
        match self {
            Token::Str(s) => s.clone(),
            Token::Int(v) => v.to_string(),
            Token::Float(v) => v.to_string(),
            Token::Bool(b) => b.to_string(),
            _ => String::new(),
        }
    }

    /// Elements of a list or tuple; empty for scalars.
    pub fn items(&self) -> &[Token] {
        match self {
            Token::List(items) | Token::Tuple(items) => items,
            _ => &[],
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Token::List(_) | Token::Tuple(_))
    }

    pub fn is_flag_like(&self) -> bool {
        matches!(self, Token::Nil | Token::Bool(_))
    }
}

/// Safe lookups over a token slice.
pub(crate) fn int_at(tokens: &[Token], index: usize) -> i64 {
    tokens.get(index).map(Token::as_i64).unwrap_or(0)
}

pub(crate) fn u64_at(tokens: &[Token], index: usize) -> u64 {
    tokens.get(index).map(Token::as_u64).unwrap_or(0)
}

pub(crate) fn u32_at(tokens: &[Token], index: usize) -> u32 {
    tokens.get(index).map(Token::as_u32).unwrap_or(0)
}

pub(crate) fn f64_at(tokens: &[Token], index: usize) -> f64 {
    tokens.get(index).map(Token::as_f64).unwrap_or(0.0)
}

pub(crate) fn flag_at(tokens: &[Token], index: usize) -> bool {
    tokens.get(index).map(Token::as_flag).unwrap_or(false)
}

pub(crate) fn text_at(tokens: &[Token], index: usize) -> String {
    tokens.get(index).map(Token::text).unwrap_or_default()
}

/// A tokenized line split into its structural blocks.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedLine {
    pub line_number: u64,
    pub timestamp: NaiveDateTime,
    pub event_type: String,
    pub base: Vec<Token>,
    pub prefix: Vec<Token>,
    pub suffix: Vec<Token>,
    /// Suffix starts with the advanced unit-state block.
    pub extended: bool,
    pub extended_block_len: usize,
    pub raw_line: String,
}

impl ParsedLine {
    pub fn unit_state(&self) -> Option<&[Token]> {
        if self.extended {
            self.suffix.get(..self.extended_block_len)
        } else {
            None
        }
    }

    /// Type-specific suffix fields, after the unit-state block if present.
    pub fn payload(&self) -> &[Token] {
        if self.extended {
            self.suffix.get(self.extended_block_len..).unwrap_or(&[])
        } else {
            &self.suffix
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TokenizerStats {
    pub lines_processed: u64,
    pub errors: u64,
    pub success_rate: f64,
}

/// Tokenizes individual combat log lines.
pub struct LineTokenizer {
    config: TokenizerConfig,
    line_count: u64,
    error_count: u64,
}

impl LineTokenizer {
    pub fn new(config: TokenizerConfig) -> Self {
        Self::starting_at(config, 0)
    }

    /// Tokenizer whose first line is numbered `line_offset + 1`.
    pub fn starting_at(config: TokenizerConfig, line_offset: u64) -> Self {
        LineTokenizer {
            config,
            line_count: line_offset,
            error_count: 0,
        }
    }

    pub fn line_count(&self) -> u64 {
        self.line_count
    }

    /// Parse one raw line. Blank lines yield `None` without counting as an
    /// error; anything without a timestamp and event type is an error.
    pub fn parse(&mut self, raw_line: &str) -> Option<ParsedLine> {
        self.line_count += 1;
        let line = raw_line.trim();
        if line.is_empty() {
            return None;
        }

        let parsed = self.tokenize(line);
        if parsed.is_none() {
            self.error_count += 1;
        }
        parsed
    }

    fn tokenize(&self, line: &str) -> Option<ParsedLine> {
        let (event_part, raw_ts) = line_header(line).ok()?;
        let timestamp = raw_ts.to_datetime(self.config.default_year)?;

        let mut fields = split_top_level(event_part).into_iter();
        let event_type = fields.next()?.trim().to_string();
        if !is_event_type(&event_type) {
            return None;
        }
        let params: Vec<Token> = fields.map(parse_token).collect();

        let (base, prefix, suffix) = if META_EVENTS.contains(&event_type.as_str()) {
            (Vec::new(), Vec::new(), params)
        } else {
            split_blocks(&event_type, params)
        };

        let block_len = self.config.extended_block_len;
        let extended = minimum_payload(&event_type)
            .map(|min| suffix.len() >= block_len + min)
            .unwrap_or(false);

        Some(ParsedLine {
            line_number: self.line_count,
            timestamp,
            event_type,
            base,
            prefix,
            suffix,
            extended,
            extended_block_len: block_len,
            raw_line: line.to_string(),
        })
    }

    pub fn stats(&self) -> TokenizerStats {
        let processed = self.line_count;
        TokenizerStats {
            lines_processed: processed,
            errors: self.error_count,
            success_rate: (processed.saturating_sub(self.error_count)) as f64
                / processed.max(1) as f64,
        }
    }
}

impl Default for LineTokenizer {
    fn default() -> Self {
        Self::new(TokenizerConfig::default())
    }
}

struct RawTimestamp {
    month: u32,
    day: u32,
    year: Option<i32>,
    hour: u32,
    minute: u32,
    second: u32,
    millis: u32,
}

impl RawTimestamp {
    fn to_datetime(&self, default_year: i32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year.unwrap_or(default_year), self.month, self.day)?
            .and_hms_milli_opt(self.hour, self.minute, self.second, self.millis)
    }
}

fn number<T: FromStr>(input: &str) -> IResult<&str, T> {
    map_res(digit1, |digits: &str| digits.parse::<T>())(input)
}

/// `M/D[/YYYY] H:MM:SS[.fff][+-tz]`. The timezone offset is dropped.
fn log_timestamp(input: &str) -> IResult<&str, RawTimestamp> {
    let (input, (month, _, day)) = tuple((number::<u32>, char('/'), number::<u32>))(input)?;
    let (input, year) = opt(preceded(char('/'), number::<i32>))(input)?;
    let (input, _) = space1(input)?;
    let (input, (hour, _, minute, _, second)) = tuple((
        number::<u32>,
        char(':'),
        number::<u32>,
        char(':'),
        number::<u32>,
    ))(input)?;
    let (input, fraction) = opt(preceded(char('.'), digit1))(input)?;
    let (input, _offset) = opt(pair(one_of("+-"), digit1))(input)?;

    let millis = fraction
        .map(|digits: &str| {
            let head = &digits[..digits.len().min(3)];
            format!("{:0<3}", head).parse::<u32>().unwrap_or(0)
        })
        .unwrap_or(0);

    Ok((
        input,
        RawTimestamp {
            month,
            day,
            year,
            hour,
            minute,
            second,
            millis,
        },
    ))
}

fn line_header(input: &str) -> IResult<&str, RawTimestamp> {
    terminated(log_timestamp, space1)(input)
}

fn is_event_type(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
}

/// Split a comma-separated string at top level, respecting quotes and
/// bracket/paren nesting.
pub(crate) fn split_top_level(input: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    if input.trim().is_empty() {
        return fields;
    }

    let bytes = input.as_bytes();
    let mut depth: i32 = 0;
    let mut in_quotes = false;
    let mut start = 0;

    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b'(' | b'[' if !in_quotes => depth += 1,
            b')' | b']' if !in_quotes => depth = (depth - 1).max(0),
            b',' if !in_quotes && depth == 0 => {
                fields.push(input[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(input[start..].trim());
    fields
}

fn is_balanced(content: &str) -> bool {
    let mut depth: i32 = 0;
    let mut in_quotes = false;
    for b in content.bytes() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b'(' | b'[' if !in_quotes => depth += 1,
            b')' | b']' if !in_quotes => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && !in_quotes
}

/// Convert one raw field, recursing into `[...]` and `(...)` groups.
pub fn parse_token(raw: &str) -> Token {
    let s = raw.trim();
    if let Some(rest) = s.strip_prefix('"') {
        return Token::Str(rest.strip_suffix('"').unwrap_or(rest).to_string());
    }
    if let Some(inner) = s.strip_prefix('[') {
        return Token::List(parse_group(inner.strip_suffix(']')));
    }
    if let Some(inner) = s.strip_prefix('(') {
        return Token::Tuple(parse_group(inner.strip_suffix(')')));
    }
    parse_scalar(s)
}

fn parse_group(inner: Option<&str>) -> Vec<Token> {
    match inner {
        Some(content) if !content.trim().is_empty() && is_balanced(content) => {
            split_top_level(content).into_iter().map(parse_token).collect()
        }
        _ => Vec::new(),
    }
}

fn parse_scalar(s: &str) -> Token {
    match s {
        "nil" => return Token::Nil,
        "true" => return Token::Bool(true),
        "false" => return Token::Bool(false),
        _ => {}
    }
    if let Ok(v) = s.parse::<i64>() {
        return Token::Int(v);
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if let Ok(v) = i64::from_str_radix(hex, 16) {
            return Token::Int(v);
        }
    }
    let numeric_chars = s
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'));
    if numeric_chars && s.bytes().any(|b| b.is_ascii_digit()) {
        if let Ok(v) = s.parse::<f64>() {
            return Token::Float(v);
        }
    }
    Token::Str(s.to_string())
}

/// Number of prefix fields carried by an event type.
fn prefix_len(event_type: &str) -> usize {
    if event_type.starts_with("SPELL_")
        || event_type.starts_with("RANGE_")
        || event_type.starts_with("DAMAGE_")
    {
        3
    } else if event_type.starts_with("ENVIRONMENTAL_") {
        1
    } else {
        0
    }
}

/// Smallest type-specific payload for families that can carry the
/// unit-state block. Other families never have it.
fn minimum_payload(event_type: &str) -> Option<usize> {
    if event_type.ends_with("_DAMAGE")
        || event_type.ends_with("_DAMAGE_LANDED")
        || event_type == "DAMAGE_SPLIT"
        || event_type == "DAMAGE_SHIELD"
    {
        Some(6)
    } else if event_type.ends_with("_HEAL") {
        Some(3)
    } else if event_type.ends_with("_ENERGIZE") {
        Some(4)
    } else if event_type.ends_with("_DRAIN") || event_type.ends_with("_LEECH") {
        Some(3)
    } else if event_type.ends_with("_CAST_SUCCESS") {
        Some(0)
    } else {
        None
    }
}

fn split_blocks(event_type: &str, mut params: Vec<Token>) -> (Vec<Token>, Vec<Token>, Vec<Token>) {
    if params.len() < BASE_FIELD_COUNT {
        return (params, Vec::new(), Vec::new());
    }
    let mut rest = params.split_off(BASE_FIELD_COUNT);
    let mut base = params;

    if event_type == "SPELL_ABSORBED" {
        // Optional absorbed-spell triple sits between the target and the
        // absorber; melee absorbs start straight with the absorber GUID.
        let has_spell = matches!(rest.first(), Some(Token::Int(_)))
            && rest.len() >= 3 + ABSORBER_FIELD_COUNT + 4;
        let prefix = if has_spell {
            let tail = rest.split_off(3);
            std::mem::replace(&mut rest, tail)
        } else {
            Vec::new()
        };
        let take = rest.len().min(ABSORBER_FIELD_COUNT);
        let suffix = rest.split_off(take);
        base.extend(rest);
        return (base, prefix, suffix);
    }

    let wanted = prefix_len(event_type);
    if wanted > 0 && rest.len() >= wanted {
        let suffix = rest.split_off(wanted);
        (base, rest, suffix)
    } else {
        (base, Vec::new(), rest)
    }
}
