//! # Barcode & GS1 Decoder
//!
//! Classifies a raw scan and extracts GS1 application identifiers (AIs).
//!
//! ## Decision Flow
//! ```text
//!   raw scan
//!      │  trim spaces / CR / LF (GS is kept: it is data)
//!      ▼
//!   ┌──────────────────────────────┐
//!   │ ]d2 ]Q3 ]e0 prefix?          │──► gs1-datamatrix ─┐
//!   │ ]C1 prefix?                  │──► gs1-128 ────────┤
//!   │ leading / embedded GS?       │──► gs1-datamatrix ─┤
//!   │ "(01)..." bracketed form?    │──► gs1-datamatrix ─┼──► parse AIs
//!   │ bare "01" + valid GTIN-14?   │──► gs1-datamatrix ─┘     │
//!   └──────────────┬───────────────┘                          ▼
//!                  │ none of the above              Ok  → parsed = Some
//!                  ▼                                Err → parsed = None
//!   12 digits → upc-a, 13 digits → ean-13,
//!   printable ASCII ≤ 80 → code128, else unknown
//! ```
//!
//! ## Totality
//! [`decode`] never panics and never returns an error. A malformed GS1 body
//! keeps its classification and yields `parsed = None`; the reason is only
//! logged at debug level.
//!
//! ## Supported AIs
//! | AI        | Meaning                  | Format            |
//! |-----------|--------------------------|-------------------|
//! | 00        | SSCC                     | N18               |
//! | 01, 02    | GTIN (check digit)       | N14               |
//! | 10        | Batch / lot              | X..20             |
//! | 11–17     | Dates (17 = expiration)  | N6 YYMMDD         |
//! | 20        | Variant                  | N2                |
//! | 21, 22    | Serial / CPV             | X..20             |
//! | 240, 241  | Additional ids           | X..30             |
//! | 250, 251  | Secondary serial / ref   | X..30             |
//! | 30, 37    | Counts                   | N..8              |
//! | 31xx–36xx | Trade measures           | N6                |
//! | 400, 401  | Order / consignment      | X..30             |
//! | 410–417   | GLNs                     | N13               |
//! | 420       | Ship-to postal code      | X..20             |
//! | 422       | Country of origin        | N3                |
//! | 90–99     | Internal                 | X..30 / X..90     |

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::MAX_LINEAR_BARCODE_LEN;

/// ASCII group separator, the transmitted form of FNC1.
const GS: char = '\u{1D}';

// =============================================================================
// Output Types
// =============================================================================

/// Symbology family of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum Symbology {
    #[serde(rename = "upc-a")]
    UpcA,
    #[serde(rename = "ean-13")]
    Ean13,
    #[serde(rename = "code128")]
    Code128,
    #[serde(rename = "gs1-datamatrix")]
    Gs1DataMatrix,
    #[serde(rename = "gs1-128")]
    Gs1_128,
    #[serde(rename = "unknown")]
    Unknown,
}

impl Symbology {
    pub fn as_str(&self) -> &'static str {
        match self {
            Symbology::UpcA => "upc-a",
            Symbology::Ean13 => "ean-13",
            Symbology::Code128 => "code128",
            Symbology::Gs1DataMatrix => "gs1-datamatrix",
            Symbology::Gs1_128 => "gs1-128",
            Symbology::Unknown => "unknown",
        }
    }

    pub fn is_gs1(&self) -> bool {
        matches!(self, Symbology::Gs1DataMatrix | Symbology::Gs1_128)
    }
}

/// Fields extracted from a GS1 element string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Gs1Data {
    pub gtin: Option<String>,
    pub lot: Option<String>,
    #[ts(as = "Option<String>")]
    pub expiration: Option<NaiveDate>,
    pub serial: Option<String>,
}

/// Result of decoding one raw scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ScanDecode {
    pub classification: Symbology,
    pub parsed: Option<Gs1Data>,
}

/// Why a GS1 element string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Gs1Error {
    #[error("empty element string")]
    Empty,

    #[error("unknown application identifier at '{0}'")]
    UnknownAi(String),

    #[error("AI ({ai}) expects {expected} characters")]
    WrongLength { ai: String, expected: usize },

    #[error("AI ({ai}) exceeds maximum length {max}")]
    TooLong { ai: String, max: usize },

    #[error("AI ({ai}) has an empty value")]
    EmptyValue { ai: String },

    #[error("AI ({ai}) must be numeric")]
    NotNumeric { ai: String },

    #[error("AI ({ai}) contains characters outside the GS1 set")]
    InvalidCharacter { ai: String },

    #[error("GTIN {0} has an invalid check digit")]
    BadCheckDigit(String),

    #[error("AI ({ai}) has an invalid date '{value}'")]
    InvalidDate { ai: String, value: String },

    #[error("AI ({ai}) appears twice with different values")]
    ConflictingDuplicate { ai: String },

    #[error("malformed bracketed element string")]
    MalformedBrackets,
}

// =============================================================================
// Decode
// =============================================================================

/// Classifies `raw` and parses GS1 content when present.
pub fn decode(raw: &str) -> ScanDecode {
    let value = raw.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\r' | '\n'));

    let (classification, body) = match detect_gs1(value) {
        Some(found) => found,
        None => {
            return ScanDecode {
                classification: classify_linear(value),
                parsed: None,
            }
        }
    };

    let parsed = match parse_body(body) {
        Ok(data) => Some(data),
        Err(err) => {
            tracing::debug!(
                classification = classification.as_str(),
                error = %err,
                "GS1 element string rejected"
            );
            None
        }
    };

    ScanDecode {
        classification,
        parsed,
    }
}

/// Operator-facing hint for a scan that matched nothing.
pub fn guidance(classification: Symbology) -> &'static str {
    match classification {
        Symbology::UpcA | Symbology::Ean13 => {
            "This barcode identifies the product but carries no lot or expiration. \
             Scan the UDI (GS1 DataMatrix) barcode instead."
        }
        Symbology::Code128 => {
            "This barcode matched no item and is not a GS1 code. \
             Scan the UDI (GS1 DataMatrix) barcode or enter the details manually."
        }
        Symbology::Gs1DataMatrix | Symbology::Gs1_128 => {
            "The GS1 barcode could not be read completely. \
             Rescan it or enter the details manually."
        }
        Symbology::Unknown => "Unrecognized scan. Check the scanner configuration and rescan.",
    }
}

/// Returns the GS1 classification and the element string to parse.
fn detect_gs1(value: &str) -> Option<(Symbology, &str)> {
    for prefix in ["]d2", "]Q3", "]e0"] {
        if let Some(body) = value.strip_prefix(prefix) {
            return Some((Symbology::Gs1DataMatrix, body));
        }
    }
    if let Some(body) = value.strip_prefix("]C1") {
        return Some((Symbology::Gs1_128, body));
    }
    if value.contains(GS) || opens_with_bracketed_ai(value) {
        return Some((Symbology::Gs1DataMatrix, value));
    }
    if looks_like_bare_element_string(value) {
        return Some((Symbology::Gs1DataMatrix, value));
    }
    None
}

/// `(NN)...` where `NN` is an AI from the table. Free text that merely
/// starts with a parenthesis stays linear.
fn opens_with_bracketed_ai(value: &str) -> bool {
    match value.strip_prefix('(').and_then(|rest| rest.split_once(')')) {
        Some((ai, _)) => matches!(lookup_ai(ai), Some((len, _)) if len == ai.len()),
        None => false,
    }
}

/// A separator-less string that begins with a valid AI (01) and parses
/// completely. Plain 12/13 digit codes are too short to qualify.
fn looks_like_bare_element_string(value: &str) -> bool {
    match value.strip_prefix("01").and_then(|rest| rest.get(..14)) {
        Some(gtin) => {
            is_numeric(gtin) && check_digit_valid(gtin) && parse_element_string(value).is_ok()
        }
        None => false,
    }
}

fn classify_linear(value: &str) -> Symbology {
    if value.is_empty() {
        return Symbology::Unknown;
    }
    if is_numeric(value) {
        match value.len() {
            12 => return Symbology::UpcA,
            13 => return Symbology::Ean13,
            _ => {}
        }
    }
    let printable = value.chars().all(|c| (' '..='~').contains(&c));
    if printable && value.len() <= MAX_LINEAR_BARCODE_LEN {
        Symbology::Code128
    } else {
        Symbology::Unknown
    }
}

// =============================================================================
// Element String Parsing
// =============================================================================

/// How the data of an AI is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AiFormat {
    /// Exactly `len` digits.
    FixedNumeric(usize),
    /// Up to `max` digits.
    VarNumeric(usize),
    /// Up to `max` characters of the GS1 character set.
    VarAlpha(usize),
}

/// Looks up the AI at the start of `s`. Returns its length and format.
fn lookup_ai(s: &str) -> Option<(usize, AiFormat)> {
    use AiFormat::*;

    let d = |n: usize| s.get(..n).filter(|p| is_numeric(p));
    let two = d(2)?;

    let found = match two {
        "00" => (2, FixedNumeric(18)),
        "01" | "02" => (2, FixedNumeric(14)),
        "10" | "21" | "22" => (2, VarAlpha(20)),
        "11" | "12" | "13" | "15" | "16" | "17" => (2, FixedNumeric(6)),
        "20" => (2, FixedNumeric(2)),
        "30" | "37" => (2, VarNumeric(8)),
        "90" => (2, VarAlpha(30)),
        "91" | "92" | "93" | "94" | "95" | "96" | "97" | "98" | "99" => (2, VarAlpha(90)),
        "24" | "25" | "40" => match d(3)? {
            "240" | "241" | "250" | "251" | "400" | "401" => (3, VarAlpha(30)),
            _ => return None,
        },
        "41" => match d(3)? {
            "410" | "411" | "412" | "413" | "414" | "415" | "416" | "417" => (3, FixedNumeric(13)),
            _ => return None,
        },
        "42" => match d(3)? {
            "420" => (3, VarAlpha(20)),
            "422" => (3, FixedNumeric(3)),
            _ => return None,
        },
        "31" | "32" | "33" | "34" | "35" | "36" => {
            d(4)?;
            (4, FixedNumeric(6))
        }
        _ => return None,
    };
    Some(found)
}

/// Parses a GS1 body in either bracketed or raw (GS-delimited) form.
pub fn parse_body(body: &str) -> Result<Gs1Data, Gs1Error> {
    if body.starts_with('(') {
        parse_bracketed(body)
    } else {
        parse_element_string(body)
    }
}

/// Parses a raw element string where variable fields end at GS or end of data.
pub fn parse_element_string(body: &str) -> Result<Gs1Data, Gs1Error> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut rest = body;

    loop {
        rest = rest.trim_start_matches(GS);
        if rest.is_empty() {
            break;
        }

        let (ai_len, format) =
            lookup_ai(rest).ok_or_else(|| Gs1Error::UnknownAi(preview(rest)))?;
        let ai = rest[..ai_len].to_string();
        rest = &rest[ai_len..];

        let data = match format {
            AiFormat::FixedNumeric(len) => {
                let data = rest
                    .get(..len)
                    .filter(|d| !d.contains(GS))
                    .ok_or_else(|| Gs1Error::WrongLength {
                        ai: ai.clone(),
                        expected: len,
                    })?;
                rest = &rest[len..];
                data
            }
            AiFormat::VarNumeric(_) | AiFormat::VarAlpha(_) => {
                let end = rest.find(GS).unwrap_or(rest.len());
                let data = &rest[..end];
                rest = &rest[end..];
                data
            }
        };

        check_field(&ai, format, data)?;
        pairs.push((ai, data.to_string()));
    }

    interpret(pairs)
}

/// Parses the human-readable `(AI)value(AI)value` form.
fn parse_bracketed(body: &str) -> Result<Gs1Data, Gs1Error> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut rest = body;

    while !rest.is_empty() {
        let after_open = rest.strip_prefix('(').ok_or(Gs1Error::MalformedBrackets)?;
        let close = after_open.find(')').ok_or(Gs1Error::MalformedBrackets)?;
        let ai = &after_open[..close];
        let after_ai = &after_open[close + 1..];
        let end = after_ai.find('(').unwrap_or(after_ai.len());
        let data = &after_ai[..end];
        rest = &after_ai[end..];

        let (ai_len, format) =
            lookup_ai(ai).ok_or_else(|| Gs1Error::UnknownAi(ai.to_string()))?;
        if ai_len != ai.len() {
            return Err(Gs1Error::UnknownAi(ai.to_string()));
        }
        if let AiFormat::FixedNumeric(len) = format {
            if data.len() != len {
                return Err(Gs1Error::WrongLength {
                    ai: ai.to_string(),
                    expected: len,
                });
            }
        }

        check_field(ai, format, data)?;
        pairs.push((ai.to_string(), data.to_string()));
    }

    interpret(pairs)
}

/// Character and length rules shared by both transports.
fn check_field(ai: &str, format: AiFormat, data: &str) -> Result<(), Gs1Error> {
    if data.is_empty() {
        return Err(Gs1Error::EmptyValue { ai: ai.to_string() });
    }
    match format {
        AiFormat::FixedNumeric(_) => {
            if !is_numeric(data) {
                return Err(Gs1Error::NotNumeric { ai: ai.to_string() });
            }
        }
        AiFormat::VarNumeric(max) => {
            if data.len() > max {
                return Err(Gs1Error::TooLong {
                    ai: ai.to_string(),
                    max,
                });
            }
            if !is_numeric(data) {
                return Err(Gs1Error::NotNumeric { ai: ai.to_string() });
            }
        }
        AiFormat::VarAlpha(max) => {
            if data.chars().count() > max {
                return Err(Gs1Error::TooLong {
                    ai: ai.to_string(),
                    max,
                });
            }
            if !data.chars().all(|c| ('!'..='~').contains(&c)) {
                return Err(Gs1Error::InvalidCharacter { ai: ai.to_string() });
            }
        }
    }
    Ok(())
}

/// Validates AI semantics and keeps the fields we track.
fn interpret(pairs: Vec<(String, String)>) -> Result<Gs1Data, Gs1Error> {
    if pairs.is_empty() {
        return Err(Gs1Error::Empty);
    }

    let mut seen: Vec<(String, String)> = Vec::with_capacity(pairs.len());
    let mut data = Gs1Data::default();

    for (ai, value) in pairs {
        if let Some((_, prior)) = seen.iter().find(|(a, _)| *a == ai) {
            if *prior != value {
                return Err(Gs1Error::ConflictingDuplicate { ai });
            }
            continue;
        }

        match ai.as_str() {
            "01" | "02" => {
                if !check_digit_valid(&value) {
                    return Err(Gs1Error::BadCheckDigit(value));
                }
                if ai == "01" {
                    data.gtin = Some(value.clone());
                }
            }
            "11" | "12" | "13" | "15" | "16" | "17" => {
                let date = parse_yymmdd(&value).ok_or_else(|| Gs1Error::InvalidDate {
                    ai: ai.clone(),
                    value: value.clone(),
                })?;
                if ai == "17" {
                    data.expiration = Some(date);
                }
            }
            "10" => data.lot = Some(value.clone()),
            "21" => data.serial = Some(value.clone()),
            _ => {}
        }

        seen.push((ai, value));
    }

    Ok(data)
}

// =============================================================================
// Helpers
// =============================================================================

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn preview(s: &str) -> String {
    s.chars().take(4).collect()
}

/// GS1 mod-10 check digit over a numeric key of any length.
///
/// Weights alternate 3,1,3,... starting from the digit left of the check
/// digit.
pub fn check_digit_valid(digits: &str) -> bool {
    if digits.len() < 2 || !is_numeric(digits) {
        return false;
    }
    let values: Vec<u32> = digits.bytes().map(|b| u32::from(b - b'0')).collect();
    let (body, check) = values.split_at(values.len() - 1);

    let sum: u32 = body
        .iter()
        .rev()
        .enumerate()
        .map(|(i, v)| if i % 2 == 0 { v * 3 } else { *v })
        .sum();

    (10 - sum % 10) % 10 == check[0]
}

/// YYMMDD with century 20YY. DD = 00 means the last day of the month.
fn parse_yymmdd(value: &str) -> Option<NaiveDate> {
    if value.len() != 6 || !is_numeric(value) {
        return None;
    }
    let year = 2000 + value[0..2].parse::<i32>().ok()?;
    let month = value[2..4].parse::<u32>().ok()?;
    let day = value[4..6].parse::<u32>().ok()?;

    if day == 0 {
        last_day_of_month(year, month)
    } else {
        NaiveDate::from_ymd_opt(year, month, day)
    }
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_first = if first.month() == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    next_first.pred_opt()
}

// =============================================================================
// Unit Tests
// =============================================================================
