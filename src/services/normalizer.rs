//! Cell normalization service
//!
//! Turns the raw strings found in exported CSV extracts into typed values:
//! periods into months, thousands-separated counts into integers and
//! currency strings into decimals.

use regex::Regex;
use std::sync::OnceLock;

use crate::types::Month;

/// Unicode characters some exports use in place of an ASCII space
const SPACE_VARIANTS: &[char] = &[
    '\u{00A0}', // no-break space
    '\u{2007}', // figure space
    '\u{2009}', // thin space
    '\u{200A}', // hair space
    '\u{202F}', // narrow no-break space
    '\u{2002}', // en space
    '\u{2003}', // em space
];

/// Unicode characters some exports use in place of an ASCII hyphen
const DASH_VARIANTS: &[char] = &[
    '\u{2010}', '\u{2011}', '\u{2012}', '\u{2013}', '\u{2014}', '\u{2015}', '\u{2212}',
];

const CURRENCY_SYMBOLS: &[char] = &['£', '$', '€'];

/// Replace Unicode space/dash variants with ASCII and trim.
///
/// # Examples
/// ```
/// use claimdash::services::normalizer::normalize_text;
///
/// assert_eq!(normalize_text("Sep\u{2013}23"), "Sep-23");
/// assert_eq!(normalize_text("\u{00A0}Motor "), "Motor");
/// ```
pub fn normalize_text(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if SPACE_VARIANTS.contains(&c) {
                ' '
            } else if DASH_VARIANTS.contains(&c) {
                '-'
            } else {
                c
            }
        })
        .collect::<String>()
        .trim()
        .to_string()
}

fn iso_period_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4})[-/](\d{1,2})(?:[-/]\d{1,2})?(?:[ T].*)?$").expect("valid regex")
    })
}

fn named_period_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z]{3,9})\.?[-\s/]?(\d{2}|\d{4})$").expect("valid regex")
    })
}

/// Month number from an English month name or abbreviation ("Sept" included)
fn month_from_name(name: &str) -> Option<u32> {
    const NAMES: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    let lower = name.to_ascii_lowercase();
    if lower.len() < 3 {
        return None;
    }
    NAMES
        .iter()
        .position(|full| full.starts_with(&lower))
        .map(|i| i as u32 + 1)
}

/// Parse a period cell into a month.
///
/// Accepted encodings:
/// - ISO-like: "2024-03", "2024-03-01", "2024/3"
/// - Abbreviated: "Mar-24", "Sept-23", "Sep 23", "September-2023"
///
/// Returns `None` when the value cannot be read.
///
/// # Examples
/// ```
/// use claimdash::services::normalizer::parse_period;
/// use claimdash::types::Month;
///
/// assert_eq!(parse_period("Sept-23"), Month::new(2023, 9));
/// assert_eq!(parse_period("2024-03"), Month::new(2024, 3));
/// ```
pub fn parse_period(raw: &str) -> Option<Month> {
    let text = normalize_text(raw);
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = iso_period_re().captures(&text) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        return Month::new(year, month);
    }

    let caps = named_period_re().captures(&text)?;
    let month = month_from_name(&caps[1])?;
    let year_text = &caps[2];
    let year: i32 = year_text.parse().ok()?;
    let year = if year_text.len() == 2 {
        // Same pivot as strptime's %y
        if year < 69 {
            2000 + year
        } else {
            1900 + year
        }
    } else {
        year
    };
    Month::new(year, month)
}

/// Strip separators from a numeric cell; `None` marks an empty/placeholder cell
fn strip_numeric(raw: &str, strip_currency: bool) -> Option<String> {
    let text = normalize_text(raw);
    if text.is_empty() || text == "-" {
        return None;
    }
    Some(
        text.chars()
            .filter(|c| {
                !(*c == ',' || *c == '\'' || *c == ' ')
                    && !(strip_currency && CURRENCY_SYMBOLS.contains(c))
            })
            .collect(),
    )
}

/// Parse a count cell.
///
/// Thousands separators (commas, apostrophes and Unicode spaces) are removed;
/// empty and "-" read as 0. Integral decimals such as "12.0" are accepted.
/// Returns `None` for malformed values.
///
/// # Examples
/// ```
/// use claimdash::services::normalizer::parse_count;
///
/// assert_eq!(parse_count("2,000"), Some(2000));
/// assert_eq!(parse_count("-"), Some(0));
/// assert_eq!(parse_count("abc"), None);
/// ```
pub fn parse_count(raw: &str) -> Option<i64> {
    let Some(digits) = strip_numeric(raw, false) else {
        return Some(0);
    };
    // "12.0" is accepted; fractions, exponents and out-of-range values are not
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits.as_str(), ""));
    if !fraction.chars().all(|c| c == '0') {
        return None;
    }
    whole.parse::<i64>().ok()
}

/// Parse a money cell.
///
/// A leading currency symbol and commas are removed; empty and "-" read as 0.0.
/// Returns `None` for malformed values.
///
/// # Examples
/// ```
/// use claimdash::services::normalizer::parse_money;
///
/// assert_eq!(parse_money("£1,234.50"), Some(1234.50));
/// assert_eq!(parse_money(""), Some(0.0));
/// ```
pub fn parse_money(raw: &str) -> Option<f64> {
    let Some(digits) = strip_numeric(raw, true) else {
        return Some(0.0);
    };
    let value: f64 = digits.parse().ok()?;
    value.is_finite().then_some(value)
}

/// Normalize a CSV header for alias matching: Unicode spaces, trim, lowercase
pub fn normalize_header(raw: &str) -> String {
    normalize_text(raw.trim_start_matches('\u{FEFF}')).to_lowercase()
}
