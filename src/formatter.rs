//! Value Formatter Module
//!
//! Stateless helpers that turn raw record values into the strings printed on
//! the report: dates, money in figures and in words (Indian lac/crore
//! grouping), rounded amounts, addresses and image URLs.
//!
//! None of these functions fail. Unparseable input degrades to the
//! not-available marker or passes through unchanged.

use crate::record::{self, NOT_AVAILABLE};
use chrono::{Datelike, NaiveDate};
use serde_json::Value;

pub const CURRENCY_SYMBOL: &str = "₹";
// Longest first, so "Rs." is not left with a stray dot.
const CURRENCY_PREFIXES: [&str; 4] = [CURRENCY_SYMBOL, "INR", "Rs.", "Rs"];

/// Keys that may carry the URL of an image object, in priority order.
pub const IMAGE_URL_KEYS: [&str; 5] = ["url", "preview", "data", "src", "secure_url"];
const ACCEPTED_SCHEMES: [&str; 4] = ["data:", "blob:", "http://", "https://"];

// Legacy writes stored the postal address as an address object.
const LEGACY_ADDRESS_FIELD: &str = "postalAddress";
const FULL_ADDRESS_KEY: &str = "fullAddress";

const ONES: [&str; 20] = [
    "", "ONE", "TWO", "THREE", "FOUR", "FIVE", "SIX", "SEVEN", "EIGHT", "NINE", "TEN", "ELEVEN",
    "TWELVE", "THIRTEEN", "FOURTEEN", "FIFTEEN", "SIXTEEN", "SEVENTEEN", "EIGHTEEN", "NINETEEN",
];
const TENS: [&str; 10] = [
    "", "", "TWENTY", "THIRTY", "FORTY", "FIFTY", "SIXTY", "SEVENTY", "EIGHTY", "NINETY",
];

/// Dotted-path lookup with a fallback for absent or empty values.
pub fn lookup(record: &Value, path: &str, fallback: &str) -> String {
    let value = match record::get_path(record, path).filled() {
        Some(value) => value,
        None => return fallback.to_string(),
    };

    if path.rsplit('.').next() == Some(LEGACY_ADDRESS_FIELD)
        && let Value::Object(map) = value
    {
        return match map.get(FULL_ADDRESS_KEY).and_then(record::scalar_text) {
            Some(address) if !address.is_empty() => address,
            _ => fallback.to_string(),
        };
    }

    match record::scalar_text(value) {
        Some(text) if !text.is_empty() => text,
        _ => fallback.to_string(),
    }
}

/// Formats a date as `D/M/YYYY` using the literal components of the input.
///
/// Accepts `YYYY-MM-DD` or `YYYY/MM/DD`, optionally followed by a time part.
/// No time zone conversion is applied. Anything else is returned unchanged.
pub fn format_date(value: Option<&str>) -> String {
    let raw = match value.map(str::trim) {
        Some(raw) if !raw.is_empty() && raw != NOT_AVAILABLE => raw,
        _ => return NOT_AVAILABLE.to_string(),
    };

    let date_part = raw.split(['T', ' ']).next().unwrap_or(raw);
    let parsed = NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%Y/%m/%d"));

    match parsed {
        Ok(date) => format!("{}/{}/{:04}", date.day(), date.month(), date.year()),
        Err(_) => raw.to_string(),
    }
}

/// Converts an amount to uppercase words using lac/crore grouping.
///
/// The amount is rounded to the nearest integer first. Zero, negative and
/// non-finite amounts produce an empty string; see [`money_in_words`] for the
/// variant used on printed money values.
pub fn number_to_words(amount: f64) -> String {
    if !amount.is_finite() {
        return String::new();
    }
    let rounded = amount.round();
    if rounded <= 0.0 {
        return String::new();
    }
    integer_words(rounded as u64)
}

/// Words for a money value. Unlike [`number_to_words`], an explicit zero is
/// spelled out.
pub fn money_in_words(amount: f64) -> String {
    if amount.is_finite() && amount.round() == 0.0 {
        return "ZERO".to_string();
    }
    number_to_words(amount)
}

fn integer_words(n: u64) -> String {
    let mut parts: Vec<String> = Vec::new();

    let crore = n / 10_000_000;
    let rest = n % 10_000_000;
    if crore > 0 {
        parts.push(format!("{} CRORE", integer_words(crore)));
    }

    let lac = rest / 100_000;
    if lac > 0 {
        parts.push(format!("{} LAC", below_hundred(lac)));
    }

    let thousand = (rest % 100_000) / 1000;
    if thousand > 0 {
        parts.push(format!("{} THOUSAND", below_hundred(thousand)));
    }

    let remainder = rest % 1000;
    if remainder > 0 {
        parts.push(below_thousand(remainder));
    }

    parts.join(" ")
}

fn below_thousand(n: u64) -> String {
    let hundreds = n / 100;
    let rest = n % 100;
    match (hundreds, rest) {
        (0, _) => below_hundred(rest),
        (h, 0) => format!("{} HUNDRED", ONES[h as usize]),
        (h, r) => format!("{} HUNDRED {}", ONES[h as usize], below_hundred(r)),
    }
}

fn below_hundred(n: u64) -> String {
    if n < 20 {
        return ONES[n as usize].to_string();
    }
    let tens = TENS[(n / 10) as usize];
    match n % 10 {
        0 => tens.to_string(),
        unit => format!("{} {}", tens, ONES[unit as usize]),
    }
}

/// Parses a printed amount such as `"₹ 15,00,000/-"` or `"Rs. -250"` into a
/// number. Anything left over after the currency prefix, grouping commas,
/// spaces and the `/-` suffix are removed makes the amount unparseable.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    let mut text = compact.strip_suffix("/-").unwrap_or(&compact);

    let mut negative = false;
    if let Some(rest) = text.strip_prefix('-') {
        negative = true;
        text = rest;
    }
    text = strip_currency_prefix(text);
    if let Some(rest) = text.strip_prefix('-') {
        negative = true;
        text = rest;
    }

    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    let value: f64 = text.parse().ok()?;
    Some(if negative { -value } else { value })
}

fn strip_currency_prefix(text: &str) -> &str {
    for prefix in CURRENCY_PREFIXES {
        if let Some(head) = text.get(..prefix.len())
            && head.eq_ignore_ascii_case(prefix)
        {
            return &text[prefix.len()..];
        }
    }
    text
}

/// `percent` percent of `amount`, rounded half away from zero.
pub fn percent_of(amount: f64, percent: f64) -> f64 {
    (amount * percent / 100.0).round()
}

/// Groups digits the Indian way: `12,34,56,789`.
pub fn format_indian_number(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let sign = if n < 0 { "-" } else { "" };
    if digits.len() <= 3 {
        return format!("{sign}{digits}");
    }

    let (head, last_three) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut end = head.len();
    while end > 2 {
        groups.push(&head[end - 2..end]);
        end -= 2;
    }
    groups.push(&head[..end]);
    groups.reverse();

    format!("{sign}{},{last_three}", groups.join(","))
}

/// `"₹ 15,00,000/- (FIFTEEN LAC)"` for `percent` percent of `amount`.
pub fn format_currency_words(amount: &str, percent: f64) -> String {
    match parse_amount(amount) {
        Some(value) => currency_with_words(percent_of(value, percent)),
        None => NOT_AVAILABLE.to_string(),
    }
}

/// Figures and words for an already-computed amount.
pub fn currency_with_words(amount: f64) -> String {
    let rounded = amount.round();
    format!(
        "{} {}/- ({})",
        CURRENCY_SYMBOL,
        format_indian_number(rounded as i64),
        money_in_words(rounded)
    )
}

/// Full address text from an address object or a plain string.
pub fn extract_address(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Object(map) => map
            .get(FULL_ADDRESS_KEY)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// URL of an image reference, or `""` when it has no acceptable URL.
pub fn extract_image_url(candidate: &Value) -> String {
    let url = match candidate {
        Value::String(s) => s.trim(),
        Value::Object(map) => IMAGE_URL_KEYS
            .iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty())
            .unwrap_or(""),
        _ => "",
    };

    if is_valid_image_url(url) {
        url.to_string()
    } else {
        String::new()
    }
}

pub fn is_valid_image_url(url: &str) -> bool {
    ACCEPTED_SCHEMES.iter().any(|scheme| url.starts_with(scheme))
}

/// Rounds a loosely formatted amount to the nearest thousand.
///
/// Returns the not-available marker when the input has no digits, and the
/// raw input itself when it does not parse as an amount (for example
/// `"1.2.3"`).
pub fn round_to_nearest_1000(raw: Option<&str>) -> String {
    let raw = match raw.map(str::trim) {
        Some(raw) if !raw.is_empty() && raw != NOT_AVAILABLE => raw,
        _ => return NOT_AVAILABLE.to_string(),
    };

    match parse_amount(raw) {
        Some(value) => format!("{}", ((value / 1000.0).round() * 1000.0) as i64),
        None if !raw.chars().any(|c| c.is_ascii_digit()) => NOT_AVAILABLE.to_string(),
        None => raw.to_string(),
    }
}
