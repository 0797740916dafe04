//! Field-level parsing rules
//!
//! Each rule takes one raw JSON value and returns the normalized value or a
//! message describing why it was rejected. Rules know nothing about whether a
//! field is required; the validator decides what a rejection means.
//!
//! CSV cells arrive as strings, so every rule accepts the string spelling of its
//! type as well as the native JSON type.

use crate::types::catalog::{DateLabel, Price, ScheduleDate, Vocabulary};
use chrono::{DateTime, NaiveDate};
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::LazyLock;

pub type RuleResult<T> = Result<T, String>;

static DURATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    const UNIT: &str = r"(hours?|hrs?|minutes?|mins?|days?|weeks?|months?)";
    [
        format!(r"(?i)^\d+\s*{}$", UNIT),
        format!(r"(?i)^\d+\s*-\s*\d+\s*{}$", UNIT),
        r"(?i)^(half|full)\s+day$".to_string(),
        format!(r"(?i)^\d+\s*/\s*\d+\s*{}$", UNIT),
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("duration pattern is valid"))
    .collect()
});

static TIME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^\d{1,2}:\d{2}\s*(am|pm)?\s*(-\s*\d{1,2}:\d{2}\s*(am|pm)?)?",
        r"(?i)^\d{1,2}\s*(am|pm)\s*(-\s*\d{1,2}\s*(am|pm)?)?",
        r"^.+\s+(IST|EST|PST|UTC|GMT|CST|MST|CET|CEST|JST|AEST|AEDT)$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("time pattern is valid"))
    .collect()
});

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
];

const CURRENCY_SYMBOLS: [char; 5] = ['₹', '$', '€', '£', '¥'];

/// Whether a value counts as "not supplied"
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Free text with a maximum length in characters
pub fn text(value: &Value, max_len: usize) -> RuleResult<String> {
    let text = scalar_text(value).ok_or_else(|| "must be text".to_string())?;
    if text.is_empty() {
        return Err("must not be empty".to_string());
    }
    let len = text.chars().count();
    if len > max_len {
        return Err(format!("must be at most {} characters (got {})", max_len, len));
    }
    Ok(text)
}

/// Identifier that may be written as a string or a number
pub fn identifier(value: &Value) -> RuleResult<String> {
    match scalar_text(value) {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err("must be a non-empty identifier".to_string()),
    }
}

pub fn choice<V: Vocabulary>(value: &Value) -> RuleResult<V> {
    let raw = scalar_text(value).ok_or_else(|| format!("must be one of: {}", V::allowed()))?;
    V::parse_label(&raw)
        .ok_or_else(|| format!("invalid value '{}' (expected one of: {})", raw, V::allowed()))
}

/// A list given as a JSON array, a JSON array encoded in a string or a
/// `;`-separated string
///
/// Entries are trimmed, empty entries are dropped and order is preserved.
pub fn list(value: &Value) -> RuleResult<Vec<String>> {
    let items = match value {
        Value::Array(items) => items
            .iter()
            .map(|item| scalar_text(item).ok_or_else(|| "list entries must be text".to_string()))
            .collect::<RuleResult<Vec<_>>>()?,
        Value::String(s) if s.trim_start().starts_with('[') => {
            let parsed: Value =
                serde_json::from_str(s).map_err(|e| format!("invalid list: {}", e))?;
            return list(&parsed);
        }
        Value::String(s) => s.split(';').map(|item| item.trim().to_string()).collect(),
        _ => return Err("must be a list".to_string()),
    };

    Ok(items.into_iter().filter(|item| !item.is_empty()).collect())
}

/// A list whose length must fall within `min..=max`
pub fn bounded_list(value: &Value, min: usize, max: usize) -> RuleResult<Vec<String>> {
    let items = list(value)?;
    if items.len() < min || items.len() > max {
        return Err(format!(
            "must contain between {} and {} entries (got {})",
            min,
            max,
            items.len()
        ));
    }
    Ok(items)
}

pub fn choice_list<V: Vocabulary>(value: &Value, min: usize, max: usize) -> RuleResult<Vec<V>> {
    let labels = bounded_list(value, min, max)?;
    labels
        .iter()
        .map(|label| {
            V::parse_label(label).ok_or_else(|| {
                format!("invalid value '{}' (expected one of: {})", label, V::allowed())
            })
        })
        .collect()
}

/// "Free" or a currency amount, converted to minor units
///
/// Accepts a leading currency symbol, thousands separators and at most two decimal
/// places. For a range such as "$99 - $199" the lower bound is stored.
pub fn price(value: &Value) -> RuleResult<Price> {
    let display = scalar_text(value).ok_or_else(|| "must be \"Free\" or an amount".to_string())?;
    if display.eq_ignore_ascii_case("free") {
        return Ok(Price {
            display: "Free".to_string(),
            minor_units: 0,
        });
    }

    let cleaned: String = display
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.starts_with('-') {
        return Err(format!("price '{}' must not be negative", display));
    }
    let lower = cleaned
        .split(['-', '/'])
        .next()
        .unwrap_or_default()
        .trim_start_matches(CURRENCY_SYMBOLS);

    let amount = Decimal::from_str(lower).map_err(|_| {
        format!(
            "price '{}' must be \"Free\" or a valid amount (e.g. ₹5000, $99)",
            display
        )
    })?;
    if amount.is_sign_negative() {
        return Err(format!("price '{}' must not be negative", display));
    }
    if amount.scale() > 2 {
        return Err(format!("price '{}' has more than two decimal places", display));
    }

    let minor_units = (amount * Decimal::ONE_HUNDRED)
        .to_i64()
        .ok_or_else(|| format!("price '{}' is too large", display))?;

    Ok(Price {
        display,
        minor_units,
    })
}

/// A calendar date in one of the accepted spellings, or an RFC 3339 timestamp
pub fn date(value: &Value) -> RuleResult<NaiveDate> {
    let raw = scalar_text(value).ok_or_else(|| "must be a date".to_string())?;
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&raw, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(&raw).ok().map(|dt| dt.date_naive()))
        .ok_or_else(|| format!("invalid date '{}' (expected YYYY-MM-DD)", raw))
}

/// A date or one of the placeholders Flexible, Coming Soon, TBD
pub fn schedule_date(value: &Value) -> RuleResult<ScheduleDate> {
    if let Some(label) = scalar_text(value).and_then(|raw| DateLabel::parse_label(&raw)) {
        return Ok(ScheduleDate::Label(label));
    }
    date(value).map(ScheduleDate::Date).map_err(|_| {
        format!(
            "invalid date '{}' (expected YYYY-MM-DD or one of: {})",
            scalar_text(value).unwrap_or_default(),
            DateLabel::allowed()
        )
    })
}

/// Durations like "2 hours", "3-6 months", "Full day"
pub fn duration(value: &Value) -> RuleResult<String> {
    let raw = scalar_text(value).ok_or_else(|| "must be a duration".to_string())?;
    if DURATION_PATTERNS.iter().any(|pattern| pattern.is_match(&raw)) {
        Ok(raw)
    } else {
        Err(format!(
            "invalid duration '{}' (e.g. \"2 hours\", \"4 weeks\", \"3-6 months\", \"Full day\")",
            raw
        ))
    }
}

/// Times like "6:00 PM IST" or "3 PM - 5 PM"
pub fn time(value: &Value) -> RuleResult<String> {
    let raw = scalar_text(value).ok_or_else(|| "must be a time".to_string())?;
    if TIME_PATTERNS.iter().any(|pattern| pattern.is_match(&raw)) {
        Ok(raw)
    } else {
        Err(format!("invalid time '{}' (e.g. \"6:00 PM IST\", \"3 PM - 5 PM\")", raw))
    }
}

/// Email address, lowercased
pub fn email(value: &Value) -> RuleResult<String> {
    let raw = scalar_text(value).ok_or_else(|| "must be an email address".to_string())?;
    let email = raw.to_lowercase();
    if EMAIL_PATTERN.is_match(&email) {
        Ok(email)
    } else {
        Err(format!("invalid email address '{}'", raw))
    }
}

pub fn boolean(value: &Value) -> RuleResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) if n.as_i64() == Some(1) => Ok(true),
        Value::Number(n) if n.as_i64() == Some(0) => Ok(false),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Ok(true),
            "false" | "no" | "n" | "0" => Ok(false),
            _ => Err(format!("invalid boolean '{}'", s.trim())),
        },
        other => Err(format!("invalid boolean '{}'", other)),
    }
}

pub fn integer(value: &Value) -> RuleResult<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("invalid whole number '{}'", n)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("invalid whole number '{}'", s.trim())),
        other => Err(format!("invalid whole number '{}'", other)),
    }
}

pub fn non_negative(value: &Value) -> RuleResult<i64> {
    let n = integer(value)?;
    if n < 0 {
        return Err(format!("must not be negative (got {})", n));
    }
    Ok(n)
}

pub fn positive(value: &Value) -> RuleResult<i64> {
    let n = integer(value)?;
    if n <= 0 {
        return Err(format!("must be greater than zero (got {})", n));
    }
    Ok(n)
}

/// A JSON object, or a string holding one (CSV cells)
pub fn object(value: &Value) -> RuleResult<Value> {
    match value {
        Value::Object(_) => Ok(value.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ Value::Object(_)) => Ok(parsed),
            _ => Err("must be a JSON object".to_string()),
        },
        _ => Err("must be a JSON object".to_string()),
    }
}

/// A JSON array, or a string holding one (CSV cells)
pub fn array(value: &Value) -> RuleResult<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => Ok(items),
            _ => Err("must be a JSON array".to_string()),
        },
        _ => Err("must be a JSON array".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::catalog::DeliveryMode;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::free(json!("free"), "Free", 0)]
    #[case::rupees(json!("₹5,000"), "₹5,000", 500_000)]
    #[case::dollars_cents(json!("$99.99"), "$99.99", 9_999)]
    #[case::plain_number(json!(250), "250", 25_000)]
    #[case::range_lower_bound(json!("$99 - $199"), "$99 - $199", 9_900)]
    fn test_price_valid(#[case] input: Value, #[case] display: &str, #[case] minor: i64) {
        let parsed = price(&input).unwrap();
        assert_eq!(parsed.display, display);
        assert_eq!(parsed.minor_units, minor);
    }

    #[rstest]
    #[case::negative(json!("-5"), "negative")]
    #[case::three_decimals(json!("$1.999"), "two decimal places")]
    #[case::garbage(json!("cheap"), "valid amount")]
    fn test_price_invalid(#[case] input: Value, #[case] expected: &str) {
        let err = price(&input).unwrap_err();
        assert!(err.contains(expected), "{}", err);
    }

    #[rstest]
    #[case("2025-03-15")]
    #[case("2025/03/15")]
    #[case("15/03/2025")]
    #[case("March 15, 2025")]
    #[case("Mar 15, 2025")]
    #[case("2025-03-15T10:00:00Z")]
    fn test_date_formats(#[case] input: &str) {
        assert_eq!(
            date(&json!(input)).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()
        );
    }

    #[test]
    fn test_schedule_date_placeholders() {
        assert_eq!(
            schedule_date(&json!("coming soon")).unwrap(),
            ScheduleDate::Label(DateLabel::ComingSoon)
        );
        assert!(schedule_date(&json!("next spring")).is_err());
    }

    #[rstest]
    #[case("6 weeks", true)]
    #[case("3-6 months", true)]
    #[case("Full day", true)]
    #[case("2 hrs", true)]
    #[case("a while", false)]
    fn test_duration(#[case] input: &str, #[case] ok: bool) {
        assert_eq!(duration(&json!(input)).is_ok(), ok);
    }

    #[rstest]
    #[case("6:00 PM IST", true)]
    #[case("3 PM - 5 PM", true)]
    #[case("evening", false)]
    fn test_time(#[case] input: &str, #[case] ok: bool) {
        assert_eq!(time(&json!(input)).is_ok(), ok);
    }

    #[rstest]
    #[case(json!("a; b ;;c"), vec!["a", "b", "c"])]
    #[case(json!(["x", " y "]), vec!["x", "y"])]
    #[case(json!(r#"["one","two"]"#), vec!["one", "two"])]
    fn test_list_shapes(#[case] input: Value, #[case] expected: Vec<&str>) {
        assert_eq!(list(&input).unwrap(), expected);
    }

    #[test]
    fn test_choice_reports_allowed_values() {
        let err = choice::<DeliveryMode>(&json!("Remote")).unwrap_err();
        assert_eq!(
            err,
            "invalid value 'Remote' (expected one of: Online, Offline, Hybrid)"
        );
    }

    #[rstest]
    #[case(json!("TRUE"), Ok(true))]
    #[case(json!("no"), Ok(false))]
    #[case(json!(1), Ok(true))]
    #[case(json!("maybe"), Err("invalid boolean 'maybe'".to_string()))]
    fn test_boolean(#[case] input: Value, #[case] expected: RuleResult<bool>) {
        assert_eq!(boolean(&input), expected);
    }

    #[test]
    fn test_email_is_lowercased() {
        assert_eq!(email(&json!(" Student@Example.COM ")).unwrap(), "student@example.com");
        assert!(email(&json!("not-an-email")).is_err());
    }

    #[test]
    fn test_text_length_limit() {
        assert!(text(&json!("x".repeat(200)), 200).is_ok());
        assert!(text(&json!("x".repeat(201)), 200)
            .unwrap_err()
            .contains("at most 200"));
    }

    #[test]
    fn test_object_from_csv_string() {
        let parsed = object(&json!(r#"{"name": "Dr. Rao"}"#)).unwrap();
        assert_eq!(parsed, json!({"name": "Dr. Rao"}));
        assert!(object(&json!("Dr. Rao")).is_err());
    }
}
