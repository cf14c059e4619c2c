// src/normalize.rs
//
// Pure normalization of the extraction service's answer: no I/O here,
// so the currency heuristics stay independently testable.

use regex::Regex;
use serde::Deserialize;
use tracing::warn;

/// Value used when a field could not be extracted.
const NOT_AVAILABLE: &str = "N/A";

/// Value used when the service's answer could not be parsed at all.
const PARSE_ERROR: &str = "parse-error";

/// The normalized shape derived from one document's raw service output.
///
/// At most one of `usd_amount` / `jpy_amount` is ever set; a single
/// receipt never yields both currencies.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub purpose: String,
    pub date: String,
    pub usd_amount: Option<f64>,
    pub jpy_amount: Option<i64>,
}

impl CanonicalRecord {
    fn parse_error() -> Self {
        CanonicalRecord {
            purpose: PARSE_ERROR.to_string(),
            date: PARSE_ERROR.to_string(),
            usd_amount: None,
            jpy_amount: None,
        }
    }

    /// Whether the purpose is usable as a new filename.
    pub fn has_meaningful_purpose(&self) -> bool {
        !self.purpose.is_empty()
            && self.purpose != NOT_AVAILABLE
            && self.purpose != PARSE_ERROR
    }
}

/// The three nullable fields the response schema asks the service for.
#[derive(Debug, Deserialize)]
struct ExtractedFields {
    purpose: Option<String>,
    date: Option<String>,
    amount_str: Option<String>,
}

/// Result of normalizing a raw amount string.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAmount {
    pub usd: Option<f64>,
    pub jpy: Option<i64>,
    /// No currency marker was present; USD was assumed.
    pub assumed_usd: bool,
    /// Set when no numeric value could be recovered. Appended to the
    /// purpose field so the raw value survives for manual review.
    pub diagnostic: Option<String>,
}

impl ParsedAmount {
    fn unset() -> Self {
        ParsedAmount {
            usd: None,
            jpy: None,
            assumed_usd: false,
            diagnostic: None,
        }
    }
}

/// Parse the JSON text returned by the extraction client into a
/// `CanonicalRecord`.
///
/// Never fails: one document's unreadable answer must not stop the
/// batch, so malformed input resolves to a "parse-error" record.
pub fn parse_extraction(text: &str) -> CanonicalRecord {
    let trimmed = text.trim();
    if !trimmed.starts_with('{') || !trimmed.ends_with('}') {
        warn!(excerpt = %excerpt(trimmed, 100), "Extraction text is not a JSON object");
        return CanonicalRecord::parse_error();
    }

    let fields: ExtractedFields = match serde_json::from_str(trimmed) {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "Failed to parse extraction JSON");
            return CanonicalRecord::parse_error();
        }
    };

    let mut purpose = fields
        .purpose
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());
    let date = fields
        .date
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    let mut usd_amount = None;
    let mut jpy_amount = None;

    match fields.amount_str {
        Some(raw) if !raw.is_empty() => {
            let parsed = parse_amount(&raw);
            usd_amount = parsed.usd;
            jpy_amount = parsed.jpy;
            if let Some(diag) = parsed.diagnostic {
                purpose.push_str(&diag);
            }
        }
        // Legitimately no amount may be extractable; not an error.
        _ => {}
    }

    CanonicalRecord {
        purpose,
        date,
        usd_amount,
        jpy_amount,
    }
}

/// Normalize a raw amount string into exactly one currency, or record a
/// diagnostic when no numeric value can be recovered.
///
/// Ordered heuristics, first match wins: `$` marker → USD, `¥`/`円`
/// marker → integer JPY (never fractional), no marker → generic numeric
/// assumed to be USD.
pub fn parse_amount(raw: &str) -> ParsedAmount {
    let cleaned = raw.replace(',', "");
    let mut result = ParsedAmount::unset();

    if cleaned.contains('$') {
        let re = Regex::new(r"(\d*\.?\d+)").unwrap();
        match re.captures(&cleaned).and_then(|c| c[1].parse::<f64>().ok()) {
            Some(v) => result.usd = Some(v),
            None => result.diagnostic = Some(diagnostic_suffix(raw)),
        }
    } else if cleaned.contains('¥') || cleaned.contains('円') {
        let re = Regex::new(r"(\d+)").unwrap();
        match re.captures(&cleaned).and_then(|c| c[1].parse::<i64>().ok()) {
            Some(v) => result.jpy = Some(v),
            None => result.diagnostic = Some(diagnostic_suffix(raw)),
        }
    } else {
        let re = Regex::new(r"(\d*\.?\d+)").unwrap();
        match re.captures(&cleaned).and_then(|c| c[1].parse::<f64>().ok()) {
            Some(v) => {
                warn!(raw = %raw, amount = v, "No currency marker, assuming USD");
                result.usd = Some(v);
                result.assumed_usd = true;
            }
            None => {
                warn!(raw = %raw, "Could not parse amount");
                result.diagnostic = Some(diagnostic_suffix(raw));
            }
        }
    }

    result
}

fn diagnostic_suffix(raw: &str) -> String {
    format!(" (amount format unknown: {raw})")
}

/// Char-safe excerpt of `text`, at most `max_chars` characters.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usd_with_symbol() {
        let parsed = parse_amount("$20.00");
        assert_eq!(parsed.usd, Some(20.00));
        assert_eq!(parsed.jpy, None);
        assert!(!parsed.assumed_usd);
        assert!(parsed.diagnostic.is_none());
    }

    #[test]
    fn test_usd_with_thousands_separator() {
        let parsed = parse_amount("$1,234.50");
        assert_eq!(parsed.usd, Some(1234.50));
        assert_eq!(parsed.jpy, None);
    }

    #[test]
    fn test_jpy_with_yen_sign() {
        let parsed = parse_amount("¥3,000");
        assert_eq!(parsed.jpy, Some(3000));
        assert_eq!(parsed.usd, None);
    }

    #[test]
    fn test_jpy_with_kanji_suffix() {
        let parsed = parse_amount("3000円");
        assert_eq!(parsed.jpy, Some(3000));
        assert_eq!(parsed.usd, None);
    }

    #[test]
    fn test_bare_number_assumed_usd() {
        let parsed = parse_amount("45.50");
        assert_eq!(parsed.usd, Some(45.50));
        assert!(parsed.assumed_usd);
        assert!(parsed.diagnostic.is_none());
    }

    #[test]
    fn test_unparseable_amount_records_diagnostic() {
        for raw in ["N/A", "", "free of charge"] {
            let parsed = parse_amount(raw);
            assert_eq!(parsed.usd, None, "raw: {raw}");
            assert_eq!(parsed.jpy, None, "raw: {raw}");
            assert_eq!(
                parsed.diagnostic,
                Some(format!(" (amount format unknown: {raw})"))
            );
        }
    }

    #[test]
    fn test_currency_exclusivity() {
        // A dollar marker wins even when yen text appears later
        for raw in ["$20.00", "¥3000", "3000円", "12.34", "$5 (約700円)"] {
            let parsed = parse_amount(raw);
            assert!(
                !(parsed.usd.is_some() && parsed.jpy.is_some()),
                "both currencies set for {raw}"
            );
        }
    }

    #[test]
    fn test_parse_extraction_full_record() {
        let record = parse_extraction(
            r#"{"purpose": "Claude Pro", "date": "2025-04-01", "amount_str": "$20.00"}"#,
        );
        assert_eq!(record.purpose, "Claude Pro");
        assert_eq!(record.date, "2025-04-01");
        assert_eq!(record.usd_amount, Some(20.00));
        assert_eq!(record.jpy_amount, None);
        assert!(record.has_meaningful_purpose());
    }

    #[test]
    fn test_parse_extraction_null_fields_default() {
        let record =
            parse_extraction(r#"{"purpose": null, "date": null, "amount_str": null}"#);
        assert_eq!(record.purpose, "N/A");
        assert_eq!(record.date, "N/A");
        assert_eq!(record.usd_amount, None);
        assert_eq!(record.jpy_amount, None);
        assert!(!record.has_meaningful_purpose());
    }

    #[test]
    fn test_parse_extraction_missing_amount_is_not_an_error() {
        let record = parse_extraction(r#"{"purpose": "Posit", "date": "2025-03-15"}"#);
        assert_eq!(record.purpose, "Posit");
        assert_eq!(record.usd_amount, None);
        assert_eq!(record.jpy_amount, None);
    }

    #[test]
    fn test_parse_extraction_empty_amount_is_treated_as_absent() {
        // An empty amount string means "nothing extractable", same as
        // null: no diagnostic, no assumed currency.
        let record = parse_extraction(
            r#"{"purpose": "Posit", "date": "2025-03-15", "amount_str": ""}"#,
        );
        assert_eq!(record.purpose, "Posit");
        assert_eq!(record.usd_amount, None);
        assert_eq!(record.jpy_amount, None);
    }

    #[test]
    fn test_parse_extraction_bad_amount_appends_diagnostic() {
        let record = parse_extraction(
            r#"{"purpose": "OpenAI API", "date": "2025-02-01", "amount_str": "unknown"}"#,
        );
        assert_eq!(record.purpose, "OpenAI API (amount format unknown: unknown)");
        assert_eq!(record.usd_amount, None);
        assert_eq!(record.jpy_amount, None);
    }

    #[test]
    fn test_parse_extraction_garbage_never_panics() {
        for bad in ["", "not json", "[1, 2, 3]", "{broken", "{\"purpose\": }"] {
            let record = parse_extraction(bad);
            assert_eq!(record.purpose, "parse-error", "input: {bad}");
            assert_eq!(record.date, "parse-error");
            assert_eq!(record.usd_amount, None);
            assert_eq!(record.jpy_amount, None);
        }
    }

    #[test]
    fn test_excerpt_char_safe() {
        assert_eq!(excerpt("領収書データ", 3), "領収書");
        assert_eq!(excerpt("short", 500), "short");
    }
}
