// Utility helpers for parsing and formatting.
//
// This module centralizes the "dirty" cell handling (JSON values, CSV
// strings, flags, dates) so the rule engine can assume clean, typed values.
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use num_format::{Locale, ToFormattedString};
use serde_json::Value;
use std::io::BufRead;

pub const FLAG_YES: &str = "SIM";
pub const FLAG_NO: &str = "NÃO";

const TRUTHY: [&str; 5] = ["TRUE", "SIM", "1", "S", "YES"];
const FALSY: [&str; 11] = [
    "FALSE", "NÃO", "NAO", "0", "N", "NO", "", "NONE", "NAN", "NULL", "NAT",
];

/// How a numeric cell turns into a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericRule {
    NonZero,
    Positive,
}

impl NumericRule {
    fn holds(self, n: f64) -> bool {
        if !n.is_finite() {
            return false;
        }
        match self {
            NumericRule::NonZero => n != 0.0,
            NumericRule::Positive => n > 0.0,
        }
    }
}

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues that are common in spreadsheet exports.
///
/// - Trims whitespace.
/// - Rejects values that contain alphabetic characters.
/// - Reads both `1.234,5` (pt-BR) and `1,234.5`: when both separators
///   appear the last one is the decimal mark. A lone `,` is a decimal comma;
///   `.` groups of three digits (`1.500`) are thousands.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    normalize_decimal(s).parse::<f64>().ok().filter(|v| v.is_finite())
}

fn normalize_decimal(s: &str) -> String {
    match (s.rfind(','), s.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (Some(_), None) if is_grouped(s, ',') && s.matches(',').count() > 1 => s.replace(',', ""),
        (Some(_), None) => s.replace(',', "."),
        (None, Some(_)) if is_grouped(s, '.') => s.replace('.', ""),
        _ => s.to_string(),
    }
}

/// `1.500`, `12.345.678`: a 1-3 digit head followed by 3-digit groups.
fn is_grouped(s: &str, sep: char) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let mut parts = digits.split(sep);
    let head_ok = parts
        .next()
        .map(|h| (1..=3).contains(&h.len()) && h.bytes().all(|b| b.is_ascii_digit()) && !h.starts_with('0'))
        .unwrap_or(false);
    head_ok && parts.all(|p| p.len() == 3 && p.bytes().all(|b| b.is_ascii_digit()))
}

/// Numeric view of a cell; `None` when the cell is missing or not a number.
pub fn value_f64(v: Option<&Value>) -> Option<f64> {
    match v? {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_f64_safe(Some(s)),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Text view of a cell. Integral floats lose their `.0` so codes read the
/// same whether they came from JSON numbers or spreadsheet text.
pub fn value_text(v: Option<&Value>) -> Option<String> {
    let text = match v? {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    };
    let upper = text.to_uppercase();
    if text.is_empty() || upper == "NAN" || upper == "NONE" || upper == "NULL" {
        return None;
    }
    Some(strip_float_suffix(&text).to_string())
}

/// Drop a trailing `.0` left behind by spreadsheet float columns.
pub fn strip_float_suffix(s: &str) -> &str {
    s.trim().strip_suffix(".0").unwrap_or(s.trim()).trim()
}

/// Collapse the many raw encodings of a yes/no column into a boolean.
///
/// Applying this to its own rendered output (`SIM`/`NÃO`) yields the same
/// value, so normalizing twice is harmless.
pub fn coerce_flag(v: Option<&Value>, rule: NumericRule) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| rule.holds(f)).unwrap_or(false),
        Some(Value::String(s)) => text_flag(s, rule),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

fn text_flag(s: &str, rule: NumericRule) -> bool {
    let upper = s.trim().to_uppercase();
    if TRUTHY.contains(&upper.as_str()) {
        return true;
    }
    if FALSY.contains(&upper.as_str()) {
        return false;
    }
    match parse_f64_safe(Some(&upper)) {
        Some(n) => rule.holds(n),
        None => false,
    }
}

pub fn flag_label(b: bool) -> &'static str {
    if b {
        FLAG_YES
    } else {
        FLAG_NO
    }
}

/// Parse an opening timestamp, keeping any offset the source carries and
/// reading naive values in `local`.
pub fn parse_timestamp(s: &str, local: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    const NAIVE: [&str; 10] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
        "%d-%m-%Y %H:%M:%S",
        "%d-%m-%Y %H:%M",
    ];
    let naive = NAIVE
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            ["%Y-%m-%d", "%d/%m/%Y"]
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    local.from_local_datetime(&naive).single()
}

/// `HH:MM:SS` with unbounded hours; negative spans render as zero.
pub fn format_hhmmss(seconds: i64) -> String {
    let val = seconds.max(0);
    let (m, s) = (val / 60, val % 60);
    let (h, m) = (m / 60, m % 60);
    format!("{:02}:{:02}:{:02}", h, m, s)
}

/// Whole-number share of `part` in `total`, `0%` when there is nothing to
/// divide by.
pub fn percent(part: usize, total: usize) -> String {
    if total == 0 {
        return "0%".to_string();
    }
    format!("{:.0}%", part as f64 / total as f64 * 100.0)
}

/// One trimmed line of input; `None` once the input is closed or unreadable.
pub fn read_line_from<R: BufRead>(input: &mut R) -> Option<String> {
    let mut buf = String::new();
    match input.read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Counts in console messages (e.g., `1,234 ocorrências`).
    n.to_formatted_string(&Locale::en)
}
