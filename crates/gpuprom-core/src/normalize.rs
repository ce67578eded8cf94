//! Normalization of vendor-formatted values into exposition-ready numbers.
//!
//! nvidia-smi reports most readings as human strings (`"250.00 W"`,
//! `"16 MiB"`, `"P2"`, `"Active"`). Every value rendered by
//! [`crate::exposition`] passes through exactly one [`ValueKind`].
//! All functions here are total: unparsable input maps to a documented
//! fallback instead of an error.

use std::sync::LazyLock;

use regex::Regex;

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.\d+)").expect("valid version regex"));

static QUANTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\d.]+) ([KMGT]?i?)(.*)").expect("valid quantity regex")
});

/// How a raw string is turned into a metric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// `"470.129.06"` → `"470.129"`.
    Version,
    /// `"<float> <prefix><unit>"` → plain number scaled by the prefix.
    Quantity,
    /// Keep only digits and dots (`"P2"` → `"2"`).
    Digits,
    /// `"Active"` → `"1"`, anything else → `"0"`.
    ActiveFlag,
    /// Passed through untouched.
    Raw,
}

impl ValueKind {
    pub fn apply(self, value: &str) -> String {
        match self {
            ValueKind::Version => normalize_version(value),
            ValueKind::Quantity => normalize_quantity(value),
            ValueKind::Digits => normalize_digits(value),
            ValueKind::ActiveFlag => normalize_active_flag(value).to_string(),
            ValueKind::Raw => value.to_string(),
        }
    }
}

/// Extracts the leading `<major>.<minor>` of a version string.
///
/// Returns `"0"` when no such pattern exists.
pub fn normalize_version(value: &str) -> String {
    VERSION_RE
        .captures(value)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| "0".to_string())
}

/// Parses `"<float> <prefix><unit>"` and applies the SI or binary prefix.
///
/// Decimal prefixes (K, M, G, T) scale by powers of 1000, binary ones
/// (Ki, Mi, Gi, Ti) by powers of 1024. Any other prefix leaves the number
/// unscaled. Returns `"0"` when the pattern or the number does not parse.
pub fn normalize_quantity(value: &str) -> String {
    let Some(caps) = QUANTITY_RE.captures(value) else {
        return "0".to_string();
    };
    let Ok(number) = caps[1].parse::<f64>() else {
        return "0".to_string();
    };
    (number * prefix_multiplier(&caps[2])).to_string()
}

fn prefix_multiplier(prefix: &str) -> f64 {
    match prefix {
        "K" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "Ki" => 1024.0,
        "Mi" => 1024.0 * 1024.0,
        "Gi" => 1024.0 * 1024.0 * 1024.0,
        "Ti" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    }
}

/// Drops every character that is not an ASCII digit or `.`.
///
/// The result may be empty; the formatter decides how to render that.
pub fn normalize_digits(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect()
}

/// `"1"` for the literal `"Active"`, `"0"` otherwise.
pub fn normalize_active_flag(value: &str) -> &'static str {
    if value == "Active" { "1" } else { "0" }
}
