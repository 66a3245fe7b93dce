//! Checking donation totals claimed by participants against the live total.

use std::sync::OnceLock;

use regex::Regex;

static AMOUNT_PATTERN: OnceLock<Regex> = OnceLock::new();

fn amount_pattern() -> &'static Regex {
    AMOUNT_PATTERN.get_or_init(|| {
        Regex::new(r"^\$?((?:\d{1,3},?){1,3}(?:\.\d+)?)(?: ?([MKmk]))?")
            .expect("amount pattern is valid")
    })
}

/// Parses the amount at the start of `text`: `$1,234.50`, `250k`, `$1.5 M`.
pub fn parse_claim(text: &str) -> Option<f64> {
    let captures = amount_pattern().captures(text.trim())?;
    let digits = captures.get(1)?.as_str().replace(',', "");
    let mut amount: f64 = digits.parse().ok()?;
    if let Some(suffix) = captures.get(2) {
        amount *= match suffix.as_str() {
            "m" | "M" => 1_000_000.0,
            _ => 1_000.0,
        };
    }
    Some(amount)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClaimVerdict {
    /// The live total already reached the claim.
    Reached,
    Overstated { claimed: f64, actual: f64 },
}

/// Compares whole dollars so rounding in the claim never counts against it.
pub fn judge_claim(claimed: f64, actual: f64) -> ClaimVerdict {
    if actual.trunc() >= claimed.trunc() {
        ClaimVerdict::Reached
    } else {
        ClaimVerdict::Overstated { claimed, actual }
    }
}
