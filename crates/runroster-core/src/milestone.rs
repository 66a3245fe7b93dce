//! Donation milestones.
//!
//! The tracker consumes an ascending threshold ladder and a stream of totals.
//! Because thresholds are ascending and a threshold counts as crossed once the
//! total reaches it, the crossed set is always a prefix of the ladder; the
//! tracker stores only the length of that prefix.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ThresholdError {
    #[error("threshold {0} is not a finite number")]
    NotFinite(f64),
    #[error("thresholds must be strictly ascending ({previous} is followed by {next})")]
    NotAscending { previous: f64, next: f64 },
}

/// A threshold the total reached for the first time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdCrossed {
    pub threshold: f64,
    /// Total observed when the crossing was detected.
    pub total: f64,
}

impl ThresholdCrossed {
    pub fn label(&self) -> String {
        compact_label(self.threshold)
    }
}

impl fmt::Display for ThresholdCrossed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[derive(Debug, Clone)]
pub struct MilestoneTracker {
    thresholds: Vec<f64>,
    crossed: usize,
    initialized: bool,
    last_total: Option<f64>,
}

impl MilestoneTracker {
    pub fn new(thresholds: Vec<f64>) -> Result<Self, ThresholdError> {
        for pair in thresholds.windows(2) {
            if pair[1] <= pair[0] {
                return Err(ThresholdError::NotAscending {
                    previous: pair[0],
                    next: pair[1],
                });
            }
        }
        if let Some(bad) = thresholds.iter().find(|value| !value.is_finite()) {
            return Err(ThresholdError::NotFinite(*bad));
        }
        Ok(Self {
            thresholds,
            crossed: 0,
            initialized: false,
            last_total: None,
        })
    }

    /// Records `total` and returns newly crossed thresholds, lowest first.
    ///
    /// The first observation only establishes the baseline: thresholds already
    /// below it are marked crossed without being announced.
    pub fn observe(&mut self, total: f64) -> Vec<ThresholdCrossed> {
        let reached = self.thresholds[self.crossed..]
            .iter()
            .take_while(|threshold| total >= **threshold)
            .count();
        let newly = &self.thresholds[self.crossed..self.crossed + reached];

        let events = if self.initialized {
            newly
                .iter()
                .map(|threshold| ThresholdCrossed {
                    threshold: *threshold,
                    total,
                })
                .collect()
        } else {
            Vec::new()
        };

        self.crossed += reached;
        self.initialized = true;
        self.last_total = Some(total);
        events
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn last_total(&self) -> Option<f64> {
        self.last_total
    }

    pub fn crossed(&self) -> &[f64] {
        &self.thresholds[..self.crossed]
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    /// The lowest threshold not yet crossed.
    pub fn next_threshold(&self) -> Option<f64> {
        self.thresholds.get(self.crossed).copied()
    }
}

/// The stock ladder: fine-grained at low totals, coarser as the total grows.
pub fn default_thresholds() -> Vec<f64> {
    const LADDER: &[(u64, u64, u64)] = &[
        (5_000, 50_000, 5_000),
        (50_000, 100_000, 10_000),
        (100_000, 300_000, 20_000),
        (300_000, 700_000, 10_000),
        (700_000, 1_000_000, 20_000),
        (1_000_000, 1_800_000, 25_000),
        (1_800_000, 10_000_000, 50_000),
    ];

    LADDER
        .iter()
        .flat_map(|&(start, end, step)| (start..end).step_by(step as usize))
        .map(|value| value as f64)
        .collect()
}

/// Short form of a round dollar amount: `5K`, `1.25M`.
///
/// Amounts that do not fit the thousands/millions scheme fall back to `$1,234`.
pub fn compact_label(value: f64) -> String {
    let whole = value.round() as u64;
    if (1_000..1_000_000).contains(&whole) && whole % 1_000 == 0 {
        return format!("{}K", whole / 1_000);
    }
    if (1_000_000..1_000_000_000).contains(&whole) && whole % 1_000 == 0 {
        let millions = whole / 1_000_000;
        let thousands = (whole % 1_000_000) / 1_000;
        if thousands == 0 {
            return format!("{millions}M");
        }
        let decimals = format!("{thousands:03}");
        return format!("{millions}.{}M", decimals.trim_end_matches('0'));
    }
    format!("${}", group_thousands(whole))
}

pub(crate) fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
