//! Early warning as the total closes in on the next round target.
//!
//! Targets are the multiples of a fixed step. An alert fires when the distance
//! to the next target drops into the near band, and again when it drops into
//! the imminent band.

use std::fmt;

use thiserror::Error;

use crate::milestone::compact_label;
use crate::render::format_dollars;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TargetError {
    #[error("target step must be a positive number, got {0}")]
    Step(f64),
    #[error("alert margins must satisfy 0 < imminent ({imminent}) < near ({near}) < step")]
    Margins { near: f64, imminent: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proximity {
    Near,
    Imminent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetApproach {
    pub target: f64,
    pub remaining: f64,
    pub proximity: Proximity,
    /// The band that was entered.
    pub margin: f64,
}

impl fmt::Display for TargetApproach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} is less than {} away! {} to go.",
            compact_label(self.target),
            format_dollars(self.margin),
            format_dollars(self.remaining)
        )
    }
}

#[derive(Debug, Clone)]
pub struct TargetWatch {
    step: f64,
    near: f64,
    imminent: f64,
    last_total: Option<f64>,
}

impl TargetWatch {
    pub fn new(step: f64, near: f64, imminent: f64) -> Result<Self, TargetError> {
        if !step.is_finite() || step <= 0.0 {
            return Err(TargetError::Step(step));
        }
        if !(imminent > 0.0 && imminent < near && near < step) {
            return Err(TargetError::Margins { near, imminent });
        }
        Ok(Self {
            step,
            near,
            imminent,
            last_total: None,
        })
    }

    /// The highest target at or below `total`.
    pub fn previous_target(&self, total: f64) -> f64 {
        (total / self.step).floor() * self.step
    }

    /// The lowest target strictly above `total`.
    pub fn next_target(&self, total: f64) -> f64 {
        self.previous_target(total) + self.step
    }

    /// Records `total` and reports a band entered since the last observation.
    /// The first observation only sets the baseline.
    pub fn observe(&mut self, total: f64) -> Option<TargetApproach> {
        let target = self.next_target(total);
        let remaining = target - total;
        let previous = self.last_total.replace(total)?;
        let previous_remaining = self.next_target(previous) - previous;

        let (proximity, margin) =
            if previous_remaining > self.imminent && remaining <= self.imminent {
                (Proximity::Imminent, self.imminent)
            } else if previous_remaining > self.near && remaining <= self.near {
                (Proximity::Near, self.near)
            } else {
                return None;
            };
        Some(TargetApproach {
            target,
            remaining,
            proximity,
            margin,
        })
    }
}
