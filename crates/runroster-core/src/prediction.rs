//! The donation prediction game.
//!
//! Participants guess the final total. Each guess is out once the total passes
//! its ceiling, which defaults to halfway between it and the next higher guess.
//! Whenever guesses drop out, the closest guess still standing is named.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::render::format_dollars;
use crate::tie::{ParticipantId, join_names};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub participant: ParticipantId,
    pub amount: f64,
    /// Total above which the guess is out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ceiling: Option<f64>,
}

impl Prediction {
    pub fn new(participant: impl Into<ParticipantId>, amount: f64) -> Self {
        Self {
            participant: participant.into(),
            amount,
            ceiling: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictionError {
    #[error("prediction by {participant} has a non-finite amount or ceiling")]
    NotFinite { participant: ParticipantId },
}

/// One or more guesses were knocked out by the latest total.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionSurpassed {
    /// Lowest guess first.
    pub surpassed: Vec<Prediction>,
    pub next_closest: Prediction,
    pub total: f64,
}

impl fmt::Display for PredictionSurpassed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.surpassed.as_slice() {
            [only] => write!(
                f,
                "{}'s donation total prediction of {} has been surpassed.",
                only.participant,
                format_dollars(only.amount)
            )?,
            many => {
                let guesses: Vec<String> = many
                    .iter()
                    .map(|guess| format!("{} ({})", guess.participant, format_dollars(guess.amount)))
                    .collect();
                write!(
                    f,
                    "The donation total predictions of {} have been surpassed.",
                    join_names(&guesses)
                )?
            }
        }
        write!(
            f,
            " The next closest prediction is {}'s guess of {}.",
            self.next_closest.participant,
            format_dollars(self.next_closest.amount)
        )
    }
}

#[derive(Debug, Clone)]
pub struct PredictionGame {
    predictions: Vec<Prediction>,
    ceilings: Vec<f64>,
    out: Vec<bool>,
    initialized: bool,
}

impl PredictionGame {
    pub fn new(mut predictions: Vec<Prediction>) -> Result<Self, PredictionError> {
        if let Some(bad) = predictions.iter().find(|guess| {
            !guess.amount.is_finite() || guess.ceiling.is_some_and(|ceiling| !ceiling.is_finite())
        }) {
            return Err(PredictionError::NotFinite {
                participant: bad.participant.clone(),
            });
        }
        predictions.sort_by(|a, b| a.amount.total_cmp(&b.amount));

        let ceilings = predictions
            .iter()
            .enumerate()
            .map(|(i, guess)| {
                guess.ceiling.unwrap_or_else(|| {
                    predictions[i + 1..]
                        .iter()
                        .find(|next| next.amount > guess.amount)
                        .map_or(f64::INFINITY, |next| (guess.amount + next.amount) / 2.0)
                })
            })
            .collect();

        Ok(Self {
            out: vec![false; predictions.len()],
            predictions,
            ceilings,
            initialized: false,
        })
    }

    /// Records `total`. Like milestones, the first observation only marks
    /// guesses that are already out.
    ///
    /// Nothing is reported when every guess is out, since there is no closest
    /// guess left to name.
    pub fn observe(&mut self, total: f64) -> Option<PredictionSurpassed> {
        let mut surpassed = Vec::new();
        for (i, guess) in self.predictions.iter().enumerate() {
            if !self.out[i] && total > self.ceilings[i] {
                self.out[i] = true;
                surpassed.push(guess.clone());
            }
        }

        let first = !self.initialized;
        self.initialized = true;
        if first || surpassed.is_empty() {
            return None;
        }

        let next_closest = self
            .standing()
            .min_by(|a, b| (a.amount - total).abs().total_cmp(&(b.amount - total).abs()))?
            .clone();
        Some(PredictionSurpassed {
            surpassed,
            next_closest,
            total,
        })
    }

    /// Guesses still in the game, lowest first.
    pub fn standing(&self) -> impl Iterator<Item = &Prediction> {
        self.predictions
            .iter()
            .zip(&self.out)
            .filter(|(_, out)| !**out)
            .map(|(guess, _)| guess)
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }
}
