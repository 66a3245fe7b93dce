use std::collections::VecDeque;

/// Rolling window of the most recent donation totals, one per poll.
#[derive(Debug, Clone)]
pub struct DonationWindow {
    capacity: usize,
    totals: VecDeque<f64>,
}

impl DonationWindow {
    /// `capacity` is clamped to at least two samples so a rate can exist.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            capacity,
            totals: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, total: f64) {
        if self.totals.len() == self.capacity {
            self.totals.pop_front();
        }
        self.totals.push_back(total);
    }

    pub fn latest(&self) -> Option<f64> {
        self.totals.back().copied()
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    /// Mean increase between consecutive polls, if at least two are recorded.
    pub fn average_rate(&self) -> Option<f64> {
        if self.totals.len() < 2 {
            return None;
        }
        let deltas = self.totals.len() - 1;
        let first = self.totals.front().copied()?;
        let last = self.totals.back().copied()?;
        Some((last - first) / deltas as f64)
    }

    /// Number of poll intervals the rate is averaged over.
    pub fn intervals(&self) -> usize {
        self.totals.len().saturating_sub(1)
    }
}
