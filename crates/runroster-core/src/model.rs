//! Snapshot data pulled from the upstream tracker for a single tick.

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidState {
    Open,
    Closed,
}

/// One option of a bid war.
#[derive(Debug, Clone, PartialEq)]
pub struct BidOption {
    pub name: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BidEntry {
    pub name: String,
    pub amount: f64,
    pub goal: Option<f64>,
    pub state: BidState,
    /// Ranked highest amount first. `None` for goals, `Some` for wars.
    pub options: Option<Vec<BidOption>>,
}

impl BidEntry {
    pub fn is_war(&self) -> bool {
        self.goal.is_none() && self.options.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.state == BidState::Closed
    }

    /// Percentage of the goal raised, truncated.
    pub fn percent_of_goal(&self) -> Option<u32> {
        self.goal
            .filter(|goal| *goal > 0.0)
            .map(|goal| ((self.amount / goal) * 100.0).floor() as u32)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunEntry {
    pub id: u64,
    pub name: String,
    pub category: String,
    pub runners: Vec<String>,
    pub coop: bool,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub estimate: Duration,
    pub bids: Vec<BidEntry>,
    pub vods: Vec<String>,
}

impl RunEntry {
    /// True when `now` falls inside `[starts_at, ends_at)`.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now < self.ends_at
    }

    pub fn is_race(&self) -> bool {
        !self.coop && self.runners.len() > 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventInfo {
    pub id: u64,
    pub short: String,
    pub name: String,
    pub charity: String,
    pub timezone: String,
    pub starts_at: DateTime<Utc>,
    pub total: f64,
    pub donor_count: u64,
    pub minimum_donation: f64,
    /// Locked events have finished collecting donations.
    pub locked: bool,
    pub url: Option<String>,
}

/// Everything needed to render one tick's pages.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub event: EventInfo,
    pub runs: Vec<RunEntry>,
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn current_run(&self) -> Option<&RunEntry> {
        self.runs.iter().find(|run| run.is_live_at(self.fetched_at))
    }

    /// Up to `limit` runs starting after the snapshot time, in schedule order.
    pub fn upcoming_runs(&self, limit: usize) -> impl Iterator<Item = &RunEntry> {
        self.runs
            .iter()
            .filter(move |run| run.starts_at > self.fetched_at)
            .take(limit)
    }
}
