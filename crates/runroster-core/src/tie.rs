//! Tie detection for participant pings.
//!
//! Pings are grouped by the creation timestamp of the message that carried
//! them. Every arrival after the first in a bucket is a tie, so a third
//! participant produces a second, larger [`TieEvent`] crediting everyone.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Opaque participant identifier (a user id on the chat backend).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        ParticipantId(value.to_string())
    }
}

/// One inbound ping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ping {
    pub bucket: DateTime<Utc>,
    pub participant: ParticipantId,
}

/// Two or more participants pinged in the same bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TieEvent {
    pub bucket: DateTime<Utc>,
    /// Everyone recorded in the bucket, in arrival order, newest last.
    pub participants: Vec<ParticipantId>,
}

impl fmt::Display for TieEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.participants.iter().map(ToString::to_string).collect();
        write!(f, "{} tied", join_names(&names))
    }
}

/// `a`, `a and b`, `a, b and c`.
pub fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

#[derive(Debug)]
pub struct TieTracker {
    buckets: Mutex<BTreeMap<DateTime<Utc>, Vec<ParticipantId>>>,
    retention: Duration,
}

impl TieTracker {
    /// Buckets older than `retention` behind the newest bucket are evicted.
    /// A negative retention is treated as zero.
    pub fn new(retention: Duration) -> Self {
        Self {
            buckets: Mutex::new(BTreeMap::new()),
            retention: retention.max(Duration::zero()),
        }
    }

    /// Records a ping and reports a tie if the bucket already had arrivals.
    ///
    /// Check and append happen under one lock acquisition, so two simultaneous
    /// pings for a fresh bucket always yield exactly one tie.
    pub fn record_ping(
        &self,
        bucket: DateTime<Utc>,
        participant: ParticipantId,
    ) -> Option<TieEvent> {
        let mut buckets = self.lock();

        let event = match buckets.get_mut(&bucket) {
            Some(arrivals) => {
                arrivals.push(participant);
                Some(TieEvent {
                    bucket,
                    participants: arrivals.clone(),
                })
            }
            None => {
                buckets.insert(bucket, vec![participant]);
                None
            }
        };

        let cutoff = buckets
            .keys()
            .next_back()
            .and_then(|newest| newest.checked_sub_signed(self.retention));
        if let Some(cutoff) = cutoff {
            let mut kept = buckets.split_off(&cutoff);
            // A late ping's bucket stays so a second late ping can still tie.
            if let Some(late) = buckets.remove(&bucket) {
                kept.insert(bucket, late);
            }
            *buckets = kept;
        }

        event
    }

    /// Convenience wrapper over [`TieTracker::record_ping`].
    pub fn record(&self, ping: Ping) -> Option<TieEvent> {
        self.record_ping(ping.bucket, ping.participant)
    }

    /// Evicts every bucket older than `cutoff`; returns how many were removed.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut buckets = self.lock();
        let kept = buckets.split_off(&cutoff);
        let removed = buckets.len();
        *buckets = kept;
        removed
    }

    /// Number of buckets currently tracked.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<DateTime<Utc>, Vec<ParticipantId>>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
