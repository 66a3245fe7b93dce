//! Diffing a [`PageSet`] against what a destination already shows.
//!
//! Messages are matched to pages purely by position: the n-th message we
//! authored inside the lookback window holds page n. Planning is pure; applying
//! a plan is a separate step so callers can inspect or log it first.
//!
//! # Ordering
//!
//! A plan always lists creates and edits in ascending page order, then deletes
//! of leftover messages, then pin adjustments. Pins may refer to messages
//! created earlier in the same plan, which is why they come last.
//!
//! # Failure
//!
//! Application stops at the first failing mutation. Nothing is retried: the
//! next tick diffs against whatever state was actually reached.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::destination::{Destination, DestinationMessage, DestinationOp, MessageHandle};
use crate::error::{ApplyError, TickError};
use crate::pages::{Page, PageSet};

/// Time range of history considered when matching messages to pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookbackWindow {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl LookbackWindow {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self { start, end: None }
    }

    /// Window that opens `margin` before the event starts and never closes.
    ///
    /// Everything posted for the event is therefore still a candidate, however
    /// long the event has been running.
    pub fn for_event(event_start: DateTime<Utc>, margin: Duration) -> Self {
        Self::starting_at(
            event_start
                .checked_sub_signed(margin)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        )
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && self.end.is_none_or(|end| at <= end)
    }
}

/// The message a pin mutation targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageRef {
    Existing(MessageHandle),
    /// The message created for this page earlier in the same plan.
    Created(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Create {
        index: usize,
        page: Page,
    },
    Edit {
        index: usize,
        handle: MessageHandle,
        page: Page,
    },
    Delete {
        index: usize,
        handle: MessageHandle,
    },
    Pin {
        index: usize,
        target: MessageRef,
    },
    Unpin {
        index: usize,
        handle: MessageHandle,
    },
}

impl Mutation {
    pub fn index(&self) -> usize {
        match self {
            Mutation::Create { index, .. }
            | Mutation::Edit { index, .. }
            | Mutation::Delete { index, .. }
            | Mutation::Pin { index, .. }
            | Mutation::Unpin { index, .. } => *index,
        }
    }

    pub fn is_pin_adjustment(&self) -> bool {
        matches!(self, Mutation::Pin { .. } | Mutation::Unpin { .. })
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::Create { index, .. } => write!(f, "create page {index}"),
            Mutation::Edit { index, handle, .. } => write!(f, "edit page {index} ({handle})"),
            Mutation::Delete { index, handle } => write!(f, "delete message {index} ({handle})"),
            Mutation::Pin {
                index,
                target: MessageRef::Existing(handle),
            } => write!(f, "pin page {index} ({handle})"),
            Mutation::Pin {
                index,
                target: MessageRef::Created(_),
            } => write!(f, "pin page {index} (new)"),
            Mutation::Unpin { index, handle } => write!(f, "unpin page {index} ({handle})"),
        }
    }
}

/// Ordered list of mutations that brings a destination in line with a page set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub mutations: Vec<Mutation>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// Creates, edits and deletes; everything except pin adjustments.
    pub fn content_mutations(&self) -> impl Iterator<Item = &Mutation> {
        self.mutations
            .iter()
            .filter(|mutation| !mutation.is_pin_adjustment())
    }
}

/// Builds the plan that turns `history` into `pages`.
///
/// Only messages authored by us and created inside `window` are candidates;
/// they are ordered by creation time before being matched to pages by position.
pub fn plan(pages: &PageSet, history: &[DestinationMessage], window: &LookbackWindow) -> Plan {
    let mut candidates: Vec<&DestinationMessage> = history
        .iter()
        .filter(|message| message.authored_by_self && window.contains(message.created_at))
        .collect();
    candidates.sort_by_key(|message| message.created_at);

    let mut content = Vec::new();
    let mut deletes = Vec::new();
    let mut pins = Vec::new();

    for (index, page) in pages.iter().enumerate() {
        let wants_pin = pages.pin_target(index);
        match candidates.get(index) {
            Some(message) => {
                if message.body != *page {
                    content.push(Mutation::Edit {
                        index,
                        handle: message.handle.clone(),
                        page: page.clone(),
                    });
                }
                if wants_pin && !message.pinned {
                    pins.push(Mutation::Pin {
                        index,
                        target: MessageRef::Existing(message.handle.clone()),
                    });
                } else if !wants_pin && message.pinned {
                    pins.push(Mutation::Unpin {
                        index,
                        handle: message.handle.clone(),
                    });
                }
            }
            None => {
                content.push(Mutation::Create {
                    index,
                    page: page.clone(),
                });
                if wants_pin {
                    pins.push(Mutation::Pin {
                        index,
                        target: MessageRef::Created(index),
                    });
                }
            }
        }
    }

    for (index, message) in candidates.iter().enumerate().skip(pages.len()) {
        deletes.push(Mutation::Delete {
            index,
            handle: message.handle.clone(),
        });
    }

    let mut mutations = content;
    mutations.append(&mut deletes);
    mutations.append(&mut pins);
    Plan { mutations }
}

/// Tally of what a plan did to one destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub edited: usize,
    pub deleted: usize,
    pub pinned: usize,
    pub unpinned: usize,
}

impl SyncReport {
    pub fn total(&self) -> usize {
        self.created + self.edited + self.deleted + self.pinned + self.unpinned
    }

    pub fn is_noop(&self) -> bool {
        self.total() == 0
    }

    fn record(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::Create { .. } => self.created += 1,
            Mutation::Edit { .. } => self.edited += 1,
            Mutation::Delete { .. } => self.deleted += 1,
            Mutation::Pin { .. } => self.pinned += 1,
            Mutation::Unpin { .. } => self.unpinned += 1,
        }
    }
}

/// Applies `plan` to `destination` in order, stopping at the first failure.
pub async fn apply_plan<D>(destination: &D, plan: Plan) -> Result<SyncReport, ApplyError>
where
    D: Destination,
{
    let mut created: HashMap<usize, MessageHandle> = HashMap::new();
    let mut report = SyncReport::default();

    for mutation in plan.mutations {
        let label = mutation.to_string();
        let op = match &mutation {
            Mutation::Create { page, .. } => DestinationOp::Send(page.clone()),
            Mutation::Edit { handle, page, .. } => DestinationOp::Edit(handle.clone(), page.clone()),
            Mutation::Delete { handle, .. } => DestinationOp::Delete(handle.clone()),
            Mutation::Pin { target, .. } => match target {
                MessageRef::Existing(handle) => DestinationOp::Pin(handle.clone()),
                MessageRef::Created(page_index) => match created.get(page_index) {
                    Some(handle) => DestinationOp::Pin(handle.clone()),
                    None => {
                        return Err(ApplyError::UnresolvedCreate {
                            mutation: label,
                            index: *page_index,
                        });
                    }
                },
            },
            Mutation::Unpin { handle, .. } => DestinationOp::Unpin(handle.clone()),
        };

        debug!(destination = destination.name(), mutation = %label, "Applying mutation");
        let returned = destination
            .apply(op)
            .await
            .map_err(|source| ApplyError::Rejected {
                mutation: label,
                source,
            })?;

        if let Mutation::Create { index, .. } = &mutation {
            let handle = returned.ok_or(ApplyError::MissingHandle { index: *index })?;
            created.insert(*index, handle);
        }
        report.record(&mutation);
    }

    Ok(report)
}

/// Fetches history, plans and applies for one destination.
pub async fn synchronize_destination<D>(
    destination: &D,
    pages: &PageSet,
    window: &LookbackWindow,
) -> Result<SyncReport, TickError>
where
    D: Destination,
{
    let history = destination
        .fetch_history(window.start)
        .await
        .map_err(|source| TickError::History {
            destination: destination.name().to_string(),
            source,
        })?;

    let plan = plan(pages, &history, window);
    if plan.is_empty() {
        debug!(destination = destination.name(), "Destination already up to date");
        return Ok(SyncReport::default());
    }

    let report = apply_plan(destination, plan)
        .await
        .map_err(|source| TickError::Apply {
            destination: destination.name().to_string(),
            source,
        })?;

    info!(
        destination = destination.name(),
        created = report.created,
        edited = report.edited,
        deleted = report.deleted,
        pinned = report.pinned,
        unpinned = report.unpinned,
        "Schedule updated"
    );
    Ok(report)
}

/// Result of synchronizing one destination during a fan-out.
#[derive(Debug)]
pub struct DestinationOutcome {
    pub destination: String,
    pub result: Result<SyncReport, TickError>,
}

/// Reconciles the same pages against every destination.
///
/// Destinations are independent: one failing never stops the others.
pub async fn synchronize_all<D>(
    destinations: &[D],
    pages: &PageSet,
    window: &LookbackWindow,
) -> Vec<DestinationOutcome>
where
    D: Destination,
{
    let runs = destinations.iter().map(|destination| async move {
        let result = synchronize_destination(destination, pages, window).await;
        if let Err(err) = &result {
            warn!(destination = destination.name(), error = %err, "Destination sync failed");
        }
        DestinationOutcome {
            destination: destination.name().to_string(),
            result,
        }
    });
    join_all(runs).await
}
