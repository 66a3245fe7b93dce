//! The messaging surface that holds the status pages.
//!
//! Backends implement [`Destination`]; the reconciler decides what to do and
//! hands each concrete operation to [`Destination::apply`].

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::DestinationError;
use crate::pages::Page;

/// Backend-assigned identifier of a posted message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageHandle(pub String);

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DestinationMessage {
    pub handle: MessageHandle,
    pub created_at: DateTime<Utc>,
    pub body: Page,
    pub pinned: bool,
    pub authored_by_self: bool,
}

/// A fully resolved operation against a destination.
#[derive(Debug, Clone, PartialEq)]
pub enum DestinationOp {
    Send(Page),
    Edit(MessageHandle, Page),
    Delete(MessageHandle),
    Pin(MessageHandle),
    Unpin(MessageHandle),
    /// Replace the channel topic.
    SetTopic(String),
}

impl DestinationOp {
    pub fn verb(&self) -> &'static str {
        match self {
            DestinationOp::Send(_) => "send",
            DestinationOp::Edit(..) => "edit",
            DestinationOp::Delete(_) => "delete",
            DestinationOp::Pin(_) => "pin",
            DestinationOp::Unpin(_) => "unpin",
            DestinationOp::SetTopic(_) => "topic",
        }
    }
}

/// A channel (or similar) that status pages are posted to.
pub trait Destination {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Messages created at or after `window_start`, oldest first.
    fn fetch_history(
        &self,
        window_start: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<DestinationMessage>, DestinationError>> + Send;

    /// Execute one operation. `Send` must return the new message's handle;
    /// every other operation returns `None`.
    fn apply(
        &self,
        op: DestinationOp,
    ) -> impl Future<Output = Result<Option<MessageHandle>, DestinationError>> + Send;
}

#[derive(Debug, Default)]
struct MemoryState {
    messages: Vec<DestinationMessage>,
    next_id: u64,
    applied: Vec<DestinationOp>,
    topic: Option<String>,
    fail_on: Option<(&'static str, usize)>,
}

/// In-process destination.
///
/// Used by the `preview`/`run` commands when no chat backend is wired in, and by
/// tests to observe exactly which operations a plan performs.
#[derive(Debug)]
pub struct MemoryDestination {
    name: String,
    state: Mutex<MemoryState>,
}

impl MemoryDestination {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Seeds existing history, e.g. messages posted by an earlier process.
    pub fn with_messages(name: impl Into<String>, messages: Vec<DestinationMessage>) -> Self {
        let destination = Self::new(name);
        {
            let mut state = destination.lock();
            state.next_id = messages.len() as u64;
            state.messages = messages;
        }
        destination
    }

    /// Makes the `nth` (zero-based) future operation with the given verb fail.
    pub fn fail_on(&self, verb: &'static str, nth: usize) {
        self.lock().fail_on = Some((verb, nth));
    }

    pub fn messages(&self) -> Vec<DestinationMessage> {
        self.lock().messages.clone()
    }

    pub fn topic(&self) -> Option<String> {
        self.lock().topic.clone()
    }

    /// Operations applied so far, in order.
    pub fn applied(&self) -> Vec<DestinationOp> {
        self.lock().applied.clone()
    }

    pub fn clear_applied(&self) {
        self.lock().applied.clear();
    }

    /// Removes a message without going through the reconciler, the way a
    /// moderator deleting it by hand would.
    pub fn delete_out_of_band(&self, handle: &MessageHandle) {
        self.lock().messages.retain(|message| &message.handle != handle);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply_now(&self, op: DestinationOp) -> Result<Option<MessageHandle>, DestinationError> {
        let mut state = self.lock();

        if let Some((verb, remaining)) = state.fail_on {
            if verb == op.verb() {
                if remaining == 0 {
                    state.fail_on = None;
                    return Err(DestinationError::message(format!(
                        "{} rejected by {}",
                        verb, self.name
                    )));
                }
                state.fail_on = Some((verb, remaining - 1));
            }
        }

        let result = match &op {
            DestinationOp::Send(page) => {
                state.next_id += 1;
                let handle = MessageHandle(format!("{}-{}", self.name, state.next_id));
                // Creation times never go backwards, so history order matches send order.
                let now = Utc::now();
                let created_at = state
                    .messages
                    .iter()
                    .map(|message| message.created_at)
                    .max()
                    .map_or(now, |latest| latest.max(now));
                state.messages.push(DestinationMessage {
                    handle: handle.clone(),
                    created_at,
                    body: page.clone(),
                    pinned: false,
                    authored_by_self: true,
                });
                Some(handle)
            }
            DestinationOp::Edit(handle, page) => {
                find(&mut state.messages, handle)?.body = page.clone();
                None
            }
            DestinationOp::Delete(handle) => {
                find(&mut state.messages, handle)?;
                state.messages.retain(|message| &message.handle != handle);
                None
            }
            DestinationOp::Pin(handle) => {
                find(&mut state.messages, handle)?.pinned = true;
                None
            }
            DestinationOp::Unpin(handle) => {
                find(&mut state.messages, handle)?.pinned = false;
                None
            }
            DestinationOp::SetTopic(topic) => {
                state.topic = Some(topic.clone());
                None
            }
        };

        info!(
            destination = %self.name,
            op = op.verb(),
            handle = ?result.as_ref().or(op_handle(&op)),
            "Applied destination op"
        );
        state.applied.push(op);
        Ok(result)
    }
}

fn op_handle(op: &DestinationOp) -> Option<&MessageHandle> {
    match op {
        DestinationOp::Send(_) | DestinationOp::SetTopic(_) => None,
        DestinationOp::Edit(handle, _)
        | DestinationOp::Delete(handle)
        | DestinationOp::Pin(handle)
        | DestinationOp::Unpin(handle) => Some(handle),
    }
}

fn find<'a>(
    messages: &'a mut [DestinationMessage],
    handle: &MessageHandle,
) -> Result<&'a mut DestinationMessage, DestinationError> {
    messages
        .iter_mut()
        .find(|message| &message.handle == handle)
        .ok_or_else(|| DestinationError::message(format!("unknown message {handle}")))
}

impl Destination for MemoryDestination {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_history(
        &self,
        window_start: DateTime<Utc>,
    ) -> Result<Vec<DestinationMessage>, DestinationError> {
        let state = self.lock();
        Ok(state
            .messages
            .iter()
            .filter(|message| message.created_at >= window_start)
            .cloned()
            .collect())
    }

    async fn apply(&self, op: DestinationOp) -> Result<Option<MessageHandle>, DestinationError> {
        self.apply_now(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_assigns_fresh_handles_and_starts_unpinned() {
        let destination = MemoryDestination::new("schedule");
        let first = destination
            .apply(DestinationOp::Send(Page::text("one")))
            .await
            .unwrap();
        let second = destination
            .apply(DestinationOp::Send(Page::text("two")))
            .await
            .unwrap();

        assert_ne!(first, second);
        let messages = destination.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|message| !message.pinned));
        assert!(messages.iter().all(|message| message.authored_by_self));
    }

    #[tokio::test]
    async fn fail_on_rejects_only_the_chosen_operation() {
        let destination = MemoryDestination::new("schedule");
        destination.fail_on("send", 1);

        assert!(
            destination
                .apply(DestinationOp::Send(Page::text("one")))
                .await
                .is_ok()
        );
        assert!(
            destination
                .apply(DestinationOp::Send(Page::text("two")))
                .await
                .is_err()
        );
        assert!(
            destination
                .apply(DestinationOp::Send(Page::text("three")))
                .await
                .is_ok()
        );
        assert_eq!(destination.messages().len(), 2);
    }

    #[tokio::test]
    async fn topic_is_replaced_without_touching_messages() {
        let destination = MemoryDestination::new("schedule");
        destination
            .apply(DestinationOp::SetTopic("Current Game: Celeste".to_string()))
            .await
            .unwrap();
        destination
            .apply(DestinationOp::SetTopic("Current Game: Hades".to_string()))
            .await
            .unwrap();

        assert_eq!(destination.topic().as_deref(), Some("Current Game: Hades"));
        assert!(destination.messages().is_empty());
    }

    #[tokio::test]
    async fn unknown_handles_are_rejected() {
        let destination = MemoryDestination::new("schedule");
        let err = destination
            .apply(DestinationOp::Pin(MessageHandle("nope".to_string())))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown message"));
    }
}
