//! The page contract shared by renderers and the reconciler.
//!
//! A [`PageSet`] is what one tick wants the destination to look like: a header
//! text page first, any number of body pages, and a status card last. Renderers
//! must be deterministic so that an unchanged snapshot yields byte-identical
//! pages, which is what lets the reconciler skip no-op edits.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::Snapshot;

/// Prefix that marks the page describing the run currently live.
pub const CURRENT_RUN_MARKER: char = '\u{27A1}';

/// Message length cap enforced by most chat backends.
pub const DEFAULT_CHAR_LIMIT: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardField {
    pub heading: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCard {
    pub title: String,
    pub description: String,
    pub fields: Vec<CardField>,
    pub footer_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    Text(String),
    Card(StatusCard),
}

impl Page {
    pub fn text(body: impl Into<String>) -> Self {
        Page::Text(body.into())
    }

    pub fn is_current_run(&self) -> bool {
        match self {
            Page::Text(body) => body.starts_with(CURRENT_RUN_MARKER),
            Page::Card(_) => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Page::Text(_) => "text",
            Page::Card(_) => "card",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageSetError {
    #[error("a page set needs at least a header and a status card")]
    Empty,
    #[error("page 0 must be a text header, found a {0}")]
    HeaderNotText(&'static str),
    #[error("the last page must be a status card, found a {0}")]
    TrailerNotCard(&'static str),
    #[error("status card found at index {0}; only the last page may be a card")]
    MisplacedCard(usize),
}

/// Validated, ordered sequence of pages for one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSet {
    pages: Vec<Page>,
}

impl PageSet {
    pub fn new(pages: Vec<Page>) -> Result<Self, PageSetError> {
        let (first, last) = match (pages.first(), pages.last()) {
            (Some(first), Some(last)) if pages.len() >= 2 => (first, last),
            _ => return Err(PageSetError::Empty),
        };
        if !matches!(first, Page::Text(_)) {
            return Err(PageSetError::HeaderNotText(first.kind()));
        }
        if !matches!(last, Page::Card(_)) {
            return Err(PageSetError::TrailerNotCard(last.kind()));
        }
        if let Some(index) = pages[..pages.len() - 1]
            .iter()
            .position(|page| matches!(page, Page::Card(_)))
        {
            return Err(PageSetError::MisplacedCard(index));
        }
        Ok(Self { pages })
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn iter(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter()
    }

    /// Whether the message holding page `index` should be pinned.
    pub fn pin_target(&self, index: usize) -> bool {
        index == 0 || self.pages.get(index).is_some_and(Page::is_current_run)
    }
}

/// Turns a snapshot into the pages a destination should show.
pub trait PageRenderer {
    fn render(&self, snapshot: &Snapshot) -> Result<PageSet, PageSetError>;

    /// Short summary for the destination's topic; `None` leaves topics alone.
    fn topic(&self, _snapshot: &Snapshot) -> Option<String> {
        None
    }
}

/// Packs `body` into chunks of at most `limit` characters, breaking on lines.
///
/// Lines are trimmed. A line that alone exceeds `limit` is hard-split.
pub fn split_body(body: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks: Vec<String> = Vec::new();

    for raw_line in body.split('\n') {
        let line = raw_line.trim();
        if let Some(last) = chunks.last_mut() {
            let joined = last.chars().count() + 1 + line.chars().count();
            if joined <= limit {
                last.push('\n');
                last.push_str(line);
                continue;
            }
        }

        let chars: Vec<char> = line.chars().collect();
        if chars.is_empty() {
            chunks.push(String::new());
            continue;
        }
        for piece in chars.chunks(limit) {
            chunks.push(piece.iter().collect());
        }
    }

    chunks
        .into_iter()
        .map(|chunk| chunk.trim().to_string())
        .filter(|chunk| !chunk.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn card() -> Page {
        Page::Card(StatusCard {
            title: "Run Roster".to_string(),
            description: String::new(),
            fields: Vec::new(),
            footer_timestamp: Utc.with_ymd_and_hms(2025, 1, 5, 12, 0, 0).unwrap(),
        })
    }

    #[test]
    fn page_set_requires_header_and_card() {
        assert_eq!(PageSet::new(vec![]), Err(PageSetError::Empty));
        assert_eq!(PageSet::new(vec![card()]), Err(PageSetError::Empty));
        assert_eq!(
            PageSet::new(vec![card(), card()]),
            Err(PageSetError::HeaderNotText("card"))
        );
        assert_eq!(
            PageSet::new(vec![Page::text("header"), Page::text("run")]),
            Err(PageSetError::TrailerNotCard("text"))
        );
        assert_eq!(
            PageSet::new(vec![Page::text("header"), card(), card()]),
            Err(PageSetError::MisplacedCard(1))
        );
        assert!(PageSet::new(vec![Page::text("header"), card()]).is_ok());
    }

    #[test]
    fn pin_targets_header_and_current_run_only() {
        let set = PageSet::new(vec![
            Page::text("header"),
            Page::text("10:00: Earlier game"),
            Page::text(format!("{CURRENT_RUN_MARKER} 11:00: Live game")),
            card(),
        ])
        .unwrap();

        let targets: Vec<bool> = (0..set.len()).map(|i| set.pin_target(i)).collect();
        assert_eq!(targets, vec![true, false, true, false]);
        assert!(!set.pin_target(99));
    }

    #[test]
    fn split_body_packs_lines_until_the_limit() {
        let body = "aaaa\nbbbb\ncccc";
        assert_eq!(split_body(body, 9), vec!["aaaa\nbbbb", "cccc"]);
        assert_eq!(split_body(body, 100), vec!["aaaa\nbbbb\ncccc"]);
    }

    #[test]
    fn split_body_hard_splits_long_lines() {
        let body = "short\nabcdefghij";
        assert_eq!(split_body(body, 4), vec!["shor", "t", "abcd", "efgh", "ij"]);
    }

    #[test]
    fn split_body_counts_characters_not_bytes() {
        let body = "\u{27A1}\u{27A1}\u{27A1}";
        assert_eq!(split_body(body, 3), vec![body.to_string()]);
    }
}
