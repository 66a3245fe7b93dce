//! Plain-text schedule renderer.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::config::ScheduleConfig;
use crate::milestone::group_thousands;
use crate::model::{BidEntry, EventInfo, RunEntry, Snapshot};
use crate::pages::{
    CURRENT_RUN_MARKER, CardField, DEFAULT_CHAR_LIMIT, Page, PageRenderer, PageSet, PageSetError,
    StatusCard, split_body,
};
use crate::tie::join_names;

#[derive(Debug, Clone)]
pub struct ScheduleRenderer {
    timezone: Option<Tz>,
    upcoming_runs: usize,
    char_limit: usize,
    period_minutes: u64,
    updates_text: Option<String>,
}

impl Default for ScheduleRenderer {
    fn default() -> Self {
        Self {
            timezone: None,
            upcoming_runs: 3,
            char_limit: DEFAULT_CHAR_LIMIT,
            period_minutes: 5,
            updates_text: None,
        }
    }
}

impl ScheduleRenderer {
    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self {
            timezone: config.display_timezone(),
            upcoming_runs: config.upcoming_runs,
            char_limit: config.char_limit,
            period_minutes: config.period_minutes,
            updates_text: config.updates_text.clone(),
        }
    }

    /// Overrides the event's own timezone.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = Some(timezone);
        self
    }

    pub fn with_upcoming_runs(mut self, upcoming_runs: usize) -> Self {
        self.upcoming_runs = upcoming_runs;
        self
    }

    pub fn with_char_limit(mut self, char_limit: usize) -> Self {
        self.char_limit = char_limit.max(1);
        self
    }

    fn timezone_for(&self, event: &EventInfo) -> Tz {
        self.timezone
            .or_else(|| event.timezone.parse().ok())
            .unwrap_or(Tz::UTC)
    }

    fn header(&self, event: &EventInfo, tz: Tz) -> String {
        let mut lines = vec![format!("**{}** ({})", event.name, event.short)];
        if !event.charity.trim().is_empty() {
            lines.push(format!("Raising money for {}.", event.charity.trim()));
        }
        if event.locked {
            lines.push(format!(
                "Final total: {} from {} donors. Thank you!",
                format_dollars(event.total),
                group_thousands(event.donor_count)
            ));
        } else {
            lines.push(format!(
                "Donation total: {} from {} donors (minimum donation {}).",
                format_dollars(event.total),
                group_thousands(event.donor_count),
                format_dollars(event.minimum_donation)
            ));
        }
        if let Some(url) = event.url.as_deref().filter(|url| !url.is_empty()) {
            lines.push(format!("Event website: <{url}>"));
        }
        if let Some(updates) = self.updates_text.as_deref().filter(|text| !text.is_empty()) {
            lines.push(updates.to_string());
        }
        lines.push(format!("All times are in {}.", tz.name()));
        lines.join("\n")
    }

    fn run_body(
        &self,
        run: &RunEntry,
        tz: Tz,
        live: bool,
        previous_day: &mut Option<NaiveDate>,
    ) -> String {
        let starts_at = run.starts_at.with_timezone(&tz);
        let mut lines = Vec::new();

        if *previous_day != Some(starts_at.date_naive()) {
            lines.push(format!("> **{}**", starts_at.format("%A %b %-d")));
            *previous_day = Some(starts_at.date_naive());
        }

        lines.push(format!(
            "`{}`: {} in {}",
            starts_at.format("%b %d %I:%M %p"),
            describe_run(run),
            format_estimate(run.estimate)
        ));

        lines.extend(run.bids.iter().map(describe_bid));
        lines.extend(run.vods.iter().map(|vod| format!("VOD: <{vod}>")));

        let body = lines.join("\n");
        if live {
            format!("{CURRENT_RUN_MARKER} {body}")
        } else {
            body
        }
    }

    fn status_card(&self, snapshot: &Snapshot, tz: Tz) -> StatusCard {
        let event = &snapshot.event;
        let mut description = vec![format!("Updates every {} minutes", self.period_minutes)];
        if let Some(url) = event.url.as_deref().filter(|url| !url.is_empty()) {
            description.push(format!("Event page: <{url}>"));
        }

        let mut fields = self.now_and_next(snapshot);
        if fields.is_empty() {
            fields.push(CardField {
                heading: "N/A".to_string(),
                body: idle_message(snapshot, tz),
            });
        }

        StatusCard {
            title: format!("{} Run Roster", event.name),
            description: description.join("\n"),
            fields,
            footer_timestamp: snapshot.fetched_at,
        }
    }

    fn now_and_next(&self, snapshot: &Snapshot) -> Vec<CardField> {
        let mut fields = Vec::new();
        if let Some(current) = snapshot.current_run() {
            fields.push(CardField {
                heading: "Current Game".to_string(),
                body: describe_run(current),
            });
        }
        for run in snapshot.upcoming_runs(self.upcoming_runs) {
            fields.push(CardField {
                heading: humanize_until(run.starts_at - snapshot.fetched_at),
                body: describe_run(run),
            });
        }
        fields
    }

    fn topic_text(&self, snapshot: &Snapshot) -> String {
        let fields = self.now_and_next(snapshot);
        if fields.is_empty() {
            return idle_message(snapshot, self.timezone_for(&snapshot.event));
        }
        fields
            .iter()
            .map(|field| format!("{}: {}", field.heading, field.body))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl PageRenderer for ScheduleRenderer {
    fn render(&self, snapshot: &Snapshot) -> Result<PageSet, PageSetError> {
        let tz = self.timezone_for(&snapshot.event);
        let mut pages: Vec<Page> = split_body(&self.header(&snapshot.event, tz), self.char_limit)
            .into_iter()
            .map(Page::Text)
            .collect();

        let current_id = snapshot.current_run().map(|run| run.id);
        let mut previous_day = None;
        for run in &snapshot.runs {
            let live = current_id == Some(run.id);
            let body = self.run_body(run, tz, live, &mut previous_day);
            pages.extend(split_body(&body, self.char_limit).into_iter().map(Page::Text));
        }

        pages.push(Page::Card(self.status_card(snapshot, tz)));
        PageSet::new(pages)
    }

    /// The current run and the next few, one paragraph each.
    fn topic(&self, snapshot: &Snapshot) -> Option<String> {
        Some(self.topic_text(snapshot))
    }
}

/// `Game (Category) [RACE] by a, b and c`.
fn describe_run(run: &RunEntry) -> String {
    let mut text = run.name.clone();
    if !run.category.is_empty() {
        text.push_str(&format!(" ({})", run.category));
    }
    if run.is_race() {
        text.push_str(" [RACE]");
    }
    if !run.runners.is_empty() {
        text.push_str(&format!(" by {}", join_names(&run.runners)));
    }
    text
}

fn describe_bid(bid: &BidEntry) -> String {
    let closed = if bid.is_closed() { " [closed]" } else { "" };
    match (&bid.goal, &bid.options) {
        (Some(goal), _) => format!(
            "Goal: {}: {} of {} ({}%){closed}",
            bid.name,
            format_dollars(bid.amount),
            format_dollars(*goal),
            bid.percent_of_goal().unwrap_or(0)
        ),
        (None, Some(options)) if !options.is_empty() => {
            let ranked: Vec<String> = options
                .iter()
                .map(|option| format!("{} {}", option.name, format_dollars(option.amount)))
                .collect();
            format!("Bid war: {}: {}{closed}", bid.name, ranked.join(", "))
        }
        _ => format!("Bid war: {}: no options yet{closed}", bid.name),
    }
}

fn idle_message(snapshot: &Snapshot, tz: Tz) -> String {
    let ended = match snapshot.runs.last() {
        Some(last) => last.ends_at <= snapshot.fetched_at,
        None => snapshot.event.starts_at <= snapshot.fetched_at,
    };
    if ended {
        "The event has ended. Thank you all for watching and donating!".to_string()
    } else {
        let starts_at = snapshot.event.starts_at.with_timezone(&tz);
        format!("The event will start on {}.", starts_at.format("%A %b %-d"))
    }
}

/// `H:MM:SS`, hours unbounded.
pub fn format_estimate(estimate: Duration) -> String {
    let total = estimate.num_seconds().max(0);
    format!(
        "{}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// `$1,234` for whole amounts, `$1,234.50` otherwise.
pub fn format_dollars(amount: f64) -> String {
    let cents = (amount.max(0.0) * 100.0).round() as u64;
    let whole = group_thousands(cents / 100);
    match cents % 100 {
        0 => format!("${whole}"),
        fraction => format!("${whole}.{fraction:02}"),
    }
}

fn humanize_until(delta: Duration) -> String {
    let minutes = delta.num_minutes().max(0);
    let (amount, unit) = if minutes < 60 {
        (minutes, "minute")
    } else if minutes < 48 * 60 {
        (minutes / 60, "hour")
    } else {
        (minutes / (24 * 60), "day")
    };
    match amount {
        0 => "Starting now".to_string(),
        1 => format!("In 1 {unit}"),
        n => format!("In {n} {unit}s"),
    }
}

/// The next run start or end after the snapshot time.
pub fn next_transition(snapshot: &Snapshot) -> Option<DateTime<Utc>> {
    snapshot
        .runs
        .iter()
        .flat_map(|run| [run.starts_at, run.ends_at])
        .filter(|at| *at > snapshot.fetched_at)
        .min()
}
