//! Upstream access to a GDQ-style donation tracker.
//!
//! The tracker's search endpoint returns Django-serialized records
//! (`[{"pk": 1, "fields": {...}}]`) for each `type` query. Payload parsing is
//! kept separate from HTTP so [`assemble_snapshot`] can be exercised with
//! fixtures.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::{EventRef, UpstreamConfig};
use crate::error::{DataShapeError, TransportError, UpstreamError};
use crate::model::{BidEntry, BidOption, BidState, EventInfo, RunEntry, Snapshot};

/// Source of schedule snapshots and donation totals.
pub trait Upstream {
    fn fetch_snapshot(&self) -> impl Future<Output = Result<Snapshot, UpstreamError>> + Send;

    fn fetch_total(&self) -> impl Future<Output = Result<f64, UpstreamError>> + Send;
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerRecord<T> {
    pub pk: u64,
    pub fields: T,
}

/// Money fields arrive as either JSON numbers or decimal strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(f64),
    Text(String),
}

impl Default for Amount {
    fn default() -> Self {
        Amount::Number(0.0)
    }
}

impl Amount {
    fn value(&self, context: &str) -> Result<f64, DataShapeError> {
        match self {
            Amount::Number(value) => Ok(*value),
            Amount::Text(raw) => raw
                .trim()
                .parse()
                .map_err(|_| DataShapeError::new(context, format!("'{raw}' is not an amount"))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventFields {
    pub short: String,
    pub name: String,
    #[serde(default)]
    pub receivername: String,
    #[serde(default = "EventFields::default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub amount: Amount,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub minimumdonation: Amount,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub canonical_url: Option<String>,
}

impl EventFields {
    fn default_timezone() -> String {
        "UTC".to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunFields {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub runners: Vec<u64>,
    #[serde(default)]
    pub coop: bool,
    #[serde(default)]
    pub starttime: Option<String>,
    #[serde(default)]
    pub endtime: Option<String>,
    #[serde(default)]
    pub run_time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerFields {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BidFields {
    pub name: String,
    #[serde(default)]
    pub speedrun: Option<u64>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub total: Amount,
    #[serde(default)]
    pub goal: Option<Amount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BidTargetFields {
    pub name: String,
    #[serde(default)]
    pub parent: Option<u64>,
    #[serde(default)]
    pub total: Amount,
}

/// Everything fetched for one snapshot, before assembly.
#[derive(Debug, Clone)]
pub struct TrackerPayload {
    pub event: TrackerRecord<EventFields>,
    pub runs: Vec<TrackerRecord<RunFields>>,
    pub bids: Vec<TrackerRecord<BidFields>>,
    pub targets: Vec<TrackerRecord<BidTargetFields>>,
}

impl TrackerPayload {
    /// Runner ids referenced by runs but absent from `known`.
    pub fn unknown_runners(&self, known: &HashMap<u64, String>) -> HashSet<u64> {
        self.runs
            .iter()
            .flat_map(|run| run.fields.runners.iter().copied())
            .filter(|id| !known.contains_key(id))
            .collect()
    }
}

/// Builds a [`Snapshot`] from raw tracker records.
///
/// Runs without a start time (not yet scheduled) are skipped.
pub fn assemble_snapshot(
    payload: &TrackerPayload,
    runners: &HashMap<u64, String>,
    fetched_at: DateTime<Utc>,
) -> Result<Snapshot, DataShapeError> {
    let event = event_info(&payload.event)?;

    let mut options_by_bid: HashMap<u64, Vec<BidOption>> = HashMap::new();
    for target in &payload.targets {
        let Some(parent) = target.fields.parent else {
            continue;
        };
        options_by_bid.entry(parent).or_default().push(BidOption {
            name: target.fields.name.clone(),
            amount: target.fields.total.value(&format!("bid option {}", target.pk))?,
        });
    }
    for options in options_by_bid.values_mut() {
        options.sort_by(|a, b| b.amount.total_cmp(&a.amount));
    }

    let mut bids_by_run: HashMap<u64, Vec<BidEntry>> = HashMap::new();
    for bid in &payload.bids {
        let Some(run_id) = bid.fields.speedrun else {
            continue;
        };
        let context = format!("bid {}", bid.pk);
        let goal = match &bid.fields.goal {
            Some(goal) => Some(goal.value(&context)?),
            None => None,
        };
        bids_by_run.entry(run_id).or_default().push(BidEntry {
            name: bid.fields.name.clone(),
            amount: bid.fields.total.value(&context)?,
            goal,
            state: if bid.fields.state.eq_ignore_ascii_case("closed") {
                BidState::Closed
            } else {
                BidState::Open
            },
            options: if goal.is_none() {
                Some(options_by_bid.remove(&bid.pk).unwrap_or_default())
            } else {
                None
            },
        });
    }

    let mut runs = Vec::with_capacity(payload.runs.len());
    for record in &payload.runs {
        let fields = &record.fields;
        let context = format!("run {}", record.pk);
        let Some(start) = fields.starttime.as_deref() else {
            debug!(run = record.pk, "Skipping unscheduled run");
            continue;
        };
        let starts_at = parse_timestamp(start, &context)?;
        let estimate = parse_estimate(&fields.run_time, &context)?;
        let ends_at = match fields.endtime.as_deref() {
            Some(end) => parse_timestamp(end, &context)?,
            None => starts_at
                .checked_add_signed(estimate)
                .ok_or_else(|| DataShapeError::new(&context, "estimate overflows end time"))?,
        };
        let runner_names = fields
            .runners
            .iter()
            .map(|id| {
                runners.get(id).cloned().ok_or_else(|| {
                    DataShapeError::new(&context, format!("unknown runner {id}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        runs.push(RunEntry {
            id: record.pk,
            name: fields
                .display_name
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| fields.name.clone()),
            category: fields.category.clone(),
            runners: runner_names,
            coop: fields.coop,
            starts_at,
            ends_at,
            estimate,
            bids: bids_by_run.remove(&record.pk).unwrap_or_default(),
            vods: Vec::new(),
        });
    }
    runs.sort_by_key(|run| run.starts_at);

    Ok(Snapshot {
        event,
        runs,
        fetched_at,
    })
}

fn event_info(record: &TrackerRecord<EventFields>) -> Result<EventInfo, DataShapeError> {
    let fields = &record.fields;
    let context = format!("event {}", record.pk);
    let starts_at = match (fields.datetime.as_deref(), fields.date.as_deref()) {
        (Some(datetime), _) => parse_timestamp(datetime, &context)?,
        (None, Some(date)) => NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .ok()
            .and_then(|day| day.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
            .ok_or_else(|| DataShapeError::new(&context, format!("bad date '{date}'")))?,
        (None, None) => return Err(DataShapeError::new(&context, "missing start date")),
    };

    Ok(EventInfo {
        id: record.pk,
        short: fields.short.clone(),
        name: fields.name.clone(),
        charity: fields.receivername.clone(),
        timezone: fields.timezone.clone(),
        starts_at,
        total: fields.amount.value(&context)?,
        donor_count: fields.count,
        minimum_donation: fields.minimumdonation.value(&context)?,
        locked: fields.locked,
        url: fields.canonical_url.clone(),
    })
}

fn parse_timestamp(raw: &str, context: &str) -> Result<DateTime<Utc>, DataShapeError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| DataShapeError::new(context, format!("bad timestamp '{raw}': {err}")))
}

/// Parses `H:MM:SS` (hours may exceed 24).
pub fn parse_estimate(raw: &str, context: &str) -> Result<chrono::Duration, DataShapeError> {
    let invalid = || DataShapeError::new(context, format!("bad estimate '{raw}'"));
    let parts: Vec<&str> = raw.trim().split(':').collect();
    let [hours, minutes, seconds] = parts.as_slice() else {
        return Err(invalid());
    };
    let hours: i64 = hours.parse().map_err(|_| invalid())?;
    let minutes: i64 = minutes.parse().map_err(|_| invalid())?;
    let seconds: i64 = seconds.parse().map_err(|_| invalid())?;
    if minutes >= 60 || seconds >= 60 || hours < 0 || minutes < 0 || seconds < 0 {
        return Err(invalid());
    }
    hours
        .checked_mul(3600)
        .and_then(|total| total.checked_add(minutes * 60 + seconds))
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(invalid)
}

/// HTTP client for the tracker search API.
#[derive(Debug)]
pub struct TrackerClient {
    http: Client,
    base_url: String,
    event: EventRef,
    request_delay: Duration,
    event_id: OnceCell<u64>,
    runners: Mutex<HashMap<u64, String>>,
}

impl TrackerClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: config.tracker_url.clone(),
            event: config.event.clone(),
            request_delay: config.request_delay(),
            event_id: OnceCell::new(),
            runners: Mutex::new(HashMap::new()),
        })
    }

    async fn get_json<T>(&self, query: &[(&str, String)]) -> Result<T, UpstreamError>
    where
        T: DeserializeOwned,
    {
        let context = query
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        let response = self
            .http
            .get(&self.base_url)
            .query(query)
            .send()
            .await
            .map_err(TransportError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: response.url().to_string(),
                status: status.as_u16(),
            }
            .into());
        }
        let body = response.text().await.map_err(TransportError::from)?;

        // The tracker publishes no rate limits; stay polite.
        sleep(self.request_delay).await;

        serde_json::from_str(&body)
            .map_err(|err| DataShapeError::new(context, err.to_string()).into())
    }

    /// Resolves the configured event to its numeric id, once.
    pub async fn event_id(&self) -> Result<u64, UpstreamError> {
        self.event_id
            .get_or_try_init(|| self.resolve_event_id())
            .await
            .copied()
    }

    async fn resolve_event_id(&self) -> Result<u64, UpstreamError> {
        let short = match &self.event {
            EventRef::Id(id) => return Ok(*id),
            EventRef::Short(short) if short.trim().is_empty() => {
                return Err(DataShapeError::new("config", "no event configured").into());
            }
            EventRef::Short(short) => short,
        };
        let events: Vec<TrackerRecord<EventFields>> =
            self.get_json(&[("type", "event".to_string())]).await?;
        let found = events
            .iter()
            .find(|event| event.fields.short.eq_ignore_ascii_case(short))
            .map(|event| event.pk)
            .ok_or_else(|| DataShapeError::new("type=event", format!("no event '{short}'")))?;
        info!(event = %short, id = found, "Resolved event");
        Ok(found)
    }

    async fn fetch_event(&self, id: u64) -> Result<TrackerRecord<EventFields>, UpstreamError> {
        let mut events: Vec<TrackerRecord<EventFields>> = self
            .get_json(&[("type", "event".to_string()), ("id", id.to_string())])
            .await?;
        if events.is_empty() {
            return Err(DataShapeError::new(format!("type=event&id={id}"), "no such event").into());
        }
        Ok(events.swap_remove(0))
    }

    async fn refresh_runners(&self, event_id: u64) -> Result<(), UpstreamError> {
        let records: Vec<TrackerRecord<RunnerFields>> = self
            .get_json(&[("type", "runner".to_string()), ("event", event_id.to_string())])
            .await?;
        let mut runners = self.runners.lock().await;
        runners.extend(records.into_iter().map(|record| (record.pk, record.fields.name)));
        debug!(count = runners.len(), "Runner cache refreshed");
        Ok(())
    }
}

impl Upstream for TrackerClient {
    async fn fetch_snapshot(&self) -> Result<Snapshot, UpstreamError> {
        let id = self.event_id().await?;
        let event_key = id.to_string();
        let event = self.fetch_event(id).await?;
        let runs = self
            .get_json(&[("type", "run".to_string()), ("event", event_key.clone())])
            .await?;
        let bids = self
            .get_json(&[("type", "bid".to_string()), ("event", event_key.clone())])
            .await?;
        let targets = self
            .get_json(&[("type", "bidtarget".to_string()), ("event", event_key)])
            .await?;
        let payload = TrackerPayload {
            event,
            runs,
            bids,
            targets,
        };

        let missing = payload.unknown_runners(&*self.runners.lock().await);
        if !missing.is_empty() {
            debug!(missing = missing.len(), "Unknown runners referenced");
            self.refresh_runners(id).await?;
        }

        let runners = self.runners.lock().await;
        Ok(assemble_snapshot(&payload, &runners, Utc::now())?)
    }

    async fn fetch_total(&self) -> Result<f64, UpstreamError> {
        let id = self.event_id().await?;
        let event = self.fetch_event(id).await?;
        Ok(event.fields.amount.value(&format!("event {id}"))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const EVENT: &str = r#"[{"pk": 52, "model": "tracker.event", "fields": {
        "short": "agdq2025", "name": "Awesome Games Done Quick 2025",
        "receivername": "Prevent Cancer Foundation", "timezone": "America/New_York",
        "datetime": "2025-01-05T16:30:00Z", "amount": "2500000.50", "count": 40000,
        "minimumdonation": 5.0, "locked": false,
        "canonical_url": "https://tracker.gamesdonequick.com/tracker/event/agdq2025"}}]"#;

    const RUNS: &str = r#"[
        {"pk": 2, "fields": {"name": "Bonus Game - Hades", "display_name": "Hades",
            "category": "Any% Heat 8", "runners": [11], "coop": false,
            "starttime": "2025-01-05T18:00:00Z", "endtime": "2025-01-05T19:00:00Z",
            "run_time": "0:55:00"}},
        {"pk": 1, "fields": {"name": "Celeste", "category": "Any%", "runners": [10, 11],
            "coop": false, "starttime": "2025-01-05T16:30:00Z", "run_time": "1:30:00"}},
        {"pk": 3, "fields": {"name": "TBD", "category": "", "runners": [], "run_time": "0:10:00"}}
    ]"#;

    const BIDS: &str = r#"[
        {"pk": 100, "fields": {"name": "Golden Strawberry", "speedrun": 1, "state": "OPENED",
            "total": "750.00", "goal": "1000.00"}},
        {"pk": 101, "fields": {"name": "Weapon", "speedrun": 2, "state": "CLOSED",
            "total": 300, "goal": null}},
        {"pk": 102, "fields": {"name": "Event-wide", "speedrun": null, "state": "OPENED",
            "total": 10, "goal": 20}}
    ]"#;

    const TARGETS: &str = r#"[
        {"pk": 200, "fields": {"name": "Sword", "parent": 101, "total": "100"}},
        {"pk": 201, "fields": {"name": "Bow", "parent": 101, "total": "200"}}
    ]"#;

    fn payload() -> TrackerPayload {
        let mut events: Vec<TrackerRecord<EventFields>> = serde_json::from_str(EVENT).unwrap();
        TrackerPayload {
            event: events.remove(0),
            runs: serde_json::from_str(RUNS).unwrap(),
            bids: serde_json::from_str(BIDS).unwrap(),
            targets: serde_json::from_str(TARGETS).unwrap(),
        }
    }

    fn runners() -> HashMap<u64, String> {
        HashMap::from([(10, "alice".to_string()), (11, "bob".to_string())])
    }

    fn fetched_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 5, 17, 0, 0).unwrap()
    }

    #[test]
    fn assembles_event_and_runs() {
        let snapshot = assemble_snapshot(&payload(), &runners(), fetched_at()).unwrap();

        assert_eq!(snapshot.event.id, 52);
        assert_eq!(snapshot.event.total, 2_500_000.5);
        assert_eq!(snapshot.event.minimum_donation, 5.0);
        assert_eq!(snapshot.event.timezone, "America/New_York");

        let names: Vec<&str> = snapshot.runs.iter().map(|run| run.name.as_str()).collect();
        assert_eq!(names, vec!["Celeste", "Hades"], "sorted by start, TBD skipped");

        let celeste = &snapshot.runs[0];
        assert_eq!(celeste.runners, vec!["alice", "bob"]);
        assert!(celeste.is_race());
        assert_eq!(celeste.estimate, chrono::Duration::minutes(90));
        assert_eq!(celeste.ends_at, celeste.starts_at + chrono::Duration::minutes(90));
        assert_eq!(snapshot.current_run().map(|run| run.id), Some(1));
    }

    #[test]
    fn attaches_goals_and_ranked_war_options() {
        let snapshot = assemble_snapshot(&payload(), &runners(), fetched_at()).unwrap();

        let goal = &snapshot.runs[0].bids[0];
        assert_eq!(goal.goal, Some(1000.0));
        assert_eq!(goal.percent_of_goal(), Some(75));

        let war = &snapshot.runs[1].bids[0];
        assert!(war.is_war());
        assert!(war.is_closed());
        let options: Vec<&str> = war
            .options
            .as_ref()
            .unwrap()
            .iter()
            .map(|option| option.name.as_str())
            .collect();
        assert_eq!(options, vec!["Bow", "Sword"]);
    }

    #[test]
    fn unknown_runner_is_a_data_shape_error() {
        let payload = payload();
        let partial = HashMap::from([(10, "alice".to_string())]);
        assert_eq!(payload.unknown_runners(&partial), HashSet::from([11]));

        let err = assemble_snapshot(&payload, &partial, fetched_at()).unwrap_err();
        assert!(err.detail.contains("unknown runner 11"), "{err}");
    }

    #[test]
    fn malformed_amount_is_reported() {
        let mut payload = payload();
        payload.event.fields.amount = Amount::Text("lots".to_string());
        let err = assemble_snapshot(&payload, &runners(), fetched_at()).unwrap_err();
        assert_eq!(err.context, "event 52");
    }

    #[test]
    fn event_date_fallback() {
        let mut payload = payload();
        payload.event.fields.datetime = None;
        payload.event.fields.date = Some("2025-01-05".to_string());
        let snapshot = assemble_snapshot(&payload, &runners(), fetched_at()).unwrap();
        assert_eq!(
            snapshot.event.starts_at,
            Utc.with_ymd_and_hms(2025, 1, 5, 0, 0, 0).unwrap()
        );

        payload.event.fields.date = None;
        assert!(assemble_snapshot(&payload, &runners(), fetched_at()).is_err());
    }

    #[test]
    fn estimates() {
        assert_eq!(
            parse_estimate("26:05:09", "t").unwrap(),
            chrono::Duration::seconds(26 * 3600 + 5 * 60 + 9)
        );
        assert!(parse_estimate("1:30", "t").is_err());
        assert!(parse_estimate("1:75:00", "t").is_err());
        assert!(parse_estimate("", "t").is_err());
        assert!(parse_estimate("99999999999999:00:00", "t").is_err());
    }

    #[test]
    fn oversized_estimate_is_a_data_shape_error() {
        let mut payload = payload();
        payload.runs[1].fields.run_time = "9999999999999:00:00".to_string();
        let err = assemble_snapshot(&payload, &runners(), fetched_at()).unwrap_err();
        assert_eq!(err.context, "run 1");
    }

    #[test]
    fn end_time_past_the_calendar_is_a_data_shape_error() {
        let mut payload = payload();
        // Fits in a TimeDelta, but not when added to the start time.
        payload.runs[1].fields.run_time = "2562047788000:00:00".to_string();
        let err = assemble_snapshot(&payload, &runners(), fetched_at()).unwrap_err();
        assert_eq!(err.context, "run 1");
    }
}
