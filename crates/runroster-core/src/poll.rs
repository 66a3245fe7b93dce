//! The long-running loops: schedule sync, donation polling and ping intake.
//!
//! Each loop runs its ticks strictly one after another. A failed tick is
//! logged and the loop waits for the next one; nothing inside a loop is fatal.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::destination::{Destination, DestinationOp};
use crate::donations::DonationWindow;
use crate::error::{DestinationError, TickError, UpstreamError};
use crate::milestone::{MilestoneTracker, ThresholdCrossed};
use crate::pages::PageRenderer;
use crate::prediction::{PredictionGame, PredictionSurpassed};
use crate::reconcile::{DestinationOutcome, LookbackWindow, synchronize_all};
use crate::render::{format_dollars, next_transition};
use crate::target::{TargetApproach, TargetWatch};
use crate::tie::{Ping, TieEvent, TieTracker};
use crate::tracker::Upstream;

#[derive(Debug, Clone, PartialEq)]
pub enum Announcement {
    Milestone(ThresholdCrossed),
    Tie(TieEvent),
    Prediction(PredictionSurpassed),
    Target(TargetApproach),
}

impl fmt::Display for Announcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Announcement::Milestone(crossed) => write!(f, "The total passed {crossed}!"),
            Announcement::Tie(tie) => write!(f, "{tie}!"),
            Announcement::Prediction(surpassed) => write!(f, "{surpassed}"),
            Announcement::Target(approach) => write!(f, "{approach}"),
        }
    }
}

/// Where announcements and the donation status line go.
pub trait AnnouncementSink {
    fn announce(
        &self,
        announcement: Announcement,
    ) -> impl Future<Output = Result<(), DestinationError>> + Send;

    /// Replaces the standing status line (a bot's presence, for example).
    fn set_status(&self, status: &str) -> impl Future<Output = Result<(), DestinationError>> + Send;
}

/// Announces through `tracing` only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AnnouncementSink for LogSink {
    async fn announce(&self, announcement: Announcement) -> Result<(), DestinationError> {
        match &announcement {
            Announcement::Milestone(crossed) => {
                info!(threshold = crossed.threshold, total = crossed.total, "{announcement}")
            }
            Announcement::Tie(tie) => {
                info!(bucket = %tie.bucket, participants = tie.participants.len(), "{announcement}")
            }
            Announcement::Prediction(surpassed) => {
                info!(total = surpassed.total, out = surpassed.surpassed.len(), "{announcement}")
            }
            Announcement::Target(approach) => {
                info!(target = approach.target, remaining = approach.remaining, "{announcement}")
            }
        }
        Ok(())
    }

    async fn set_status(&self, status: &str) -> Result<(), DestinationError> {
        debug!(status, "Status updated");
        Ok(())
    }
}

/// Keeps every announcement in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    announcements: Mutex<Vec<Announcement>>,
    status: Mutex<Option<String>>,
    failing: Mutex<bool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn announcements(&self) -> Vec<Announcement> {
        self.announcements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> Option<String> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// While set, every call is rejected and nothing is stored.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(PoisonError::into_inner) = failing;
    }

    fn check(&self) -> Result<(), DestinationError> {
        if *self.failing.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(DestinationError::message("sink unavailable"));
        }
        Ok(())
    }
}

impl AnnouncementSink for MemorySink {
    async fn announce(&self, announcement: Announcement) -> Result<(), DestinationError> {
        self.check()?;
        self.announcements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(announcement);
        Ok(())
    }

    async fn set_status(&self, status: &str) -> Result<(), DestinationError> {
        self.check()?;
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = Some(status.to_string());
        Ok(())
    }
}

async fn announce_logged<S>(sink: &S, announcement: Announcement)
where
    S: AnnouncementSink,
{
    let text = announcement.to_string();
    if let Err(err) = sink.announce(announcement).await {
        warn!(error = %err, announcement = %text, "Announcement failed");
    }
}

/// Runs `fetch` unless `cancel` fires first.
async fn fetch_or_cancel<T, F>(cancel: &CancellationToken, fetch: F) -> Result<T, TickError>
where
    F: Future<Output = Result<T, UpstreamError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TickError::Cancelled),
        result = fetch => Ok(result?),
    }
}

/// Waits for the next tick; `false` once cancelled.
async fn wait_for_tick(ticker: &mut tokio::time::Interval, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = ticker.tick() => true,
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Renders the schedule and reconciles it against every destination.
pub struct ScheduleLoop<U, R, D> {
    upstream: Arc<U>,
    renderer: R,
    destinations: Vec<D>,
    lookback_margin: chrono::Duration,
    period: Duration,
    /// Last topic every destination accepted.
    topic: Mutex<Option<String>>,
}

impl<U, R, D> ScheduleLoop<U, R, D>
where
    U: Upstream + Send + Sync,
    R: PageRenderer + Send + Sync,
    D: Destination + Send + Sync,
{
    pub fn new(
        upstream: Arc<U>,
        renderer: R,
        destinations: Vec<D>,
        lookback_margin: chrono::Duration,
        period: Duration,
    ) -> Self {
        Self {
            upstream,
            renderer,
            destinations,
            lookback_margin,
            period,
            topic: Mutex::new(None),
        }
    }

    pub fn destinations(&self) -> &[D] {
        &self.destinations
    }

    /// One fetch, render and fan-out. Plan application is never interrupted
    /// by `cancel`; only the fetch is.
    pub async fn tick(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<DestinationOutcome>, TickError> {
        let snapshot = fetch_or_cancel(cancel, self.upstream.fetch_snapshot()).await?;
        let pages = self.renderer.render(&snapshot)?;
        debug!(
            pages = pages.len(),
            next_transition = ?next_transition(&snapshot),
            "Rendered schedule"
        );
        let window = LookbackWindow::for_event(snapshot.event.starts_at, self.lookback_margin);
        let outcomes = synchronize_all(&self.destinations, &pages, &window).await;
        if let Some(topic) = self.renderer.topic(&snapshot) {
            self.push_topic(topic).await;
        }
        Ok(outcomes)
    }

    /// Sets the topic on every destination unless it is unchanged. Failures are
    /// logged and retried on the next tick.
    async fn push_topic(&self, topic: String) {
        let unchanged = self
            .topic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            == Some(topic.as_str());
        if unchanged {
            return;
        }

        let updates = self.destinations.iter().map(|destination| {
            let op = DestinationOp::SetTopic(topic.clone());
            async move { (destination.name(), destination.apply(op).await) }
        });
        let mut accepted = true;
        for (name, result) in join_all(updates).await {
            if let Err(err) = result {
                warn!(destination = name, error = %err, "Topic update failed");
                accepted = false;
            }
        }
        if accepted {
            *self.topic.lock().unwrap_or_else(PoisonError::into_inner) = Some(topic);
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            period_secs = self.period.as_secs(),
            destinations = self.destinations.len(),
            "Schedule loop started"
        );
        let mut ticker = ticker(self.period);
        while wait_for_tick(&mut ticker, &cancel).await {
            match self.tick(&cancel).await {
                Ok(outcomes) => {
                    let failed = outcomes.iter().filter(|outcome| outcome.result.is_err()).count();
                    debug!(destinations = outcomes.len(), failed, "Schedule tick finished");
                }
                Err(err) if err.is_cancelled() => break,
                Err(err) => warn!(error = %err, "Schedule tick failed"),
            }
        }
        info!("Schedule loop stopped");
    }
}

/// Polls the donation total, keeps the status line current and announces
/// milestones, prediction knock-outs and approaching targets.
pub struct DonationLoop<U, S> {
    upstream: Arc<U>,
    sink: Arc<S>,
    milestones: MilestoneTracker,
    predictions: Option<PredictionGame>,
    targets: Option<TargetWatch>,
    window: DonationWindow,
    period: Duration,
    status: Option<String>,
}

impl<U, S> DonationLoop<U, S>
where
    U: Upstream + Send + Sync,
    S: AnnouncementSink + Send + Sync,
{
    pub fn new(
        upstream: Arc<U>,
        sink: Arc<S>,
        milestones: MilestoneTracker,
        window: DonationWindow,
        period: Duration,
    ) -> Self {
        Self {
            upstream,
            sink,
            milestones,
            predictions: None,
            targets: None,
            window,
            period,
            status: None,
        }
    }

    pub fn with_predictions(mut self, game: PredictionGame) -> Self {
        self.predictions = Some(game);
        self
    }

    pub fn with_target_watch(mut self, watch: TargetWatch) -> Self {
        self.targets = Some(watch);
        self
    }

    pub fn milestones(&self) -> &MilestoneTracker {
        &self.milestones
    }

    pub fn window(&self) -> &DonationWindow {
        &self.window
    }

    /// Fetches the total once; returns everything announced.
    pub async fn tick(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Announcement>, TickError> {
        let total = fetch_or_cancel(cancel, self.upstream.fetch_total()).await?;
        self.window.push(total);
        debug!(
            total,
            rate = ?self.window.average_rate(),
            intervals = self.window.intervals(),
            "Donation total polled"
        );

        self.refresh_status(total).await;

        let mut announcements: Vec<Announcement> = self
            .milestones
            .observe(total)
            .into_iter()
            .map(Announcement::Milestone)
            .collect();
        if let Some(surpassed) = self.predictions.as_mut().and_then(|game| game.observe(total)) {
            announcements.push(Announcement::Prediction(surpassed));
        }
        if let Some(approach) = self.targets.as_mut().and_then(|watch| watch.observe(total)) {
            announcements.push(Announcement::Target(approach));
        }

        for announcement in &announcements {
            announce_logged(self.sink.as_ref(), announcement.clone()).await;
        }
        Ok(announcements)
    }

    async fn refresh_status(&mut self, total: f64) {
        let status = format!("{} donations", format_dollars(total));
        if self.status.as_deref() == Some(status.as_str()) {
            return;
        }
        let result = self.sink.set_status(&status).await;
        match result {
            Ok(()) => self.status = Some(status),
            Err(err) => warn!(error = %err, "Status update failed"),
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            period_secs = self.period.as_secs(),
            thresholds = self.milestones.thresholds().len(),
            "Donation loop started"
        );
        let mut ticker = ticker(self.period);
        while wait_for_tick(&mut ticker, &cancel).await {
            match self.tick(&cancel).await {
                Ok(_) => {}
                Err(err) if err.is_cancelled() => break,
                Err(err) => warn!(error = %err, "Donation tick failed"),
            }
        }
        info!("Donation loop stopped");
    }
}

/// Feeds inbound pings to the tie tracker until the channel closes or
/// `cancel` fires.
pub async fn run_ping_listener<S>(
    mut pings: mpsc::Receiver<Ping>,
    ties: Arc<TieTracker>,
    sink: Arc<S>,
    cancel: CancellationToken,
) where
    S: AnnouncementSink + Send + Sync,
{
    loop {
        let ping = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            ping = pings.recv() => match ping {
                Some(ping) => ping,
                None => break,
            },
        };
        debug!(bucket = %ping.bucket, participant = %ping.participant, "Ping received");
        if let Some(tie) = ties.record(ping) {
            announce_logged(sink.as_ref(), Announcement::Tie(tie)).await;
        }
    }
    debug!("Ping listener stopped");
}
