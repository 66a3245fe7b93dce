//! Command-line front end for the run roster.

pub mod cli_args;

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};
use runroster_core::render::format_dollars;
use runroster_core::{
    ClaimVerdict, DonationLoop, DonationWindow, EventRef, FileConfig, LogSink, LoggingDestination,
    LookbackWindow, MemoryDestination, MilestoneTracker, Page, PageRenderer, ParticipantId, Ping,
    ScheduleLoop, ScheduleRenderer, TieTracker, TrackerClient, Upstream, apply_env_overrides,
    compact_label, config_path, init_logging, judge_claim, load_config_from, parse_claim,
    run_ping_listener, save_config, synchronize_destination, to_toml_string,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cli_args::{ClaimArgs, Cli, Command, ConfigCommand, EventArgs};

const PING_CHANNEL_CAPACITY: usize = 64;

pub async fn run(cli: Cli) -> Result<(), String> {
    let destination = match cli.command {
        Command::Run(_) => LoggingDestination::FileAndStderr,
        _ => LoggingDestination::StderrOnly,
    };
    if let Err(err) = init_logging(destination) {
        eprintln!("Warning: logging unavailable: {err}");
    }

    let path = resolve_config_path(cli.config.as_deref());
    match cli.command {
        Command::Run(args) => run_loops(load(&path, &args)).await,
        Command::Preview(args) => preview(load(&path, &args)).await,
        Command::Thresholds => {
            print_thresholds(&load(&path, &EventArgs::default()));
            Ok(())
        }
        Command::Claim(args) => claim(load(&path, &args.event), &args).await,
        Command::Config(command) => handle_config_command(command, &path),
    }
}

/// `--config` with `~` expanded, or the per-user default.
pub fn resolve_config_path(flag: Option<&str>) -> PathBuf {
    match flag {
        Some(raw) => PathBuf::from(shellexpand::tilde(raw).to_string()),
        None => config_path(),
    }
}

fn load(path: &Path, args: &EventArgs) -> FileConfig {
    let load = load_config_from(path);
    let mut config = load.config;
    apply_env_overrides(&mut config);
    if let Some(event) = args.event.as_deref() {
        config.upstream.event = EventRef::parse(event);
    }
    for warning in load.warnings {
        if config.upstream.event.is_unset() || !warning.starts_with("No event configured") {
            eprintln!("Warning: {warning}");
        }
    }
    config
}

/// Parses `<rfc3339-timestamp> <participant>`.
pub fn parse_ping_line(line: &str) -> Result<Ping, String> {
    let line = line.trim();
    let (stamp, participant) = line
        .split_once(char::is_whitespace)
        .ok_or_else(|| format!("expected '<timestamp> <participant>', got '{line}'"))?;
    let bucket = DateTime::parse_from_rfc3339(stamp)
        .map_err(|err| format!("bad timestamp '{stamp}': {err}"))?
        .with_timezone(&Utc);
    let participant = participant.trim();
    if participant.is_empty() {
        return Err("missing participant".to_string());
    }
    Ok(Ping {
        bucket,
        participant: ParticipantId::from(participant),
    })
}

/// Reads ping lines from stdin on a detached thread. A blocking read cannot be
/// cancelled, so the thread is never joined; it ends with the process or once
/// the listener drops its receiver.
fn spawn_stdin_reader(pings: mpsc::Sender<Ping>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!(error = %err, "Could not read pings from stdin");
                    return;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_ping_line(&line) {
                Ok(ping) => {
                    if pings.blocking_send(ping).is_err() {
                        return;
                    }
                }
                Err(err) => warn!(error = %err, "Ignoring malformed ping"),
            }
        }
    });
}

async fn run_loops(config: FileConfig) -> Result<(), String> {
    let upstream = Arc::new(TrackerClient::new(&config.upstream).map_err(|err| err.to_string())?);
    let sink = Arc::new(LogSink);

    let destinations = config
        .schedule
        .destinations
        .iter()
        .map(|name| MemoryDestination::new(name.as_str()))
        .collect();
    let schedule = ScheduleLoop::new(
        Arc::clone(&upstream),
        ScheduleRenderer::from_config(&config.schedule),
        destinations,
        config.schedule.lookback_margin(),
        config.schedule.period(),
    );

    let milestones = MilestoneTracker::new(config.donations.thresholds_or_default())
        .map_err(|err| err.to_string())?;
    let mut donations = DonationLoop::new(
        Arc::clone(&upstream),
        Arc::clone(&sink),
        milestones,
        DonationWindow::new(config.donations.rate_window),
        config.donations.period(),
    );
    if let Some(game) = config.donations.prediction_game().map_err(|err| err.to_string())? {
        info!(entries = game.len(), "Prediction game enabled");
        donations = donations.with_predictions(game);
    }
    if let Some(watch) = config.donations.target_watch().map_err(|err| err.to_string())? {
        donations = donations.with_target_watch(watch);
    }

    let ties = Arc::new(TieTracker::new(config.ties.retention()));
    let (ping_tx, ping_rx) = mpsc::channel(PING_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();

    let tasks = vec![
        tokio::spawn({
            let cancel = cancel.clone();
            async move { schedule.run(cancel).await }
        }),
        tokio::spawn(donations.run(cancel.clone())),
        tokio::spawn(run_ping_listener(ping_rx, ties, sink, cancel.clone())),
    ];
    spawn_stdin_reader(ping_tx);

    info!(event = %config.upstream.event, "Run roster started; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .map_err(|err| format!("failed to listen for Ctrl-C: {err}"))?;
    info!("Shutting down");
    cancel.cancel();

    for task in tasks {
        if let Err(err) = task.await {
            warn!(error = %err, "Task ended abnormally");
        }
    }
    Ok(())
}

async fn preview(config: FileConfig) -> Result<(), String> {
    let upstream = TrackerClient::new(&config.upstream).map_err(|err| err.to_string())?;
    let snapshot = upstream.fetch_snapshot().await.map_err(|err| err.to_string())?;
    let renderer = ScheduleRenderer::from_config(&config.schedule);
    let pages = renderer.render(&snapshot).map_err(|err| err.to_string())?;

    let destination = MemoryDestination::new("preview");
    let window = LookbackWindow::for_event(
        snapshot.event.starts_at,
        config.schedule.lookback_margin(),
    );
    synchronize_destination(&destination, &pages, &window)
        .await
        .map_err(|err| err.to_string())?;

    for (index, message) in destination.messages().iter().enumerate() {
        let pin = if message.pinned { " (pinned)" } else { "" };
        println!("--- page {index}{pin} ---");
        println!("{}", describe_page(&message.body));
    }
    if let Some(topic) = renderer.topic(&snapshot) {
        println!("--- topic ---");
        println!("{topic}");
    }
    Ok(())
}

/// Plain-text rendering of a page for terminals.
pub fn describe_page(page: &Page) -> String {
    match page {
        Page::Text(body) => body.clone(),
        Page::Card(card) => {
            let mut lines = vec![format!("[{}]", card.title)];
            if !card.description.is_empty() {
                lines.push(card.description.clone());
            }
            for field in &card.fields {
                lines.push(format!("{}: {}", field.heading, field.body));
            }
            lines.push(format!("Last updated: {}", card.footer_timestamp.to_rfc3339()));
            lines.join("\n")
        }
    }
}

fn print_thresholds(config: &FileConfig) {
    let thresholds = config.donations.thresholds_or_default();
    println!("{} thresholds:", thresholds.len());
    for threshold in thresholds {
        println!("  {:>10}  {}", compact_label(threshold), format_dollars(threshold));
    }
    if let Some(alerts) = &config.donations.target_alerts {
        println!(
            "Target alerts every {} (within {} and {}).",
            format_dollars(alerts.step),
            format_dollars(alerts.near),
            format_dollars(alerts.imminent)
        );
    }
    if !config.donations.predictions.is_empty() {
        println!("{} predictions:", config.donations.predictions.len());
        for guess in &config.donations.predictions {
            println!("  {:>14}  {}", format_dollars(guess.amount), guess.participant);
        }
    }
}

async fn claim(config: FileConfig, args: &ClaimArgs) -> Result<(), String> {
    let text = args.joined_text();
    let claimed = parse_claim(&text).ok_or_else(|| format!("No amount found in '{text}'."))?;
    let actual = match args.total {
        Some(total) => total,
        None => TrackerClient::new(&config.upstream)
            .map_err(|err| err.to_string())?
            .fetch_total()
            .await
            .map_err(|err| err.to_string())?,
    };

    match judge_claim(claimed, actual) {
        ClaimVerdict::Reached => println!(
            "Confirmed: the total {} has reached {}.",
            format_dollars(actual),
            format_dollars(claimed)
        ),
        ClaimVerdict::Overstated { claimed, actual } => println!(
            "Not yet: {} claimed, but the total is {}.",
            format_dollars(claimed),
            format_dollars(actual)
        ),
    }
    Ok(())
}

fn handle_config_command(command: ConfigCommand, path: &Path) -> Result<(), String> {
    match command {
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                return Err(format!(
                    "{} already exists; pass --force to overwrite.",
                    path.display()
                ));
            }
            save_config(&FileConfig::default(), path).map_err(|err| err.to_string())?;
            println!("Wrote {}", path.display());
            Ok(())
        }
        ConfigCommand::Show => {
            let load = load_config_from(path);
            for warning in &load.warnings {
                eprintln!("Warning: {warning}");
            }
            println!("# {} ({:?})", path.display(), load.source);
            print!("{}", to_toml_string(&load.config).map_err(|err| err.to_string())?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use runroster_core::{CardField, StatusCard};

    #[test]
    fn parses_ping_lines() {
        let ping = parse_ping_line("2025-01-05T12:00:00Z  alice ").unwrap();
        assert_eq!(
            ping.bucket,
            Utc.with_ymd_and_hms(2025, 1, 5, 12, 0, 0).unwrap()
        );
        assert_eq!(ping.participant, ParticipantId::from("alice"));

        let offset = parse_ping_line("2025-01-05T07:00:00-05:00 bob").unwrap();
        assert_eq!(offset.bucket, ping.bucket);
    }

    #[test]
    fn rejects_malformed_ping_lines() {
        assert!(parse_ping_line("alice").is_err());
        assert!(parse_ping_line("yesterday alice").is_err());
        assert!(parse_ping_line("2025-01-05T12:00:00Z ").is_err());
    }

    #[test]
    fn cards_render_as_plain_text() {
        let page = Page::Card(StatusCard {
            title: "Event Run Roster".to_string(),
            description: "Updates every 5 minutes".to_string(),
            fields: vec![CardField {
                heading: "Current Game".to_string(),
                body: "Celeste (Any%) by alice".to_string(),
            }],
            footer_timestamp: Utc.with_ymd_and_hms(2025, 1, 5, 12, 0, 0).unwrap(),
        });
        assert_eq!(
            describe_page(&page),
            "[Event Run Roster]\nUpdates every 5 minutes\nCurrent Game: Celeste (Any%) by alice\nLast updated: 2025-01-05T12:00:00+00:00"
        );
    }

    #[test]
    fn config_path_resolution() {
        let path = resolve_config_path(Some("/tmp/runroster.toml"));
        assert_eq!(path, PathBuf::from("/tmp/runroster.toml"));
        assert_eq!(resolve_config_path(None), config_path());
    }
}
