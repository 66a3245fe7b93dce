use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use dirs::config_dir;
use serde::{Deserialize, Serialize};

use crate::milestone::default_thresholds;
use crate::prediction::{Prediction, PredictionError, PredictionGame};
use crate::target::{TargetError, TargetWatch};

const CONFIG_DIR_NAME: &str = "runroster";
const CONFIG_FILE_NAME: &str = "config.toml";
const CURRENT_SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_TRACKER_URL: &str = "https://tracker.gamesdonequick.com/tracker/search/";
pub const EVENT_ENV_VAR: &str = "RUNROSTER_EVENT";
pub const TRACKER_URL_ENV_VAR: &str = "RUNROSTER_TRACKER_URL";
/// Upper bound for both `lookback_margin_hours` and `retention_hours`.
pub const MAX_WINDOW_HOURS: u64 = 24 * 366;

/// Result returned by [`load_config`], capturing the source and any non-fatal issues.
#[derive(Debug, Clone)]
pub struct ConfigLoadResult {
    pub config: FileConfig,
    pub warnings: Vec<String>,
    pub source: ConfigSource,
}

/// Indicates where the configuration was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// No usable configuration file was found; defaults were synthesized.
    Default,
    /// Configuration was read from `config.toml`.
    File,
}

/// Errors that can occur when persisting configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Ser(toml::ser::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "IO error: {err}"),
            ConfigError::Ser(err) => write!(f, "TOML serialization error: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Ser(value)
    }
}

/// Disk-backed configuration schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "FileConfig::schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub donations: DonationConfig,
    #[serde(default)]
    pub ties: TieConfig,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            upstream: UpstreamConfig::default(),
            schedule: ScheduleConfig::default(),
            donations: DonationConfig::default(),
            ties: TieConfig::default(),
        }
    }
}

impl FileConfig {
    const fn schema_version() -> u32 {
        CURRENT_SCHEMA_VERSION
    }
}

/// Which tracker event to follow: a numeric id or its short code (`agdq2025`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventRef {
    Id(u64),
    Short(String),
}

impl Default for EventRef {
    fn default() -> Self {
        EventRef::Short(String::new())
    }
}

impl EventRef {
    pub fn is_unset(&self) -> bool {
        matches!(self, EventRef::Short(short) if short.trim().is_empty())
    }

    /// Reads an event reference from text, preferring a numeric id.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<u64>() {
            Ok(id) => EventRef::Id(id),
            Err(_) => EventRef::Short(trimmed.to_string()),
        }
    }
}

impl fmt::Display for EventRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventRef::Id(id) => write!(f, "#{id}"),
            EventRef::Short(short) => f.write_str(short),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "UpstreamConfig::default_tracker_url")]
    pub tracker_url: String,
    #[serde(default)]
    pub event: EventRef,
    #[serde(default = "UpstreamConfig::default_user_agent")]
    pub user_agent: String,
    /// Pause after every request; the tracker publishes no rate limits.
    #[serde(default = "UpstreamConfig::default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "UpstreamConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            tracker_url: Self::default_tracker_url(),
            event: EventRef::default(),
            user_agent: Self::default_user_agent(),
            request_delay_ms: Self::default_request_delay_ms(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

impl UpstreamConfig {
    fn default_tracker_url() -> String {
        DEFAULT_TRACKER_URL.to_string()
    }

    fn default_user_agent() -> String {
        format!("runroster/{}", env!("CARGO_PKG_VERSION"))
    }

    const fn default_request_delay_ms() -> u64 {
        2_500
    }

    const fn default_timeout_secs() -> u64 {
        30
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "ScheduleConfig::default_period_minutes")]
    pub period_minutes: u64,
    /// History older than the event start minus this margin is never matched.
    #[serde(default = "ScheduleConfig::default_lookback_margin_hours")]
    pub lookback_margin_hours: u64,
    #[serde(default = "ScheduleConfig::default_destinations")]
    pub destinations: Vec<String>,
    #[serde(default = "ScheduleConfig::default_upcoming_runs")]
    pub upcoming_runs: usize,
    #[serde(default = "ScheduleConfig::default_char_limit")]
    pub char_limit: usize,
    /// Display timezone; the event's own timezone when unset.
    #[serde(default)]
    pub timezone: Option<String>,
    /// Extra line appended to the header page, e.g. where announcements live.
    #[serde(default)]
    pub updates_text: Option<String>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            period_minutes: Self::default_period_minutes(),
            lookback_margin_hours: Self::default_lookback_margin_hours(),
            destinations: Self::default_destinations(),
            upcoming_runs: Self::default_upcoming_runs(),
            char_limit: Self::default_char_limit(),
            timezone: None,
            updates_text: None,
        }
    }
}

impl ScheduleConfig {
    const fn default_period_minutes() -> u64 {
        5
    }

    const fn default_lookback_margin_hours() -> u64 {
        24
    }

    fn default_destinations() -> Vec<String> {
        vec!["schedule".to_string()]
    }

    const fn default_upcoming_runs() -> usize {
        3
    }

    const fn default_char_limit() -> usize {
        crate::pages::DEFAULT_CHAR_LIMIT
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_minutes * 60)
    }

    pub fn lookback_margin(&self) -> chrono::Duration {
        capped_hours(self.lookback_margin_hours)
    }

    pub fn display_timezone(&self) -> Option<Tz> {
        self.timezone.as_deref().and_then(|name| name.parse().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonationConfig {
    #[serde(default = "DonationConfig::default_period_seconds")]
    pub period_seconds: u64,
    /// Milestone ladder; the stock ladder when unset.
    #[serde(default)]
    pub thresholds: Option<Vec<f64>>,
    #[serde(default = "DonationConfig::default_rate_window")]
    pub rate_window: usize,
    /// Alerts as the total nears the next round target; off when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_alerts: Option<TargetAlertConfig>,
    /// Entries for the prediction game; no game when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub predictions: Vec<Prediction>,
}

impl Default for DonationConfig {
    fn default() -> Self {
        Self {
            period_seconds: Self::default_period_seconds(),
            thresholds: None,
            rate_window: Self::default_rate_window(),
            target_alerts: None,
            predictions: Vec::new(),
        }
    }
}

impl DonationConfig {
    const fn default_period_seconds() -> u64 {
        10
    }

    const fn default_rate_window() -> usize {
        7
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_seconds)
    }

    pub fn thresholds_or_default(&self) -> Vec<f64> {
        self.thresholds.clone().unwrap_or_else(default_thresholds)
    }

    pub fn prediction_game(&self) -> Result<Option<PredictionGame>, PredictionError> {
        if self.predictions.is_empty() {
            return Ok(None);
        }
        PredictionGame::new(self.predictions.clone()).map(Some)
    }

    pub fn target_watch(&self) -> Result<Option<TargetWatch>, TargetError> {
        self.target_alerts
            .as_ref()
            .map(TargetAlertConfig::watch)
            .transpose()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetAlertConfig {
    #[serde(default = "TargetAlertConfig::default_step")]
    pub step: f64,
    #[serde(default = "TargetAlertConfig::default_near")]
    pub near: f64,
    #[serde(default = "TargetAlertConfig::default_imminent")]
    pub imminent: f64,
}

impl Default for TargetAlertConfig {
    fn default() -> Self {
        Self {
            step: Self::default_step(),
            near: Self::default_near(),
            imminent: Self::default_imminent(),
        }
    }
}

impl TargetAlertConfig {
    const fn default_step() -> f64 {
        25_000.0
    }

    const fn default_near() -> f64 {
        1_000.0
    }

    const fn default_imminent() -> f64 {
        100.0
    }

    pub fn watch(&self) -> Result<TargetWatch, TargetError> {
        TargetWatch::new(self.step, self.near, self.imminent)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieConfig {
    #[serde(default = "TieConfig::default_retention_hours")]
    pub retention_hours: u64,
}

impl Default for TieConfig {
    fn default() -> Self {
        Self {
            retention_hours: Self::default_retention_hours(),
        }
    }
}

impl TieConfig {
    const fn default_retention_hours() -> u64 {
        48
    }

    pub fn retention(&self) -> chrono::Duration {
        capped_hours(self.retention_hours)
    }
}

fn capped_hours(hours: u64) -> chrono::Duration {
    i64::try_from(hours.min(MAX_WINDOW_HOURS))
        .ok()
        .and_then(chrono::Duration::try_hours)
        .unwrap_or_default()
}

pub fn config_directory() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

pub fn config_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}

/// Loads the configuration from the default location.
pub fn load_config() -> ConfigLoadResult {
    load_config_from(&config_path())
}

/// Loads and sanitizes `path`, falling back to defaults when it is missing or unreadable.
pub fn load_config_from(path: &Path) -> ConfigLoadResult {
    let mut warnings = Vec::new();

    if path.exists() {
        match fs::read_to_string(path) {
            Ok(raw) => match toml::from_str::<FileConfig>(&raw) {
                Ok(cfg) => {
                    let (cfg, mut sanitize_warnings) = sanitize_config(cfg);
                    warnings.append(&mut sanitize_warnings);
                    return ConfigLoadResult {
                        config: cfg,
                        warnings,
                        source: ConfigSource::File,
                    };
                }
                Err(err) => {
                    warnings.push(format!(
                        "Failed to parse {} as TOML: {}. Falling back to defaults.",
                        path.display(),
                        err
                    ));
                }
            },
            Err(err) => {
                warnings.push(format!(
                    "Failed to read {}: {}. Falling back to defaults.",
                    path.display(),
                    err
                ));
            }
        }
    }

    let (config, mut sanitize_warnings) = sanitize_config(FileConfig::default());
    warnings.append(&mut sanitize_warnings);
    ConfigLoadResult {
        config,
        warnings,
        source: ConfigSource::Default,
    }
}

pub fn save_config(config: &FileConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, to_toml_string(config)?)?;
    Ok(())
}

pub fn to_toml_string(config: &FileConfig) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(config)?)
}

/// Applies `RUNROSTER_EVENT` and `RUNROSTER_TRACKER_URL` when set.
pub fn apply_env_overrides(config: &mut FileConfig) {
    apply_overrides(
        config,
        env::var(EVENT_ENV_VAR).ok(),
        env::var(TRACKER_URL_ENV_VAR).ok(),
    );
}

pub fn apply_overrides(config: &mut FileConfig, event: Option<String>, tracker_url: Option<String>) {
    if let Some(event) = event.filter(|value| !value.trim().is_empty()) {
        config.upstream.event = EventRef::parse(&event);
    }
    if let Some(url) = tracker_url.filter(|value| !value.trim().is_empty()) {
        config.upstream.tracker_url = url.trim().to_string();
    }
}

fn sanitize_config(mut config: FileConfig) -> (FileConfig, Vec<String>) {
    let mut warnings = Vec::new();

    if config.schema_version != CURRENT_SCHEMA_VERSION {
        warnings.push(format!(
            "Unknown schema version {}; reading as version {}.",
            config.schema_version, CURRENT_SCHEMA_VERSION
        ));
        config.schema_version = CURRENT_SCHEMA_VERSION;
    }

    if config.upstream.event.is_unset() {
        warnings.push(format!(
            "No event configured; set upstream.event or {EVENT_ENV_VAR}."
        ));
    }

    if config.schedule.period_minutes == 0 {
        warnings.push("schedule.period_minutes must be positive; using 1.".to_string());
        config.schedule.period_minutes = 1;
    }
    if config.donations.period_seconds == 0 {
        warnings.push("donations.period_seconds must be positive; using 1.".to_string());
        config.donations.period_seconds = 1;
    }
    if config.schedule.char_limit == 0 {
        warnings.push(format!(
            "schedule.char_limit must be positive; using {}.",
            crate::pages::DEFAULT_CHAR_LIMIT
        ));
        config.schedule.char_limit = crate::pages::DEFAULT_CHAR_LIMIT;
    }
    if config.schedule.lookback_margin_hours > MAX_WINDOW_HOURS {
        warnings.push(format!(
            "schedule.lookback_margin_hours is too large; using {MAX_WINDOW_HOURS}."
        ));
        config.schedule.lookback_margin_hours = MAX_WINDOW_HOURS;
    }
    if config.ties.retention_hours == 0 {
        warnings.push("ties.retention_hours must be positive; using 1.".to_string());
        config.ties.retention_hours = 1;
    } else if config.ties.retention_hours > MAX_WINDOW_HOURS {
        warnings.push(format!(
            "ties.retention_hours is too large; using {MAX_WINDOW_HOURS}."
        ));
        config.ties.retention_hours = MAX_WINDOW_HOURS;
    }
    if config.schedule.destinations.is_empty() {
        warnings.push("No schedule destinations configured; schedule sync will do nothing.".to_string());
    }

    if let Some(name) = config.schedule.timezone.clone() {
        if name.parse::<Tz>().is_err() {
            warnings.push(format!(
                "Unknown timezone '{name}'; using the event's timezone."
            ));
            config.schedule.timezone = None;
        }
    }

    if let Some(thresholds) = config.donations.thresholds.take() {
        let original_len = thresholds.len();
        let mut cleaned: Vec<f64> = thresholds
            .into_iter()
            .filter(|value| value.is_finite() && *value > 0.0)
            .collect();
        cleaned.sort_by(f64::total_cmp);
        cleaned.dedup();
        if cleaned.len() != original_len {
            warnings.push(format!(
                "Dropped {} invalid or duplicate donation thresholds.",
                original_len - cleaned.len()
            ));
        }
        config.donations.thresholds = Some(cleaned);
    }

    let entered = config.donations.predictions.len();
    config.donations.predictions.retain(|guess| {
        guess.amount.is_finite() && guess.ceiling.is_none_or(f64::is_finite)
    });
    if config.donations.predictions.len() != entered {
        warnings.push(format!(
            "Dropped {} predictions with invalid amounts.",
            entered - config.donations.predictions.len()
        ));
    }

    if let Err(err) = config.donations.target_watch() {
        warnings.push(format!("Disabling donations.target_alerts: {err}."));
        config.donations.target_alerts = None;
    }

    (config, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_file_uses_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config, FileConfig::default());
        assert_eq!(config.schedule.period(), Duration::from_secs(300));
        assert_eq!(config.donations.period(), Duration::from_secs(10));
        assert_eq!(config.schedule.lookback_margin(), chrono::Duration::hours(24));
    }

    #[test]
    fn event_accepts_id_or_short_code() {
        let by_id: FileConfig = toml::from_str("[upstream]\nevent = 47\n").unwrap();
        assert_eq!(by_id.upstream.event, EventRef::Id(47));

        let by_short: FileConfig = toml::from_str("[upstream]\nevent = \"agdq2025\"\n").unwrap();
        assert_eq!(
            by_short.upstream.event,
            EventRef::Short("agdq2025".to_string())
        );
    }

    #[test]
    fn sanitize_fixes_zero_periods() {
        let mut config = FileConfig::default();
        config.upstream.event = EventRef::Id(1);
        config.schedule.period_minutes = 0;
        config.donations.period_seconds = 0;

        let (sanitized, warnings) = sanitize_config(config);

        assert_eq!(sanitized.schedule.period_minutes, 1);
        assert_eq!(sanitized.donations.period_seconds, 1);
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn sanitize_clamps_oversized_windows() {
        let raw = "[upstream]\nevent = 1\n\n[schedule]\nlookback_margin_hours = 100000000000000000\n\n[ties]\nretention_hours = 100000000000000000\n";
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, raw).expect("write fixture");

        let loaded = load_config_from(&path);

        assert_eq!(loaded.config.schedule.lookback_margin_hours, MAX_WINDOW_HOURS);
        assert_eq!(loaded.config.ties.retention_hours, MAX_WINDOW_HOURS);
        assert_eq!(loaded.warnings.len(), 2, "{:?}", loaded.warnings);
        assert_eq!(
            loaded.config.ties.retention(),
            chrono::Duration::hours(MAX_WINDOW_HOURS as i64)
        );
        assert_eq!(
            loaded.config.schedule.lookback_margin(),
            chrono::Duration::hours(MAX_WINDOW_HOURS as i64)
        );
    }

    #[test]
    fn sanitize_raises_zero_retention() {
        let mut config = FileConfig::default();
        config.upstream.event = EventRef::Id(1);
        config.ties.retention_hours = 0;

        let (sanitized, warnings) = sanitize_config(config);

        assert_eq!(sanitized.ties.retention_hours, 1);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn accessors_cap_unsanitized_windows() {
        let mut config = FileConfig::default();
        config.schedule.lookback_margin_hours = u64::MAX;
        config.ties.retention_hours = u64::MAX;

        let cap = chrono::Duration::hours(MAX_WINDOW_HOURS as i64);
        assert_eq!(config.schedule.lookback_margin(), cap);
        assert_eq!(config.ties.retention(), cap);
    }

    #[test]
    fn prediction_game_and_target_alerts_from_toml() {
        let raw = r#"
[upstream]
event = 1

[donations.target_alerts]
near = 500.0

[[donations.predictions]]
participant = "alice"
amount = 1500000.0

[[donations.predictions]]
participant = "bob"
amount = 2000000.0
ceiling = 2100000.0
"#;
        let config: FileConfig = toml::from_str(raw).unwrap();
        let (config, warnings) = sanitize_config(config);
        assert!(warnings.is_empty(), "{warnings:?}");

        let alerts = config.donations.target_alerts.as_ref().unwrap();
        assert_eq!(alerts.step, 25_000.0);
        assert_eq!(alerts.near, 500.0);
        assert!(config.donations.target_watch().unwrap().is_some());

        let game = config.donations.prediction_game().unwrap().unwrap();
        assert_eq!(game.len(), 2);
        assert_eq!(config.donations.predictions[1].ceiling, Some(2_100_000.0));

        let reparsed: FileConfig = toml::from_str(&to_toml_string(&config).unwrap()).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn sanitize_disables_bad_target_alerts_and_drops_bad_predictions() {
        let mut config = FileConfig::default();
        config.upstream.event = EventRef::Id(1);
        config.donations.target_alerts = Some(TargetAlertConfig {
            step: 25_000.0,
            near: 50.0,
            imminent: 100.0,
        });
        config.donations.predictions = vec![
            Prediction::new("alice", 1000.0),
            Prediction::new("bob", f64::INFINITY),
        ];

        let (sanitized, warnings) = sanitize_config(config);

        assert_eq!(sanitized.donations.target_alerts, None);
        assert_eq!(sanitized.donations.predictions.len(), 1);
        assert_eq!(warnings.len(), 2, "{warnings:?}");
        assert!(sanitized.donations.target_watch().unwrap().is_none());
    }

    #[test]
    fn sanitize_sorts_and_dedups_thresholds() {
        let mut config = FileConfig::default();
        config.upstream.event = EventRef::Id(1);
        config.donations.thresholds = Some(vec![3000.0, 1000.0, f64::NAN, 1000.0, -5.0, 2000.0]);

        let (sanitized, warnings) = sanitize_config(config);

        assert_eq!(
            sanitized.donations.thresholds,
            Some(vec![1000.0, 2000.0, 3000.0])
        );
        assert!(
            warnings.iter().any(|w| w.contains("Dropped 3")),
            "unexpected warnings: {warnings:?}"
        );
    }

    #[test]
    fn sanitize_drops_unknown_timezone() {
        let mut config = FileConfig::default();
        config.upstream.event = EventRef::Id(1);
        config.schedule.timezone = Some("Mars/Olympus_Mons".to_string());

        let (sanitized, warnings) = sanitize_config(config);

        assert_eq!(sanitized.schedule.timezone, None);
        assert!(warnings.iter().any(|w| w.contains("Unknown timezone")));
    }

    #[test]
    fn sanitize_warns_without_event() {
        let (_, warnings) = sanitize_config(FileConfig::default());
        assert!(warnings.iter().any(|w| w.contains("No event configured")));
    }

    #[test]
    fn overrides_replace_event_and_url() {
        let mut config = FileConfig::default();
        apply_overrides(
            &mut config,
            Some("  sgdq2025 ".to_string()),
            Some("http://localhost:8000/search/".to_string()),
        );
        assert_eq!(config.upstream.event, EventRef::Short("sgdq2025".to_string()));
        assert_eq!(config.upstream.tracker_url, "http://localhost:8000/search/");

        apply_overrides(&mut config, Some("52".to_string()), Some("  ".to_string()));
        assert_eq!(config.upstream.event, EventRef::Id(52));
        assert_eq!(config.upstream.tracker_url, "http://localhost:8000/search/");
    }

    #[test]
    fn save_then_load_round_trips() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("config.toml");

        let mut config = FileConfig::default();
        config.upstream.event = EventRef::Short("agdq2025".to_string());
        config.schedule.destinations = vec!["schedule".to_string(), "mirror".to_string()];
        config.donations.thresholds = Some(vec![1000.0, 5000.0]);
        save_config(&config, &path).expect("save config");

        let loaded = load_config_from(&path);
        assert_eq!(loaded.source, ConfigSource::File);
        assert!(loaded.warnings.is_empty(), "{:?}", loaded.warnings);
        assert_eq!(loaded.config, config);
    }

    #[test]
    fn unreadable_toml_falls_back_to_defaults() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "schedule = [not toml").expect("write fixture");

        let loaded = load_config_from(&path);
        assert_eq!(loaded.source, ConfigSource::Default);
        assert!(loaded.warnings.iter().any(|w| w.contains("Failed to parse")));
    }
}
