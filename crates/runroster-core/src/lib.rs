//! Core library crate: schedule rendering and synchronization, donation
//! milestones and games, tie detection and the loops that drive them.

pub mod claims;
pub mod config;
pub mod destination;
pub mod donations;
pub mod error;
pub mod logging;
pub mod milestone;
pub mod model;
pub mod pages;
pub mod poll;
pub mod prediction;
pub mod reconcile;
pub mod render;
pub mod target;
pub mod tie;
pub mod tracker;

pub use claims::{ClaimVerdict, judge_claim, parse_claim};
pub use config::{
    ConfigError, ConfigLoadResult, ConfigSource, DonationConfig, EventRef, FileConfig,
    MAX_WINDOW_HOURS, ScheduleConfig, TargetAlertConfig, TieConfig, UpstreamConfig,
    apply_env_overrides, config_directory, config_path, load_config, load_config_from,
    save_config, to_toml_string,
};
pub use destination::{
    Destination, DestinationMessage, DestinationOp, MemoryDestination, MessageHandle,
};
pub use donations::DonationWindow;
pub use error::{ApplyError, DataShapeError, DestinationError, TickError, TransportError, UpstreamError};
pub use logging::{LoggingDestination, LoggingError, current_log_path, init_logging};
pub use milestone::{
    MilestoneTracker, ThresholdCrossed, ThresholdError, compact_label, default_thresholds,
};
pub use model::{BidEntry, BidOption, BidState, EventInfo, RunEntry, Snapshot};
pub use pages::{
    CURRENT_RUN_MARKER, CardField, Page, PageRenderer, PageSet, PageSetError, StatusCard,
    split_body,
};
pub use poll::{
    Announcement, AnnouncementSink, DonationLoop, LogSink, MemorySink, ScheduleLoop,
    run_ping_listener,
};
pub use prediction::{Prediction, PredictionError, PredictionGame, PredictionSurpassed};
pub use reconcile::{
    DestinationOutcome, LookbackWindow, MessageRef, Mutation, Plan, SyncReport, apply_plan, plan,
    synchronize_all, synchronize_destination,
};
pub use render::ScheduleRenderer;
pub use target::{Proximity, TargetApproach, TargetError, TargetWatch};
pub use tie::{ParticipantId, Ping, TieEvent, TieTracker};
pub use tracker::{TrackerClient, Upstream};
