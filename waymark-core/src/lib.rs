mod bridge;
mod config;
mod error;
mod history;
mod host;
mod notify;
mod position;
mod provider;
mod service;
mod store;
mod tracker;

pub use bridge::{PositionBridge, Subscription};
pub use config::TrackingConfig;
pub use error::LocationError;
pub use history::{ClearOutcome, LocationLog, LogEntry};
pub use host::{FixSender, HostError, ProviderHost, UpdateRequest};
pub use notify::{NotificationState, StatusNotifier};
pub use position::{Position, ProviderKind};
pub use provider::{PositionProvider, ProviderPhase, TrackingSession};
pub use service::{LocationService, ResyncedState};
pub use store::KeyValueStore;
pub use tracker::{
    ExportOutcome, Permission, PermissionPrompt, ShareSink, Tracker, TrackerUiState, UiNotifier,
};
