use std::path::PathBuf;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::{RwLock, mpsc};

use crate::{
    config::TrackingConfig,
    error::LocationError,
    history::{ClearOutcome, LocationLog, LogEntry},
    host::ProviderHost,
    notify::StatusNotifier,
    position::Position,
    service::LocationService,
    store::KeyValueStore,
};

/// Permissions the tracker asks for before it starts watching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    FineLocation,
    CoarseLocation,
    PostNotifications,
}

/// Seam to the platform permission prompt.
pub trait PermissionPrompt: Send + Sync + 'static {
    /// Ask the user for `wanted`, returning the subset they granted.
    fn request(&self, wanted: &[Permission]) -> impl Future<Output = Vec<Permission>> + Send;
}

/// Seam to the platform's file hand-off: write the export somewhere
/// user-visible and run the share action.
pub trait ShareSink: Send + Sync + 'static {
    /// Returns the path the file landed at. [LocationError::UserCancelled]
    /// means the user backed out of the share dialog.
    fn export(
        &self,
        file_name: &str,
        contents: &str,
    ) -> impl Future<Output = Result<PathBuf, LocationError>> + Send;
}

/// Pinged whenever [TrackerUiState] changes so a frontend can re-render.
pub trait UiNotifier: Send + Sync + 'static {
    fn notify(&self);
}

/// What a frontend needs to render the tracking screen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerUiState {
    pub current: Option<Position>,
    pub tracking: bool,
    pub loading: bool,
    pub error: Option<String>,
}

/// Outcome of a CSV export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Exported(PathBuf),
    /// The log was empty, nothing was written.
    NoData,
    /// The user backed out of the share dialog.
    Cancelled,
}

/// Drives the tracking screen. Owns the UI snapshot and the travel log;
/// every [LocationService] error is translated into an operator-facing
/// message before it lands in the snapshot.
pub struct Tracker<H, N, S, P, Sh, U>
where
    H: ProviderHost,
    N: StatusNotifier,
    S: KeyValueStore,
    P: PermissionPrompt,
    Sh: ShareSink,
    U: UiNotifier,
{
    service: LocationService<H, N, S>,
    log: Arc<LocationLog<S>>,
    store: Arc<S>,
    config: TrackingConfig,
    prompt: P,
    share: Sh,
    notifier: Arc<U>,
    ui: Arc<RwLock<TrackerUiState>>,
}

impl<H, N, S, P, Sh, U> Tracker<H, N, S, P, Sh, U>
where
    H: ProviderHost,
    N: StatusNotifier,
    S: KeyValueStore,
    P: PermissionPrompt,
    Sh: ShareSink,
    U: UiNotifier,
{
    pub fn new(
        service: LocationService<H, N, S>,
        store: Arc<S>,
        config: TrackingConfig,
        prompt: P,
        share: Sh,
        notifier: U,
    ) -> Self {
        let log = if config.persist_log {
            LocationLog::persisted(store.clone(), &config.log_key)
        } else {
            LocationLog::new()
        };
        Self {
            service,
            log: Arc::new(log),
            store,
            config,
            prompt,
            share,
            notifier: Arc::new(notifier),
            ui: Arc::new(RwLock::new(TrackerUiState::default())),
        }
    }

    /// Adopt persisted and provider state. Call once at startup, before the
    /// stored tracking flag is trusted for anything.
    pub async fn sync(&self) {
        match self.service.sync_tracking_state().await {
            Ok(resynced) => {
                let mut ui = self.ui.write().await;
                ui.tracking = resynced.tracking;
                ui.current = resynced.last_position;
                drop(ui);
                self.notifier.notify();
            }
            Err(why) => warn!("couldn't sync tracking state: {why}"),
        }
    }

    /// Wire the screen up: ask for permissions, install the position
    /// handler, and do the initial location read.
    ///
    /// Denied permissions are only warned about here; the actual failure
    /// surfaces when tracking is started.
    pub async fn attach(&self) -> Result<(), LocationError> {
        let wanted = [
            Permission::FineLocation,
            Permission::CoarseLocation,
            Permission::PostNotifications,
        ];
        let granted = self.prompt.request(&wanted).await;
        for permission in wanted {
            if !granted.contains(&permission) {
                warn!("{permission:?} was not granted");
            }
        }

        let feed = self.spawn_feed();
        self.service
            .subscribe_to_updates(move |position| {
                feed.send(position).ok();
            })
            .await?;

        self.refresh().await;
        Ok(())
    }

    /// Tear down the position handler. Tracking itself keeps running in the
    /// background until explicitly stopped.
    pub async fn detach(&self) {
        self.service.unsubscribe_from_updates().await;
    }

    /// One-shot location read, mirrored into the log and the UI snapshot.
    pub async fn refresh(&self) {
        self.begin_op().await;
        match self.service.current_location().await {
            Ok(position) => {
                self.record_position(position).await;
                self.finish_op(None).await;
            }
            Err(why) => {
                error!("couldn't read current location: {why}");
                self.finish_op(Some(why.user_message())).await;
            }
        }
    }

    pub async fn start_tracking(&self) {
        self.begin_op().await;
        match self.service.start_location_updates().await {
            Ok(()) => {
                self.ui.write().await.tracking = true;
                info!("location tracking is now active");
                self.finish_op(None).await;
            }
            Err(why) => {
                error!("couldn't start tracking: {why}");
                self.finish_op(Some(why.user_message())).await;
            }
        }
    }

    pub async fn stop_tracking(&self) {
        self.begin_op().await;
        match self.service.stop_location_updates().await {
            Ok(()) => {
                self.ui.write().await.tracking = false;
                info!("location tracking has stopped");
                self.finish_op(None).await;
            }
            Err(why) => {
                error!("couldn't stop tracking: {why}");
                self.finish_op(Some(why.user_message())).await;
            }
        }
    }

    /// Export the travel log as CSV through the platform share surface.
    /// An empty log and a user cancel are both reported as outcomes, not
    /// errors.
    pub async fn export_csv(&self) -> Result<ExportOutcome, LocationError> {
        if self.log.is_empty().await {
            info!("no travel log to export");
            return Ok(ExportOutcome::NoData);
        }

        let csv = self.log.to_csv().await;
        match self.share.export(&self.config.export_file_name, &csv).await {
            Ok(path) => {
                info!("travel log exported to {}", path.display());
                Ok(ExportOutcome::Exported(path))
            }
            Err(LocationError::UserCancelled) => {
                info!("export cancelled from the share dialog");
                Ok(ExportOutcome::Cancelled)
            }
            Err(why) => {
                error!("export failed: {why}");
                Err(why)
            }
        }
    }

    /// Wipe the travel log.
    pub async fn clear_logs(&self) -> ClearOutcome {
        let outcome = self.log.clear().await;
        match outcome {
            ClearOutcome::Cleared(count) => {
                info!("cleared {count} travel log entries");
                self.notifier.notify();
            }
            ClearOutcome::AlreadyEmpty => info!("no travel log entries to clear"),
        }
        outcome
    }

    pub async fn ui_state(&self) -> TrackerUiState {
        self.ui.read().await.clone()
    }

    pub async fn log_count(&self) -> usize {
        self.log.len().await
    }

    pub async fn log_entries(&self) -> Vec<LogEntry> {
        self.log.entries().await
    }

    /// Consumer task for streamed positions. It ends on its own once the
    /// handler feeding it is torn down.
    fn spawn_feed(&self) -> mpsc::UnboundedSender<Position> {
        let (feed_tx, mut feed_rx) = mpsc::unbounded_channel::<Position>();
        let log = self.log.clone();
        let store = self.store.clone();
        let blob_key = self.config.last_position_key.clone();
        let ui = self.ui.clone();
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            while let Some(position) = feed_rx.recv().await {
                Self::record(&log, &store, &blob_key, &ui, position).await;
                notifier.notify();
            }
        });
        feed_tx
    }

    async fn record_position(&self, position: Position) {
        Self::record(
            &self.log,
            &self.store,
            &self.config.last_position_key,
            &self.ui,
            position,
        )
        .await;
    }

    /// Every position that reaches the screen is appended to the log and
    /// persisted as the last-position blob before the snapshot moves.
    async fn record(
        log: &LocationLog<S>,
        store: &Arc<S>,
        blob_key: &str,
        ui: &RwLock<TrackerUiState>,
        position: Position,
    ) {
        log.append(LogEntry::from_position(&position)).await;
        match serde_json::to_string(&position) {
            Ok(blob) => store.set(blob_key, &blob),
            Err(why) => warn!("couldn't encode the position blob: {why}"),
        }
        ui.write().await.current = Some(position);
    }

    async fn begin_op(&self) {
        let mut ui = self.ui.write().await;
        ui.loading = true;
        ui.error = None;
        drop(ui);
        self.notifier.notify();
    }

    async fn finish_op(&self, error: Option<String>) {
        let mut ui = self.ui.write().await;
        ui.loading = false;
        ui.error = error;
        drop(ui);
        self.notifier.notify();
    }
}
