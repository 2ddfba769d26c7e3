use std::sync::Arc;

use log::{debug, error, info};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_util::sync::CancellationToken;

use crate::{
    bridge::{PositionBridge, Subscription},
    config::TrackingConfig,
    error::LocationError,
    host::{ProviderHost, UpdateRequest},
    notify::{NotificationState, StatusNotifier},
    position::{Position, ProviderKind},
};

/// Lifecycle of the provider's platform registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderPhase {
    /// No registrations, no pump task.
    #[default]
    Idle,
    /// Registrations are being set up.
    Subscribing,
    /// Registered and streaming.
    Active,
}

/// Mutable tracking state, shared with the pump task.
#[derive(Debug, Clone, Default)]
pub struct TrackingSession {
    pub phase: ProviderPhase,
    /// Most recent fix accepted by the distance filter, or seeded from a
    /// last-known read.
    pub last_position: Option<Position>,
    /// Backends with a live registration.
    pub providers: Vec<ProviderKind>,
}

impl TrackingSession {
    pub fn active(&self) -> bool {
        self.phase == ProviderPhase::Active
    }
}

/// Owns the platform location registrations, applies the acceptance policy,
/// and fans accepted fixes out through a [PositionBridge].
///
/// One of these lives for the whole process, like the platform module it
/// wraps. Facades are rebuilt around it on every app start and read
/// registration state from here, never from a persisted flag.
pub struct PositionProvider<H: ProviderHost, N: StatusNotifier> {
    host: Arc<H>,
    notifier: Arc<N>,
    config: TrackingConfig,
    bridge: PositionBridge,
    session: Arc<RwLock<TrackingSession>>,
    pump: Mutex<Option<CancellationToken>>,
}

impl<H: ProviderHost, N: StatusNotifier> PositionProvider<H, N> {
    pub fn new(host: Arc<H>, notifier: Arc<N>, config: TrackingConfig) -> Self {
        Self {
            host,
            notifier,
            config,
            bridge: PositionBridge::new(),
            session: Arc::new(RwLock::new(TrackingSession::default())),
            pump: Mutex::new(None),
        }
    }

    /// Register with every enabled backend and start streaming fixes.
    ///
    /// Calling while already streaming is a no-op success; a failure rolls
    /// every registration back so the session never half-starts. On success
    /// the cache is seeded from the platform's last-known fixes and the
    /// tracking notification goes up immediately.
    pub async fn start_updates(&self) -> Result<(), LocationError> {
        let mut session = self.session.write().await;
        if session.phase != ProviderPhase::Idle {
            debug!("location updates already running");
            return Ok(());
        }

        if !self.host.permission_granted() {
            return Err(LocationError::PermissionDenied);
        }

        let enabled = ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.host.provider_enabled(*kind))
            .collect::<Vec<_>>();
        if enabled.is_empty() {
            return Err(LocationError::ProvidersUnavailable);
        }

        session.phase = ProviderPhase::Subscribing;

        let request = UpdateRequest {
            min_interval_ms: self.config.min_interval_ms,
            min_distance_m: self.config.min_distance_m,
        };
        let (fix_tx, fix_rx) = mpsc::unbounded_channel();

        for kind in &enabled {
            let registered = self
                .host
                .request_updates(*kind, request, fix_tx.clone())
                .await;
            if let Err(why) = registered {
                error!("{kind} registration failed: {why}");
                // Roll back whatever did register.
                self.host.remove_updates().await;
                session.phase = ProviderPhase::Idle;
                return Err(LocationError::ProviderInit(why.to_string()));
            }
        }

        // Seed the cache so the first streamed fix is filtered against
        // something and the notification starts out with coordinates.
        if let Some(seed) = self.read_last_known(&enabled).await {
            session.last_position = Some(apply_read(session.last_position, seed));
        }

        let pump = FixPump {
            session: self.session.clone(),
            bridge: self.bridge.clone(),
            notifier: self.notifier.clone(),
            min_distance_m: self.config.min_distance_m,
        };
        let cancel = CancellationToken::new();
        tokio::spawn(pump.run(fix_rx, cancel.clone()));
        *self.pump.lock().await = Some(cancel);

        self.notifier.show(match session.last_position {
            Some(position) => NotificationState::Fix(position),
            None => NotificationState::AwaitingFix,
        });

        session.phase = ProviderPhase::Active;
        session.providers = enabled;
        info!(
            "location updates started on {} provider(s)",
            session.providers.len()
        );
        Ok(())
    }

    /// Unregister everything and take the notification down. Calling while
    /// already stopped is a no-op.
    pub async fn stop_updates(&self) {
        let mut session = self.session.write().await;
        if session.phase == ProviderPhase::Idle {
            debug!("location updates already stopped");
            return;
        }
        session.phase = ProviderPhase::Idle;
        session.providers.clear();
        if let Some(cancel) = self.pump.lock().await.take() {
            cancel.cancel();
        }
        drop(session);

        self.host.remove_updates().await;
        self.notifier.clear();
        info!("location updates stopped");
    }

    /// One-shot read of the best fix the enabled backends currently hold.
    ///
    /// An empty read fails outright rather than falling back to the cache;
    /// a successful one refreshes the cache unless its accuracy exactly
    /// matches the cached fix, in which case the cached fix stands.
    pub async fn current_location(&self) -> Result<Position, LocationError> {
        let enabled = ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.host.provider_enabled(*kind))
            .collect::<Vec<_>>();

        match self.read_last_known(&enabled).await {
            Some(read) => {
                let mut session = self.session.write().await;
                let resolved = apply_read(session.last_position, read);
                session.last_position = Some(resolved);
                Ok(resolved)
            }
            None => Err(LocationError::NoLocationAvailable),
        }
    }

    /// Live registration state, straight from the session.
    pub async fn is_active(&self) -> bool {
        self.session.read().await.active()
    }

    pub async fn last_position(&self) -> Option<Position> {
        self.session.read().await.last_position
    }

    /// Snapshot of the tracking session.
    pub async fn session(&self) -> TrackingSession {
        self.session.read().await.clone()
    }

    /// Install `handler` as the sole consumer of accepted fixes.
    pub async fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(Position) + Send + 'static,
    {
        self.bridge.subscribe(handler).await
    }

    async fn read_last_known(&self, enabled: &[ProviderKind]) -> Option<Position> {
        let mut gps = None;
        let mut network = None;
        for kind in enabled {
            let fix = self.host.last_known(*kind).await;
            match kind {
                ProviderKind::Gps => gps = fix,
                ProviderKind::Network => network = fix,
                ProviderKind::Unknown => {}
            }
        }
        Position::best_of(gps, network)
    }
}

/// On-demand reads replace the cache unless their accuracy exactly matches
/// the cached fix, which stands on a tie.
fn apply_read(cached: Option<Position>, read: Position) -> Position {
    match cached {
        Some(cached) if cached.accuracy_m == read.accuracy_m => cached,
        _ => read,
    }
}

/// Consumer half of the fix stream. Runs on its own task from
/// [PositionProvider::start_updates] until cancelled.
struct FixPump<N: StatusNotifier> {
    session: Arc<RwLock<TrackingSession>>,
    bridge: PositionBridge,
    notifier: Arc<N>,
    min_distance_m: f64,
}

impl<N: StatusNotifier> FixPump<N> {
    async fn run(self, mut fixes: mpsc::UnboundedReceiver<Position>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                fix = fixes.recv() => match fix {
                    Some(position) => self.consume_fix(position).await,
                    None => break,
                },
            }
        }
        debug!("fix pump finished");
    }

    /// Acceptance policy: the first fix always lands, later ones must move
    /// at least the configured distance from the last accepted fix. Fixes
    /// still queued when the session leaves [ProviderPhase::Active] are
    /// dropped. Discards produce no event and no notification update.
    async fn consume_fix(&self, fix: Position) {
        let mut session = self.session.write().await;
        if !session.active() {
            debug!("discarded {} fix, session stopped", fix.provider);
            return;
        }
        if let Some(last) = session.last_position {
            let moved = last.distance_m(&fix);
            if moved < self.min_distance_m {
                debug!("discarded {} fix, moved {moved:.2}m", fix.provider);
                return;
            }
        }
        session.last_position = Some(fix);
        // stop_updates clears the notification only after acquiring this
        // lock, never between this show and the release.
        self.notifier.show(NotificationState::Fix(fix));
        drop(session);

        self.bridge.emit(fix).await;
        debug!(
            "accepted {} fix at {}, {}",
            fix.provider, fix.latitude, fix.longitude
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::tests::{MockHost, RecordingNotifier, drain, fix, north_of};
    use tokio::test;

    type TestProvider = PositionProvider<MockHost, RecordingNotifier>;

    fn rig(host: &Arc<MockHost>) -> (TestProvider, Arc<RecordingNotifier>) {
        rig_with(host, TrackingConfig::default())
    }

    fn rig_with(
        host: &Arc<MockHost>,
        config: TrackingConfig,
    ) -> (TestProvider, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let provider = PositionProvider::new(host.clone(), notifier.clone(), config);
        (provider, notifier)
    }

    #[test]
    async fn start_requires_the_location_permission() {
        let host = MockHost::ready();
        host.set_permission(false);
        let (provider, notifier) = rig(&host);

        let result = provider.start_updates().await;
        assert_eq!(result, Err(LocationError::PermissionDenied));
        assert!(!provider.is_active().await, "session went active anyway");
        assert_eq!(host.registration_count().await, 0, "a provider was registered");
        assert_eq!(notifier.shown_count(), 0, "notification went up anyway");
    }

    #[test]
    async fn start_requires_at_least_one_enabled_provider() {
        let host = MockHost::ready();
        host.set_enabled(ProviderKind::Gps, false);
        host.set_enabled(ProviderKind::Network, false);
        let (provider, _) = rig(&host);

        let result = provider.start_updates().await;
        assert_eq!(result, Err(LocationError::ProvidersUnavailable));
        assert!(!provider.is_active().await);
        assert_eq!(host.registration_count().await, 0, "a provider was registered");
    }

    #[test]
    async fn start_registers_every_enabled_provider() {
        let host = MockHost::ready();
        let (provider, notifier) = rig(&host);

        provider.start_updates().await.expect("Failed to start");

        assert!(provider.is_active().await);
        assert_eq!(host.registration_count().await, 2);
        assert_eq!(
            provider.session().await.providers,
            vec![ProviderKind::Gps, ProviderKind::Network],
        );
        // Nothing was cached, so the notification starts in the waiting state.
        assert_eq!(notifier.last_shown(), Some(NotificationState::AwaitingFix));
    }

    #[test]
    async fn start_skips_disabled_providers() {
        let host = MockHost::ready();
        host.set_enabled(ProviderKind::Network, false);
        let (provider, _) = rig(&host);

        provider.start_updates().await.expect("Failed to start");

        assert_eq!(host.registration_count().await, 1);
        assert_eq!(provider.session().await.providers, vec![ProviderKind::Gps]);
    }

    #[test]
    async fn double_start_keeps_a_single_registration_per_provider() {
        let host = MockHost::ready();
        let (provider, _) = rig(&host);

        provider.start_updates().await.expect("Failed to start");
        provider.start_updates().await.expect("Second start failed");
        assert_eq!(host.registration_count().await, 2, "providers registered twice");

        // A single pushed fix must reach the subscriber exactly once.
        let deliveries = Arc::new(AtomicUsize::new(0));
        let counter = deliveries.clone();
        provider
            .subscribe(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        host.push_fix(fix(10.0, 20.0, 5.0, 1, ProviderKind::Gps)).await;
        drain().await;
        assert_eq!(deliveries.load(Ordering::SeqCst), 1, "fix was duplicated");
    }

    #[test]
    async fn failed_registration_rolls_the_session_back() {
        let host = MockHost::ready();
        host.fail_requests(true);
        let (provider, notifier) = rig(&host);

        let result = provider.start_updates().await;
        assert!(
            matches!(result, Err(LocationError::ProviderInit(_))),
            "got {result:?}",
        );
        assert!(!provider.is_active().await, "session left half-started");
        assert_eq!(host.registration_count().await, 0);
        assert_eq!(notifier.shown_count(), 0);

        // The provider must be usable again once the platform recovers.
        host.fail_requests(false);
        provider.start_updates().await.expect("Failed to restart");
        assert!(provider.is_active().await);
    }

    #[test]
    async fn start_seeds_the_cache_from_last_known_fixes() {
        let host = MockHost::ready();
        let known = fix(12.0, 34.0, 4.0, 99, ProviderKind::Gps);
        host.set_last_known(known).await;
        let (provider, notifier) = rig(&host);

        provider.start_updates().await.expect("Failed to start");

        assert_eq!(provider.last_position().await, Some(known));
        assert_eq!(notifier.last_shown(), Some(NotificationState::Fix(known)));
    }

    #[test]
    async fn first_fix_lands_and_near_fixes_are_discarded() {
        let host = MockHost::ready();
        let (provider, notifier) = rig(&host);
        provider.start_updates().await.expect("Failed to start");

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        provider
            .subscribe(move |position| sink.lock().unwrap().push(position))
            .await;

        let first = fix(10.0, 20.0, 5.0, 1, ProviderKind::Gps);
        host.push_fix(first).await;
        drain().await;

        // Same spot and sub-threshold movement both get dropped.
        host.push_fix(first).await;
        host.push_fix(north_of(first, 0.5)).await;
        drain().await;

        let far = north_of(first, 1.5);
        host.push_fix(far).await;
        drain().await;

        assert_eq!(*seen.lock().unwrap(), vec![first, far], "filter let the wrong fixes through");
        assert_eq!(provider.last_position().await, Some(far));
        // Waiting notification, then one per accepted fix.
        assert_eq!(notifier.shown_count(), 3);
    }

    #[test]
    async fn distance_threshold_comes_from_the_config() {
        let host = MockHost::ready();
        let config = TrackingConfig {
            min_distance_m: 10.0,
            ..TrackingConfig::default()
        };
        let (provider, _) = rig_with(&host, config);
        provider.start_updates().await.expect("Failed to start");

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        provider
            .subscribe(move |position| sink.lock().unwrap().push(position))
            .await;

        let first = fix(10.0, 20.0, 5.0, 1, ProviderKind::Gps);
        host.push_fix(first).await;
        host.push_fix(north_of(first, 5.0)).await;
        let far = north_of(first, 12.0);
        host.push_fix(far).await;
        drain().await;

        assert_eq!(*seen.lock().unwrap(), vec![first, far]);
    }

    #[test]
    async fn fixes_from_both_providers_share_one_filter() {
        let host = MockHost::ready();
        let (provider, _) = rig(&host);
        provider.start_updates().await.expect("Failed to start");

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        provider
            .subscribe(move |position| sink.lock().unwrap().push(position))
            .await;

        let gps = fix(10.0, 20.0, 5.0, 1, ProviderKind::Gps);
        host.push_fix(gps).await;
        drain().await;

        // A network fix right next to the accepted GPS fix is filtered.
        let mut near = north_of(gps, 0.3);
        near.provider = ProviderKind::Network;
        host.push_fix(near).await;
        drain().await;

        let mut far = north_of(gps, 2.0);
        far.provider = ProviderKind::Network;
        host.push_fix(far).await;
        drain().await;

        assert_eq!(*seen.lock().unwrap(), vec![gps, far]);
    }

    #[test]
    async fn stop_unregisters_and_clears_the_notification() {
        let host = MockHost::ready();
        let (provider, notifier) = rig(&host);

        provider.start_updates().await.expect("Failed to start");
        provider.stop_updates().await;

        assert!(!provider.is_active().await);
        assert_eq!(host.registration_count().await, 0, "registrations survived stop");
        assert_eq!(notifier.cleared_count(), 1);

        // Stopping again changes nothing.
        provider.stop_updates().await;
        assert_eq!(notifier.cleared_count(), 1, "idempotent stop cleared twice");
    }

    #[test]
    async fn stopped_provider_ignores_late_fixes() {
        let host = MockHost::ready();
        let (provider, _) = rig(&host);
        provider.start_updates().await.expect("Failed to start");

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        provider
            .subscribe(move |position| sink.lock().unwrap().push(position))
            .await;

        provider.stop_updates().await;
        host.push_fix(fix(10.0, 20.0, 5.0, 1, ProviderKind::Gps)).await;
        drain().await;

        assert!(seen.lock().unwrap().is_empty(), "fix delivered after stop");
    }

    #[test]
    async fn pump_ignores_fixes_once_the_session_goes_idle() {
        // A fix still queued when the phase flips to Idle must not touch
        // the cache, the bridge, or the notification.
        let cached = fix(10.0, 20.0, 5.0, 1, ProviderKind::Gps);
        let session = Arc::new(RwLock::new(TrackingSession {
            phase: ProviderPhase::Idle,
            last_position: Some(cached),
            providers: Vec::new(),
        }));
        let notifier = Arc::new(RecordingNotifier::default());
        let pump = FixPump {
            session: session.clone(),
            bridge: PositionBridge::new(),
            notifier: notifier.clone(),
            min_distance_m: 1.0,
        };

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        pump.bridge
            .subscribe(move |position| sink.lock().unwrap().push(position))
            .await;

        pump.consume_fix(north_of(cached, 50.0)).await;
        drain().await;

        assert!(seen.lock().unwrap().is_empty(), "stopped pump delivered a fix");
        assert_eq!(session.read().await.last_position, Some(cached));
        assert_eq!(notifier.shown_count(), 0, "stopped pump re-showed the notification");
    }

    #[test]
    async fn current_location_picks_the_more_accurate_read() {
        let host = MockHost::ready();
        let (provider, _) = rig(&host);

        let gps = fix(10.0, 20.0, 5.0, 1, ProviderKind::Gps);
        let network = fix(10.1, 20.1, 15.0, 2, ProviderKind::Network);
        host.set_last_known(gps).await;
        host.set_last_known(network).await;

        assert_eq!(provider.current_location().await, Ok(gps));

        let sharper_network = fix(10.2, 20.2, 2.0, 3, ProviderKind::Network);
        host.set_last_known(sharper_network).await;
        assert_eq!(provider.current_location().await, Ok(sharper_network));
    }

    #[test]
    async fn current_location_ignores_disabled_providers() {
        let host = MockHost::ready();
        host.set_enabled(ProviderKind::Gps, false);

        let gps = fix(10.0, 20.0, 1.0, 1, ProviderKind::Gps);
        let network = fix(10.1, 20.1, 15.0, 2, ProviderKind::Network);
        host.set_last_known(gps).await;
        host.set_last_known(network).await;

        let (provider, _) = rig(&host);
        assert_eq!(
            provider.current_location().await,
            Ok(network),
            "read consulted a disabled provider",
        );
    }

    #[test]
    async fn current_location_fails_without_touching_the_cache() {
        let host = MockHost::ready();
        let (provider, _) = rig(&host);
        provider.start_updates().await.expect("Failed to start");

        let accepted = fix(10.0, 20.0, 5.0, 1, ProviderKind::Gps);
        host.push_fix(accepted).await;
        drain().await;
        assert_eq!(provider.last_position().await, Some(accepted));

        // No last-known reads anywhere: the call fails, the cache stands.
        let result = provider.current_location().await;
        assert_eq!(result, Err(LocationError::NoLocationAvailable));
        assert_eq!(provider.last_position().await, Some(accepted));
    }

    #[test]
    async fn equal_accuracy_reads_keep_the_cached_fix() {
        let host = MockHost::ready();
        let (provider, _) = rig(&host);
        provider.start_updates().await.expect("Failed to start");

        let cached = fix(10.0, 20.0, 7.0, 1, ProviderKind::Gps);
        host.push_fix(cached).await;
        drain().await;

        let mut same_accuracy = north_of(cached, 50.0);
        same_accuracy.timestamp_ms = 2;
        host.set_last_known(same_accuracy).await;

        assert_eq!(
            provider.current_location().await,
            Ok(cached),
            "equal-accuracy read displaced the cache",
        );
        assert_eq!(provider.last_position().await, Some(cached));

        let mut sharper = north_of(cached, 60.0);
        sharper.accuracy_m = 3.0;
        host.set_last_known(sharper).await;
        assert_eq!(provider.current_location().await, Ok(sharper));
        assert_eq!(provider.last_position().await, Some(sharper));
    }

    #[test]
    async fn registration_request_carries_the_configured_thresholds() {
        let host = MockHost::ready();
        let config = TrackingConfig {
            min_interval_ms: 4_000,
            min_distance_m: 2.5,
            ..TrackingConfig::default()
        };
        let (provider, _) = rig_with(&host, config);

        provider.start_updates().await.expect("Failed to start");

        let requests = host.recorded_requests().await;
        assert_eq!(requests.len(), 2);
        for request in requests {
            assert_eq!(request.min_interval_ms, 4_000);
            assert_eq!(request.min_distance_m, 2.5);
        }
    }
}
