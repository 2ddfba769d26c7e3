use std::sync::Arc;

use log::{info, warn};
use tokio::sync::Mutex;

use crate::{
    bridge::Subscription,
    config::TrackingConfig,
    error::LocationError,
    host::ProviderHost,
    notify::StatusNotifier,
    position::Position,
    provider::PositionProvider,
    store::KeyValueStore,
};

/// Snapshot handed back by [LocationService::sync_tracking_state].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResyncedState {
    /// Whether the provider is actually streaming right now.
    pub tracking: bool,
    /// Best known position: the provider's live cache when it has one,
    /// otherwise the persisted blob.
    pub last_position: Option<Position>,
}

/// App-facing entry point to the tracking subsystem.
///
/// Built once per app process over a [PositionProvider] that may outlive
/// it. The provider capability is checked at construction: a facade built
/// [LocationService::detached] fails every operation with
/// [LocationError::ModuleUnavailable], which is what platforms without a
/// location module get.
pub struct LocationService<H: ProviderHost, N: StatusNotifier, S: KeyValueStore> {
    provider: Option<Arc<PositionProvider<H, N>>>,
    store: Arc<S>,
    config: TrackingConfig,
    subscription: Mutex<Option<Subscription>>,
}

impl<H: ProviderHost, N: StatusNotifier, S: KeyValueStore> LocationService<H, N, S> {
    /// Facade over a working provider.
    pub fn new(
        provider: Arc<PositionProvider<H, N>>,
        store: Arc<S>,
        config: TrackingConfig,
    ) -> Self {
        Self {
            provider: Some(provider),
            store,
            config,
            subscription: Mutex::new(None),
        }
    }

    /// Facade for builds with no location module.
    pub fn detached(store: Arc<S>, config: TrackingConfig) -> Self {
        warn!("no location module, facade is detached");
        Self {
            provider: None,
            store,
            config,
            subscription: Mutex::new(None),
        }
    }

    fn provider(&self) -> Result<&Arc<PositionProvider<H, N>>, LocationError> {
        self.provider
            .as_ref()
            .ok_or(LocationError::ModuleUnavailable)
    }

    pub async fn start_location_updates(&self) -> Result<(), LocationError> {
        self.provider()?.start_updates().await?;
        self.store.set(&self.config.tracking_flag_key, "true");
        Ok(())
    }

    pub async fn stop_location_updates(&self) -> Result<(), LocationError> {
        self.provider()?.stop_updates().await;
        self.store.set(&self.config.tracking_flag_key, "false");
        Ok(())
    }

    pub async fn current_location(&self) -> Result<Position, LocationError> {
        self.provider()?.current_location().await
    }

    /// Registration state as the provider sees it, never the persisted flag.
    pub async fn is_tracking_active(&self) -> Result<bool, LocationError> {
        Ok(self.provider()?.is_active().await)
    }

    /// Reconcile persisted state with the provider after an app restart.
    /// Call once at startup, before anything trusts the stored flag.
    pub async fn sync_tracking_state(&self) -> Result<ResyncedState, LocationError> {
        let provider = self.provider()?;

        let stored_flag = self
            .store
            .get(&self.config.tracking_flag_key)
            .map(|raw| raw == "true")
            .unwrap_or(false);
        let stored_position = self
            .store
            .get(&self.config.last_position_key)
            .and_then(|raw| serde_json::from_str::<Position>(&raw).ok());

        let tracking = provider.is_active().await;
        if tracking != stored_flag {
            info!("stored tracking flag was stale ({stored_flag}), reconciled to {tracking}");
            self.store
                .set(&self.config.tracking_flag_key, if tracking { "true" } else { "false" });
        }

        let last_position = provider.last_position().await.or(stored_position);

        Ok(ResyncedState {
            tracking,
            last_position,
        })
    }

    /// Install `handler` as the sole position subscriber, tearing down any
    /// handler installed through this facade first.
    pub async fn subscribe_to_updates<F>(&self, handler: F) -> Result<Subscription, LocationError>
    where
        F: FnMut(Position) + Send + 'static,
    {
        let provider = self.provider()?;
        let mut current = self.subscription.lock().await;
        if let Some(previous) = current.take() {
            previous.unsubscribe().await;
        }
        let subscription = provider.subscribe(handler).await;
        *current = Some(subscription.clone());
        Ok(subscription)
    }

    /// Tear down the handler installed via [Self::subscribe_to_updates].
    /// Calling with nothing installed is a no-op.
    pub async fn unsubscribe_from_updates(&self) {
        if let Some(subscription) = self.subscription.lock().await.take() {
            subscription.unsubscribe().await;
        }
    }
}
