use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::Utc;
use log::debug;
use rand::{RngExt, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use waymark_core::{FixSender, HostError, Position, ProviderHost, ProviderKind, UpdateRequest};

const DEG_PER_M: f64 = 1.0 / 111_320.0;

/// Random walk over the map, deterministic for a given seed.
struct Walk {
    rng: ChaCha20Rng,
    latitude: f64,
    longitude: f64,
}

impl Walk {
    /// Steps are small enough that some land under the default 1m distance
    /// threshold, so discards actually happen during a session.
    const MAX_STEP_M: f64 = 3.0;

    /// Take one step and read it back as `kind` would report it. GPS reads
    /// are tighter than network reads, like the real radios.
    fn next_fix(&mut self, kind: ProviderKind) -> Position {
        self.latitude += self.rng.random_range(-Self::MAX_STEP_M..=Self::MAX_STEP_M) * DEG_PER_M;
        self.longitude += self.rng.random_range(-Self::MAX_STEP_M..=Self::MAX_STEP_M) * DEG_PER_M;
        let accuracy_m = match kind {
            ProviderKind::Gps => self.rng.random_range(3.0..8.0),
            _ => self.rng.random_range(8.0..25.0),
        };
        Position {
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy_m,
            timestamp_ms: Utc::now().timestamp_millis(),
            provider: kind,
        }
    }
}

/// Simulated device platform: a seeded walk plays the part of the radios,
/// and toggles stand in for the permission dialog and the location settings.
pub struct SimulatedHost {
    walk: Arc<Mutex<Walk>>,
    permission: AtomicBool,
    gps_enabled: AtomicBool,
    network_enabled: AtomicBool,
    last_known: Arc<Mutex<HashMap<ProviderKind, Position>>>,
    emitters: Mutex<Vec<CancellationToken>>,
}

impl SimulatedHost {
    pub fn new(seed: u64, origin: (f64, f64)) -> Arc<Self> {
        Arc::new(Self {
            walk: Arc::new(Mutex::new(Walk {
                rng: ChaCha20Rng::seed_from_u64(seed),
                latitude: origin.0,
                longitude: origin.1,
            })),
            permission: AtomicBool::new(true),
            gps_enabled: AtomicBool::new(true),
            network_enabled: AtomicBool::new(true),
            last_known: Arc::default(),
            emitters: Mutex::default(),
        })
    }

    pub fn set_permission(&self, granted: bool) {
        self.permission.store(granted, Ordering::SeqCst);
    }

    pub fn set_provider_enabled(&self, kind: ProviderKind, enabled: bool) {
        let flag = match kind {
            ProviderKind::Gps => &self.gps_enabled,
            ProviderKind::Network => &self.network_enabled,
            ProviderKind::Unknown => return,
        };
        flag.store(enabled, Ordering::SeqCst);
    }
}

impl ProviderHost for SimulatedHost {
    fn permission_granted(&self) -> bool {
        self.permission.load(Ordering::SeqCst)
    }

    fn provider_enabled(&self, kind: ProviderKind) -> bool {
        match kind {
            ProviderKind::Gps => self.gps_enabled.load(Ordering::SeqCst),
            ProviderKind::Network => self.network_enabled.load(Ordering::SeqCst),
            ProviderKind::Unknown => false,
        }
    }

    async fn last_known(&self, kind: ProviderKind) -> Option<Position> {
        self.last_known.lock().await.get(&kind).copied()
    }

    async fn request_updates(
        &self,
        kind: ProviderKind,
        request: UpdateRequest,
        fixes: FixSender,
    ) -> Result<(), HostError> {
        if kind == ProviderKind::Unknown {
            return Err(HostError(format!("no {kind} backend to register with")));
        }

        let cancel = CancellationToken::new();
        self.emitters.lock().await.push(cancel.clone());

        let walk = self.walk.clone();
        let last_known = self.last_known.clone();
        // interval() panics on a zero period
        let period = Duration::from_millis(request.min_interval_ms.max(1));
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,

                    _ = ticks.tick() => {
                        let fix = walk.lock().await.next_fix(kind);
                        last_known.lock().await.insert(kind, fix);
                        if fixes.send(fix).is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("{kind} emitter finished");
        });

        Ok(())
    }

    async fn remove_updates(&self) {
        for cancel in self.emitters.lock().await.drain(..) {
            cancel.cancel();
        }
    }
}
