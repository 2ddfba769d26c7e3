use thiserror::Error;
use tokio::sync::mpsc;

use crate::position::{Position, ProviderKind};

/// Channel end a [ProviderHost] pushes raw fixes into.
pub type FixSender = mpsc::UnboundedSender<Position>;

/// Parameters for a provider registration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateRequest {
    /// Minimum milliseconds between fixes.
    pub min_interval_ms: u64,
    /// Minimum meters of movement between fixes.
    pub min_distance_m: f64,
}

/// The platform refused to register or keep a provider registration.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HostError(pub String);

/// Seam to the device's positioning stack.
///
/// Implementations wrap whatever the platform offers (OS location managers,
/// or a simulation) and stay policy free: permission checks, accuracy
/// arbitration, and distance filtering all happen above this trait.
pub trait ProviderHost: Send + Sync + 'static {
    /// Whether the user has granted the location permission.
    fn permission_granted(&self) -> bool;

    /// Whether a specific positioning backend is enabled.
    fn provider_enabled(&self, kind: ProviderKind) -> bool;

    /// The platform's cached fix for one backend, if it has one.
    fn last_known(&self, kind: ProviderKind) -> impl Future<Output = Option<Position>> + Send;

    /// Register for a stream of fixes from one backend. Fixes go into
    /// `fixes` and keep flowing until [Self::remove_updates].
    fn request_updates(
        &self,
        kind: ProviderKind,
        request: UpdateRequest,
        fixes: FixSender,
    ) -> impl Future<Output = Result<(), HostError>> + Send;

    /// Tear down every registration made through [Self::request_updates].
    fn remove_updates(&self) -> impl Future<Output = ()> + Send;
}
