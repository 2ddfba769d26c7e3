use crate::position::Position;

/// What the persistent tracking notification should currently show.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NotificationState {
    /// Tracking is live and this is the latest accepted fix.
    Fix(Position),
    /// Tracking is live but no fix has arrived yet.
    AwaitingFix,
}

impl NotificationState {
    pub fn title(&self) -> &'static str {
        "Live Location Tracking"
    }

    pub fn body(&self) -> String {
        match self {
            Self::Fix(position) => {
                format!("Lat: {}, Lon: {}", position.latitude, position.longitude)
            }
            Self::AwaitingFix => "Waiting for location...".to_string(),
        }
    }
}

/// Seam to the platform's persistent-notification surface.
pub trait StatusNotifier: Send + Sync + 'static {
    /// Create or update the tracking notification.
    fn show(&self, state: NotificationState);

    /// Remove the tracking notification entirely.
    fn clear(&self);
}
