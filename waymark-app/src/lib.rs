mod platform;
mod store;
mod ui;

pub use platform::SimulatedHost;
pub use store::JsonStore;
pub use ui::{AutoPrompt, ChannelUi, DownloadShare, LogNotification};

use waymark_core::{LocationService, PositionProvider, Tracker};

pub mod prelude {
    pub use anyhow::{Context, anyhow, bail};
    pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;
}

pub use prelude::*;

/// The subsystem instantiated over the simulated platform.
pub type AppProvider = PositionProvider<SimulatedHost, LogNotification>;
pub type AppService = LocationService<SimulatedHost, LogNotification, JsonStore>;
pub type AppTracker =
    Tracker<SimulatedHost, LogNotification, JsonStore, AutoPrompt, DownloadShare, ChannelUi>;
