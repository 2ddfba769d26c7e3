use thiserror::Error;

/// Everything that can go wrong inside the tracking subsystem.
///
/// Variants are stable identifiers: callers match on them to pick messaging.
/// Nothing here is retried implicitly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// The user has not granted the location permission.
    #[error("location permission has not been granted")]
    PermissionDenied,
    /// Neither GPS nor network positioning is enabled on the device.
    #[error("no location provider is enabled")]
    ProvidersUnavailable,
    /// The platform refused a provider subscription.
    #[error("location provider failed to initialize: {0}")]
    ProviderInit(String),
    /// No provider had a fix to hand out.
    #[error("no location is available")]
    NoLocationAvailable,
    /// This build or device has no location module at all.
    #[error("location module is not available")]
    ModuleUnavailable,
    /// Writing or handing off an exported file failed.
    #[error("export failed: {0}")]
    ExportFailed(String),
    /// The user backed out of a share dialog.
    #[error("cancelled by the user")]
    UserCancelled,
}

impl LocationError {
    /// Message shown to the person holding the device, with a recovery hint
    /// where one exists.
    pub fn user_message(&self) -> String {
        match self {
            Self::PermissionDenied => {
                "Location permission has not been granted. Grant it in system settings and retry."
                    .to_string()
            }
            Self::ProvidersUnavailable => {
                "No location provider is enabled. Turn on location services and retry.".to_string()
            }
            Self::NoLocationAvailable => {
                "No location is available yet. Check that location services are on and retry."
                    .to_string()
            }
            other => other.to_string(),
        }
    }
}
