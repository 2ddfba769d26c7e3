use std::path::PathBuf;

use log::info;
use tokio::sync::mpsc;

use waymark_core::{
    LocationError, NotificationState, Permission, PermissionPrompt, ShareSink, StatusNotifier,
    UiNotifier,
};

/// Stand-in for the platform's persistent notification: the state lands in
/// the log output instead of a status bar.
pub struct LogNotification;

impl StatusNotifier for LogNotification {
    fn show(&self, state: NotificationState) {
        info!("[notification] {}: {}", state.title(), state.body());
    }

    fn clear(&self) {
        info!("[notification] dismissed");
    }
}

/// Permission dialog that answers every request the same way.
pub struct AutoPrompt {
    pub grant: bool,
}

impl PermissionPrompt for AutoPrompt {
    async fn request(&self, wanted: &[Permission]) -> Vec<Permission> {
        if self.grant { wanted.to_vec() } else { Vec::new() }
    }
}

/// Share surface that drops exports into a local directory.
pub struct DownloadShare {
    pub dir: PathBuf,
    /// Behave like the user backing out of the share dialog.
    pub cancel: bool,
}

impl ShareSink for DownloadShare {
    async fn export(&self, file_name: &str, contents: &str) -> Result<PathBuf, LocationError> {
        if self.cancel {
            return Err(LocationError::UserCancelled);
        }
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|why| LocationError::ExportFailed(why.to_string()))?;
        info!("export written to {}", path.display());
        Ok(path)
    }
}

/// Forwards state-change pings into the main loop's channel.
pub struct ChannelUi(pub mpsc::Sender<()>);

impl UiNotifier for ChannelUi {
    fn notify(&self) {
        let tx = self.0.clone();
        tokio::spawn(async move {
            tx.send(()).await.ok();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::test;

    #[test]
    async fn download_share_writes_the_export() {
        let dir = tempfile::tempdir().expect("Failed to make a temp dir");
        let share = DownloadShare {
            dir: dir.path().to_path_buf(),
            cancel: false,
        };

        let path = share
            .export("trail.csv", "latitude,longitude,timestamp\n")
            .await
            .expect("Failed to export");

        assert_eq!(path, dir.path().join("trail.csv"));
        let written = std::fs::read_to_string(&path).expect("Failed to read the export");
        assert_eq!(written, "latitude,longitude,timestamp\n");
    }

    #[test]
    async fn download_share_honors_the_cancel_toggle() {
        let share = DownloadShare {
            dir: PathBuf::from("."),
            cancel: true,
        };
        let result = share.export("trail.csv", "x").await;
        assert_eq!(result, Err(LocationError::UserCancelled));
    }

    #[test]
    async fn download_share_reports_write_failures() {
        let share = DownloadShare {
            dir: PathBuf::from("/definitely/not/a/directory"),
            cancel: false,
        };
        let result = share.export("trail.csv", "x").await;
        assert!(
            matches!(result, Err(LocationError::ExportFailed(_))),
            "got {result:?}",
        );
    }

    #[test]
    async fn auto_prompt_grants_or_denies_everything() {
        let wanted = [Permission::FineLocation, Permission::PostNotifications];

        let granted = AutoPrompt { grant: true }.request(&wanted).await;
        assert_eq!(granted, wanted.to_vec());

        let denied = AutoPrompt { grant: false }.request(&wanted).await;
        assert!(denied.is_empty(), "denying prompt granted {denied:?}");
    }

    #[test]
    async fn channel_ui_pings_the_receiver() {
        let (tx, mut rx) = mpsc::channel(2);
        let ui = ChannelUi(tx);
        ui.notify();
        assert_eq!(rx.recv().await, Some(()));
    }
}
