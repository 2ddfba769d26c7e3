use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};

use waymark_app_lib::*;
use waymark_core::{ClearOutcome, ExportOutcome, ProviderKind, TrackingConfig};

/// Interactive harness for the tracking subsystem over a simulated device.
#[derive(Parser)]
struct Cli {
    /// Store file for the tracking flag, last position, and persisted log
    #[arg(long, default_value = "waymark-store.json")]
    store: PathBuf,

    /// Directory exports are dropped into
    #[arg(long, default_value = ".")]
    export_dir: PathBuf,

    /// Milliseconds between simulated fixes
    #[arg(long, default_value_t = 2_000)]
    interval_ms: u64,

    /// Meters a fix must move to be accepted
    #[arg(long, default_value_t = 1.0)]
    min_distance: f64,

    /// Seed for the simulated walk, random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Keep the travel log across restarts
    #[arg(long)]
    persist_log: bool,

    /// Simulate the user denying every permission
    #[arg(long)]
    deny_permission: bool,

    /// Disable the GPS backend
    #[arg(long)]
    no_gps: bool,

    /// Disable the network backend
    #[arg(long)]
    no_network: bool,

    /// Simulate backing out of the share dialog on export
    #[arg(long)]
    cancel_share: bool,
}

// Where the walk starts, if nobody cares.
const ORIGIN: (f64, f64) = (37.422, -122.084);

const HELP: &str = "\
Commands:
  start    begin tracking
  stop     stop tracking
  where    one-shot location read
  export   share the travel log as CSV
  clear    wipe the travel log
  state    print the UI snapshot
  help     show this message
  quit     exit";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    colog::init();
    let cli = Cli::parse();

    let config = TrackingConfig {
        min_interval_ms: cli.interval_ms,
        min_distance_m: cli.min_distance,
        persist_log: cli.persist_log,
        ..TrackingConfig::default()
    };

    let seed = cli.seed.unwrap_or_else(|| rand::random_range(0..u64::MAX));
    let host = SimulatedHost::new(seed, ORIGIN);
    host.set_permission(!cli.deny_permission);
    host.set_provider_enabled(ProviderKind::Gps, !cli.no_gps);
    host.set_provider_enabled(ProviderKind::Network, !cli.no_network);

    let store = Arc::new(JsonStore::open(&cli.store).context("Failed to open the store")?);
    let provider = Arc::new(AppProvider::new(
        host,
        Arc::new(LogNotification),
        config.clone(),
    ));
    let service = AppService::new(provider, store.clone(), config.clone());

    let (update_tx, mut update_rx) = mpsc::channel(4);
    let tracker = AppTracker::new(
        service,
        store,
        config,
        AutoPrompt {
            grant: !cli.deny_permission,
        },
        DownloadShare {
            dir: cli.export_dir.clone(),
            cancel: cli.cancel_share,
        },
        ChannelUi(update_tx),
    );

    tracker.sync().await;
    tracker.attach().await.context("Failed to attach the tracker")?;

    println!("waymark interactive (seed {seed})");
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            Ok(_) = tokio::signal::ctrl_c() => break,

            Some(_) = update_rx.recv() => {
                // Coalesce bursts so a stream of fixes prints once.
                while update_rx.try_recv().is_ok() {}
                print_state(&tracker).await;
            }

            line = lines.next_line() => match line.context("Failed to read stdin")? {
                Some(line) => {
                    if handle_command(&tracker, line.trim()).await {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    tracker.detach().await;
    Ok(())
}

/// Returns true when the loop should exit.
async fn handle_command(tracker: &AppTracker, command: &str) -> bool {
    match command {
        "start" => tracker.start_tracking().await,
        "stop" => tracker.stop_tracking().await,
        "where" => tracker.refresh().await,
        "export" => match tracker.export_csv().await {
            Ok(ExportOutcome::Exported(path)) => println!("exported to {}", path.display()),
            Ok(ExportOutcome::NoData) => println!("nothing to export yet"),
            Ok(ExportOutcome::Cancelled) => println!("export cancelled"),
            Err(why) => println!("export failed: {}", why.user_message()),
        },
        "clear" => match tracker.clear_logs().await {
            ClearOutcome::Cleared(count) => println!("cleared {count} entries"),
            ClearOutcome::AlreadyEmpty => println!("log is already empty"),
        },
        "state" => print_state(tracker).await,
        "help" => println!("{HELP}"),
        "quit" | "exit" => return true,
        "" => {}
        other => println!("unknown command {other:?}, try \"help\""),
    }
    false
}

async fn print_state(tracker: &AppTracker) {
    let ui = tracker.ui_state().await;
    let position = match &ui.current {
        Some(position) => format!(
            "{:.5}, {:.5} (±{:.0}m {})",
            position.latitude, position.longitude, position.accuracy_m, position.provider,
        ),
        None => "unknown".to_string(),
    };
    println!(
        "tracking: {} | position: {} | log entries: {}{}",
        if ui.tracking { "on" } else { "off" },
        position,
        tracker.log_count().await,
        match &ui.error {
            Some(error) => format!(" | error: {error}"),
            None => String::new(),
        },
    );
}
