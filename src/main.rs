use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use battery_tray::command::Executor;
use battery_tray::diag::DiagLog;
use battery_tray::error::TrayError;
use battery_tray::install;
use battery_tray::limiter::Limiter;
use battery_tray::monitor::{Monitor, StatusSink};
use battery_tray::power::{self, PowerEvent};
use battery_tray::settings::{SettingKey, SettingsStore, TomlSettings};
use battery_tray::status::{self, BatteryStatus};

/// Headless sink; the tray/menu layer replaces this with its own renderer.
struct LogSink;

impl StatusSink for LogSink {
    fn status_changed(&mut self, status: &BatteryStatus) {
        info!(
            battery = %status.battery_state,
            daemon = %status.daemon_state,
            "status"
        );
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("battery-tray starting");

    let diag = DiagLog::new();
    diag.append("battery-tray starting");
    let exec = Executor::new(diag.clone());
    let settings = TomlSettings::load();

    match install::ensure_installed_and_current(&exec, &settings).await {
        Ok(()) => info!("daemon present and current"),
        Err(TrayError::FatalSetup(reason)) => {
            error!(%reason, "cannot continue");
            diag.append(&format!("fatal: {reason}"));
            std::process::exit(1);
        }
        Err(e) => {
            warn!(error = %e, "setup incomplete, continuing with the existing installation");
        }
    }

    let limiter_was_on = status::is_limiter_enabled(&exec).await.unwrap_or(false);
    info!(limiter_was_on, "boot state");

    let limiter = Limiter::new(exec.clone());
    let allow_force_discharge = settings.get(SettingKey::ForceDischargeIfNeeded);
    let percentage = limiter.enable(None, allow_force_discharge).await;
    info!(percentage = ?percentage, "limiter engaged");
    diag.append("limiter engaged");

    // The session layer injects lock/unlock/suspend/resume through this
    // same sender; the built-in watcher covers AC/battery flips.
    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel::<PowerEvent>();
    if let Some(on_battery) = power::on_battery_now(&exec).await {
        let _ = events_tx.send(PowerEvent::PowerSource { on_battery });
    }
    tokio::spawn(power::watch_power_source(exec.clone(), events_tx));

    let monitor = Monitor::new(exec, LogSink);
    monitor.run(events_rx).await;

    Ok(())
}
