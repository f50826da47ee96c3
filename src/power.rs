use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::command::Executor;

/// Discrete power/session signals the monitor reacts to. Lock/unlock,
/// suspend/resume and the UI-driven events are injected by the session
/// layer through the same channel the built-in watcher feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    Lock,
    Unlock,
    Suspend,
    Resume,
    PowerSource { on_battery: bool },
    ThemeChanged,
    StatusViewOpened,
}

/// How often the watcher samples pmset for an AC/battery flip.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(20);

/// Read the current power source. `pmset -g batt` leads with
/// "Now drawing from 'Battery Power'" or "'AC Power'".
pub async fn on_battery_now(exec: &Executor) -> Option<bool> {
    let result = exec.run("pmset -g batt").await;
    if !result.success() {
        warn!("pmset power source query failed");
        return None;
    }
    if result.stdout.contains("Battery Power") {
        Some(true)
    } else if result.stdout.contains("AC Power") {
        Some(false)
    } else {
        None
    }
}

/// Emit a `PowerSource` event whenever the AC/battery source flips. Runs
/// until the receiving side goes away.
pub async fn watch_power_source(exec: Executor, events: UnboundedSender<PowerEvent>) {
    let mut last: Option<bool> = None;
    loop {
        if let Some(on_battery) = on_battery_now(&exec).await {
            if last != Some(on_battery) {
                debug!(on_battery, "power source changed");
                if events.send(PowerEvent::PowerSource { on_battery }).is_err() {
                    return;
                }
                last = Some(on_battery);
            }
        }
        tokio::time::sleep(SAMPLE_INTERVAL).await;
    }
}
