use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::command::Executor;
use crate::power::PowerEvent;
use crate::status::{self, BatteryStatus};

/// Slow cadence: near the target, on battery, or full and charging.
pub const SLOW_INTERVAL: Duration = Duration::from_secs(600);
/// Fast cadence: actively converging on the target while on AC.
pub const FAST_INTERVAL: Duration = Duration::from_secs(30);
/// Band around the target considered close enough to poll slowly.
const NEAR_TARGET_BAND: u8 = 5;

/// Receives every fresh status the monitor produces; implemented by the
/// tray/menu layer.
pub trait StatusSink {
    fn status_changed(&mut self, status: &BatteryStatus);
}

/// Process-wide monitoring context: owns the single repeating timer, the
/// last-known status, and the power-source flag. Passed explicitly, never
/// ambient.
pub struct Monitor<S: StatusSink> {
    exec: Executor,
    sink: S,
    tick_tx: UnboundedSender<()>,
    tick_rx: Option<UnboundedReceiver<()>>,
    timer: Option<JoinHandle<()>>,
    last_status: Option<BatteryStatus>,
    on_battery: bool,
    refreshing: bool,
}

impl<S: StatusSink> Monitor<S> {
    pub fn new(exec: Executor, sink: S) -> Self {
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        Self {
            exec,
            sink,
            tick_tx,
            tick_rx: Some(tick_rx),
            timer: None,
            last_status: None,
            on_battery: false,
            refreshing: false,
        }
    }

    pub fn last_status(&self) -> Option<&BatteryStatus> {
        self.last_status.as_ref()
    }

    /// Pick the polling cadence for a given status and power source. An
    /// unknown percentage polls slowly: there is nothing to converge on, and
    /// a broken daemon should not be hammered.
    pub fn select_interval(status: &BatteryStatus, on_battery: bool) -> Duration {
        let Some(percentage) = status.percentage else {
            return SLOW_INTERVAL;
        };
        let delta = percentage.abs_diff(status.target().get());
        let full_and_charging = status.charging && percentage == 100;
        if delta < NEAR_TARGET_BAND || on_battery || full_and_charging {
            SLOW_INTERVAL
        } else {
            FAST_INTERVAL
        }
    }

    /// Cancel the pending tick and, unless `suspend_only`, read a fresh
    /// status and arm the next one. At most one timer is alive at any
    /// instant.
    pub async fn reschedule(&mut self, suspend_only: bool) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if suspend_only {
            debug!("timer disarmed");
            return;
        }

        let status = self.read_status().await;
        self.sink.status_changed(&status);
        let interval = Self::select_interval(&status, self.on_battery);
        self.last_status = Some(status);
        self.arm(interval);
    }

    /// Drive the monitor until the event channel closes.
    pub async fn run(mut self, mut events: UnboundedReceiver<PowerEvent>) {
        let Some(mut ticks) = self.tick_rx.take() else {
            return;
        };
        self.reschedule(false).await;

        loop {
            tokio::select! {
                Some(()) = ticks.recv() => {
                    self.refresh().await;
                }
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_power_event(event).await,
                        None => break,
                    }
                }
            }
        }
    }

    pub async fn handle_power_event(&mut self, event: PowerEvent) {
        debug!(?event, "power event");
        match event {
            // do not wake a machine that is going to sleep
            PowerEvent::Lock | PowerEvent::Suspend => self.reschedule(true).await,
            PowerEvent::Unlock | PowerEvent::Resume => self.reschedule(false).await,
            PowerEvent::PowerSource { on_battery } => {
                self.on_battery = on_battery;
                self.reschedule(false).await;
            }
            // out-of-band refresh, independent of the timer cadence
            PowerEvent::ThemeChanged | PowerEvent::StatusViewOpened => self.refresh().await,
        }
    }

    /// Refresh now, serialized by the in-flight flag: a trigger landing
    /// while a refresh is running is swallowed, its reschedule covers us.
    async fn refresh(&mut self) {
        if self.refreshing {
            return;
        }
        self.refreshing = true;
        self.reschedule(false).await;
        self.refreshing = false;
    }

    fn arm(&mut self, interval: Duration) {
        debug!(interval_secs = interval.as_secs(), "timer armed");
        let tick_tx = self.tick_tx.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let _ = tick_tx.send(());
        }));
    }

    async fn read_status(&self) -> BatteryStatus {
        match status::read(&self.exec).await {
            Ok(status) => status,
            Err(e) => {
                // polling degrades silently, a broken daemon is not worth a
                // modal every tick
                warn!(error = %e, "status read failed");
                BatteryStatus::unknown()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::DiagLog;
    use crate::status::parse_status;

    struct NullSink;

    impl StatusSink for NullSink {
        fn status_changed(&mut self, _status: &BatteryStatus) {}
    }

    fn monitor() -> Monitor<NullSink> {
        Monitor::new(Executor::new(DiagLog::disabled()), NullSink)
    }

    #[test]
    fn test_interval_near_target_is_slow() {
        let status = parse_status("76,1:00,,,80");
        assert_eq!(
            Monitor::<NullSink>::select_interval(&status, false),
            SLOW_INTERVAL
        );
    }

    #[test]
    fn test_interval_converging_on_ac_is_fast() {
        let status = parse_status("60,1:00,enabled,,80");
        assert_eq!(
            Monitor::<NullSink>::select_interval(&status, false),
            FAST_INTERVAL
        );
    }

    #[test]
    fn test_interval_on_battery_is_slow() {
        let status = parse_status("60,1:00,enabled,,80");
        assert_eq!(
            Monitor::<NullSink>::select_interval(&status, true),
            SLOW_INTERVAL
        );
    }

    #[test]
    fn test_interval_full_and_charging_is_slow() {
        let status = parse_status("100,0:00,enabled,,80");
        assert_eq!(
            Monitor::<NullSink>::select_interval(&status, false),
            SLOW_INTERVAL
        );
    }

    #[test]
    fn test_interval_unknown_percentage_is_slow() {
        let status = BatteryStatus::unknown();
        assert_eq!(
            Monitor::<NullSink>::select_interval(&status, false),
            SLOW_INTERVAL
        );
    }

    #[test]
    fn test_interval_without_maintain_uses_default_target() {
        // 60 vs the default 80 target
        let status = parse_status("60,1:00,enabled,,");
        assert_eq!(
            Monitor::<NullSink>::select_interval(&status, false),
            FAST_INTERVAL
        );
    }

    #[tokio::test]
    async fn test_at_most_one_timer_across_event_sequence() {
        let mut monitor = monitor();

        monitor.reschedule(false).await;
        let first = monitor.timer.as_ref().unwrap().abort_handle();

        // rearm: the first timer must be cancelled, not left running
        monitor
            .handle_power_event(PowerEvent::PowerSource { on_battery: true })
            .await;
        assert!(monitor.timer.is_some());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(first.is_finished());

        // lock disarms entirely
        let second = monitor.timer.as_ref().unwrap().abort_handle();
        monitor.handle_power_event(PowerEvent::Lock).await;
        assert!(monitor.timer.is_none());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(second.is_finished());

        // manual refresh rearms exactly one
        monitor
            .handle_power_event(PowerEvent::StatusViewOpened)
            .await;
        assert!(monitor.timer.is_some());
    }

    #[tokio::test]
    async fn test_suspend_does_not_arm_a_timer() {
        let mut monitor = monitor();
        monitor.handle_power_event(PowerEvent::Suspend).await;
        assert!(monitor.timer.is_none());
        assert!(monitor.last_status().is_none());
    }

    #[tokio::test]
    async fn test_in_flight_refresh_swallows_triggers() {
        let mut monitor = monitor();
        monitor.refreshing = true;
        monitor.refresh().await;
        assert!(monitor.timer.is_none());
    }

    #[tokio::test]
    async fn test_refresh_records_last_status() {
        let mut monitor = monitor();
        monitor.refresh().await;
        // no daemon in the test environment: the status degrades, it never
        // errors
        assert!(monitor.last_status().is_some());
    }
}
