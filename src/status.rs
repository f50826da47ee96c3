use serde::Serialize;
use tracing::debug;

use crate::command::{DaemonCommand, Executor, Percent, DEFAULT_MAINTAIN};
use crate::error::TrayError;

/// Structured decoding of one `battery status_csv` line.
///
/// `discharging` means the daemon is actively force-discharging toward its
/// target, not that the battery is draining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatteryStatus {
    pub percentage: Option<u8>,
    pub remaining: String,
    pub charging: bool,
    pub discharging: bool,
    pub maintain_percentage: Option<u8>,
    pub battery_state: String,
    pub daemon_state: String,
}

impl BatteryStatus {
    /// The cap the daemon is (or would be) holding, defaulting to 80.
    pub fn target(&self) -> Percent {
        self.maintain_percentage
            .and_then(Percent::new)
            .unwrap_or_default()
    }

    /// A status where every field has degraded to its unknown value.
    pub fn unknown() -> Self {
        parse_status("")
    }
}

/// Decode a comma-separated status line:
/// percentage, remaining time, charging flag, discharging flag, maintain
/// percentage. Missing trailing fields default; malformed input never fails.
pub fn parse_status(raw: &str) -> BatteryStatus {
    let mut fields = raw.split(',');

    let percentage = fields
        .next()
        .and_then(|f| f.trim().parse::<u8>().ok())
        .filter(|p| *p <= 100);
    let remaining = fields
        .next()
        .map(str::trim)
        .filter(|f| is_clock(f))
        .unwrap_or("unknown")
        .to_string();
    let charging = fields.next().map(str::trim) == Some("enabled");
    let discharging = fields.next().map(str::trim) == Some("discharging");
    // the daemon cannot meaningfully charge while force-discharging
    let charging = charging && !discharging;
    let maintain_percentage = fields
        .next()
        .and_then(|f| f.trim().parse::<u8>().ok())
        .filter(|p| *p <= 100);

    let shown = match percentage {
        Some(p) => p.to_string(),
        None => "??".into(),
    };
    let battery_state = format!("{shown}% ({remaining} remaining)");
    let daemon_state = if discharging {
        format!(
            "forcing discharge to {}%",
            maintain_percentage.unwrap_or(DEFAULT_MAINTAIN)
        )
    } else if charging {
        "smc charging enabled".to_string()
    } else {
        "smc charging disabled".to_string()
    };

    BatteryStatus {
        percentage,
        remaining,
        charging,
        discharging,
        maintain_percentage,
        battery_state,
        daemon_state,
    }
}

/// Strict `D{1,2}:D{2}` clock shape; the daemon's "not charging" placeholder
/// and partially clock-like text both fail this and degrade to "unknown".
fn is_clock(field: &str) -> bool {
    let Some((hours, minutes)) = field.split_once(':') else {
        return false;
    };
    (1..=2).contains(&hours.len())
        && minutes.len() == 2
        && hours.chars().all(|c| c.is_ascii_digit())
        && minutes.chars().all(|c| c.is_ascii_digit())
}

/// Run `status_csv` and decode it. A command failure or timeout is an error
/// here; callers decide between degrading and alerting.
pub async fn read(exec: &Executor) -> Result<BatteryStatus, TrayError> {
    let result = exec.daemon(DaemonCommand::StatusCsv).await;
    if let Some(err) = result.error {
        return Err(TrayError::Command(err));
    }
    if result.timed_out {
        return Err(TrayError::Timeout(DaemonCommand::StatusCsv.render()));
    }
    let status = parse_status(result.stdout.trim_end());
    debug!(
        status = %serde_json::to_string(&status).unwrap_or_default(),
        "battery status"
    );
    Ok(status)
}

/// Whether the daemon is currently maintaining a limit. The daemon reports
/// this with a human-readable sentence; the check matches its literal
/// wording and must track the daemon's output format.
pub async fn is_limiter_enabled(exec: &Executor) -> Result<bool, TrayError> {
    let result = exec.daemon(DaemonCommand::Status).await;
    if let Some(err) = result.error {
        return Err(TrayError::Command(err));
    }
    if result.timed_out {
        return Err(TrayError::Timeout(DaemonCommand::Status.render()));
    }
    Ok(result.stdout.contains("being maintained at"))
}
