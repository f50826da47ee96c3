use std::time::Duration;

use futures_util::future::join_all;
use tracing::{info, warn};

use crate::alert;
use crate::command::{CommandResult, DaemonCommand, Executor};
use crate::error::TrayError;
use crate::settings::{SettingKey, SettingsStore};

const BINARY_PROBE: &str = "which battery";
const HELPER_PROBE: &str = "which smc";

/// The no-prompt sudoers entries battery.sh registers: read access to the
/// charging (CH0C), discharging (CH0I) and MagSafe LED (ACLC) keys, plus
/// write access to the LED key. A probe that prompts fails under `-n`.
const PRIVILEGE_PROBES: [&str; 4] = [
    "sudo -n /usr/local/bin/smc -k CH0C -r",
    "sudo -n /usr/local/bin/smc -k CH0I -r",
    "sudo -n /usr/local/bin/smc -k ACLC -r",
    "sudo -n /usr/local/bin/smc -k ACLC -w 02",
];

/// Two independent endpoints; the network is reachable if either answers.
const REACHABILITY_PROBES: [&str; 2] = [
    "curl -sI --max-time 3 https://icanhazip.com",
    "curl -sI --max-time 3 https://github.com",
];
const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(4);

const INSTALLER: &str =
    "curl -s https://raw.githubusercontent.com/actuallymentor/battery/main/setup.sh | bash -s -- $USER";

const TELEMETRY_TOUCH: &str =
    "nohup curl \"https://unidentifiedanalytics.web.app/touch/?namespace=battery\" > /dev/null 2>&1 &";

/// What the concurrent probe battery found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallationState {
    pub binary_present: bool,
    pub helper_present: bool,
    pub privilege_rules_complete: bool,
}

impl InstallationState {
    pub fn is_installed(&self) -> bool {
        self.binary_present && self.helper_present
    }

    pub fn needs_setup(&self) -> bool {
        !self.is_installed() || !self.privilege_rules_complete
    }
}

/// Probe the installation concurrently. A probe that errors or times out
/// counts as absent; nothing is retried here.
pub async fn detect(exec: &Executor) -> InstallationState {
    let binary = exec.run(BINARY_PROBE);
    let helper = exec.run(HELPER_PROBE);
    let rules = join_all(PRIVILEGE_PROBES.iter().map(|probe| exec.run(probe)));
    let (binary, helper, rules) = tokio::join!(binary, helper, rules);

    InstallationState {
        binary_present: binary.success(),
        helper_present: helper.success(),
        privilege_rules_complete: rules.iter().all(CommandResult::success),
    }
}

/// Probe both well-known endpoints concurrently; reachable if either
/// succeeds. Gates update/install only, never status queries.
pub async fn reachable(exec: &Executor) -> bool {
    let (a, b) = tokio::join!(
        exec.run_with(REACHABILITY_PROBES[0], REACHABILITY_TIMEOUT, false),
        exec.run_with(REACHABILITY_PROBES[1], REACHABILITY_TIMEOUT, false),
    );
    [a, b].into_iter().flatten().any(|r| r.success())
}

/// Stop and kill stray daemon processes left by a previous run. Best-effort;
/// must run before update/install and before recovery, so the recovered
/// setting lands on the process that survives.
async fn kill_stale_daemons(exec: &Executor, installed: bool) {
    let count = exec
        .run("ps aux | grep \"/usr/local/bin/battery \" | grep -v grep | wc -l")
        .await;
    if count.success() {
        info!(count = %count.stdout.trim(), "stale daemon processes found");
    }

    if installed {
        let stopped = exec.daemon(DaemonCommand::MaintainStop).await;
        if !stopped.success() {
            warn!("maintain stop during cleanup failed");
        }
    }

    let killed = exec.run("pkill -f \"/usr/local/bin/battery.*\"").await;
    if !killed.success() {
        // pkill exits non-zero when nothing matched
        info!("no stale daemon processes to kill");
    }
}

/// Make sure the daemon is installed and current, then recover its previous
/// maintain setting. The only fatal outcome is needing to install while
/// offline; a failed update leaves the existing installation usable and is
/// logged only.
pub async fn ensure_installed_and_current(
    exec: &Executor,
    settings: &dyn SettingsStore,
) -> Result<(), TrayError> {
    let skip_update = std::env::var_os("BATTERY_TRAY_SKIP_UPDATE").is_some();

    let (state, online) = tokio::join!(detect(exec), reachable(exec));
    info!(
        installed = state.is_installed(),
        privilege_rules_complete = state.privilege_rules_complete,
        online,
        "installation state"
    );

    kill_stale_daemons(exec, state.is_installed()).await;

    if !state.needs_setup() {
        if !online {
            info!("offline, skipping daemon update");
        } else if skip_update {
            info!("update skipped by environment override");
        } else {
            let result = exec.daemon(DaemonCommand::Update { silent: true }).await;
            if let Some(err) = &result.error {
                warn!(error = %err.trim(), "daemon update failed");
            } else if result.timed_out {
                warn!("daemon update timed out");
            } else {
                info!("daemon update complete");
            }
        }
    } else {
        if !online {
            alert::alert(
                "Battery needs an internet connection to download the latest version, \
                 please connect to the internet and open the app again.",
            )
            .await;
            return Err(TrayError::FatalSetup(
                "daemon installation required but no network is reachable".into(),
            ));
        }

        if !state.is_installed() {
            alert::alert(
                "Welcome to the Battery limiting tool. The app needs to install/update \
                 some components, so it will ask for your password. This should only be \
                 needed once.",
            )
            .await;
        } else {
            alert::alert(
                "Battery needs to apply a backwards incompatible update, to do this it \
                 will ask for your password. This should not happen frequently.",
            )
            .await;
        }

        if let Err(e) = exec.run_privileged(INSTALLER).await {
            alert::alert(&format!("Error installing battery limiter: {e}")).await;
            return Err(e);
        }
        alert::alert(
            "Battery background components installed successfully. You can find the \
             battery limiter icon in the top right of your menu bar.",
        )
        .await;
    }

    // A previous forced quit leaves the limiter silently off; the daemon
    // knows its own last setting.
    let recovered = exec.daemon(DaemonCommand::MaintainRecover).await;
    if !recovered.success() {
        warn!("maintain recover failed");
    }

    if online && settings.get(SettingKey::TelemetryAllowed) {
        // fire and forget, nohup detaches it from our lifetime
        let _ = exec.run(TELEMETRY_TOUCH).await;
    }

    Ok(())
}

/// Tear the daemon out after an explicit confirmation. Returns whether the
/// uninstall actually ran.
pub async fn uninstall(exec: &Executor) -> bool {
    if !alert::confirm("Are you sure you want to uninstall Battery?").await {
        return false;
    }
    match exec
        .run_privileged(&DaemonCommand::Uninstall { silent: true }.render())
        .await
    {
        Ok(_) => {
            alert::alert("Battery is now uninstalled!").await;
            true
        }
        Err(e) => {
            warn!(error = %e, "uninstall failed");
            alert::alert(&format!("Error uninstalling battery: {e}")).await;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(binary: bool, helper: bool, rules: bool) -> InstallationState {
        InstallationState {
            binary_present: binary,
            helper_present: helper,
            privilege_rules_complete: rules,
        }
    }

    #[test]
    fn test_installed_requires_both_binaries() {
        assert!(state(true, true, true).is_installed());
        assert!(!state(true, false, true).is_installed());
        assert!(!state(false, true, true).is_installed());
    }

    #[test]
    fn test_incomplete_privilege_rules_need_setup() {
        // installed but missing a sudoers entry is not "already installed"
        let partial = state(true, true, false);
        assert!(partial.is_installed());
        assert!(partial.needs_setup());
    }

    #[test]
    fn test_complete_installation_needs_no_setup() {
        assert!(!state(true, true, true).needs_setup());
        assert!(state(false, false, false).needs_setup());
    }
}
