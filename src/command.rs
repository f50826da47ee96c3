use std::fmt;
use std::process::Output;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::diag::DiagLog;
use crate::error::TrayError;

/// Homebrew-aware search path for every spawned command; the daemon and the
/// smc helper live under /usr/local/bin or /opt/homebrew/bin depending on
/// architecture.
const PATH_FIX: &str =
    "/opt/homebrew/bin:/opt/homebrew/sbin:/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

/// Default advisory timeout for ordinary status/control commands.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// The cap applied when the daemon reports no target of its own.
pub const DEFAULT_MAINTAIN: u8 = 80;

/// Outcome of one external command invocation. Exactly one of
/// {stdout non-empty, error present, timed_out} is authoritative.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub stdout: String,
    pub error: Option<String>,
    pub timed_out: bool,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.error.is_none() && !self.timed_out
    }
}

/// Charge cap percentage, valid only in 1..=100. The only user-influenced
/// value that ever reaches a command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Percent(u8);

impl Percent {
    pub fn new(value: u8) -> Option<Self> {
        (1..=100).contains(&value).then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Percent {
    fn default() -> Self {
        Self(DEFAULT_MAINTAIN)
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Every daemon invocation this app can issue. Rendering from validated
/// parts keeps free-form interpolation off the shell string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonCommand {
    Status,
    StatusCsv,
    Maintain {
        percent: Percent,
        force_discharge: bool,
    },
    MaintainStop,
    MaintainRecover,
    Update { silent: bool },
    Uninstall { silent: bool },
}

impl DaemonCommand {
    pub fn render(&self) -> String {
        match self {
            Self::Status => "battery status".into(),
            Self::StatusCsv => "battery status_csv".into(),
            Self::Maintain {
                percent,
                force_discharge,
            } => {
                let mut cmd = format!("battery maintain {percent}");
                if *force_discharge {
                    cmd.push_str(" --force-discharge");
                }
                cmd
            }
            Self::MaintainStop => "battery maintain stop".into(),
            Self::MaintainRecover => "battery maintain recover".into(),
            Self::Update { silent } => {
                if *silent {
                    "battery update silent".into()
                } else {
                    "battery update".into()
                }
            }
            Self::Uninstall { silent } => {
                if *silent {
                    "battery uninstall silent".into()
                } else {
                    "battery uninstall".into()
                }
            }
        }
    }
}

/// Runs external commands through a shell, capturing their outcome and
/// recording every invocation in the diagnostic log.
#[derive(Clone)]
pub struct Executor {
    diag: DiagLog,
}

impl Executor {
    pub fn new(diag: DiagLog) -> Self {
        Self { diag }
    }

    /// Run a shell command with the default 2 s advisory timeout.
    pub async fn run(&self, command: &str) -> CommandResult {
        self.invoke(command, DEFAULT_TIMEOUT).await
    }

    /// Run a daemon command with the default advisory timeout.
    pub async fn daemon(&self, command: DaemonCommand) -> CommandResult {
        self.run(&command.render()).await
    }

    /// Run a shell command racing against `timeout`. When the timer wins the
    /// result is flagged `timed_out`, or surfaced as an error when
    /// `fatal_timeout` is set.
    pub async fn run_with(
        &self,
        command: &str,
        timeout: Duration,
        fatal_timeout: bool,
    ) -> Result<CommandResult, TrayError> {
        let result = self.invoke(command, timeout).await;
        if result.timed_out && fatal_timeout {
            return Err(TrayError::Timeout(command.to_string()));
        }
        Ok(result)
    }

    /// Run a command through the macOS authorization prompt. No timeout: the
    /// prompt is user-paced, and an escalated install must not be abandoned
    /// mid-flight. Cancelling the prompt or failing after authorization is a
    /// `Privilege` error.
    pub async fn run_privileged(&self, command: &str) -> Result<String, TrayError> {
        let escaped = command.replace('\\', "\\\\").replace('"', "\\\"");
        let script = format!("do shell script \"{escaped}\" with administrator privileges");
        self.diag.append(&format!("executing (privileged): {command}"));
        debug!(command, "executing privileged command");

        let output = Command::new("osascript")
            .args(["-e", &script])
            .env("PATH", PATH_FIX)
            .output()
            .await
            .map_err(TrayError::Io)?;

        let result = classify(output);
        match result.error {
            Some(err) => {
                self.diag
                    .append(&format!("privileged failed: {command}: {}", err.trim()));
                Err(TrayError::Privilege(err))
            }
            None => {
                self.diag.append(&format!("privileged completed: {command}"));
                Ok(result.stdout)
            }
        }
    }

    async fn invoke(&self, command: &str, timeout: Duration) -> CommandResult {
        self.diag.append(&format!("executing: {command}"));
        debug!(command, "executing");

        let invocation = Command::new("/bin/bash")
            .arg("-c")
            .arg(command)
            .env("PATH", PATH_FIX)
            .output();

        // A timed-out command is not killed; dropping the future leaves the
        // child running and the timeout only shapes the result.
        let result = match tokio::time::timeout(timeout, invocation).await {
            Err(_) => CommandResult {
                stdout: String::new(),
                error: None,
                timed_out: true,
            },
            Ok(Err(e)) => CommandResult {
                stdout: String::new(),
                error: Some(format!("failed to spawn: {e}")),
                timed_out: false,
            },
            Ok(Ok(output)) => classify(output),
        };

        // The outcome line lands in the log before the caller sees the result.
        if result.timed_out {
            self.diag
                .append(&format!("timed out after {}ms: {command}", timeout.as_millis()));
        } else if let Some(err) = &result.error {
            self.diag.append(&format!("failed: {command}: {}", err.trim()));
        } else {
            self.diag.append(&format!("completed: {command}"));
        }

        result
    }
}

/// Non-zero exit or any stderr content classifies as failure; the daemon
/// writes informational text to stderr, and stderr wins over stdout. Both
/// channels empty with exit 0 is a success with empty output.
fn classify(output: Output) -> CommandResult {
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        let detail = if stderr.trim().is_empty() {
            format!("exit status {}", output.status.code().unwrap_or(-1))
        } else {
            stderr.trim().to_string()
        };
        return CommandResult {
            stdout: String::new(),
            error: Some(detail),
            timed_out: false,
        };
    }

    if !stderr.trim().is_empty() {
        return CommandResult {
            stdout: String::new(),
            error: Some(stderr.trim().to_string()),
            timed_out: false,
        };
    }

    CommandResult {
        stdout,
        error: None,
        timed_out: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> Executor {
        Executor::new(DiagLog::disabled())
    }

    #[test]
    fn test_percent_bounds() {
        assert!(Percent::new(0).is_none());
        assert!(Percent::new(101).is_none());
        assert_eq!(Percent::new(1).map(Percent::get), Some(1));
        assert_eq!(Percent::new(100).map(Percent::get), Some(100));
        assert_eq!(Percent::default().get(), 80);
    }

    #[test]
    fn test_daemon_command_rendering() {
        let maintain = DaemonCommand::Maintain {
            percent: Percent::default(),
            force_discharge: false,
        };
        assert_eq!(maintain.render(), "battery maintain 80");

        let forced = DaemonCommand::Maintain {
            percent: Percent::new(60).unwrap(),
            force_discharge: true,
        };
        assert_eq!(forced.render(), "battery maintain 60 --force-discharge");

        assert_eq!(DaemonCommand::StatusCsv.render(), "battery status_csv");
        assert_eq!(DaemonCommand::MaintainStop.render(), "battery maintain stop");
        assert_eq!(
            DaemonCommand::MaintainRecover.render(),
            "battery maintain recover"
        );
        assert_eq!(
            DaemonCommand::Update { silent: true }.render(),
            "battery update silent"
        );
        assert_eq!(
            DaemonCommand::Uninstall { silent: false }.render(),
            "battery uninstall"
        );
    }

    #[tokio::test]
    async fn test_stdout_success() {
        let result = executor().run("echo hello").await;
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "hello");
        assert!(result.error.is_none());
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_empty_output_is_success() {
        let result = executor().run("true").await;
        assert!(result.success());
        assert!(result.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let result = executor().run("exit 3").await;
        assert!(!result.success());
        assert!(result.error.as_deref().unwrap().contains('3'));
    }

    #[tokio::test]
    async fn test_stderr_wins_over_stdout() {
        let result = executor().run("echo oops >&2; echo data").await;
        assert!(!result.success());
        assert_eq!(result.error.as_deref(), Some("oops"));
        assert!(result.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_advisory_timeout_flags_result() {
        let result = executor()
            .run_with("sleep 5", Duration::from_millis(100), false)
            .await
            .unwrap();
        assert!(result.timed_out);
        assert!(result.error.is_none());
        assert!(!result.success());
    }

    #[tokio::test]
    async fn test_fatal_timeout_is_error() {
        let err = executor()
            .run_with("sleep 5", Duration::from_millis(100), true)
            .await
            .unwrap_err();
        assert!(matches!(err, TrayError::Timeout(_)));
    }
}
