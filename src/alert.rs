use tokio::process::Command;
use tracing::warn;

/// Strip quotes so user-facing text cannot break the AppleScript string
/// literals.
fn sanitize(s: &str) -> String {
    s.replace('"', "'").replace('\\', "")
}

/// Show a modal advisory dialog. Failure to display is swallowed; an alert
/// must never abort the operation that raised it.
pub async fn alert(message: &str) {
    let script = format!(
        "display dialog \"{}\" with title \"Battery\" buttons {{\"OK\"}} default button \"OK\"",
        sanitize(message)
    );
    if let Err(e) = Command::new("osascript").args(["-e", &script]).output().await {
        warn!(error = %e, "failed to display alert");
    }
}

/// Ask a yes/no question. Degrades to "no" when the dialog cannot be shown
/// or the user cancels (osascript exits non-zero on Cancel).
pub async fn confirm(message: &str) -> bool {
    let script = format!(
        "display dialog \"{}\" with title \"Battery\" buttons {{\"Cancel\", \"OK\"}} default button \"OK\"",
        sanitize(message)
    );
    match Command::new("osascript").args(["-e", &script]).output().await {
        Ok(output) => output.status.success(),
        Err(e) => {
            warn!(error = %e, "failed to display confirmation");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_script_breakers() {
        assert_eq!(sanitize(r#"error: "foo" \ bar"#), "error: 'foo'  bar");
        assert_eq!(sanitize("clean"), "clean");
    }
}
