use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// Append-only per-user diagnostic log (`~/.battery/gui.log`).
///
/// The UI only ever shows a terminal summary; this file is what makes a
/// failed invocation reconstructible after the fact. Write failures are
/// swallowed: losing a log line must never abort the operation that
/// produced it.
#[derive(Clone)]
pub struct DiagLog {
    path: Option<PathBuf>,
}

impl DiagLog {
    pub fn new() -> Self {
        let path = dirs::home_dir().map(|h| h.join(".battery/gui.log"));
        if let Some(dir) = path.as_deref().and_then(|p| p.parent()) {
            let _ = std::fs::create_dir_all(dir);
        }
        Self { path }
    }

    /// Log to an explicit file instead of the per-user default.
    pub fn at(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// A log that drops everything.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn append(&self, message: &str) {
        let Some(path) = &self.path else { return };
        let line = format!(
            "{} {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            message
        );
        let _ = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
    }
}

impl Default for DiagLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_writes_timestamped_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gui.log");
        let log = DiagLog::at(path.clone());

        log.append("executing: battery status_csv");
        log.append("completed: battery status_csv");

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("executing: battery status_csv"));
        assert!(lines[1].ends_with("completed: battery status_csv"));
    }

    #[test]
    fn test_disabled_log_swallows_writes() {
        let log = DiagLog::disabled();
        log.append("nothing to see");
    }
}
