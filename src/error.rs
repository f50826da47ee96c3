use std::fmt;

#[derive(Debug)]
pub enum TrayError {
    Command(String),
    Timeout(String),
    Privilege(String),
    FatalSetup(String),
    Io(std::io::Error),
}

impl fmt::Display for TrayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(msg) => write!(f, "Command failed: {msg}"),
            Self::Timeout(cmd) => write!(f, "Command timed out: {cmd}"),
            Self::Privilege(msg) => write!(f, "Privileged command failed: {msg}"),
            Self::FatalSetup(msg) => write!(f, "Setup failed: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for TrayError {}

impl From<std::io::Error> for TrayError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
