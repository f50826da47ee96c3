//! Background companion for the `battery` charge limiter daemon.
//!
//! The daemon is an external privileged CLI that manipulates the SMC
//! charging registers; this crate installs it, keeps it current, drives it
//! through shell commands, and maintains an adaptively-refreshed picture of
//! the battery state. The tray/menu presentation layer consumes this crate
//! through the [`monitor::StatusSink`] and [`power::PowerEvent`] seams.

pub mod alert;
pub mod command;
pub mod diag;
pub mod error;
pub mod install;
pub mod limiter;
pub mod monitor;
pub mod power;
pub mod settings;
pub mod status;
