//! # keba-control - command validation and device control for KEBA stations
//!
//! Validates user-facing charging actions, translates them into low-level
//! station commands and dispatches those through a pluggable transport while
//! keeping a per-station state machine and failsafe timer.
//!
//! ## Architecture
//!
//! - `validation`: field rules, coercion and violation reporting
//! - `action`: the action surface and its outcomes
//! - `command`: low-level station commands
//! - `translator`: action to command translation against station state
//! - `station`: station identity, limits and state machine
//! - `failsafe`: failsafe configuration and countdown
//! - `dispatcher`: ordered sends with timeout and the deferred queue
//! - `actor`: one task per station owning its state
//! - `controller`: station registry and request routing
//! - `transport`: seam to the station hardware
//! - `persistence`: failsafe persistence across restarts
//! - `config`: YAML configuration and validation
//! - `logging`: structured logging and tracing
//! - `web`: HTTP action surface

pub mod action;
pub mod actor;
pub mod command;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod failsafe;
pub mod logging;
pub mod persistence;
pub mod station;
pub mod translator;
pub mod transport;
pub mod validation;
#[cfg(feature = "web")]
pub mod web;

// Re-export commonly used types
pub use action::{ActionKind, ActionOutcome, ActionRequest};
pub use command::Command;
pub use config::Config;
pub use controller::ChargeController;
pub use error::{KebaError, Result};
pub use station::{StationId, StationSnapshot};
