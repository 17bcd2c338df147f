//! Low-level station commands
//!
//! A [`Command`] is what the translator produces and the dispatcher hands to
//! the transport. Commands carry already-validated values only.

use crate::error::{KebaError, Result};
use crate::failsafe::FailsafeConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lowest charging current the hardware accepts, in amperes
pub const MIN_CURRENT_A: f32 = 6.0;

/// Highest charging current the hardware accepts, in amperes
pub const MAX_CURRENT_A: f32 = 63.0;

/// Highest output value the station accepts (pulses per kWh)
pub const MAX_OUTPUT_VALUE: i64 = 150;

/// Output values the station reserves
pub const RESERVED_OUTPUT_VALUES: std::ops::RangeInclusive<i64> = 2..=9;

/// Behaviour of the X1 relay output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OutputMode {
    /// Relay open
    Open,
    /// Relay closed
    Closed,
    /// Relay emits pulses proportional to energy
    Pulses { per_kwh: u32 },
}

impl OutputMode {
    /// Interpret a raw `out` value, rejecting reserved values
    pub fn from_value(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Self::Open),
            1 => Ok(Self::Closed),
            v if RESERVED_OUTPUT_VALUES.contains(&v) => Err(KebaError::reserved("out", v)),
            v if (10..=MAX_OUTPUT_VALUE).contains(&v) => Ok(Self::Pulses { per_kwh: v as u32 }),
            v => Err(KebaError::validation(
                "out".to_string(),
                format!("{} is outside [0, {}]", v, MAX_OUTPUT_VALUE),
            )),
        }
    }

    /// Raw value as the station understands it
    pub fn value(self) -> u32 {
        match self {
            Self::Open => 0,
            Self::Closed => 1,
            Self::Pulses { per_kwh } => per_kwh,
        }
    }
}

/// Instruction sent to a single station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Command {
    Authorize {
        rfid: Option<String>,
        rfid_class: Option<String>,
    },
    Deauthorize {
        rfid: Option<String>,
    },
    SetCurrent {
        amps: f32,
        delay_seconds: u32,
    },
    SetEnergy {
        kwh: f32,
    },
    SetOutput {
        mode: OutputMode,
    },
    SetX2Source {
        source: u8,
    },
    SetX2Phase {
        three_phases: bool,
    },
    SetEnabled {
        enabled: bool,
    },
    RequestReport,
    ConfigureFailsafe {
        config: FailsafeConfig,
    },
    DisableFailsafe,
    Display {
        text: String,
    },
    UnlockSocket,
}

impl Command {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authorize { .. } => "authorize",
            Self::Deauthorize { .. } => "deauthorize",
            Self::SetCurrent { .. } => "setCurrent",
            Self::SetEnergy { .. } => "setEnergy",
            Self::SetOutput { .. } => "setOutput",
            Self::SetX2Source { .. } => "setX2Source",
            Self::SetX2Phase { .. } => "setX2Phase",
            Self::SetEnabled { .. } => "setEnabled",
            Self::RequestReport => "requestReport",
            Self::ConfigureFailsafe { .. } => "configureFailsafe",
            Self::DisableFailsafe => "disableFailsafe",
            Self::Display { .. } => "display",
            Self::UnlockSocket => "unlockSocket",
        }
    }

    /// Delay before this command may be dispatched, if any
    pub fn delay(&self) -> Option<Duration> {
        match self {
            Self::SetCurrent { delay_seconds, .. } if *delay_seconds > 0 => {
                Some(Duration::from_secs(u64::from(*delay_seconds)))
            }
            _ => None,
        }
    }

    /// Same command with its delay consumed
    pub fn without_delay(self) -> Self {
        match self {
            Self::SetCurrent { amps, .. } => Self::SetCurrent {
                amps,
                delay_seconds: 0,
            },
            other => other,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authorize { rfid, rfid_class } => write!(
                f,
                "authorize rfid={} class={}",
                rfid.as_deref().unwrap_or("-"),
                rfid_class.as_deref().unwrap_or("-")
            ),
            Self::Deauthorize { rfid } => {
                write!(f, "deauthorize rfid={}", rfid.as_deref().unwrap_or("-"))
            }
            Self::SetCurrent {
                amps,
                delay_seconds,
            } => write!(f, "setCurrent {}A delay={}s", amps, delay_seconds),
            Self::SetEnergy { kwh } => write!(f, "setEnergy {}kWh", kwh),
            Self::SetOutput { mode } => write!(f, "setOutput {}", mode.value()),
            Self::SetX2Source { source } => write!(f, "setX2Source {}", source),
            Self::SetX2Phase { three_phases } => {
                write!(f, "setX2Phase {}", if *three_phases { 3 } else { 1 })
            }
            Self::SetEnabled { enabled } => write!(f, "setEnabled {}", enabled),
            Self::ConfigureFailsafe { config } => write!(
                f,
                "configureFailsafe timeout={}s fallback={}A persist={}",
                config.timeout_seconds, config.fallback_current_a, config.persist
            ),
            Self::Display { text } => write!(f, "display {:?}", text),
            other => f.write_str(other.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_mode_mapping() {
        assert_eq!(OutputMode::from_value(0).unwrap(), OutputMode::Open);
        assert_eq!(OutputMode::from_value(1).unwrap(), OutputMode::Closed);
        assert_eq!(
            OutputMode::from_value(10).unwrap(),
            OutputMode::Pulses { per_kwh: 10 }
        );
        for reserved in 2..=9 {
            let err = OutputMode::from_value(reserved).unwrap_err();
            assert!(matches!(err, KebaError::ReservedValue { .. }));
        }
        assert!(matches!(
            OutputMode::from_value(151).unwrap_err(),
            KebaError::Validation { .. }
        ));
    }

    #[test]
    fn delay_is_only_reported_for_delayed_set_current() {
        let delayed = Command::SetCurrent {
            amps: 10.0,
            delay_seconds: 5,
        };
        assert_eq!(delayed.delay(), Some(Duration::from_secs(5)));
        assert_eq!(delayed.without_delay().delay(), None);
        assert_eq!(Command::RequestReport.delay(), None);
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(Command::SetX2Phase { three_phases: true }).unwrap();
        assert_eq!(json["kind"], "setX2Phase");
        assert_eq!(json["three_phases"], true);
    }
}
