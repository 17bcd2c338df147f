//! Action surface: the requests callers submit and what they get back

use crate::command::Command;
use crate::error::{KebaError, Result};
use crate::failsafe::FailsafeConfig;
use crate::station::StationId;
use crate::validation::ValidatedFields;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of an action in the action surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    RequestData,
    Start,
    Stop,
    SetEnergy,
    SetCurrent,
    Enable,
    Disable,
    SetFailsafe,
    SetChargingPower,
    SetOutput,
    X2src,
    X2,
    Display,
    UnlockSocket,
}

impl ActionKind {
    pub const ALL: [ActionKind; 14] = [
        Self::RequestData,
        Self::Start,
        Self::Stop,
        Self::SetEnergy,
        Self::SetCurrent,
        Self::Enable,
        Self::Disable,
        Self::SetFailsafe,
        Self::SetChargingPower,
        Self::SetOutput,
        Self::X2src,
        Self::X2,
        Self::Display,
        Self::UnlockSocket,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RequestData => "request_data",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::SetEnergy => "set_energy",
            Self::SetCurrent => "set_current",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::SetFailsafe => "set_failsafe",
            Self::SetChargingPower => "set_charging_power",
            Self::SetOutput => "set_output",
            Self::X2src => "x2src",
            Self::X2 => "x2",
            Self::Display => "display",
            Self::UnlockSocket => "unlock_socket",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = KebaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| KebaError::unknown_action(s))
    }
}

/// Typed, validated action ready for translation
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    RequestData,
    Start {
        rfid: Option<String>,
        rfid_class: Option<String>,
    },
    Stop {
        rfid: Option<String>,
    },
    SetEnergy {
        kwh: f32,
    },
    SetCurrent {
        amps: f32,
        delay_seconds: u32,
    },
    Enable,
    Disable,
    SetFailsafe(FailsafeConfig),
    SetChargingPower {
        power_kw: f32,
        round_up: bool,
        stop_below_min: bool,
    },
    SetOutput {
        value: i64,
    },
    X2Source {
        source: u8,
    },
    X2 {
        three_phases: bool,
    },
    Display {
        text: String,
    },
    UnlockSocket,
}

impl Action {
    /// Build the typed action from a validated field set
    pub fn from_fields(fields: &ValidatedFields) -> Result<Self> {
        let action = match fields.action() {
            ActionKind::RequestData => Self::RequestData,
            ActionKind::Start => Self::Start {
                rfid: fields.text("rfid").map(str::to_string),
                rfid_class: fields.text("rfid_class").map(str::to_string),
            },
            ActionKind::Stop => Self::Stop {
                rfid: fields.text("rfid").map(str::to_string),
            },
            ActionKind::SetEnergy => Self::SetEnergy {
                kwh: fields.number("energy").unwrap_or(0.0) as f32,
            },
            ActionKind::SetCurrent => Self::SetCurrent {
                amps: fields.require_number("current")? as f32,
                delay_seconds: fields.require_number("delay")? as u32,
            },
            ActionKind::Enable => Self::Enable,
            ActionKind::Disable => Self::Disable,
            ActionKind::SetFailsafe => Self::SetFailsafe(FailsafeConfig {
                timeout_seconds: fields.require_number("failsafe_timeout")? as u32,
                fallback_current_a: fields.require_number("failsafe_fallback")? as f32,
                persist: fields.require_bool("failsafe_persist")?,
            }),
            ActionKind::SetChargingPower => Self::SetChargingPower {
                power_kw: fields.require_number("power")? as f32,
                round_up: fields.require_bool("round_up")?,
                stop_below_min: fields.require_bool("stop_below_6_ampere")?,
            },
            ActionKind::SetOutput => Self::SetOutput {
                value: fields.require_integer("out")?,
            },
            ActionKind::X2src => Self::X2Source {
                source: u8::try_from(fields.require_integer("source")?)
                    .map_err(|_| KebaError::validation("source", "out of range"))?,
            },
            ActionKind::X2 => Self::X2 {
                three_phases: fields.require_bool("three_phases")?,
            },
            ActionKind::Display => Self::Display {
                text: fields
                    .text("text")
                    .map(str::to_string)
                    .ok_or_else(|| KebaError::validation("text", "missing"))?,
            },
            ActionKind::UnlockSocket => Self::UnlockSocket,
        };
        Ok(action)
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::RequestData => ActionKind::RequestData,
            Self::Start { .. } => ActionKind::Start,
            Self::Stop { .. } => ActionKind::Stop,
            Self::SetEnergy { .. } => ActionKind::SetEnergy,
            Self::SetCurrent { .. } => ActionKind::SetCurrent,
            Self::Enable => ActionKind::Enable,
            Self::Disable => ActionKind::Disable,
            Self::SetFailsafe(_) => ActionKind::SetFailsafe,
            Self::SetChargingPower { .. } => ActionKind::SetChargingPower,
            Self::SetOutput { .. } => ActionKind::SetOutput,
            Self::X2Source { .. } => ActionKind::X2src,
            Self::X2 { .. } => ActionKind::X2,
            Self::Display { .. } => ActionKind::Display,
            Self::UnlockSocket => ActionKind::UnlockSocket,
        }
    }
}

/// Raw request as received from the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: ActionKind,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl ActionRequest {
    pub fn new(action: ActionKind, fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Self { action, fields }
    }

    /// Build from an action name and a JSON object body
    pub fn parse(action: &str, body: serde_json::Value) -> Result<Self> {
        Self::from_body(action.parse()?, body)
    }

    /// Build from an already parsed action and a JSON object body.
    ///
    /// A `null` body is an empty field map.
    pub fn from_body(action: ActionKind, body: serde_json::Value) -> Result<Self> {
        match body {
            serde_json::Value::Object(fields) => Ok(Self::new(action, fields)),
            serde_json::Value::Null => Ok(Self::new(action, serde_json::Map::new())),
            _ => Err(KebaError::validation("body", "must be a JSON object")),
        }
    }
}

/// Successful result of an action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub request_id: String,
    pub station: StationId,
    pub action: ActionKind,
    /// Commands acknowledged by the transport
    pub commands: Vec<Command>,
    /// Commands deferred by their delay
    pub scheduled: Vec<Command>,
    pub warnings: Vec<String>,
    /// Values derived during translation, e.g. the computed current
    pub derived: Option<serde_json::Value>,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_round_trip() {
        for kind in ActionKind::ALL {
            assert_eq!(kind.as_str().parse::<ActionKind>().unwrap(), kind);
        }
        assert!(matches!(
            "reboot".parse::<ActionKind>().unwrap_err(),
            KebaError::UnknownAction { .. }
        ));
    }

    #[test]
    fn parse_rejects_non_object_body() {
        assert!(ActionRequest::parse("start", serde_json::json!([1, 2])).is_err());
        let req = ActionRequest::parse("enable", serde_json::Value::Null).unwrap();
        assert_eq!(req.action, ActionKind::Enable);
        assert!(req.fields.is_empty());
    }
}
