//! Command translation
//!
//! Turns one validated [`Action`] into the [`Command`]s that implement it,
//! given the station's current state. Translation never mutates state; the
//! station actor applies state changes once the transport acknowledges.

use crate::action::Action;
use crate::command::{Command, OutputMode};
use crate::error::{KebaError, Result};
use crate::station::{StationLimits, StationState};
use serde_json::json;
use tokio::time::Instant;

// Tolerance around whole amperes; power arrives as f32 and carries its noise
const CURRENT_EPSILON: f64 = 1e-3;

/// Commands produced for one action
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Translation {
    pub commands: Vec<Command>,
    pub warnings: Vec<String>,
    pub derived: Option<serde_json::Value>,
}

impl Translation {
    fn single(command: Command) -> Self {
        Self {
            commands: vec![command],
            ..Default::default()
        }
    }

    fn warn(mut self, condition: bool, message: impl FnOnce() -> String) -> Self {
        if condition {
            self.warnings.push(message());
        }
        self
    }
}

/// Result of converting a power target into a per-phase current
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PowerCurrent {
    /// Current to apply and whether it was clamped
    Current { amps: f32, clamped: bool },
    /// Derived current is below the minimum and the caller asked to stop
    Stop { derived_amps: f32 },
}

/// Convert `power_kw` into a whole-ampere current per phase.
///
/// `I = P * 1000 / (phases * line_voltage)`, rounded up or down to 1 A,
/// then held inside `[min_current, max_current]` unless `stop_below_min`
/// applies.
pub fn current_for_power(
    power_kw: f32,
    phases: u8,
    limits: &StationLimits,
    round_up: bool,
    stop_below_min: bool,
) -> PowerCurrent {
    let exact = f64::from(power_kw) * 1000.0 / (f64::from(phases) * f64::from(limits.line_voltage));
    let rounded = if round_up {
        (exact - CURRENT_EPSILON).ceil()
    } else {
        (exact + CURRENT_EPSILON).floor()
    }
    .max(0.0) as f32;

    if rounded < limits.min_current {
        if stop_below_min {
            return PowerCurrent::Stop {
                derived_amps: rounded,
            };
        }
        return PowerCurrent::Current {
            amps: limits.min_current,
            clamped: true,
        };
    }
    if rounded > limits.max_current {
        return PowerCurrent::Current {
            amps: limits.max_current,
            clamped: true,
        };
    }
    PowerCurrent::Current {
        amps: rounded,
        clamped: false,
    }
}

/// Translate `action` against the current station state
pub fn translate(
    action: &Action,
    state: &StationState,
    limits: &StationLimits,
    now: Instant,
) -> Result<Translation> {
    let unauthorized = !state.is_authorized();
    let translation = match action {
        Action::RequestData => Translation::single(Command::RequestReport),

        Action::Start { rfid, rfid_class } => {
            let (rfid, rfid_class) = match rfid {
                Some(tag) => (Some(tag.clone()), rfid_class.clone()),
                None => (
                    limits.default_rfid.clone(),
                    rfid_class.clone().or_else(|| limits.default_rfid_class.clone()),
                ),
            };
            Translation::single(Command::Authorize { rfid, rfid_class })
        }

        Action::Stop { rfid } => Translation::single(Command::Deauthorize {
            rfid: rfid.clone().or_else(|| limits.default_rfid.clone()),
        }),

        Action::SetEnergy { kwh } => Translation {
            derived: Some(json!({ "energy_limit_kwh": kwh, "cleared": *kwh == 0.0 })),
            ..Translation::single(Command::SetEnergy { kwh: *kwh })
        },

        Action::SetCurrent {
            amps,
            delay_seconds,
        } => {
            let clamped = *amps > limits.max_current;
            let amps = amps.min(limits.max_current);
            Translation {
                derived: Some(json!({ "current": amps })),
                ..Translation::single(Command::SetCurrent {
                    amps,
                    delay_seconds: *delay_seconds,
                })
            }
            .warn(clamped, || {
                format!("current limited to station maximum {}A", limits.max_current)
            })
            .warn(unauthorized, not_authorized_warning)
        }

        Action::Enable => Translation::single(Command::SetEnabled { enabled: true }),
        Action::Disable => Translation::single(Command::SetEnabled { enabled: false }),

        Action::SetFailsafe(config) => {
            if config.is_disabled() {
                Translation::single(Command::DisableFailsafe)
            } else {
                let limited = config.with_fallback_limit(limits.max_current);
                Translation::single(Command::ConfigureFailsafe { config: limited })
                    .warn(limited != *config, || {
                        format!(
                            "failsafe fallback limited to station maximum {}A",
                            limits.max_current
                        )
                    })
            }
        }

        Action::SetChargingPower {
            power_kw,
            round_up,
            stop_below_min,
        } => {
            let phases = state.phase_mode.count();
            match current_for_power(*power_kw, phases, limits, *round_up, *stop_below_min) {
                PowerCurrent::Stop { derived_amps } => Translation {
                    derived: Some(json!({
                        "current": derived_amps,
                        "phases": phases,
                        "stopped": true,
                    })),
                    ..Translation::single(Command::Deauthorize {
                        rfid: state
                            .last_rfid
                            .clone()
                            .or_else(|| limits.default_rfid.clone()),
                    })
                },
                PowerCurrent::Current { amps, clamped } => Translation {
                    derived: Some(json!({
                        "current": amps,
                        "phases": phases,
                        "stopped": false,
                    })),
                    ..Translation::single(Command::SetCurrent {
                        amps,
                        delay_seconds: 0,
                    })
                }
                .warn(clamped, || {
                    format!(
                        "{}kW needs a current outside [{}, {}]A; clamped to {}A",
                        power_kw, limits.min_current, limits.max_current, amps
                    )
                })
                .warn(unauthorized, not_authorized_warning),
            }
        }

        Action::SetOutput { value } => Translation::single(Command::SetOutput {
            mode: OutputMode::from_value(*value)?,
        }),

        Action::X2Source { source } => {
            Translation::single(Command::SetX2Source { source: *source })
        }

        Action::X2 { three_phases } => {
            if let Some(remaining) = state.cooldown_remaining(now, limits.phase_switch_cooldown) {
                return Err(KebaError::cooldown(remaining.as_secs_f64().ceil() as u64));
            }
            Translation::single(Command::SetX2Phase {
                three_phases: *three_phases,
            })
        }

        Action::Display { text } => Translation::single(Command::Display { text: text.clone() }),

        Action::UnlockSocket => Translation::single(Command::UnlockSocket),
    };
    Ok(translation)
}

fn not_authorized_warning() -> String {
    "station is not authorized; the limit applies once charging is authorized".to_string()
}
