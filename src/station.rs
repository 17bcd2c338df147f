//! Station state machine
//!
//! [`StationState`] is owned by exactly one station actor. It only moves
//! forward when the transport has acknowledged a command (see
//! [`StationState::apply_ack`]) or when the hardware reports a connection
//! change.

use crate::command::{Command, OutputMode};
use crate::config::{ControlsConfig, StationConfig};
use crate::failsafe::{FailsafeConfig, FailsafeStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::{Duration, Instant};

/// Opaque station identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(String);

impl StationId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StationId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Authorization lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Unauthorized,
    Authorized,
    Charging,
}

/// Phase relay position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseMode {
    One,
    Three,
}

impl PhaseMode {
    pub fn from_three_phases(three_phases: bool) -> Self {
        if three_phases { Self::Three } else { Self::One }
    }

    pub fn count(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Three => 3,
        }
    }
}

/// Limits a station's commands are checked and derived against
#[derive(Debug, Clone)]
pub struct StationLimits {
    pub min_current: f32,
    /// Hardware maximum of this station
    pub max_current: f32,
    pub line_voltage: f32,
    pub phase_switch_cooldown: Duration,
    pub default_rfid: Option<String>,
    pub default_rfid_class: Option<String>,
}

impl StationLimits {
    pub fn new(controls: &ControlsConfig, station: &StationConfig) -> Self {
        Self {
            min_current: controls.min_current,
            max_current: station.max_current.min(controls.max_current),
            line_voltage: controls.line_voltage,
            phase_switch_cooldown: Duration::from_secs(controls.phase_switch_cooldown_seconds),
            default_rfid: station.rfid.clone(),
            default_rfid_class: station.rfid_class.clone(),
        }
    }
}

/// Mutable control state of one station
#[derive(Debug, Clone)]
pub struct StationState {
    pub id: StationId,
    pub auth: AuthState,
    pub enabled: bool,
    pub plugged: bool,
    pub active_current_limit_a: f32,
    /// `0.0` means no energy limit
    pub active_energy_limit_kwh: f32,
    pub phase_mode: PhaseMode,
    pub last_phase_switch_at: Option<Instant>,
    pub failsafe: FailsafeConfig,
    pub output: Option<OutputMode>,
    pub x2_source: Option<u8>,
    pub last_rfid: Option<String>,
    pub last_ack_at: Option<DateTime<Utc>>,
}

impl StationState {
    pub fn new(id: StationId, phase_mode: PhaseMode, initial_current_a: f32) -> Self {
        Self {
            id,
            auth: AuthState::Unauthorized,
            enabled: true,
            plugged: false,
            active_current_limit_a: initial_current_a,
            active_energy_limit_kwh: 0.0,
            phase_mode,
            last_phase_switch_at: None,
            failsafe: FailsafeConfig::disabled(),
            output: None,
            x2_source: None,
            last_rfid: None,
            last_ack_at: None,
        }
    }

    pub fn from_config(config: &StationConfig, limits: &StationLimits) -> Self {
        Self::new(
            StationId::new(config.id.as_str()),
            PhaseMode::from_three_phases(config.phases == 3),
            limits.max_current,
        )
    }

    pub fn is_authorized(&self) -> bool {
        !matches!(self.auth, AuthState::Unauthorized)
    }

    pub fn failsafe_status(&self) -> FailsafeStatus {
        if self.failsafe.is_disabled() {
            FailsafeStatus::Disarmed
        } else {
            FailsafeStatus::Armed
        }
    }

    /// Time left in the phase switch cooldown, if one is running
    pub fn cooldown_remaining(&self, now: Instant, cooldown: Duration) -> Option<Duration> {
        let last = self.last_phase_switch_at?;
        let elapsed = now.saturating_duration_since(last);
        (elapsed < cooldown).then(|| cooldown - elapsed)
    }

    /// Advance the state for a command the transport acknowledged
    pub fn apply_ack(&mut self, command: &Command, now: Instant) {
        match command {
            Command::Authorize { rfid, .. } => {
                if self.auth == AuthState::Unauthorized {
                    self.auth = AuthState::Authorized;
                }
                if rfid.is_some() {
                    self.last_rfid = rfid.clone();
                }
            }
            Command::Deauthorize { .. } => {
                self.auth = AuthState::Unauthorized;
            }
            Command::SetCurrent { amps, .. } => {
                self.active_current_limit_a = *amps;
            }
            Command::SetEnergy { kwh } => {
                self.active_energy_limit_kwh = *kwh;
            }
            Command::SetOutput { mode } => self.output = Some(*mode),
            Command::SetX2Source { source } => self.x2_source = Some(*source),
            Command::SetX2Phase { three_phases } => {
                self.phase_mode = PhaseMode::from_three_phases(*three_phases);
                self.last_phase_switch_at = Some(now);
            }
            Command::SetEnabled { enabled } => self.enabled = *enabled,
            Command::ConfigureFailsafe { config } => self.failsafe = *config,
            Command::DisableFailsafe => self.failsafe = FailsafeConfig::disabled(),
            Command::RequestReport | Command::Display { .. } | Command::UnlockSocket => {}
        }
        self.last_ack_at = Some(Utc::now());
        self.update_charging();
    }

    /// Hardware reported the vehicle plug state
    pub fn report_connection(&mut self, plugged: bool) {
        self.plugged = plugged;
        self.update_charging();
    }

    fn update_charging(&mut self) {
        let can_charge = self.enabled && self.plugged && self.active_current_limit_a > 0.0;
        self.auth = match self.auth {
            AuthState::Authorized if can_charge => AuthState::Charging,
            AuthState::Charging if !can_charge => AuthState::Authorized,
            other => other,
        };
    }

    pub fn snapshot(&self, now: Instant, cooldown: Duration) -> StationSnapshot {
        StationSnapshot {
            station: self.id.clone(),
            auth: self.auth,
            enabled: self.enabled,
            plugged: self.plugged,
            active_current_limit_a: self.active_current_limit_a,
            active_energy_limit_kwh: self.active_energy_limit_kwh,
            phases: self.phase_mode.count(),
            phase_switch_cooldown_remaining_s: self
                .cooldown_remaining(now, cooldown)
                .map(|d| d.as_secs_f64().ceil() as u64),
            failsafe: self.failsafe,
            failsafe_status: self.failsafe_status(),
            failsafe_remaining_s: None,
            failsafe_expirations: 0,
            output: self.output.map(OutputMode::value),
            x2_source: self.x2_source,
            pending_commands: 0,
            last_ack_at: self.last_ack_at.map(|t| t.to_rfc3339()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Read-only view of a station handed out by the actor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationSnapshot {
    pub station: StationId,
    pub auth: AuthState,
    pub enabled: bool,
    pub plugged: bool,
    pub active_current_limit_a: f32,
    pub active_energy_limit_kwh: f32,
    pub phases: u8,
    pub phase_switch_cooldown_remaining_s: Option<u64>,
    pub failsafe: FailsafeConfig,
    pub failsafe_status: FailsafeStatus,
    pub failsafe_remaining_s: Option<u64>,
    pub failsafe_expirations: u64,
    pub output: Option<u32>,
    pub x2_source: Option<u8>,
    /// Deferred commands waiting for their delay
    pub pending_commands: usize,
    pub last_ack_at: Option<String>,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> StationState {
        StationState::new(StationId::new("garage"), PhaseMode::Three, 16.0)
    }

    #[tokio::test(start_paused = true)]
    async fn authorize_then_plug_starts_charging() {
        let mut s = state();
        let now = Instant::now();
        s.apply_ack(
            &Command::Authorize {
                rfid: Some("00845500".into()),
                rfid_class: None,
            },
            now,
        );
        assert_eq!(s.auth, AuthState::Authorized);

        s.report_connection(true);
        assert_eq!(s.auth, AuthState::Charging);

        s.report_connection(false);
        assert_eq!(s.auth, AuthState::Authorized);

        s.report_connection(true);
        s.apply_ack(&Command::Deauthorize { rfid: None }, now);
        assert_eq!(s.auth, AuthState::Unauthorized);
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_station_leaves_charging() {
        let mut s = state();
        let now = Instant::now();
        s.apply_ack(
            &Command::Authorize {
                rfid: None,
                rfid_class: None,
            },
            now,
        );
        s.report_connection(true);
        s.apply_ack(&Command::SetEnabled { enabled: false }, now);
        assert_eq!(s.auth, AuthState::Authorized);
    }

    #[tokio::test(start_paused = true)]
    async fn phase_switch_starts_cooldown() {
        let mut s = state();
        let now = Instant::now();
        let cooldown = Duration::from_secs(300);
        assert!(s.cooldown_remaining(now, cooldown).is_none());

        s.apply_ack(&Command::SetX2Phase { three_phases: false }, now);
        assert_eq!(s.phase_mode, PhaseMode::One);
        assert_eq!(
            s.cooldown_remaining(now + Duration::from_secs(100), cooldown),
            Some(Duration::from_secs(200))
        );
        assert!(
            s.cooldown_remaining(now + Duration::from_secs(300), cooldown)
                .is_none()
        );
    }
}
