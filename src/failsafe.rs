//! Failsafe configuration and countdown
//!
//! A station with an armed failsafe must receive a `setCurrent` refresh within
//! `timeout_seconds`; otherwise the station actor forces the fallback current
//! and starts the next cycle. The countdown itself is a plain deadline that the
//! station actor polls from its `select!` loop, so expiry and refresh are
//! handled by the same task.

use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

pub const MIN_TIMEOUT_SECONDS: u32 = 1;
pub const MAX_TIMEOUT_SECONDS: u32 = 3600;

/// Failsafe parameters; all-zero means disabled
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct FailsafeConfig {
    /// Seconds without refresh before the fallback current is forced
    pub timeout_seconds: u32,
    /// Current forced on expiry
    pub fallback_current_a: f32,
    /// Whether the configuration survives a restart
    pub persist: bool,
}

impl FailsafeConfig {
    /// The disabled configuration
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_disabled(&self) -> bool {
        self.timeout_seconds == 0 && self.fallback_current_a == 0.0 && !self.persist
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_seconds))
    }

    /// Same configuration with the fallback held at or below `max_current`
    pub fn with_fallback_limit(self, max_current: f32) -> Self {
        Self {
            fallback_current_a: self.fallback_current_a.min(max_current),
            ..self
        }
    }
}

/// Armed/disarmed view used in snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailsafeStatus {
    Armed,
    Disarmed,
}

/// Per-station failsafe countdown
#[derive(Debug, Clone)]
pub struct FailsafeTimer {
    config: FailsafeConfig,
    deadline: Option<Instant>,
    expirations: u64,
}

impl Default for FailsafeTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl FailsafeTimer {
    pub fn new() -> Self {
        Self {
            config: FailsafeConfig::disabled(),
            deadline: None,
            expirations: 0,
        }
    }

    /// Arm with `config` and start counting from `now`.
    ///
    /// A disabled configuration disarms instead.
    pub fn arm(&mut self, config: FailsafeConfig, now: Instant) {
        if config.is_disabled() {
            self.disarm();
            return;
        }
        self.config = config;
        self.deadline = Some(now + config.timeout());
    }

    pub fn disarm(&mut self) {
        self.config = FailsafeConfig::disabled();
        self.deadline = None;
    }

    /// Restart the countdown after a refresh. Returns false when disarmed.
    pub fn refresh(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(_) => {
                self.deadline = Some(now + self.config.timeout());
                true
            }
            None => false,
        }
    }

    /// Record an expiry and start the next cycle.
    ///
    /// Returns the fallback current to force, or `None` if not armed.
    pub fn expire(&mut self, now: Instant) -> Option<f32> {
        self.deadline?;
        self.expirations = self.expirations.saturating_add(1);
        self.deadline = Some(now + self.config.timeout());
        Some(self.config.fallback_current_a)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn status(&self) -> FailsafeStatus {
        if self.deadline.is_some() {
            FailsafeStatus::Armed
        } else {
            FailsafeStatus::Disarmed
        }
    }

    /// Number of expiries since the actor started
    pub fn expirations(&self) -> u64 {
        self.expirations
    }

    /// Time left before expiry
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armed_config() -> FailsafeConfig {
        FailsafeConfig {
            timeout_seconds: 30,
            fallback_current_a: 6.0,
            persist: false,
        }
    }

    #[test]
    fn all_zero_is_disabled() {
        assert!(FailsafeConfig::disabled().is_disabled());
        assert!(!armed_config().is_disabled());
        let persist_only = FailsafeConfig {
            persist: true,
            ..FailsafeConfig::disabled()
        };
        assert!(!persist_only.is_disabled());
    }

    #[test]
    fn fallback_is_limited_to_station_maximum() {
        let config = FailsafeConfig {
            fallback_current_a: 50.0,
            ..armed_config()
        };
        assert_eq!(config.with_fallback_limit(32.0).fallback_current_a, 32.0);
        assert_eq!(armed_config().with_fallback_limit(32.0), armed_config());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_pushes_deadline() {
        let mut timer = FailsafeTimer::new();
        let start = Instant::now();
        timer.arm(armed_config(), start);
        assert_eq!(timer.status(), FailsafeStatus::Armed);

        let later = start + Duration::from_secs(20);
        assert!(timer.refresh(later));
        assert_eq!(timer.deadline(), Some(later + Duration::from_secs(30)));
        assert_eq!(
            timer.remaining(start + Duration::from_secs(31)),
            Some(Duration::from_secs(19))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn expire_rearms_and_counts() {
        let mut timer = FailsafeTimer::new();
        let start = Instant::now();
        timer.arm(armed_config(), start);

        let at = start + Duration::from_secs(30);
        assert_eq!(timer.expire(at), Some(6.0));
        assert_eq!(timer.expirations(), 1);
        assert_eq!(timer.deadline(), Some(at + Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn arming_with_disabled_config_disarms() {
        let mut timer = FailsafeTimer::new();
        let now = Instant::now();
        timer.arm(armed_config(), now);
        timer.arm(FailsafeConfig::disabled(), now);
        assert_eq!(timer.status(), FailsafeStatus::Disarmed);
        assert!(!timer.refresh(now));
        assert_eq!(timer.expire(now), None);
    }
}
