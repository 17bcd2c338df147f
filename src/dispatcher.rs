//! Per-station command dispatcher
//!
//! Sends commands one at a time with a bounded wait for the acknowledgement.
//! Delayed commands are parked in a queue ordered by due time and then by
//! enqueue order; the station actor polls [`Dispatcher::next_due`] and
//! releases them with [`Dispatcher::take_due`].

use crate::command::Command;
use crate::error::{KebaError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::station::StationId;
use crate::transport::Transport;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::{Duration, Instant, timeout};

pub struct Dispatcher {
    station: StationId,
    transport: Arc<dyn Transport>,
    send_timeout: Duration,
    deferred: BTreeMap<(Instant, u64), Command>,
    seq: u64,
    logger: StructuredLogger,
}

impl Dispatcher {
    pub fn new(station: StationId, transport: Arc<dyn Transport>, send_timeout: Duration) -> Self {
        let logger = get_logger_with_context(
            LogContext::new("dispatcher").with_station(station.as_str()),
        );
        Self {
            station,
            transport,
            send_timeout,
            deferred: BTreeMap::new(),
            seq: 0,
            logger,
        }
    }

    /// Send one command and wait for the acknowledgement.
    ///
    /// No retries; a timeout is reported as [`KebaError::Timeout`].
    pub async fn send(&self, command: &Command) -> Result<()> {
        self.logger.debug(&format!("Sending {}", command));

        match timeout(self.send_timeout, self.transport.send(&self.station, command)).await {
            Ok(Ok(())) => {
                self.logger.debug(&format!("{} acknowledged", command.kind()));
                Ok(())
            }
            Ok(Err(e)) => {
                let error_msg = format!("Failed to send {}: {}", command.kind(), e);
                self.logger.error(&error_msg);
                match e {
                    KebaError::Transport { .. } | KebaError::Timeout { .. } => Err(e),
                    other => Err(KebaError::transport(other.to_string())),
                }
            }
            Err(_) => {
                let error_msg = format!(
                    "{} not acknowledged within {}ms",
                    command.kind(),
                    self.send_timeout.as_millis()
                );
                self.logger.error(&error_msg);
                Err(KebaError::timeout(error_msg))
            }
        }
    }

    /// Park `command` until `due`
    pub fn defer(&mut self, command: Command, due: Instant) {
        self.seq = self.seq.wrapping_add(1);
        self.logger.debug(&format!(
            "Deferred {} ({} pending)",
            command,
            self.deferred.len() + 1
        ));
        self.deferred.insert((due, self.seq), command);
    }

    /// Due time of the earliest deferred command
    pub fn next_due(&self) -> Option<Instant> {
        self.deferred.keys().next().map(|(due, _)| *due)
    }

    /// Remove and return every deferred command due at `now`, in order
    pub fn take_due(&mut self, now: Instant) -> Vec<Command> {
        let later = self.deferred.split_off(&(now, u64::MAX));
        let due = std::mem::replace(&mut self.deferred, later);
        due.into_values().collect()
    }

    /// Drop all deferred commands, returning how many were cancelled
    pub fn cancel_deferred(&mut self) -> usize {
        let cancelled = self.deferred.len();
        if cancelled > 0 {
            self.logger
                .info(&format!("Cancelled {} deferred command(s)", cancelled));
        }
        self.deferred.clear();
        cancelled
    }

    pub fn pending(&self) -> usize {
        self.deferred.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Silent;

    #[async_trait]
    impl Transport for Silent {
        async fn send(&self, _: &StationId, _: &Command) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn current(amps: f32) -> Command {
        Command::SetCurrent {
            amps,
            delay_seconds: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_send_times_out() {
        let d = Dispatcher::new(
            StationId::new("a"),
            Arc::new(Silent),
            Duration::from_millis(500),
        );
        let err = d.send(&Command::RequestReport).await.unwrap_err();
        assert_eq!(err.code(), "transport_timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_commands_release_in_due_then_enqueue_order() {
        let mut d = Dispatcher::new(
            StationId::new("a"),
            Arc::new(Silent),
            Duration::from_millis(500),
        );
        let now = Instant::now();
        d.defer(current(10.0), now + Duration::from_secs(5));
        d.defer(current(8.0), now + Duration::from_secs(2));
        d.defer(current(9.0), now + Duration::from_secs(2));
        assert_eq!(d.next_due(), Some(now + Duration::from_secs(2)));

        assert!(d.take_due(now).is_empty());
        let due = d.take_due(now + Duration::from_secs(2));
        assert_eq!(due, vec![current(8.0), current(9.0)]);
        assert_eq!(d.pending(), 1);

        assert_eq!(d.cancel_deferred(), 1);
        assert_eq!(d.next_due(), None);
    }
}
