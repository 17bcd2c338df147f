//! Transport seam between the controller and the station hardware
//!
//! The controller never talks to a socket directly. Every command goes through
//! a [`Transport`], which returns `Ok(())` only once the station acknowledged it.

use crate::command::Command;
use crate::error::Result;
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::station::StationId;
use async_trait::async_trait;

/// Delivers commands to stations
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one command and wait for its acknowledgement
    async fn send(&self, station: &StationId, command: &Command) -> Result<()>;
}

/// Transport that acknowledges everything and only logs the command.
///
/// Used when no hardware link is configured (dry run).
pub struct LogTransport {
    logger: StructuredLogger,
}

impl Default for LogTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LogTransport {
    pub fn new() -> Self {
        Self {
            logger: get_logger_with_context(
                LogContext::new("transport").with_field("mode", "dry_run".to_string()),
            ),
        }
    }
}

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, station: &StationId, command: &Command) -> Result<()> {
        self.logger
            .info(&format!("[{}] {} acknowledged", station, command));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_transport_acknowledges() {
        let transport = LogTransport::new();
        transport
            .send(&StationId::new("garage"), &Command::RequestReport)
            .await
            .unwrap();
    }
}
