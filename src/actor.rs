//! Station actor
//!
//! Each registered station runs in its own task that owns the
//! [`StationState`], the [`FailsafeTimer`] and the [`Dispatcher`]. Callers
//! talk to it through a bounded channel, so all state transitions of one
//! station are serialized while different stations proceed in parallel.
//!
//! The run loop is a biased `select!`: queued messages are handled before a
//! due deferred command or failsafe deadline, so a refresh that is already
//! queued when the deadline passes still wins.

use crate::action::{Action, ActionOutcome};
use crate::command::Command;
use crate::config::{ControlsConfig, StationConfig};
use crate::dispatcher::Dispatcher;
use crate::error::{KebaError, Result};
use crate::failsafe::{FailsafeConfig, FailsafeTimer};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::persistence::FailsafeStore;
use crate::station::{StationId, StationLimits, StationSnapshot, StationState};
use crate::transport::Transport;
use crate::translator::translate;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, sleep_until};

/// Messages accepted by a station actor
#[derive(Debug)]
pub enum StationMessage {
    Execute {
        request_id: String,
        action: Action,
        reply: oneshot::Sender<Result<ActionOutcome>>,
    },
    Connection {
        plugged: bool,
        reply: oneshot::Sender<StationSnapshot>,
    },
    Snapshot {
        reply: oneshot::Sender<StationSnapshot>,
    },
    Shutdown,
}

/// Cloneable sender side of a station actor
#[derive(Debug, Clone)]
pub struct StationClient {
    station: StationId,
    tx: mpsc::Sender<StationMessage>,
}

impl StationClient {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> StationMessage,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| self.stopped())?;
        // The actor only drops a reply if it died mid-request
        rx.await.map_err(|_| {
            KebaError::generic(format!("station {} dropped the request", self.station))
        })
    }

    fn stopped(&self) -> KebaError {
        KebaError::invalid_state(format!("station {} is shutting down", self.station))
    }

    pub async fn execute(&self, request_id: String, action: Action) -> Result<ActionOutcome> {
        self.request(|reply| StationMessage::Execute {
            request_id,
            action,
            reply,
        })
        .await?
    }

    pub async fn report_connection(&self, plugged: bool) -> Result<StationSnapshot> {
        self.request(|reply| StationMessage::Connection { plugged, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<StationSnapshot> {
        self.request(|reply| StationMessage::Snapshot { reply }).await
    }
}

/// Owning handle of a running station actor
#[derive(Debug)]
pub struct StationHandle {
    client: StationClient,
    task: JoinHandle<()>,
}

impl StationHandle {
    pub fn client(&self) -> StationClient {
        self.client.clone()
    }

    /// Stop the actor and wait for it to finish. Deferred commands are dropped.
    pub async fn shutdown(self) {
        // A closed channel means the actor is already gone
        let _ = self.client.tx.send(StationMessage::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::warn!("station actor {} ended abnormally: {}", self.client.station, e);
        }
    }
}

pub struct StationActor {
    state: StationState,
    limits: StationLimits,
    dispatcher: Dispatcher,
    failsafe: FailsafeTimer,
    store: Arc<dyn FailsafeStore>,
    rx: mpsc::Receiver<StationMessage>,
    logger: StructuredLogger,
}

impl StationActor {
    /// Spawn the actor for `station`.
    ///
    /// A `restored` failsafe configuration is armed immediately without being
    /// sent to the station again.
    pub fn spawn(
        station: &StationConfig,
        controls: &ControlsConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn FailsafeStore>,
        restored: Option<FailsafeConfig>,
    ) -> StationHandle {
        let limits = StationLimits::new(controls, station);
        let mut state = StationState::from_config(station, &limits);
        let id = state.id.clone();
        let logger =
            get_logger_with_context(LogContext::new("station").with_station(id.as_str()));

        let mut failsafe = FailsafeTimer::new();
        if let Some(stored) = restored.filter(|c| !c.is_disabled()) {
            let config = stored.with_fallback_limit(limits.max_current);
            if config != stored {
                logger.warn(&format!(
                    "Restored failsafe fallback {}A limited to station maximum {}A",
                    stored.fallback_current_a, limits.max_current
                ));
            }
            logger.info(&format!(
                "Restored failsafe: timeout={}s fallback={}A",
                config.timeout_seconds, config.fallback_current_a
            ));
            state.failsafe = config;
            failsafe.arm(config, Instant::now());
        }

        let (tx, rx) = mpsc::channel(controls.command_queue_capacity.max(1));
        let dispatcher = Dispatcher::new(
            id.clone(),
            transport,
            Duration::from_millis(controls.transport_timeout_ms),
        );
        let actor = Self {
            state,
            limits,
            dispatcher,
            failsafe,
            store,
            rx,
            logger,
        };
        let task = tokio::spawn(actor.run());
        StationHandle {
            client: StationClient { station: id, tx },
            task,
        }
    }

    async fn run(mut self) {
        self.logger.info("Station actor started");
        loop {
            let deferred_due = self.dispatcher.next_due();
            let failsafe_due = self.failsafe.deadline();

            tokio::select! {
                biased;
                msg = self.rx.recv() => match msg {
                    Some(StationMessage::Shutdown) | None => break,
                    Some(msg) => self.handle(msg).await,
                },
                _ = sleep_until(deferred_due.unwrap_or_else(Instant::now)), if deferred_due.is_some() => {
                    self.release_deferred().await;
                }
                _ = sleep_until(failsafe_due.unwrap_or_else(Instant::now)), if failsafe_due.is_some() => {
                    self.on_failsafe_expired().await;
                }
            }
        }
        let dropped = self.dispatcher.pending();
        if dropped > 0 {
            self.logger
                .warn(&format!("Dropping {} deferred command(s) on shutdown", dropped));
        }
        self.logger.info("Station actor stopped");
    }

    async fn handle(&mut self, msg: StationMessage) {
        match msg {
            StationMessage::Execute {
                request_id,
                action,
                reply,
            } => {
                let result = self.execute(request_id, action).await;
                // Caller may have given up waiting; the state is already applied
                let _ = reply.send(result);
            }
            StationMessage::Connection { plugged, reply } => {
                self.state.report_connection(plugged);
                self.logger.info(&format!(
                    "Vehicle {} ({:?})",
                    if plugged { "plugged in" } else { "unplugged" },
                    self.state.auth
                ));
                let _ = reply.send(self.snapshot());
            }
            StationMessage::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            StationMessage::Shutdown => {}
        }
    }

    async fn execute(&mut self, request_id: String, action: Action) -> Result<ActionOutcome> {
        let logger = self.logger.for_request(&request_id);
        let kind = action.kind();
        let now = Instant::now();

        let translation = translate(&action, &self.state, &self.limits, now).inspect_err(|e| {
            logger.warn(&format!("{} rejected: {}", kind, e));
        })?;

        let mut warnings = translation.warnings;
        let mut commands = Vec::with_capacity(translation.commands.len());
        let mut scheduled = Vec::new();

        for command in translation.commands {
            if let Some(delay) = command.delay() {
                scheduled.push(command.clone());
                self.dispatcher.defer(command.without_delay(), now + delay);
                continue;
            }
            if let Err(e) = self.dispatcher.send(&command).await {
                logger.error(&format!(
                    "{} aborted after {} acknowledged command(s): {}",
                    kind,
                    commands.len(),
                    e
                ));
                return Err(e);
            }
            warnings.extend(self.on_acknowledged(&command).await);
            commands.push(command);
        }

        for warning in &warnings {
            logger.warn(warning);
        }
        logger.info(&format!(
            "{} done: {} sent, {} scheduled",
            kind,
            commands.len(),
            scheduled.len()
        ));

        Ok(ActionOutcome {
            request_id,
            station: self.state.id.clone(),
            action: kind,
            commands,
            scheduled,
            warnings,
            derived: translation.derived,
            completed_at: Utc::now(),
        })
    }

    /// Apply an acknowledged command and its side effects
    async fn on_acknowledged(&mut self, command: &Command) -> Vec<String> {
        let now = Instant::now();
        self.state.apply_ack(command, now);

        let mut warnings = Vec::new();
        match command {
            Command::SetCurrent { .. } => {
                if self.failsafe.refresh(now) {
                    self.logger.trace("Failsafe refreshed");
                }
            }
            Command::Deauthorize { .. } => {
                self.dispatcher.cancel_deferred();
            }
            Command::ConfigureFailsafe { config } => {
                self.failsafe.arm(*config, now);
                self.logger.info(&format!(
                    "Failsafe armed: timeout={}s fallback={}A persist={}",
                    config.timeout_seconds, config.fallback_current_a, config.persist
                ));
                let stored = if config.persist {
                    self.store.save_failsafe(&self.state.id, config).await
                } else {
                    self.store.clear_failsafe(&self.state.id).await
                };
                warnings.extend(self.store_warning(stored));
            }
            Command::DisableFailsafe => {
                self.failsafe.disarm();
                self.dispatcher.cancel_deferred();
                self.logger.info("Failsafe disarmed");
                let cleared = self.store.clear_failsafe(&self.state.id).await;
                warnings.extend(self.store_warning(cleared));
            }
            _ => {}
        }
        warnings
    }

    fn store_warning(&self, result: Result<()>) -> Option<String> {
        result.err().map(|e| {
            let message = format!("failsafe persistence failed: {}", e);
            self.logger.error(&message);
            message
        })
    }

    async fn release_deferred(&mut self) {
        for command in self.dispatcher.take_due(Instant::now()) {
            match self.dispatcher.send(&command).await {
                Ok(()) => {
                    for warning in self.on_acknowledged(&command).await {
                        self.logger.warn(&warning);
                    }
                }
                Err(e) => self
                    .logger
                    .error(&format!("Deferred {} failed: {}", command, e)),
            }
        }
    }

    async fn on_failsafe_expired(&mut self) {
        let now = Instant::now();
        let Some(fallback) = self.failsafe.expire(now) else {
            return;
        };
        let command = Command::SetCurrent {
            amps: fallback,
            delay_seconds: 0,
        };
        self.logger.warn(&format!(
            "Failsafe expired (#{}); forcing {}A",
            self.failsafe.expirations(),
            fallback
        ));
        match self.dispatcher.send(&command).await {
            Ok(()) => self.state.apply_ack(&command, now),
            Err(e) => self
                .logger
                .error(&format!("Failsafe fallback not delivered, re-armed: {}", e)),
        }
    }

    fn snapshot(&self) -> StationSnapshot {
        let now = Instant::now();
        let mut snapshot = self.state.snapshot(now, self.limits.phase_switch_cooldown);
        snapshot.failsafe_status = self.failsafe.status();
        snapshot.failsafe_remaining_s = self
            .failsafe
            .remaining(now)
            .map(|d| d.as_secs_f64().ceil() as u64);
        snapshot.failsafe_expirations = self.failsafe.expirations();
        snapshot.pending_commands = self.dispatcher.pending();
        snapshot
    }
}
