#![allow(dead_code)]

use async_trait::async_trait;
use keba_control::command::Command;
use keba_control::config::{ControlsConfig, StationConfig};
use keba_control::controller::ChargeController;
use keba_control::error::{KebaError, Result};
use keba_control::persistence::{FailsafeStore, MemoryStore};
use keba_control::station::StationId;
use keba_control::transport::Transport;
use std::sync::{Arc, Mutex};

/// Transport that records every command and can be told to fail
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(StationId, Command)>>,
    fail_kind: Mutex<Option<&'static str>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail every command of this kind (as in [`Command::kind`])
    pub fn fail_on(&self, kind: &'static str) {
        *self.fail_kind.lock().unwrap() = Some(kind);
    }

    pub fn heal(&self) {
        *self.fail_kind.lock().unwrap() = None;
    }

    pub fn sent(&self) -> Vec<Command> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn sent_to(&self, station: &str) -> Vec<Command> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s.as_str() == station)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, station: &StationId, command: &Command) -> Result<()> {
        if *self.fail_kind.lock().unwrap() == Some(command.kind()) {
            return Err(KebaError::transport(format!(
                "{} refused by {}",
                command.kind(),
                station
            )));
        }
        self.sent
            .lock()
            .unwrap()
            .push((station.clone(), command.clone()));
        Ok(())
    }
}

pub fn station(id: &str) -> StationConfig {
    StationConfig {
        id: id.to_string(),
        host: "192.168.1.50".to_string(),
        phases: 3,
        max_current: 32.0,
        ..Default::default()
    }
}

pub struct Harness {
    pub controller: ChargeController,
    pub transport: Arc<RecordingTransport>,
    pub store: Arc<MemoryStore>,
}

pub async fn harness_with_store(store: Arc<MemoryStore>, stations: &[&str]) -> Harness {
    let transport = RecordingTransport::new();
    let controller = ChargeController::new(
        ControlsConfig::default(),
        transport.clone(),
        store.clone() as Arc<dyn FailsafeStore>,
    );
    for id in stations {
        controller.register(station(id)).await.unwrap();
    }
    Harness {
        controller,
        transport,
        store,
    }
}

pub async fn harness(stations: &[&str]) -> Harness {
    harness_with_store(Arc::new(MemoryStore::new()), stations).await
}
