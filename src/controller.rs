//! Charge controller: station registry and action routing
//!
//! Validates incoming requests, turns them into typed [`Action`]s and routes
//! them to the owning station actor. The registry lock is only held to look up
//! or insert handles; actions execute without it.

use crate::action::{Action, ActionOutcome, ActionRequest};
use crate::actor::{StationActor, StationClient, StationHandle};
use crate::config::{Config, ControlsConfig, StationConfig};
use crate::error::{KebaError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::persistence::FailsafeStore;
use crate::station::{StationId, StationSnapshot};
use crate::transport::Transport;
use crate::validation::validate_request;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub struct ChargeController {
    controls: ControlsConfig,
    transport: Arc<dyn Transport>,
    store: Arc<dyn FailsafeStore>,
    stations: RwLock<HashMap<StationId, StationHandle>>,
    logger: StructuredLogger,
}

impl ChargeController {
    pub fn new(
        controls: ControlsConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn FailsafeStore>,
    ) -> Self {
        Self {
            controls,
            transport,
            store,
            stations: RwLock::new(HashMap::new()),
            logger: get_logger("controller"),
        }
    }

    /// Build a controller and register every configured station
    pub async fn from_config(
        config: &Config,
        transport: Arc<dyn Transport>,
        store: Arc<dyn FailsafeStore>,
    ) -> Result<Self> {
        config.controls.validate()?;
        let controller = Self::new(config.controls.clone(), transport, store);
        for station in &config.stations {
            controller.register(station.clone()).await?;
        }
        Ok(controller)
    }

    /// Start an actor for `station`, restoring a persisted failsafe if any
    pub async fn register(&self, station: StationConfig) -> Result<StationId> {
        station.validate(&self.controls)?;
        let id = StationId::new(station.id.as_str());
        if self.stations.read().await.contains_key(&id) {
            return Err(KebaError::StationExists {
                station: id.to_string(),
            });
        }

        let restored = match self.store.load_failsafe(&id).await {
            Ok(restored) => restored,
            Err(e) => {
                self.logger.error(&format!(
                    "Could not load persisted failsafe for {}: {}",
                    id, e
                ));
                None
            }
        };

        let mut stations = self.stations.write().await;
        if stations.contains_key(&id) {
            return Err(KebaError::StationExists {
                station: id.to_string(),
            });
        }
        let handle = StationActor::spawn(
            &station,
            &self.controls,
            Arc::clone(&self.transport),
            Arc::clone(&self.store),
            restored,
        );
        stations.insert(id.clone(), handle);
        self.logger.info(&format!(
            "Registered station {} ({}, {} phase(s), max {}A)",
            id,
            if station.host.is_empty() { "no host" } else { station.host.as_str() },
            station.phases,
            station.max_current
        ));
        Ok(id)
    }

    /// Stop and forget a station. Its persisted failsafe entry is kept.
    pub async fn remove(&self, station: &StationId) -> Result<()> {
        let handle = self
            .stations
            .write()
            .await
            .remove(station)
            .ok_or_else(|| KebaError::unknown_station(station.as_str()))?;
        handle.shutdown().await;
        self.logger.info(&format!("Removed station {}", station));
        Ok(())
    }

    async fn client(&self, station: &StationId) -> Result<StationClient> {
        self.stations
            .read()
            .await
            .get(station)
            .map(StationHandle::client)
            .ok_or_else(|| KebaError::unknown_station(station.as_str()))
    }

    /// Validate, route and execute one action request
    pub async fn execute(&self, request: ActionRequest) -> Result<ActionOutcome> {
        let request_id = Uuid::new_v4().to_string();
        let logger = self.logger.for_request(&request_id);

        let fields = validate_request(request.action, &request.fields).inspect_err(|e| {
            logger.warn(&format!("{} rejected: {}", request.action, e));
        })?;
        let action = Action::from_fields(&fields)?;
        let client = self.client(fields.station()).await?;

        logger.debug(&format!("Routing {} to {}", request.action, fields.station()));
        client.execute(request_id, action).await
    }

    /// Convenience entry taking the action name and a JSON body
    pub async fn execute_raw(&self, action: &str, body: serde_json::Value) -> Result<ActionOutcome> {
        self.execute(ActionRequest::parse(action, body)?).await
    }

    /// Hardware report of the vehicle plug state
    pub async fn report_connection(
        &self,
        station: &StationId,
        plugged: bool,
    ) -> Result<StationSnapshot> {
        self.client(station).await?.report_connection(plugged).await
    }

    pub async fn snapshot(&self, station: &StationId) -> Result<StationSnapshot> {
        self.client(station).await?.snapshot().await
    }

    /// Snapshots of all stations, ordered by id
    pub async fn snapshots(&self) -> Vec<StationSnapshot> {
        let clients: Vec<StationClient> = self
            .stations
            .read()
            .await
            .values()
            .map(StationHandle::client)
            .collect();

        let mut snapshots = Vec::with_capacity(clients.len());
        for client in clients {
            match client.snapshot().await {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => self.logger.warn(&format!("Skipping snapshot: {}", e)),
            }
        }
        snapshots.sort_by(|a, b| a.station.cmp(&b.station));
        snapshots
    }

    /// Stop every station actor
    pub async fn shutdown(&self) {
        let handles: Vec<StationHandle> =
            self.stations.write().await.drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.shutdown().await;
        }
        self.logger.info("All station actors stopped");
    }
}
