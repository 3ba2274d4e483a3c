use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info};

use fsp_transport::EndpointAddress;
use fsp_types::FlowStage;

use crate::error::RegistryError;
use crate::info::FlowServiceInfo;

/// A registered service as returned by stage queries.
#[derive(Clone, Debug)]
pub struct RegisteredService {
    pub info: FlowServiceInfo,
    pub endpoint: EndpointAddress,
    pub registered_at: DateTime<Utc>,
}

struct Entry {
    service: RegisteredService,
    enabled: bool,
    disabled_stages: HashSet<FlowStage>,
}

/// Runtime bookkeeping of installed flow services.
///
/// Entries are keyed by service id and remembered in registration order,
/// which is the order stage queries return them in. Every mutation bumps a
/// watch-observable generation so coordinators can re-query on change.
pub struct ServiceRegistry {
    inner: RwLock<RegistryInner>,
    change_tx: watch::Sender<u64>,
}

struct RegistryInner {
    entries: HashMap<String, Entry>,
    order: Vec<String>,
    generation: u64,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        let (change_tx, _) = watch::channel(0);
        Self {
            inner: RwLock::new(RegistryInner {
                entries: HashMap::new(),
                order: Vec::new(),
                generation: 0,
            }),
            change_tx,
        }
    }

    /// Register a service under the endpoint address it is reachable at.
    pub fn register(
        &self,
        info: FlowServiceInfo,
        endpoint: EndpointAddress,
    ) -> Result<(), RegistryError> {
        let mut inner = self.write()?;
        if inner.entries.contains_key(&info.id) {
            return Err(RegistryError::DuplicateService {
                service_id: info.id,
            });
        }

        info!(service_id = %info.id, %endpoint, "flow service registered");
        let id = info.id.clone();
        inner.entries.insert(
            id.clone(),
            Entry {
                service: RegisteredService {
                    info,
                    endpoint,
                    registered_at: Utc::now(),
                },
                enabled: true,
                disabled_stages: HashSet::new(),
            },
        );
        inner.order.push(id);
        self.bump(inner);
        Ok(())
    }

    /// Remove a service entirely.
    pub fn deregister(&self, service_id: &str) -> Result<(), RegistryError> {
        let mut inner = self.write()?;
        if inner.entries.remove(service_id).is_none() {
            return Err(RegistryError::UnknownService {
                service_id: service_id.to_string(),
            });
        }
        inner.order.retain(|id| id != service_id);
        info!(service_id, "flow service deregistered");
        self.bump(inner);
        Ok(())
    }

    /// Enable or disable a whole service without removing it.
    pub fn set_service_enabled(&self, service_id: &str, enabled: bool) -> Result<(), RegistryError> {
        let mut inner = self.write()?;
        let entry = Self::entry_mut(&mut inner, service_id)?;
        entry.enabled = enabled;
        debug!(service_id, enabled, "service enablement changed");
        self.bump(inner);
        Ok(())
    }

    /// Enable or disable one stage of a service.
    ///
    /// Disabling a stage the service never advertised is a no-op on queries
    /// but still recorded, so re-advertising the stage later keeps it off.
    pub fn set_stage_enabled(
        &self,
        service_id: &str,
        stage: FlowStage,
        enabled: bool,
    ) -> Result<(), RegistryError> {
        let mut inner = self.write()?;
        let entry = Self::entry_mut(&mut inner, service_id)?;
        if enabled {
            entry.disabled_stages.remove(&stage);
        } else {
            entry.disabled_stages.insert(stage);
        }
        debug!(service_id, %stage, enabled, "stage enablement changed");
        self.bump(inner);
        Ok(())
    }

    /// The enabled services advertising `stage`, in registration order.
    pub fn services_for_stage(&self, stage: FlowStage) -> Result<Vec<RegisteredService>, RegistryError> {
        let inner = self.read()?;
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id))
            .filter(|entry| {
                entry.enabled
                    && entry.service.info.serves_stage(stage)
                    && !entry.disabled_stages.contains(&stage)
            })
            .map(|entry| entry.service.clone())
            .collect())
    }

    /// Resolve a service id to its endpoint address.
    pub fn resolve(&self, service_id: &str) -> Result<EndpointAddress, RegistryError> {
        let inner = self.read()?;
        inner
            .entries
            .get(service_id)
            .map(|entry| entry.service.endpoint.clone())
            .ok_or_else(|| RegistryError::UnknownService {
                service_id: service_id.to_string(),
            })
    }

    /// All registered services, in registration order.
    pub fn services(&self) -> Result<Vec<RegisteredService>, RegistryError> {
        let inner = self.read()?;
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.entries.get(id))
            .map(|entry| entry.service.clone())
            .collect())
    }

    /// Observe registry changes. The value is a generation counter; any
    /// change bumps it, prompting observers to re-query.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.change_tx.subscribe()
    }

    fn entry_mut<'a>(
        inner: &'a mut RegistryInner,
        service_id: &str,
    ) -> Result<&'a mut Entry, RegistryError> {
        inner
            .entries
            .get_mut(service_id)
            .ok_or_else(|| RegistryError::UnknownService {
                service_id: service_id.to_string(),
            })
    }

    fn bump(&self, mut inner: std::sync::RwLockWriteGuard<'_, RegistryInner>) {
        inner.generation += 1;
        let generation = inner.generation;
        drop(inner);
        let _ = self.change_tx.send(generation);
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, RegistryInner>, RegistryError> {
        self.inner.read().map_err(|_| RegistryError::LockPoisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, RegistryInner>, RegistryError> {
        self.inner.write().map_err(|_| RegistryError::LockPoisoned)
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
