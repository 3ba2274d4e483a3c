use std::sync::Arc;

use fsp_registry::{RegisteredService, ServiceRegistry};
use fsp_transport::TransportHub;
use fsp_types::metadata::extensions;
use fsp_types::{FlowStage, InternalData, API_VERSION};

use crate::driver::initiate;
use crate::error::ClientError;
use crate::stream::RequestStream;

/// Convenience facade for coordinators: resolves services through the
/// registry and drives requests with the caller's identity attached.
pub struct FlowClient {
    hub: TransportHub,
    registry: Arc<ServiceRegistry>,
    internal_data: InternalData,
}

impl FlowClient {
    pub fn new(
        hub: TransportHub,
        registry: Arc<ServiceRegistry>,
        sender_id: impl Into<String>,
    ) -> Self {
        Self {
            hub,
            registry,
            internal_data: InternalData::new(API_VERSION, sender_id),
        }
    }

    /// Override the API version advertised on outgoing requests.
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        let sender_id = self.internal_data.sender_id().to_string();
        self.internal_data = InternalData::new(api_version, sender_id);
        self
    }

    /// The enabled services serving a stage, in registration order.
    pub fn services_for_stage(
        &self,
        stage: FlowStage,
    ) -> Result<Vec<RegisteredService>, ClientError> {
        Ok(self.registry.services_for_stage(stage)?)
    }

    /// Send one request to a registered service.
    ///
    /// When `stage` is given it is attached as the `flowStage` extension so
    /// the service knows which stage it is being dispatched for.
    pub async fn request(
        &self,
        service_id: &str,
        payload: impl Into<String>,
        stage: Option<FlowStage>,
    ) -> Result<RequestStream, ClientError> {
        let endpoint = self.registry.resolve(service_id)?;
        let mut internal_data = self.internal_data.clone();
        if let Some(stage) = stage {
            internal_data.add_extension(extensions::FLOW_STAGE, stage.as_str());
        }
        initiate(&self.hub, &endpoint, payload, internal_data).await
    }
}
