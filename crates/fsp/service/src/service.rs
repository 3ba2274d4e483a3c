use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use fsp_transport::{EndpointAddress, TransportHub};
use fsp_types::InternalData;

use crate::activity::{ActivityLauncher, ActivityTracker};
use crate::communicator::ClientCommunicator;
use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::fault::{FaultReporter, LogFaultReporter};
use crate::handler::FlowServiceHandler;

const EOS_BUFFER: usize = 16;

/// A flow service instance: one handler serving many concurrent client
/// connections on one endpoint address.
pub struct FlowService {
    config: ServiceConfig,
    handler: Arc<dyn FlowServiceHandler>,
    launcher: Option<Arc<dyn ActivityLauncher>>,
    fault: Arc<dyn FaultReporter>,
}

impl FlowService {
    pub fn new(config: ServiceConfig, handler: impl FlowServiceHandler) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
            launcher: None,
            fault: Arc::new(LogFaultReporter),
        }
    }

    /// Install the launcher used by
    /// [`ServiceContext::launch_activity`](crate::ServiceContext::launch_activity).
    pub fn with_activity_launcher(mut self, launcher: impl ActivityLauncher + 'static) -> Self {
        self.launcher = Some(Arc::new(launcher));
        self
    }

    /// Replace the default log-based fault reporter.
    pub fn with_fault_reporter(mut self, fault: impl FaultReporter + 'static) -> Self {
        self.fault = Arc::new(fault);
        self
    }

    /// Bind the endpoint and start serving.
    ///
    /// The service runs until [`ServiceHandle::shutdown`] is called, the
    /// handle is dropped, or, when `stop_on_end_of_stream` is configured,
    /// the first connection ends its stream.
    pub async fn serve(
        self,
        hub: &TransportHub,
        address: EndpointAddress,
    ) -> Result<ServiceHandle, ServiceError> {
        let mut listener = hub.bind(&address).await?;
        let internal_data =
            InternalData::new(self.config.api_version.clone(), self.config.service_id.clone());
        let activities = ActivityTracker::default();
        let (eos_tx, mut eos_rx) = mpsc::channel(EOS_BUFFER);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        info!(
            service_id = %self.config.service_id,
            %address,
            stop_on_end_of_stream = self.config.stop_on_end_of_stream,
            "flow service started"
        );

        let hub = hub.clone();
        let task_address = address.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        debug!(service_id = %self.config.service_id, "shutdown requested");
                        break;
                    }
                    accepted = listener.accept() => {
                        let Some(connection) = accepted else { break };
                        let communicator = ClientCommunicator::new(
                            connection,
                            internal_data.clone(),
                            self.config.channel_capacity,
                            self.handler.clone(),
                            self.launcher.clone(),
                            self.fault.clone(),
                            activities.clone(),
                            eos_tx.clone(),
                        );
                        tokio::spawn(communicator.run());
                    }
                    Some(connection_id) = eos_rx.recv() => {
                        if self.config.stop_on_end_of_stream {
                            info!(
                                service_id = %self.config.service_id,
                                %connection_id,
                                "stopping service on end of stream"
                            );
                            break;
                        }
                    }
                }
            }
            hub.unbind(&task_address).await;
            info!(service_id = %self.config.service_id, "flow service stopped");
        });

        Ok(ServiceHandle {
            address,
            shutdown: shutdown_tx,
            task,
        })
    }
}

/// Controls a running [`FlowService`]. Dropping the handle shuts the
/// service down.
pub struct ServiceHandle {
    address: EndpointAddress,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServiceHandle {
    pub fn address(&self) -> &EndpointAddress {
        &self.address
    }

    /// Ask the service to stop accepting and wind down. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for the service to stop on its own (shutdown call or
    /// stop-on-end-of-stream).
    pub async fn join(self) {
        let _ = self.task.await;
    }

    /// Shut down and wait for completion.
    pub async fn stop(self) {
        self.shutdown();
        let _ = self.task.await;
    }
}
