use async_trait::async_trait;

use fsp_types::InternalData;

use crate::activity::LifecycleEvent;
use crate::context::ServiceContext;
use crate::error::ServiceError;

/// The capability a flow service implementation provides.
///
/// One handler serves all of a service's connections concurrently, so
/// implementations must be `Send + Sync` and keep per-request state on the
/// [`ServiceContext`] they are handed.
#[async_trait]
pub trait FlowServiceHandler: Send + Sync + 'static {
    /// Process one request.
    ///
    /// The ACK has already been sent when this runs. The handler must either
    /// call one of the context's terminal operations
    /// ([`finish_with_response`](ServiceContext::finish_with_response),
    /// [`finish_with_no_response`](ServiceContext::finish_with_no_response),
    /// [`notify_background_processing`](ServiceContext::notify_background_processing),
    /// [`send_error_and_finish`](ServiceContext::send_error_and_finish)) or
    /// hand processing off with
    /// [`launch_activity`](ServiceContext::launch_activity). Returning `Ok`
    /// without doing either is treated as a bug: the runtime logs a warning
    /// and finishes with no response so the client is not left waiting.
    ///
    /// Returning `Err` or panicking sends a single SERVICE_EXCEPTION error
    /// to the client and reports the failure to the service's fault
    /// reporter.
    async fn process_request(
        &self,
        ctx: ServiceContext,
        request: String,
        sender: Option<InternalData>,
    ) -> Result<(), ServiceError>;

    /// Called when a client demands that processing be abandoned.
    ///
    /// The runtime force-finishes any delegated activity and ends the stream
    /// after this returns; override only to release service-specific
    /// resources. Must complete promptly.
    async fn on_force_finish(&self, ctx: &ServiceContext) {
        let _ = ctx;
    }

    /// Lifecycle events from a delegated activity launched by this handler.
    async fn on_activity_lifecycle_event(&self, event: LifecycleEvent) {
        let _ = event;
    }
}
