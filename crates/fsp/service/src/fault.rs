use tracing::error;

use crate::connection::ConnectionId;

/// Receives handler failures after the client has been answered.
///
/// The communicator converts an uncaught handler failure into a single
/// ERROR envelope, then forwards it here so the crash stays observable to
/// operators even though the connection was ended cleanly.
pub trait FaultReporter: Send + Sync {
    fn report(&self, connection_id: ConnectionId, description: &str);
}

/// Default reporter: logs at error level.
pub struct LogFaultReporter;

impl FaultReporter for LogFaultReporter {
    fn report(&self, connection_id: ConnectionId, description: &str) {
        error!(%connection_id, description, "flow service handler fault");
    }
}
