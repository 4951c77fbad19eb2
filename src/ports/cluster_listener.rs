//! ClusterListener port - application code observing cluster traffic.

use crate::domain::cluster::ClusterMessage;

/// Generic listener attached to a node's cluster bus.
///
/// Receives every cluster message this node observes, membership kinds
/// included: remote messages as they arrive, and the node's own suppressed
/// sends through the direct local path. Implementations should return
/// quickly; they run on the bus's receive task.
pub trait ClusterListener: Send + Sync {
    fn on_message(&self, message: &ClusterMessage);

    /// The shared channel subscription was (re-)established.
    fn on_bus_connected(&self) {}

    /// The shared channel subscription was lost.
    fn on_bus_disconnected(&self) {}

    /// Listener name for logging.
    fn name(&self) -> &'static str;
}
