//! Application layer - the relay's services.
//!
//! Each service takes its collaborators explicitly at construction; there
//! is no process-wide state.
//!
//! - [`ConnectionAdmission`] gates connection attempts
//! - [`SessionBinder`] resolves a session for each admitted connection
//! - [`RequestBridge`] turns frames into canonical requests for the router
//! - [`RoomRegistry`] indexes local room membership
//! - [`ClusterBus`] keeps registries and listeners in step across nodes

mod admission;
mod cluster_bus;
mod request_bridge;
mod room_registry;
mod session_binder;

pub use admission::{AdmissionRejected, ConnectionAdmission, DEFAULT_POLICY_TIMEOUT};
pub use cluster_bus::{BusStats, ClusterBus, ReceiveOutcome};
pub use request_bridge::{BridgeSession, BridgeSettings, BridgeState, FrameOutcome, RequestBridge};
pub use room_registry::RoomRegistry;
pub use session_binder::{BoundSession, SessionBinder, SessionSource};
