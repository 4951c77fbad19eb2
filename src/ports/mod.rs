//! Ports - Interfaces for external collaborators.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the relay core and the outside world. Adapters implement these ports.
//!
//! ## Connection Ports
//!
//! - `AdmissionPolicy` - Accept/reject decision for connection attempts
//! - `SessionStore` - Session lookup, persistence, and cookie parsing
//!
//! ## Request Ports
//!
//! - `RequestRouter` - Executes canonical requests and answers via a sink
//!
//! ## Cluster Ports
//!
//! - `ClusterPublisher` / `SignalStream` - Shared pub/sub channel handles
//! - `ClusterListener` - Application-level observer of cluster traffic
//! - `MembershipMirror` - Outlet for local room mutations

mod admission_policy;
mod cluster_listener;
mod membership_mirror;
mod pubsub;
mod request_router;
mod session_store;

pub use admission_policy::{AdmissionDecision, AdmissionError, AdmissionPolicy};
pub use cluster_listener::ClusterListener;
pub use membership_mirror::MembershipMirror;
pub use pubsub::{BusSignal, ClusterPublisher, PubSubError, SignalStream};
pub use request_router::RequestRouter;
pub use session_store::{SessionError, SessionStore};
