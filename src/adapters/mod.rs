//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the relay core to external systems:
//! - `admission` - Origin-based admission policies
//! - `pubsub` - Cluster channel transports (Redis, in-memory)
//! - `session` - Signed-cookie session store
//! - `websocket` - axum WebSocket endpoint driving the request bridge

pub mod admission;
pub mod pubsub;
pub mod session;
pub mod websocket;

pub use admission::{policy_from_config, AllowAnyOrigin, FnPolicy, OriginAllowList, SameOriginPolicy};
pub use pubsub::{InMemoryPubSub, RedisPublisher, RedisSubscription};
pub use session::{CookieSigner, InMemorySessionStore};
pub use websocket::{relay_router, RelayState};
