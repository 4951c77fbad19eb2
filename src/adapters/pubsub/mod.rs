//! Pub/sub adapters for the cluster bus.
//!
//! - `redis` - Redis `PUBLISH`/`SUBSCRIBE` for multi-node deployments
//! - `in_memory` - Process-local hub for tests and single-process clusters

mod in_memory;
pub mod redis;

pub use in_memory::InMemoryPubSub;
pub use self::redis::{RedisPublisher, RedisSubscription};
