//! Session store adapters.

mod in_memory;
mod signed_cookie;

pub use in_memory::InMemorySessionStore;
pub use signed_cookie::{find_cookie, CookieSigner};
