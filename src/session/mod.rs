//! Session cache bridging SAML identities to platform usernames.
//!
//! Three interchangeable backends (disabled, in-memory, redis) sit behind the
//! [`SessionCache`] trait; a [`CacheRegistry`] holds the one that is active.

pub mod cache;
pub mod config;
pub mod registry;
pub mod remote;
pub mod types;

pub use cache::{create, DisabledCache, InMemoryCache, SessionCache};
pub use config::CacheSpec;
pub use registry::CacheRegistry;
pub use remote::RemoteCache;
pub use types::{Attributes, CacheError, CacheKind, SessionEntry};
