//! Signwall Storage - Store Adapters and Caches
//!
//! The key-value seam ([`KeyValueStore`]) with Redis and in-memory backends,
//! the session manager and artifact cache built on top of it, and the
//! signature store seam ([`SignatureStore`]). The PostgreSQL signature store
//! lives in signwall-api next to its connection pool.

pub mod artifact_cache;
pub mod clock;
pub mod codec;
pub mod kv;
pub mod memory;
pub mod redis_store;
pub mod session;
pub mod signatures;
pub mod single_flight;

pub use artifact_cache::{ArtifactCache, ArtifactCacheConfig, CacheLookup, CacheSource};
pub use clock::{Clock, ManualClock, SystemClock};
pub use kv::KeyValueStore;
pub use memory::InMemoryKvStore;
pub use redis_store::{RedisConfig, RedisKvStore};
pub use session::SessionManager;
pub use signatures::{InMemorySignatureStore, SignatureStore};
pub use single_flight::{FlightGuard, SingleFlight};
