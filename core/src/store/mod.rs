//! Persistence gateway and its key-value backends.

pub mod backend;
pub mod file;
pub mod gateway;

pub use backend::{MemoryBackend, StorageBackend};
pub use file::FileBackend;
pub use gateway::{GatewayMode, PersistenceGateway, RecordKey, RecordKind, SCHEMA_VERSION};

pub type Result<T> = crate::Result<T>;
