//! Conversational memory.
//!
//! Sub-modules:
//! - `working`: bounded short-term turn log, owned by the think stage.
//! - `store`: owner-gated SQLite long-term store.
//! - `schema`: SQLite DDL definitions.

pub(crate) mod schema;
pub mod store;
pub mod working;

pub use store::{
    MemoryCategory, MemoryPolicy, MemoryRecord, MemoryStore, MemoryStoreError, RecallOutcome,
    StoreOutcome,
};
pub use working::{Role, Turn, WorkingMemory};
