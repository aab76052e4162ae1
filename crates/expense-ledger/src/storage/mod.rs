//! Document storage: backend abstraction and the ledger store built on it

pub mod backend;
pub mod ledger;
pub mod memory;
pub mod mongo;

pub use backend::{DocumentBackend, QueryOptions};
pub use ledger::{CategoryTotal, LedgerStore};
pub use memory::MemoryBackend;
pub use mongo::MongoBackend;
