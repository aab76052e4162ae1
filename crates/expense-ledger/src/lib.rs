//! expense-ledger: consistency layer and receipt ingestion for a personal
//! expense manager
//!
//! The crate keeps three document collections (users, expenses,
//! transactions) consistent through schema-gated writes and best-effort
//! cascades, turns uploaded receipt files into ledger records with
//! generative models, and streams budget advice over an explicit per-call
//! user context.

pub mod advisor;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod providers;
pub mod schema;
pub mod storage;
pub mod types;

pub use advisor::{AdvisorContext, SpendingAdvisor};
pub use config::Config;
pub use error::{Error, Result};
pub use ingestion::{IngestReport, IngestionCoordinator, ReceiptExtractor};
pub use providers::{GeminiClient, GenerativeModel};
pub use storage::{CategoryTotal, DocumentBackend, LedgerStore, MemoryBackend, MongoBackend};
pub use types::{Expense, RecordId, Transaction, User};

/// Initialize tracing for binaries embedding the ledger.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "expense_ledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
