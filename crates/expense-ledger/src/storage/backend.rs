//! Document backend trait
//!
//! Seam between the consistency layer and the concrete store. The ledger
//! only needs a small slice of a document database: single-document CRUD,
//! the atomic update operators its cascades are built from, and two
//! read-side aggregations.
//!
//! Implementations:
//! - `MongoBackend`: MongoDB collections
//! - `MemoryBackend`: in-process store for tests and ephemeral use

use async_trait::async_trait;
use bson::{doc, Bson, Document};

use crate::error::Result;

/// Sort, skip, and limit for find queries.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
}

impl QueryOptions {
    /// Descending `created_at` page, the shape every listing endpoint uses.
    pub fn newest_first(skip: u64, limit: i64) -> Self {
        Self {
            sort: Some(doc! { "created_at": -1 }),
            skip: Some(skip),
            limit: Some(limit),
        }
    }
}

/// Trait for the document store behind the ledger.
///
/// Update documents use the store's operator syntax (`$set`, `$inc`,
/// `$push`, `$pull`, `$pullAll`); filters support equality plus `$in` and
/// `$or`. Every operation applies atomically to a single document, which is
/// the only atomicity the ledger's cascades rely on.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Insert one document, returning the store-assigned id.
    async fn insert_one(&self, collection: &str, document: Document) -> Result<Bson>;

    /// First document matching the filter.
    async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>>;

    /// Documents matching the filter, honoring sort/skip/limit.
    async fn find_many(
        &self,
        collection: &str,
        filter: Document,
        options: QueryOptions,
    ) -> Result<Vec<Document>>;

    /// Apply an update to the first matching document; returns the modified
    /// count (zero when nothing matched or nothing changed).
    async fn update_one(&self, collection: &str, filter: Document, update: Document)
        -> Result<u64>;

    /// Delete the first matching document; returns the deleted count.
    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64>;

    /// Delete every matching document; returns the deleted count.
    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64>;

    /// Run an aggregation pipeline (`$match` and `$group` stages).
    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>>;

    /// Distinct values of a field among matching documents.
    async fn distinct(&self, collection: &str, field: &str, filter: Document)
        -> Result<Vec<Bson>>;

    /// Ensure a unique index on the field, creating it if absent.
    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<()>;

    /// Check that the store is reachable.
    async fn health_check(&self) -> Result<bool>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}
