//! Ledger store: validated writes and best-effort cascades
//!
//! Every insert is gated by the schema validator and every cascade is a
//! sequence of idempotent single-document updates. The store never opens a
//! multi-document transaction: after a primary write succeeds, each
//! propagation step runs independently and a failure is logged on the warn
//! channel instead of rolling anything back. Boolean results are tied to
//! the primary write alone.

use std::sync::Arc;

use bson::{doc, Bson, Document};
use serde::Serialize;
use tracing::warn;

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::schema;
use crate::storage::backend::{DocumentBackend, QueryOptions};
use crate::storage::memory::MemoryBackend;
use crate::types::RecordId;

/// Per-category aggregate over a user's transactions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: f64,
    pub count: i64,
}

/// Validated inserts, cascading deletes, and read queries over the three
/// collections.
pub struct LedgerStore {
    backend: Arc<dyn DocumentBackend>,
    users: String,
    expenses: String,
    transactions: String,
}

impl LedgerStore {
    pub fn new(backend: Arc<dyn DocumentBackend>, config: &DatabaseConfig) -> Self {
        Self {
            backend,
            users: config.users_collection.clone(),
            expenses: config.expenses_collection.clone(),
            transactions: config.transactions_collection.clone(),
        }
    }

    /// Store over the in-memory backend with default collection names.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()), &DatabaseConfig::default())
    }

    /// Create the unique indexes registration relies on.
    pub async fn ensure_indexes(&self) -> Result<()> {
        self.backend
            .ensure_unique_index(&self.users, "username")
            .await?;
        self.backend.ensure_unique_index(&self.users, "email").await?;
        Ok(())
    }

    /// Check that the backing store is reachable.
    pub async fn health_check(&self) -> Result<bool> {
        self.backend.health_check().await
    }

    /// Insert a validated user, enforcing username and email uniqueness.
    /// Returns the new id in string form; `None` means the document failed
    /// the schema gate or collides with an existing account.
    pub async fn insert_user(&self, document: Document) -> Result<Option<String>> {
        if !schema::validate(schema::KIND_USERS, &document) {
            warn!(collection = %self.users, "schema gate rejected user document");
            return Ok(None);
        }
        // Fields are guaranteed present past the gate.
        let email = document.get_str("email").unwrap_or_default().to_owned();
        let username = document.get_str("username").unwrap_or_default().to_owned();
        let conflict = doc! { "$or": [ { "email": email }, { "username": username } ] };
        if self.backend.find_one(&self.users, conflict).await?.is_some() {
            return Ok(None);
        }
        let inserted = self.backend.insert_one(&self.users, document).await?;
        Ok(RecordId::from_bson(&inserted).map(|id| id.as_str().to_owned()))
    }

    /// Insert a validated expense, then propagate the id-list append and the
    /// `total_spent` increment to the owning user. The result reflects the
    /// primary insert alone; propagation failures are logged, never raised.
    pub async fn insert_expense(&self, document: Document) -> Result<bool> {
        if !schema::validate(schema::KIND_EXPENSES, &document) {
            warn!(collection = %self.expenses, "schema gate rejected expense document");
            return Ok(false);
        }
        let owner = document.get_str("user_id").unwrap_or_default().to_owned();
        let amount = document.get_f64("amount").ok();
        let inserted = self.backend.insert_one(&self.expenses, document).await?;
        if let Some(expense_id) = RecordId::from_bson(&inserted) {
            self.link_child(&owner, "expenses_id", &expense_id, amount)
                .await;
        }
        Ok(true)
    }

    /// Insert a validated transaction; symmetric to [`insert_expense`],
    /// propagating to the user's `transactions_id` list and `total_spent`.
    ///
    /// [`insert_expense`]: LedgerStore::insert_expense
    pub async fn insert_transaction(&self, document: Document) -> Result<bool> {
        if !schema::validate(schema::KIND_TRANSACTIONS, &document) {
            warn!(collection = %self.transactions, "schema gate rejected transaction document");
            return Ok(false);
        }
        let owner = document.get_str("user_id").unwrap_or_default().to_owned();
        let amount = document.get_f64("amount").ok();
        let inserted = self.backend.insert_one(&self.transactions, document).await?;
        if let Some(tx_id) = RecordId::from_bson(&inserted) {
            self.link_child(&owner, "transactions_id", &tx_id, amount)
                .await;
        }
        Ok(true)
    }

    /// Delete an expense and cascade: drop the transactions that reference
    /// it, unlink ids from the owning user, and walk `total_spent` back by
    /// the expense amount. Returns false when no expense matches under
    /// either id representation; true as soon as the primary delete lands.
    pub async fn delete_expense(&self, expense_id: &str) -> Result<bool> {
        let id = RecordId::parse(expense_id);
        let Some(expense) = self.backend.find_one(&self.expenses, id.id_filter()).await? else {
            return Ok(false);
        };

        // Child transactions must be collected before the primary delete;
        // their ids are needed for the user's list cleanup afterwards.
        let tx_filter = id.filter("expense_id");
        let transactions = match self
            .backend
            .find_many(&self.transactions, tx_filter.clone(), QueryOptions::default())
            .await
        {
            Ok(docs) => docs,
            Err(e) => {
                warn!(expense = %id, error = %e, "transaction lookup failed; id unlinking will be skipped");
                Vec::new()
            }
        };
        let tx_ids: Vec<RecordId> = transactions
            .iter()
            .filter_map(|tx| tx.get("_id").and_then(RecordId::from_bson))
            .collect();

        if self.backend.delete_one(&self.expenses, id.id_filter()).await? == 0 {
            return Ok(false);
        }

        if let Err(e) = self.backend.delete_many(&self.transactions, tx_filter).await {
            warn!(expense = %id, error = %e, "transaction cascade delete failed");
        }

        let owner = RecordId::parse(expense.get_str("user_id").unwrap_or_default());

        let pull = doc! { "$pull": { "expenses_id": { "$in": id.forms() } } };
        if let Err(e) = self.backend.update_one(&self.users, owner.id_filter(), pull).await {
            warn!(user = %owner, expense = %id, error = %e, "expense id unlink failed");
        }

        if !tx_ids.is_empty() {
            let all_forms: Vec<Bson> = tx_ids.iter().flat_map(RecordId::forms).collect();
            let pull_all = doc! { "$pullAll": { "transactions_id": all_forms } };
            if let Err(e) = self
                .backend
                .update_one(&self.users, owner.id_filter(), pull_all)
                .await
            {
                warn!(user = %owner, expense = %id, error = %e, "transaction id unlink failed");
            }
        }

        if let Ok(amount) = expense.get_f64("amount") {
            let dec = doc! { "$inc": { "total_spent": -amount } };
            if let Err(e) = self.backend.update_one(&self.users, owner.id_filter(), dec).await {
                warn!(user = %owner, expense = %id, error = %e, "total_spent decrement failed");
            }
        }

        Ok(true)
    }

    /// Delete the user record only. The user's expenses and transactions
    /// are intentionally not cascaded.
    pub async fn delete_user(&self, user_id: &str) -> Result<bool> {
        let id = RecordId::parse(user_id);
        Ok(self.backend.delete_one(&self.users, id.id_filter()).await? > 0)
    }

    /// Look up a user by id, matching either id representation.
    pub async fn get_user_by_id(&self, user_id: &str) -> Result<Option<Document>> {
        let id = RecordId::parse(user_id);
        self.backend.find_one(&self.users, id.id_filter()).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<Document>> {
        self.backend
            .find_one(&self.users, doc! { "email": email })
            .await
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<Document>> {
        self.backend
            .find_one(&self.users, doc! { "username": username })
            .await
    }

    /// Set a user's budget. True iff a stored document changed.
    pub async fn update_budget(&self, user_id: &str, budget: f64) -> Result<bool> {
        let id = RecordId::parse(user_id);
        let update = doc! { "$set": { "budget": budget } };
        Ok(self.backend.update_one(&self.users, id.id_filter(), update).await? > 0)
    }

    /// Newest-first page of a user's expenses.
    pub async fn expenses_for_user(
        &self,
        user_id: &str,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<Document>> {
        let id = RecordId::parse(user_id);
        self.backend
            .find_many(
                &self.expenses,
                id.filter("user_id"),
                QueryOptions::newest_first(skip, limit),
            )
            .await
    }

    /// Newest-first page of a user's transactions.
    pub async fn transactions_for_user(
        &self,
        user_id: &str,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<Document>> {
        let id = RecordId::parse(user_id);
        self.backend
            .find_many(
                &self.transactions,
                id.filter("user_id"),
                QueryOptions::newest_first(skip, limit),
            )
            .await
    }

    /// Per-category totals over a user's transactions.
    pub async fn spending_summary(&self, user_id: &str) -> Result<Vec<CategoryTotal>> {
        let id = RecordId::parse(user_id);
        let pipeline = vec![
            doc! { "$match": { "user_id": { "$in": id.forms() } } },
            doc! { "$group": {
                "_id": "$category",
                "total": { "$sum": "$amount" },
                "count": { "$sum": 1 },
            } },
        ];
        let results = self.backend.aggregate(&self.transactions, pipeline).await?;
        Ok(results
            .into_iter()
            .filter_map(|group| {
                let category = group.get_str("_id").ok()?.to_string();
                let total = group.get("total").and_then(to_f64)?;
                let count = group.get("count").and_then(to_i64)?;
                Some(CategoryTotal {
                    category,
                    total,
                    count,
                })
            })
            .collect())
    }

    /// Distinct non-empty categories among a user's transactions.
    pub async fn categories(&self, user_id: &str) -> Result<Vec<String>> {
        let id = RecordId::parse(user_id);
        let values = self
            .backend
            .distinct(&self.transactions, "category", id.filter("user_id"))
            .await?;
        Ok(values
            .into_iter()
            .filter_map(|value| match value {
                Bson::String(s) if !s.is_empty() => Some(s),
                _ => None,
            })
            .collect())
    }

    /// Best-effort propagation after a child insert: append the child id
    /// (string form) to the user's list, then increment `total_spent`. The
    /// two updates run independently, matching the store's per-document
    /// atomicity.
    async fn link_child(
        &self,
        user_id: &str,
        list_field: &str,
        child_id: &RecordId,
        amount: Option<f64>,
    ) {
        let owner = RecordId::parse(user_id);
        let push = doc! { "$push": { list_field: child_id.as_str() } };
        if let Err(e) = self.backend.update_one(&self.users, owner.id_filter(), push).await {
            warn!(user = %owner, field = list_field, error = %e, "id-list append failed after insert");
        }
        if let Some(amount) = amount {
            let inc = doc! { "$inc": { "total_spent": amount } };
            if let Err(e) = self.backend.update_one(&self.users, owner.id_filter(), inc).await {
                warn!(user = %owner, amount, error = %e, "total_spent increment failed after insert");
            }
        }
    }
}

fn to_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(d) => Some(*d),
        Bson::Int32(i) => Some(*i as f64),
        Bson::Int64(i) => Some(*i as f64),
        _ => None,
    }
}

fn to_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(i) => Some(*i as i64),
        Bson::Int64(i) => Some(*i),
        Bson::Double(d) => Some(*d as i64),
        _ => None,
    }
}
