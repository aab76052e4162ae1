//! Typed builders for the three persistent record kinds
//!
//! The store's wire currency is `bson::Document`; these structs exist so
//! in-process callers build well-formed documents instead of assembling
//! field maps by hand. Serialization goes through the BSON serializer, so
//! `created_at` lands as a real datetime and amounts as doubles, which is
//! what the schema gate demands.

use bson::Document;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A registered account carrying the running spend aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub email: String,
    /// Already hashed by the authentication collaborator.
    pub password: String,
    pub created_at: bson::DateTime,
    /// String-form ids of this user's expenses.
    #[serde(default)]
    pub expenses_id: Vec<String>,
    pub budget: f64,
    /// Derived cache of the sum of linked expense and transaction amounts.
    pub total_spent: f64,
    /// String-form ids of this user's transactions.
    #[serde(default)]
    pub transactions_id: Vec<String>,
}

impl User {
    /// Create a new account with empty id lists and zero spend.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        budget: f64,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            created_at: bson::DateTime::now(),
            expenses_id: Vec::new(),
            budget,
            total_spent: 0.0,
            transactions_id: Vec::new(),
        }
    }

    /// Encode for storage.
    pub fn to_document(&self) -> Result<Document> {
        encode("user", self)
    }
}

/// A single recorded cost item, owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub title: String,
    pub category: String,
    pub amount: f64,
    pub description: String,
    pub created_at: bson::DateTime,
    /// String form of the owning user's id.
    pub user_id: String,
}

impl Expense {
    /// Create an expense stamped with the current time.
    pub fn new(
        title: impl Into<String>,
        category: impl Into<String>,
        amount: f64,
        description: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            category: category.into(),
            amount,
            description: description.into(),
            created_at: bson::DateTime::now(),
            user_id: user_id.into(),
        }
    }

    /// Encode for storage.
    pub fn to_document(&self) -> Result<Document> {
        encode("expense", self)
    }
}

/// A ledger movement, usually derived from an expense.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// String form of the owning user's id.
    pub user_id: String,
    /// String form of the linked expense's id.
    pub expense_id: String,
    pub category: String,
    pub amount: f64,
    pub description: String,
    pub created_at: bson::DateTime,
}

impl Transaction {
    /// Create a transaction stamped with the current time.
    pub fn new(
        user_id: impl Into<String>,
        expense_id: impl Into<String>,
        category: impl Into<String>,
        amount: f64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            expense_id: expense_id.into(),
            category: category.into(),
            amount,
            description: description.into(),
            created_at: bson::DateTime::now(),
        }
    }

    /// Encode for storage.
    pub fn to_document(&self) -> Result<Document> {
        encode("transaction", self)
    }
}

fn encode<T: Serialize>(what: &str, value: &T) -> Result<Document> {
    bson::serialize_to_document(value)
        .map_err(|e| Error::storage(format!("failed to encode {what} record: {e}")))
}
