//! Core types for the expense ledger

pub mod id;
pub mod receipt;
pub mod record;

pub use id::RecordId;
pub use receipt::{ExtractedExpense, ReceiptPayload};
pub use record::{Expense, Transaction, User};
