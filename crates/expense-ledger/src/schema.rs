//! Schema gate for the three record kinds
//!
//! Every declared field must be present with the declared BSON type before a
//! document may be written. The gate is pure: no I/O, no mutation, and an
//! unrecognized kind always fails.

use bson::{Bson, Document};

/// Semantic field types the schemas declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// UTF-8 string
    Text,
    /// 64-bit float. Integers do not pass; amounts are stored as doubles.
    Number,
    /// BSON datetime
    Timestamp,
    /// Ordered list
    List,
}

impl FieldType {
    fn matches(&self, value: &Bson) -> bool {
        match self {
            FieldType::Text => matches!(value, Bson::String(_)),
            FieldType::Number => matches!(value, Bson::Double(_)),
            FieldType::Timestamp => matches!(value, Bson::DateTime(_)),
            FieldType::List => matches!(value, Bson::Array(_)),
        }
    }
}

const USER_FIELDS: &[(&str, FieldType)] = &[
    ("username", FieldType::Text),
    ("email", FieldType::Text),
    ("password", FieldType::Text),
    ("created_at", FieldType::Timestamp),
    ("expenses_id", FieldType::List),
    ("budget", FieldType::Number),
    ("total_spent", FieldType::Number),
    ("transactions_id", FieldType::List),
];

const EXPENSE_FIELDS: &[(&str, FieldType)] = &[
    ("title", FieldType::Text),
    ("category", FieldType::Text),
    ("amount", FieldType::Number),
    ("description", FieldType::Text),
    ("created_at", FieldType::Timestamp),
    ("user_id", FieldType::Text),
];

const TRANSACTION_FIELDS: &[(&str, FieldType)] = &[
    ("user_id", FieldType::Text),
    ("expense_id", FieldType::Text),
    ("category", FieldType::Text),
    ("amount", FieldType::Number),
    ("description", FieldType::Text),
    ("created_at", FieldType::Timestamp),
];

/// Kind name for the user schema.
pub const KIND_USERS: &str = "users";
/// Kind name for the expense schema.
pub const KIND_EXPENSES: &str = "expenses";
/// Kind name for the transaction schema.
pub const KIND_TRANSACTIONS: &str = "transactions";

/// Declared fields for a record kind, or `None` for an unrecognized kind.
pub fn fields(kind: &str) -> Option<&'static [(&'static str, FieldType)]> {
    match kind {
        KIND_USERS => Some(USER_FIELDS),
        KIND_EXPENSES => Some(EXPENSE_FIELDS),
        KIND_TRANSACTIONS => Some(TRANSACTION_FIELDS),
        _ => None,
    }
}

/// Validate a candidate document against a record kind's schema.
///
/// Returns false on a missing field, a wrong type for a present field, or an
/// unrecognized kind. Fields outside the schema are ignored, so `_id` and
/// other store-added fields never affect the result.
pub fn validate(kind: &str, document: &Document) -> bool {
    let Some(declared) = fields(kind) else {
        return false;
    };
    declared
        .iter()
        .all(|(name, ty)| document.get(name).is_some_and(|value| ty.matches(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn valid_expense() -> Document {
        doc! {
            "title": "Coffee",
            "category": "Food",
            "amount": 4.5,
            "description": "Morning espresso",
            "created_at": bson::DateTime::now(),
            "user_id": "64b1f0c2a9d3e45f67890123",
        }
    }

    fn valid_user() -> Document {
        doc! {
            "username": "alice",
            "email": "alice@example.com",
            "password": "hashed",
            "created_at": bson::DateTime::now(),
            "expenses_id": [],
            "budget": 500.0,
            "total_spent": 0.0,
            "transactions_id": [],
        }
    }

    fn valid_transaction() -> Document {
        doc! {
            "user_id": "64b1f0c2a9d3e45f67890123",
            "expense_id": "64b1f0c2a9d3e45f67890124",
            "category": "Food",
            "amount": 4.5,
            "description": "Morning espresso",
            "created_at": bson::DateTime::now(),
        }
    }

    #[test]
    fn valid_documents_pass() {
        assert!(validate(KIND_EXPENSES, &valid_expense()));
        assert!(validate(KIND_USERS, &valid_user()));
        assert!(validate(KIND_TRANSACTIONS, &valid_transaction()));
    }

    #[test]
    fn any_missing_field_fails() {
        for (name, _) in fields(KIND_EXPENSES).unwrap() {
            let mut doc = valid_expense();
            doc.remove(*name);
            assert!(!validate(KIND_EXPENSES, &doc), "missing {name} should fail");
        }
        for (name, _) in fields(KIND_USERS).unwrap() {
            let mut doc = valid_user();
            doc.remove(*name);
            assert!(!validate(KIND_USERS, &doc), "missing {name} should fail");
        }
    }

    #[test]
    fn any_corrupted_field_fails() {
        for (name, _) in fields(KIND_TRANSACTIONS).unwrap() {
            let mut doc = valid_transaction();
            doc.insert(*name, Bson::Int32(1));
            assert!(
                !validate(KIND_TRANSACTIONS, &doc),
                "corrupted {name} should fail"
            );
        }
    }

    #[test]
    fn integer_amount_is_not_a_number_field() {
        let mut doc = valid_expense();
        doc.insert("amount", 4_i32);
        assert!(!validate(KIND_EXPENSES, &doc));
    }

    #[test]
    fn unknown_kind_fails() {
        assert!(!validate("receipts", &valid_expense()));
        assert!(!validate("", &valid_expense()));
    }

    #[test]
    fn extra_fields_are_ignored() {
        let mut doc = valid_expense();
        doc.insert("_id", bson::oid::ObjectId::new());
        doc.insert("note", "extra");
        assert!(validate(KIND_EXPENSES, &doc));
    }
}
