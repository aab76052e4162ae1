//! Canonical record identity
//!
//! Ids reach the store in two interchangeable forms, the 12-byte ObjectId
//! and its 24-char hex string, depending on which write path produced them.
//! `RecordId` parses either form once at the boundary and renders both query
//! forms, so no call site branches on representation.

use bson::oid::ObjectId;
use bson::{doc, Bson, Document};

/// A record id accepting both the binary and string representations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordId {
    raw: String,
    oid: Option<ObjectId>,
}

impl RecordId {
    /// Parse an id from its string form. A valid 24-char hex string also
    /// yields the binary form; anything else matches as a plain string only.
    pub fn parse(input: &str) -> Self {
        Self {
            raw: input.to_string(),
            oid: ObjectId::parse_str(input).ok(),
        }
    }

    /// Build from a stored id value, typically `insert_one`'s inserted id.
    pub fn from_bson(value: &Bson) -> Option<Self> {
        match value {
            Bson::ObjectId(oid) => Some((*oid).into()),
            Bson::String(s) => Some(Self::parse(s)),
            _ => None,
        }
    }

    /// The string form. Id lists on the User record store this form.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The binary form, when the id parses as one.
    pub fn object_id(&self) -> Option<ObjectId> {
        self.oid
    }

    /// Every Bson value this id may be stored as.
    pub fn forms(&self) -> Vec<Bson> {
        match self.oid {
            Some(oid) => vec![Bson::ObjectId(oid), Bson::String(self.raw.clone())],
            None => vec![Bson::String(self.raw.clone())],
        }
    }

    /// Filter matching `field` under either representation.
    pub fn filter(&self, field: &str) -> Document {
        doc! { field: { "$in": self.forms() } }
    }

    /// Filter matching the primary key under either representation.
    pub fn id_filter(&self) -> Document {
        self.filter("_id")
    }
}

impl From<ObjectId> for RecordId {
    fn from(oid: ObjectId) -> Self {
        Self {
            raw: oid.to_hex(),
            oid: Some(oid),
        }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}
