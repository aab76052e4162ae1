//! In-memory document backend
//!
//! Implements the slice of document-store behavior the ledger uses: the
//! atomic update operators (`$set`, `$inc`, `$push`, `$pull`, `$pullAll`),
//! `$in`/`$or` filters, sorted and paged finds, `$match`/`$group`
//! aggregation, distinct, and unique indexes. Backs the test suite and
//! works as an ephemeral store; each operation holds one internal lock, so
//! per-document atomicity matches the real store's model.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::storage::backend::{DocumentBackend, QueryOptions};

#[derive(Default)]
struct Store {
    collections: HashMap<String, Vec<Document>>,
    unique_indexes: HashMap<String, Vec<String>>,
}

/// In-process store for tests and ephemeral use.
#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<Store>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn insert_one(&self, collection: &str, mut document: Document) -> Result<Bson> {
        let mut store = self.inner.lock();
        if let Some(fields) = store.unique_indexes.get(collection) {
            let existing = store.collections.get(collection);
            for field in fields {
                let Some(value) = document.get(field) else {
                    continue;
                };
                let duplicate = existing
                    .map(|docs| docs.iter().any(|d| d.get(field) == Some(value)))
                    .unwrap_or(false);
                if duplicate {
                    return Err(Error::storage(format!(
                        "duplicate key for unique index {collection}.{field}"
                    )));
                }
            }
        }
        let id = match document.get("_id") {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                let mut with_id = Document::new();
                with_id.insert("_id", id.clone());
                with_id.extend(document);
                document = with_id;
                id
            }
        };
        store
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(document);
        Ok(id)
    }

    async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>> {
        let store = self.inner.lock();
        Ok(store
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| matches_filter(d, &filter)).cloned()))
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: Document,
        options: QueryOptions,
    ) -> Result<Vec<Document>> {
        let store = self.inner.lock();
        let mut results: Vec<Document> = store
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| matches_filter(d, &filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some(sort) = &options.sort {
            apply_sort(&mut results, sort);
        }
        let skip = options.skip.unwrap_or(0) as usize;
        let results = results.into_iter().skip(skip);
        Ok(match options.limit {
            Some(limit) if limit > 0 => results.take(limit as usize).collect(),
            _ => results.collect(),
        })
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64> {
        let mut store = self.inner.lock();
        let Some(docs) = store.collections.get_mut(collection) else {
            return Ok(0);
        };
        for doc in docs.iter_mut() {
            if matches_filter(doc, &filter) {
                return apply_update(doc, &update).map(|changed| changed as u64);
            }
        }
        Ok(0)
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64> {
        let mut store = self.inner.lock();
        let Some(docs) = store.collections.get_mut(collection) else {
            return Ok(0);
        };
        match docs.iter().position(|d| matches_filter(d, &filter)) {
            Some(index) => {
                docs.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64> {
        let mut store = self.inner.lock();
        let Some(docs) = store.collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|d| !matches_filter(d, &filter));
        Ok((before - docs.len()) as u64)
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        let store = self.inner.lock();
        let mut working: Vec<Document> = store
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default();
        drop(store);
        for stage in &pipeline {
            if let Some(filter) = stage.get("$match").and_then(Bson::as_document) {
                working.retain(|d| matches_filter(d, filter));
            } else if let Some(spec) = stage.get("$group").and_then(Bson::as_document) {
                working = apply_group(&working, spec);
            } else {
                let name = stage.keys().next().cloned().unwrap_or_default();
                return Err(Error::storage(format!(
                    "unsupported aggregation stage: {name}"
                )));
            }
        }
        Ok(working)
    }

    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Document,
    ) -> Result<Vec<Bson>> {
        let store = self.inner.lock();
        let mut values: Vec<Bson> = Vec::new();
        if let Some(docs) = store.collections.get(collection) {
            for doc in docs.iter().filter(|d| matches_filter(d, &filter)) {
                match doc.get(field) {
                    Some(Bson::Array(elems)) => {
                        for elem in elems {
                            if !values.contains(elem) {
                                values.push(elem.clone());
                            }
                        }
                    }
                    Some(value) => {
                        if !values.contains(value) {
                            values.push(value.clone());
                        }
                    }
                    None => {}
                }
            }
        }
        Ok(values)
    }

    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<()> {
        let mut store = self.inner.lock();
        let fields = store
            .unique_indexes
            .entry(collection.to_string())
            .or_default();
        if !fields.iter().any(|f| f == field) {
            fields.push(field.to_string());
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Filter matching: equality per field, with `$in` conditions and top-level
/// `$or` alternatives.
fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, condition)| {
        if key == "$or" {
            return match condition {
                Bson::Array(alternatives) => alternatives.iter().any(|alt| {
                    alt.as_document()
                        .is_some_and(|f| matches_filter(doc, f))
                }),
                _ => false,
            };
        }
        field_matches(doc.get(key), condition)
    })
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> bool {
    match condition {
        Bson::Document(cond) if cond.keys().any(|k| k.starts_with('$')) => {
            cond.iter().all(|(op, operand)| match (op.as_str(), operand) {
                ("$in", Bson::Array(options)) => match value {
                    Some(Bson::Array(elems)) => elems.iter().any(|e| options.contains(e)),
                    Some(v) => options.contains(v),
                    None => false,
                },
                _ => false,
            })
        }
        other => value == Some(other),
    }
}

fn apply_update(doc: &mut Document, update: &Document) -> Result<bool> {
    let mut changed = false;
    for (op, spec) in update {
        let Some(spec) = spec.as_document() else {
            return Err(Error::storage(format!("malformed update operator: {op}")));
        };
        match op.as_str() {
            "$set" => {
                for (field, value) in spec {
                    if doc.get(field) != Some(value) {
                        doc.insert(field.clone(), value.clone());
                        changed = true;
                    }
                }
            }
            "$inc" => {
                for (field, delta) in spec {
                    let delta = as_f64(delta).ok_or_else(|| {
                        Error::storage(format!("$inc by non-numeric value on {field}"))
                    })?;
                    let current = match doc.get(field) {
                        None => 0.0,
                        Some(value) => as_f64(value).ok_or_else(|| {
                            Error::storage(format!("$inc on non-numeric field {field}"))
                        })?,
                    };
                    doc.insert(field.clone(), Bson::Double(current + delta));
                    changed = true;
                }
            }
            "$push" => {
                for (field, value) in spec {
                    match doc.get_mut(field) {
                        Some(Bson::Array(elems)) => elems.push(value.clone()),
                        Some(_) => {
                            return Err(Error::storage(format!(
                                "$push on non-array field {field}"
                            )))
                        }
                        None => {
                            doc.insert(field.clone(), Bson::Array(vec![value.clone()]));
                        }
                    }
                    changed = true;
                }
            }
            "$pull" => {
                for (field, condition) in spec {
                    if let Some(Bson::Array(elems)) = doc.get_mut(field) {
                        let before = elems.len();
                        elems.retain(|e| !field_matches(Some(e), condition));
                        changed |= elems.len() != before;
                    }
                }
            }
            "$pullAll" => {
                for (field, values) in spec {
                    let Bson::Array(values) = values else {
                        return Err(Error::storage(format!(
                            "$pullAll needs an array for {field}"
                        )));
                    };
                    if let Some(Bson::Array(elems)) = doc.get_mut(field) {
                        let before = elems.len();
                        elems.retain(|e| !values.contains(e));
                        changed |= elems.len() != before;
                    }
                }
            }
            other => return Err(Error::storage(format!("unsupported update operator: {other}"))),
        }
    }
    Ok(changed)
}

fn apply_sort(docs: &mut [Document], sort: &Document) {
    // Stable sort per key, applied last key first, gives multi-key order.
    let keys: Vec<(String, bool)> = sort
        .iter()
        .map(|(field, direction)| {
            let descending = as_f64(direction).map(|d| d < 0.0).unwrap_or(false);
            (field.clone(), descending)
        })
        .collect();
    for (field, descending) in keys.iter().rev() {
        docs.sort_by(|a, b| {
            let order = bson_cmp(a.get(field), b.get(field));
            if *descending {
                order.reverse()
            } else {
                order
            }
        });
    }
}

fn bson_cmp(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Bson::String(x), Bson::String(y)) => x.cmp(y),
            (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
            (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
            _ => match (as_f64(a), as_f64(b)) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            },
        },
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(d) => Some(*d),
        Bson::Int32(i) => Some(*i as f64),
        Bson::Int64(i) => Some(*i as f64),
        _ => None,
    }
}

/// `$group` over the working set. Supports `_id` group keys referencing a
/// field (`"$category"`) and `$sum` accumulators over a field reference or
/// a numeric literal.
fn apply_group(docs: &[Document], spec: &Document) -> Vec<Document> {
    let key_spec = spec.get("_id").cloned().unwrap_or(Bson::Null);
    let mut groups: Vec<(Bson, Document)> = Vec::new();

    for doc in docs {
        let key = resolve(&key_spec, doc);
        let position = groups.iter().position(|(k, _)| *k == key);
        let index = match position {
            Some(index) => index,
            None => {
                let mut seed = Document::new();
                seed.insert("_id", key.clone());
                for (name, accumulator) in spec {
                    if name == "_id" {
                        continue;
                    }
                    let literal_count = accumulator
                        .as_document()
                        .and_then(|a| a.get("$sum"))
                        .map(|operand| !matches!(operand, Bson::String(_)))
                        .unwrap_or(false);
                    if literal_count {
                        seed.insert(name.clone(), Bson::Int64(0));
                    } else {
                        seed.insert(name.clone(), Bson::Double(0.0));
                    }
                }
                groups.push((key, seed));
                groups.len() - 1
            }
        };

        let entry = &mut groups[index].1;
        for (name, accumulator) in spec {
            if name == "_id" {
                continue;
            }
            let Some(operand) = accumulator.as_document().and_then(|a| a.get("$sum")) else {
                continue;
            };
            match operand {
                Bson::String(reference) => {
                    let amount = reference
                        .strip_prefix('$')
                        .and_then(|field| doc.get(field))
                        .and_then(as_f64)
                        .unwrap_or(0.0);
                    let current = entry.get(name).and_then(as_f64).unwrap_or(0.0);
                    entry.insert(name.clone(), Bson::Double(current + amount));
                }
                literal => {
                    let step = as_f64(literal).unwrap_or(0.0) as i64;
                    let current = entry.get(name).and_then(Bson::as_i64).unwrap_or(0);
                    entry.insert(name.clone(), Bson::Int64(current + step));
                }
            }
        }
    }

    groups.into_iter().map(|(_, doc)| doc).collect()
}

fn resolve(spec: &Bson, doc: &Document) -> Bson {
    match spec {
        Bson::String(s) => match s.strip_prefix('$') {
            Some(field) => doc.get(field).cloned().unwrap_or(Bson::Null),
            None => spec.clone(),
        },
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[tokio::test]
    async fn insert_assigns_object_id() {
        let backend = MemoryBackend::new();
        let id = backend
            .insert_one("expenses", doc! { "title": "Coffee" })
            .await
            .unwrap();
        assert!(matches!(id, Bson::ObjectId(_)));

        let found = backend
            .find_one("expenses", doc! { "_id": id.clone() })
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn in_filter_matches_either_form() {
        let backend = MemoryBackend::new();
        let id = backend
            .insert_one("expenses", doc! { "title": "Coffee" })
            .await
            .unwrap();
        let hex = match &id {
            Bson::ObjectId(oid) => oid.to_hex(),
            _ => unreachable!(),
        };

        let filter = doc! { "_id": { "$in": [id, Bson::String(hex)] } };
        assert!(backend.find_one("expenses", filter).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn or_filter_matches_any_branch() {
        let backend = MemoryBackend::new();
        backend
            .insert_one("users", doc! { "username": "alice", "email": "a@x.io" })
            .await
            .unwrap();

        let filter = doc! { "$or": [ { "email": "a@x.io" }, { "username": "bob" } ] };
        assert!(backend.find_one("users", filter).await.unwrap().is_some());

        let filter = doc! { "$or": [ { "email": "b@x.io" }, { "username": "bob" } ] };
        assert!(backend.find_one("users", filter).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_operators_apply() {
        let backend = MemoryBackend::new();
        backend
            .insert_one(
                "users",
                doc! { "username": "alice", "total_spent": 0.0, "expenses_id": [] },
            )
            .await
            .unwrap();

        let modified = backend
            .update_one(
                "users",
                doc! { "username": "alice" },
                doc! { "$push": { "expenses_id": "e1" }, "$inc": { "total_spent": 4.5 } },
            )
            .await
            .unwrap();
        assert_eq!(modified, 1);

        backend
            .update_one(
                "users",
                doc! { "username": "alice" },
                doc! { "$push": { "expenses_id": "e2" } },
            )
            .await
            .unwrap();

        let user = backend
            .find_one("users", doc! { "username": "alice" })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.get_f64("total_spent").unwrap(), 4.5);
        assert_eq!(user.get_array("expenses_id").unwrap().len(), 2);

        backend
            .update_one(
                "users",
                doc! { "username": "alice" },
                doc! { "$pull": { "expenses_id": { "$in": ["e1"] } } },
            )
            .await
            .unwrap();
        backend
            .update_one(
                "users",
                doc! { "username": "alice" },
                doc! { "$pullAll": { "expenses_id": ["e2"] } },
            )
            .await
            .unwrap();

        let user = backend
            .find_one("users", doc! { "username": "alice" })
            .await
            .unwrap()
            .unwrap();
        assert!(user.get_array("expenses_id").unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_missing_document_modifies_nothing() {
        let backend = MemoryBackend::new();
        let modified = backend
            .update_one(
                "users",
                doc! { "username": "ghost" },
                doc! { "$set": { "budget": 10.0 } },
            )
            .await
            .unwrap();
        assert_eq!(modified, 0);
    }

    #[tokio::test]
    async fn find_many_sorts_and_pages() {
        let backend = MemoryBackend::new();
        for (title, ts) in [("a", 1_000), ("b", 3_000), ("c", 2_000)] {
            backend
                .insert_one(
                    "expenses",
                    doc! {
                        "title": title,
                        "created_at": bson::DateTime::from_millis(ts),
                    },
                )
                .await
                .unwrap();
        }

        let newest = backend
            .find_many(
                "expenses",
                doc! {},
                QueryOptions::newest_first(0, 2),
            )
            .await
            .unwrap();
        let titles: Vec<&str> = newest.iter().map(|d| d.get_str("title").unwrap()).collect();
        assert_eq!(titles, ["b", "c"]);

        let second_page = backend
            .find_many(
                "expenses",
                doc! {},
                QueryOptions::newest_first(2, 2),
            )
            .await
            .unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].get_str("title").unwrap(), "a");
    }

    #[tokio::test]
    async fn group_aggregation_sums_and_counts() {
        let backend = MemoryBackend::new();
        for (category, amount) in [("Food", 4.5), ("Food", 5.5), ("Travel", 20.0)] {
            backend
                .insert_one(
                    "transactions",
                    doc! { "user_id": "u1", "category": category, "amount": amount },
                )
                .await
                .unwrap();
        }
        backend
            .insert_one(
                "transactions",
                doc! { "user_id": "u2", "category": "Food", "amount": 99.0 },
            )
            .await
            .unwrap();

        let results = backend
            .aggregate(
                "transactions",
                vec![
                    doc! { "$match": { "user_id": "u1" } },
                    doc! { "$group": {
                        "_id": "$category",
                        "total": { "$sum": "$amount" },
                        "count": { "$sum": 1 },
                    } },
                ],
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        let food = results
            .iter()
            .find(|d| d.get_str("_id").unwrap() == "Food")
            .unwrap();
        assert_eq!(food.get_f64("total").unwrap(), 10.0);
        assert_eq!(food.get_i64("count").unwrap(), 2);
    }

    #[tokio::test]
    async fn distinct_flattens_and_dedupes() {
        let backend = MemoryBackend::new();
        for category in ["Food", "Travel", "Food"] {
            backend
                .insert_one("transactions", doc! { "user_id": "u1", "category": category })
                .await
                .unwrap();
        }
        let values = backend
            .distinct("transactions", "category", doc! { "user_id": "u1" })
            .await
            .unwrap();
        assert_eq!(values.len(), 2);
    }

    #[tokio::test]
    async fn unique_index_rejects_duplicates() {
        let backend = MemoryBackend::new();
        backend.ensure_unique_index("users", "email").await.unwrap();
        backend
            .insert_one("users", doc! { "username": "alice", "email": "a@x.io" })
            .await
            .unwrap();
        let duplicate = backend
            .insert_one("users", doc! { "username": "bob", "email": "a@x.io" })
            .await;
        assert!(duplicate.is_err());
    }
}
