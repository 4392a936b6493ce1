//! In-process backend.
//!
//! Documents live in a `Vec` per collection, behind one mutex per
//! collection. Every operation holds the lock from lookup to write, which is
//! what makes `find_one_and_update` linearizable per collection.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document};
use parking_lot::Mutex;

use super::{Backend, Collection, Error, Result};

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Arc<MemoryCollection>>>,
}

#[async_trait]
impl Backend for MemoryStore {
    fn collection(&self, name: &str) -> Arc<dyn Collection> {
        let mut collections = self.collections.lock();
        let coll = collections.entry(name.to_owned()).or_default();
        Arc::clone(coll) as Arc<dyn Collection>
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {}
}

#[derive(Debug, Default)]
struct MemoryCollection {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    docs: Vec<Document>,
    /// Fields carrying a unique index. `_id` is always unique.
    unique: Vec<String>,
}

impl Inner {
    fn position(&self, filter: &Document) -> Result<Option<usize>> {
        for (i, doc) in self.docs.iter().enumerate() {
            if matches(doc, filter)? {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    /// Rejects `candidate` if it collides with any other document on `_id`
    /// or an indexed field. `replacing` is the slot being overwritten.
    fn check_unique(&self, candidate: &Document, replacing: Option<usize>) -> Result<()> {
        let fields = std::iter::once("_id").chain(self.unique.iter().map(String::as_str));
        for field in fields {
            let Some(value) = candidate.get(field) else { continue };
            let clash = self
                .docs
                .iter()
                .enumerate()
                .any(|(i, d)| Some(i) != replacing && d.get(field) == Some(value));
            if clash {
                return Err(Error::DuplicateKey(format!("{field}: {value}")));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Collection for MemoryCollection {
    async fn find_all(&self) -> Result<Vec<Document>> {
        Ok(self.inner.lock().docs.clone())
    }

    async fn find_one(&self, filter: Document) -> Result<Option<Document>> {
        let inner = self.inner.lock();
        Ok(inner.position(&filter)?.map(|i| inner.docs[i].clone()))
    }

    async fn insert_one(&self, mut doc: Document) -> Result<ObjectId> {
        if !doc.contains_key("_id") {
            doc.insert("_id", ObjectId::new());
        }
        let id = doc.get_object_id("_id")?;
        let mut inner = self.inner.lock();
        inner.check_unique(&doc, None)?;
        inner.docs.push(doc);
        Ok(id)
    }

    async fn update_one(&self, filter: Document, update: Document) -> Result<u64> {
        let mut inner = self.inner.lock();
        let Some(i) = inner.position(&filter)? else { return Ok(0) };
        let mut doc = inner.docs[i].clone();
        apply_update(&mut doc, &update, false)?;
        inner.check_unique(&doc, Some(i))?;
        inner.docs[i] = doc;
        Ok(1)
    }

    async fn delete_one(&self, filter: Document) -> Result<u64> {
        let mut inner = self.inner.lock();
        match inner.position(&filter)? {
            Some(i) => {
                inner.docs.remove(i);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<Option<Document>> {
        let mut inner = self.inner.lock();
        if let Some(i) = inner.position(&filter)? {
            let mut doc = inner.docs[i].clone();
            apply_update(&mut doc, &update, false)?;
            inner.check_unique(&doc, Some(i))?;
            inner.docs[i] = doc.clone();
            return Ok(Some(doc));
        }
        if !upsert {
            return Ok(None);
        }

        // Seed the new document with the filter's equality fields, as MongoDB does.
        let mut doc = Document::new();
        doc.insert("_id", ObjectId::new());
        for (k, v) in &filter {
            doc.insert(k.clone(), v.clone());
        }
        apply_update(&mut doc, &update, true)?;
        inner.check_unique(&doc, None)?;
        inner.docs.push(doc.clone());
        Ok(Some(doc))
    }

    async fn ensure_unique_index(&self, field: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.unique.iter().any(|f| f == field) {
            return Ok(());
        }
        for (i, doc) in inner.docs.iter().enumerate() {
            let Some(value) = doc.get(field) else { continue };
            if inner.docs[i + 1..].iter().any(|d| d.get(field) == Some(value)) {
                return Err(Error::DuplicateKey(format!("{field}: {value}")));
            }
        }
        inner.unique.push(field.to_owned());
        Ok(())
    }
}

/// Equality match on every top-level field of `filter`.
fn matches(doc: &Document, filter: &Document) -> Result<bool> {
    for (key, expected) in filter {
        if key.starts_with('$') {
            return Err(Error::Unsupported(format!("query operator {key}")));
        }
        if let Bson::Document(inner) = expected {
            if let Some(op) = inner.keys().find(|k| k.starts_with('$')) {
                return Err(Error::Unsupported(format!("query operator {op}")));
            }
        }
        if doc.get(key) != Some(expected) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn apply_update(doc: &mut Document, update: &Document, inserting: bool) -> Result<()> {
    if update.is_empty() {
        return Err(Error::Malformed("empty update".to_owned()));
    }
    for (op, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(Error::Malformed(format!("{op} expects a document")));
        };
        match op.as_str() {
            "$set" => {
                for (k, v) in fields {
                    doc.insert(k.clone(), v.clone());
                }
            }
            "$setOnInsert" => {
                if inserting {
                    for (k, v) in fields {
                        doc.insert(k.clone(), v.clone());
                    }
                }
            }
            "$inc" => {
                for (k, delta) in fields {
                    let sum = add(doc.get(k), delta)
                        .ok_or_else(|| Error::Malformed(format!("cannot $inc field {k}")))?;
                    doc.insert(k.clone(), sum);
                }
            }
            other if other.starts_with('$') => {
                return Err(Error::Unsupported(format!("update operator {other}")));
            }
            _ => return Err(Error::Unsupported("replacement updates".to_owned())),
        }
    }
    Ok(())
}

/// Numeric addition with MongoDB's widening rules. A missing field counts
/// as zero of the delta's type.
fn add(current: Option<&Bson>, delta: &Bson) -> Option<Bson> {
    let sum = match (current, delta) {
        (None, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) => delta.clone(),
        (Some(Bson::Int32(a)), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(n) => Bson::Int32(n),
            None => Bson::Int64(i64::from(*a) + i64::from(*b)),
        },
        (Some(Bson::Int32(a)), Bson::Int64(b)) => Bson::Int64(i64::from(*a).checked_add(*b)?),
        (Some(Bson::Int64(a)), Bson::Int32(b)) => Bson::Int64(a.checked_add(i64::from(*b))?),
        (Some(Bson::Int64(a)), Bson::Int64(b)) => Bson::Int64(a.checked_add(*b)?),
        (Some(Bson::Double(a)), Bson::Double(b)) => Bson::Double(a + b),
        (Some(Bson::Double(a)), Bson::Int32(b)) => Bson::Double(a + f64::from(*b)),
        (Some(Bson::Double(a)), Bson::Int64(b)) => Bson::Double(a + *b as f64),
        (Some(Bson::Int32(a)), Bson::Double(b)) => Bson::Double(f64::from(*a) + b),
        (Some(Bson::Int64(a)), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        _ => return None,
    };
    Some(sum)
}

#[cfg(test)]
mod tests {
    use mongodb::bson::doc;

    use super::*;

    fn coll() -> Arc<dyn Collection> {
        MemoryStore::default().collection("things")
    }

    #[tokio::test]
    async fn insert_assigns_id_and_find_matches_on_equality() {
        let c = coll();
        let id = c.insert_one(doc! { "name": "a", "n": 1 }).await.unwrap();
        c.insert_one(doc! { "name": "b", "n": 2 }).await.unwrap();

        let found = c.find_one(doc! { "_id": id }).await.unwrap().unwrap();
        assert_eq!(found.get_str("name").unwrap(), "a");
        assert!(c.find_one(doc! { "name": "zzz" }).await.unwrap().is_none());
        assert_eq!(c.find_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn find_all_keeps_insertion_order() {
        let c = coll();
        for name in ["x", "y", "z"] {
            c.insert_one(doc! { "name": name }).await.unwrap();
        }
        let names: Vec<String> = c
            .find_all()
            .await
            .unwrap()
            .iter()
            .map(|d| d.get_str("name").unwrap().to_owned())
            .collect();
        assert_eq!(names, ["x", "y", "z"]);
    }

    #[tokio::test]
    async fn update_and_delete_report_counts() {
        let c = coll();
        c.insert_one(doc! { "k": "a", "v": "old", "other": 7 }).await.unwrap();

        assert_eq!(c.update_one(doc! { "k": "a" }, doc! { "$set": { "v": "new" } }).await.unwrap(), 1);
        assert_eq!(c.update_one(doc! { "k": "b" }, doc! { "$set": { "v": "new" } }).await.unwrap(), 0);
        let d = c.find_one(doc! { "k": "a" }).await.unwrap().unwrap();
        assert_eq!(d.get_str("v").unwrap(), "new");
        assert_eq!(d.get_i32("other").unwrap(), 7);

        assert_eq!(c.delete_one(doc! { "k": "a" }).await.unwrap(), 1);
        assert_eq!(c.delete_one(doc! { "k": "a" }).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upsert_seeds_from_filter_and_set_on_insert_only_applies_once() {
        let c = coll();
        let update = doc! { "$setOnInsert": { "count": 0_i64 } };

        let first = c.find_one_and_update(doc! { "key": "k" }, update.clone(), true).await.unwrap().unwrap();
        assert_eq!(first.get_str("key").unwrap(), "k");
        assert_eq!(first.get_i64("count").unwrap(), 0);

        c.update_one(doc! { "key": "k" }, doc! { "$set": { "count": 5_i64 } }).await.unwrap();
        let second = c.find_one_and_update(doc! { "key": "k" }, update, true).await.unwrap().unwrap();
        assert_eq!(second.get_i64("count").unwrap(), 5);
        assert_eq!(first.get_object_id("_id").unwrap(), second.get_object_id("_id").unwrap());
        assert_eq!(c.find_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn inc_creates_missing_field_and_widens() {
        let c = coll();
        let inc = doc! { "$inc": { "n": 1_i64 } };
        let d = c.find_one_and_update(doc! { "key": "k" }, inc.clone(), true).await.unwrap().unwrap();
        assert_eq!(d.get_i64("n").unwrap(), 1);
        let d = c.find_one_and_update(doc! { "key": "k" }, inc, true).await.unwrap().unwrap();
        assert_eq!(d.get_i64("n").unwrap(), 2);

        assert_eq!(add(Some(&Bson::Int32(i32::MAX)), &Bson::Int32(1)), Some(Bson::Int64(i64::from(i32::MAX) + 1)));
        assert_eq!(add(Some(&Bson::String("x".into())), &Bson::Int32(1)), None);
    }

    #[tokio::test]
    async fn without_upsert_a_miss_returns_none_and_creates_nothing() {
        let c = coll();
        let res = c
            .find_one_and_update(doc! { "key": "k" }, doc! { "$set": { "n": 0 } }, false)
            .await
            .unwrap();
        assert!(res.is_none());
        assert!(c.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unique_index_rejects_duplicates() {
        let c = coll();
        c.ensure_unique_index("email").await.unwrap();
        c.ensure_unique_index("email").await.unwrap();
        c.insert_one(doc! { "email": "a@x" }).await.unwrap();

        let err = c.insert_one(doc! { "email": "a@x" }).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(_)));
        c.insert_one(doc! { "email": "b@x" }).await.unwrap();

        let err = c
            .update_one(doc! { "email": "b@x" }, doc! { "$set": { "email": "a@x" } })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(_)));
    }

    #[tokio::test]
    async fn unique_index_cannot_be_built_over_existing_duplicates() {
        let c = coll();
        c.insert_one(doc! { "email": "a@x" }).await.unwrap();
        c.insert_one(doc! { "email": "a@x" }).await.unwrap();
        assert!(matches!(c.ensure_unique_index("email").await, Err(Error::DuplicateKey(_))));
    }

    #[tokio::test]
    async fn operators_outside_the_supported_set_are_rejected() {
        let c = coll();
        c.insert_one(doc! { "n": 1 }).await.unwrap();
        let err = c.find_one(doc! { "n": { "$gt": 0 } }).await.unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
        let err = c.update_one(doc! { "n": 1 }, doc! { "$push": { "xs": 1 } }).await.unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
        let err = c.update_one(doc! { "n": 1 }, doc! { "n": 2 }).await.unwrap_err();
        assert!(matches!(err, Error::Malformed(_) | Error::Unsupported(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_upserts_on_one_key_never_lose_updates() {
        let c = coll();
        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let c = Arc::clone(&c);
                tokio::spawn(async move {
                    c.find_one_and_update(doc! { "key": "hot" }, doc! { "$inc": { "n": 1_i64 } }, true)
                        .await
                        .unwrap()
                })
            })
            .collect();
        for t in tasks {
            t.await.unwrap();
        }

        let all = c.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].get_i64("n").unwrap(), 64);
    }
}
