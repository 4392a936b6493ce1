//! Per-IP request counters.
//!
//! A counter is created lazily the first time its key is looked up and is
//! never deleted. Every operation is a single atomic `find_one_and_update`
//! on the store; there is no read-then-write anywhere, so concurrent callers
//! on one key never create duplicates or lose increments.

use std::sync::Arc;

use mongodb::bson::{self, Document, doc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::store::{self, Collection};

const KEY_FIELD: &str = "ip_address";
const COUNT_FIELD: &str = "request_count";

/// A stored counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRecord {
    pub ip_address: String,
    pub request_count: i64,
}

#[derive(Clone)]
pub struct CounterService {
    coll: Arc<dyn Collection>,
}

impl CounterService {
    pub fn new(coll: Arc<dyn Collection>) -> Self {
        Self { coll }
    }

    /// Makes the key field unique, so a racing upsert can never produce a
    /// second document for the same key.
    pub async fn init(&self) -> store::Result<()> {
        self.coll.ensure_unique_index(KEY_FIELD).await
    }

    /// Returns the counter for `key`, creating it at 0 if it does not exist.
    /// Never increments.
    pub async fn get_or_create(&self, key: &str) -> Result<CounterRecord, ApiError> {
        self.upsert(key, doc! { "$setOnInsert": { COUNT_FIELD: 0_i64 } }).await
    }

    /// Increments the counter for `key` and returns the new value. A counter
    /// that does not exist yet is created at 1.
    pub async fn get_or_create_and_increment(&self, key: &str) -> Result<CounterRecord, ApiError> {
        self.upsert(key, doc! { "$inc": { COUNT_FIELD: 1_i64 } }).await
    }

    /// Sets an existing counter back to 0.
    ///
    /// Fails with [`ApiError::NotFound`] when `key` has never been seen,
    /// which is how "never seen" is told apart from "seen and at zero".
    pub async fn reset(&self, key: &str) -> Result<CounterRecord, ApiError> {
        let found = self
            .coll
            .find_one_and_update(filter(key), doc! { "$set": { COUNT_FIELD: 0_i64 } }, false)
            .await?;
        match found {
            Some(doc) => Ok(bson::from_document(doc).map_err(store::Error::from)?),
            None => Err(ApiError::NotFound(format!("No requests recorded for {key}"))),
        }
    }

    async fn upsert(&self, key: &str, update: Document) -> Result<CounterRecord, ApiError> {
        let doc = self
            .coll
            .find_one_and_update(filter(key), update, true)
            .await?
            .ok_or_else(|| ApiError::Internal(format!("upsert for {key} returned no document")))?;
        Ok(bson::from_document(doc).map_err(store::Error::from)?)
    }
}

fn filter(key: &str) -> Document {
    doc! { KEY_FIELD: key }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use mongodb::bson::oid::ObjectId;

    use super::*;
    use crate::store::Store;

    async fn counters() -> CounterService {
        let svc = CounterService::new(Store::in_memory().collection("ip_requests"));
        svc.init().await.unwrap();
        svc
    }

    #[tokio::test]
    async fn get_or_create_starts_at_zero_and_does_not_increment() {
        let svc = counters().await;
        let first = svc.get_or_create("10.0.0.1").await.unwrap();
        assert_eq!(first, CounterRecord { ip_address: "10.0.0.1".into(), request_count: 0 });
        let again = svc.get_or_create("10.0.0.1").await.unwrap();
        assert_eq!(again.request_count, 0);
    }

    #[tokio::test]
    async fn sequential_increments_count_up_from_one() {
        let svc = counters().await;
        for expected in 1..=5 {
            let rec = svc.get_or_create_and_increment("::1").await.unwrap();
            assert_eq!(rec.request_count, expected);
        }
        assert_eq!(svc.get_or_create("::1").await.unwrap().request_count, 5);
    }

    #[tokio::test]
    async fn reset_requires_a_seen_key() {
        let svc = counters().await;
        assert!(matches!(svc.reset("1.2.3.4").await, Err(ApiError::NotFound(_))));

        svc.get_or_create_and_increment("1.2.3.4").await.unwrap();
        svc.get_or_create_and_increment("1.2.3.4").await.unwrap();
        assert_eq!(svc.reset("1.2.3.4").await.unwrap().request_count, 0);
        assert_eq!(svc.get_or_create_and_increment("1.2.3.4").await.unwrap().request_count, 1);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let svc = counters().await;
        svc.get_or_create_and_increment("a").await.unwrap();
        svc.get_or_create_and_increment("a").await.unwrap();
        assert_eq!(svc.get_or_create_and_increment("b").await.unwrap().request_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_counter() {
        let svc = counters().await;
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..40 {
            let svc = svc.clone();
            tasks.spawn(async move {
                if i % 2 == 0 {
                    svc.get_or_create("hot").await.unwrap();
                } else {
                    svc.get_or_create_and_increment("hot").await.unwrap();
                }
            });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap();
        }
        assert_eq!(svc.get_or_create("hot").await.unwrap().request_count, 20);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_reads_create_exactly_one_document() {
        let coll = Store::in_memory().collection("ip_requests");
        let svc = CounterService::new(Arc::clone(&coll));
        svc.init().await.unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..32 {
            let svc = svc.clone();
            tasks.spawn(async move { svc.get_or_create("fresh").await.unwrap() });
        }
        while let Some(res) = tasks.join_next().await {
            assert_eq!(res.unwrap().request_count, 0);
        }

        let docs = coll.find_all().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get_str(KEY_FIELD).unwrap(), "fresh");
    }

    /// A collection whose upserts come back empty.
    struct Forgetful;

    #[async_trait]
    impl Collection for Forgetful {
        async fn find_all(&self) -> store::Result<Vec<Document>> { Ok(vec![]) }
        async fn find_one(&self, _: Document) -> store::Result<Option<Document>> { Ok(None) }
        async fn insert_one(&self, _: Document) -> store::Result<ObjectId> { Ok(ObjectId::new()) }
        async fn update_one(&self, _: Document, _: Document) -> store::Result<u64> { Ok(0) }
        async fn delete_one(&self, _: Document) -> store::Result<u64> { Ok(0) }
        async fn find_one_and_update(&self, _: Document, _: Document, _: bool) -> store::Result<Option<Document>> {
            Ok(None)
        }
        async fn ensure_unique_index(&self, _: &str) -> store::Result<()> { Ok(()) }
    }

    #[tokio::test]
    async fn an_empty_upsert_result_is_an_internal_failure_not_a_miss() {
        let svc = CounterService::new(Arc::new(Forgetful));
        assert!(matches!(svc.get_or_create("x").await, Err(ApiError::Internal(_))));
        assert!(matches!(svc.get_or_create_and_increment("x").await, Err(ApiError::Internal(_))));
        assert!(matches!(svc.reset("x").await, Err(ApiError::NotFound(_))));
    }
}
