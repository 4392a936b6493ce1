//! User registry.
//!
//! Emails are unique. `create` checks for an existing user first, which
//! gives the friendly error in the common case; the unique index on `email`
//! catches the two-concurrent-creates race the check cannot.

use std::sync::Arc;

use mongodb::bson::oid::ObjectId;
use mongodb::bson::{self, Document, doc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ApiError;
use crate::store::{self, Collection, parse_object_id};

const EMAIL_TAKEN: &str = "Email already registered";
const NOT_FOUND: &str = "User not found";

/// A stored user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub username: String,
    pub email: String,
}

#[derive(Clone)]
pub struct UserRegistry {
    coll: Arc<dyn Collection>,
}

impl UserRegistry {
    pub fn new(coll: Arc<dyn Collection>) -> Self {
        Self { coll }
    }

    pub async fn init(&self) -> store::Result<()> {
        self.coll.ensure_unique_index("email").await
    }

    /// Registers a user. Fails with [`ApiError::Conflict`] if the email is
    /// already taken.
    pub async fn create(&self, username: String, email: String) -> Result<UserRecord, ApiError> {
        if self.coll.find_one(doc! { "email": email.as_str() }).await?.is_some() {
            return Err(ApiError::Conflict(EMAIL_TAKEN.to_owned()));
        }

        let mut record = UserRecord { id: None, username, email };
        let doc = bson::to_document(&record).map_err(store::Error::from)?;
        match self.coll.insert_one(doc).await {
            Ok(id) => {
                record.id = Some(id);
                Ok(record)
            }
            Err(store::Error::DuplicateKey(key)) => {
                debug!(%key, "lost user creation race");
                Err(ApiError::Conflict(EMAIL_TAKEN.to_owned()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_by_id(&self, id: &str) -> Result<UserRecord, ApiError> {
        let oid = parse_object_id(id).ok_or_else(|| ApiError::NotFound(NOT_FOUND.to_owned()))?;
        self.find(doc! { "_id": oid }).await
    }

    pub async fn get_by_username(&self, username: &str) -> Result<UserRecord, ApiError> {
        self.find(doc! { "username": username }).await
    }

    async fn find(&self, filter: Document) -> Result<UserRecord, ApiError> {
        match self.coll.find_one(filter).await? {
            Some(doc) => Ok(bson::from_document(doc).map_err(store::Error::from)?),
            None => Err(ApiError::NotFound(NOT_FOUND.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    async fn registry() -> UserRegistry {
        let users = UserRegistry::new(Store::in_memory().collection("mycollection"));
        users.init().await.unwrap();
        users
    }

    #[tokio::test]
    async fn created_user_can_be_found_by_id_and_name() {
        let users = registry().await;
        let created = users.create("ada".into(), "ada@example.com".into()).await.unwrap();
        let id = created.id.unwrap().to_hex();

        assert_eq!(users.get_by_id(&id).await.unwrap(), created);
        assert_eq!(users.get_by_username("ada").await.unwrap(), created);
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let users = registry().await;
        users.create("ada".into(), "ada@example.com".into()).await.unwrap();
        let err = users.create("other".into(), "ada@example.com".into()).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(ref d) if d == EMAIL_TAKEN));

        users.create("ada".into(), "second@example.com".into()).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_creates_with_one_email_store_one_user() {
        let users = registry().await;
        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..16 {
            let users = users.clone();
            tasks.spawn(async move { users.create(format!("u{i}"), "same@example.com".into()).await });
        }
        let mut ok = 0;
        while let Some(res) = tasks.join_next().await {
            match res.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert!(matches!(e, ApiError::Conflict(_))),
            }
        }
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn unknown_and_malformed_ids_are_not_found() {
        let users = registry().await;
        assert!(matches!(users.get_by_id(&ObjectId::new().to_hex()).await, Err(ApiError::NotFound(_))));
        assert!(matches!(users.get_by_id("123").await, Err(ApiError::NotFound(_))));
        assert!(matches!(users.get_by_username("ghost").await, Err(ApiError::NotFound(_))));
    }
}
