//! MongoDB backend.

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Document, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOneAndUpdateOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, Database, IndexModel};
use tracing::{debug, info};

use super::{Backend, Collection, Error, Result};

/// Server error code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;

/// A connected MongoDB client bound to one database.
#[derive(Debug, Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    /// Parses `url` and creates the client. The driver connects lazily, so
    /// an unreachable server surfaces on the first operation (or [`ping`]).
    ///
    /// [`ping`]: Backend::ping
    pub async fn connect(url: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(url).await?;
        let db = client.database(database);
        info!(database, "mongodb client created");
        Ok(Self { client, db })
    }
}

#[async_trait]
impl Backend for MongoStore {
    fn collection(&self, name: &str) -> Arc<dyn Collection> {
        Arc::new(MongoCollection(self.db.collection::<Document>(name)))
    }

    async fn ping(&self) -> Result<()> {
        self.db.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
        info!("mongodb client shut down");
    }
}

struct MongoCollection(mongodb::Collection<Document>);

#[async_trait]
impl Collection for MongoCollection {
    async fn find_all(&self) -> Result<Vec<Document>> {
        let cursor = self.0.find(None, None).await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        Ok(docs)
    }

    async fn find_one(&self, filter: Document) -> Result<Option<Document>> {
        Ok(self.0.find_one(filter, None).await?)
    }

    async fn insert_one(&self, doc: Document) -> Result<ObjectId> {
        let res = self.0.insert_one(doc, None).await?;
        res.inserted_id
            .as_object_id()
            .ok_or_else(|| Error::Malformed(format!("inserted id is not an ObjectId: {}", res.inserted_id)))
    }

    async fn update_one(&self, filter: Document, update: Document) -> Result<u64> {
        Ok(self.0.update_one(filter, update, None).await?.matched_count)
    }

    async fn delete_one(&self, filter: Document) -> Result<u64> {
        Ok(self.0.delete_one(filter, None).await?.deleted_count)
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<Option<Document>> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(upsert)
            .return_document(ReturnDocument::After)
            .build();
        Ok(self.0.find_one_and_update(filter, update, options).await?)
    }

    async fn ensure_unique_index(&self, field: &str) -> Result<()> {
        let mut keys = Document::new();
        keys.insert(field, 1);
        let index = IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(true).build())
            .build();
        let created = self.0.create_index(index, None).await?;
        debug!(collection = %self.0.name(), index = %created.index_name, "unique index ensured");
        Ok(())
    }
}

impl From<mongodb::error::Error> for Error {
    fn from(e: mongodb::error::Error) -> Self {
        let duplicate = match e.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(w)) => w.code == DUPLICATE_KEY,
            ErrorKind::Command(c) => c.code == DUPLICATE_KEY,
            _ => false,
        };
        if duplicate {
            Error::DuplicateKey(e.to_string())
        } else {
            Error::Mongo(e)
        }
    }
}
