//! Document store access.
//!
//! The rest of the crate talks to collections of schemaless [`Document`]s
//! through the [`Collection`] trait and never sees the backend. Two backends
//! exist:
//!
//! | Backend | Constructor | Used for |
//! |---|---|---|
//! | MongoDB | [`Store::mongodb`] | production |
//! | In-process | [`Store::in_memory`] | tests, local development |
//!
//! Both give the same guarantee for [`Collection::find_one_and_update`]: one
//! call is applied atomically, so two concurrent upserts on the same filter
//! create at most one document and never lose an update.
//!
//! Typed records are mapped to and from [`Document`] by the repositories
//! ([`crate::blog`], [`crate::user`], [`crate::counter`]) and nowhere else.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::document::ValueAccessError;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{self, Document};
use thiserror::Error;

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum Error {
    /// A write would violate a unique index.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// The filter or update uses an operator the backend does not implement.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// A stored document does not have the expected shape.
    #[error("malformed document: {0}")]
    Malformed(String),

    /// Any other driver failure (connection, timeout, server error).
    #[error("mongodb: {0}")]
    Mongo(mongodb::error::Error),
}

impl From<bson::de::Error> for Error {
    fn from(e: bson::de::Error) -> Self {
        Error::Malformed(e.to_string())
    }
}

impl From<bson::ser::Error> for Error {
    fn from(e: bson::ser::Error) -> Self {
        Error::Malformed(e.to_string())
    }
}

impl From<ValueAccessError> for Error {
    fn from(e: ValueAccessError) -> Self {
        Error::Malformed(e.to_string())
    }
}

/// Parses a 24-digit hex identifier as taken from a URL path.
///
/// A string that is not an ObjectId cannot name any stored document, so
/// callers treat `None` the same as a lookup miss.
pub fn parse_object_id(id: &str) -> Option<ObjectId> {
    ObjectId::parse_str(id).ok()
}

/// One named collection of documents.
///
/// Filters are equality matches on top-level fields. Updates use the
/// `$set`, `$inc` and `$setOnInsert` operators.
#[async_trait]
pub trait Collection: Send + Sync {
    /// Every document in the collection.
    async fn find_all(&self) -> Result<Vec<Document>>;

    async fn find_one(&self, filter: Document) -> Result<Option<Document>>;

    /// Inserts `doc`, generating `_id` when absent. Returns the identifier.
    async fn insert_one(&self, doc: Document) -> Result<ObjectId>;

    /// Applies `update` to the first match. Returns the matched count (0 or 1).
    async fn update_one(&self, filter: Document, update: Document) -> Result<u64>;

    /// Deletes the first match. Returns the deleted count (0 or 1).
    async fn delete_one(&self, filter: Document) -> Result<u64>;

    /// Atomically applies `update` to the first match and returns the
    /// document as it is *after* the update.
    ///
    /// With `upsert`, a missing document is created from the equality fields
    /// of `filter` plus the update. Without it, a miss returns `None`.
    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<Option<Document>>;

    /// Creates a unique index on `field` if it does not exist yet.
    async fn ensure_unique_index(&self, field: &str) -> Result<()>;
}

/// A backend: hands out collections and owns the connection.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    fn collection(&self, name: &str) -> Arc<dyn Collection>;

    /// Round-trip to the backend. Used by the readiness probe.
    async fn ping(&self) -> Result<()>;

    /// Releases the connection. Collections handed out earlier must not be
    /// used afterwards.
    async fn close(&self);
}

/// Shared handle to an opened store.
///
/// Cheap to clone. Opened once at startup and passed to the repositories.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn Backend>,
    kind: &'static str,
}

impl Store {
    /// Connects to MongoDB at `url` and selects `database`.
    pub async fn mongodb(url: &str, database: &str) -> Result<Self> {
        let backend = MongoStore::connect(url, database).await?;
        Ok(Self { backend: Arc::new(backend), kind: "mongodb" })
    }

    /// Creates an empty in-process store.
    pub fn in_memory() -> Self {
        Self { backend: Arc::new(MemoryStore::default()), kind: "memory" }
    }

    pub fn collection(&self, name: &str) -> Arc<dyn Collection> {
        self.backend.collection(name)
    }

    pub async fn ping(&self) -> Result<()> {
        self.backend.ping().await
    }

    pub async fn close(&self) {
        self.backend.close().await
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").field("kind", &self.kind).finish()
    }
}
