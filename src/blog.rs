//! Blog post storage.

use std::sync::Arc;

use mongodb::bson::oid::ObjectId;
use mongodb::bson::{self, Document, doc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::store::{self, Collection, parse_object_id};

/// A stored blog post. Field names match the existing `AI_Blogs` documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "BlogType")]
    pub blog_type: String,
    #[serde(rename = "MarkdownContent")]
    pub markdown_content: String,
}

#[derive(Clone)]
pub struct BlogRepository {
    coll: Arc<dyn Collection>,
}

impl BlogRepository {
    pub fn new(coll: Arc<dyn Collection>) -> Self {
        Self { coll }
    }

    /// Every blog post, unpaginated.
    pub async fn list_all(&self) -> Result<Vec<BlogRecord>, ApiError> {
        let docs = self.coll.find_all().await?;
        let blogs = docs
            .into_iter()
            .map(bson::from_document)
            .collect::<Result<Vec<BlogRecord>, _>>()
            .map_err(store::Error::from)?;
        Ok(blogs)
    }

    /// Inserts a new post and returns its generated id.
    pub async fn create(
        &self,
        title: String,
        blog_type: String,
        markdown_content: String,
    ) -> Result<ObjectId, ApiError> {
        let record = BlogRecord { id: None, title, blog_type, markdown_content };
        let doc = bson::to_document(&record).map_err(store::Error::from)?;
        Ok(self.coll.insert_one(doc).await?)
    }

    /// Replaces the content of post `id`, leaving title and type untouched.
    pub async fn update_content(&self, id: &str, markdown_content: String) -> Result<(), ApiError> {
        let filter = by_id(id)?;
        let matched = self
            .coll
            .update_one(filter, doc! { "$set": { "MarkdownContent": markdown_content } })
            .await?;
        if matched == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let deleted = self.coll.delete_one(by_id(id)?).await?;
        if deleted == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }
}

fn by_id(id: &str) -> Result<Document, ApiError> {
    let oid = parse_object_id(id).ok_or_else(|| not_found(id))?;
    Ok(doc! { "_id": oid })
}

fn not_found(id: &str) -> ApiError {
    ApiError::NotFound(format!("Blog with id {id} not found"))
}
