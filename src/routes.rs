//! HTTP handlers and their JSON shapes.
//!
//! Request bodies are deserialized into the `New*`/`*Update` records by
//! [`Request::json`], which rejects anything malformed with `422` before the
//! handler does any work. Responses use camelCase field names.

use serde::{Deserialize, Serialize};

use crate::blog::BlogRecord;
use crate::counter::CounterRecord;
use crate::error::ApiError;
use crate::user::UserRecord;
use crate::{Json, Request, Services, Status};

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

// ── Blogs ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogView {
    pub id: String,
    pub title: String,
    pub blog_type: String,
    pub markdown_content: String,
}

impl From<BlogRecord> for BlogView {
    fn from(b: BlogRecord) -> Self {
        Self {
            id: b.id.map(|id| id.to_hex()).unwrap_or_default(),
            title: b.title,
            blog_type: b.blog_type,
            markdown_content: b.markdown_content,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlog {
    pub title: String,
    pub blog_type: String,
    pub markdown_content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentUpdate {
    pub markdown_content: String,
}

#[derive(Debug, Serialize)]
pub struct BlogAdded {
    pub message: &'static str,
    pub id: String,
}

/// `GET /api/get-all-blogs`
pub async fn get_all_blogs(_req: Request, s: Services) -> ApiResult<Vec<BlogView>> {
    let blogs = s.blogs.list_all().await?;
    Ok(Json(blogs.into_iter().map(BlogView::from).collect()))
}

/// `POST /api/add-blog`
pub async fn add_blog(req: Request, s: Services) -> ApiResult<BlogAdded> {
    let blog: NewBlog = req.json()?;
    let id = s.blogs.create(blog.title, blog.blog_type, blog.markdown_content).await?;
    Ok(Json(BlogAdded { message: "Blog added", id: id.to_hex() }))
}

/// `PATCH /api/update-blog-content/{blogId}`
pub async fn update_blog_content(req: Request, s: Services) -> ApiResult<Message> {
    let update: ContentUpdate = req.json()?;
    let id = req.param("blogId").unwrap_or_default();
    s.blogs.update_content(id, update.markdown_content).await?;
    Ok(Json(Message::new("Blog content updated")))
}

/// `DELETE /api/delete-blog/{blogId}` → `204 No Content`
pub async fn delete_blog(req: Request, s: Services) -> Result<Status, ApiError> {
    s.blogs.delete(req.param("blogId").unwrap_or_default()).await?;
    Ok(Status::NoContent)
}

// ── Request counters ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterView {
    pub ip_address: String,
    pub request_count: i64,
}

impl From<CounterRecord> for CounterView {
    fn from(c: CounterRecord) -> Self {
        Self { ip_address: c.ip_address, request_count: c.request_count }
    }
}

/// `GET /requests/no-increment/{ip}`
pub async fn requests_no_increment(req: Request, s: Services) -> ApiResult<CounterView> {
    let counter = s.counters.get_or_create(req.param("ip").unwrap_or_default()).await?;
    Ok(Json(counter.into()))
}

/// `GET /requests/increment/{ip}`
pub async fn requests_increment(req: Request, s: Services) -> ApiResult<CounterView> {
    let counter = s.counters.get_or_create_and_increment(req.param("ip").unwrap_or_default()).await?;
    Ok(Json(counter.into()))
}

/// `POST /requests/reset/{ip}`
pub async fn requests_reset(req: Request, s: Services) -> ApiResult<CounterView> {
    let counter = s.counters.reset(req.param("ip").unwrap_or_default()).await?;
    Ok(Json(counter.into()))
}

// ── Registered users ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub user_id: String,
    pub username: String,
}

impl From<UserRecord> for UserView {
    fn from(u: UserRecord) -> Self {
        Self {
            user_id: u.id.map(|id| id.to_hex()).unwrap_or_default(),
            username: u.username,
        }
    }
}

/// `POST /dbusers/`
pub async fn create_dbuser(req: Request, s: Services) -> ApiResult<UserView> {
    let user: NewUser = req.json()?;
    let created = s.users.create(user.username, user.email).await?;
    Ok(Json(created.into()))
}

/// `GET /dbusers/{id}`
pub async fn get_dbuser(req: Request, s: Services) -> ApiResult<UserView> {
    let user = s.users.get_by_id(req.param("id").unwrap_or_default()).await?;
    Ok(Json(user.into()))
}

/// `GET /dbusers/username/{username}`
pub async fn get_dbuser_by_username(req: Request, s: Services) -> ApiResult<UserView> {
    let user = s.users.get_by_username(req.param("username").unwrap_or_default()).await?;
    Ok(Json(user.into()))
}

// ── Greetings and demo endpoints ──────────────────────────────────────────────

/// `GET /`
pub async fn root(_req: Request, _s: Services) -> Json<Message> {
    Json(Message::new("Hello, World!"))
}

/// `GET /greet?name=Alice`
pub async fn greet(req: Request, _s: Services) -> Json<Message> {
    let name = req.query("name").unwrap_or_else(|| "Guest".to_owned());
    Json(Message::new(format!("Hello, {name}!")))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoUser {
    pub user_id: i64,
    pub username: String,
}

/// `GET /users/{id}`: echoes a synthetic user for any integer id.
pub async fn demo_user(req: Request, _s: Services) -> ApiResult<DemoUser> {
    let user_id: i64 = req.param_as("id")?;
    Ok(Json(DemoUser { user_id, username: format!("User{user_id}") }))
}

#[derive(Debug, Deserialize)]
pub struct Item {
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCreated {
    pub item_name: String,
    pub item_price: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemId {
    pub item_id: i64,
}

/// `POST /items/`
pub async fn create_item(req: Request, _s: Services) -> ApiResult<ItemCreated> {
    let item: Item = req.json()?;
    Ok(Json(ItemCreated { item_name: item.name, item_price: item.price }))
}

/// `GET /items/{id}`: ids start at 1.
pub async fn read_item(req: Request, _s: Services) -> ApiResult<ItemId> {
    let item_id: i64 = req.param_as("id")?;
    if item_id < 1 {
        return Err(ApiError::BadRequest("Invalid item ID".to_owned()));
    }
    Ok(Json(ItemId { item_id }))
}
