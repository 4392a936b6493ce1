//! # folio
//!
//! The backend behind a portfolio site: blog posts, a small user registry
//! and per-IP request counters, served as JSON over HTTP from a document
//! store.
//!
//! ## Layout
//!
//! - HTTP plumbing — [`Router`] (matchit radix trees, tracing) served as a
//!   tower service behind a `tower_http` CORS layer, [`Server`] (hyper,
//!   graceful shutdown), [`Request`], [`Response`]
//! - Store — [`store::Store`] over MongoDB or an in-process backend
//! - Domain — [`blog`], [`user`], [`counter`], bundled in [`Services`]
//! - Surface — [`routes`], registered by [`app`]
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use folio::{Server, Services, app, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let store = config.open_store().await?;
//!     let services = Services::init(store, &config.store.collections).await?;
//!
//!     Server::bind(config.bind_addr)
//!         .serve(app(services.clone(), &config)?)
//!         .await?;
//!     services.close().await;
//!     Ok(())
//! }
//! ```

use tower::ServiceBuilder;
use tower_http::cors::Cors;

use crate::config::Config;

mod error;
mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;
mod services;
mod status;

pub mod blog;
pub mod config;
pub mod counter;
pub mod health;
pub mod middleware;
pub mod routes;
pub mod store;
pub mod user;

pub use error::{ApiError, Error, FieldError};
pub use handler::Handler;
pub use method::Method;
pub use request::Request;
pub use response::{IntoResponse, Json, Response, ResponseBuilder};
pub use router::{Router, RouterService};
pub use server::Server;
pub use services::Services;
pub use status::Status;

/// The full HTTP application: every endpoint behind the CORS layer.
pub type App = Cors<RouterService<Services>>;

/// Builds the application with every endpoint registered.
pub fn app(services: Services, config: &Config) -> anyhow::Result<App> {
    let router = Router::new(services)
        .body_limit(config.max_body_bytes)
        .get("/api/get-all-blogs",                     routes::get_all_blogs)
        .post("/api/add-blog",                         routes::add_blog)
        .patch("/api/update-blog-content/{blogId}",    routes::update_blog_content)
        .delete("/api/delete-blog/{blogId}",           routes::delete_blog)
        .get("/requests/no-increment/{ip}",            routes::requests_no_increment)
        .get("/requests/increment/{ip}",               routes::requests_increment)
        .post("/requests/reset/{ip}",                  routes::requests_reset)
        .post("/dbusers/",                             routes::create_dbuser)
        .get("/dbusers/{id}",                          routes::get_dbuser)
        .get("/dbusers/username/{username}",           routes::get_dbuser_by_username)
        .get("/",                                      routes::root)
        .get("/greet",                                 routes::greet)
        .get("/users/{id}",                            routes::demo_user)
        .post("/items/",                               routes::create_item)
        .get("/items/{id}",                            routes::read_item)
        .get("/healthz",                               health::liveness)
        .get("/readyz",                                health::readiness);

    Ok(ServiceBuilder::new()
        .layer(config.cors()?)
        .service(router.into_service()))
}
