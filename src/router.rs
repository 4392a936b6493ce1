//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. You register a path, you
//! get a handler. Request tracing wraps every dispatch; CORS is a tower layer
//! around [`RouterService`].

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use matchit::Router as MatchitRouter;
use percent_encoding::percent_decode_str;
use tracing::warn;

use crate::error::{ApiError, FieldError};
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::middleware::trace;
use crate::request::Request;
use crate::response::{IntoResponse, Json, Response};
use crate::status::Status;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Largest request body read into memory unless overridden with
/// [`Router::body_limit`].
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// The application router.
///
/// Holds one radix tree per HTTP method plus the shared state `S` handed to
/// every handler. Build it once at startup, then turn it into a service with
/// [`Router::into_service`].
pub struct Router<S> {
    routes: HashMap<Method, MatchitRouter<BoxedHandler<S>>>,
    state: S,
    body_limit: usize,
}

pub(crate) enum Lookup<S> {
    /// Path parameters are still percent-encoded.
    Found(BoxedHandler<S>, Vec<(String, String)>),
    /// The path exists under other methods, listed here.
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

impl<S> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(state: S) -> Self {
        Self { routes: HashMap::new(), state, body_limit: DEFAULT_BODY_LIMIT }
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax — `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`. Routes are fixed at startup.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler<S>) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler<S>) -> Self {
        self.on(Method::Get, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler<S>) -> Self {
        self.on(Method::Post, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler<S>) -> Self {
        self.on(Method::Patch, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler<S>) -> Self {
        self.on(Method::Delete, path, handler)
    }

    /// Request bodies longer than `bytes` are answered with `413`.
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    pub fn into_service(self) -> RouterService<S> {
        RouterService(Arc::new(self))
    }

    pub(crate) fn lookup(&self, method: Method, path: &str) -> Lookup<S> {
        if let Some(matched) = self.routes.get(&method).and_then(|tree| tree.at(path).ok()) {
            let handler = Arc::clone(matched.value);
            let params = matched.params.iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect();
            return Lookup::Found(handler, params);
        }

        // HEAD is served by the GET handler.
        if method == Method::Head {
            if let found @ Lookup::Found(..) = self.lookup(Method::Get, path) {
                return found;
            }
        }

        let mut allowed: Vec<Method> = self.routes.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(m, _)| *m)
            .collect();
        if allowed.is_empty() {
            return Lookup::NotFound;
        }
        if allowed.contains(&Method::Get) && !allowed.contains(&Method::Head) {
            allowed.push(Method::Head);
        }
        allowed.sort();
        Lookup::MethodNotAllowed(allowed)
    }

    /// Routes one request and produces one response.
    ///
    /// Never fails: routing misses, unreadable bodies and handler errors all
    /// become HTTP responses.
    pub async fn handle<B>(&self, req: http::Request<B>) -> Response
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        trace::traced(&method, &path, self.route(req)).await
    }

    async fn route<B>(&self, req: http::Request<B>) -> Response
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();

        let Ok(method) = Method::try_from(&parts.method) else {
            return method_not_allowed(&[]);
        };

        let (handler, raw_params) = match self.lookup(method, parts.uri.path()) {
            Lookup::Found(handler, params) => (handler, params),
            Lookup::MethodNotAllowed(allowed) => return method_not_allowed(&allowed),
            Lookup::NotFound => return ApiError::NotFound("Not Found".to_owned()).into_response(),
        };

        let params = match decode_params(raw_params) {
            Ok(params) => params,
            Err(e) => return e.into_response(),
        };

        let body = match Limited::new(body, self.body_limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                return detail(Status::ContentTooLarge, "Request body too large");
            }
            Err(e) => {
                warn!("failed to read request body: {e}");
                return ApiError::BadRequest("Could not read request body".to_owned()).into_response();
            }
        };

        let mut res = handler.call(Request::new(&parts.uri, body, params), self.state.clone()).await;
        if method == Method::Head {
            res.body.clear();
        }
        res
    }
}

/// Percent-decodes path parameters. A value that is not UTF-8 once decoded is
/// a validation failure.
fn decode_params(raw: Vec<(String, String)>) -> Result<HashMap<String, String>, ApiError> {
    raw.into_iter()
        .map(|(key, value)| match percent_decode_str(&value).decode_utf8() {
            Ok(decoded) => Ok((key, decoded.into_owned())),
            Err(_) => Err(ApiError::InvalidInput(vec![FieldError::new(
                ["path", key.as_str()],
                "path parameter is not valid UTF-8",
                "string_unicode",
            )])),
        })
        .collect()
}

fn detail(status: Status, detail: &'static str) -> Response {
    #[derive(serde::Serialize)]
    struct Detail {
        detail: &'static str,
    }

    (status, Json(Detail { detail })).into_response()
}

fn method_not_allowed(allowed: &[Method]) -> Response {
    let mut res = detail(Status::MethodNotAllowed, "Method Not Allowed");
    if !allowed.is_empty() {
        let list: Vec<&str> = allowed.iter().map(|m| m.as_str()).collect();
        res.append_header("allow", list.join(", "));
    }
    res
}

// ── Tower service ─────────────────────────────────────────────────────────────

/// A [`Router`] as a [`tower::Service`], ready for tower layers and for the
/// [`Server`](crate::Server). Clones share one router.
pub struct RouterService<S>(Arc<Router<S>>);

impl<S> Clone for RouterService<S> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<S, B> tower::Service<http::Request<B>> for RouterService<S>
where
    S: Clone + Send + Sync + 'static,
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = http::Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let router = Arc::clone(&self.0);
        Box::pin(async move { Ok(router.handle(req).await.into_inner()) })
    }
}
