//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The router holds handlers of *different* types in a single
//! `HashMap<Method, Tree>`, so each one is hidden behind a trait object
//! (`dyn ErasedHandler<S>`) and stored uniformly.
//!
//! ```text
//! async fn add_blog(req: Request, s: Services) -> … { … }   ← user writes this
//!        ↓ router.post("/api/add-blog", add_blog)
//! add_blog.into_boxed_handler()                           ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(add_blog))                           ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler<S> = Arc<dyn ErasedHandler<S>>
//! handler.call(req, state.clone())  at request time       ← one vtable dispatch
//!        ↓
//! Box::pin(async { add_blog(req, s).await.into_response() })  ← BoxFuture
//! ```
//!
//! Per request that is one `Arc` clone, one state clone and one virtual call.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future that resolves to a [`Response`].
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler<S> {
    fn call(&self, req: Request, state: S) -> BoxFuture;
}

/// A heap-allocated, type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler<S> = Arc<dyn ErasedHandler<S> + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` with the signature:
///
/// ```text
/// async fn name(req: Request, state: S) -> impl IntoResponse
/// ```
///
/// where `S` is the router's state type. The trait is sealed.
pub trait Handler<S>: private::Sealed<S> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler<S>;
}

mod private {
    pub trait Sealed<S> {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R, S> private::Sealed<S> for F
where
    F: Fn(Request, S) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R, S> Handler<S> for F
where
    F: Fn(Request, S) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
    S: 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler<S> {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Bridges a concrete handler `F` to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R, S> ErasedHandler<S> for FnHandler<F>
where
    F: Fn(Request, S) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request, state: S) -> BoxFuture {
        let fut = (self.0)(req, state);
        Box::pin(async move { fut.await.into_response() })
    }
}
