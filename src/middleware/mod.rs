//! Middleware pipeline: composable logic around the request handler.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining chain; call [`Next::run`] to advance.
//! - [`Pipeline`]: an ordered middleware stack that ends in a [`Router`].
//! - [`LoggerMiddleware`]: request/response logger.
//! - [`ConditionalGetMiddleware`]: origin-side validation of cached copies.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use crate::router::Router;
use crate::{Request, Response, context::Context};

mod conditional;

pub use conditional::ConditionalGetMiddleware;

/// A type-erased, reference-counted middleware function.
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so each middleware can forward a
/// request at most once. When the chain is exhausted the request reaches the
/// router.
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    endpoint: Arc<Router>,
    // Tracks which middleware to invoke on the next `run` call.
    index: usize,
}

impl Next {
    /// Invokes the next middleware in the chain, or the router once none remain.
    pub async fn run(mut self, ctx: Context) -> Response {
        if self.index < self.middlewares.len() {
            let handler = self.middlewares[self.index].clone();
            self.index += 1;
            handler(ctx, self).await
        } else {
            self.endpoint.route(ctx.into_request()).await
        }
    }
}

/// The core trait for all middleware.
///
/// Implementors may pass through (`next.run(ctx).await`), short-circuit by
/// returning a [`Response`] directly, or decorate the downstream response.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// An ordered middleware stack in front of a [`Router`].
///
/// Middleware runs in the order it was added; the first one added sees the
/// request first and the response last.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use cachelens::Router;
/// use cachelens::middleware::{ConditionalGetMiddleware, LoggerMiddleware, Pipeline};
///
/// let pipeline = Pipeline::new(Router::new())
///     .with(LoggerMiddleware)
///     .with(ConditionalGetMiddleware);
/// let pipeline = Arc::new(pipeline);
/// ```
pub struct Pipeline {
    middlewares: Arc<[MiddlewareHandler]>,
    endpoint: Arc<Router>,
}

impl Pipeline {
    pub fn new(router: Router) -> Self {
        Self {
            middlewares: Vec::new().into(),
            endpoint: Arc::new(router),
        }
    }

    /// Appends a middleware to the end of the stack.
    #[must_use]
    pub fn with<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        let mut stack = self.middlewares.to_vec();
        stack.push(from_middleware(Arc::new(middleware)));
        self.middlewares = stack.into();
        self
    }

    /// Runs `request` through every middleware and then the router.
    pub async fn handle(&self, request: Request) -> Response {
        let next = Next {
            middlewares: Arc::clone(&self.middlewares),
            endpoint: Arc::clone(&self.endpoint),
            index: 0,
        };
        next.run(Context::new(request)).await
    }
}

/// Logs each request's method, path, status and duration.
///
/// Emits a single `tracing::info!` record after the downstream handler
/// completes. Never short-circuits.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().as_str().to_string();
            let path = ctx.request().path().to_string();

            let response = next.run(ctx).await;

            tracing::info!(
                %method,
                %path,
                status = response.status().as_u16(),
                elapsed = ?start.elapsed(),
                "request served"
            );

            response
        })
    }
}
