//! Method and path dispatch for the origin.
//!
//! Patterns are `/`-separated segments where `:name` captures one segment:
//!
//! | Pattern         | Matches         | Params      |
//! |-----------------|-----------------|-------------|
//! | `/api/cars`     | `/api/cars/`    | none        |
//! | `/api/car/:id`  | `/api/car/42`   | `id = "42"` |
//!
//! Routes are tried in registration order, so a literal such as
//! `/api/car/last` must be registered before `/api/car/:id`. A path that
//! matches under another method gets `405` with an `Allow` header; anything
//! else gets `404`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::http::headers::names;
use crate::{Method, Request, Response, StatusCode};

/// A boxed async route handler.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Anything callable as `Fn(Context) -> impl Future<Output = Response>`.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Capture(String),
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[derive(Debug, Clone)]
struct Pattern(Vec<Segment>);

impl Pattern {
    fn parse(pattern: &str) -> Self {
        Self(
            segments(pattern)
                .map(|s| match s.strip_prefix(':') {
                    Some(name) => Segment::Capture(name.to_owned()),
                    None => Segment::Literal(s.to_owned()),
                })
                .collect(),
        )
    }

    fn capture(&self, path: &str) -> Option<PathParams> {
        let mut params = PathParams::new();
        let mut parts = segments(path);
        for segment in &self.0 {
            let part = parts.next()?;
            match segment {
                Segment::Literal(lit) if lit != part => return None,
                Segment::Literal(_) => {}
                Segment::Capture(name) => params.insert(name.clone(), part.to_owned()),
            }
        }
        parts.next().is_none().then_some(params)
    }
}

struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

/// Dispatches requests to the first route whose method and pattern match.
///
/// ```rust,no_run
/// use cachelens::{Router, Response, StatusCode};
/// use cachelens::context::Context;
///
/// let mut router = Router::new();
/// router.get("/api/car/:id", |ctx: Context| async move {
///     let id = ctx.params().get("id").unwrap_or("unknown").to_owned();
///     Response::new(StatusCode::Ok).body(id)
/// });
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    pub fn put(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Put, path, handler);
    }

    pub fn delete(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Delete, path, handler);
    }

    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.routes.push(Route {
            method,
            pattern: Pattern::parse(path),
            handler,
        });
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub async fn route(&self, request: Request) -> Response {
        let mut allowed: Vec<&str> = Vec::new();

        for route in &self.routes {
            let Some(params) = route.pattern.capture(request.path()) else {
                continue;
            };
            if &route.method == request.method() {
                return (route.handler)(Context::with_params(request, params)).await;
            }
            let name = route.method.as_str();
            if !allowed.contains(&name) {
                allowed.push(name);
            }
        }

        if allowed.is_empty() {
            Response::new(StatusCode::NotFound)
        } else {
            Response::new(StatusCode::MethodNotAllowed).header(names::ALLOW, allowed.join(", "))
        }
    }
}
