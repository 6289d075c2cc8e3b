use std::{future::Future, pin::Pin};

use crate::context::Context;
use crate::http::date::parse_http_date;
use crate::http::headers::names;
use crate::{Headers, Method, Response, StatusCode};

use super::{Middleware, Next};

/// Origin verdict written to the origin-cache-status header.
const NOT_MODIFIED: &str = "not-modified";
const MODIFIED: &str = "modified";

/// Answers conditional GETs on behalf of the downstream handlers.
///
/// When a `GET`/`HEAD` carries `If-None-Match` or `If-Modified-Since` and the
/// downstream response is a `200`, the validators are compared against the
/// response's `ETag` / `Last-Modified`. A match turns the response into a
/// bodiless `304 Not Modified`. Either way the origin-cache-status header
/// records the decision. Requests without validators are left alone and get no
/// origin header at all.
pub struct ConditionalGetMiddleware;

/// The validators a client sent with its request.
#[derive(Debug, Default)]
struct Preconditions {
    if_none_match: Option<String>,
    if_modified_since: Option<String>,
}

impl Preconditions {
    fn from_headers(headers: &Headers) -> Self {
        Self {
            if_none_match: headers.get(names::IF_NONE_MATCH).map(str::to_owned),
            if_modified_since: headers.get(names::IF_MODIFIED_SINCE).map(str::to_owned),
        }
    }

    fn is_empty(&self) -> bool {
        self.if_none_match.is_none() && self.if_modified_since.is_none()
    }

    /// Returns `true` when the client's copy is still current.
    ///
    /// `If-None-Match` takes precedence; `If-Modified-Since` is only consulted
    /// when no entity tags were sent (RFC 9110 §13.1.3).
    fn still_current(&self, response: &Headers) -> bool {
        if let Some(candidates) = &self.if_none_match {
            let Some(etag) = response.get(names::ETAG) else {
                return false;
            };
            return candidates
                .split(',')
                .map(str::trim)
                .any(|c| c == "*" || weak_eq(c, etag));
        }

        let since = self.if_modified_since.as_deref().and_then(parse_http_date);
        let modified = response.get(names::LAST_MODIFIED).and_then(parse_http_date);
        match (since, modified) {
            (Some(since), Some(modified)) => modified <= since,
            _ => false,
        }
    }
}

/// Weak comparison: opaque tags match regardless of the `W/` prefix.
fn weak_eq(a: &str, b: &str) -> bool {
    let opaque = |t: &str| t.strip_prefix("W/").unwrap_or(t).to_owned();
    opaque(a) == opaque(b)
}

fn not_modified(current: &Response) -> Response {
    let mut res = Response::new(StatusCode::NotModified);
    for name in [names::ETAG, names::LAST_MODIFIED, names::CACHE_CONTROL] {
        res.headers_mut().copy_from(current.headers(), name);
    }
    res
}

impl Middleware for ConditionalGetMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let request = ctx.request();
            let applicable = matches!(request.method(), Method::Get | Method::Head);
            let preconditions = Preconditions::from_headers(request.headers());

            let mut response = next.run(ctx).await;
            if !applicable || preconditions.is_empty() || response.status() != StatusCode::Ok {
                return response;
            }

            if preconditions.still_current(response.headers()) {
                tracing::debug!("validators match, answering 304");
                let mut res = not_modified(&response);
                res.add_header(names::SERVER_CACHE, NOT_MODIFIED);
                res
            } else {
                response.add_header(names::SERVER_CACHE, MODIFIED);
                response
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Pipeline;
    use crate::{Request, Router};

    const ETAG: &str = "W/\"1-1000\"";
    const LAST_MODIFIED: &str = "Wed, 01 Jan 2031 10:00:00 GMT";

    fn pipeline() -> Pipeline {
        let mut router = Router::new();
        router.get("/api/car/1", |_ctx| async {
            Response::new(StatusCode::Ok)
                .header(names::ETAG, ETAG)
                .header(names::LAST_MODIFIED, LAST_MODIFIED)
                .header(names::CACHE_CONTROL, "max-age=0, must-revalidate")
                .body("{}")
        });
        router.put("/api/car/1", |_ctx| async { Response::new(StatusCode::Ok) });
        Pipeline::new(router).with(ConditionalGetMiddleware)
    }

    #[tokio::test]
    async fn no_validators_no_origin_header() {
        let res = pipeline().handle(Request::get("/api/car/1")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert!(!res.headers().contains(names::SERVER_CACHE));
    }

    #[tokio::test]
    async fn matching_etag_yields_304() {
        let req = Request::get("/api/car/1").header(names::IF_NONE_MATCH, ETAG);
        let res = pipeline().handle(req).await;
        assert_eq!(res.status(), StatusCode::NotModified);
        assert!(res.body_ref().is_empty());
        assert_eq!(res.headers().get(names::ETAG), Some(ETAG));
        assert_eq!(res.headers().get(names::SERVER_CACHE), Some("not-modified"));
    }

    #[tokio::test]
    async fn strong_form_of_same_tag_matches_weakly() {
        let req = Request::get("/api/car/1").header(names::IF_NONE_MATCH, "\"1-1000\"");
        let res = pipeline().handle(req).await;
        assert_eq!(res.status(), StatusCode::NotModified);
    }

    #[tokio::test]
    async fn stale_etag_passes_body_through() {
        let req = Request::get("/api/car/1").header(names::IF_NONE_MATCH, "W/\"1-999\"");
        let res = pipeline().handle(req).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.headers().get(names::SERVER_CACHE), Some("modified"));
    }

    #[tokio::test]
    async fn etag_mismatch_wins_over_matching_date() {
        let req = Request::get("/api/car/1")
            .header(names::IF_NONE_MATCH, "W/\"other\"")
            .header(names::IF_MODIFIED_SINCE, LAST_MODIFIED);
        let res = pipeline().handle(req).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn if_modified_since_compares_dates() {
        let req = Request::get("/api/car/1")
            .header(names::IF_MODIFIED_SINCE, "Thu, 02 Jan 2031 10:00:00 GMT");
        let res = pipeline().handle(req).await;
        assert_eq!(res.status(), StatusCode::NotModified);

        let req = Request::get("/api/car/1")
            .header(names::IF_MODIFIED_SINCE, "Tue, 31 Dec 2030 10:00:00 GMT");
        let res = pipeline().handle(req).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn unsafe_methods_are_not_evaluated() {
        let req = Request::new(Method::Put, "/api/car/1").header(names::IF_NONE_MATCH, ETAG);
        let res = pipeline().handle(req).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert!(!res.headers().contains(names::SERVER_CACHE));
    }
}
