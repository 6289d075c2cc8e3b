//! Cache-status summaries read off completed responses.

use std::fmt;

use crate::Response;
use crate::http::headers::names;

/// What the client cache and, when it took part, the origin said about a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatusSummary {
    /// Exact value of the local-cache-status header.
    pub local: String,
    /// Value of the origin-cache-status header; `None` when the origin did not take part.
    pub origin: Option<String>,
}

/// Builds the summary for `response`. Reads headers only.
///
/// A response that never went through the client cache has no local header;
/// its `local` field is then empty.
pub fn summarize(response: &Response) -> CacheStatusSummary {
    let headers = response.headers();
    CacheStatusSummary {
        local: headers
            .get(names::CLIENT_CACHE)
            .unwrap_or_default()
            .to_owned(),
        origin: headers.get(names::SERVER_CACHE).map(str::to_owned),
    }
}

impl fmt::Display for CacheStatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Client: {}", self.local)?;
        if let Some(origin) = &self.origin {
            write!(f, "\nServer: {origin}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StatusCode;

    #[test]
    fn copies_local_value_exactly() {
        let res = Response::new(StatusCode::Ok).header("X-Cachelens-Client", "revalidated ");
        let summary = summarize(&res);
        assert_eq!(summary.local, "revalidated ");
        assert_eq!(summary.origin, None);
    }

    #[test]
    fn absent_origin_is_omitted_from_display() {
        let res = Response::new(StatusCode::Ok).header(names::CLIENT_CACHE, "hit");
        assert_eq!(summarize(&res).to_string(), "Client: hit");
    }

    #[test]
    fn origin_rendered_on_second_line() {
        let res = Response::new(StatusCode::Ok)
            .header(names::CLIENT_CACHE, "revalidated")
            .header(names::SERVER_CACHE, "not-modified");
        let summary = summarize(&res);
        assert_eq!(summary.origin.as_deref(), Some("not-modified"));
        assert_eq!(
            summary.to_string(),
            "Client: revalidated\nServer: not-modified"
        );
    }

    #[test]
    fn does_not_touch_the_response() {
        let res = Response::new(StatusCode::Ok).header(names::CLIENT_CACHE, "miss");
        let before = res.headers().clone();
        let _ = summarize(&res);
        assert_eq!(res.headers(), &before);
    }

    #[test]
    fn uncached_response_has_empty_local() {
        let res = Response::new(StatusCode::NoContent);
        assert_eq!(summarize(&res).local, "");
    }
}
