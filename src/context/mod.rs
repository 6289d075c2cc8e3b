//! Per-request context handed to route handlers and middleware.

use std::collections::HashMap;

use crate::Request;

/// Path parameters extracted from the matched route, e.g. `id` for `/api/car/:id`.
#[derive(Default, Debug, Clone)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Parses the named parameter, returning `None` when it is absent or malformed.
    pub fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key)?.parse().ok()
    }
}

/// A request together with whatever routing learned about it.
pub struct Context {
    request: Request,
    params: PathParams,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self::with_params(request, PathParams::new())
    }

    pub fn with_params(request: Request, params: PathParams) -> Self {
        Self { request, params }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Gives the request back, dropping the path parameters.
    pub fn into_request(self) -> Request {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_param_lookup() {
        let mut params = PathParams::new();
        params.insert("id".into(), "12".into());
        params.insert("name".into(), "abc".into());

        assert_eq!(params.parse::<u64>("id"), Some(12));
        assert_eq!(params.parse::<u64>("name"), None);
        assert_eq!(params.parse::<u64>("missing"), None);
    }
}
