//! Read-mostly request metadata shared with every middleware.

use std::collections::HashMap;

use axum::extract::Query;
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap, Method, Uri};
use parking_lot::RwLock;

/// Metadata of the inbound upgrade request.
///
/// Built once per connection and handed to every middleware behind an
/// `Arc`. The request line, headers, path parameters, and query are
/// immutable. Typed extensions are the one writable slot: an earlier
/// middleware can attach data (an authenticated principal, say) for later
/// middlewares and the terminal handler to read.
#[derive(Debug)]
pub struct RequestContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    params: HashMap<String, String>,
    query: HashMap<String, String>,
    extensions: RwLock<Extensions>,
}

impl RequestContext {
    /// Creates a context from a request line and headers.
    ///
    /// The query map is parsed from `uri`; path parameters start empty.
    #[must_use]
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        let query = Query::<HashMap<String, String>>::try_from_uri(&uri)
            .map(|Query(query)| query)
            .unwrap_or_default();
        Self {
            method,
            uri,
            headers,
            params: HashMap::new(),
            query,
            extensions: RwLock::new(Extensions::new()),
        }
    }

    /// Creates a context from the parts of an upgrade request and the path
    /// parameters matched by the router.
    #[must_use]
    pub fn from_parts(parts: &Parts, params: HashMap<String, String>) -> Self {
        let mut context = Self::new(
            parts.method.clone(),
            parts.uri.clone(),
            parts.headers.clone(),
        );
        context.params = params;
        context
    }

    /// Creates a `GET` context for `path` with no headers.
    ///
    /// An unparsable path yields the root URI.
    #[must_use]
    pub fn for_path(path: &str) -> Self {
        Self::new(
            Method::GET,
            path.parse().unwrap_or_default(),
            HeaderMap::new(),
        )
    }

    /// Adds a path parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a matched path parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// All matched path parameters.
    #[must_use]
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Returns a query-string value.
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Attaches a typed value, replacing any previous value of the same type.
    pub fn insert_extension<T>(&self, value: T) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.extensions.write().insert(value)
    }

    /// Returns a clone of the attached value of type `T`.
    #[must_use]
    pub fn extension<T>(&self) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.extensions.read().get::<T>().cloned()
    }
}

impl Clone for RequestContext {
    fn clone(&self) -> Self {
        Self {
            method: self.method.clone(),
            uri: self.uri.clone(),
            headers: self.headers.clone(),
            params: self.params.clone(),
            query: self.query.clone(),
            extensions: RwLock::new(self.extensions.read().clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct User(String);

    #[test]
    fn query_is_parsed_from_uri() {
        let req = RequestContext::for_path("/ws/private?token=abc&room=7");
        assert_eq!(req.uri().path(), "/ws/private");
        assert_eq!(req.query("token"), Some("abc"));
        assert_eq!(req.query("room"), Some("7"));
        assert_eq!(req.query("missing"), None);
    }

    #[test]
    fn params_and_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-client", HeaderValue::from_static("tests"));
        let req = RequestContext::new(Method::GET, Uri::from_static("/rooms/42"), headers)
            .with_param("room", "42");
        assert_eq!(req.param("room"), Some("42"));
        assert_eq!(req.header("x-client"), Some("tests"));
        assert_eq!(req.method(), &Method::GET);
    }

    #[test]
    fn extensions_are_shared_through_reference() {
        let req = RequestContext::for_path("/ws");
        assert!(req.extension::<User>().is_none());

        req.insert_extension(User("ada".into()));
        assert_eq!(req.extension::<User>(), Some(User("ada".into())));

        let snapshot = req.clone();
        req.insert_extension(User("grace".into()));
        assert_eq!(snapshot.extension::<User>(), Some(User("ada".into())));
        assert_eq!(req.extension::<User>(), Some(User("grace".into())));
    }

    #[test]
    fn invalid_path_falls_back_to_root() {
        let req = RequestContext::for_path("not a uri");
        assert_eq!(req.uri().path(), "/");
    }
}
