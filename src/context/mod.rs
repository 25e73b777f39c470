//! Per-request context handed to route handlers.
//!
//! A [`Context`] bundles the parsed [`Request`] with the [`PathParams`]
//! captured by the matching route.

use std::collections::HashMap;

use serde::de::DeserializeOwned;

use crate::Request;

/// Path parameters captured from the matched route, already percent-decoded.
#[derive(Default, Debug, Clone)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    /// Create an empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a captured value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    /// Look up a captured value by parameter name.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }
}

/// A request plus the parameters its route captured.
pub struct Context {
    request: Request,
    params: PathParams,
}

impl Context {
    /// A context with no captured parameters.
    pub fn new(request: Request) -> Self {
        Self::with_params(request, PathParams::new())
    }

    /// A context carrying the parameters captured by a route match.
    pub fn with_params(request: Request, params: PathParams) -> Self {
        Self { request, params }
    }

    /// The parsed request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Looks up a path parameter captured by the matched route.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Decodes the request body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the [`serde_json::Error`] if the body is not valid JSON for `T`.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }
}
