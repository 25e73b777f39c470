//! Request routing — map URL patterns and HTTP methods to handler functions.
//!
//! [`Router`] dispatches each request to the first route whose method and path
//! pattern both match, running it through the router's middleware first.
//!
//! | Pattern              | Example match              | Captured params   |
//! |----------------------|----------------------------|-------------------|
//! | `/todos`             | `/todos`                   | *(none)*          |
//! | `/todos/:id`         | `/todos/42`                | `id → "42"`       |
//! | `/todos/tag/:tag`    | `/todos/tag/home%20work`   | `tag → "home work"` |
//!
//! Trailing slashes are normalized on both patterns and incoming paths, so
//! `/todos/` and `/todos` are equivalent. Captured segments are
//! percent-decoded.

use std::borrow::Cow;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::middleware::{Middleware, MiddlewareHandler, Next, from_middleware};
use crate::{Method, Request, Response, StatusCode};

/// Type-erased, heap-allocated async handler that processes a [`Context`] and
/// returns a [`Response`].
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait via the blanket impl below.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
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

// A single path segment, either a literal string or a named capture (`:name`).
#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

// Compiled representation of a route pattern string.
#[derive(Debug, Clone)]
enum Pattern {
    // Matches one exact path string, e.g. `/todos`.
    Exact(String),
    // Matches a fixed number of segments where some are named captures, e.g. `/todos/:id`.
    Parameterized { segments: Vec<Segment> },
}

fn trim_trailing_slash(path: &str) -> &str {
    if path != "/" && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    }
}

fn percent_decode(segment: &str) -> Cow<'_, str> {
    // Invalid UTF-8 after decoding: keep the raw segment.
    urlencoding::decode(segment).unwrap_or(Cow::Borrowed(segment))
}

impl Pattern {
    /// Compiles a route pattern. Patterns containing `:` capture the segments
    /// that start with it; everything else matches literally.
    fn parse(pattern: &str) -> Self {
        let pattern = trim_trailing_slash(pattern);

        if !pattern.contains(':') {
            return Pattern::Exact(pattern.to_owned());
        }

        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix(':') {
                Some(name) => Segment::Parameter(name.to_owned()),
                None => Segment::Static(s.to_owned()),
            })
            .collect();

        Pattern::Parameterized { segments }
    }

    // Try to match `path`, returning the captured [`PathParams`] on success.
    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = trim_trailing_slash(path);

        match self {
            Pattern::Exact(p) => (p == path).then(PathParams::new),
            Pattern::Parameterized { segments } => {
                let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                if segments.len() != path_segments.len() {
                    return None;
                }

                let mut params = PathParams::new();
                for (seg, path_seg) in segments.iter().zip(path_segments) {
                    match seg {
                        Segment::Static(s) if s == path_seg => {}
                        Segment::Static(_) => return None,
                        Segment::Parameter(name) => {
                            params.insert(name.as_str(), percent_decode(path_seg));
                        }
                    }
                }
                Some(params)
            }
        }
    }
}

// A single registered route binding a method + pattern to a handler.
struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

impl Route {
    // Returns `Some(params)` when both the method and the path match.
    fn matches(&self, method: &Method, path: &str) -> Option<PathParams> {
        if &self.method == method {
            self.pattern.matches(path)
        } else {
            None
        }
    }
}

/// HTTP request router.
///
/// Routes are evaluated in registration order and the first match wins. When
/// nothing matches, a `404 Not Found` is returned. Middleware added with
/// [`Router::layer`] wraps every request, matched or not, outermost first.
///
/// # Examples
///
/// ```rust
/// use duetodo::context::Context;
/// use duetodo::router::Router;
/// use duetodo::{Response, StatusCode};
///
/// let mut router = Router::new();
/// router.get("/todos/:id", |ctx: Context| async move {
///     let id = ctx.param("id").unwrap_or_default().to_owned();
///     Response::new(StatusCode::Ok).body(id)
/// });
/// assert_eq!(router.len(), 1);
/// ```
pub struct Router {
    routes: Vec<Route>,
    middlewares: Vec<MiddlewareHandler>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create a router with no routes and no middleware.
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            middlewares: Vec::new(),
        }
    }

    /// Register a handler for `GET` requests matching `path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    /// Register a handler for `POST` requests matching `path`.
    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    /// Register a handler for `PUT` requests matching `path`.
    pub fn put(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Put, path, handler);
    }

    /// Register a handler for `DELETE` requests matching `path`.
    pub fn delete(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Delete, path, handler);
    }

    /// Append a middleware. Earlier layers wrap later ones.
    pub fn layer<M>(&mut self, middleware: M)
    where
        M: Middleware + 'static,
    {
        self.middlewares.push(from_middleware(Arc::new(middleware)));
    }

    // Erase the concrete handler type and store it as a `Handler` trait object.
    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.routes.push(Route {
            method,
            pattern: Pattern::parse(path),
            handler,
        });
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no routes have been registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatch `request` through the middleware to the first matching route.
    pub async fn route(&self, request: Request) -> Response {
        let matched = self.routes.iter().find_map(|route| {
            route
                .matches(request.method(), request.path())
                .map(|params| (Arc::clone(&route.handler), params))
        });

        let (endpoint, ctx) = match matched {
            Some((handler, params)) => (handler, Context::with_params(request, params)),
            None => (not_found(), Context::new(request)),
        };

        if self.middlewares.is_empty() {
            return endpoint(ctx).await;
        }

        Next::new(Arc::from(self.middlewares.as_slice()), endpoint)
            .run(ctx)
            .await
    }
}

fn not_found() -> Handler {
    Arc::new(
        |_ctx: Context| -> Pin<Box<dyn Future<Output = Response> + Send>> {
            Box::pin(async { Response::new(StatusCode::NotFound) })
        },
    )
}
