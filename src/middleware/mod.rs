//! Middleware pipeline — composable before/after request handler logic.
//!
//! Each middleware wraps the next layer, so it can inspect the request,
//! short-circuit with its own response, or decorate the downstream response.
//! The innermost layer is always the route handler chosen by the
//! [`Router`](crate::router::Router).
//!
//! - [`Middleware`] — trait implemented by all middleware.
//! - [`Next`] — cursor into the remaining chain; call [`Next::run`] to advance.
//! - [`MiddlewareHandler`] — type-erased, cheaply-cloneable middleware function.
//! - [`LoggerMiddleware`] — built-in request/response logger.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::time::Instant;
use tracing::info;

use crate::{Response, context::Context, router::Handler};

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
/// request at most once. When every middleware has run, the endpoint handler
/// is invoked.
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    // Which middleware the next `run` call invokes.
    index: usize,
    endpoint: Handler,
}

impl Next {
    /// Creates a cursor at the start of `middlewares`, ending in `endpoint`.
    pub fn new(middlewares: Arc<[MiddlewareHandler]>, endpoint: Handler) -> Self {
        Self {
            middlewares,
            index: 0,
            endpoint,
        }
    }

    /// Invokes the next middleware, or the endpoint once the chain is exhausted.
    pub async fn run(mut self, ctx: Context) -> Response {
        let current = self.middlewares.get(self.index).cloned();
        match current {
            Some(handler) => {
                self.index += 1;
                handler(ctx, self).await
            }
            None => (self.endpoint)(ctx).await,
        }
    }
}

/// The core trait for all middleware.
///
/// Implementors may pass through (`next.run(ctx).await`), short-circuit by
/// returning a [`Response`] without calling `next`, or decorate the
/// downstream response.
///
/// Implementations are shared across Tokio tasks, so they must be
/// `Send + Sync` and must not hold `&mut` state across an `.await`.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next layer.
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// Logs each request's method, path, status, and latency after the
/// downstream handler completes.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().to_string();
            let path = ctx.request().path().to_owned();

            let response = next.run(ctx).await;

            info!(
                %method,
                %path,
                status = response.status().as_u16(),
                elapsed = ?start.elapsed(),
                "request handled"
            );

            response
        })
    }
}
