//! # duetodo
//!
//! An in-memory todo HTTP service with due-date push notifications.
//!
//! The [`TaskStore`](store::TaskStore) is the single shared collection. HTTP
//! handlers built by [`api::router`] and the periodic
//! [`NotificationScanner`](background::NotificationScanner) both go through
//! its lock-guarded operations; nothing else touches the records.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use duetodo::background::{LogNotifier, NotificationScanner};
//! use duetodo::config::ApiMode;
//! use duetodo::server::Server;
//! use duetodo::store::TaskStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(TaskStore::new());
//!     let _scanner = NotificationScanner::new(Arc::clone(&store), Arc::new(LogNotifier)).spawn();
//!
//!     let router = Arc::new(duetodo::api::router(store, ApiMode::Standard));
//!     let server = Server::bind("127.0.0.1:8000").await?;
//!     server
//!         .run(move |req| {
//!             let router = Arc::clone(&router);
//!             async move { router.route(req).await }
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

// ── Domain ────────────────────────────────────────────────────────────────────
pub mod background;
pub mod store;
pub mod task;

// ── Service plumbing ──────────────────────────────────────────────────────────
pub mod api;
pub mod config;
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use server::{Server, ServerError};
