//! REST facade over the [`TaskStore`].
//!
//! [`router`] builds the route table of the todo service:
//!
//! | Method   | Path                               | Store operation        |
//! |----------|------------------------------------|------------------------|
//! | `GET`    | `/todos`                           | `list_all`             |
//! | `GET`    | `/todos/:id`                       | `get_by_id`            |
//! | `GET`    | `/todos/title/:title`              | `find_by_title`        |
//! | `GET`    | `/todos/description/:description`  | `find_by_description`  |
//! | `GET`    | `/todos/duedate/:date`             | `find_by_due_date`     |
//! | `GET`    | `/todos/tag/:tag`                  | `find_by_tag`          |
//! | `POST`   | `/todos`                           | `create`               |
//! | `PUT`    | `/todos/:id`                       | `update`               |
//! | `DELETE` | `/todos/:id`                       | `delete`               |
//! | `DELETE` | `/todos`                           | `delete_all`           |
//!
//! How misses, multi-match lookups, and bad bodies are answered depends on
//! the [`ApiMode`].

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::ApiMode;
use crate::context::Context;
use crate::middleware::LoggerMiddleware;
use crate::router::{IntoHandler, Router};
use crate::store::TaskStore;
use crate::task::{TaskDraft, TaskRecord};
use crate::{Response, StatusCode};

/// Builds the todo service's router, with request logging.
pub fn router(store: Arc<TaskStore>, mode: ApiMode) -> Router {
    let api = Arc::new(TodoApi { store, mode });
    let mut router = Router::new();
    router.layer(LoggerMiddleware);

    router.get("/todos", endpoint(&api, TodoApi::list));
    router.get("/todos/title/:title", endpoint(&api, TodoApi::by_title));
    router.get("/todos/description/:description", endpoint(&api, TodoApi::by_description));
    router.get("/todos/duedate/:date", endpoint(&api, TodoApi::by_due_date));
    router.get("/todos/tag/:tag", endpoint(&api, TodoApi::by_tag));
    router.get("/todos/:id", endpoint(&api, TodoApi::get));
    router.post("/todos", endpoint(&api, TodoApi::create));
    router.put("/todos/:id", endpoint(&api, TodoApi::update));
    router.delete("/todos/:id", endpoint(&api, TodoApi::delete));
    router.delete("/todos", endpoint(&api, TodoApi::delete_all));

    router
}

// Adapts a synchronous `TodoApi` method into an async route handler.
fn endpoint(api: &Arc<TodoApi>, handler: fn(&TodoApi, Context) -> Response) -> impl IntoHandler {
    let api = Arc::clone(api);
    move |ctx: Context| {
        let api = Arc::clone(&api);
        async move { handler(&api, ctx) }
    }
}

struct TodoApi {
    store: Arc<TaskStore>,
    mode: ApiMode,
}

impl TodoApi {
    fn list(&self, _ctx: Context) -> Response {
        self.encode(StatusCode::Ok, &self.store.list_all())
    }

    fn get(&self, ctx: Context) -> Response {
        let id = ctx.param("id").unwrap_or_default();
        match (self.store.get_by_id(id), self.mode) {
            (Some(task), _) => self.encode(StatusCode::Ok, &task),
            (None, ApiMode::Legacy) => self.encode(StatusCode::Ok, &TaskRecord::empty()),
            (None, ApiMode::Standard) => not_found(id),
        }
    }

    fn by_title(&self, ctx: Context) -> Response {
        let title = ctx.param("title").unwrap_or_default();
        self.matches(self.store.find_by_title(title))
    }

    fn by_description(&self, ctx: Context) -> Response {
        let description = ctx.param("description").unwrap_or_default();
        self.matches(self.store.find_by_description(description))
    }

    fn by_due_date(&self, ctx: Context) -> Response {
        let date = ctx.param("date").unwrap_or_default();
        self.matches(self.store.find_by_due_date(date))
    }

    fn by_tag(&self, ctx: Context) -> Response {
        let tag = ctx.param("tag").unwrap_or_default();
        self.matches(self.store.find_by_tag(tag))
    }

    fn create(&self, ctx: Context) -> Response {
        match self.draft(&ctx) {
            Ok(draft) => {
                let status = match self.mode {
                    ApiMode::Standard => StatusCode::Created,
                    ApiMode::Legacy => StatusCode::Ok,
                };
                self.encode(status, &self.store.create(draft))
            }
            Err(response) => response,
        }
    }

    fn update(&self, ctx: Context) -> Response {
        let draft = match self.draft(&ctx) {
            Ok(draft) => draft,
            Err(response) => return response,
        };
        let id = ctx.param("id").unwrap_or_default();

        match (self.store.update(id, draft), self.mode) {
            (Some(task), _) => self.encode(StatusCode::Ok, &task),
            (None, ApiMode::Legacy) => legacy_empty(),
            (None, ApiMode::Standard) => not_found(id),
        }
    }

    fn delete(&self, ctx: Context) -> Response {
        let id = ctx.param("id").unwrap_or_default();
        if !self.store.delete(id) {
            debug!(id, "delete of unknown todo ignored");
        }
        self.encode(StatusCode::Ok, &self.store.list_all())
    }

    fn delete_all(&self, _ctx: Context) -> Response {
        self.store.delete_all();
        match self.mode {
            ApiMode::Standard => Response::new(StatusCode::NoContent),
            ApiMode::Legacy => legacy_empty(),
        }
    }

    // Decodes the body as a draft. Legacy mode treats an undecodable body as
    // an empty draft.
    fn draft(&self, ctx: &Context) -> Result<TaskDraft, Response> {
        match (ctx.json::<TaskDraft>(), self.mode) {
            (Ok(draft), _) => Ok(draft),
            (Err(e), ApiMode::Legacy) => {
                debug!(error = %e, "undecodable body treated as empty todo");
                Ok(TaskDraft::default())
            }
            (Err(e), ApiMode::Standard) => {
                warn!(error = %e, "rejecting malformed todo body");
                Err(Response::json(
                    StatusCode::BadRequest,
                    &json!({ "error": format!("invalid todo body: {e}") }),
                ))
            }
        }
    }

    // Answers a multi-match lookup: a JSON array, or in legacy mode one
    // newline-terminated object per match.
    fn matches(&self, tasks: Vec<TaskRecord>) -> Response {
        match self.mode {
            ApiMode::Standard => Response::json(StatusCode::Ok, &tasks),
            ApiMode::Legacy => {
                let mut body = Vec::new();
                for task in &tasks {
                    body.extend_from_slice(&legacy_line(task));
                }
                legacy_empty().json_body(body)
            }
        }
    }

    fn encode<T: Serialize + ?Sized>(&self, status: StatusCode, value: &T) -> Response {
        match self.mode {
            ApiMode::Standard => Response::json(status, value),
            ApiMode::Legacy => Response::new(status).json_body(legacy_line(value)),
        }
    }
}

// One JSON document followed by a newline.
fn legacy_line<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    match serde_json::to_vec(value) {
        Ok(mut line) => {
            line.push(b'\n');
            line
        }
        Err(e) => {
            warn!(error = %e, "failed to serialize legacy response line");
            Vec::new()
        }
    }
}

// `200 OK`, JSON content type, empty body.
fn legacy_empty() -> Response {
    Response::new(StatusCode::Ok).json_body(Vec::new())
}

fn not_found(id: &str) -> Response {
    Response::json(
        StatusCode::NotFound,
        &json!({ "error": format!("todo {id} not found") }),
    )
}
