//! End-to-end tests: real server, real sockets, real scanner.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use duetodo::api;
use duetodo::background::{NotificationScanner, Notifier, NotifyError};
use duetodo::config::ApiMode;
use duetodo::server::Server;
use duetodo::store::TaskStore;

struct TestServer {
    addr: SocketAddr,
    store: Arc<TaskStore>,
    shutdown: CancellationToken,
}

impl TestServer {
    async fn start(mode: ApiMode) -> Self {
        let store = Arc::new(TaskStore::new());
        let router = Arc::new(api::router(Arc::clone(&store), mode));
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr();
        let shutdown = CancellationToken::new();

        let token = shutdown.clone();
        tokio::spawn(async move {
            server
                .run_until(
                    move |req| {
                        let router = Arc::clone(&router);
                        async move { router.route(req).await }
                    },
                    token,
                )
                .await
        });

        Self {
            addr,
            store,
            shutdown,
        }
    }

    async fn send(&self, method: &str, path: &str, body: Option<&Value>) -> (u16, String) {
        let body = body.map(Value::to_string).unwrap_or_default();
        let raw = format!(
            "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );

        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();

        let (head, body) = text.split_once("\r\n\r\n").unwrap();
        let status = head.split(' ').nth(1).unwrap().parse().unwrap();
        (status, body.to_owned())
    }

    async fn json(&self, method: &str, path: &str, body: Option<&Value>) -> (u16, Value) {
        let (status, body) = self.send(method, path, body).await;
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body).unwrap()
        };
        (status, value)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[tokio::test]
async fn crud_round_trip_over_tcp() {
    let server = TestServer::start(ApiMode::Standard).await;

    let (status, created) = server
        .json(
            "POST",
            "/todos",
            Some(&json!({
                "title": "pay bills",
                "description": "electricity",
                "tags": ["home", "money"],
                "date": "2024-01-01T00:00:00Z"
            })),
        )
        .await;
    assert_eq!(status, 201);
    let id = created["id"].as_str().unwrap().to_owned();

    let (_, by_tag) = server.json("GET", "/todos/tag/money", None).await;
    assert_eq!(by_tag, json!([created.clone()]));

    let (_, by_date) = server.json("GET", "/todos/duedate/2024-01-01T00:00:00Z", None).await;
    assert_eq!(by_date, json!([created.clone()]));

    let (status, updated) = server
        .json(
            "PUT",
            &format!("/todos/{id}"),
            Some(&json!({"title": "pay all bills", "completed": true, "date": "2024-02-01T00:00:00Z"})),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(updated["id"], id.as_str());
    assert_eq!(updated["tags"], json!([]));
    assert_eq!(updated["completed"], true);

    let (_, by_title) = server.json("GET", "/todos/title/pay%20all%20bills", None).await;
    assert_eq!(by_title, json!([updated]));

    let (status, remaining) = server.json("DELETE", &format!("/todos/{id}"), None).await;
    assert_eq!(status, 200);
    assert_eq!(remaining, json!([]));

    let (status, _) = server.json("GET", &format!("/todos/{id}"), None).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn legacy_mode_over_tcp() {
    let server = TestServer::start(ApiMode::Legacy).await;
    server.store.create(duetodo::task::TaskDraft::titled("same"));
    server.store.create(duetodo::task::TaskDraft::titled("same"));

    let (status, body) = server.send("GET", "/todos/title/same", None).await;
    assert_eq!(status, 200);
    assert_eq!(body.lines().count(), 2);

    let (status, body) = server.send("GET", "/todos/missing-id", None).await;
    assert_eq!(status, 200);
    let zero: Value = serde_json::from_str(body.trim_end()).unwrap();
    assert_eq!(zero["id"], "");
    assert_eq!(zero["date"], "0001-01-01T00:00:00Z");

    let (status, body) = server.send("DELETE", "/todos", None).await;
    assert_eq!(status, 200);
    assert!(body.is_empty());
    assert!(server.store.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hundred_concurrent_creates_over_tcp() {
    let server = Arc::new(TestServer::start(ApiMode::Standard).await);

    let handles: Vec<_> = (0..100)
        .map(|i| {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                let (status, _) = server
                    .json("POST", "/todos", Some(&json!({ "title": format!("task-{i}") })))
                    .await;
                assert_eq!(status, 201);
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let (_, all) = server.json("GET", "/todos", None).await;
    let mut titles: Vec<_> = all
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap().to_owned())
        .collect();
    titles.sort();
    titles.dedup();
    assert_eq!(titles.len(), 100);
}

#[derive(Default)]
struct CollectingNotifier {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for CollectingNotifier {
    async fn notify(&self, _id: &str, title: &str) -> Result<(), NotifyError> {
        self.seen.lock().unwrap().push(title.to_owned());
        Ok(())
    }
}

#[tokio::test]
async fn scanner_notifies_todos_created_over_http_once() {
    let server = TestServer::start(ApiMode::Standard).await;
    let notifier = Arc::new(CollectingNotifier::default());
    let handle = NotificationScanner::new(Arc::clone(&server.store), notifier.clone())
        .with_period(Duration::from_millis(20))
        .spawn_with_token(server.shutdown.child_token());

    server
        .json("POST", "/todos", Some(&json!({"title": "overdue", "date": "2020-01-01T00:00:00Z"})))
        .await;
    server
        .json("POST", "/todos", Some(&json!({"title": "future", "date": "2999-01-01T00:00:00Z"})))
        .await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while notifier.seen.lock().unwrap().is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "no notification delivered");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    // Several more ticks must not redeliver.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(*notifier.seen.lock().unwrap(), vec!["overdue".to_owned()]);
    handle.stop().await;
}
