use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use taskhub::db::Database;
use taskhub::server::{router, AppState};

// ─── helpers ───────────────────────────────────────────────────────

struct TestApi {
    app: Router,
}

impl TestApi {
    fn new() -> Self {
        let db = Database::in_memory().expect("in-memory database");
        Self {
            app: router(AppState::new(db), &[]),
        }
    }

    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|e| panic!("bad JSON ({e}): {bytes:?}"))
        };
        (status, value)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None).await
    }

    async fn ok(&self, method: Method, uri: &str, body: Option<Value>) -> Value {
        let (status, value) = self.send(method, uri, body).await;
        assert!(status.is_success(), "{status}: {value}");
        assert_eq!(value["success"], true, "{value}");
        value
    }

    async fn create_user(&self, name: &str, email: &str) -> String {
        let v = self
            .ok(Method::POST, "/api/users", Some(json!({"name": name, "email": email})))
            .await;
        v["data"]["_id"].as_str().unwrap().to_string()
    }

    async fn create_task(&self, body: Value) -> String {
        let (status, v) = self.send(Method::POST, "/api/tasks", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{v}");
        v["data"]["_id"].as_str().unwrap().to_string()
    }

    async fn pending_tasks(&self, user: &str) -> Vec<String> {
        let v = self.ok(Method::GET, &format!("/api/users/{user}"), None).await;
        v["data"]["pendingTasks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|id| id.as_str().unwrap().to_string())
            .collect()
    }
}

fn encode(value: &Value) -> String {
    value
        .to_string()
        .replace('%', "%25")
        .replace('{', "%7B")
        .replace('}', "%7D")
        .replace('"', "%22")
        .replace(':', "%3A")
        .replace(',', "%2C")
        .replace(' ', "%20")
        .replace('[', "%5B")
        .replace(']', "%5D")
}

// ─── 1. system routes ──────────────────────────────────────────────

#[tokio::test]
async fn health_and_index() {
    let api = TestApi::new();
    let (status, v) = api.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], "ok");
    let v = api.ok(Method::GET, "/api", None).await;
    assert!(v["endpoints"]["tasks"].is_array());
}

#[tokio::test]
async fn unknown_route_is_404_envelope() {
    let api = TestApi::new();
    let (status, v) = api.get("/api/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(v["success"], false);
    assert_eq!(v["code"], "NOT_FOUND");
}

// ─── 2. task CRUD ──────────────────────────────────────────────────

#[tokio::test]
async fn create_then_fetch_round_trip() {
    let api = TestApi::new();
    let id = api.create_task(json!({"name": "A", "deadline": "2099-01-01"})).await;
    let v = api.ok(Method::GET, &format!("/api/tasks/{id}"), None).await;
    assert_eq!(v["data"]["name"], "A");
    assert_eq!(v["data"]["deadline"], "2099-01-01T00:00:00.000Z");
    assert_eq!(v["data"]["completed"], false);
    assert_eq!(v["data"]["status"], "pending");
    assert_eq!(v["data"]["assignedUserName"], "unassigned");
}

#[tokio::test]
async fn create_accepts_legacy_field_names() {
    let api = TestApi::new();
    let id = api.create_task(json!({"title": "Legacy", "dueDate": "2099-03-01"})).await;
    let v = api.ok(Method::GET, &format!("/api/tasks/{id}"), None).await;
    assert_eq!(v["data"]["name"], "Legacy");
    assert!(v["data"].get("title").is_none());
}

#[tokio::test]
async fn create_without_required_fields_is_rejected() {
    let api = TestApi::new();
    for body in [json!({"deadline": "2099-01-01"}), json!({"name": "A"}), json!({})] {
        let (status, v) = api.send(Method::POST, "/api/tasks", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(v["code"], "VALIDATION_ERROR");
        assert!(v["errors"].as_array().is_some_and(|e| !e.is_empty()));
    }
    let v = api.ok(Method::GET, "/api/tasks?count=true", None).await;
    assert_eq!(v["data"], 0);
}

#[tokio::test]
async fn malformed_body_and_ids() {
    let api = TestApi::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/tasks")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = api.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, v) = api.get("/api/tasks/not-an-id").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["code"], "BAD_IDENTIFIER");

    let missing = ulid::Ulid::new();
    let (status, _) = api.get(&format!("/api/tasks/{missing}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn undecodable_path_uses_error_envelope() {
    let api = TestApi::new();
    for uri in ["/api/tasks/%FF", "/api/users/%FF", "/api/users/%FF/tasks"] {
        let (status, v) = api.get(uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(v["success"], false, "{uri}");
        assert_eq!(v["code"], "BAD_REQUEST", "{uri}");
    }
}

#[tokio::test]
async fn far_future_deadline_is_rejected() {
    let api = TestApi::new();
    let (status, v) = api
        .send(
            Method::POST,
            "/api/tasks",
            Some(json!({"name": "A", "deadline": 253_402_300_800_000_i64})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["errors"][0], "deadline must be a valid date");
    let v = api.ok(Method::GET, "/api/tasks?count=true", None).await;
    assert_eq!(v["data"], 0);
}

#[tokio::test]
async fn put_replaces_and_patch_merges() {
    let api = TestApi::new();
    let id = api
        .create_task(json!({"name": "A", "deadline": "2099-01-01", "priority": "urgent", "description": "d"}))
        .await;

    let v = api
        .ok(Method::PATCH, &format!("/api/tasks/{id}"), Some(json!({"description": "changed"})))
        .await;
    assert_eq!(v["data"]["priority"], "urgent");
    assert_eq!(v["data"]["description"], "changed");

    let v = api
        .ok(Method::PUT, &format!("/api/tasks/{id}"), Some(json!({"name": "B", "deadline": "2099-01-02"})))
        .await;
    assert_eq!(v["data"]["priority"], "medium");
    assert_eq!(v["data"]["description"], "");

    let (status, _) = api
        .send(Method::PUT, &format!("/api/tasks/{id}"), Some(json!({"name": "C"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_returns_no_content() {
    let api = TestApi::new();
    let id = api.create_task(json!({"name": "A", "deadline": "2099-01-01"})).await;
    let (status, body) = api.send(Method::DELETE, &format!("/api/tasks/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());
    let (status, _) = api.get(&format!("/api/tasks/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ─── 3. pending-task back-references ───────────────────────────────

#[tokio::test]
async fn pending_list_follows_assignment_and_completion() {
    let api = TestApi::new();
    let ann = api.create_user("Ann", "ann@example.com").await;
    let bob = api.create_user("Bob", "bob@example.com").await;

    let task = api
        .create_task(json!({"name": "A", "deadline": "2099-01-01", "assignedUser": ann}))
        .await;
    assert_eq!(api.pending_tasks(&ann).await, vec![task.clone()]);
    let v = api.ok(Method::GET, &format!("/api/tasks/{task}"), None).await;
    assert_eq!(v["data"]["assignedUserName"], "Ann");

    // Reassign: leaves Ann, joins Bob exactly once.
    api.ok(Method::PATCH, &format!("/api/tasks/{task}"), Some(json!({"userId": bob})))
        .await;
    api.ok(Method::PATCH, &format!("/api/tasks/{task}"), Some(json!({"priority": "high"})))
        .await;
    assert!(api.pending_tasks(&ann).await.is_empty());
    assert_eq!(api.pending_tasks(&bob).await, vec![task.clone()]);

    // Completing while assigned removes it.
    let v = api
        .ok(Method::PATCH, &format!("/api/tasks/{task}"), Some(json!({"completed": true})))
        .await;
    assert_eq!(v["data"]["status"], "completed");
    assert!(v["data"]["completedAt"].is_string());
    assert!(api.pending_tasks(&bob).await.is_empty());

    // Reopening puts it back.
    api.ok(Method::PATCH, &format!("/api/tasks/{task}"), Some(json!({"status": "in-progress"})))
        .await;
    assert_eq!(api.pending_tasks(&bob).await, vec![task.clone()]);

    // Unassigning removes it.
    api.ok(Method::PATCH, &format!("/api/tasks/{task}"), Some(json!({"assignedUser": null})))
        .await;
    assert!(api.pending_tasks(&bob).await.is_empty());
}

#[tokio::test]
async fn deleting_task_detaches_it() {
    let api = TestApi::new();
    let ann = api.create_user("Ann", "ann@example.com").await;
    let task = api
        .create_task(json!({"name": "A", "deadline": "2099-01-01", "userId": ann}))
        .await;
    api.send(Method::DELETE, &format!("/api/tasks/{task}"), None).await;
    assert!(api.pending_tasks(&ann).await.is_empty());
}

#[tokio::test]
async fn user_delete_cascades() {
    let api = TestApi::new();
    let ann = api.create_user("Ann", "ann@example.com").await;
    let t1 = api.create_task(json!({"name": "A", "deadline": "2099-01-01", "userId": ann})).await;
    let t2 = api.create_task(json!({"name": "B", "deadline": "2099-01-01", "userId": ann})).await;
    let other = api.create_task(json!({"name": "C", "deadline": "2099-01-01"})).await;

    let v = api.ok(Method::DELETE, &format!("/api/users/{ann}"), None).await;
    assert_eq!(v["data"]["deletedTasks"], 2);
    for id in [&t1, &t2] {
        let (status, _) = api.get(&format!("/api/tasks/{id}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
    let (status, _) = api.get(&format!("/api/tasks/{other}")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = api.get(&format!("/api/users/{ann}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ─── 4. batch update ───────────────────────────────────────────────

#[tokio::test]
async fn batch_update_requires_ids_and_fields() {
    let api = TestApi::new();
    let id = api.create_task(json!({"name": "A", "deadline": "2099-01-01"})).await;

    let (status, v) = api
        .send(Method::PATCH, "/api/tasks/batch-update", Some(json!({"taskIds": [], "completed": true})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{v}");
    let (status, _) = api
        .send(Method::PATCH, "/api/tasks/batch-update", Some(json!({"taskIds": [id]})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let v = api.ok(Method::GET, &format!("/api/tasks/{id}"), None).await;
    assert_eq!(v["data"]["completed"], false);
}

#[tokio::test]
async fn batch_update_completes_and_detaches() {
    let api = TestApi::new();
    let ann = api.create_user("Ann", "ann@example.com").await;
    let a = api.create_task(json!({"name": "A", "deadline": "2099-01-01", "userId": ann})).await;
    let b = api.create_task(json!({"name": "B", "deadline": "2099-01-01", "userId": ann})).await;
    let ghost = ulid::Ulid::new().to_string();

    let v = api
        .ok(
            Method::PATCH,
            "/api/tasks/batch-update",
            Some(json!({"taskIds": [a, b, ghost], "status": "completed"})),
        )
        .await;
    assert_eq!(v["data"]["matchedCount"], 2);
    assert_eq!(v["data"]["modifiedCount"], 2);
    assert!(api.pending_tasks(&ann).await.is_empty());
}

// ─── 5. query interpretation ───────────────────────────────────────

async fn seed_five(api: &TestApi) -> Vec<String> {
    let mut ids = Vec::new();
    for (i, priority) in ["low", "medium", "high", "urgent", "high"].iter().enumerate() {
        ids.push(
            api.create_task(json!({
                "name": format!("Task {i}"),
                "deadline": format!("2099-01-0{}", i + 1),
                "priority": priority,
                "completed": i == 0
            }))
            .await,
        );
    }
    ids
}

#[tokio::test]
async fn pagination_reports_has_more() {
    let api = TestApi::new();
    seed_five(&api).await;
    let sort = encode(&json!({"deadline": 1}));

    let v = api
        .ok(Method::GET, &format!("/api/tasks?skip=0&limit=2&sort={sort}"), None)
        .await;
    assert_eq!(v["data"].as_array().unwrap().len(), 2);
    assert_eq!(v["data"][0]["name"], "Task 0");
    assert_eq!(v["data"][1]["name"], "Task 1");
    assert_eq!(v["pagination"]["hasMore"], true);
    assert_eq!(v["total"], 5);

    let v = api
        .ok(Method::GET, &format!("/api/tasks?skip=4&limit=2&sort={sort}"), None)
        .await;
    assert_eq!(v["data"].as_array().unwrap().len(), 1);
    assert_eq!(v["data"][0]["name"], "Task 4");
    assert_eq!(v["pagination"]["hasMore"], false);
}

#[tokio::test]
async fn out_of_range_pagination_is_rejected() {
    let api = TestApi::new();
    for query in ["limit=0", "limit=101", "skip=-1"] {
        let (status, v) = api.get(&format!("/api/tasks?{query}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{query}: {v}");
    }
}

#[tokio::test]
async fn completed_where_matches_both_shapes() {
    let api = TestApi::new();
    seed_five(&api).await;
    let v = api
        .ok(Method::GET, &format!("/api/tasks?where={}", encode(&json!({"completed": true}))), None)
        .await;
    assert_eq!(v["total"], 1);
    assert_eq!(v["data"][0]["name"], "Task 0");

    let v = api
        .ok(Method::GET, &format!("/api/tasks?where={}", encode(&json!({"status": "done"}))), None)
        .await;
    assert_eq!(v["total"], 1);

    let v = api
        .ok(Method::GET, &format!("/api/tasks?where={}&count=true", encode(&json!({"completed": "false"}))), None)
        .await;
    assert_eq!(v["data"], 4);
}

#[tokio::test]
async fn where_operators_and_select() {
    let api = TestApi::new();
    seed_five(&api).await;
    let filter = encode(&json!({"$or": [{"priority": "urgent"}, {"priority": {"$in": ["low"]}}]}));
    let select = encode(&json!(["name", "priority"]));
    let v = api
        .ok(Method::GET, &format!("/api/tasks?where={filter}&select={select}"), None)
        .await;
    assert_eq!(v["total"], 2);
    let first = v["data"][0].as_object().unwrap();
    let mut keys: Vec<&str> = first.keys().map(String::as_str).collect();
    keys.sort();
    assert_eq!(keys, vec!["_id", "name", "priority"]);
}

#[tokio::test]
async fn malformed_where_is_lenient_for_tasks_strict_for_users() {
    let api = TestApi::new();
    seed_five(&api).await;
    let v = api.ok(Method::GET, "/api/tasks?where=%7Bbroken", None).await;
    assert_eq!(v["total"], 5);

    let (status, v) = api.get("/api/users?where=%7Bbroken").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(v["message"].as_str().unwrap().contains("where"));

    let (status, _) = api
        .get(&format!("/api/tasks?where={}", encode(&json!({"owner": "x"}))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn populate_assigned_user() {
    let api = TestApi::new();
    let ann = api.create_user("Ann", "ann@example.com").await;
    let task = api.create_task(json!({"name": "A", "deadline": "2099-01-01", "userId": ann})).await;
    let populate = encode(&json!({"path": "assignedUser", "select": ["name", "email"]}));
    let v = api
        .ok(Method::GET, &format!("/api/tasks/{task}?populate={populate}"), None)
        .await;
    assert_eq!(v["data"]["assignedUser"]["name"], "Ann");
    assert_eq!(v["data"]["assignedUser"]["email"], "ann@example.com");
    assert!(v["data"]["assignedUser"].get("role").is_none());

    let v = api
        .ok(Method::GET, &format!("/api/users/{ann}?populate=pendingTasks"), None)
        .await;
    assert_eq!(v["data"]["pendingTasks"][0]["name"], "A");
}

// ─── 6. stats and search ───────────────────────────────────────────

#[tokio::test]
async fn task_stats_priority_histogram() {
    let api = TestApi::new();
    for priority in ["urgent", "high", "high"] {
        api.create_task(json!({"name": "T", "deadline": "2099-01-01", "priority": priority}))
            .await;
    }
    let v = api.ok(Method::GET, "/api/tasks/stats", None).await;
    assert_eq!(v["data"]["totalTasks"], 3);
    let buckets = v["data"]["priorityDistribution"].as_array().unwrap();
    let count_of = |key: &str| {
        buckets
            .iter()
            .find(|b| b["_id"] == key)
            .map(|b| b["count"].as_u64().unwrap())
            .unwrap_or(0)
    };
    assert_eq!(count_of("urgent"), 1);
    assert_eq!(count_of("high"), 2);
    assert_eq!(count_of("low"), 0);
}

#[tokio::test]
async fn user_stats_and_conflict() {
    let api = TestApi::new();
    api.create_user("Ann", "ann@example.com").await;
    let (status, v) = api
        .send(Method::POST, "/api/users", Some(json!({"name": "Ann 2", "email": "ANN@example.com"})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(v["message"].as_str().unwrap().contains("email"));

    let v = api.ok(Method::GET, "/api/users/stats", None).await;
    assert_eq!(v["data"]["totalUsers"], 1);
    assert_eq!(v["data"]["activeUsers"], 1);
    assert_eq!(v["data"]["roleDistribution"][0]["_id"], "member");
}

#[tokio::test]
async fn search_by_keyword_and_priority() {
    let api = TestApi::new();
    api.create_task(json!({"name": "Fix login", "deadline": "2099-01-01", "priority": "high"}))
        .await;
    api.create_task(json!({"name": "Docs", "description": "Login page", "deadline": "2099-01-01"}))
        .await;
    api.create_task(json!({"name": "Other", "deadline": "2099-01-01", "priority": "high"}))
        .await;

    let v = api.ok(Method::GET, "/api/tasks/search?keyword=LOGIN", None).await;
    assert_eq!(v["count"], 2);
    let v = api
        .ok(Method::GET, "/api/tasks/search?keyword=login&priority=high", None)
        .await;
    assert_eq!(v["count"], 1);
    assert_eq!(v["data"][0]["name"], "Fix login");
}

#[tokio::test]
async fn user_tasks_listing() {
    let api = TestApi::new();
    let ann = api.create_user("Ann", "ann@example.com").await;
    for i in 0..3 {
        api.create_task(json!({"name": format!("T{i}"), "deadline": "2099-01-01", "userId": ann}))
            .await;
    }
    api.create_task(json!({"name": "unrelated", "deadline": "2099-01-01"})).await;

    let v = api
        .ok(Method::GET, &format!("/api/users/{ann}/tasks?limit=2"), None)
        .await;
    assert_eq!(v["total"], 3);
    assert_eq!(v["count"], 2);
    assert_eq!(v["pagination"]["hasMore"], true);

    let missing = ulid::Ulid::new();
    let (status, _) = api.get(&format!("/api/users/{missing}/tasks")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
