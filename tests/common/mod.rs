//! In-process stub backend implementing the auth and task endpoints the
//! client consumes. Mints real three-segment (unsigned) tokens with a
//! configurable TTL, counts requests per area, and has failure knobs for
//! exercising the refresh and retry paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use checkoff::{ApiClient, ClientConfig, SessionManager, SessionStore};

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// Builds an unsigned compact token the inspector can decode.
pub fn mint_token(sub: &str, exp: i64, serial: u32) -> String {
    let header = URL_SAFE_NO_PAD.encode(json!({ "alg": "none" }).to_string());
    let payload =
        URL_SAFE_NO_PAD.encode(json!({ "sub": sub, "exp": exp, "jti": serial }).to_string());
    format!("{header}.{payload}.unsigned")
}

#[derive(Default)]
struct Inner {
    token_ttl: AtomicI64,
    serial: AtomicU32,
    next_task_id: AtomicU32,
    total_requests: AtomicU32,
    refresh_requests: AtomicU32,
    task_requests: AtomicU32,
    reject_login: AtomicBool,
    fail_refresh: AtomicBool,
    fail_logout: AtomicBool,
    always_deny: AtomicBool,
    deny_next: AtomicU32,
    garbage_errors: AtomicBool,
    tasks: Mutex<Vec<Value>>,
}

#[derive(Clone, Default)]
struct StubState(Arc<Inner>);

impl StubState {
    fn mint(&self) -> Value {
        let serial = self.0.serial.fetch_add(1, Ordering::SeqCst);
        let exp = unix_now() + self.0.token_ttl.load(Ordering::SeqCst);
        json!({
            "access_token": mint_token("user-1", exp, serial),
            "refresh_token": format!("refresh-{serial}"),
        })
    }

    fn error(&self, status: StatusCode, message: &str) -> Response {
        if self.0.garbage_errors.load(Ordering::SeqCst) {
            return (status, "nonsense").into_response();
        }
        (
            status,
            Json(json!({ "error": "error", "message": message })),
        )
            .into_response()
    }

    /// Bearer check for task endpoints, honoring the deny knobs.
    fn authorize(&self, headers: &HeaderMap) -> Result<(), Response> {
        let denied = self.0.always_deny.load(Ordering::SeqCst)
            || self
                .0
                .deny_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        let has_bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("Bearer "))
            .unwrap_or(false);

        if denied || !has_bearer {
            return Err(self.error(StatusCode::UNAUTHORIZED, "Invalid or expired token"));
        }
        Ok(())
    }
}

pub struct StubBackend {
    pub addr: String,
    state: StubState,
}

impl StubBackend {
    pub async fn start() -> Self {
        let state = StubState::default();
        state.0.token_ttl.store(3600, Ordering::SeqCst);

        let app = Router::new()
            .route("/api/auth/register", post(register))
            .route("/api/auth/login", post(login))
            .route("/api/auth/refresh", post(refresh))
            .route("/api/auth/logout", post(logout))
            .route("/api/tasks", get(list_tasks).post(create_task))
            .route("/api/tasks/{id}", get(get_task).put(update_task))
            .route("/api/tasks/{id}", delete(delete_task))
            .route("/api/tasks/{id}/toggle", patch(toggle_task))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                count_requests,
            ))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = format!("http://{}", listener.local_addr().unwrap());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        StubBackend { addr, state }
    }

    /// Client wired to this backend with a fresh in-memory session store.
    pub fn client(&self) -> ApiClient {
        let store = SessionStore::open_in_memory().expect("in-memory store");
        ApiClient::new(ClientConfig::new(&self.addr), SessionManager::new(store))
            .expect("building client")
    }

    pub fn set_token_ttl(&self, secs: i64) {
        self.state.0.token_ttl.store(secs, Ordering::SeqCst);
    }

    pub fn set_reject_login(&self, on: bool) {
        self.state.0.reject_login.store(on, Ordering::SeqCst);
    }

    pub fn set_fail_refresh(&self, on: bool) {
        self.state.0.fail_refresh.store(on, Ordering::SeqCst);
    }

    pub fn set_fail_logout(&self, on: bool) {
        self.state.0.fail_logout.store(on, Ordering::SeqCst);
    }

    pub fn set_always_deny(&self, on: bool) {
        self.state.0.always_deny.store(on, Ordering::SeqCst);
    }

    /// The next `n` task requests answer 401 regardless of the token.
    pub fn set_deny_next(&self, n: u32) {
        self.state.0.deny_next.store(n, Ordering::SeqCst);
    }

    pub fn set_garbage_errors(&self, on: bool) {
        self.state.0.garbage_errors.store(on, Ordering::SeqCst);
    }

    pub fn total_requests(&self) -> u32 {
        self.state.0.total_requests.load(Ordering::SeqCst)
    }

    pub fn refresh_requests(&self) -> u32 {
        self.state.0.refresh_requests.load(Ordering::SeqCst)
    }

    pub fn task_requests(&self) -> u32 {
        self.state.0.task_requests.load(Ordering::SeqCst)
    }
}

async fn count_requests(State(state): State<StubState>, req: Request, next: Next) -> Response {
    state.0.total_requests.fetch_add(1, Ordering::SeqCst);
    next.run(req).await
}

fn auth_response(state: &StubState, username: &str) -> Response {
    let mut body = state.mint();
    body["user_id"] = json!("user-1");
    body["username"] = json!(username);
    (StatusCode::OK, Json(body)).into_response()
}

async fn register(State(state): State<StubState>, Json(body): Json<Value>) -> Response {
    let username = body["username"].as_str().unwrap_or_default().to_string();
    auth_response(&state, &username)
}

async fn login(State(state): State<StubState>, Json(body): Json<Value>) -> Response {
    if state.0.reject_login.load(Ordering::SeqCst) {
        return state.error(StatusCode::UNAUTHORIZED, "Invalid username or password");
    }
    let username = body["username"].as_str().unwrap_or_default().to_string();
    auth_response(&state, &username)
}

async fn refresh(State(state): State<StubState>, Json(body): Json<Value>) -> Response {
    state.0.refresh_requests.fetch_add(1, Ordering::SeqCst);

    if state.0.fail_refresh.load(Ordering::SeqCst) {
        return state.error(StatusCode::UNAUTHORIZED, "Invalid refresh token");
    }
    if body["refresh_token"].as_str().unwrap_or_default().is_empty() {
        return state.error(StatusCode::BAD_REQUEST, "refresh_token is required");
    }

    (StatusCode::OK, Json(state.mint())).into_response()
}

async fn logout(State(state): State<StubState>) -> Response {
    if state.0.fail_logout.load(Ordering::SeqCst) {
        return state.error(StatusCode::INTERNAL_SERVER_ERROR, "logout unavailable");
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn list_tasks(
    State(state): State<StubState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    state.0.task_requests.fetch_add(1, Ordering::SeqCst);
    if let Err(resp) = state.authorize(&headers) {
        return resp;
    }

    let completed = params.get("completed").map(|v| v == "true");
    let tasks: Vec<Value> = state
        .0
        .tasks
        .lock()
        .unwrap()
        .iter()
        .filter(|t| completed.is_none_or(|c| t["completed"] == json!(c)))
        .cloned()
        .collect();
    let count = tasks.len();

    (
        StatusCode::OK,
        Json(json!({ "tasks": tasks, "count": count })),
    )
        .into_response()
}

async fn create_task(
    State(state): State<StubState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.0.task_requests.fetch_add(1, Ordering::SeqCst);
    if let Err(resp) = state.authorize(&headers) {
        return resp;
    }

    let id = state.0.next_task_id.fetch_add(1, Ordering::SeqCst);
    let task = json!({
        "id": format!("task-{id}"),
        "user_id": "user-1",
        "title": body["title"],
        "description": body.get("description").cloned().unwrap_or(Value::Null),
        "completed": false,
        "created_at": "2026-02-03T12:00:00Z",
        "updated_at": "2026-02-03T12:00:00Z",
    });
    state.0.tasks.lock().unwrap().insert(0, task.clone());

    (StatusCode::CREATED, Json(json!({ "task": task }))).into_response()
}

async fn get_task(
    State(state): State<StubState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.0.task_requests.fetch_add(1, Ordering::SeqCst);
    if let Err(resp) = state.authorize(&headers) {
        return resp;
    }

    let tasks = state.0.tasks.lock().unwrap();
    match tasks.iter().find(|t| t["id"] == json!(id)) {
        Some(task) => (StatusCode::OK, Json(json!({ "task": task }))).into_response(),
        None => state.error(StatusCode::NOT_FOUND, "Task not found"),
    }
}

async fn update_task(
    State(state): State<StubState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.0.task_requests.fetch_add(1, Ordering::SeqCst);
    if let Err(resp) = state.authorize(&headers) {
        return resp;
    }

    let mut tasks = state.0.tasks.lock().unwrap();
    match tasks.iter_mut().find(|t| t["id"] == json!(id)) {
        Some(task) => {
            for field in ["title", "description", "completed"] {
                if let Some(value) = body.get(field) {
                    task[field] = value.clone();
                }
            }
            task["updated_at"] = json!("2026-02-03T13:00:00Z");
            (StatusCode::OK, Json(json!({ "task": task }))).into_response()
        }
        None => state.error(StatusCode::NOT_FOUND, "Task not found"),
    }
}

async fn toggle_task(
    State(state): State<StubState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.0.task_requests.fetch_add(1, Ordering::SeqCst);
    if let Err(resp) = state.authorize(&headers) {
        return resp;
    }

    let mut tasks = state.0.tasks.lock().unwrap();
    match tasks.iter_mut().find(|t| t["id"] == json!(id)) {
        Some(task) => {
            let completed = task["completed"].as_bool().unwrap_or(false);
            task["completed"] = json!(!completed);
            task["updated_at"] = json!("2026-02-03T13:00:00Z");
            (StatusCode::OK, Json(json!({ "task": task }))).into_response()
        }
        None => state.error(StatusCode::NOT_FOUND, "Task not found"),
    }
}

async fn delete_task(
    State(state): State<StubState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.0.task_requests.fetch_add(1, Ordering::SeqCst);
    if let Err(resp) = state.authorize(&headers) {
        return resp;
    }

    let mut tasks = state.0.tasks.lock().unwrap();
    let before = tasks.len();
    tasks.retain(|t| t["id"] != json!(id));

    if tasks.len() < before {
        StatusCode::NO_CONTENT.into_response()
    } else {
        state.error(StatusCode::NOT_FOUND, "Task not found")
    }
}
