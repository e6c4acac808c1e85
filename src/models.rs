use serde::{Deserialize, Serialize};

/// The client's complete local record of an authenticated identity.
///
/// All four fields exist together or not at all; `user_id` and `username`
/// are denormalized from the login response so the CLI can show them
/// without decoding a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
    pub username: String,
}

/// Body of a successful refresh exchange. Carries no identity fields.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TasksResponse {
    pub tasks: Vec<Task>,
    pub count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskResponse {
    pub task: Task,
}

/// Fields to change on an existing task; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
}

/// Structured error body returned by the backend on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub details: Option<String>,
}
