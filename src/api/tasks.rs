use reqwest::Method;
use serde_json::json;
use tracing::info;

use crate::client::{ApiClient, ApiRequest};
use crate::error::Error;
use crate::models::{Task, TaskResponse, TasksResponse, UpdateTask};

impl ApiClient {
    pub async fn list_tasks(&self, completed: Option<bool>) -> Result<TasksResponse, Error> {
        let path = match completed {
            Some(completed) => format!("/api/tasks?completed={completed}"),
            None => "/api/tasks".to_string(),
        };
        self.call(ApiRequest::new(Method::GET, path)).await
    }

    pub async fn get_task(&self, id: &str) -> Result<Task, Error> {
        let resp: TaskResponse = self
            .call(ApiRequest::new(Method::GET, format!("/api/tasks/{id}")))
            .await?;
        Ok(resp.task)
    }

    pub async fn create_task(&self, title: &str, description: Option<&str>) -> Result<Task, Error> {
        if title.trim().is_empty() {
            return Err(Error::Validation("Title cannot be empty"));
        }

        let mut body = json!({ "title": title });
        if let Some(description) = description {
            body["description"] = json!(description);
        }

        let resp: TaskResponse = self
            .call(ApiRequest::new(Method::POST, "/api/tasks").json(body))
            .await?;
        info!(id = %resp.task.id, "created task");
        Ok(resp.task)
    }

    pub async fn update_task(&self, id: &str, update: &UpdateTask) -> Result<Task, Error> {
        let mut body = json!({});
        if let Some(title) = &update.title {
            if title.trim().is_empty() {
                return Err(Error::Validation("Title cannot be empty"));
            }
            body["title"] = json!(title);
        }
        if let Some(description) = &update.description {
            body["description"] = json!(description);
        }
        if let Some(completed) = update.completed {
            body["completed"] = json!(completed);
        }

        let resp: TaskResponse = self
            .call(ApiRequest::new(Method::PUT, format!("/api/tasks/{id}")).json(body))
            .await?;
        info!(id = %resp.task.id, completed = resp.task.completed, "updated task");
        Ok(resp.task)
    }

    pub async fn toggle_task(&self, id: &str) -> Result<Task, Error> {
        let resp: TaskResponse = self
            .call(ApiRequest::new(
                Method::PATCH,
                format!("/api/tasks/{id}/toggle"),
            ))
            .await?;
        info!(id = %resp.task.id, completed = resp.task.completed, "toggled task");
        Ok(resp.task)
    }

    pub async fn delete_task(&self, id: &str) -> Result<(), Error> {
        self.call_unit(ApiRequest::new(Method::DELETE, format!("/api/tasks/{id}")))
            .await?;
        info!(id, "deleted task");
        Ok(())
    }
}
