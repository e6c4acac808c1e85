use reqwest::Method;
use serde_json::json;
use tracing::{info, warn};

use crate::client::{ApiClient, ApiRequest};
use crate::error::Error;
use crate::models::{AuthResponse, Session};

fn validate_registration(username: &str, password: &str) -> Result<(), Error> {
    let username_ok = (3..=50).contains(&username.len())
        && username
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if !username_ok {
        return Err(Error::Validation(
            "Username must be 3-50 characters (alphanumeric and underscores only)",
        ));
    }
    // Count characters, not bytes; a short multibyte password must not
    // slip past the local check.
    if password.chars().count() < 8 {
        return Err(Error::Validation("Password must be at least 8 characters"));
    }
    Ok(())
}

impl ApiClient {
    pub async fn register(&self, username: &str, password: &str) -> Result<AuthResponse, Error> {
        validate_registration(username, password)?;
        self.authenticate("/api/auth/register", username, password)
            .await
    }

    /// Correctness of the credentials is the backend's call; only emptiness
    /// is rejected locally.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, Error> {
        if username.is_empty() || password.is_empty() {
            return Err(Error::Validation("Username and password are required"));
        }
        self.authenticate("/api/auth/login", username, password)
            .await
    }

    async fn authenticate(
        &self,
        path: &str,
        username: &str,
        password: &str,
    ) -> Result<AuthResponse, Error> {
        let resp: AuthResponse = self
            .call(
                ApiRequest::new(Method::POST, path)
                    .json(json!({ "username": username, "password": password })),
            )
            .await?;

        self.session().set_session(&Session {
            access_token: resp.access_token.clone(),
            refresh_token: resp.refresh_token.clone(),
            user_id: resp.user_id.clone(),
            username: resp.username.clone(),
        })?;
        info!(username = %resp.username, "signed in");

        Ok(resp)
    }

    /// Signs out. The backend call is best-effort: the local session is
    /// cleared no matter what, since the user's intent to sign out outranks
    /// confirmation from the server. A no-op without a stored session.
    pub async fn logout(&self) -> Result<(), Error> {
        let Some(session) = self.session().session()? else {
            return Ok(());
        };

        let result = self
            .call_unit(
                ApiRequest::new(Method::POST, "/api/auth/logout")
                    .json(json!({ "refresh_token": session.refresh_token })),
            )
            .await;
        if let Err(err) = result {
            warn!(error = %err, "logout request failed, clearing local session anyway");
        }

        self.clear_session().await?;
        info!("signed out");
        Ok(())
    }
}
