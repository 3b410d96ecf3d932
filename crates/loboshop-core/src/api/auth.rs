//! Authentication endpoints.

use loboshop_types::{AuthResponse, Credentials, RegisterData};
use reqwest::Method;
use serde_json::Value;

use super::client::{ApiClient, ensure_success};
use super::error::{ApiError, ApiResult};

/// Outcome of validating a token against `/auth/perfil`.
#[derive(Debug)]
pub enum TokenCheck {
    /// The server accepted the token.
    Valid,
    /// The server refused the token (401, 403 or `success: false`).
    Rejected(ApiError),
    /// Validity is unknown: no response, or the server failed on its side.
    Unreachable(ApiError),
}

impl ApiClient {
    /// `POST /auth/login`.
    ///
    /// Returns the decoded body for any 2xx response, including
    /// `success: false`; callers decide what counts as a login.
    ///
    /// # Errors
    /// Returns an error on transport failure, non-2xx status or bad JSON.
    pub async fn login(&self, credentials: &Credentials) -> ApiResult<AuthResponse> {
        self.send_credentials(self.request(Method::POST, "auth/login").json(credentials))
            .await
    }

    /// `POST /auth/registro`.
    ///
    /// # Errors
    /// Returns an error on transport failure, non-2xx status or bad JSON.
    pub async fn register(&self, data: &RegisterData) -> ApiResult<AuthResponse> {
        self.send_credentials(self.request(Method::POST, "auth/registro").json(data))
            .await
    }

    /// `GET /auth/perfil` for the stored token.
    ///
    /// # Errors
    /// Returns an error on transport failure, non-2xx status, bad JSON or
    /// an explicit `success: false`.
    pub async fn profile(&self) -> ApiResult<AuthResponse> {
        let json: Value = self.get_json("auth/perfil").await?;
        ensure_success(&json)?;
        serde_json::from_value(json).map_err(|e| ApiError::parse(format!("Invalid profile: {e}")))
    }

    /// Checks whether the stored token is still accepted.
    ///
    /// Unlike a plain profile fetch, this separates "the server said no"
    /// from "the server could not be asked".
    pub async fn verify_token(&self) -> TokenCheck {
        let result = match self.get_json::<Value>("auth/perfil").await {
            Ok(json) => ensure_success(&json),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => TokenCheck::Valid,
            Err(e) if e.is_auth_rejection() => TokenCheck::Rejected(e),
            Err(e) => TokenCheck::Unreachable(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::api::{ApiErrorKind, ClientOptions};
    use crate::storage::{Store, TOKEN_KEY};

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(
            ClientOptions::new(format!("{}/api/v1", server.uri())),
            Store::memory_with([(TOKEN_KEY, json!("t1"))]),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_login_posts_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/login"))
            .and(body_json(json!({"email": "ana@lobo.mx", "password": "secreto"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "token": "t2",
                "usuario": {"id": "u1", "nombre": "Ana"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server)
            .login(&Credentials::new("ana@lobo.mx", "secreto"))
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.token.as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn test_register_posts_to_registro() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/auth/registro"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "success": false,
                "message": "El email ya está registrado"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let data = RegisterData {
            name: "Ana".to_string(),
            email: "ana@lobo.mx".to_string(),
            password: "secreto".to_string(),
            phone: Some("5512345678".to_string()),
        };
        let response = client(&server).register(&data).await.unwrap();
        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("El email ya está registrado"));
    }

    #[tokio::test]
    async fn test_profile_rejects_explicit_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/auth/perfil"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": false, "message": "Sesión expirada"})),
            )
            .mount(&server)
            .await;

        let err = client(&server).profile().await.unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Rejected);
        assert_eq!(err.message, "Sesión expirada");
    }

    #[tokio::test]
    async fn test_verify_token_classifies_outcomes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/auth/perfil"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "usuario": {"id": "u1", "nombre": "Ana"}
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/auth/perfil"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/auth/perfil"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let api = client(&server);
        assert!(matches!(api.verify_token().await, TokenCheck::Valid));
        assert!(matches!(api.verify_token().await, TokenCheck::Rejected(_)));
        assert!(matches!(api.verify_token().await, TokenCheck::Unreachable(_)));
    }
}
