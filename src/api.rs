//! Client for the Fiştein REST backend.
//!
//! Everything the frontend shows comes from here: the backend owns users,
//! groups, expenses and the balance computation.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, EXPIRES, PRAGMA};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::schemas::{
    AddMemberRequest, AuthResponse, Balance, BackendErrorBody, CreateExpenseRequest,
    CreateGroupRequest, Expense, ExpenseId, GoogleLoginRequest, Group, GroupBalance, GroupId,
    LoginRequest, RegisterRequest, UpdateExpenseRequest, UpdateGroupRequest, User,
};

#[derive(Error, Debug)]
pub enum ApiError {
    /// The token was rejected; whoever holds it must drop the session.
    #[error("session expired")]
    Unauthorized,

    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait FisteinApi: Send + Sync {
    async fn login(&self, credentials: &LoginRequest) -> Result<AuthResponse, ApiError>;

    async fn google_login(&self, credentials: &GoogleLoginRequest) -> Result<AuthResponse, ApiError>;

    async fn register(&self, user: &RegisterRequest) -> Result<AuthResponse, ApiError>;

    async fn profile(&self, token: &str) -> Result<User, ApiError>;

    async fn user_balance(&self, token: &str) -> Result<Balance, ApiError>;

    async fn groups(&self, token: &str) -> Result<Vec<Group>, ApiError>;

    async fn group(&self, token: &str, id: GroupId) -> Result<Group, ApiError>;

    async fn create_group(&self, token: &str, group: &CreateGroupRequest) -> Result<Group, ApiError>;

    async fn update_group(
        &self,
        token: &str,
        id: GroupId,
        group: &UpdateGroupRequest,
    ) -> Result<Group, ApiError>;

    async fn delete_group(&self, token: &str, id: GroupId) -> Result<(), ApiError>;

    async fn add_member(&self, token: &str, id: GroupId, username: &str) -> Result<(), ApiError>;

    async fn group_balance(&self, token: &str, id: GroupId) -> Result<GroupBalance, ApiError>;

    async fn expenses(&self, token: &str) -> Result<Vec<Expense>, ApiError>;

    async fn expense(&self, token: &str, id: ExpenseId) -> Result<Expense, ApiError>;

    async fn create_expense(
        &self,
        token: &str,
        expense: &CreateExpenseRequest,
    ) -> Result<Expense, ApiError>;

    async fn update_expense(
        &self,
        token: &str,
        id: ExpenseId,
        expense: &UpdateExpenseRequest,
    ) -> Result<Expense, ApiError>;

    async fn delete_expense(&self, token: &str, id: ExpenseId) -> Result<(), ApiError>;

    async fn settle_expense(&self, token: &str, id: ExpenseId) -> Result<(), ApiError>;
}

pub struct HttpApi {
    client: Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        );
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(EXPIRES, HeaderValue::from_static("0"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        // Auth endpoints must never be answered from a cache.
        if path.starts_with("/auth/") {
            builder = builder.query(&[("_t", Utc::now().timestamp_millis())]);
        }
        builder
    }

    async fn send(builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        debug!(url = %response.url(), %status, "backend responded");

        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let body: BackendErrorBody = response.json().await.unwrap_or_default();
            let message = body.message.unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
            warn!(%status, %message, "backend rejected request");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn fetch<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ApiError> {
        Ok(Self::send(builder).await?.json().await?)
    }

    async fn execute(builder: RequestBuilder) -> Result<(), ApiError> {
        Self::send(builder).await.map(|_| ())
    }
}

#[async_trait]
impl FisteinApi for HttpApi {
    async fn login(&self, credentials: &LoginRequest) -> Result<AuthResponse, ApiError> {
        Self::fetch(self.request(Method::POST, "/auth/login", None).json(credentials)).await
    }

    async fn google_login(&self, credentials: &GoogleLoginRequest) -> Result<AuthResponse, ApiError> {
        Self::fetch(self.request(Method::POST, "/auth/google", None).json(credentials)).await
    }

    async fn register(&self, user: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        Self::fetch(self.request(Method::POST, "/auth/register", None).json(user)).await
    }

    async fn profile(&self, token: &str) -> Result<User, ApiError> {
        Self::fetch(self.request(Method::GET, "/users/me", Some(token))).await
    }

    async fn user_balance(&self, token: &str) -> Result<Balance, ApiError> {
        Self::fetch(self.request(Method::GET, "/users/balance", Some(token))).await
    }

    async fn groups(&self, token: &str) -> Result<Vec<Group>, ApiError> {
        Self::fetch(self.request(Method::GET, "/groups", Some(token))).await
    }

    async fn group(&self, token: &str, id: GroupId) -> Result<Group, ApiError> {
        Self::fetch(self.request(Method::GET, &format!("/groups/{id}"), Some(token))).await
    }

    async fn create_group(&self, token: &str, group: &CreateGroupRequest) -> Result<Group, ApiError> {
        Self::fetch(self.request(Method::POST, "/groups", Some(token)).json(group)).await
    }

    async fn update_group(
        &self,
        token: &str,
        id: GroupId,
        group: &UpdateGroupRequest,
    ) -> Result<Group, ApiError> {
        Self::fetch(
            self.request(Method::PUT, &format!("/groups/{id}"), Some(token))
                .json(group),
        )
        .await
    }

    async fn delete_group(&self, token: &str, id: GroupId) -> Result<(), ApiError> {
        Self::execute(self.request(Method::DELETE, &format!("/groups/{id}"), Some(token))).await
    }

    async fn add_member(&self, token: &str, id: GroupId, username: &str) -> Result<(), ApiError> {
        let body = AddMemberRequest {
            username: username.to_string(),
        };
        Self::execute(
            self.request(Method::POST, &format!("/groups/{id}/members"), Some(token))
                .json(&body),
        )
        .await
    }

    async fn group_balance(&self, token: &str, id: GroupId) -> Result<GroupBalance, ApiError> {
        Self::fetch(self.request(Method::GET, &format!("/groups/{id}/balance"), Some(token))).await
    }

    async fn expenses(&self, token: &str) -> Result<Vec<Expense>, ApiError> {
        Self::fetch(self.request(Method::GET, "/expenses", Some(token))).await
    }

    async fn expense(&self, token: &str, id: ExpenseId) -> Result<Expense, ApiError> {
        Self::fetch(self.request(Method::GET, &format!("/expenses/{id}"), Some(token))).await
    }

    async fn create_expense(
        &self,
        token: &str,
        expense: &CreateExpenseRequest,
    ) -> Result<Expense, ApiError> {
        Self::fetch(self.request(Method::POST, "/expenses", Some(token)).json(expense)).await
    }

    async fn update_expense(
        &self,
        token: &str,
        id: ExpenseId,
        expense: &UpdateExpenseRequest,
    ) -> Result<Expense, ApiError> {
        Self::fetch(
            self.request(Method::PUT, &format!("/expenses/{id}"), Some(token))
                .json(expense),
        )
        .await
    }

    async fn delete_expense(&self, token: &str, id: ExpenseId) -> Result<(), ApiError> {
        Self::execute(self.request(Method::DELETE, &format!("/expenses/{id}"), Some(token))).await
    }

    async fn settle_expense(&self, token: &str, id: ExpenseId) -> Result<(), ApiError> {
        Self::execute(self.request(Method::POST, &format!("/expenses/{id}/settle"), Some(token)))
            .await
    }
}
