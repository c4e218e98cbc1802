use actix_web::{
    cookie::{time::Duration as CookieDuration, Cookie, SameSite},
    dev::Payload,
    http::header::{HeaderValue, AUTHORIZATION},
    web, FromRequest, HttpRequest,
};
use futures::future::LocalBoxFuture;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    num::ParseIntError,
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{ApiError, FisteinApi};
use crate::error::AppError;
use crate::schemas::{AuthResponse, RegisterRequest, User};
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

pub type SessionId = Uuid;

pub const SESSION_COOKIE: &str = "fistein_session";

/// Lifetime of the session cookie, and of the server-side state behind it.
pub const SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const MIN_PASSWORD_LEN: usize = 6;

/// The logged-in user and the backend token acting on their behalf.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionContext {
    pub token: String,
    pub user: User,
}

impl From<AuthResponse> for SessionContext {
    fn from(response: AuthResponse) -> Self {
        Self {
            token: response.token,
            user: response.user,
        }
    }
}

impl SessionContext {
    /// Checks a previously issued token against the profile endpoint.
    pub async fn restore(api: &dyn FisteinApi, token: String) -> Result<Self, ApiError> {
        match api.profile(&token).await {
            Ok(user) => Ok(Self { token, user }),
            Err(err) => {
                warn!("Discarding persisted token: {err}");
                Err(err)
            }
        }
    }
}

struct OpenSession {
    opened: Instant,
    context: SessionContext,
}

/// Sessions expire with their cookie. Expired ones are dropped whenever
/// another session opens.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, OpenSession>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_ttl(SESSION_TTL)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::default(),
            ttl,
        }
    }

    pub async fn open(&self, context: SessionContext) -> SessionId {
        let id = Uuid::new_v4();
        info!(user = %context.user.username, "session opened");
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.opened.elapsed() < self.ttl);
        if sessions.len() < before {
            debug!(evicted = before - sessions.len(), "dropped expired sessions");
        }
        sessions.insert(
            id,
            OpenSession {
                opened: Instant::now(),
                context,
            },
        );
        id
    }

    pub async fn get(&self, id: SessionId) -> Option<SessionContext> {
        self.sessions
            .read()
            .await
            .get(&id)
            .filter(|session| session.opened.elapsed() < self.ttl)
            .map(|session| session.context.clone())
    }

    pub async fn close(&self, id: SessionId) -> Option<SessionContext> {
        let closed = self
            .sessions
            .write()
            .await
            .remove(&id)
            .map(|session| session.context);
        if let Some(context) = &closed {
            info!(user = %context.user.username, "session closed");
        }
        closed
    }
}

/// Signs session ids so the cookie cannot be forged or guessed.
#[derive(Clone)]
pub struct SessionSigner {
    mac: HmacSha256,
}

impl SessionSigner {
    pub fn new(secret: &str) -> Option<Self> {
        let key = Sha256::digest(secret.as_bytes());
        let mac = HmacSha256::new_from_slice(&key).ok()?;
        Some(Self { mac })
    }

    pub fn sign(&self, id: SessionId) -> String {
        let mut mac = self.mac.clone();
        mac.update(id.as_bytes());
        let signature = mac
            .finalize()
            .into_bytes()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>();
        format!("{id}.{signature}")
    }

    pub fn verify(&self, value: &str) -> Option<SessionId> {
        let (id, signature) = value.split_once('.')?;
        let id = Uuid::parse_str(id).ok()?;
        let signature = signature
            .chars()
            .collect::<Vec<_>>()
            .chunks(2)
            .map(|n| u8::from_str_radix(&String::from_iter(n), 16))
            .collect::<Result<Vec<u8>, ParseIntError>>()
            .ok()?;
        let mut mac = self.mac.clone();
        mac.update(id.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(id)
    }

    pub fn cookie(&self, id: SessionId) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE, self.sign(id))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(CookieDuration::seconds(SESSION_TTL.as_secs() as i64))
            .finish()
    }
}

pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(SESSION_COOKIE, "").path("/").finish();
    cookie.make_removal();
    cookie
}

#[derive(Error, Debug, PartialEq)]
pub enum RegisterError {
    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("password must be at least 6 characters")]
    PasswordTooShort,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegisterForm {
    pub fn validate(self) -> Result<RegisterRequest, RegisterError> {
        if self.password != self.confirm_password {
            return Err(RegisterError::PasswordMismatch);
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(RegisterError::PasswordTooShort);
        }
        Ok(RegisterRequest {
            username: self.username,
            email: self.email,
            full_name: self.full_name,
            password: self.password,
        })
    }
}

/// A request made on behalf of a logged-in user.
///
/// Accepts the signed session cookie first, then `Authorization: Bearer`
/// with a backend token, which is checked against the profile endpoint.
pub struct Authenticated {
    pub session: Option<SessionId>,
    pub context: SessionContext,
}

impl Authenticated {
    pub fn token(&self) -> &str {
        &self.context.token
    }

    pub fn user(&self) -> &User {
        &self.context.user
    }

    /// Drops the session when the backend no longer accepts its token.
    pub async fn guard<T>(&self, state: &AppState, result: Result<T, ApiError>) -> Result<T, AppError> {
        match result {
            Err(ApiError::Unauthorized) => {
                if let Some(id) = self.session {
                    state.sessions.close(id).await;
                }
                Err(AppError::Unauthenticated)
            }
            other => other.map_err(AppError::from),
        }
    }
}

fn bearer_token(request: &HttpRequest) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .map(HeaderValue::to_str)?
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

impl FromRequest for Authenticated {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(request: &HttpRequest, _: &mut Payload) -> Self::Future {
        let state = request.app_data::<web::Data<AppState>>().cloned();
        let cookie = request
            .cookie(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string());
        let bearer = bearer_token(request);

        Box::pin(async move {
            let state = state.ok_or(AppError::Internal("application state missing"))?;
            if let Some(id) = cookie.and_then(|value| state.signer.verify(&value)) {
                if let Some(context) = state.sessions.get(id).await {
                    return Ok(Self {
                        session: Some(id),
                        context,
                    });
                }
            }
            let token = bearer.ok_or(AppError::Unauthenticated)?;
            let context = SessionContext::restore(state.api.as_ref(), token).await?;
            Ok(Self {
                session: None,
                context,
            })
        })
    }
}
