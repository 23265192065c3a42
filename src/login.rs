//! User accounts, password hashing and login sessions.

#[cfg(feature = "web")]
use crate::app::AppState;
use crate::error::{AppError, AppResult};
use crate::store::Store;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
#[cfg(feature = "web")]
use axum::{
    Extension, Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
#[cfg(feature = "web")]
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
#[cfg(feature = "web")]
use std::sync::Arc;
use std::sync::RwLock;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "session";

/// Account role
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Per-user preferences
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(default)]
    pub theme: Theme,

    #[serde(default = "default_notifications")]
    pub notifications: bool,
}

fn default_notifications() -> bool {
    true
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            notifications: default_notifications(),
        }
    }
}

/// Registered account as stored in `users.json`
///
/// Accounts are never deleted; admins deactivate them instead.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,

    /// Unique display name
    pub username: String,

    /// Unique login address
    pub email: String,

    /// Argon2 hash of the user's password
    pub password_hash: String,

    #[serde(default)]
    pub role: Role,

    #[serde(default)]
    pub settings: UserSettings,

    #[serde(default = "default_active")]
    pub is_active: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl User {
    pub fn new(username: &str, email: &str, password_hash: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            username: username.trim().to_string(),
            email: email.trim().to_lowercase(),
            password_hash,
            role,
            settings: UserSettings::default(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// User as returned over the API, without the password hash
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub settings: UserSettings,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            settings: user.settings.clone(),
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

/// Authenticated caller, attached to requests by `require_auth`
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
    pub role: Role,
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            role: user.role,
        }
    }
}

/// User session data
#[derive(Debug, Clone)]
pub struct Session {
    /// Id of the authenticated user
    pub user_id: String,

    /// Time when the session expires
    pub expires_at: SystemTime,
}

/// Active login sessions keyed by token
#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new session for `user_id` and return its token
    ///
    /// Expired sessions are dropped while the write lock is held.
    pub fn create(&self, user_id: &str) -> AppResult<String> {
        let token = Uuid::new_v4().to_string();
        let now = SystemTime::now();

        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| AppError::Storage("Session lock poisoned".to_string()))?;
        sessions.retain(|_, session| session.expires_at > now);
        sessions.insert(
            token.clone(),
            Session {
                user_id: user_id.to_string(),
                expires_at: now + self.ttl,
            },
        );

        Ok(token)
    }

    /// User id for `token` if the session exists and has not expired
    pub fn validate(&self, token: &str) -> Option<String> {
        let sessions = self.sessions.read().ok()?;
        sessions
            .get(token)
            .filter(|session| session.expires_at > SystemTime::now())
            .map(|session| session.user_id.clone())
    }

    pub fn revoke(&self, token: &str) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.remove(token);
        }
    }
}

/// Hash a password using Argon2
///
/// Creates a cryptographically secure hash of a password using Argon2id.
///
/// # Errors
/// * Returns `AppError::Storage` if the password hashing fails
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    match argon2.hash_password(password.as_bytes(), &salt) {
        Ok(hash) => Ok(hash.to_string()),
        Err(_) => Err(AppError::Storage("Password hashing failed".to_string())),
    }
}

/// Verify a password against a stored hash
///
/// # Returns
/// * `AppResult<bool>` - True if the password matches, false if not
///
/// # Errors
/// * Returns an error if the hash is in an invalid format
pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Storage("Invalid password hash format".to_string()))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false), // Password didn't match
    }
}

/// Register a new user
///
/// Creates a new account with the provided username, email, and password.
/// The password is hashed before storage.
///
/// # Arguments
/// * `store` - Store the account is written to
/// * `username` - Unique username for the new account
/// * `email` - Unique email address, used to log in
/// * `password` - Plain text password (will be hashed)
/// * `role` - Role of the new account
///
/// # Errors
/// * `AppError::InvalidInput` if a field is empty or the user already exists
pub fn register_user(
    store: &Store,
    username: &str,
    email: &str,
    password: &str,
    role: Role,
) -> AppResult<User> {
    if username.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
        return Err(AppError::InvalidInput(
            "Username, email and password are required".to_string(),
        ));
    }

    let password_hash = hash_password(password)?;
    let user = store.insert_user(User::new(username, email, password_hash, role))?;
    log::info!("Registered {:?} account '{}'", user.role, user.username);

    Ok(user)
}

/// Check login credentials
///
/// # Errors
/// * `AppError::Unauthorized` if the email is unknown or the password is wrong
/// * `AppError::Forbidden` if the account has been deactivated
pub fn authenticate(store: &Store, email: &str, password: &str) -> AppResult<User> {
    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let user = store.find_user_by_email(email.trim())?.ok_or_else(invalid)?;
    if !verify_password(password, &user.password_hash)? {
        return Err(invalid());
    }
    if !user.is_active {
        return Err(AppError::Forbidden("Account is inactive".to_string()));
    }

    Ok(user)
}

/// Check a caller-supplied admin code against the configured secret
fn admin_code_matches(configured: Option<&str>, supplied: &str) -> bool {
    matches!(configured, Some(secret) if secret == supplied)
}

// Web handler functions below (only compiled with "web" feature)

#[cfg(feature = "web")]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub admin_code: Option<String>,
}

#[cfg(feature = "web")]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub admin_code: Option<String>,
}

#[cfg(feature = "web")]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdminRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub admin_secret: String,
}

#[cfg(feature = "web")]
#[derive(Debug, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub notifications: Option<bool>,
    #[serde(default)]
    pub theme: Option<Theme>,
}

#[cfg(feature = "web")]
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: PublicUser,
}

/// Session token from an `Authorization: Bearer` header or the session cookie
#[cfg(feature = "web")]
fn session_token(headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());

    bearer.or_else(|| {
        jar.get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty())
    })
}

#[cfg(feature = "web")]
fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .build()
}

/// Open a session for `user` and build the login response
#[cfg(feature = "web")]
fn start_session(
    state: &AppState,
    jar: CookieJar,
    user: &User,
) -> AppResult<(CookieJar, Json<AuthResponse>)> {
    let token = state.sessions.create(&user.id)?;
    let jar = jar.add(session_cookie(token.clone()));

    Ok((
        jar,
        Json(AuthResponse {
            token,
            user: PublicUser::from(user),
        }),
    ))
}

/// Authentication middleware
///
/// Resolves the session token to an active user and attaches a `CurrentUser`
/// extension to the request.
///
/// # Errors
/// * `AppError::Unauthorized` if the token is missing, unknown or expired
/// * `AppError::Forbidden` if the account has been deactivated
#[cfg(feature = "web")]
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let unauthorized = || AppError::Unauthorized("Not authorized, please log in".to_string());

    let token = session_token(request.headers(), &jar).ok_or_else(unauthorized)?;
    let user_id = state.sessions.validate(&token).ok_or_else(unauthorized)?;
    let user = state.store.find_user(&user_id)?.ok_or_else(unauthorized)?;

    if !user.is_active {
        state.sessions.revoke(&token);
        return Err(AppError::Forbidden("Account is inactive".to_string()));
    }

    request.extensions_mut().insert(CurrentUser::from(&user));
    Ok(next.run(request).await)
}

/// Admin gate, layered inside `require_auth`
#[cfg(feature = "web")]
pub async fn require_admin(
    Extension(user): Extension<CurrentUser>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if user.role != Role::Admin {
        log::warn!("Non-admin '{}' attempted an admin route", user.username);
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    Ok(next.run(request).await)
}

/// Handle user registration
///
/// A supplied `adminCode` must equal the configured admin secret and makes the new
/// account an admin.
#[cfg(feature = "web")]
pub async fn handle_register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<RegisterRequest>,
) -> AppResult<Response> {
    let role = match request.admin_code.as_deref().filter(|c| !c.is_empty()) {
        Some(code) if admin_code_matches(state.config.admin_secret.as_deref(), code) => {
            Role::Admin
        }
        Some(_) => return Err(AppError::Forbidden("Invalid admin code".to_string())),
        None => Role::User,
    };

    let user = register_user(
        &state.store,
        &request.username,
        &request.email,
        &request.password,
        role,
    )?;

    let (jar, body) = start_session(&state, jar, &user)?;
    Ok((StatusCode::CREATED, jar, body).into_response())
}

/// Handle user login
///
/// With an `adminCode` the login only succeeds for admin accounts and a matching
/// admin secret.
#[cfg(feature = "web")]
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> AppResult<Response> {
    let user = authenticate(&state.store, &request.email, &request.password)?;

    if let Some(code) = request.admin_code.as_deref().filter(|c| !c.is_empty()) {
        if !admin_code_matches(state.config.admin_secret.as_deref(), code) {
            return Err(AppError::Forbidden("Invalid admin code".to_string()));
        }
        if !user.is_admin() {
            return Err(AppError::Forbidden(
                "This account does not have admin privileges".to_string(),
            ));
        }
    }

    log::info!("User '{}' logged in", user.username);
    Ok(start_session(&state, jar, &user)?.into_response())
}

#[cfg(feature = "web")]
pub async fn handle_logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> impl IntoResponse {
    if let Some(token) = session_token(&headers, &jar) {
        state.sessions.revoke(&token);
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (
        jar,
        Json(serde_json::json!({ "message": "Logged out successfully" })),
    )
}

#[cfg(feature = "web")]
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<serde_json::Value>> {
    let user = state
        .store
        .find_user(&current.id)?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(serde_json::json!({ "settings": user.settings })))
}

#[cfg(feature = "web")]
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(update): Json<SettingsUpdate>,
) -> AppResult<Json<serde_json::Value>> {
    let user = state.store.update_user(&current.id, |user| {
        if let Some(notifications) = update.notifications {
            user.settings.notifications = notifications;
        }
        if let Some(theme) = update.theme {
            user.settings.theme = theme;
        }
    })?;

    Ok(Json(serde_json::json!({
        "message": "Settings updated successfully",
        "settings": user.settings,
    })))
}

/// Create an admin account directly, guarded by the admin secret
#[cfg(feature = "web")]
pub async fn handle_create_admin(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateAdminRequest>,
) -> AppResult<Response> {
    if !admin_code_matches(state.config.admin_secret.as_deref(), &request.admin_secret) {
        return Err(AppError::Forbidden("Invalid admin secret".to_string()));
    }

    let user = register_user(
        &state.store,
        &request.username,
        &request.email,
        &request.password,
        Role::Admin,
    )?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "Admin user created successfully",
            "user": PublicUser::from(&user),
        })),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());
    }

    #[test]
    fn sessions_expire_and_revoke() {
        let sessions = SessionStore::new(Duration::from_secs(60));
        let token = sessions.create("u1").unwrap();
        assert_eq!(sessions.validate(&token).as_deref(), Some("u1"));

        sessions.revoke(&token);
        assert_eq!(sessions.validate(&token), None);

        let expired = SessionStore::new(Duration::ZERO);
        let token = expired.create("u2").unwrap();
        assert_eq!(expired.validate(&token), None);
    }

    #[test]
    fn authenticate_rejects_bad_password_and_inactive_accounts() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let user = register_user(&store, "ana", "Ana@Example.com", "secret", Role::User).unwrap();

        assert!(matches!(
            authenticate(&store, "ana@example.com", "wrong"),
            Err(AppError::Unauthorized(_))
        ));
        assert_eq!(
            authenticate(&store, "ana@example.com", "secret").unwrap().id,
            user.id
        );

        store.update_user(&user.id, |u| u.is_active = false).unwrap();
        assert!(matches!(
            authenticate(&store, "ana@example.com", "secret"),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn admin_code_requires_configured_secret() {
        assert!(admin_code_matches(Some("s3cret"), "s3cret"));
        assert!(!admin_code_matches(Some("s3cret"), "guess"));
        assert!(!admin_code_matches(None, "anything"));
    }
}
