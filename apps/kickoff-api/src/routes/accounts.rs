use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use kickoff_common::id::{prefix, prefixed_ulid};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::models::account::{AccountProfile, NewAccount};
use crate::AppState;

const MIN_PASSWORD_LEN: usize = 8;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/accounts/register", post(register))
        .route("/accounts/login", post(login))
}

// =========================================================================
// POST /api/v1/accounts/register
// =========================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub display_name: String,
    pub password: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/accounts/register",
    tag = "Accounts",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AccountProfile),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 409, description = "Username taken", body = ApiErrorBody),
    ),
)]
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AccountProfile>), ApiError> {
    // --- Validation ---
    let mut errors: Vec<FieldError> = Vec::new();

    // Username: 2–32 chars, alphanumeric + _ . -
    let username = body.username.trim().to_lowercase();
    if username.len() < 2 || username.len() > 32 {
        errors.push(FieldError {
            field: "username".into(),
            message: "Username must be 2–32 characters".into(),
        });
    } else if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
    {
        errors.push(FieldError {
            field: "username".into(),
            message: "Username may only contain letters, digits, underscores, dots, and hyphens"
                .into(),
        });
    }

    // Display name: 1–64 chars
    let display_name = body.display_name.trim().to_string();
    if display_name.is_empty() || display_name.chars().count() > 64 {
        errors.push(FieldError {
            field: "display_name".into(),
            message: "Display name must be 1–64 characters".into(),
        });
    }

    if body.password.len() < MIN_PASSWORD_LEN {
        errors.push(FieldError {
            field: "password".into(),
            message: format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        });
    }

    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let password_hash = hash_password(&body.password)?;

    let account = state
        .accounts
        .create_account(NewAccount {
            id: prefixed_ulid(prefix::ACCOUNT),
            username,
            display_name,
            password_hash,
            created_at: Utc::now(),
        })
        .await?;

    tracing::info!(account_id = %account.id, username = %account.username, "account registered");

    Ok((StatusCode::CREATED, Json(AccountProfile::from(account))))
}

// =========================================================================
// POST /api/v1/accounts/login
// =========================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Check a username/password pair and return the profile. The client uses
/// the returned `id` as its `participant_id` on the real-time channels.
#[utoipa::path(
    post,
    path = "/api/v1/accounts/login",
    tag = "Accounts",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Credentials valid", body = AccountProfile),
        (status = 401, description = "Invalid credentials", body = ApiErrorBody),
    ),
)]
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AccountProfile>, ApiError> {
    let username = body.username.trim().to_lowercase();
    if username.is_empty() || body.password.is_empty() {
        return Err(ApiError::bad_request("username and password are required"));
    }

    let account = state
        .accounts
        .find_account_by_username(&username)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    verify_password(&body.password, &account.password_hash)?;

    tracing::info!(account_id = %account.id, "account logged in");

    Ok(Json(AccountProfile::from(account)))
}

/// Hash a password using Argon2id with a random salt.
fn hash_password(password: &str) -> Result<String, ApiError> {
    use argon2::Argon2;
    use password_hash::rand_core::OsRng;
    use password_hash::{PasswordHasher, SaltString};

    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| {
            tracing::error!(?e, "password hashing failed");
            ApiError::internal("Failed to process password")
        })
}

fn verify_password(password: &str, hash: &str) -> Result<(), ApiError> {
    use argon2::Argon2;
    use password_hash::{PasswordHash, PasswordVerifier};

    let parsed = PasswordHash::new(hash).map_err(|_| ApiError::internal("invalid hash format"))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| ApiError::unauthorized("Invalid credentials"))
}
