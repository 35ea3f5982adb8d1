// src/handlers/auth.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    handlers::{ok, ok_with_message},
    models::{
        ids::UserId,
        user::{CreateUserRequest, LoginRequest, ROLE_USER, User},
    },
    store::{Store, StoreError},
    utils::{
        hash::{hash_password, verify_password},
        jwt::sign_jwt,
    },
};

/// Registers a new user.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created and the user object (excluding password).
pub async fn register(
    State(store): State<Store>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = User {
        id: UserId::new(),
        username: payload.username.trim().to_string(),
        password: hash_password(&payload.password)?,
        role: ROLE_USER.to_string(),
        created_at: Utc::now(),
    };

    store.users.create_user(&user).await.map_err(|e| match e {
        StoreError::Conflict(_) => {
            AppError::Conflict(format!("Username '{}' already exists", user.username))
        }
        other => {
            tracing::error!("Failed to register user: {:?}", other);
            AppError::from(other)
        }
    })?;

    tracing::info!("Registered user {} ({})", user.username, user.id);
    Ok((
        StatusCode::CREATED,
        ok_with_message("User registered", &user),
    ))
}

/// Authenticates a user and returns a JWT token.
///
/// Both an unknown username and a wrong password get the same 401 so the
/// endpoint does not reveal which usernames exist.
pub async fn login(
    State(store): State<Store>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let invalid = || AppError::AuthError("Invalid username or password".to_string());

    let user = store
        .users
        .find_by_username(&payload.username)
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&payload.password, &user.password)? {
        return Err(invalid());
    }

    let token = sign_jwt(
        user.id,
        &user.role,
        &config.jwt_secret,
        config.jwt_expiration,
    )?;

    Ok(ok(json!({
        "token": token,
        "type": "Bearer",
        "user": user,
    })))
}
