// src/routes/user_routes.rs

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    auth::hash_password,
    error::ApiError,
    lifecycle::AppointmentStatus,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, OkData, ROLE_ADMIN, ROLE_DOCTOR, ROLE_PATIENT},
};

fn ensure_admin(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.role == ROLE_ADMIN {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only an administrator can manage users"))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        // /api/v1/users
        .route("/", get(list_users).post(create_user))
        // /api/v1/users/{user_id}
        .route("/{user_id}", get(get_user).patch(update_user))
        // /api/v1/users/{user_id}/deactivate
        .route("/{user_id}/deactivate", post(deactivate_handler))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct UserPublicRow {
    pub user_id: Uuid,
    pub document_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: i16,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/* ============================================================
   Core operation (shared with the integration tests)
   ============================================================ */

/// Deactivates a user account. Refused while the user still owns a pending
/// appointment; accounts are never hard-deleted, so history stays intact.
pub async fn deactivate_user(pool: &PgPool, user_id: Uuid) -> Result<(), ApiError> {
    let mut tx = pool.begin().await.map_err(ApiError::db)?;

    let active: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT appointment_id
        FROM appointment
        WHERE patient_user_id = $1
          AND status = $2
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(AppointmentStatus::Pending)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::db)?;
    if active.is_some() {
        return Err(ApiError::Conflict(
            "USER_HAS_ACTIVE_APPOINTMENTS",
            "the user still has pending appointments".into(),
        ));
    }

    let res = sqlx::query(
        r#"
        UPDATE app_user
        SET is_active = false
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;
    if res.rows_affected() == 0 {
        return Err(ApiError::not_found("user"));
    }

    // Drop any live sessions together with the account.
    sqlx::query(
        r#"
        UPDATE session_token
        SET revoked_at = now()
        WHERE user_id = $1
          AND revoked_at IS NULL
        "#,
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    tracing::info!(%user_id, "user deactivated");
    Ok(())
}

/* ============================================================
   Handlers
   ============================================================ */

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<UserPublicRow>>>, ApiError> {
    ensure_admin(&auth)?;

    let users: Vec<UserPublicRow> = sqlx::query_as::<_, UserPublicRow>(
        r#"
        SELECT user_id, document_number, first_name, last_name, email, role, is_active, created_at
        FROM app_user
        ORDER BY created_at DESC
        LIMIT 200
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: users }))
}

pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiOk<UserPublicRow>>, ApiError> {
    if auth.role != ROLE_ADMIN && auth.user_id != user_id {
        return Err(ApiError::forbidden("You can only view your own account"));
    }

    let user: UserPublicRow = sqlx::query_as::<_, UserPublicRow>(
        r#"
        SELECT user_id, document_number, first_name, last_name, email, role, is_active, created_at
        FROM app_user
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("user"))?;

    Ok(Json(ApiOk { data: user }))
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub document_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    /// 0 patient, 1 admin, 2 doctor; defaults to patient.
    pub role: Option<i16>,
}

pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<ApiOk<UserPublicRow>>, ApiError> {
    ensure_admin(&auth)?;

    let document_number = req.document_number.trim();
    let first_name = req.first_name.trim();
    let last_name = req.last_name.trim();
    let email = req.email.trim();

    if document_number.is_empty() || first_name.is_empty() || last_name.is_empty() || email.is_empty()
    {
        return Err(ApiError::validation(
            "document_number, first_name, last_name and email are required",
        ));
    }
    if !email.contains('@') {
        return Err(ApiError::validation("email is not valid"));
    }
    if req.password.trim().len() < 8 {
        return Err(ApiError::validation("password must be at least 8 characters"));
    }
    let role = req.role.unwrap_or(ROLE_PATIENT);
    if !matches!(role, ROLE_PATIENT | ROLE_ADMIN | ROLE_DOCTOR) {
        return Err(ApiError::validation("role must be 0, 1 or 2"));
    }

    let password_hash = hash_password(req.password.trim()).map_err(ApiError::Internal)?;

    let user: UserPublicRow = sqlx::query_as::<_, UserPublicRow>(
        r#"
        INSERT INTO app_user (document_number, first_name, last_name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING user_id, document_number, first_name, last_name, email, role, is_active, created_at
        "#,
    )
    .bind(document_number)
    .bind(first_name)
    .bind(last_name)
    .bind(email)
    .bind(&password_hash)
    .bind(role)
    .fetch_one(&state.db)
    .await
    .map_err(|e| {
        if e.as_database_error().is_some_and(|d| d.is_unique_violation()) {
            ApiError::Conflict(
                "DUPLICATE_USER",
                "a user with that document number or email already exists".into(),
            )
        } else {
            ApiError::db(e)
        }
    })?;

    Ok(Json(ApiOk { data: user }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
}

pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<ApiOk<UserPublicRow>>, ApiError> {
    ensure_admin(&auth)?;

    if let Some(email) = req.email.as_deref() {
        if !email.contains('@') {
            return Err(ApiError::validation("email is not valid"));
        }
    }

    let user: UserPublicRow = sqlx::query_as::<_, UserPublicRow>(
        r#"
        UPDATE app_user
        SET first_name = COALESCE($2, first_name),
            last_name  = COALESCE($3, last_name),
            email      = COALESCE($4, email),
            is_active  = COALESCE($5, is_active)
        WHERE user_id = $1
        RETURNING user_id, document_number, first_name, last_name, email, role, is_active, created_at
        "#,
    )
    .bind(user_id)
    .bind(req.first_name.as_deref())
    .bind(req.last_name.as_deref())
    .bind(req.email.as_deref())
    .bind(req.is_active)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| {
        if e.as_database_error().is_some_and(|d| d.is_unique_violation()) {
            ApiError::Conflict("DUPLICATE_USER", "a user with that email already exists".into())
        } else {
            ApiError::db(e)
        }
    })?
    .ok_or_else(|| ApiError::not_found("user"))?;

    Ok(Json(ApiOk { data: user }))
}

pub async fn deactivate_handler(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    ensure_admin(&auth)?;
    deactivate_user(&state.db, user_id).await?;
    Ok(Json(ApiOk {
        data: OkData { ok: true },
    }))
}
