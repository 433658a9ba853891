// src/routes/specialty_routes.rs

use axum::{
    extract::{Path, State},
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, OkData, SpecialtyRow, ROLE_ADMIN},
};

fn ensure_admin(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.role == ROLE_ADMIN {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only an administrator can manage specialties"))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/specialties", get(list_specialties).post(create_specialty))
        .route(
            "/specialties/{specialty_id}",
            patch(update_specialty).delete(remove_specialty),
        )
}

/// Listed for every authenticated user; patients pick a specialty before a
/// doctor when booking.
pub async fn list_specialties(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<ApiOk<Vec<SpecialtyRow>>>, ApiError> {
    let rows: Vec<SpecialtyRow> = sqlx::query_as::<_, SpecialtyRow>(
        r#"
        SELECT specialty_id, name, created_at
        FROM specialty
        ORDER BY name ASC
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: rows }))
}

#[derive(Debug, Deserialize)]
pub struct CreateSpecialtyRequest {
    pub name: String,
}

pub async fn create_specialty(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateSpecialtyRequest>,
) -> Result<Json<ApiOk<SpecialtyRow>>, ApiError> {
    ensure_admin(&auth)?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("name is required"));
    }

    let row: SpecialtyRow = sqlx::query_as::<_, SpecialtyRow>(
        r#"
        INSERT INTO specialty (name)
        VALUES ($1)
        RETURNING specialty_id, name, created_at
        "#,
    )
    .bind(name)
    .fetch_one(&state.db)
    .await
    .map_err(|e| {
        if e.as_database_error().is_some_and(|d| d.is_unique_violation()) {
            ApiError::Conflict("DUPLICATE_SPECIALTY", "a specialty with that name already exists".into())
        } else {
            ApiError::db(e)
        }
    })?;

    Ok(Json(ApiOk { data: row }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSpecialtyRequest {
    pub name: String,
}

pub async fn update_specialty(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(specialty_id): Path<Uuid>,
    Json(req): Json<UpdateSpecialtyRequest>,
) -> Result<Json<ApiOk<SpecialtyRow>>, ApiError> {
    ensure_admin(&auth)?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("name is required"));
    }

    let row: SpecialtyRow = sqlx::query_as::<_, SpecialtyRow>(
        r#"
        UPDATE specialty
        SET name = $2
        WHERE specialty_id = $1
        RETURNING specialty_id, name, created_at
        "#,
    )
    .bind(specialty_id)
    .bind(name)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| {
        if e.as_database_error().is_some_and(|d| d.is_unique_violation()) {
            ApiError::Conflict("DUPLICATE_SPECIALTY", "a specialty with that name already exists".into())
        } else {
            ApiError::db(e)
        }
    })?
    .ok_or_else(|| ApiError::not_found("specialty"))?;

    Ok(Json(ApiOk { data: row }))
}

pub async fn remove_specialty(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(specialty_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    ensure_admin(&auth)?;

    let res = sqlx::query(r#"DELETE FROM specialty WHERE specialty_id = $1"#)
        .bind(specialty_id)
        .execute(&state.db)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(|d| d.is_foreign_key_violation()) {
                ApiError::Conflict(
                    "SPECIALTY_IN_USE",
                    "the specialty is still referenced by at least one doctor".into(),
                )
            } else {
                ApiError::db(e)
            }
        })?;

    if res.rows_affected() == 0 {
        return Err(ApiError::not_found("specialty"));
    }

    Ok(Json(ApiOk {
        data: OkData { ok: true },
    }))
}
