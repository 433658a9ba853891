// src/routes/doctor_routes.rs

use axum::{
    extract::{Path, Query, State},
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
    models::{ApiOk, AppState, AppointmentView, OkData, ROLE_ADMIN, ROLE_DOCTOR},
};

fn ensure_admin(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.role == ROLE_ADMIN {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only an administrator can manage doctors"))
    }
}

fn ensure_doctor(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.role == ROLE_DOCTOR {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only doctors can access this view"))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/doctors", post(create_doctor).get(list_doctors))
        .route(
            "/doctors/{doctor_id}",
            get(get_doctor).patch(update_doctor).delete(remove_doctor),
        )
        .route("/doctor/appointments", get(assigned_appointments))
        .route("/doctor/appointments/attended", get(attended_appointments))
        .route("/appointments/{appointment_id}/complete", post(complete_handler))
}

/// A doctor's login user is linked to the doctor record by document number.
pub(crate) async fn resolve_doctor_id_by_user(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Uuid, ApiError> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT d.doctor_id
        FROM doctor d
        JOIN app_user u ON u.document_number = d.document_number
        WHERE u.user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(ApiError::db)?;

    let Some((doctor_id,)) = row else {
        return Err(ApiError::BadRequest(
            "NO_DOCTOR_PROFILE",
            "Doctor account has no doctor profile".into(),
        ));
    };
    Ok(doctor_id)
}

/* ============================================================
   Core operation (shared with the integration tests)
   ============================================================ */

/// Marks a pending appointment as attended on behalf of the doctor owning
/// the slot's schedule. A blank note keeps whatever note was stored before;
/// the slot's held flag is never touched, so an attended slot can never be
/// booked again.
pub async fn complete_appointment(
    pool: &PgPool,
    doctor_user_id: Uuid,
    appointment_id: Uuid,
    note: Option<&str>,
) -> Result<(), ApiError> {
    let doctor_id = resolve_doctor_id_by_user(pool, doctor_user_id).await?;

    let mut tx = pool.begin().await.map_err(ApiError::db)?;

    let owner: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT ms.doctor_id
        FROM appointment a
        JOIN slot s ON s.slot_id = a.slot_id
        JOIN monthly_schedule ms ON ms.schedule_id = s.schedule_id
        WHERE a.appointment_id = $1
        "#,
    )
    .bind(appointment_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::db)?;
    let Some((slot_doctor_id,)) = owner else {
        return Err(ApiError::not_found("appointment"));
    };

    if slot_doctor_id != doctor_id {
        return Err(ApiError::forbidden(
            "Doctors can only complete their own appointments",
        ));
    }

    let attended = sqlx::query(
        r#"
        UPDATE appointment
        SET status = $2,
            note = COALESCE(NULLIF(btrim($3), ''), note)
        WHERE appointment_id = $1
          AND status = $4
        "#,
    )
    .bind(appointment_id)
    .bind(AppointmentStatus::Attended)
    .bind(note)
    .bind(AppointmentStatus::Pending)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;
    if attended.rows_affected() == 0 {
        return Err(ApiError::wrong_state());
    }

    tx.commit().await.map_err(ApiError::db)?;

    tracing::info!(%appointment_id, %doctor_id, "appointment marked attended");
    Ok(())
}

/* ============================================================
   Admin CRUD
   ============================================================ */

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct DoctorListItem {
    pub doctor_id: Uuid,
    pub document_number: String,
    pub first_name: String,
    pub last_name: String,
    pub specialty_id: Uuid,
    pub specialty: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDoctorRequest {
    pub document_number: String,
    pub first_name: String,
    pub last_name: String,
    pub specialty_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct DoctorFilterQuery {
    pub document: Option<String>,
    pub name: Option<String>,
    pub specialty_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CreateDoctorData {
    pub doctor_id: Uuid,
    pub user_provisioned: bool,
}

/// Creating a doctor also provisions a login user with role doctor (skipped
/// when a user with the same document number already exists). The generated
/// account uses the document number as initial password; it is expected to be
/// changed at first login.
pub async fn create_doctor(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateDoctorRequest>,
) -> Result<Json<ApiOk<CreateDoctorData>>, ApiError> {
    ensure_admin(&auth)?;

    let document_number = req.document_number.trim();
    let first_name = req.first_name.trim();
    let last_name = req.last_name.trim();
    if document_number.is_empty() || first_name.is_empty() || last_name.is_empty() {
        return Err(ApiError::validation(
            "document_number, first_name and last_name are required",
        ));
    }

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    let (doctor_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO doctor (document_number, first_name, last_name, specialty_id)
        VALUES ($1, $2, $3, $4)
        RETURNING doctor_id
        "#,
    )
    .bind(document_number)
    .bind(first_name)
    .bind(last_name)
    .bind(req.specialty_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if e.as_database_error().is_some_and(|d| d.is_unique_violation()) {
            ApiError::Conflict(
                "DUPLICATE_DOCTOR",
                "a doctor with that document number already exists".into(),
            )
        } else if e.as_database_error().is_some_and(|d| d.is_foreign_key_violation()) {
            ApiError::not_found("specialty")
        } else {
            ApiError::db(e)
        }
    })?;

    let existing_user: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT user_id
        FROM app_user
        WHERE document_number = $1
        "#,
    )
    .bind(document_number)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    let user_provisioned = existing_user.is_none();
    if user_provisioned {
        let password_hash = hash_password(document_number).map_err(ApiError::Internal)?;
        let email = format!("{document_number}@clinica.local");
        sqlx::query(
            r#"
            INSERT INTO app_user (document_number, first_name, last_name, email, password_hash, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(document_number)
        .bind(first_name)
        .bind(last_name)
        .bind(&email)
        .bind(&password_hash)
        .bind(ROLE_DOCTOR)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::db)?;
    }

    tx.commit().await.map_err(ApiError::db)?;

    tracing::info!(%doctor_id, user_provisioned, "doctor created");
    Ok(Json(ApiOk {
        data: CreateDoctorData {
            doctor_id,
            user_provisioned,
        },
    }))
}

pub async fn list_doctors(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(q): Query<DoctorFilterQuery>,
) -> Result<Json<ApiOk<Vec<DoctorListItem>>>, ApiError> {
    let document = q.document.unwrap_or_default().trim().to_string();
    let name = q.name.unwrap_or_default().trim().to_string();

    let rows: Vec<DoctorListItem> = sqlx::query_as::<_, DoctorListItem>(
        r#"
        SELECT
          d.doctor_id,
          d.document_number,
          d.first_name,
          d.last_name,
          d.specialty_id,
          sp.name AS specialty,
          d.created_at
        FROM doctor d
        JOIN specialty sp ON sp.specialty_id = d.specialty_id
        WHERE ($1 = '' OR d.document_number ILIKE '%' || $1 || '%')
          AND ($2 = '' OR (d.first_name || ' ' || d.last_name) ILIKE '%' || $2 || '%')
          AND ($3::uuid IS NULL OR d.specialty_id = $3)
        ORDER BY d.first_name ASC, d.last_name ASC
        "#,
    )
    .bind(document)
    .bind(name)
    .bind(q.specialty_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: rows }))
}

pub async fn get_doctor(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<ApiOk<DoctorListItem>>, ApiError> {
    let row: DoctorListItem = sqlx::query_as::<_, DoctorListItem>(
        r#"
        SELECT
          d.doctor_id,
          d.document_number,
          d.first_name,
          d.last_name,
          d.specialty_id,
          sp.name AS specialty,
          d.created_at
        FROM doctor d
        JOIN specialty sp ON sp.specialty_id = d.specialty_id
        WHERE d.doctor_id = $1
        "#,
    )
    .bind(doctor_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("doctor"))?;

    Ok(Json(ApiOk { data: row }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateDoctorRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub specialty_id: Option<Uuid>,
}

pub async fn update_doctor(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
    Json(req): Json<UpdateDoctorRequest>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    ensure_admin(&auth)?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    let row: Option<(String,)> = sqlx::query_as(
        r#"
        UPDATE doctor
        SET first_name   = COALESCE($2, first_name),
            last_name    = COALESCE($3, last_name),
            specialty_id = COALESCE($4, specialty_id)
        WHERE doctor_id = $1
        RETURNING document_number
        "#,
    )
    .bind(doctor_id)
    .bind(req.first_name.as_deref())
    .bind(req.last_name.as_deref())
    .bind(req.specialty_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| {
        if e.as_database_error().is_some_and(|d| d.is_foreign_key_violation()) {
            ApiError::not_found("specialty")
        } else {
            ApiError::db(e)
        }
    })?;

    let Some((document_number,)) = row else {
        return Err(ApiError::not_found("doctor"));
    };

    // Keep the linked login user's name in sync.
    sqlx::query(
        r#"
        UPDATE app_user
        SET first_name = COALESCE($2, first_name),
            last_name  = COALESCE($3, last_name)
        WHERE document_number = $1
        "#,
    )
    .bind(&document_number)
    .bind(req.first_name.as_deref())
    .bind(req.last_name.as_deref())
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    Ok(Json(ApiOk {
        data: OkData { ok: true },
    }))
}

/// Deletes a doctor together with their schedules and slots. Refused while
/// any of the doctor's slots is held by an appointment.
pub async fn remove_doctor(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    ensure_admin(&auth)?;

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    let exists: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT doctor_id
        FROM doctor
        WHERE doctor_id = $1
        FOR UPDATE
        "#,
    )
    .bind(doctor_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::db)?;
    if exists.is_none() {
        return Err(ApiError::not_found("doctor"));
    }

    let held: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT s.slot_id
        FROM slot s
        JOIN monthly_schedule ms ON ms.schedule_id = s.schedule_id
        WHERE ms.doctor_id = $1
          AND s.held = true
        LIMIT 1
        "#,
    )
    .bind(doctor_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::db)?;
    if held.is_some() {
        return Err(ApiError::Conflict(
            "DOCTOR_HAS_HELD_SLOTS",
            "the doctor has at least one reserved slot".into(),
        ));
    }

    sqlx::query(
        r#"
        DELETE FROM slot
        WHERE schedule_id IN (SELECT schedule_id FROM monthly_schedule WHERE doctor_id = $1)
        "#,
    )
    .bind(doctor_id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    sqlx::query(r#"DELETE FROM monthly_schedule WHERE doctor_id = $1"#)
        .bind(doctor_id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::db)?;

    sqlx::query(r#"DELETE FROM doctor WHERE doctor_id = $1"#)
        .bind(doctor_id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    tracing::info!(%doctor_id, "doctor deleted");
    Ok(Json(ApiOk {
        data: OkData { ok: true },
    }))
}

/* ============================================================
   Doctor-facing views and completion
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct AssignedQuery {
    /// pending | attended | cancelled; defaults to pending.
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AttendedQuery {
    pub month: Option<i16>,
}

fn parse_status(s: Option<&str>) -> Result<AppointmentStatus, ApiError> {
    match s.unwrap_or("pending") {
        "pending" => Ok(AppointmentStatus::Pending),
        "attended" => Ok(AppointmentStatus::Attended),
        "cancelled" => Ok(AppointmentStatus::Cancelled),
        other => Err(ApiError::validation(format!("unknown status filter: {other}"))),
    }
}

pub async fn assigned_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<AssignedQuery>,
) -> Result<Json<ApiOk<Vec<AppointmentView>>>, ApiError> {
    ensure_doctor(&auth)?;
    let status = parse_status(q.status.as_deref())?;
    let doctor_id = resolve_doctor_id_by_user(&state.db, auth.user_id).await?;

    let rows: Vec<AppointmentView> = sqlx::query_as::<_, AppointmentView>(
        r#"
        SELECT
          a.appointment_id,
          a.status,
          a.appointment_date,
          s.shift,
          s.slot_time,
          a.note,
          (d.first_name || ' ' || d.last_name) AS doctor_name,
          sp.name AS specialty,
          (u.first_name || ' ' || u.last_name) AS patient_name,
          a.created_at
        FROM appointment a
        JOIN app_user u ON u.user_id = a.patient_user_id
        JOIN slot s ON s.slot_id = a.slot_id
        JOIN monthly_schedule ms ON ms.schedule_id = s.schedule_id
        JOIN doctor d ON d.doctor_id = ms.doctor_id
        JOIN specialty sp ON sp.specialty_id = d.specialty_id
        WHERE ms.doctor_id = $1
          AND a.status = $2
        ORDER BY a.appointment_date ASC, s.slot_time ASC
        "#,
    )
    .bind(doctor_id)
    .bind(status)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: rows }))
}

pub async fn attended_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<AttendedQuery>,
) -> Result<Json<ApiOk<Vec<AppointmentView>>>, ApiError> {
    ensure_doctor(&auth)?;
    if let Some(m) = q.month {
        if !(1..=12).contains(&m) {
            return Err(ApiError::validation("month must be between 1 and 12"));
        }
    }
    let doctor_id = resolve_doctor_id_by_user(&state.db, auth.user_id).await?;

    let rows: Vec<AppointmentView> = sqlx::query_as::<_, AppointmentView>(
        r#"
        SELECT
          a.appointment_id,
          a.status,
          a.appointment_date,
          s.shift,
          s.slot_time,
          a.note,
          (d.first_name || ' ' || d.last_name) AS doctor_name,
          sp.name AS specialty,
          (u.first_name || ' ' || u.last_name) AS patient_name,
          a.created_at
        FROM appointment a
        JOIN app_user u ON u.user_id = a.patient_user_id
        JOIN slot s ON s.slot_id = a.slot_id
        JOIN monthly_schedule ms ON ms.schedule_id = s.schedule_id
        JOIN doctor d ON d.doctor_id = ms.doctor_id
        JOIN specialty sp ON sp.specialty_id = d.specialty_id
        WHERE ms.doctor_id = $1
          AND a.status = $2
          AND ($3::smallint IS NULL OR EXTRACT(MONTH FROM a.appointment_date) = $3)
        ORDER BY a.appointment_date ASC, s.slot_time ASC
        "#,
    )
    .bind(doctor_id)
    .bind(AppointmentStatus::Attended)
    .bind(q.month)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: rows }))
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub note: Option<String>,
}

pub async fn complete_handler(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    ensure_doctor(&auth)?;
    complete_appointment(&state.db, auth.user_id, appointment_id, req.note.as_deref()).await?;
    Ok(Json(ApiOk {
        data: OkData { ok: true },
    }))
}
