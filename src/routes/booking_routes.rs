// src/routes/booking_routes.rs
//
// Reservation protocol: each slot is held by at most one patient, enforced by
// a conditional flip of slot.held inside the same transaction that writes the
// appointment row. Losers of the race get SLOT_ALREADY_HELD and re-query.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::ApiError,
    lifecycle::AppointmentStatus,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, AppointmentView, OkData, ROLE_ADMIN, ROLE_PATIENT},
};

fn ensure_patient(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.role == ROLE_PATIENT {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only patients can book appointments"))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", post(reserve_handler))
        .route("/appointments/mine", get(my_appointments))
        .route("/appointments/history", get(my_history))
        .route("/appointments/{appointment_id}/cancel", post(cancel_handler))
}

/* ============================================================
   Core operations (shared with the integration tests)
   ============================================================ */

/// Reserves a slot for a patient. Atomic with respect to concurrent reserves
/// on the same slot: the conditional `held = false -> true` flip re-evaluates
/// its predicate under the row lock, so of N racing transactions exactly one
/// sees rows_affected == 1; the rest fail with SLOT_ALREADY_HELD. The
/// appointment insert commits together with the flip, and an insert failure
/// rolls the flip back.
pub async fn reserve_slot(
    pool: &PgPool,
    patient_user_id: Uuid,
    slot_id: Uuid,
) -> Result<Uuid, ApiError> {
    let mut tx = pool.begin().await.map_err(ApiError::db)?;

    let slot: Option<(NaiveDate,)> = sqlx::query_as(
        r#"
        SELECT slot_date
        FROM slot
        WHERE slot_id = $1
        "#,
    )
    .bind(slot_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::db)?;
    let Some((slot_date,)) = slot else {
        return Err(ApiError::slot_not_found());
    };

    let flipped = sqlx::query(
        r#"
        UPDATE slot
        SET held = true
        WHERE slot_id = $1
          AND held = false
        "#,
    )
    .bind(slot_id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;
    if flipped.rows_affected() == 0 {
        return Err(ApiError::slot_already_held());
    }

    let (appointment_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO appointment (patient_user_id, slot_id, status, appointment_date)
        VALUES ($1, $2, $3, $4)
        RETURNING appointment_id
        "#,
    )
    .bind(patient_user_id)
    .bind(slot_id)
    .bind(AppointmentStatus::Pending)
    .bind(slot_date)
    .fetch_one(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    tracing::info!(%slot_id, %patient_user_id, %appointment_id, "slot reserved");
    Ok(appointment_id)
}

/// Cancels a pending appointment and releases its slot as one atomic unit.
/// The status flip is conditional on Pending, so a second cancel (or a cancel
/// racing a completion) fails with ALREADY_TERMINAL and never releases a slot
/// that someone else may have re-reserved since.
pub async fn cancel_appointment(
    pool: &PgPool,
    actor_user_id: Uuid,
    actor_role: i16,
    appointment_id: Uuid,
) -> Result<(), ApiError> {
    let mut tx = pool.begin().await.map_err(ApiError::db)?;

    let appt: Option<(Uuid, Uuid)> = sqlx::query_as(
        r#"
        SELECT patient_user_id, slot_id
        FROM appointment
        WHERE appointment_id = $1
        "#,
    )
    .bind(appointment_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::db)?;
    let Some((owner_user_id, slot_id)) = appt else {
        return Err(ApiError::not_found("appointment"));
    };

    if actor_role != ROLE_ADMIN && owner_user_id != actor_user_id {
        return Err(ApiError::forbidden(
            "Only the owning patient can cancel this appointment",
        ));
    }

    let cancelled = sqlx::query(
        r#"
        UPDATE appointment
        SET status = $2
        WHERE appointment_id = $1
          AND status = $3
        "#,
    )
    .bind(appointment_id)
    .bind(AppointmentStatus::Cancelled)
    .bind(AppointmentStatus::Pending)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;
    if cancelled.rows_affected() == 0 {
        return Err(ApiError::already_terminal());
    }

    sqlx::query(
        r#"
        UPDATE slot
        SET held = false
        WHERE slot_id = $1
        "#,
    )
    .bind(slot_id)
    .execute(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    tracing::info!(%appointment_id, %slot_id, "appointment cancelled, slot released");
    Ok(())
}

/* ============================================================
   Handlers
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub slot_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ReserveData {
    pub appointment_id: Uuid,
}

pub async fn reserve_handler(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<ReserveRequest>,
) -> Result<Json<ApiOk<ReserveData>>, ApiError> {
    ensure_patient(&auth)?;
    let appointment_id = reserve_slot(&state.db, auth.user_id, req.slot_id).await?;
    Ok(Json(ApiOk {
        data: ReserveData { appointment_id },
    }))
}

pub async fn cancel_handler(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    if auth.role != ROLE_PATIENT && auth.role != ROLE_ADMIN {
        return Err(ApiError::forbidden("Only patients can cancel appointments"));
    }
    cancel_appointment(&state.db, auth.user_id, auth.role, appointment_id).await?;
    Ok(Json(ApiOk {
        data: OkData { ok: true },
    }))
}

/// Upcoming pending appointments for the logged-in patient.
pub async fn my_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<AppointmentView>>>, ApiError> {
    ensure_patient(&auth)?;

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
        WHERE a.patient_user_id = $1
          AND a.status = $2
          AND a.appointment_date >= CURRENT_DATE
        ORDER BY a.appointment_date ASC, s.slot_time ASC
        "#,
    )
    .bind(auth.user_id)
    .bind(AppointmentStatus::Pending)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: rows }))
}

/// Past or no-longer-pending appointments for the logged-in patient.
pub async fn my_history(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<AppointmentView>>>, ApiError> {
    ensure_patient(&auth)?;

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
        WHERE a.patient_user_id = $1
          AND (a.appointment_date < CURRENT_DATE OR a.status <> $2)
        ORDER BY a.appointment_date DESC, s.slot_time DESC
        "#,
    )
    .bind(auth.user_id)
    .bind(AppointmentStatus::Pending)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: rows }))
}
