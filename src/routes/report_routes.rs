// src/routes/report_routes.rs
//
// Read-only projections for the reporting surface. Rendering (PDF or
// otherwise) belongs to the consumer; these endpoints only project rows.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    lifecycle::AppointmentStatus,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, ROLE_ADMIN, ROLE_DOCTOR, ROLE_PATIENT},
    routes::doctor_routes::resolve_doctor_id_by_user,
    slots::Shift,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/reports/appointments/{appointment_id}", get(appointment_receipt))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ReceiptView {
    pub appointment_id: Uuid,
    pub patient_user_id: Uuid,
    pub doctor_id: Uuid,
    pub status: AppointmentStatus,
    pub appointment_date: NaiveDate,
    pub shift: Shift,
    pub slot_time: NaiveTime,
    pub note: Option<String>,
    pub doctor_name: String,
    pub specialty: String,
    pub patient_name: String,
    pub created_at: DateTime<Utc>,
}

/// Booking receipt: visible to the owning patient, the attending doctor and
/// administrators.
pub async fn appointment_receipt(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<ReceiptView>>, ApiError> {
    let row: ReceiptView = sqlx::query_as::<_, ReceiptView>(
        r#"
        SELECT
          a.appointment_id,
          a.patient_user_id,
          ms.doctor_id,
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
        WHERE a.appointment_id = $1
        "#,
    )
    .bind(appointment_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("appointment"))?;

    match auth.role {
        ROLE_ADMIN => {}
        ROLE_PATIENT if row.patient_user_id == auth.user_id => {}
        ROLE_DOCTOR => {
            let doctor_id = resolve_doctor_id_by_user(&state.db, auth.user_id).await?;
            if row.doctor_id != doctor_id {
                return Err(ApiError::forbidden(
                    "Doctors can only view receipts for their own appointments",
                ));
            }
        }
        _ => {
            return Err(ApiError::forbidden(
                "You do not have permission to view this receipt",
            ));
        }
    }

    Ok(Json(ApiOk { data: row }))
}
