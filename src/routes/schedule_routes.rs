// src/routes/schedule_routes.rs

use std::collections::BTreeSet;

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::AuthContext,
    models::{ApiOk, AppState, OkData, SlotRow, ROLE_ADMIN, ROLE_PATIENT},
    slots::{self, SlotError},
};

/// Attendance dates arrive as day/month/year tokens; chrono's numeric
/// parsing accepts both `5/3/2025` and `05/03/2025` with this format.
const DATE_FORMAT: &str = "%d/%m/%Y";

fn ensure_admin(auth: &AuthContext) -> Result<(), ApiError> {
    if auth.role == ROLE_ADMIN {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only an administrator can manage schedules"))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/schedules", post(create_schedule_handler).get(list_schedules))
        .route("/schedules/{schedule_id}", delete(delete_schedule_handler))
        .route("/doctors/{doctor_id}/free_slots", get(free_slots_handler))
}

/* ============================================================
   Request/response DTOs
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    pub doctor_id: Uuid,
    pub month: i16,
    pub am_start: Option<NaiveTime>,
    pub am_end: Option<NaiveTime>,
    pub pm_start: Option<NaiveTime>,
    pub pm_end: Option<NaiveTime>,
    /// Attendance dates, day/month/year.
    pub dates: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateScheduleData {
    pub schedule_id: Uuid,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ScheduleListItem {
    pub schedule_id: Uuid,
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub month: i16,
    pub am_start: Option<NaiveTime>,
    pub am_end: Option<NaiveTime>,
    pub pm_start: Option<NaiveTime>,
    pub pm_end: Option<NaiveTime>,
    pub slot_count: i64,
    pub created_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct FreeSlotsQuery {
    /// ISO date; defaults to today.
    pub from: Option<NaiveDate>,
}

/* ============================================================
   Input validation helpers
   ============================================================ */

/// A shift range must come as a complete, strictly ordered pair, or not at all.
fn shift_range(
    label: &str,
    start: Option<NaiveTime>,
    end: Option<NaiveTime>,
) -> Result<Option<(NaiveTime, NaiveTime)>, ApiError> {
    match (start, end) {
        (None, None) => Ok(None),
        (Some(s), Some(e)) if s < e => Ok(Some((s, e))),
        (Some(_), Some(_)) => Err(ApiError::validation(format!(
            "{label} start must be strictly before {label} end"
        ))),
        _ => Err(ApiError::validation(format!(
            "{label} range requires both start and end"
        ))),
    }
}

/// Parses day/month/year tokens, requires every date to fall in `month`,
/// deduplicates and sorts.
pub fn parse_attendance_dates(tokens: &[String], month: i16) -> Result<Vec<NaiveDate>, ApiError> {
    let mut dates = BTreeSet::new();
    for token in tokens {
        let s = token.trim();
        if s.is_empty() {
            continue;
        }
        let date = NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| {
            ApiError::validation(format!("invalid date {s}, expected day/month/year"))
        })?;
        if date.month() as i16 != month {
            return Err(ApiError::date_month_mismatch(s));
        }
        dates.insert(date);
    }
    if dates.is_empty() {
        return Err(ApiError::validation("at least one attendance date is required"));
    }
    Ok(dates.into_iter().collect())
}

/* ============================================================
   Core operations (shared with the integration tests)
   ============================================================ */

/// Persists the schedule header and its whole generated slot grid as one
/// atomic unit; any failure rolls the entire batch back.
pub async fn create_schedule(
    pool: &PgPool,
    doctor_id: Uuid,
    month: i16,
    morning: Option<(NaiveTime, NaiveTime)>,
    afternoon: Option<(NaiveTime, NaiveTime)>,
    dates: &[NaiveDate],
) -> Result<Uuid, ApiError> {
    if !(1..=12).contains(&month) {
        return Err(ApiError::validation("month must be between 1 and 12"));
    }

    let grid = slots::expand_ranges(morning, afternoon, dates)
        .map_err(|SlotError::InvalidRange| ApiError::invalid_range())?;

    let mut tx = pool.begin().await.map_err(ApiError::db)?;

    let doctor: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT doctor_id
        FROM doctor
        WHERE doctor_id = $1
        "#,
    )
    .bind(doctor_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::db)?;
    if doctor.is_none() {
        return Err(ApiError::not_found("doctor"));
    }

    let existing: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT schedule_id
        FROM monthly_schedule
        WHERE doctor_id = $1
          AND month = $2
        "#,
    )
    .bind(doctor_id)
    .bind(month)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::db)?;
    if existing.is_some() {
        return Err(ApiError::duplicate_schedule());
    }

    // The UNIQUE(doctor_id, month) index re-enforces the check above inside
    // the transaction, so a concurrent create cannot slip in between.
    let (schedule_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO monthly_schedule (doctor_id, month, am_start, am_end, pm_start, pm_end)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING schedule_id
        "#,
    )
    .bind(doctor_id)
    .bind(month)
    .bind(morning.map(|(s, _)| s))
    .bind(morning.map(|(_, e)| e))
    .bind(afternoon.map(|(s, _)| s))
    .bind(afternoon.map(|(_, e)| e))
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if e.as_database_error().is_some_and(|d| d.is_unique_violation()) {
            ApiError::duplicate_schedule()
        } else {
            ApiError::db(e)
        }
    })?;

    for slot in &grid {
        sqlx::query(
            r#"
            INSERT INTO slot (schedule_id, slot_date, shift, slot_time)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(schedule_id)
        .bind(slot.date)
        .bind(slot.shift)
        .bind(slot.time)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::db)?;
    }

    tx.commit().await.map_err(ApiError::db)?;

    tracing::info!(%doctor_id, month, slots = grid.len(), "monthly schedule created");
    Ok(schedule_id)
}

/// Removes the slot grid and its header atomically. Refused while any
/// descendant slot is held.
pub async fn delete_schedule(pool: &PgPool, schedule_id: Uuid) -> Result<(), ApiError> {
    let mut tx = pool.begin().await.map_err(ApiError::db)?;

    let header: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT schedule_id
        FROM monthly_schedule
        WHERE schedule_id = $1
        FOR UPDATE
        "#,
    )
    .bind(schedule_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::db)?;
    if header.is_none() {
        return Err(ApiError::not_found("schedule"));
    }

    let held: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT slot_id
        FROM slot
        WHERE schedule_id = $1
          AND held = true
        LIMIT 1
        "#,
    )
    .bind(schedule_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::db)?;
    if held.is_some() {
        return Err(ApiError::schedule_has_held_slots());
    }

    // A reserve that lands after the check above would hold a slot that is
    // referenced by an appointment; the RESTRICT foreign key then fails this
    // delete and the whole transaction rolls back.
    sqlx::query(r#"DELETE FROM slot WHERE schedule_id = $1"#)
        .bind(schedule_id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::db)?;

    sqlx::query(r#"DELETE FROM monthly_schedule WHERE schedule_id = $1"#)
        .bind(schedule_id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::db)?;

    tx.commit().await.map_err(ApiError::db)?;

    tracing::info!(%schedule_id, "monthly schedule deleted");
    Ok(())
}

/// Live view of the doctor's unheld slots from `from` on, ordered by date,
/// shift, time. Re-querying reflects reservations made in between.
pub async fn list_free_slots(
    pool: &PgPool,
    doctor_id: Uuid,
    from: NaiveDate,
) -> Result<Vec<SlotRow>, ApiError> {
    sqlx::query_as::<_, SlotRow>(
        r#"
        SELECT s.slot_id, s.schedule_id, s.slot_date, s.shift, s.slot_time, s.held
        FROM slot s
        JOIN monthly_schedule ms ON ms.schedule_id = s.schedule_id
        WHERE ms.doctor_id = $1
          AND s.held = false
          AND s.slot_date >= $2
        ORDER BY s.slot_date ASC, s.shift ASC, s.slot_time ASC
        "#,
    )
    .bind(doctor_id)
    .bind(from)
    .fetch_all(pool)
    .await
    .map_err(ApiError::db)
}

/* ============================================================
   Handlers
   ============================================================ */

pub async fn create_schedule_handler(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateScheduleRequest>,
) -> Result<Json<ApiOk<CreateScheduleData>>, ApiError> {
    ensure_admin(&auth)?;

    let morning = shift_range("morning", req.am_start, req.am_end)?;
    let afternoon = shift_range("afternoon", req.pm_start, req.pm_end)?;
    if morning.is_none() && afternoon.is_none() {
        return Err(ApiError::invalid_range());
    }
    let dates = parse_attendance_dates(&req.dates, req.month)?;

    let schedule_id =
        create_schedule(&state.db, req.doctor_id, req.month, morning, afternoon, &dates).await?;

    Ok(Json(ApiOk {
        data: CreateScheduleData { schedule_id },
    }))
}

pub async fn delete_schedule_handler(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<ApiOk<OkData>>, ApiError> {
    ensure_admin(&auth)?;
    delete_schedule(&state.db, schedule_id).await?;
    Ok(Json(ApiOk {
        data: OkData { ok: true },
    }))
}

pub async fn list_schedules(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<ApiOk<Vec<ScheduleListItem>>>, ApiError> {
    ensure_admin(&auth)?;

    let rows: Vec<ScheduleListItem> = sqlx::query_as::<_, ScheduleListItem>(
        r#"
        SELECT
          ms.schedule_id,
          ms.doctor_id,
          (d.first_name || ' ' || d.last_name) AS doctor_name,
          ms.month,
          ms.am_start,
          ms.am_end,
          ms.pm_start,
          ms.pm_end,
          (SELECT count(*) FROM slot s WHERE s.schedule_id = ms.schedule_id) AS slot_count,
          ms.created_at
        FROM monthly_schedule ms
        JOIN doctor d ON d.doctor_id = ms.doctor_id
        ORDER BY d.last_name ASC, d.first_name ASC, ms.month ASC
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk { data: rows }))
}

pub async fn free_slots_handler(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(doctor_id): Path<Uuid>,
    Query(q): Query<FreeSlotsQuery>,
) -> Result<Json<ApiOk<Vec<SlotRow>>>, ApiError> {
    if auth.role != ROLE_PATIENT && auth.role != ROLE_ADMIN {
        return Err(ApiError::forbidden("Only patients can browse free slots"));
    }

    let from = q.from.unwrap_or_else(|| Utc::now().date_naive());
    let rows = list_free_slots(&state.db, doctor_id, from).await?;
    Ok(Json(ApiOk { data: rows }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn accepts_padded_and_unpadded_day_month() {
        let dates = parse_attendance_dates(&tokens(&["05/03/2025", "7/3/2025"]), 3).unwrap();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2025, 3, 5).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 7).unwrap(),
            ]
        );
    }

    #[test]
    fn deduplicates_and_sorts_dates() {
        let dates =
            parse_attendance_dates(&tokens(&["12/03/2025", "10/03/2025", "12/3/2025"]), 3).unwrap();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 12).unwrap(),
            ]
        );
    }

    #[test]
    fn rejects_garbage_tokens() {
        let err = parse_attendance_dates(&tokens(&["2025-03-10"]), 3).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn month_mismatch_names_the_offending_token() {
        let err = parse_attendance_dates(&tokens(&["10/03/2025", "02/04/2025"]), 3).unwrap_err();
        assert_eq!(err.code(), "DATE_MONTH_MISMATCH");
        let ApiError::BadRequest(_, msg) = err else {
            panic!("expected BadRequest");
        };
        assert!(msg.contains("02/04/2025"));
    }

    #[test]
    fn empty_or_blank_token_list_is_rejected() {
        assert_eq!(
            parse_attendance_dates(&tokens(&[]), 3).unwrap_err().code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            parse_attendance_dates(&tokens(&["  "]), 3).unwrap_err().code(),
            "VALIDATION_ERROR"
        );
    }

    #[test]
    fn half_open_shift_range_is_rejected() {
        let start = NaiveTime::from_hms_opt(8, 0, 0);
        assert_eq!(
            shift_range("morning", start, None).unwrap_err().code(),
            "VALIDATION_ERROR"
        );
        assert!(shift_range("morning", None, None).unwrap().is_none());
    }
}
