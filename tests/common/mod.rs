#![allow(dead_code)]

use chrono::{NaiveDate, NaiveTime};
use sqlx::PgPool;
use uuid::Uuid;

use clinica_server::routes::schedule_routes::create_schedule;

pub fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn d(y: i32, mo: u32, da: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, mo, da).unwrap()
}

pub async fn seed_specialty(pool: &PgPool) -> Uuid {
    seed_specialty_named(pool, "General Medicine").await
}

pub async fn seed_specialty_named(pool: &PgPool, name: &str) -> Uuid {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"INSERT INTO specialty (name) VALUES ($1) RETURNING specialty_id"#,
    )
    .bind(name)
    .fetch_one(pool)
    .await
    .unwrap();
    id
}

pub async fn seed_doctor(pool: &PgPool, specialty_id: Uuid, document: &str) -> Uuid {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO doctor (document_number, first_name, last_name, specialty_id)
        VALUES ($1, 'Gregory', 'House', $2)
        RETURNING doctor_id
        "#,
    )
    .bind(document)
    .bind(specialty_id)
    .fetch_one(pool)
    .await
    .unwrap();
    id
}

/// Login account linked to a doctor record through the shared document number.
pub async fn seed_doctor_user(pool: &PgPool, document: &str) -> Uuid {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO app_user (document_number, first_name, last_name, email, password_hash, role)
        VALUES ($1, 'Gregory', 'House', $1 || '@clinica.local', 'unused-in-tests', 2)
        RETURNING user_id
        "#,
    )
    .bind(document)
    .fetch_one(pool)
    .await
    .unwrap();
    id
}

pub async fn seed_patient(pool: &PgPool, document: &str) -> Uuid {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO app_user (document_number, first_name, last_name, email, password_hash, role)
        VALUES ($1, 'Jane', 'Doe', $1 || '@example.com', 'unused-in-tests', 0)
        RETURNING user_id
        "#,
    )
    .bind(document)
    .fetch_one(pool)
    .await
    .unwrap();
    id
}

/// One doctor with a March schedule (morning 08:00-09:00 over two dates,
/// so six slots), returning the slot ids ordered by date, shift, time.
pub async fn seed_schedule(pool: &PgPool) -> (Uuid, Uuid, Vec<Uuid>) {
    let specialty = seed_specialty(pool).await;
    let doctor = seed_doctor(pool, specialty, "10000001").await;
    let schedule = create_schedule(
        pool,
        doctor,
        3,
        Some((t(8, 0), t(9, 0))),
        None,
        &[d(2025, 3, 10), d(2025, 3, 12)],
    )
    .await
    .unwrap();

    let slots: Vec<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT slot_id
        FROM slot
        WHERE schedule_id = $1
        ORDER BY slot_date ASC, shift ASC, slot_time ASC
        "#,
    )
    .bind(schedule)
    .fetch_all(pool)
    .await
    .unwrap();

    (doctor, schedule, slots.into_iter().map(|(id,)| id).collect())
}

pub async fn slot_held(pool: &PgPool, slot_id: Uuid) -> bool {
    let (held,): (bool,) = sqlx::query_as(r#"SELECT held FROM slot WHERE slot_id = $1"#)
        .bind(slot_id)
        .fetch_one(pool)
        .await
        .unwrap();
    held
}

pub async fn count_rows(pool: &PgPool, table: &str) -> i64 {
    let (count,): (i64,) = sqlx::query_as(&format!("SELECT count(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap();
    count
}
