mod common;

use common::{count_rows, d, seed_doctor, seed_patient, seed_schedule, seed_specialty, t};
use sqlx::PgPool;

use clinica_server::routes::booking_routes::reserve_slot;
use clinica_server::routes::schedule_routes::{create_schedule, delete_schedule, list_free_slots};
use clinica_server::slots::Shift;

#[sqlx::test(migrations = "./migrations")]
async fn create_schedule_persists_header_and_full_grid(pool: PgPool) {
    let specialty = seed_specialty(&pool).await;
    let doctor = seed_doctor(&pool, specialty, "20000001").await;

    let schedule = create_schedule(
        &pool,
        doctor,
        3,
        Some((t(8, 0), t(9, 0))),
        Some((t(14, 0), t(15, 0))),
        &[d(2025, 3, 10), d(2025, 3, 12)],
    )
    .await
    .unwrap();

    // 3 morning + 3 afternoon times per date, 2 dates
    let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM slot WHERE schedule_id = $1")
        .bind(schedule)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 12);

    let free = list_free_slots(&pool, doctor, d(2025, 3, 1)).await.unwrap();
    assert_eq!(free.len(), 12);
    assert_eq!(free[0].slot_date, d(2025, 3, 10));
    assert_eq!(free[0].shift, Shift::Morning);
    assert_eq!(free[0].slot_time, t(8, 0));
    assert_eq!(free[2].slot_time, t(9, 0)); // end boundary included
    assert_eq!(free[3].shift, Shift::Afternoon);
    assert!(free.iter().all(|s| !s.held));
}

#[sqlx::test(migrations = "./migrations")]
async fn duplicate_schedule_is_rejected_and_persists_nothing(pool: PgPool) {
    let specialty = seed_specialty(&pool).await;
    let doctor = seed_doctor(&pool, specialty, "20000002").await;

    create_schedule(&pool, doctor, 3, Some((t(8, 0), t(9, 0))), None, &[d(2025, 3, 10)])
        .await
        .unwrap();
    let slots_before = count_rows(&pool, "slot").await;

    let err = create_schedule(&pool, doctor, 3, Some((t(10, 0), t(11, 0))), None, &[d(2025, 3, 11)])
        .await
        .unwrap_err();
    assert_eq!(err.code(), "DUPLICATE_SCHEDULE");

    assert_eq!(count_rows(&pool, "monthly_schedule").await, 1);
    assert_eq!(count_rows(&pool, "slot").await, slots_before);

    // A different month for the same doctor is fine.
    create_schedule(&pool, doctor, 4, Some((t(8, 0), t(9, 0))), None, &[d(2025, 4, 7)])
        .await
        .unwrap();
    assert_eq!(count_rows(&pool, "monthly_schedule").await, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn unknown_doctor_is_rejected(pool: PgPool) {
    let err = create_schedule(
        &pool,
        uuid::Uuid::new_v4(),
        3,
        Some((t(8, 0), t(9, 0))),
        None,
        &[d(2025, 3, 10)],
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
    assert_eq!(count_rows(&pool, "monthly_schedule").await, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn delete_schedule_with_held_slot_removes_nothing(pool: PgPool) {
    let (_doctor, schedule, slots) = seed_schedule(&pool).await;
    let patient = seed_patient(&pool, "30000001").await;
    reserve_slot(&pool, patient, slots[0]).await.unwrap();

    let err = delete_schedule(&pool, schedule).await.unwrap_err();
    assert_eq!(err.code(), "SCHEDULE_HAS_HELD_SLOTS");

    assert_eq!(count_rows(&pool, "monthly_schedule").await, 1);
    assert_eq!(count_rows(&pool, "slot").await, slots.len() as i64);
}

#[sqlx::test(migrations = "./migrations")]
async fn delete_schedule_removes_slots_then_header(pool: PgPool) {
    let (_doctor, schedule, _slots) = seed_schedule(&pool).await;

    delete_schedule(&pool, schedule).await.unwrap();

    assert_eq!(count_rows(&pool, "monthly_schedule").await, 0);
    assert_eq!(count_rows(&pool, "slot").await, 0);

    let err = delete_schedule(&pool, schedule).await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[sqlx::test(migrations = "./migrations")]
async fn free_slot_listing_is_live_and_filtered_by_date(pool: PgPool) {
    let (doctor, _schedule, slots) = seed_schedule(&pool).await;
    let patient = seed_patient(&pool, "30000002").await;

    // from-date past the first attendance day hides its three slots
    let later = list_free_slots(&pool, doctor, d(2025, 3, 11)).await.unwrap();
    assert_eq!(later.len(), 3);
    assert!(later.iter().all(|s| s.slot_date == d(2025, 3, 12)));

    // a reservation disappears from the next listing, nothing is cached
    reserve_slot(&pool, patient, slots[0]).await.unwrap();
    let free = list_free_slots(&pool, doctor, d(2025, 3, 1)).await.unwrap();
    assert_eq!(free.len(), slots.len() - 1);
    assert!(free.iter().all(|s| s.slot_id != slots[0]));
}
