// Repository-level coverage: find-or-create semantics, upserts, and
// flow-file lifecycle transitions.

mod common;

use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use d0010_importer::d0010::{ParsedReading, ReadingType};
use d0010_importer::db::{
    FlowFileRepository, FlowFileStatus, MeterPointRepository, MeterRepository, ReadingRepository,
    UpsertOutcome,
};

fn sample_reading(date: NaiveDate, value: &str) -> ParsedReading {
    ParsedReading {
        line_number: 1,
        mpan: "1200023305967".to_string(),
        meter_serial: "F75A00802".to_string(),
        reading_date: date,
        reading_time: NaiveTime::from_hms_opt(9, 0, 0),
        register_id: "01".to_string(),
        reading_value: Decimal::from_str(value).unwrap(),
        reading_type: ReadingType::Actual,
    }
}

#[tokio::test]
async fn test_meter_point_find_or_create_is_stable() {
    let pool = common::test_pool().await;
    let repo = MeterPointRepository::new(pool.clone());

    let mut tx = pool.begin().await.unwrap();
    let first = repo.find_or_create(&mut tx, "1200023305967").await.unwrap();
    let second = repo.find_or_create(&mut tx, "1200023305967").await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(repo.count().await.unwrap(), 1);
    assert_eq!(
        repo.find_by_mpan("1200023305967")
            .await
            .unwrap()
            .unwrap()
            .mpan,
        "1200023305967"
    );
}

#[tokio::test]
async fn test_meter_find_or_create_and_relink() {
    let pool = common::test_pool().await;
    let meter_points = MeterPointRepository::new(pool.clone());
    let meters = MeterRepository::new(pool.clone());

    let mut tx = pool.begin().await.unwrap();
    let point_a = meter_points.find_or_create(&mut tx, "1200023305967").await.unwrap();
    let point_b = meter_points.find_or_create(&mut tx, "1900001059816").await.unwrap();

    let created = meters
        .find_or_create(&mut tx, "F75A00802", &point_a)
        .await
        .unwrap();
    assert_eq!(created.meter_point_id, point_a.id);

    let found = meters
        .find_or_create(&mut tx, "F75A00802", &point_a)
        .await
        .unwrap();
    assert_eq!(found.id, created.id);

    // Same serial under a different MPAN relinks instead of duplicating
    let relinked = meters
        .find_or_create(&mut tx, "F75A00802", &point_b)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(relinked.id, created.id);
    assert_eq!(relinked.meter_point_id, point_b.id);
    assert_eq!(meters.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_reading_upsert_outcomes() {
    let pool = common::test_pool().await;
    let meter_points = MeterPointRepository::new(pool.clone());
    let meters = MeterRepository::new(pool.clone());
    let readings = ReadingRepository::new(pool.clone());
    let flow_files = FlowFileRepository::new(pool.clone());

    let flow_file = flow_files.begin_import("hash-1", "a.uff", 1).await.unwrap();
    let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

    let mut tx = pool.begin().await.unwrap();
    let point = meter_points.find_or_create(&mut tx, "1200023305967").await.unwrap();
    let meter = meters
        .find_or_create(&mut tx, "F75A00802", &point)
        .await
        .unwrap();

    let outcome = readings
        .upsert(&mut tx, &meter, flow_file.id, &sample_reading(date, "100.0"))
        .await
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::Inserted);

    // Same (meter, date, time, register) updates in place
    let outcome = readings
        .upsert(&mut tx, &meter, flow_file.id, &sample_reading(date, "105.5"))
        .await
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::Updated);

    // A different date is a new reading
    let other_date = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
    let outcome = readings
        .upsert(
            &mut tx,
            &meter,
            flow_file.id,
            &sample_reading(other_date, "110.0"),
        )
        .await
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::Inserted);
    tx.commit().await.unwrap();

    assert_eq!(readings.count().await.unwrap(), 2);

    let stored = readings.find_by_meter(meter.id).await.unwrap();
    assert_eq!(stored.len(), 2);
    // Newest first
    assert_eq!(stored[0].reading_date, other_date);
    assert_eq!(stored[1].reading_value, Decimal::from_str("105.5").unwrap());
    assert_eq!(stored[1].reading_time, NaiveTime::from_hms_opt(9, 0, 0));
}

#[tokio::test]
async fn test_reading_without_time_is_distinct_and_idempotent() {
    let pool = common::test_pool().await;
    let meter_points = MeterPointRepository::new(pool.clone());
    let meters = MeterRepository::new(pool.clone());
    let readings = ReadingRepository::new(pool.clone());
    let flow_files = FlowFileRepository::new(pool.clone());

    let flow_file = flow_files.begin_import("hash-2", "b.uff", 1).await.unwrap();
    let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let mut untimed = sample_reading(date, "100.0");
    untimed.reading_time = None;

    let mut tx = pool.begin().await.unwrap();
    let point = meter_points.find_or_create(&mut tx, "1200023305967").await.unwrap();
    let meter = meters
        .find_or_create(&mut tx, "F75A00802", &point)
        .await
        .unwrap();

    let first = readings
        .upsert(&mut tx, &meter, flow_file.id, &untimed)
        .await
        .unwrap();
    let second = readings
        .upsert(&mut tx, &meter, flow_file.id, &untimed)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(first, UpsertOutcome::Inserted);
    assert_eq!(second, UpsertOutcome::Updated);

    let stored = readings.find_by_meter(meter.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].reading_time, None);
}

#[tokio::test]
async fn test_flow_file_lifecycle() {
    let pool = common::test_pool().await;
    let repo = FlowFileRepository::new(pool);

    assert!(repo.find_by_hash("missing").await.unwrap().is_none());

    let flow_file = repo
        .begin_import("abc123", "readings.uff", 42)
        .await
        .unwrap();
    assert_eq!(flow_file.status, FlowFileStatus::Processing);
    assert_eq!(flow_file.row_count, 42);
    assert!(flow_file.error_message.is_none());

    repo.mark_completed(flow_file.id).await.unwrap();
    let found = repo.find_by_hash("abc123").await.unwrap().unwrap();
    assert_eq!(found.status, FlowFileStatus::Completed);

    repo.mark_failed(flow_file.id, "disk on fire").await.unwrap();
    let found = repo.find_by_hash("abc123").await.unwrap().unwrap();
    assert_eq!(found.status, FlowFileStatus::Failed);
    assert_eq!(found.error_message.as_deref(), Some("disk on fire"));

    // Re-registering the same hash reuses the row and clears the error
    let again = repo
        .begin_import("abc123", "renamed.uff", 40)
        .await
        .unwrap();
    assert_eq!(again.id, flow_file.id);
    assert_eq!(again.filename, "renamed.uff");
    assert_eq!(again.status, FlowFileStatus::Processing);
    assert!(again.error_message.is_none());
}
