use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use stockctl_core::fixtures::sample_records;
use stockctl_core::{Collection, Error, RecordFilter, Result, SampleRecord};
use tracing::{info, instrument, warn};

use crate::models::RecordRow;

/// Rows of a collection, newest first
#[instrument(skip(pool))]
pub async fn list_record_rows(pool: &Pool<Sqlite>, collection: Collection) -> Result<Vec<RecordRow>> {
    sqlx::query_as::<_, RecordRow>(
        r#"
        SELECT collection, id, payload, recorded_at
        FROM records
        WHERE collection = ?
        ORDER BY recorded_at DESC, id DESC
        "#,
    )
    .bind(collection.as_str())
    .fetch_all(pool)
    .await
    .context("Failed to list records")
    .map_err(|e| Error::DatabaseError(e.to_string()))
}

/// Records of a collection that pass the filter, newest first
///
/// Rows whose payload no longer decodes are skipped with a warning.
#[instrument(skip(pool, filter))]
pub async fn list_records(
    pool: &Pool<Sqlite>,
    collection: Collection,
    filter: &RecordFilter,
) -> Result<Vec<SampleRecord>> {
    let rows = list_record_rows(pool, collection).await?;
    let records: Vec<SampleRecord> = rows
        .iter()
        .filter_map(|row| match row.decode() {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable record");
                None
            }
        })
        .collect();
    Ok(filter.apply(&records, Utc::now()))
}

/// Get one record
pub async fn get_record(
    pool: &Pool<Sqlite>,
    collection: Collection,
    id: i64,
) -> Result<Option<SampleRecord>> {
    let row = sqlx::query_as::<_, RecordRow>(
        r#"
        SELECT collection, id, payload, recorded_at
        FROM records
        WHERE collection = ? AND id = ?
        "#,
    )
    .bind(collection.as_str())
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|e| Error::DatabaseError(format!("Failed to get record: {}", e)))?;

    row.map(|r| r.decode()).transpose()
}

/// Insert or replace a record
#[instrument(skip(pool, record), fields(id = record.id()))]
pub async fn upsert_record(
    pool: &Pool<Sqlite>,
    collection: Collection,
    record: &SampleRecord,
) -> Result<()> {
    let payload = serde_json::to_string(record)?;
    sqlx::query(
        r#"
        INSERT INTO records (collection, id, payload, recorded_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(collection, id) DO UPDATE SET
            payload = excluded.payload,
            recorded_at = excluded.recorded_at
        "#,
    )
    .bind(collection.as_str())
    .bind(record.id())
    .bind(payload)
    .bind(record.timestamp())
    .execute(pool)
    .await
    .map_err(|e| Error::DatabaseError(format!("Failed to save record: {}", e)))?;

    Ok(())
}

/// Insert a record under the next free id of its collection; returns that id
///
/// The id is picked and written in one statement, so concurrent inserts
/// never reuse an id. The payload's own `id` is rewritten to match.
#[instrument(skip(pool, record))]
pub async fn insert_record(
    pool: &Pool<Sqlite>,
    collection: Collection,
    record: &SampleRecord,
) -> Result<i64> {
    let payload = serde_json::to_string(record)?;
    let (id,): (i64,) = sqlx::query_as(
        r#"
        WITH next AS (
            SELECT COALESCE(MAX(id), 0) + 1 AS id FROM records WHERE collection = ?
        )
        INSERT INTO records (collection, id, payload, recorded_at)
        SELECT ?, next.id, json_set(?, '$.id', next.id), ? FROM next
        RETURNING id
        "#,
    )
    .bind(collection.as_str())
    .bind(collection.as_str())
    .bind(payload)
    .bind(record.timestamp())
    .fetch_one(pool)
    .await
    .map_err(|e| Error::DatabaseError(format!("Failed to insert record: {}", e)))?;

    Ok(id)
}

/// Delete a record; returns false when it did not exist
#[instrument(skip(pool))]
pub async fn delete_record(pool: &Pool<Sqlite>, collection: Collection, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM records WHERE collection = ? AND id = ?")
        .bind(collection.as_str())
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| Error::DatabaseError(format!("Failed to delete record: {}", e)))?;

    Ok(result.rows_affected() > 0)
}

pub async fn count_records(pool: &Pool<Sqlite>, collection: Collection) -> Result<i64> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records WHERE collection = ?")
        .bind(collection.as_str())
        .fetch_one(pool)
        .await
        .map_err(|e| Error::DatabaseError(format!("Failed to count records: {}", e)))?;

    Ok(count.0)
}

/// Load the built-in sample data into empty collections
///
/// Collections that already hold rows are left alone. Returns the number of
/// rows inserted.
pub async fn seed_fixtures(pool: &Pool<Sqlite>, now: DateTime<Utc>) -> Result<usize> {
    let mut inserted = 0;
    for collection in Collection::ALL {
        if count_records(pool, collection).await? > 0 {
            continue;
        }
        for record in sample_records(collection, now) {
            upsert_record(pool, collection, &record).await?;
            inserted += 1;
        }
    }
    if inserted > 0 {
        info!(inserted, "Seeded sample records");
    }
    Ok(inserted)
}
