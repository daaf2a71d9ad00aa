use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;

use crate::db::models::{LocationFix, Order, Position, Reading, ReadingFilter, RowId, SensorId};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no reading log exists for sensor {0}")]
    NoSuchLog(SensorId),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Reading logs (one per sensor) and the shared location log.
///
/// Every sensor owns a row in `reading_logs` whose `last_row_id` counter hands
/// out row IDs. Bumping the counter and inserting the reading happen in one
/// transaction, so concurrent appends to the same log never share an ID and
/// IDs grow in insertion order.
#[derive(Clone)]
pub struct SampleStore {
    pool: SqlitePool,
}

impl SampleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // -----------------------------------------------------------------------
    // Log lifecycle
    // -----------------------------------------------------------------------

    pub async fn create_log(&self, sensor_id: SensorId) -> StorageResult<()> {
        sqlx::query("INSERT INTO reading_logs (sensor_id) VALUES (?) ON CONFLICT (sensor_id) DO NOTHING")
            .bind(sensor_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn drop_log(&self, sensor_id: SensorId) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::drop_log_in(&mut *tx, sensor_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Removes the log and its readings on `conn`, leaving commit to the
    /// caller.
    pub(crate) async fn drop_log_in(conn: &mut SqliteConnection, sensor_id: SensorId) -> StorageResult<()> {
        sqlx::query("DELETE FROM readings WHERE sensor_id = ?")
            .bind(sensor_id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM reading_logs WHERE sensor_id = ?")
            .bind(sensor_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Readings
    // -----------------------------------------------------------------------

    pub async fn append_reading(
        &self,
        sensor_id: SensorId,
        value: f64,
        timestamp: &str,
    ) -> StorageResult<RowId> {
        let mut tx = self.pool.begin().await?;

        let row_id: RowId = sqlx::query_scalar(
            "UPDATE reading_logs SET last_row_id = last_row_id + 1 \
             WHERE sensor_id = ? RETURNING last_row_id",
        )
        .bind(sensor_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StorageError::NoSuchLog(sensor_id))?;

        sqlx::query(
            "INSERT INTO readings (sensor_id, row_id, timestamp, value, uploaded) \
             VALUES (?, ?, ?, ?, 0)",
        )
        .bind(sensor_id)
        .bind(row_id)
        .bind(timestamp)
        .bind(value)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row_id)
    }

    pub async fn query_readings(
        &self,
        sensor_id: SensorId,
        filter: ReadingFilter,
        order: Order,
    ) -> StorageResult<Vec<Reading>> {
        let sql = format!(
            "SELECT sensor_id, row_id, timestamp, value, uploaded FROM readings \
             WHERE sensor_id = ?{} ORDER BY row_id {}",
            filter_clause(filter),
            order_keyword(order),
        );
        let rows = sqlx::query_as::<_, Reading>(&sql)
            .bind(sensor_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Flags exactly `row_ids` as uploaded. Re-marking is a no-op.
    pub async fn mark_uploaded(&self, sensor_id: SensorId, row_ids: &[RowId]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        for &row_id in row_ids {
            sqlx::query("UPDATE readings SET uploaded = 1 WHERE sensor_id = ? AND row_id = ?")
                .bind(sensor_id)
                .bind(row_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Clears a sensor's readings but keeps its log and row counter.
    pub async fn delete_all(&self, sensor_id: SensorId) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM readings WHERE sensor_id = ?")
            .bind(sensor_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Clears readings up to and including `last_row_id`. Rows appended after
    /// an export snapshot survive.
    pub async fn delete_through(&self, sensor_id: SensorId, last_row_id: RowId) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM readings WHERE sensor_id = ? AND row_id <= ?")
            .bind(sensor_id)
            .bind(last_row_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Returns `false` when no such row existed.
    pub async fn delete_reading(&self, sensor_id: SensorId, row_id: RowId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM readings WHERE sensor_id = ? AND row_id = ?")
            .bind(sensor_id)
            .bind(row_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // Locations
    // -----------------------------------------------------------------------

    pub async fn append_location(&self, timestamp: &str, position: Position) -> StorageResult<RowId> {
        let row_id = sqlx::query_scalar(
            "INSERT INTO locations (timestamp, altitude, latitude, longitude, uploaded) \
             VALUES (?, ?, ?, ?, 0) RETURNING row_id",
        )
        .bind(timestamp)
        .bind(position.altitude)
        .bind(position.latitude)
        .bind(position.longitude)
        .fetch_one(&self.pool)
        .await?;
        Ok(row_id)
    }

    pub async fn query_locations(&self, filter: ReadingFilter, order: Order) -> StorageResult<Vec<LocationFix>> {
        let where_clause = match filter {
            ReadingFilter::All => "",
            ReadingFilter::NotUploaded => " WHERE uploaded = 0",
        };
        let sql = format!(
            "SELECT row_id, timestamp, altitude, latitude, longitude, uploaded FROM locations{} \
             ORDER BY row_id {}",
            where_clause,
            order_keyword(order),
        );
        let rows = sqlx::query_as::<_, LocationFix>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn latest_location(&self) -> StorageResult<Option<LocationFix>> {
        let row = sqlx::query_as::<_, LocationFix>(
            "SELECT row_id, timestamp, altitude, latitude, longitude, uploaded FROM locations \
             ORDER BY row_id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn mark_location_uploaded(&self, row_id: RowId) -> StorageResult<()> {
        sqlx::query("UPDATE locations SET uploaded = 1 WHERE row_id = ?")
            .bind(row_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_locations(&self) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM locations")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_locations_through(&self, last_row_id: RowId) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM locations WHERE row_id <= ?")
            .bind(last_row_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn filter_clause(filter: ReadingFilter) -> &'static str {
    match filter {
        ReadingFilter::All => "",
        ReadingFilter::NotUploaded => " AND uploaded = 0",
    }
}

fn order_keyword(order: Order) -> &'static str {
    match order {
        Order::Ascending => "ASC",
        Order::Descending => "DESC",
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use uuid::Uuid;

    use super::*;
    use crate::db::test_pool;

    const TS: &str = "2024-05-01T12:00:00+0200";

    async fn store_with_log() -> (SampleStore, SensorId) {
        let store = SampleStore::new(test_pool().await);
        let id = Uuid::new_v4();
        store.create_log(id).await.unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn append_without_log_is_rejected() {
        let store = SampleStore::new(test_pool().await);
        let id = Uuid::new_v4();
        let err = store.append_reading(id, 1.0, TS).await.unwrap_err();
        assert!(matches!(err, StorageError::NoSuchLog(got) if got == id));
    }

    #[tokio::test]
    async fn readings_come_back_in_insertion_order_unless_reversed() {
        let (store, id) = store_with_log().await;
        for v in [0.1, 0.2, 0.3] {
            store.append_reading(id, v, TS).await.unwrap();
        }

        let asc = store.query_readings(id, ReadingFilter::All, Order::Ascending).await.unwrap();
        assert_eq!(asc.iter().map(|r| r.row_id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(asc[0].value, 0.1);
        assert!(asc.iter().all(|r| !r.uploaded && r.timestamp == TS));

        let desc = store.query_readings(id, ReadingFilter::All, Order::Descending).await.unwrap();
        assert_eq!(desc[0].value, 0.3);
    }

    #[tokio::test]
    async fn logs_are_independent() {
        let (store, a) = store_with_log().await;
        let b = Uuid::new_v4();
        store.create_log(b).await.unwrap();

        store.append_reading(a, 1.0, TS).await.unwrap();
        let first_b = store.append_reading(b, 2.0, TS).await.unwrap();

        assert_eq!(first_b, 1);
        let b_rows = store.query_readings(b, ReadingFilter::All, Order::Ascending).await.unwrap();
        assert_eq!(b_rows.len(), 1);
        assert_eq!(b_rows[0].value, 2.0);
    }

    #[tokio::test]
    async fn mark_uploaded_touches_only_given_rows_and_is_idempotent() {
        let (store, id) = store_with_log().await;
        let r1 = store.append_reading(id, 1.0, TS).await.unwrap();
        let r2 = store.append_reading(id, 2.0, TS).await.unwrap();
        let r3 = store.append_reading(id, 3.0, TS).await.unwrap();

        store.mark_uploaded(id, &[r1, r3]).await.unwrap();
        store.mark_uploaded(id, &[r1, r3]).await.unwrap();

        let pending = store.query_readings(id, ReadingFilter::NotUploaded, Order::Ascending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].row_id, r2);
    }

    #[tokio::test]
    async fn row_ids_keep_growing_after_clear() {
        let (store, id) = store_with_log().await;
        store.append_reading(id, 1.0, TS).await.unwrap();
        store.append_reading(id, 1.0, TS).await.unwrap();

        assert_eq!(store.delete_all(id).await.unwrap(), 2);
        let next = store.append_reading(id, 1.0, TS).await.unwrap();
        assert_eq!(next, 3);
    }

    #[tokio::test]
    async fn delete_through_spares_later_rows() {
        let (store, id) = store_with_log().await;
        for v in [1.0, 2.0, 3.0] {
            store.append_reading(id, v, TS).await.unwrap();
        }
        let snapshot = store.query_readings(id, ReadingFilter::All, Order::Ascending).await.unwrap();
        let late = store.append_reading(id, 4.0, TS).await.unwrap();

        let deleted = store.delete_through(id, snapshot.last().unwrap().row_id).await.unwrap();

        assert_eq!(deleted, 3);
        let rows = store.query_readings(id, ReadingFilter::All, Order::Ascending).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].row_id, late);
    }

    #[tokio::test]
    async fn delete_single_reading() {
        let (store, id) = store_with_log().await;
        let r1 = store.append_reading(id, 1.0, TS).await.unwrap();
        store.append_reading(id, 2.0, TS).await.unwrap();

        assert!(store.delete_reading(id, r1).await.unwrap());
        assert!(!store.delete_reading(id, r1).await.unwrap());
        let rows = store.query_readings(id, ReadingFilter::All, Order::Ascending).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 2.0);
    }

    #[tokio::test]
    async fn drop_log_removes_readings_and_log() {
        let (store, id) = store_with_log().await;
        store.append_reading(id, 1.0, TS).await.unwrap();

        store.drop_log(id).await.unwrap();

        assert!(store.query_readings(id, ReadingFilter::All, Order::Ascending).await.unwrap().is_empty());
        assert!(matches!(
            store.append_reading(id, 1.0, TS).await,
            Err(StorageError::NoSuchLog(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_appends_get_unique_ids() {
        let (store, id) = store_with_log().await;

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.append_reading(id, f64::from(i), TS).await.unwrap()
            }));
        }
        let mut ids = HashSet::new();
        for h in handles {
            assert!(ids.insert(h.await.unwrap()));
        }

        assert_eq!(ids.len(), 20);
        assert_eq!(ids.iter().max(), Some(&20));
    }

    #[tokio::test]
    async fn latest_location_and_upload_flag() {
        let store = SampleStore::new(test_pool().await);
        assert!(store.latest_location().await.unwrap().is_none());

        let pos = Position { latitude: 52.5, longitude: 13.4, altitude: 34.0 };
        store.append_location(TS, pos).await.unwrap();
        let second = store.append_location(TS, Position { altitude: 40.0, ..pos }).await.unwrap();

        let latest = store.latest_location().await.unwrap().unwrap();
        assert_eq!(latest.row_id, second);
        assert_eq!(latest.altitude, 40.0);
        assert!(!latest.uploaded);

        store.mark_location_uploaded(second).await.unwrap();
        let pending = store.query_locations(ReadingFilter::NotUploaded, Order::Ascending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_ne!(pending[0].row_id, second);

        assert_eq!(store.delete_locations().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_locations_through_spares_later_fixes() {
        let store = SampleStore::new(test_pool().await);
        let pos = Position { latitude: 52.5, longitude: 13.4, altitude: 34.0 };
        let first = store.append_location(TS, pos).await.unwrap();
        let late = store.append_location(TS, pos).await.unwrap();

        assert_eq!(store.delete_locations_through(first).await.unwrap(), 1);
        let left = store.query_locations(ReadingFilter::All, Order::Ascending).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].row_id, late);
    }
}
