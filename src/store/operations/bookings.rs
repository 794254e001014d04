use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Transactional;

use crate::store::keys;
use crate::store::{map_transaction_error, Store, StoreError};

/// A stored booking. Only `darshanDate` is interpreted; every other
/// attribute written by the producer is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub darshan_date: DateTime<Utc>,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl Booking {
    pub fn new(id: impl Into<String>, darshan_date: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            darshan_date,
            attributes: serde_json::Map::new(),
        }
    }
}

/// Attribute names owned by [`Booking`] itself; they may not appear in `attributes`.
pub const RESERVED_ATTRIBUTES: [&str; 2] = ["id", "darshanDate"];

/// What the expiry query yields and what a [`DeleteBatch`] removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRef {
    pub id: String,
    /// Millisecond precision, as recorded in the date index.
    pub darshan_date: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatedDocument {
    darshan_date: DateTime<Utc>,
}

/// Deletes collected for a single atomic commit.
#[derive(Debug, Default)]
pub struct DeleteBatch {
    targets: Vec<BookingRef>,
}

impl DeleteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delete(&mut self, target: BookingRef) {
        self.targets.push(target);
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// The two store operations the booking reaper consumes.
pub trait BookingStore: Send + Sync {
    /// All bookings whose `darshanDate` is strictly earlier than `cutoff`, in no particular order.
    fn query_bookings_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<BookingRef>, StoreError>;

    /// Applies every delete in `batch` as one unit. Returns how many documents were removed.
    fn commit_deletes(&self, batch: DeleteBatch) -> Result<usize, StoreError>;
}

impl Store {
    /// Inserts or replaces a booking, keeping the date index in step.
    pub fn put_booking(&self, booking: &Booking) -> Result<(), StoreError> {
        if let Some(name) = RESERVED_ATTRIBUTES
            .iter()
            .find(|name| booking.attributes.contains_key(**name))
        {
            return Err(StoreError::Validation(format!(
                "booking {} carries reserved attribute '{name}'",
                booking.id
            )));
        }
        let key = keys::booking_key(&booking.id)?;
        let index_key =
            keys::booking_date_index_key(booking.darshan_date.timestamp_millis(), &booking.id)?;
        let value = Self::serialize(booking)?;

        (&self.bookings, &self.bookings_by_date)
            .transaction(|(tx_docs, tx_index)| {
                if let Some(old_raw) = tx_docs.get(key.as_bytes())? {
                    let old: DatedDocument = serde_json::from_slice(&old_raw).map_err(|error| {
                        sled::transaction::ConflictableTransactionError::Abort(
                            StoreError::Serialization(error),
                        )
                    })?;
                    let old_index_key = keys::booking_date_index_key(
                        old.darshan_date.timestamp_millis(),
                        &booking.id,
                    )
                    .map_err(sled::transaction::ConflictableTransactionError::Abort)?;
                    tx_index.remove(old_index_key.as_bytes())?;
                }

                tx_docs.insert(key.as_bytes(), value.as_slice())?;
                tx_index.insert(index_key.as_bytes(), &[] as &[u8])?;
                Ok(())
            })
            .map_err(map_transaction_error)?;

        Ok(())
    }

    pub fn get_booking(&self, booking_id: &str) -> Result<Option<Booking>, StoreError> {
        let key = keys::booking_key(booking_id)?;
        match self.bookings.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn count_bookings(&self) -> usize {
        self.bookings.len()
    }
}

impl BookingStore for Store {
    fn query_bookings_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<BookingRef>, StoreError> {
        let bound = keys::booking_date_index_bound(cutoff.timestamp_millis());
        let mut expired = Vec::new();

        for item in self.bookings_by_date.range(..bound.as_bytes()) {
            let (k, _) = item?;
            let Some((timestamp_ms, id)) = keys::parse_booking_date_index_key(&k) else {
                tracing::warn!(
                    key = %String::from_utf8_lossy(&k),
                    "Skipping malformed booking date index key"
                );
                continue;
            };
            let Some(darshan_date) = DateTime::from_timestamp_millis(timestamp_ms) else {
                continue;
            };
            expired.push(BookingRef { id, darshan_date });
        }

        Ok(expired)
    }

    fn commit_deletes(&self, batch: DeleteBatch) -> Result<usize, StoreError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut targets = Vec::with_capacity(batch.len());
        for target in &batch.targets {
            let key = keys::booking_key(&target.id)?;
            let index_key =
                keys::booking_date_index_key(target.darshan_date.timestamp_millis(), &target.id)?;
            targets.push((key, index_key, target.darshan_date.timestamp_millis()));
        }

        (&self.bookings, &self.bookings_by_date)
            .transaction(|(tx_docs, tx_index)| {
                let mut removed = 0usize;
                for (key, index_key, expected_ms) in &targets {
                    let Some(raw) = tx_docs.get(key.as_bytes())? else {
                        // Already gone, possibly by an overlapping run.
                        tx_index.remove(index_key.as_bytes())?;
                        continue;
                    };
                    let current: DatedDocument = serde_json::from_slice(&raw).map_err(|error| {
                        sled::transaction::ConflictableTransactionError::Abort(
                            StoreError::Serialization(error),
                        )
                    })?;
                    // Rescheduled after the query ran; no longer ours to delete.
                    if current.darshan_date.timestamp_millis() != *expected_ms {
                        continue;
                    }
                    tx_docs.remove(key.as_bytes())?;
                    tx_index.remove(index_key.as_bytes())?;
                    removed += 1;
                }
                Ok(removed)
            })
            .map_err(map_transaction_error)
    }
}
