use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use tempfile::TempDir;

use booking_reaper::config::ReaperConfig;
use booking_reaper::cutoff::CutoffZone;
use booking_reaper::store::operations::bookings::Booking;
use booking_reaper::store::Store;

pub fn setup_store(db_name: &str) -> (TempDir, Arc<Store>) {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let db_path = temp_dir.path().join(db_name);
    let store = Arc::new(Store::open(db_path.to_str().expect("db path")).expect("open store"));
    (temp_dir, store)
}

pub fn reaper_config_at(offset_secs: i32) -> ReaperConfig {
    ReaperConfig {
        timezone: CutoffZone::Fixed(FixedOffset::east_opt(offset_secs).expect("offset")),
        ..ReaperConfig::default()
    }
}

/// Inserts a booking with a random id and a couple of producer-owned attributes.
pub fn seed_booking(store: &Store, darshan_date: DateTime<Utc>) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    let mut booking = Booking::new(id.clone(), darshan_date);
    booking
        .attributes
        .insert("devoteeName".into(), serde_json::json!("Test Devotee"));
    booking
        .attributes
        .insert("partySize".into(), serde_json::json!(2));
    store.put_booking(&booking).expect("put booking");
    id
}
