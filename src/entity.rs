//! Shared shape of the records kept by an [`EntityStore`](crate::store::EntityStore).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// Identity of a task or user; assigned from a per-kind counter, never reused.
pub type EntityId = u64;

/// A record kind owned by one entity store.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Payload for `create`
    type Create;
    /// Payload for `update`; carries the id of the record to replace
    type Update;

    /// Human-readable kind ("task", "user")
    const KIND: &'static str;
    /// Key holding the serialized collection
    const COLLECTION_KEY: &'static str;
    /// Key holding the next id counter
    const NEXT_ID_KEY: &'static str;

    fn id(&self) -> EntityId;

    /// Build a new record. String fields are trimmed here.
    fn from_create(id: EntityId, request: &Self::Create, now: DateTime<Utc>) -> Self;

    fn update_id(request: &Self::Update) -> EntityId;

    /// Apply an update in place and refresh the modification stamp.
    fn apply_update(&mut self, request: &Self::Update, now: DateTime<Utc>);

    fn touch(&mut self, now: DateTime<Utc>);

    /// Validation message for a create payload, `None` when valid
    fn check_create(request: &Self::Create) -> Option<String>;

    /// Validation message for an update payload, `None` when valid
    fn check_update(request: &Self::Update) -> Option<String>;

    /// Why this record cannot be deleted right now, if anything
    fn delete_blocker(&self) -> Option<String> {
        None
    }

    /// Demo records used when nothing is stored yet
    fn seed() -> Vec<Self>;
}

/// Midnight UTC on the given day; epoch if the date is invalid.
pub(crate) fn seed_date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or_default()
}

/// True when the text is non-empty after trimming
pub(crate) fn has_text(value: &str) -> bool {
    !value.trim().is_empty()
}
