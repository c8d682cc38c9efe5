//! The data-access seam. [`PgStore`] talks to Postgres under row-level
//! security; [`MemoryStore`] evaluates the same policies in-process.

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Booking, BookingRequest, BookingStatus, Caller, ModelError, NewServiceArea, NewSlot, NurseProfileRow,
    NurseServiceArea, NurseSlot, PatientDetails, Profile, ProfileCounts, ProfileDetails, ServiceArea,
};
use crate::schema::functions::{INVALID_TRANSITION_CODE, SLOT_UNAVAILABLE_CODE};

pub mod memory;
pub mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Missing, or hidden from the caller; the two are indistinguishable.
    #[error("not found")]
    NotFound,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("slot {0} is not available")]
    SlotUnavailable(Uuid),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    /// Maps a driver error onto the store's vocabulary by SQLSTATE.
    pub fn from_db(err: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = err {
            return StoreError::NotFound;
        }
        let (code, message) = match &err {
            sqlx::Error::Database(db) => (db.code().map(|c| c.into_owned()), db.message().to_string()),
            _ => (None, String::new()),
        };
        match code.as_deref() {
            Some("P0002") => StoreError::NotFound,
            Some("42501") => StoreError::Forbidden(message),
            Some(c) if c.starts_with("23") || c == INVALID_TRANSITION_CODE => StoreError::Constraint(message),
            _ => StoreError::Database(err),
        }
    }

    /// Like [`StoreError::from_db`], with the booking race reported for `slot_id`.
    pub fn from_booking(err: sqlx::Error, slot_id: Uuid) -> Self {
        let lost_race = matches!(&err, sqlx::Error::Database(db) if db.code().as_deref() == Some(SLOT_UNAVAILABLE_CODE));
        if lost_race {
            return StoreError::SlotUnavailable(slot_id);
        }
        StoreError::from_db(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Everything the booking backend reads and writes, always on behalf of a
/// [`Caller`] whose row-level policies apply.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Inserts the base row and its role extension together.
    async fn create_profile(&self, caller: &Caller, profile: &Profile) -> StoreResult<()>;

    /// Adds an extension row to an existing profile. Fails with
    /// `Constraint` when the details are for the other role.
    async fn attach_details(&self, caller: &Caller, id: Uuid, details: &ProfileDetails) -> StoreResult<()>;

    async fn get_profile(&self, caller: &Caller, id: Uuid) -> StoreResult<Profile>;

    async fn patient_details(&self, caller: &Caller, id: Uuid) -> StoreResult<PatientDetails>;

    async fn update_contact(
        &self,
        caller: &Caller,
        id: Uuid,
        phone: Option<String>,
        address: Option<String>,
    ) -> StoreResult<()>;

    /// Administrative removal; cascades to every dependent row.
    async fn delete_profile(&self, caller: &Caller, id: Uuid) -> StoreResult<()>;

    async fn list_nurses(&self, caller: &Caller) -> StoreResult<Vec<NurseProfileRow>>;

    async fn upsert_service_area(&self, caller: &Caller, area: &NewServiceArea) -> StoreResult<ServiceArea>;

    async fn list_service_areas(&self, caller: &Caller, pincode: Option<&str>) -> StoreResult<Vec<ServiceArea>>;

    async fn add_nurse_area(&self, caller: &Caller, nurse_id: Uuid, pincode: &str) -> StoreResult<NurseServiceArea>;

    async fn list_nurse_areas(&self, caller: &Caller, nurse_id: Option<Uuid>) -> StoreResult<Vec<NurseServiceArea>>;

    async fn create_slot(&self, caller: &Caller, slot: &NewSlot) -> StoreResult<NurseSlot>;

    async fn list_slots(&self, caller: &Caller, nurse_id: Uuid, date: Option<NaiveDate>) -> StoreResult<Vec<NurseSlot>>;

    /// Reserves an available slot for the calling patient. Of any number of
    /// concurrent requests for one slot exactly one succeeds; the rest get
    /// `SlotUnavailable`.
    async fn book_slot(&self, caller: &Caller, request: &BookingRequest) -> StoreResult<Booking>;

    async fn get_booking(&self, caller: &Caller, id: Uuid) -> StoreResult<Booking>;

    async fn set_booking_status(&self, caller: &Caller, id: Uuid, status: BookingStatus) -> StoreResult<Booking>;

    /// Replaces the free-text notes on a booking. Either party may do this;
    /// status only moves through `set_booking_status`.
    async fn update_booking_notes(&self, caller: &Caller, id: Uuid, notes: Option<String>) -> StoreResult<Booking>;

    async fn list_bookings(&self, caller: &Caller) -> StoreResult<Vec<Booking>>;

    async fn profile_counts(&self, caller: &Caller) -> StoreResult<ProfileCounts>;
}

/// The patient identity behind a booking request, if the caller has one.
pub(crate) fn booking_identity(caller: &Caller) -> StoreResult<Uuid> {
    caller
        .identity()
        .ok_or_else(|| StoreError::Forbidden("booking requires a signed-in patient".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(StoreError::from_db(sqlx::Error::RowNotFound), StoreError::NotFound));
    }

    #[test]
    fn other_driver_errors_pass_through() {
        assert!(matches!(StoreError::from_db(sqlx::Error::PoolTimedOut), StoreError::Database(_)));
        assert!(matches!(
            StoreError::from_booking(sqlx::Error::PoolTimedOut, Uuid::nil()),
            StoreError::Database(_)
        ));
    }

    #[test]
    fn anonymous_callers_cannot_book() {
        assert!(matches!(booking_identity(&Caller::Anonymous), Err(StoreError::Forbidden(_))));
        assert!(matches!(booking_identity(&Caller::Service), Err(StoreError::Forbidden(_))));
    }
}
