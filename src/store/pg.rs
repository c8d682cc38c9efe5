use async_trait::async_trait;
use chrono::NaiveDate;
use log::debug;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::{booking_identity, BookingStore, StoreError, StoreResult};
use crate::db::{self, bookings, profiles, service_areas, slots, stats};
use crate::db::profiles::OnConflict;
use crate::models::{
    Booking, BookingRequest, BookingStatus, Caller, ModelError, NewServiceArea, NewSlot, NurseProfileRow,
    NurseServiceArea, NurseSlot, PatientDetails, Profile, ProfileCounts, ProfileDetails, ServiceArea,
};
use crate::schema::functions::INVALID_TRANSITION_CODE;

/// Postgres-backed store. Each call runs in its own transaction opened as
/// the caller, so the database's policies decide what is visible.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        PgStore { pool }
    }
}

#[async_trait]
impl BookingStore for PgStore {
    async fn create_profile(&self, caller: &Caller, profile: &Profile) -> StoreResult<()> {
        profile.validate()?;
        let mut tx = db::begin_as(&self.pool, caller).await.map_err(StoreError::from_db)?;
        profiles::insert_profile(&mut tx, profile, OnConflict::Fail)
            .await
            .map_err(StoreError::from_db)?;
        profiles::insert_details(&mut tx, profile.id, &profile.details, OnConflict::Fail)
            .await
            .map_err(StoreError::from_db)?;
        tx.commit().await.map_err(StoreError::from_db)?;
        debug!("Created {} profile {}", profile.role(), profile.id);
        Ok(())
    }

    async fn attach_details(&self, caller: &Caller, id: Uuid, details: &ProfileDetails) -> StoreResult<()> {
        let mut tx = db::begin_as(&self.pool, caller).await.map_err(StoreError::from_db)?;
        profiles::insert_details(&mut tx, id, details, OnConflict::Fail)
            .await
            .map_err(StoreError::from_db)?;
        tx.commit().await.map_err(StoreError::from_db)
    }

    async fn get_profile(&self, caller: &Caller, id: Uuid) -> StoreResult<Profile> {
        let mut tx = db::begin_as(&self.pool, caller).await.map_err(StoreError::from_db)?;
        let base = profiles::get_profile_row(&mut tx, id)
            .await
            .map_err(StoreError::from_db)?
            .ok_or(StoreError::NotFound)?;
        let patient = profiles::get_patient_row(&mut tx, id).await.map_err(StoreError::from_db)?;
        let nurse = profiles::get_nurse_row(&mut tx, id).await.map_err(StoreError::from_db)?;
        tx.commit().await.map_err(StoreError::from_db)?;
        Ok(Profile::assemble(base, patient, nurse)?)
    }

    async fn patient_details(&self, caller: &Caller, id: Uuid) -> StoreResult<PatientDetails> {
        let mut tx = db::begin_as(&self.pool, caller).await.map_err(StoreError::from_db)?;
        let row = profiles::get_patient_row(&mut tx, id).await.map_err(StoreError::from_db)?;
        tx.commit().await.map_err(StoreError::from_db)?;
        row.map(|r| r.details).ok_or(StoreError::NotFound)
    }

    async fn update_contact(
        &self,
        caller: &Caller,
        id: Uuid,
        phone: Option<String>,
        address: Option<String>,
    ) -> StoreResult<()> {
        let mut tx = db::begin_as(&self.pool, caller).await.map_err(StoreError::from_db)?;
        let rows = profiles::update_contact(&mut tx, id, phone.as_deref(), address.as_deref())
            .await
            .map_err(StoreError::from_db)?;
        tx.commit().await.map_err(StoreError::from_db)?;
        if rows == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_profile(&self, caller: &Caller, id: Uuid) -> StoreResult<()> {
        if !caller.bypasses_policies() {
            return Err(StoreError::Forbidden("profiles are removed through the service path".to_string()));
        }
        let mut tx = db::begin_as(&self.pool, caller).await.map_err(StoreError::from_db)?;
        let rows = profiles::delete_profile(&mut tx, id).await.map_err(StoreError::from_db)?;
        tx.commit().await.map_err(StoreError::from_db)?;
        if rows == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_nurses(&self, caller: &Caller) -> StoreResult<Vec<NurseProfileRow>> {
        let mut tx = db::begin_as(&self.pool, caller).await.map_err(StoreError::from_db)?;
        let rows = profiles::list_nurse_rows(&mut tx).await.map_err(StoreError::from_db)?;
        tx.commit().await.map_err(StoreError::from_db)?;
        Ok(rows)
    }

    async fn upsert_service_area(&self, caller: &Caller, area: &NewServiceArea) -> StoreResult<ServiceArea> {
        let mut tx = db::begin_as(&self.pool, caller).await.map_err(StoreError::from_db)?;
        let row = service_areas::upsert_service_area(&mut tx, area)
            .await
            .map_err(StoreError::from_db)?;
        tx.commit().await.map_err(StoreError::from_db)?;
        Ok(row)
    }

    async fn list_service_areas(&self, caller: &Caller, pincode: Option<&str>) -> StoreResult<Vec<ServiceArea>> {
        let mut tx = db::begin_as(&self.pool, caller).await.map_err(StoreError::from_db)?;
        let rows = service_areas::list_service_areas(&mut tx, pincode)
            .await
            .map_err(StoreError::from_db)?;
        tx.commit().await.map_err(StoreError::from_db)?;
        Ok(rows)
    }

    async fn add_nurse_area(&self, caller: &Caller, nurse_id: Uuid, pincode: &str) -> StoreResult<NurseServiceArea> {
        let mut tx = db::begin_as(&self.pool, caller).await.map_err(StoreError::from_db)?;
        let row = service_areas::insert_nurse_area(&mut tx, nurse_id, pincode)
            .await
            .map_err(StoreError::from_db)?;
        tx.commit().await.map_err(StoreError::from_db)?;
        Ok(row)
    }

    async fn list_nurse_areas(&self, caller: &Caller, nurse_id: Option<Uuid>) -> StoreResult<Vec<NurseServiceArea>> {
        let mut tx = db::begin_as(&self.pool, caller).await.map_err(StoreError::from_db)?;
        let rows = service_areas::list_nurse_areas(&mut tx, nurse_id)
            .await
            .map_err(StoreError::from_db)?;
        tx.commit().await.map_err(StoreError::from_db)?;
        Ok(rows)
    }

    async fn create_slot(&self, caller: &Caller, slot: &NewSlot) -> StoreResult<NurseSlot> {
        slot.validate()?;
        let mut tx = db::begin_as(&self.pool, caller).await.map_err(StoreError::from_db)?;
        let row = slots::insert_slot(&mut tx, slot).await.map_err(StoreError::from_db)?;
        tx.commit().await.map_err(StoreError::from_db)?;
        Ok(row)
    }

    async fn list_slots(&self, caller: &Caller, nurse_id: Uuid, date: Option<NaiveDate>) -> StoreResult<Vec<NurseSlot>> {
        let mut tx = db::begin_as(&self.pool, caller).await.map_err(StoreError::from_db)?;
        let rows = slots::list_slots(&mut tx, nurse_id, date).await.map_err(StoreError::from_db)?;
        tx.commit().await.map_err(StoreError::from_db)?;
        Ok(rows)
    }

    async fn book_slot(&self, caller: &Caller, request: &BookingRequest) -> StoreResult<Booking> {
        booking_identity(caller)?;
        let mut tx = db::begin_as(&self.pool, caller).await.map_err(StoreError::from_db)?;
        let booking = bookings::book_slot(&mut tx, request)
            .await
            .map_err(|e| StoreError::from_booking(e, request.slot_id))?;
        tx.commit().await.map_err(StoreError::from_db)?;
        Ok(booking)
    }

    async fn get_booking(&self, caller: &Caller, id: Uuid) -> StoreResult<Booking> {
        let mut tx = db::begin_as(&self.pool, caller).await.map_err(StoreError::from_db)?;
        let row = bookings::get_booking(&mut tx, id).await.map_err(StoreError::from_db)?;
        tx.commit().await.map_err(StoreError::from_db)?;
        row.ok_or(StoreError::NotFound)
    }

    async fn set_booking_status(&self, caller: &Caller, id: Uuid, status: BookingStatus) -> StoreResult<Booking> {
        let mut tx = db::begin_as(&self.pool, caller).await.map_err(StoreError::from_db)?;
        let current = bookings::get_booking(&mut tx, id)
            .await
            .map_err(StoreError::from_db)?
            .ok_or(StoreError::NotFound)?;
        current.status.transition(status)?;
        let booking = bookings::set_booking_status(&mut tx, id, status).await.map_err(|e| {
            let raced = matches!(&e, sqlx::Error::Database(db) if db.code().as_deref() == Some(INVALID_TRANSITION_CODE));
            // Another writer moved the booking between our read and the update.
            if raced {
                StoreError::Model(ModelError::InvalidTransition { from: current.status, to: status })
            } else {
                StoreError::from_db(e)
            }
        })?;
        tx.commit().await.map_err(StoreError::from_db)?;
        Ok(booking)
    }

    async fn update_booking_notes(&self, caller: &Caller, id: Uuid, notes: Option<String>) -> StoreResult<Booking> {
        let mut tx = db::begin_as(&self.pool, caller).await.map_err(StoreError::from_db)?;
        let row = bookings::update_notes(&mut tx, id, notes.as_deref()).await.map_err(StoreError::from_db)?;
        tx.commit().await.map_err(StoreError::from_db)?;
        row.ok_or(StoreError::NotFound)
    }

    async fn list_bookings(&self, caller: &Caller) -> StoreResult<Vec<Booking>> {
        let mut tx = db::begin_as(&self.pool, caller).await.map_err(StoreError::from_db)?;
        let rows = bookings::list_bookings(&mut tx).await.map_err(StoreError::from_db)?;
        tx.commit().await.map_err(StoreError::from_db)?;
        Ok(rows)
    }

    async fn profile_counts(&self, caller: &Caller) -> StoreResult<ProfileCounts> {
        let mut tx = db::begin_as(&self.pool, caller).await.map_err(StoreError::from_db)?;
        let counts = stats::profile_counts(&mut tx).await.map_err(StoreError::from_db)?;
        tx.commit().await.map_err(StoreError::from_db)?;
        Ok(counts)
    }
}
