use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, NaiveTime};
use log::{info, warn};
use metrics::{counter, histogram};
use uuid::Uuid;

use crate::models::{Booking, BookingRequest, BookingStatus, Caller, NewSlot, NurseSlot};
use crate::store::{BookingStore, StoreError, StoreResult};

/// Booking workflow on top of a [`BookingStore`], with counters for what
/// happened to each request.
pub struct BookingService<S: BookingStore> {
    store: Arc<S>,
}

impl<S: BookingStore> Clone for BookingService<S> {
    fn clone(&self) -> Self {
        BookingService { store: Arc::clone(&self.store) }
    }
}

impl<S: BookingStore> BookingService<S> {
    pub fn new(store: Arc<S>) -> Self {
        BookingService { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn book(&self, caller: &Caller, request: &BookingRequest) -> StoreResult<Booking> {
        let start_time = Instant::now();
        let result = self.store.book_slot(caller, request).await;
        histogram!("booking_request_seconds").record(start_time.elapsed().as_secs_f64());

        match &result {
            Ok(booking) => {
                counter!("bookings_created_total").increment(1);
                info!("Booking {} reserved slot {} with nurse {}", booking.id, booking.slot_id, booking.nurse_id);
            }
            Err(StoreError::SlotUnavailable(slot_id)) => {
                counter!("booking_conflicts_total").increment(1);
                warn!("Slot {} was already taken", slot_id);
            }
            Err(e) => warn!("Booking of slot {} failed: {}", request.slot_id, e),
        }
        result
    }

    pub async fn transition(&self, caller: &Caller, booking_id: Uuid, status: BookingStatus) -> StoreResult<Booking> {
        let booking = self.store.set_booking_status(caller, booking_id, status).await?;
        counter!("booking_transitions_total", "status" => status.as_str()).increment(1);
        info!("Booking {} is now {}", booking.id, booking.status);
        Ok(booking)
    }

    pub async fn confirm(&self, caller: &Caller, booking_id: Uuid) -> StoreResult<Booking> {
        self.transition(caller, booking_id, BookingStatus::Confirmed).await
    }

    pub async fn complete(&self, caller: &Caller, booking_id: Uuid) -> StoreResult<Booking> {
        self.transition(caller, booking_id, BookingStatus::Completed).await
    }

    pub async fn cancel(&self, caller: &Caller, booking_id: Uuid) -> StoreResult<Booking> {
        self.transition(caller, booking_id, BookingStatus::Cancelled).await
    }

    /// Publishes one-hour slots for a nurse's day, one per start time.
    /// Stops at the first failure; slots created before it are kept.
    pub async fn open_day(
        &self,
        caller: &Caller,
        nurse_id: Uuid,
        date: NaiveDate,
        starts: &[NaiveTime],
    ) -> StoreResult<Vec<NurseSlot>> {
        let mut created = Vec::with_capacity(starts.len());
        for start in starts {
            let slot = NewSlot::one_hour(nurse_id, date, *start)?;
            created.push(self.store.create_slot(caller, &slot).await?);
        }
        info!("Opened {} slots for nurse {} on {}", created.len(), nurse_id, date);
        Ok(created)
    }
}
