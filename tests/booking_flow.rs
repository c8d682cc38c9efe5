use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use nurse_booking::models::{
    BookingRequest, BookingStatus, Caller, ModelError, NewSlot, NurseDetails, PatientDetails, Profile, SlotStatus,
};
use nurse_booking::services::BookingService;
use nurse_booking::store::{BookingStore, MemoryStore, StoreError};
use uuid::Uuid;

struct Fixture {
    service: BookingService<MemoryStore>,
    nurse: Caller,
    nurse_id: Uuid,
    patient: Caller,
}

fn at(h: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, 0, 0).unwrap()
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 11, 2).unwrap()
}

async fn add_patient(store: &MemoryStore) -> Caller {
    let id = Uuid::new_v4();
    let caller = Caller::Authenticated(id);
    store
        .create_profile(&caller, &Profile::patient(id, "Kavya Rao", PatientDetails::default()))
        .await
        .unwrap();
    caller
}

async fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let nurse_id = Uuid::new_v4();
    let nurse = Caller::Authenticated(nurse_id);
    let details = NurseDetails {
        qualification: "BSc Nursing".into(),
        experience_years: 8,
        specializations: vec!["Palliative care".into()],
        languages: vec!["Tamil".into(), "English".into()],
    };
    store.create_profile(&nurse, &Profile::nurse(nurse_id, "Lakshmi Pillai", details)).await.unwrap();
    let patient = add_patient(&store).await;
    Fixture { service: BookingService::new(store), nurse, nurse_id, patient }
}

fn request(slot_id: Uuid) -> BookingRequest {
    BookingRequest { slot_id, service_id: "injection".into(), notes: Some("Ring the bell twice".into()) }
}

impl Fixture {
    async fn open_slot(&self, hour: u32) -> Uuid {
        let slots = self.service.open_day(&self.nurse, self.nurse_id, day(), &[at(hour)]).await.unwrap();
        slots[0].id
    }

    async fn slot_status(&self, slot_id: Uuid) -> SlotStatus {
        let slots = self.service.store().list_slots(&self.nurse, self.nurse_id, Some(day())).await.unwrap();
        slots.into_iter().find(|s| s.id == slot_id).map(|s| s.status).unwrap()
    }
}

#[tokio::test]
async fn ninety_minute_slot_is_rejected() {
    let f = fixture().await;
    let slot = NewSlot {
        nurse_id: f.nurse_id,
        date: day(),
        start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
    };
    let err = f.service.store().create_slot(&f.nurse, &slot).await;
    assert!(matches!(err, Err(StoreError::Model(ModelError::SlotDuration(5400)))));
}

#[tokio::test]
async fn slots_belong_to_their_nurse() {
    let f = fixture().await;
    let err = f.service.open_day(&f.patient, f.nurse_id, day(), &[at(9)]).await;
    assert!(matches!(err, Err(StoreError::Forbidden(_))));

    let opened = f.service.open_day(&f.nurse, f.nurse_id, day(), &[at(9), at(10), at(11)]).await.unwrap();
    assert_eq!(opened.len(), 3);
    assert!(opened.iter().all(|s| (s.end_time - s.start_time).num_seconds() == 3600));

    let visible = f.service.store().list_slots(&f.patient, f.nurse_id, Some(day())).await.unwrap();
    assert_eq!(visible.iter().map(|s| s.start_time).collect::<Vec<_>>(), vec![at(9), at(10), at(11)]);
}

#[tokio::test]
async fn nurse_cannot_book() {
    let f = fixture().await;
    let slot_id = f.open_slot(9).await;
    assert!(matches!(f.service.book(&f.nurse, &request(slot_id)).await, Err(StoreError::Forbidden(_))));
    assert!(matches!(f.service.book(&Caller::Anonymous, &request(slot_id)).await, Err(StoreError::Forbidden(_))));
    assert_eq!(f.slot_status(slot_id).await, SlotStatus::Available);
}

#[tokio::test]
async fn booking_is_visible_to_both_parties_only() {
    let f = fixture().await;
    let slot_id = f.open_slot(9).await;
    let booking = f.service.book(&f.patient, &request(slot_id)).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.nurse_id, f.nurse_id);
    assert_eq!(f.slot_status(slot_id).await, SlotStatus::Booked);

    let store = f.service.store();
    assert_eq!(store.get_booking(&f.patient, booking.id).await.unwrap(), booking);
    assert_eq!(store.list_bookings(&f.nurse).await.unwrap(), vec![booking.clone()]);

    let stranger = add_patient(store).await;
    assert!(matches!(store.get_booking(&stranger, booking.id).await, Err(StoreError::NotFound)));
    assert!(store.list_bookings(&stranger).await.unwrap().is_empty());
}

#[tokio::test]
async fn racing_bookings_have_exactly_one_winner() {
    let f = fixture().await;
    let slot_id = f.open_slot(14).await;

    let mut patients = Vec::new();
    for _ in 0..8 {
        patients.push(add_patient(f.service.store()).await);
    }

    let handles: Vec<_> = patients
        .into_iter()
        .map(|patient| {
            let service = f.service.clone();
            tokio::spawn(async move { service.book(&patient, &request(slot_id)).await })
        })
        .collect();

    let mut won = 0;
    let mut lost = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(StoreError::SlotUnavailable(id)) => {
                assert_eq!(id, slot_id);
                lost += 1;
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!((won, lost), (1, 7));
}

#[tokio::test]
async fn confirm_and_complete_are_for_the_nurse() {
    let f = fixture().await;
    let slot_id = f.open_slot(10).await;
    let booking = f.service.book(&f.patient, &request(slot_id)).await.unwrap();

    assert!(matches!(f.service.confirm(&f.patient, booking.id).await, Err(StoreError::Forbidden(_))));
    assert_eq!(f.service.confirm(&f.nurse, booking.id).await.unwrap().status, BookingStatus::Confirmed);
    assert!(matches!(f.service.complete(&f.patient, booking.id).await, Err(StoreError::Forbidden(_))));

    let done = f.service.complete(&f.nurse, booking.id).await.unwrap();
    assert_eq!(done.status, BookingStatus::Completed);
    assert_eq!(f.slot_status(slot_id).await, SlotStatus::Completed);

    let err = f.service.cancel(&f.patient, booking.id).await;
    assert!(matches!(err, Err(StoreError::Model(ModelError::InvalidTransition { .. }))));
}

#[tokio::test]
async fn cancelling_releases_the_slot() {
    let f = fixture().await;
    let slot_id = f.open_slot(11).await;
    let first = f.service.book(&f.patient, &request(slot_id)).await.unwrap();

    let other = add_patient(f.service.store()).await;
    assert!(matches!(f.service.book(&other, &request(slot_id)).await, Err(StoreError::SlotUnavailable(_))));

    let cancelled = f.service.cancel(&f.patient, first.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(f.slot_status(slot_id).await, SlotStatus::Available);

    let second = f.service.book(&other, &request(slot_id)).await.unwrap();
    assert_ne!(second.id, first.id);
}

#[tokio::test]
async fn strangers_cannot_touch_a_booking() {
    let f = fixture().await;
    let slot_id = f.open_slot(12).await;
    let booking = f.service.book(&f.patient, &request(slot_id)).await.unwrap();
    let stranger = add_patient(f.service.store()).await;
    assert!(matches!(f.service.cancel(&stranger, booking.id).await, Err(StoreError::NotFound)));
    assert!(matches!(f.service.cancel(&Caller::Service, booking.id).await, Err(StoreError::NotFound)));
}

#[tokio::test]
async fn deleting_a_patient_cascades_to_bookings() {
    let f = fixture().await;
    let slot_id = f.open_slot(15).await;
    let booking = f.service.book(&f.patient, &request(slot_id)).await.unwrap();
    let store = f.service.store();

    store.delete_profile(&Caller::Service, booking.patient_id).await.unwrap();
    assert!(matches!(store.get_booking(&f.nurse, booking.id).await, Err(StoreError::NotFound)));
    assert!(store.list_bookings(&Caller::Service).await.unwrap().is_empty());
    assert_eq!(store.profile_counts(&Caller::Service).await.unwrap().patients, 0);
}

#[tokio::test]
async fn deleting_a_nurse_removes_their_slots() {
    let f = fixture().await;
    f.open_slot(16).await;
    let store = f.service.store();
    store.delete_profile(&Caller::Service, f.nurse_id).await.unwrap();
    assert!(store.list_slots(&Caller::Service, f.nurse_id, None).await.unwrap().is_empty());
    assert!(store.list_nurses(&f.patient).await.unwrap().is_empty());
}

#[tokio::test]
async fn either_party_may_edit_notes_but_not_status() {
    let f = fixture().await;
    let slot_id = f.open_slot(17).await;
    let booking = f.service.book(&f.patient, &request(slot_id)).await.unwrap();
    let store = f.service.store();

    let noted = store.update_booking_notes(&f.nurse, booking.id, Some("Bring a BP cuff".into())).await.unwrap();
    assert_eq!(noted.notes.as_deref(), Some("Bring a BP cuff"));
    assert_eq!(noted.status, BookingStatus::Pending);

    let cleared = store.update_booking_notes(&f.patient, booking.id, None).await.unwrap();
    assert_eq!(cleared.notes, None);

    let stranger = add_patient(store).await;
    assert!(matches!(store.update_booking_notes(&stranger, booking.id, None).await, Err(StoreError::NotFound)));
    assert!(matches!(
        store.update_booking_notes(&Caller::Anonymous, booking.id, None).await,
        Err(StoreError::NotFound)
    ));
}
