//! Runs the store against a real Postgres. Each test returns early unless
//! `DATABASE_URL` points at a disposable database: the schema is migrated
//! with reset allowed and the auth scaffolding bootstrapped.

use chrono::{NaiveDate, NaiveTime};
use nurse_booking::db::{self, profiles};
use nurse_booking::models::{
    BookingRequest, BookingStatus, Caller, NurseDetails, PatientDetails, Profile, SlotStatus,
};
use nurse_booking::schema::{self, PlanAction, PlanOptions};
use nurse_booking::services::BookingService;
use nurse_booking::store::{BookingStore, PgStore, StoreError};
use sqlx::{Pool, Postgres};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Tests share one database and some of them alter its catalog.
static SERIAL: Mutex<()> = Mutex::const_new(());

fn options() -> PlanOptions {
    PlanOptions { allow_reset: true, auth_bootstrap: true }
}

async fn database() -> Option<Pool<Postgres>> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set; skipping");
            return None;
        }
    };
    let pool = db::init_pool(&url, 12).await.expect("connect");
    schema::apply(&pool, &options()).await.expect("migrate");
    Some(pool)
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 11, 2).unwrap()
}

fn at(h: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, 0, 0).unwrap()
}

async fn sign_up(pool: &Pool<Postgres>, store: &PgStore, profile: Profile) -> Caller {
    let mut conn = pool.acquire().await.unwrap();
    profiles::insert_identity(&mut *conn, profile.id, &format!("{}@example.test", profile.id))
        .await
        .unwrap();
    let caller = Caller::Authenticated(profile.id);
    store.create_profile(&caller, &profile).await.unwrap();
    caller
}

async fn new_patient(pool: &Pool<Postgres>, store: &PgStore) -> (Uuid, Caller) {
    let id = Uuid::new_v4();
    let details = PatientDetails { allergies: vec!["Penicillin".into()], ..Default::default() };
    (id, sign_up(pool, store, Profile::patient(id, "Farah Khan", details)).await)
}

async fn new_nurse(pool: &Pool<Postgres>, store: &PgStore) -> (Uuid, Caller) {
    let id = Uuid::new_v4();
    let details = NurseDetails {
        qualification: "BSc Nursing".into(),
        experience_years: 5,
        specializations: vec!["Geriatric care".into()],
        languages: vec!["Kannada".into()],
    };
    (id, sign_up(pool, store, Profile::nurse(id, "Rekha Nair", details)).await)
}

fn request(slot_id: Uuid) -> BookingRequest {
    BookingRequest { slot_id, service_id: "injection".into(), notes: None }
}

/// Runs `sql` bound to `id` inside a transaction scoped to `caller`.
async fn execute_as(pool: &Pool<Postgres>, caller: &Caller, sql: &str, id: Uuid) -> Result<u64, StoreError> {
    let mut tx = db::begin_as(pool, caller).await.map_err(StoreError::from_db)?;
    let rows = sqlx::query(sql)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from_db)?
        .rows_affected();
    tx.commit().await.map_err(StoreError::from_db)?;
    Ok(rows)
}

#[tokio::test]
async fn migrating_again_changes_nothing() {
    let _serial = SERIAL.lock().await;
    let Some(pool) = database().await else { return };

    let again = schema::apply(&pool, &options()).await.unwrap();
    assert_eq!(again.action, PlanAction::Noop);
    // Only the idempotent auth scaffolding runs.
    assert_eq!(again.statements(), schema::bootstrap::statements());
}

#[tokio::test]
async fn out_of_band_policy_changes_are_repaired() {
    let _serial = SERIAL.lock().await;
    let Some(pool) = database().await else { return };
    let store = PgStore::new(pool.clone());
    let (a, _) = new_patient(&pool, &store).await;
    let (_, b) = new_patient(&pool, &store).await;

    sqlx::raw_sql(
        "ALTER TABLE public.patient_profiles DISABLE ROW LEVEL SECURITY; \
         ALTER POLICY \"profiles_select_own\" ON public.profiles USING (true); \
         ALTER POLICY \"bookings_select_party\" ON public.bookings USING (true);",
    )
        .execute(&pool)
        .await
        .unwrap();
    assert!(store.patient_details(&b, a).await.is_ok());

    let planned = schema::dry_run(&pool, &PlanOptions::default()).await.unwrap();
    assert_eq!(planned.action, PlanAction::Repair);

    let repaired = schema::apply(&pool, &PlanOptions { allow_reset: false, auth_bootstrap: true }).await.unwrap();
    assert_eq!(repaired.action, PlanAction::Repair);
    assert!(matches!(store.patient_details(&b, a).await, Err(StoreError::NotFound)));
    assert!(matches!(store.get_profile(&b, a).await, Err(StoreError::NotFound)));
    // Rows survive a repair.
    assert!(store.get_profile(&Caller::Service, a).await.is_ok());

    assert!(schema::apply(&pool, &options()).await.unwrap().is_noop());
}

#[tokio::test]
async fn racing_patients_get_one_booking() {
    let _serial = SERIAL.lock().await;
    let Some(pool) = database().await else { return };
    let store = PgStore::new(pool.clone());
    let (nurse_id, nurse) = new_nurse(&pool, &store).await;
    let mut patients = Vec::new();
    for _ in 0..8 {
        patients.push(new_patient(&pool, &store).await.1);
    }

    let service = BookingService::new(std::sync::Arc::new(store));
    let slot_id = service.open_day(&nurse, nurse_id, day(), &[at(9)]).await.unwrap()[0].id;

    let handles: Vec<_> = patients
        .into_iter()
        .map(|patient| {
            let service = service.clone();
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
    assert_eq!(service.store().list_bookings(&nurse).await.unwrap().len(), 1);
}

#[tokio::test]
async fn nurses_cannot_create_bookings() {
    let _serial = SERIAL.lock().await;
    let Some(pool) = database().await else { return };
    let store = PgStore::new(pool.clone());
    let (nurse_id, nurse) = new_nurse(&pool, &store).await;
    let (patient_id, _) = new_patient(&pool, &store).await;
    let slot = store
        .create_slot(
            &nurse,
            &nurse_booking::models::NewSlot { nurse_id, date: day(), start_time: at(10), end_time: at(11) },
        )
        .await
        .unwrap();

    assert!(matches!(store.book_slot(&nurse, &request(slot.id)).await, Err(StoreError::Forbidden(_))));

    let direct = format!(
        "INSERT INTO public.bookings (patient_id, nurse_id, slot_id, service_id) \
         VALUES ('{}', $1, '{}', 'injection')",
        patient_id, slot.id
    );
    assert!(matches!(execute_as(&pool, &nurse, &direct, nurse_id).await, Err(StoreError::Forbidden(_))));

    let slots = store.list_slots(&nurse, nurse_id, Some(day())).await.unwrap();
    assert_eq!(slots[0].status, SlotStatus::Available);
}

#[tokio::test]
async fn private_rows_stay_private() {
    let _serial = SERIAL.lock().await;
    let Some(pool) = database().await else { return };
    let store = PgStore::new(pool.clone());
    let (a, caller_a) = new_patient(&pool, &store).await;
    let (_, b) = new_patient(&pool, &store).await;
    new_nurse(&pool, &store).await;

    assert_eq!(store.patient_details(&caller_a, a).await.unwrap().allergies, vec!["Penicillin".to_string()]);
    assert!(matches!(store.patient_details(&b, a).await, Err(StoreError::NotFound)));
    assert!(matches!(store.get_profile(&b, a).await, Err(StoreError::NotFound)));

    // Visitors without a session see empty results, not permission errors.
    assert!(matches!(store.patient_details(&Caller::Anonymous, a).await, Err(StoreError::NotFound)));
    assert!(store.list_nurses(&Caller::Anonymous).await.unwrap().is_empty());
    assert!(store.list_nurse_areas(&Caller::Anonymous, None).await.unwrap().is_empty());
    assert!(store.list_bookings(&Caller::Anonymous).await.unwrap().is_empty());
    assert!(!store.list_nurses(&b).await.unwrap().is_empty());
}

#[tokio::test]
async fn booking_status_moves_only_through_transitions() {
    let _serial = SERIAL.lock().await;
    let Some(pool) = database().await else { return };
    let store = PgStore::new(pool.clone());
    let (nurse_id, nurse) = new_nurse(&pool, &store).await;
    let (_, patient) = new_patient(&pool, &store).await;
    let (_, stranger) = new_patient(&pool, &store).await;
    let service = BookingService::new(std::sync::Arc::new(store));
    let slot_id = service.open_day(&nurse, nurse_id, day(), &[at(13)]).await.unwrap()[0].id;
    let booking = service.book(&patient, &request(slot_id)).await.unwrap();

    let skip_ahead = "UPDATE public.bookings SET status = 'completed' WHERE id = $1";
    assert!(matches!(execute_as(&pool, &patient, skip_ahead, booking.id).await, Err(StoreError::Forbidden(_))));
    assert!(matches!(execute_as(&pool, &nurse, skip_ahead, booking.id).await, Err(StoreError::Forbidden(_))));

    let store = service.store();
    let noted = store.update_booking_notes(&patient, booking.id, Some("Gate code 4411".into())).await.unwrap();
    assert_eq!((noted.status, noted.notes.as_deref()), (BookingStatus::Pending, Some("Gate code 4411")));
    assert!(matches!(
        store.update_booking_notes(&stranger, booking.id, None).await,
        Err(StoreError::NotFound)
    ));

    assert_eq!(service.confirm(&nurse, booking.id).await.unwrap().status, BookingStatus::Confirmed);
    assert!(matches!(service.complete(&patient, booking.id).await, Err(StoreError::Forbidden(_))));
    assert_eq!(service.cancel(&patient, booking.id).await.unwrap().status, BookingStatus::Cancelled);

    let slots = store.list_slots(&nurse, nurse_id, Some(day())).await.unwrap();
    assert_eq!(slots[0].status, SlotStatus::Available);
}
