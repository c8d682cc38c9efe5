//! Demonstration identities: one patient and one nurse with full profiles.
//!
//! Every insert is keyed on the primary key and skips existing rows, so
//! running the seed again changes nothing.

use chrono::NaiveDate;
use log::info;
use serde::Serialize;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::db::profiles::{self, OnConflict};
use crate::models::{Caller, Gender, NurseDetails, PatientDetails, Profile};
use crate::store::{BookingStore, StoreError, StoreResult};

pub const DEMO_PATIENT_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_4000_8000_0000_0000_0001);
pub const DEMO_NURSE_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_4000_8000_0000_0000_0002);

#[derive(Debug, Clone)]
pub struct DemoIdentity {
    pub email: &'static str,
    pub profile: Profile,
}

/// Rows written by one seed run. All zeros on a repeat run.
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub identities: u64,
    pub profiles: u64,
    pub details: u64,
}

impl SeedReport {
    pub fn is_noop(&self) -> bool {
        *self == SeedReport::default()
    }
}

pub fn demo_identities() -> Vec<DemoIdentity> {
    let patient = Profile::patient(
        DEMO_PATIENT_ID,
        "Ravi Kumar",
        PatientDetails {
            date_of_birth: NaiveDate::from_ymd_opt(1958, 7, 21),
            gender: Some(Gender::Male),
            blood_group: Some("B+".to_string()),
            emergency_contact: Some("+91 98450 11223".to_string()),
            medical_conditions: vec!["Type 2 diabetes".to_string(), "Hypertension".to_string()],
            allergies: vec!["Penicillin".to_string()],
            current_medications: vec!["Metformin".to_string(), "Amlodipine".to_string()],
        },
    )
        .with_contact(Some("+91 98450 00001"), Some("12 MG Road, Bengaluru 560001"));

    let nurse = Profile::nurse(
        DEMO_NURSE_ID,
        "Priya Nair",
        NurseDetails {
            qualification: "BSc Nursing".to_string(),
            experience_years: 6,
            specializations: vec!["Elderly care".to_string(), "Wound care".to_string()],
            languages: vec!["English".to_string(), "Kannada".to_string(), "Malayalam".to_string()],
        },
    )
        .with_contact(Some("+91 98450 00002"), Some("48 Indiranagar, Bengaluru 560038"));

    vec![
        DemoIdentity { email: "patient@demo.local", profile: patient },
        DemoIdentity { email: "nurse@demo.local", profile: nurse },
    ]
}

/// Seeds the database through the privileged connection in one transaction.
pub async fn apply(pool: &Pool<Postgres>) -> Result<SeedReport, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut report = SeedReport::default();
    for demo in demo_identities() {
        let profile = &demo.profile;
        report.identities += profiles::insert_identity(&mut tx, profile.id, demo.email).await?;
        report.profiles += profiles::insert_profile(&mut tx, profile, OnConflict::Skip).await?;
        report.details += profiles::insert_details(&mut tx, profile.id, &profile.details, OnConflict::Skip).await?;
    }
    tx.commit().await?;
    info!(
        "Seeded {} identities, {} profiles, {} detail rows",
        report.identities, report.profiles, report.details
    );
    Ok(report)
}

/// Seeds any store through the service path, skipping profiles that exist.
pub async fn apply_to_store<S: BookingStore + ?Sized>(store: &S) -> StoreResult<SeedReport> {
    let mut report = SeedReport::default();
    for demo in demo_identities() {
        match store.get_profile(&Caller::Service, demo.profile.id).await {
            Ok(_) => continue,
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e),
        }
        store.create_profile(&Caller::Service, &demo.profile).await?;
        report.profiles += 1;
        report.details += 1;
    }
    Ok(report)
}
