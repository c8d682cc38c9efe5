use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{booking_identity, BookingStore, StoreError, StoreResult};
use crate::models::{
    Booking, BookingRequest, BookingStatus, Caller, NewServiceArea, NewSlot, NurseProfileRow, NurseServiceArea,
    NurseSlot, PatientDetails, PatientProfileRow, Profile, ProfileCounts, ProfileDetails, ProfileRow, Role,
    ServiceArea, SlotStatus,
};
use crate::policy::{rules, Gate, Policy, RoleLookup};
use crate::schema::tables::{
    BOOKINGS, NURSE_PROFILES, NURSE_SERVICE_AREAS, NURSE_SLOTS, PATIENT_PROFILES, PROFILES, SERVICE_AREAS,
};

fn rls_violation(table: &str) -> StoreError {
    StoreError::Forbidden(format!("new row violates row-level security policy for table \"{}\"", table))
}

fn unique_violation(constraint: &str) -> StoreError {
    StoreError::Constraint(format!("duplicate key value violates unique constraint \"{}\"", constraint))
}

fn fk_violation(table: &str, constraint: &str) -> StoreError {
    StoreError::Constraint(format!(
        "insert or update on table \"{}\" violates foreign key constraint \"{}\"",
        table, constraint
    ))
}

struct ProfileRoles<'a>(&'a BTreeMap<Uuid, ProfileRow>);

impl RoleLookup for ProfileRoles<'_> {
    fn role_of(&self, id: Uuid) -> Option<Role> {
        self.0.get(&id).map(|p| p.role)
    }
}

#[derive(Default)]
struct Tables {
    profiles: BTreeMap<Uuid, ProfileRow>,
    patients: BTreeMap<Uuid, PatientProfileRow>,
    nurses: BTreeMap<Uuid, NurseProfileRow>,
    service_areas: Vec<ServiceArea>,
    nurse_areas: Vec<NurseServiceArea>,
    slots: BTreeMap<Uuid, NurseSlot>,
    bookings: BTreeMap<Uuid, Booking>,
}

impl Tables {
    fn gate<R>(&self, policies: &[Policy], check: impl FnOnce(&Gate<'_>) -> R) -> R {
        let roles = ProfileRoles(&self.profiles);
        let gate = Gate::new(policies, &roles);
        check(&gate)
    }

    fn insert_details(
        &mut self,
        policies: &[Policy],
        caller: &Caller,
        id: Uuid,
        details: &ProfileDetails,
    ) -> StoreResult<()> {
        let owner_role = self.profiles.get(&id).map(|p| p.role);
        match details {
            ProfileDetails::Patient(d) => {
                let row = PatientProfileRow { id, details: d.clone() };
                if !self.gate(policies, |g| g.can_insert(PATIENT_PROFILES, caller, &row)) {
                    return Err(rls_violation(PATIENT_PROFILES));
                }
                if self.patients.contains_key(&id) {
                    return Err(unique_violation("patient_profiles_pkey"));
                }
                if owner_role != Some(Role::Patient) {
                    return Err(fk_violation(PATIENT_PROFILES, "patient_profiles_profile_fkey"));
                }
                self.patients.insert(id, row);
            }
            ProfileDetails::Nurse(d) => {
                let row = NurseProfileRow { id, details: d.clone() };
                if !self.gate(policies, |g| g.can_insert(NURSE_PROFILES, caller, &row)) {
                    return Err(rls_violation(NURSE_PROFILES));
                }
                if d.experience_years < 0 {
                    return Err(StoreError::Constraint(
                        "new row violates check constraint \"nurse_profiles_experience_check\"".to_string(),
                    ));
                }
                if self.nurses.contains_key(&id) {
                    return Err(unique_violation("nurse_profiles_pkey"));
                }
                if owner_role != Some(Role::Nurse) {
                    return Err(fk_violation(NURSE_PROFILES, "nurse_profiles_profile_fkey"));
                }
                self.nurses.insert(id, row);
            }
        }
        Ok(())
    }

    /// Removes a profile and every row that references it.
    fn cascade_delete(&mut self, id: Uuid) -> bool {
        if self.profiles.remove(&id).is_none() {
            return false;
        }
        self.patients.remove(&id);
        self.nurses.remove(&id);
        self.nurse_areas.retain(|a| a.nurse_id != id);
        self.slots.retain(|_, s| s.nurse_id != id);
        self.bookings.retain(|_, b| !b.involves(id));
        true
    }
}

/// In-process store evaluating the same row-level policies the database
/// enforces. Every call holds one lock, so each is atomic.
pub struct MemoryStore {
    tables: Mutex<Tables>,
    policies: Vec<Policy>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore { tables: Mutex::new(Tables::default()), policies: rules::all() }
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn create_profile(&self, caller: &Caller, profile: &Profile) -> StoreResult<()> {
        profile.validate()?;
        let mut t = self.tables.lock().await;
        let now = Utc::now();
        let base = ProfileRow {
            id: profile.id,
            role: profile.role(),
            full_name: profile.full_name.clone(),
            phone: profile.phone.clone(),
            address: profile.address.clone(),
            created_at: now,
            updated_at: now,
        };
        if !t.gate(&self.policies, |g| g.can_insert(PROFILES, caller, &base)) {
            return Err(rls_violation(PROFILES));
        }
        if t.profiles.contains_key(&profile.id) {
            return Err(unique_violation("profiles_pkey"));
        }
        t.profiles.insert(profile.id, base);
        if let Err(e) = t.insert_details(&self.policies, caller, profile.id, &profile.details) {
            t.profiles.remove(&profile.id);
            return Err(e);
        }
        Ok(())
    }

    async fn attach_details(&self, caller: &Caller, id: Uuid, details: &ProfileDetails) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        t.insert_details(&self.policies, caller, id, details)
    }

    async fn get_profile(&self, caller: &Caller, id: Uuid) -> StoreResult<Profile> {
        let t = self.tables.lock().await;
        let (base, patient, nurse) = t.gate(&self.policies, |g| {
            let base = t.profiles.get(&id).filter(|r| g.can_select(PROFILES, caller, *r)).cloned();
            let patient = t.patients.get(&id).filter(|r| g.can_select(PATIENT_PROFILES, caller, *r)).cloned();
            let nurse = t.nurses.get(&id).filter(|r| g.can_select(NURSE_PROFILES, caller, *r)).cloned();
            (base, patient, nurse)
        });
        let base = base.ok_or(StoreError::NotFound)?;
        Ok(Profile::assemble(base, patient, nurse)?)
    }

    async fn patient_details(&self, caller: &Caller, id: Uuid) -> StoreResult<PatientDetails> {
        let t = self.tables.lock().await;
        t.gate(&self.policies, |g| {
            t.patients
                .get(&id)
                .filter(|r| g.can_select(PATIENT_PROFILES, caller, *r))
                .map(|r| r.details.clone())
        })
            .ok_or(StoreError::NotFound)
    }

    async fn update_contact(
        &self,
        caller: &Caller,
        id: Uuid,
        phone: Option<String>,
        address: Option<String>,
    ) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        let old = t.profiles.get(&id).cloned().ok_or(StoreError::NotFound)?;
        let new = ProfileRow { phone, address, updated_at: Utc::now(), ..old.clone() };
        if !t.gate(&self.policies, |g| g.can_update(PROFILES, caller, &old, &new)) {
            return Err(StoreError::NotFound);
        }
        t.profiles.insert(id, new);
        Ok(())
    }

    async fn delete_profile(&self, caller: &Caller, id: Uuid) -> StoreResult<()> {
        if !caller.bypasses_policies() {
            return Err(StoreError::Forbidden("permission denied for table profiles".to_string()));
        }
        let mut t = self.tables.lock().await;
        if t.cascade_delete(id) {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    async fn list_nurses(&self, caller: &Caller) -> StoreResult<Vec<NurseProfileRow>> {
        let t = self.tables.lock().await;
        let mut rows: Vec<NurseProfileRow> = t.gate(&self.policies, |g| {
            t.nurses.values().filter(|r| g.can_select(NURSE_PROFILES, caller, *r)).cloned().collect()
        });
        rows.sort_by(|a, b| b.details.experience_years.cmp(&a.details.experience_years).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn upsert_service_area(&self, caller: &Caller, area: &NewServiceArea) -> StoreResult<ServiceArea> {
        let mut t = self.tables.lock().await;
        if !t.gate(&self.policies, |g| g.has_write_path(SERVICE_AREAS, caller)) {
            return Err(StoreError::Forbidden(format!("permission denied for table {}", SERVICE_AREAS)));
        }
        if let Some(existing) = t
            .service_areas
            .iter_mut()
            .find(|a| a.pincode == area.pincode && a.service_id == area.service_id)
        {
            existing.is_available = area.is_available;
            return Ok(existing.clone());
        }
        let row = ServiceArea {
            id: Uuid::new_v4(),
            pincode: area.pincode.clone(),
            service_id: area.service_id.clone(),
            is_available: area.is_available,
            created_at: Utc::now(),
        };
        t.service_areas.push(row.clone());
        Ok(row)
    }

    async fn list_service_areas(&self, caller: &Caller, pincode: Option<&str>) -> StoreResult<Vec<ServiceArea>> {
        let t = self.tables.lock().await;
        let mut rows: Vec<ServiceArea> = t.gate(&self.policies, |g| {
            t.service_areas
                .iter()
                .filter(|a| pincode.map_or(true, |p| a.pincode == p))
                .filter(|a| g.can_select(SERVICE_AREAS, caller, *a))
                .cloned()
                .collect()
        });
        rows.sort_by(|a, b| (&a.pincode, &a.service_id).cmp(&(&b.pincode, &b.service_id)));
        Ok(rows)
    }

    async fn add_nurse_area(&self, caller: &Caller, nurse_id: Uuid, pincode: &str) -> StoreResult<NurseServiceArea> {
        let mut t = self.tables.lock().await;
        let row = NurseServiceArea {
            id: Uuid::new_v4(),
            nurse_id,
            pincode: pincode.to_string(),
            is_active: true,
            created_at: Utc::now(),
        };
        if !t.gate(&self.policies, |g| g.can_insert(NURSE_SERVICE_AREAS, caller, &row)) {
            return Err(rls_violation(NURSE_SERVICE_AREAS));
        }
        if t.nurse_areas.iter().any(|a| a.nurse_id == nurse_id && a.pincode == pincode) {
            return Err(unique_violation("nurse_service_areas_nurse_pincode_key"));
        }
        if !t.nurses.contains_key(&nurse_id) {
            return Err(fk_violation(NURSE_SERVICE_AREAS, "nurse_service_areas_nurse_fkey"));
        }
        t.nurse_areas.push(row.clone());
        Ok(row)
    }

    async fn list_nurse_areas(&self, caller: &Caller, nurse_id: Option<Uuid>) -> StoreResult<Vec<NurseServiceArea>> {
        let t = self.tables.lock().await;
        let mut rows: Vec<NurseServiceArea> = t.gate(&self.policies, |g| {
            t.nurse_areas
                .iter()
                .filter(|a| nurse_id.map_or(true, |n| a.nurse_id == n))
                .filter(|a| g.can_select(NURSE_SERVICE_AREAS, caller, *a))
                .cloned()
                .collect()
        });
        rows.sort_by(|a, b| (a.nurse_id, &a.pincode).cmp(&(b.nurse_id, &b.pincode)));
        Ok(rows)
    }

    async fn create_slot(&self, caller: &Caller, slot: &NewSlot) -> StoreResult<NurseSlot> {
        slot.validate()?;
        let mut t = self.tables.lock().await;
        let row = NurseSlot {
            id: Uuid::new_v4(),
            nurse_id: slot.nurse_id,
            date: slot.date,
            start_time: slot.start_time,
            end_time: slot.end_time,
            status: SlotStatus::Available,
            created_at: Utc::now(),
        };
        if !t.gate(&self.policies, |g| g.can_insert(NURSE_SLOTS, caller, &row)) {
            return Err(rls_violation(NURSE_SLOTS));
        }
        if !t.nurses.contains_key(&slot.nurse_id) {
            return Err(fk_violation(NURSE_SLOTS, "nurse_slots_nurse_fkey"));
        }
        t.slots.insert(row.id, row.clone());
        Ok(row)
    }

    async fn list_slots(&self, caller: &Caller, nurse_id: Uuid, date: Option<NaiveDate>) -> StoreResult<Vec<NurseSlot>> {
        let t = self.tables.lock().await;
        let mut rows: Vec<NurseSlot> = t.gate(&self.policies, |g| {
            t.slots
                .values()
                .filter(|s| s.nurse_id == nurse_id && date.map_or(true, |d| s.date == d))
                .filter(|s| g.can_select(NURSE_SLOTS, caller, *s))
                .cloned()
                .collect()
        });
        rows.sort_by_key(|s| (s.date, s.start_time));
        Ok(rows)
    }

    async fn book_slot(&self, caller: &Caller, request: &BookingRequest) -> StoreResult<Booking> {
        let patient_id = booking_identity(caller)?;
        let mut t = self.tables.lock().await;
        if t.profiles.get(&patient_id).map(|p| p.role) != Some(Role::Patient) {
            return Err(StoreError::Forbidden("only patients can book slots".to_string()));
        }
        let nurse_id = match t.slots.get(&request.slot_id) {
            Some(slot) if slot.status == SlotStatus::Available => slot.nurse_id,
            _ => return Err(StoreError::SlotUnavailable(request.slot_id)),
        };
        if !t.patients.contains_key(&patient_id) {
            return Err(fk_violation(BOOKINGS, "bookings_patient_fkey"));
        }
        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            patient_id,
            nurse_id,
            slot_id: request.slot_id,
            service_id: request.service_id.clone(),
            status: BookingStatus::Pending,
            notes: request.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        if let Some(slot) = t.slots.get_mut(&request.slot_id) {
            slot.status = SlotStatus::Booked;
        }
        t.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn get_booking(&self, caller: &Caller, id: Uuid) -> StoreResult<Booking> {
        let t = self.tables.lock().await;
        t.gate(&self.policies, |g| {
            t.bookings.get(&id).filter(|b| g.can_select(BOOKINGS, caller, *b)).cloned()
        })
            .ok_or(StoreError::NotFound)
    }

    async fn set_booking_status(&self, caller: &Caller, id: Uuid, status: BookingStatus) -> StoreResult<Booking> {
        let me = caller.identity().ok_or(StoreError::NotFound)?;
        let mut t = self.tables.lock().await;
        let booking = t.bookings.get_mut(&id).filter(|b| b.involves(me)).ok_or(StoreError::NotFound)?;
        booking.status.transition(status)?;
        if status.nurse_only() && me != booking.nurse_id {
            return Err(StoreError::Forbidden(format!("only the nurse can mark a booking {}", status)));
        }
        booking.status = status;
        booking.updated_at = Utc::now();
        let updated = booking.clone();
        if let Some(effect) = status.slot_effect() {
            if let Some(slot) = t.slots.get_mut(&updated.slot_id) {
                slot.status = effect;
            }
        }
        Ok(updated)
    }

    async fn update_booking_notes(&self, caller: &Caller, id: Uuid, notes: Option<String>) -> StoreResult<Booking> {
        let mut t = self.tables.lock().await;
        let old = t.bookings.get(&id).cloned().ok_or(StoreError::NotFound)?;
        let new = Booking { notes, updated_at: Utc::now(), ..old.clone() };
        if !t.gate(&self.policies, |g| g.can_update(BOOKINGS, caller, &old, &new)) {
            return Err(StoreError::NotFound);
        }
        t.bookings.insert(id, new.clone());
        Ok(new)
    }

    async fn list_bookings(&self, caller: &Caller) -> StoreResult<Vec<Booking>> {
        let t = self.tables.lock().await;
        let mut rows: Vec<Booking> = t.gate(&self.policies, |g| {
            t.bookings.values().filter(|b| g.can_select(BOOKINGS, caller, *b)).cloned().collect()
        });
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn profile_counts(&self, _caller: &Caller) -> StoreResult<ProfileCounts> {
        let t = self.tables.lock().await;
        let mut counts = ProfileCounts::default();
        for profile in t.profiles.values() {
            counts.add(profile.role, 1);
        }
        Ok(counts)
    }
}
