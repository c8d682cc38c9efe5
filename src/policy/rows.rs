use uuid::Uuid;

use crate::models::{
    Booking, NurseProfileRow, NurseServiceArea, NurseSlot, PatientProfileRow, Profile, ProfileRow, ServiceArea,
};

/// Exposes the ownership columns a policy predicate may compare against.
pub trait PolicyRow {
    fn uuid_column(&self, column: &str) -> Option<Uuid>;
}

/// Ad-hoc row built from column/value pairs, for rows that do not exist
/// as a model yet (an insert being checked, a lookup key).
#[derive(Debug, Clone, Default)]
pub struct Columns(Vec<(&'static str, Uuid)>);

impl Columns {
    pub fn new() -> Self {
        Columns(Vec::new())
    }

    pub fn with(mut self, column: &'static str, value: Uuid) -> Self {
        self.0.push((column, value));
        self
    }
}

impl PolicyRow for Columns {
    fn uuid_column(&self, column: &str) -> Option<Uuid> {
        self.0.iter().find(|(name, _)| *name == column).map(|(_, v)| *v)
    }
}

impl PolicyRow for ProfileRow {
    fn uuid_column(&self, column: &str) -> Option<Uuid> {
        (column == "id").then_some(self.id)
    }
}

impl PolicyRow for Profile {
    fn uuid_column(&self, column: &str) -> Option<Uuid> {
        (column == "id").then_some(self.id)
    }
}

impl PolicyRow for PatientProfileRow {
    fn uuid_column(&self, column: &str) -> Option<Uuid> {
        (column == "id").then_some(self.id)
    }
}

impl PolicyRow for NurseProfileRow {
    fn uuid_column(&self, column: &str) -> Option<Uuid> {
        (column == "id").then_some(self.id)
    }
}

impl PolicyRow for ServiceArea {
    fn uuid_column(&self, column: &str) -> Option<Uuid> {
        (column == "id").then_some(self.id)
    }
}

impl PolicyRow for NurseServiceArea {
    fn uuid_column(&self, column: &str) -> Option<Uuid> {
        match column {
            "id" => Some(self.id),
            "nurse_id" => Some(self.nurse_id),
            _ => None,
        }
    }
}

impl PolicyRow for NurseSlot {
    fn uuid_column(&self, column: &str) -> Option<Uuid> {
        match column {
            "id" => Some(self.id),
            "nurse_id" => Some(self.nurse_id),
            _ => None,
        }
    }
}

impl PolicyRow for Booking {
    fn uuid_column(&self, column: &str) -> Option<Uuid> {
        match column {
            "id" => Some(self.id),
            "patient_id" => Some(self.patient_id),
            "nurse_id" => Some(self.nurse_id),
            "slot_id" => Some(self.slot_id),
            _ => None,
        }
    }
}
