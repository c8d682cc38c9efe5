use serde::{Serialize, Deserialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use super::{ModelError, SlotStatus};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "booking_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

pg_enum_labels!(BookingStatus, "booking status", {
    Pending => "pending",
    Confirmed => "confirmed",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl BookingStatus {
    pub fn can_become(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Completed) | (Confirmed, Cancelled)
        )
    }

    pub fn transition(self, next: BookingStatus) -> Result<BookingStatus, ModelError> {
        if self.can_become(next) {
            Ok(next)
        } else {
            Err(ModelError::InvalidTransition { from: self, to: next })
        }
    }

    /// Confirming and completing are the nurse's calls; either party may cancel.
    pub fn nurse_only(self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::Completed)
    }

    /// What entering this status does to the booked slot, if anything.
    pub fn slot_effect(self) -> Option<SlotStatus> {
        match self {
            BookingStatus::Cancelled => Some(SlotStatus::Available),
            BookingStatus::Completed => Some(SlotStatus::Completed),
            BookingStatus::Pending | BookingStatus::Confirmed => None,
        }
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub nurse_id: Uuid,
    pub slot_id: Uuid,
    pub service_id: String,
    pub status: BookingStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn involves(&self, identity: Uuid) -> bool {
        self.patient_id == identity || self.nurse_id == identity
    }
}

/// What a patient submits to reserve a slot; the patient is the caller.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BookingRequest {
    pub slot_id: Uuid,
    pub service_id: String,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use BookingStatus::*;

    #[test]
    fn forward_transitions_only() {
        assert!(Pending.can_become(Confirmed));
        assert!(Confirmed.can_become(Completed));
        assert!(Confirmed.can_become(Cancelled));
        assert!(!Completed.can_become(Cancelled));
        assert!(!Cancelled.can_become(Pending));
        assert!(!Pending.can_become(Completed));
    }

    #[test]
    fn terminal_states_reject_everything() {
        for next in BookingStatus::ALL {
            assert!(Cancelled.transition(*next).is_err());
            assert!(Completed.transition(*next).is_err());
        }
    }

    #[test]
    fn cancelling_frees_the_slot() {
        assert_eq!(Cancelled.slot_effect(), Some(SlotStatus::Available));
        assert_eq!(Confirmed.slot_effect(), None);
    }
}
