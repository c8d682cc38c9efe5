use chrono::NaiveTime;
use thiserror::Error;
use uuid::Uuid;

/// Implements `Display`/`FromStr` for a Postgres-backed enum from its
/// lowercase labels, so the same strings serve SQL rendering and CLI parsing.
macro_rules! pg_enum_labels {
    ($ty:ident, $kind:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $label),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = $crate::models::ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($label => Ok($ty::$variant),)+
                    other => Err($crate::models::ModelError::UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

pub mod booking;
pub mod caller;
pub mod profile;
pub mod service_area;
pub mod slot;

pub use booking::{Booking, BookingRequest, BookingStatus};
pub use caller::Caller;
pub use profile::{
    Gender, NurseDetails, NurseProfileRow, PatientDetails, PatientProfileRow, Profile,
    ProfileCounts, ProfileDetails, ProfileRow, Role,
};
pub use service_area::{NewServiceArea, NurseServiceArea, ServiceArea};
pub use slot::{NewSlot, NurseSlot, SlotStatus, SLOT_LENGTH_SECS};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("unknown {kind} '{value}'")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("profile {id} has role {role} but no {role} details")]
    MissingDetails { id: Uuid, role: Role },

    #[error("profile {id} has role {expected}, extension row is for {found}")]
    RoleMismatch { id: Uuid, expected: Role, found: Role },

    #[error("slot must end after it starts")]
    SlotEndsBeforeStart,

    #[error("slot must last exactly {SLOT_LENGTH_SECS} seconds, got {0}")]
    SlotDuration(i64),

    #[error("slot starting at {0} would run past midnight")]
    SlotPastMidnight(NaiveTime),

    #[error("booking cannot move from {from} to {to}")]
    InvalidTransition { from: BookingStatus, to: BookingStatus },

    #[error("experience years cannot be negative")]
    NegativeExperience,
}
