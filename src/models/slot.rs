use serde::{Serialize, Deserialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

use super::ModelError;

pub const SLOT_LENGTH_SECS: i64 = 3600;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "slot_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Available,
    Booked,
    Completed,
    Cancelled,
}

pg_enum_labels!(SlotStatus, "slot status", {
    Available => "available",
    Booked => "booked",
    Completed => "completed",
    Cancelled => "cancelled",
});

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NurseSlot {
    pub id: Uuid,
    pub nurse_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: SlotStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewSlot {
    pub nurse_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl NewSlot {
    /// A slot of the standard length starting at `start_time`.
    pub fn one_hour(nurse_id: Uuid, date: NaiveDate, start_time: NaiveTime) -> Result<Self, ModelError> {
        let (end_time, wrapped) = start_time.overflowing_add_signed(Duration::seconds(SLOT_LENGTH_SECS));
        if wrapped != 0 {
            return Err(ModelError::SlotPastMidnight(start_time));
        }
        Ok(NewSlot { nurse_id, date, start_time, end_time })
    }

    /// Mirrors the `valid_time_range` and `one_hour_slot` table checks.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.end_time <= self.start_time {
            return Err(ModelError::SlotEndsBeforeStart);
        }
        let secs = (self.end_time - self.start_time).num_seconds();
        if secs != SLOT_LENGTH_SECS {
            return Err(ModelError::SlotDuration(secs));
        }
        Ok(())
    }
}
