use serde::{Serialize, Deserialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServiceArea {
    pub id: Uuid,
    pub pincode: String,
    pub service_id: String,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewServiceArea {
    pub pincode: String,
    pub service_id: String,
    pub is_available: bool,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NurseServiceArea {
    pub id: Uuid,
    pub nurse_id: Uuid,
    pub pincode: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
