use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::{NewServiceArea, NurseServiceArea, ServiceArea};

/// Inserts or refreshes the availability of a (pincode, service) pair.
pub async fn upsert_service_area(conn: &mut PgConnection, area: &NewServiceArea) -> Result<ServiceArea, sqlx::Error> {
    sqlx::query_as::<_, ServiceArea>(
        r#"
        INSERT INTO public.service_areas (pincode, service_id, is_available)
        VALUES ($1, $2, $3)
        ON CONFLICT (pincode, service_id) DO UPDATE SET is_available = EXCLUDED.is_available
        RETURNING id, pincode, service_id, is_available, created_at
        "#,
    )
        .bind(&area.pincode)
        .bind(&area.service_id)
        .bind(area.is_available)
        .fetch_one(conn)
        .await
}

pub async fn list_service_areas(conn: &mut PgConnection, pincode: Option<&str>) -> Result<Vec<ServiceArea>, sqlx::Error> {
    sqlx::query_as::<_, ServiceArea>(
        r#"
        SELECT id, pincode, service_id, is_available, created_at
        FROM public.service_areas
        WHERE $1::text IS NULL OR pincode = $1
        ORDER BY pincode, service_id
        "#,
    )
        .bind(pincode)
        .fetch_all(conn)
        .await
}

pub async fn insert_nurse_area(conn: &mut PgConnection, nurse_id: Uuid, pincode: &str) -> Result<NurseServiceArea, sqlx::Error> {
    sqlx::query_as::<_, NurseServiceArea>(
        r#"
        INSERT INTO public.nurse_service_areas (nurse_id, pincode)
        VALUES ($1, $2)
        RETURNING id, nurse_id, pincode, is_active, created_at
        "#,
    )
        .bind(nurse_id)
        .bind(pincode)
        .fetch_one(conn)
        .await
}

/// Coverage rows visible to the caller, optionally narrowed to one nurse.
pub async fn list_nurse_areas(conn: &mut PgConnection, nurse_id: Option<Uuid>) -> Result<Vec<NurseServiceArea>, sqlx::Error> {
    sqlx::query_as::<_, NurseServiceArea>(
        r#"
        SELECT id, nurse_id, pincode, is_active, created_at
        FROM public.nurse_service_areas
        WHERE $1::uuid IS NULL OR nurse_id = $1
        ORDER BY nurse_id, pincode
        "#,
    )
        .bind(nurse_id)
        .fetch_all(conn)
        .await
}
