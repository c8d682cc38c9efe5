use chrono::NaiveDate;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::{NewSlot, NurseSlot};

pub async fn insert_slot(conn: &mut PgConnection, slot: &NewSlot) -> Result<NurseSlot, sqlx::Error> {
    sqlx::query_as::<_, NurseSlot>(
        r#"
        INSERT INTO public.nurse_slots (nurse_id, date, start_time, end_time)
        VALUES ($1, $2, $3, $4)
        RETURNING id, nurse_id, date, start_time, end_time, status, created_at
        "#,
    )
        .bind(slot.nurse_id)
        .bind(slot.date)
        .bind(slot.start_time)
        .bind(slot.end_time)
        .fetch_one(conn)
        .await
}

pub async fn list_slots(conn: &mut PgConnection, nurse_id: Uuid, date: Option<NaiveDate>) -> Result<Vec<NurseSlot>, sqlx::Error> {
    sqlx::query_as::<_, NurseSlot>(
        r#"
        SELECT id, nurse_id, date, start_time, end_time, status, created_at
        FROM public.nurse_slots
        WHERE nurse_id = $1 AND ($2::date IS NULL OR date = $2)
        ORDER BY date, start_time
        "#,
    )
        .bind(nurse_id)
        .bind(date)
        .fetch_all(conn)
        .await
}
