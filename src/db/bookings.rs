use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::{Booking, BookingRequest, BookingStatus};

const BOOKING_COLUMNS: &str = "id, patient_id, nurse_id, slot_id, service_id, status, notes, created_at, updated_at";

/// Reserves a slot through `public.book_slot`, which flips the slot from
/// `available` to `booked` and inserts the booking in one statement.
pub async fn book_slot(conn: &mut PgConnection, request: &BookingRequest) -> Result<Booking, sqlx::Error> {
    let sql = format!("SELECT {} FROM public.book_slot($1, $2, $3)", BOOKING_COLUMNS);
    sqlx::query_as::<_, Booking>(&sql)
        .bind(request.slot_id)
        .bind(&request.service_id)
        .bind(&request.notes)
        .fetch_one(conn)
        .await
}

pub async fn set_booking_status(conn: &mut PgConnection, id: Uuid, status: BookingStatus) -> Result<Booking, sqlx::Error> {
    let sql = format!("SELECT {} FROM public.set_booking_status($1, $2)", BOOKING_COLUMNS);
    sqlx::query_as::<_, Booking>(&sql)
        .bind(id)
        .bind(status)
        .fetch_one(conn)
        .await
}

pub async fn update_notes(conn: &mut PgConnection, id: Uuid, notes: Option<&str>) -> Result<Option<Booking>, sqlx::Error> {
    let sql = format!(
        "UPDATE public.bookings SET notes = $1, updated_at = now() WHERE id = $2 RETURNING {}",
        BOOKING_COLUMNS
    );
    sqlx::query_as::<_, Booking>(&sql)
        .bind(notes)
        .bind(id)
        .fetch_optional(conn)
        .await
}

pub async fn get_booking(conn: &mut PgConnection, id: Uuid) -> Result<Option<Booking>, sqlx::Error> {
    let sql = format!("SELECT {} FROM public.bookings WHERE id = $1", BOOKING_COLUMNS);
    sqlx::query_as::<_, Booking>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await
}

/// Bookings the caller may see, newest first.
pub async fn list_bookings(conn: &mut PgConnection) -> Result<Vec<Booking>, sqlx::Error> {
    let sql = format!("SELECT {} FROM public.bookings ORDER BY created_at DESC, id", BOOKING_COLUMNS);
    sqlx::query_as::<_, Booking>(&sql)
        .fetch_all(conn)
        .await
}
