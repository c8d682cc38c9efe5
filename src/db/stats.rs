use sqlx::PgConnection;

use crate::models::{ProfileCounts, Role};

/// Per-role totals. Runs through a definer function so anonymous visitors
/// get counts without seeing any profile rows.
pub async fn profile_counts(conn: &mut PgConnection) -> Result<ProfileCounts, sqlx::Error> {
    let rows: Vec<(Role, i64)> = sqlx::query_as("SELECT role, total FROM public.profile_counts()")
        .fetch_all(conn)
        .await?;
    let mut counts = ProfileCounts::default();
    for (role, total) in rows {
        counts.add(role, total);
    }
    Ok(counts)
}
