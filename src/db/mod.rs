use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, Transaction};

use crate::models::Caller;

pub mod bookings;
pub mod profiles;
pub mod service_areas;
pub mod slots;
pub mod stats;

pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<Pool<Postgres>, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Opens a transaction in which the database sees `caller`: `auth.uid()`
/// resolves to its identity and statements run as the matching client
/// role, so every row-level policy applies.
pub async fn begin_as(pool: &Pool<Postgres>, caller: &Caller) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    match caller {
        Caller::Service => {}
        Caller::Anonymous => {
            sqlx::query("SET LOCAL ROLE anon").execute(&mut *tx).await?;
        }
        Caller::Authenticated(id) => {
            let claims = serde_json::json!({ "sub": id, "role": "authenticated" }).to_string();
            sqlx::query(
                "SELECT set_config('request.jwt.claim.sub', $1, true), set_config('request.jwt.claims', $2, true)",
            )
                .bind(id.to_string())
                .bind(claims)
                .execute(&mut *tx)
                .await?;
            sqlx::query("SET LOCAL ROLE authenticated").execute(&mut *tx).await?;
        }
    }
    Ok(tx)
}
