use log::{debug, info};
use sqlx::{PgConnection, Pool, Postgres};
use thiserror::Error;

use super::catalog::CatalogSnapshot;
use super::plan::{MigrationPlan, PlanOptions};
use super::{DESIRED, SCHEMA, STATE_TABLE};

/// Serializes concurrent migrators on the same database.
const MIGRATION_LOCK_KEY: i64 = 0x6e75_7273_6500;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error(
        "managed tables {tables:?} differ from the desired schema; rebuilding drops their rows, \
         pass --allow-reset to proceed"
    )]
    ResetRequired { tables: Vec<String> },

    #[error("migration step {index} failed: {source}\n{statement}")]
    Step {
        index: usize,
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Brings the database to the desired schema in a single transaction.
///
/// Any failing statement rolls back the whole plan; a matching catalog
/// produces a no-op plan and leaves data untouched. Policy or RLS drift on
/// otherwise intact tables is repaired without `allow_reset`.
pub async fn apply(pool: &Pool<Postgres>, options: &PlanOptions) -> Result<MigrationPlan, SchemaError> {
    let mut tx = pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MIGRATION_LOCK_KEY)
        .execute(&mut *tx)
        .await?;

    let snapshot = CatalogSnapshot::load(&mut tx, &DESIRED.table_names()).await?;
    debug!(
        "catalog: {} managed tables, {} with RLS, {} policies, fingerprint {:?}",
        snapshot.tables.len(),
        snapshot.rls_enabled.len(),
        snapshot.policies.len(),
        snapshot.fingerprint
    );

    let plan = MigrationPlan::build(&DESIRED, &snapshot, options)?;
    if plan.is_noop() && plan.steps.is_empty() {
        tx.commit().await?;
        info!("Schema already at {}", plan.fingerprint);
        return Ok(plan);
    }

    info!("Applying {:?} plan with {} steps", plan.action, plan.steps.len());
    for (index, step) in plan.steps.iter().enumerate() {
        let statement = step.sql();
        sqlx::raw_sql(&statement)
            .execute(&mut *tx)
            .await
            .map_err(|source| SchemaError::Step { index, statement: statement.clone(), source })?;
    }

    if !plan.is_noop() {
        seal(&mut tx).await?;
    }

    tx.commit().await?;
    info!("Schema at {} after {:?}", plan.fingerprint, plan.action);
    Ok(plan)
}

/// Records the digest of the catalog as it now stands, so later runs can
/// tell out-of-band policy or RLS changes apart from our own.
async fn seal(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    let live = CatalogSnapshot::load(&mut *conn, &DESIRED.table_names()).await?;
    sqlx::query(&format!("UPDATE {}.{} SET catalog_digest = $1 WHERE id", SCHEMA, STATE_TABLE))
        .bind(live.digest())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Computes the plan `apply` would run, without changing anything.
pub async fn dry_run(pool: &Pool<Postgres>, options: &PlanOptions) -> Result<MigrationPlan, SchemaError> {
    let mut conn = pool.acquire().await?;
    let snapshot = CatalogSnapshot::load(&mut conn, &DESIRED.table_names()).await?;
    MigrationPlan::build(&DESIRED, &snapshot, options)
}
