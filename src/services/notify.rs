use anyhow::{Context, Result};
use futures::TryStreamExt;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgListener;
use sqlx::{Pool, Postgres};

use crate::db::stats;
use crate::models::{ProfileCounts, Role};
use crate::schema::functions::PROFILE_CHANNEL;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// Payload of a `profile_changes` notification.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileChange {
    pub op: ChangeOp,
    pub role: Role,
}

impl ProfileChange {
    pub fn parse(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

/// Follows profile inserts, deletes and role changes, handing each change
/// and the refreshed per-role totals to `on_change`. Runs until the
/// connection drops.
pub async fn watch_profiles<F>(pool: &Pool<Postgres>, mut on_change: F) -> Result<()>
where
    F: FnMut(&ProfileChange, &ProfileCounts),
{
    let mut listener = PgListener::connect_with(pool)
        .await
        .context("Failed to open notification listener")?;
    listener.listen(PROFILE_CHANNEL).await?;
    info!("Listening for profile changes on '{}'", PROFILE_CHANNEL);

    let mut stream = listener.into_stream();
    while let Some(notification) = stream.try_next().await? {
        let change = match ProfileChange::parse(notification.payload()) {
            Ok(change) => change,
            Err(e) => {
                warn!("Ignoring malformed notification {:?}: {}", notification.payload(), e);
                continue;
            }
        };
        let mut conn = pool.acquire().await?;
        let counts = stats::profile_counts(&mut conn).await?;
        on_change(&change, &counts);
    }
    Ok(())
}
