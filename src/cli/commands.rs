use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use log::info;
use metrics::gauge;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use sqlx::{Pool, Postgres};

use super::{AreaCommands, BookingCommands, Cli, Commands, IdentityArgs, SlotCommands};
use crate::config::Config;
use crate::models::{BookingRequest, Caller, NewServiceArea};
use crate::schema::{self, PlanOptions};
use crate::seed;
use crate::services::{watch_profiles, BookingService};
use crate::store::{BookingStore, PgStore};
use crate::utils::jwt::{caller_from_token, generate_jwt};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn resolve_caller(identity: &IdentityArgs, secret: &str) -> Result<Caller> {
    if identity.service {
        return Ok(Caller::Service);
    }
    if let Some(token) = &identity.token {
        return caller_from_token(token, secret).context("Invalid token");
    }
    Ok(identity.as_user.map(Caller::Authenticated).unwrap_or(Caller::Anonymous))
}

/// Expiry instant for a token issued now and valid for `hours`.
fn token_expiry(hours: i64) -> Result<DateTime<Utc>> {
    let ttl = Duration::try_hours(hours).context("--hours is out of range")?;
    Utc::now().checked_add_signed(ttl).context("--hours is out of range")
}

pub async fn handle_cli(cli: Cli, pool: Pool<Postgres>, config: &Config) -> Result<()> {
    let caller = resolve_caller(&cli.identity, &config.jwt_secret)?;
    let options = PlanOptions { allow_reset: false, auth_bootstrap: config.auth_bootstrap };
    let store = Arc::new(PgStore::new(pool.clone()));
    let bookings = BookingService::new(Arc::clone(&store));

    match cli.command {
        Commands::Migrate { dry_run, allow_reset } => {
            let options = PlanOptions { allow_reset, ..options };
            let plan = if dry_run {
                schema::dry_run(&pool, &options).await?
            } else {
                schema::apply(&pool, &options).await?
            };
            println!("{:?} ({} steps), fingerprint {}", plan.action, plan.steps.len(), plan.fingerprint);
        }
        Commands::Plan { allow_reset } => {
            let plan = schema::dry_run(&pool, &PlanOptions { allow_reset, ..options }).await?;
            for statement in plan.statements() {
                println!("{};\n", statement);
            }
        }
        Commands::Seed => {
            let report = seed::apply(&pool).await.context("Seeding failed")?;
            if report.is_noop() {
                println!("Demo data already present");
            } else {
                print_json(&report)?;
            }
        }
        Commands::Stats => {
            print_json(&store.profile_counts(&caller).await?)?;
        }
        Commands::Watch => {
            let addr: SocketAddr = ([0, 0, 0, 0], config.prometheus_port).into();
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .context("Failed to start metrics exporter")?;
            info!("Metrics on http://{}/metrics", addr);

            let counts = store.profile_counts(&Caller::Service).await?;
            gauge!("profiles_total", "role" => "patient").set(counts.patients as f64);
            gauge!("profiles_total", "role" => "nurse").set(counts.nurses as f64);
            watch_profiles(&pool, |change, counts| {
                gauge!("profiles_total", "role" => "patient").set(counts.patients as f64);
                gauge!("profiles_total", "role" => "nurse").set(counts.nurses as f64);
                info!(
                    "{:?} {}: {} patients, {} nurses",
                    change.op, change.role, counts.patients, counts.nurses
                );
            })
                .await?;
        }
        Commands::Token { user, hours } => {
            let token = generate_jwt(user, &config.jwt_secret, token_expiry(hours)?)?;
            println!("{}", token);
        }
        Commands::Profile { id } => {
            print_json(&store.get_profile(&caller, id).await?)?;
        }
        Commands::Nurses => {
            print_json(&store.list_nurses(&caller).await?)?;
        }
        Commands::Areas { action } => match action {
            AreaCommands::Add { pincode, service_id, unavailable } => {
                let area = NewServiceArea { pincode, service_id, is_available: !unavailable };
                print_json(&store.upsert_service_area(&caller, &area).await?)?;
            }
            AreaCommands::List { pincode } => {
                print_json(&store.list_service_areas(&caller, pincode.as_deref()).await?)?;
            }
            AreaCommands::Cover { nurse, pincode } => {
                print_json(&store.add_nurse_area(&caller, nurse, &pincode).await?)?;
            }
            AreaCommands::Coverage { nurse } => {
                print_json(&store.list_nurse_areas(&caller, nurse).await?)?;
            }
        },
        Commands::Slots { action } => match action {
            SlotCommands::Add { nurse, date, starts } => {
                print_json(&bookings.open_day(&caller, nurse, date, &starts).await?)?;
            }
            SlotCommands::List { nurse, date } => {
                print_json(&store.list_slots(&caller, nurse, date).await?)?;
            }
        },
        Commands::Book { slot, service_id, notes } => {
            let request = BookingRequest { slot_id: slot, service_id, notes };
            print_json(&bookings.book(&caller, &request).await?)?;
        }
        Commands::Bookings { action } => match action {
            BookingCommands::List => {
                print_json(&store.list_bookings(&caller).await?)?;
            }
            BookingCommands::SetStatus { booking, status } => {
                print_json(&bookings.transition(&caller, booking, status).await?)?;
            }
            BookingCommands::Notes { booking, text } => {
                print_json(&store.update_booking_notes(&caller, booking, text).await?)?;
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn default_identity_is_anonymous() {
        assert_eq!(resolve_caller(&IdentityArgs::default(), "s").unwrap(), Caller::Anonymous);
    }

    #[test]
    fn token_resolves_to_its_subject() {
        let id = Uuid::new_v4();
        let token = generate_jwt(id, "s", token_expiry(1).unwrap()).unwrap();
        let identity = IdentityArgs { token: Some(token), ..Default::default() };
        assert_eq!(resolve_caller(&identity, "s").unwrap(), Caller::Authenticated(id));
    }

    #[test]
    fn bad_token_is_an_error() {
        let identity = IdentityArgs { token: Some("not-a-jwt".into()), ..Default::default() };
        assert!(resolve_caller(&identity, "s").is_err());
    }

    #[test]
    fn token_lifetime_is_bounded() {
        assert!(token_expiry(24).unwrap() > Utc::now());
        assert!(token_expiry(i64::MAX).is_err());
        assert!(token_expiry(i64::MAX / 3_600_000).is_err());
    }
}
