use chrono::{NaiveDate, NaiveTime};
use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use crate::models::BookingStatus;

#[derive(Parser, Debug)]
#[command(name = "nurse-booking")]
#[command(about = "Schema, access control and booking tools for the home-nursing backend", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub identity: IdentityArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Who the data commands act as. Defaults to an anonymous visitor.
#[derive(Args, Debug, Default)]
pub struct IdentityArgs {
    /// JWT issued for the acting identity
    #[arg(short, long, global = true, conflicts_with_all = ["as_user", "service"])]
    pub token: Option<String>,

    /// Act as this identity without a token (local development)
    #[arg(long, global = true, conflicts_with = "service")]
    pub as_user: Option<Uuid>,

    /// Use the privileged service path, bypassing row-level security
    #[arg(long, global = true)]
    pub service: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bring the database to the desired schema
    Migrate {
        /// Print the plan without applying it
        #[arg(long)]
        dry_run: bool,
        /// Allow dropping and recreating tables that drifted
        #[arg(long)]
        allow_reset: bool,
    },
    /// Print the SQL a migration would run
    Plan {
        #[arg(long)]
        allow_reset: bool,
    },
    /// Insert the demonstration patient and nurse
    Seed,
    /// Per-role profile totals
    Stats,
    /// Follow profile changes and keep counts current
    Watch,
    /// Issue a token for an identity
    Token {
        #[arg(short, long)]
        user: Uuid,
        #[arg(long, default_value = "24")]
        hours: i64,
    },
    Profile {
        #[arg(long)]
        id: Uuid,
    },
    /// Nurse directory
    Nurses,
    Areas {
        #[command(subcommand)]
        action: AreaCommands,
    },
    Slots {
        #[command(subcommand)]
        action: SlotCommands,
    },
    /// Reserve an available slot as the acting patient
    Book {
        #[arg(long)]
        slot: Uuid,
        #[arg(long)]
        service_id: String,
        #[arg(long)]
        notes: Option<String>,
    },
    Bookings {
        #[command(subcommand)]
        action: BookingCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum AreaCommands {
    /// Create or update a (pincode, service) availability flag
    Add {
        #[arg(long)]
        pincode: String,
        #[arg(long)]
        service_id: String,
        #[arg(long)]
        unavailable: bool,
    },
    List {
        #[arg(long)]
        pincode: Option<String>,
    },
    /// Add a pincode to a nurse's coverage
    Cover {
        #[arg(long)]
        nurse: Uuid,
        #[arg(long)]
        pincode: String,
    },
    Coverage {
        #[arg(long)]
        nurse: Option<Uuid>,
    },
}

#[derive(Subcommand, Debug)]
pub enum SlotCommands {
    /// Open one-hour slots starting at each given time
    Add {
        #[arg(long)]
        nurse: Uuid,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long = "start", required = true)]
        starts: Vec<NaiveTime>,
    },
    List {
        #[arg(long)]
        nurse: Uuid,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[derive(Subcommand, Debug)]
pub enum BookingCommands {
    List,
    SetStatus {
        #[arg(long)]
        booking: Uuid,
        #[arg(long)]
        status: BookingStatus,
    },
    Notes {
        #[arg(long)]
        booking: Uuid,
        /// Omit to clear the notes.
        #[arg(long)]
        text: Option<String>,
    },
}

pub mod commands;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_slot_batch() {
        let cli = Cli::parse_from([
            "nurse-booking",
            "--as-user",
            "00000000-0000-4000-8000-000000000002",
            "slots",
            "add",
            "--nurse",
            "00000000-0000-4000-8000-000000000002",
            "--date",
            "2026-03-14",
            "--start",
            "09:00:00",
            "--start",
            "10:00:00",
        ]);
        match cli.command {
            Commands::Slots { action: SlotCommands::Add { starts, .. } } => assert_eq!(starts.len(), 2),
            other => panic!("unexpected command {:?}", other),
        }
        assert!(cli.identity.as_user.is_some());
    }

    #[test]
    fn token_and_service_conflict() {
        let parsed = Cli::try_parse_from(["nurse-booking", "--token", "abc", "--service", "stats"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn status_parses_from_label() {
        let cli = Cli::parse_from([
            "nurse-booking",
            "bookings",
            "set-status",
            "--booking",
            "00000000-0000-4000-8000-000000000009",
            "--status",
            "confirmed",
        ]);
        assert!(matches!(
            cli.command,
            Commands::Bookings { action: BookingCommands::SetStatus { status: BookingStatus::Confirmed, .. } }
        ));
    }
}
