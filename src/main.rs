//! `staydesk` - front-desk client from the terminal.
//!
//! Logs in against the hotel backend, keeps the session on disk between
//! runs, registers the configured push token and exposes the booking and
//! utility views.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use staydesk::api::LogNavigator;
use staydesk::services::{BookingTab, StatusFilter, UtilityDraft};
use staydesk::{Config, FrontDesk, SessionState};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "staydesk", version, about = "Hotel front-desk client")]
struct Cli {
    /// Path to config.toml (default: platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in and store the session.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// End the session (local state is cleared even if the backend is down).
    Logout,

    /// Show session and push registration status.
    Status,

    /// Fetch the signed-in user.
    Me,

    /// Daily booking overview.
    Bookings {
        /// Day to show, YYYY-MM-DD (default: today).
        #[arg(long)]
        date: Option<NaiveDate>,
        /// arrivals, departures, in_house or pending.
        #[arg(long, default_value = "arrivals")]
        tab: BookingTab,
    },

    /// Booking status changes, newest first.
    BookingFeed {
        /// all, confirmed, pending, cancelled or deleted.
        #[arg(long, default_value = "all")]
        status: StatusFilter,
    },

    /// Utility meter readings.
    Utility {
        #[command(subcommand)]
        action: UtilityAction,
    },

    /// Push token registration.
    Push {
        #[command(subcommand)]
        action: PushAction,
    },

    /// Delete the stored session, device token and notifications.
    Reset,

    /// Configuration helpers.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum UtilityAction {
    /// List readings.
    List,
    /// List utility categories.
    Categories,
    /// Show one reading.
    Show { id: i64 },
    /// Consumption chart and totals.
    Chart {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Create a reading, or update one with --id.
    Save {
        #[arg(long)]
        id: Option<i64>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        category: i64,
        #[arg(long)]
        reading: String,
        /// Meter photo (required for new readings).
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Delete a reading.
    Delete { id: i64 },
}

#[derive(Subcommand, Debug)]
enum PushAction {
    /// Register the device token now.
    Register,
    /// Show the stored token and registration status.
    Status,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Print the JSON Schema of config.toml.
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("staydesk=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    if let Commands::Config { action } = &cli.command {
        match action {
            ConfigAction::Show => print!("{}", config.to_toml()?),
            ConfigAction::Schema => {
                println!("{}", serde_json::to_string_pretty(&Config::json_schema())?)
            }
        }
        return Ok(());
    }

    let desk = FrontDesk::from_config(config, Arc::new(LogNavigator))?;
    desk.init().await;

    let result = run(&desk, cli.command, cli.json).await;
    desk.dispose().await;
    if let Some(hint) = result.as_ref().err().and_then(retry_hint) {
        eprintln!("{hint}");
    }
    result
}

/// Follow-up line for failures worth retrying.
fn retry_hint(err: &anyhow::Error) -> Option<&'static str> {
    err.downcast_ref::<staydesk::Error>()
        .filter(|e| e.is_transient())
        .map(|_| "This looks temporary; try again in a moment.")
}

async fn run(desk: &FrontDesk, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Login { email, password } => {
            let session = desk.session().login(&email, &password).await?;
            println!(
                "Logged in as {}",
                session.user.email().or(session.user.name()).unwrap_or("user")
            );
        }
        Commands::Logout => {
            desk.session().logout().await;
            println!("Logged out");
        }
        Commands::Status => status(desk, json).await?,
        Commands::Me => {
            let profile = desk.session().fetch_profile().await?;
            emit(json, &profile, || {
                format!(
                    "{} <{}>",
                    profile.name().unwrap_or("-"),
                    profile.email().unwrap_or("-")
                )
            })?;
        }
        Commands::Bookings { date, tab } => {
            let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());
            let data = desk.bookings().daily_booking_details(date).await?;
            emit(json, &data, || {
                let s = &data.summary;
                let mut out = format!(
                    "{date}: {} rooms available | arrivals {} | departures {} | in-house {} \
                     | active {}\n\n[{tab}]",
                    s.available_rooms,
                    s.arrivals_count,
                    s.departures_count,
                    s.in_house_count,
                    s.pending_count
                );
                for booking in data.tab(tab) {
                    out.push_str(&format!(
                        "\n#{:<6} {:<28} {} → {} ({} nights) {}",
                        booking.id,
                        booking.guest_name(),
                        booking.checking_date,
                        booking.checkout_date,
                        booking.nights().unwrap_or(0),
                        booking.status
                    ));
                }
                out
            })?;
        }
        Commands::BookingFeed { status } => {
            let items = desk.bookings().status_feed(status).await?;
            emit(json, &items, || {
                items
                    .iter()
                    .map(|b| {
                        format!(
                            "{:<20} #{:<8} {:<24} {:<10} {} → {}",
                            b.created_at,
                            b.booking_id,
                            b.customer_name,
                            b.status.to_uppercase(),
                            b.checkin_date,
                            b.checkout_date
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }
        Commands::Utility { action } => utility(desk, action, json).await?,
        Commands::Push { action } => match action {
            PushAction::Register => {
                if !desk.session().is_authenticated() {
                    bail!("Log in first");
                }
                if desk.push().device_token().is_none() {
                    bail!("No device token; set push.device_token or STAYDESK_DEVICE_TOKEN");
                }
                if desk.push().register_now().await {
                    println!("Device token registered");
                } else {
                    bail!("Device token registration failed (see logs)");
                }
            }
            PushAction::Status => status(desk, json).await?,
        },
        Commands::Reset => {
            desk.reset_data().await?;
            println!("All local data cleared");
        }
        Commands::Config { .. } => {}
    }
    Ok(())
}

#[derive(Serialize)]
struct StatusReport {
    authenticated: bool,
    user: Option<String>,
    device_token: Option<String>,
    stored_device_token: Option<String>,
    platform: String,
    registered: bool,
    unseen_notifications: usize,
}

async fn status(desk: &FrontDesk, json: bool) -> Result<()> {
    desk.push().settle().await;

    let state = desk.session().state();
    let user = match &state {
        SessionState::Authenticated(session) => session.user.email().map(String::from),
        _ => None,
    };
    let token = desk.push().device_token();
    let report = StatusReport {
        authenticated: matches!(state, SessionState::Authenticated(_)),
        user,
        device_token: token.as_ref().map(|t| t.value.clone()),
        stored_device_token: desk.push().stored_device_token().await?,
        platform: desk.push().platform().to_string(),
        registered: token.is_some_and(|t| t.registered),
        unseen_notifications: desk.inbox().unseen_count(),
    };

    emit(json, &report, || {
        format!(
            "Session:       {}\nDevice token:  {}\nStored token:  {}\n\
             Platform:      {}\nRegistration:  {}\nUnseen:        {}",
            report
                .user
                .as_deref()
                .map_or("not logged in".to_string(), |u| format!("logged in as {u}")),
            report.device_token.as_deref().unwrap_or("not available"),
            report.stored_device_token.as_deref().unwrap_or("not available"),
            report.platform,
            if report.registered { "REGISTERED" } else { "NOT REGISTERED" },
            report.unseen_notifications
        )
    })
}

async fn utility(desk: &FrontDesk, action: UtilityAction, json: bool) -> Result<()> {
    let utilities = desk.utilities();
    match action {
        UtilityAction::List => {
            let items = utilities.list().await?;
            emit(json, &items, || {
                items
                    .iter()
                    .map(|u| {
                        format!(
                            "#{:<6} {} {:<16} {:>12} {}",
                            u.id,
                            u.date,
                            u.u_category,
                            u.startreading,
                            u.user.as_ref().map(|user| user.full_name()).unwrap_or_default()
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }
        UtilityAction::Categories => {
            let categories = utilities.categories().await?;
            emit(json, &categories, || {
                categories
                    .iter()
                    .map(|c| {
                        format!(
                            "{:<4} {:<20} unit price {}",
                            c.id, c.utility_category_name, c.unit_price
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }
        UtilityAction::Show { id } => {
            let item = utilities.get(id).await?;
            let image = utilities.image_url(&item.image);
            emit(json, &item, || {
                format!(
                    "#{} {} {}: {}\nimage: {}",
                    item.id,
                    item.date,
                    item.u_category,
                    item.startreading,
                    image.as_deref().unwrap_or("-")
                )
            })?;
        }
        UtilityAction::Chart { date } => {
            let chart = utilities.chart_data(date).await?;
            emit(json, &chart, || {
                chart
                    .total_count
                    .iter()
                    .map(|t| {
                        let bill = chart
                            .bill_for(&t.category)
                            .map(|b| b.total_bill_reading.as_str())
                            .unwrap_or("-");
                        format!(
                            "{:<20} total {:>10} bill {:>10} ({})",
                            t.category, t.total_count, t.total_bill, bill
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }
        UtilityAction::Save {
            id,
            date,
            category,
            reading,
            image,
        } => {
            let existing = utilities.list().await?;
            let draft = UtilityDraft {
                date: date.unwrap_or_else(|| chrono::Local::now().date_naive()),
                category_id: category,
                reading,
                image,
            };
            let saved = utilities.save(&draft, id, &existing).await?;
            let verb = if id.is_some() { "updated" } else { "added" };
            println!("Utility record {verb} (#{})", saved.id);
        }
        UtilityAction::Delete { id } => {
            utilities.delete(id).await?;
            println!("Utility record deleted");
        }
    }
    Ok(())
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_commands() {
        let cli = Cli::try_parse_from([
            "staydesk", "--json", "bookings", "--date", "2025-03-01", "--tab", "in_house",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Bookings { date, tab } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2025, 3, 1));
                assert_eq!(tab, BookingTab::InHouse);
            }
            other => panic!("unexpected {other:?}"),
        }

        let cli = Cli::try_parse_from([
            "staydesk", "utility", "save", "--category", "2", "--reading", "1200",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Utility {
                action: UtilityAction::Save { category: 2, .. }
            }
        ));
    }

    #[test]
    fn retry_hint_only_for_temporary_failures() {
        let server_down = anyhow::Error::from(staydesk::Error::Server { status: 503 });
        assert!(retry_hint(&server_down).is_some());

        let expired = anyhow::Error::from(staydesk::Error::SessionExpired);
        assert!(retry_hint(&expired).is_none());
        assert!(retry_hint(&anyhow::anyhow!("Log in first")).is_none());
    }

    #[test]
    fn rejects_unknown_filter() {
        assert!(Cli::try_parse_from(["staydesk", "booking-feed", "--status", "lost"]).is_err());
    }
}
