//! Hearth CLI - shared family calendar from the terminal
//!
//! Runs the offline-first core in local-only mode: every mutation lands in
//! the local store immediately and waits in the durable sync queue until a
//! remote backend is wired up.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use hearth_core::config::CalendarConfig;
use hearth_core::models::{EventColor, EventDraft, EventId, EventKind, Frequency, RecurrenceRule};
use hearth_core::net::Connectivity;
use hearth_core::remote::{MemoryRemote, RemoteStore};
use hearth_core::services::EventService;
use hearth_core::storage::{EventStore, FileKv, SyncQueueStore};
use hearth_core::sync::SyncEngine;
use hearth_core::Event;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "hearth")]
#[command(about = "Shared family calendar from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to the local store file
    #[arg(long, value_name = "PATH")]
    store_path: Option<PathBuf>,

    /// Group the calendar is scoped to
    #[arg(long, default_value = "family")]
    group: String,

    /// Acting user id
    #[arg(long, default_value = "local-user")]
    user: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new event
    #[command(alias = "new")]
    Add {
        /// Event title
        title: String,
        /// Start, `YYYY-MM-DD HH:MM` or `YYYY-MM-DD`
        #[arg(long)]
        start: String,
        /// End, defaults to one hour after start
        #[arg(long)]
        end: Option<String>,
        /// All-day event (end normalizes to end of day)
        #[arg(long)]
        all_day: bool,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Palette color (red, teal, blue, orange, green, yellow, purple, gray)
        #[arg(long, default_value = "blue")]
        color: String,
        /// Repeat frequency (daily, weekly, monthly, yearly)
        #[arg(long)]
        repeat: Option<String>,
        /// Repeat step, e.g. every 2 weeks
        #[arg(long, default_value = "1")]
        interval: u32,
        /// Stop after this many occurrences
        #[arg(long)]
        count: Option<u32>,
        /// Stop repeating after this date
        #[arg(long)]
        until: Option<String>,
        /// Reminder offset in minutes before start
        #[arg(long)]
        reminder: Option<u32>,
    },
    /// List upcoming events
    List {
        /// Number of events to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show events for one day (today when omitted)
    Day {
        /// Date, `YYYY-MM-DD`
        date: Option<String>,
    },
    /// Show events in a date range, recurring events expanded
    Range {
        /// Window start, `YYYY-MM-DD`
        start: String,
        /// Window end, `YYYY-MM-DD`
        end: String,
    },
    /// Delete an event (soft delete, synced as a tombstone)
    Delete {
        /// Event id, or an expanded instance id for a single occurrence
        id: String,
        /// Delete the whole series when targeting a recurring instance
        #[arg(long)]
        series: bool,
    },
    /// Show pending sync queue items
    Queue {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Attempt to drain the sync queue
    Sync,
    /// Show sync status and store counters
    Status,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] hearth_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Unrecognized date '{0}', expected YYYY-MM-DD or YYYY-MM-DD HH:MM")]
    InvalidDate(String),
    #[error("Unknown color '{0}'")]
    UnknownColor(String),
    #[error("Unknown repeat frequency '{0}'")]
    UnknownFrequency(String),
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hearth=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let app = App::open(cli.store_path, cli.group, cli.user).await?;

    match cli.command {
        Commands::Add {
            title,
            start,
            end,
            all_day,
            location,
            description,
            color,
            repeat,
            interval,
            count,
            until,
            reminder,
        } => {
            let start_date = parse_datetime(&start)?;
            let end_date = match end {
                Some(value) => parse_datetime(&value)?,
                None => start_date + chrono::Duration::hours(1),
            };
            let recurrence = build_rule(repeat.as_deref(), interval, count, until.as_deref())?;
            let draft = EventDraft {
                title,
                description,
                location,
                start_date,
                end_date,
                all_day,
                color: parse_color(&color)?,
                kind: if recurrence.is_some() {
                    EventKind::Recurring
                } else {
                    EventKind::Single
                },
                recurrence,
                reminder_minutes: reminder,
                ..EventDraft::default()
            };
            let event = app.service.add_event(draft).await?;
            println!("Added {} ({})", event.title, event.id);
            print_sync_hint(&app).await;
        }
        Commands::List { limit, json } => {
            let mut events = app.service.events().await;
            events.sort_by_key(|e| e.start_date);
            events.truncate(limit);
            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else if events.is_empty() {
                println!("No events.");
            } else {
                for event in &events {
                    print_event_line(event);
                }
            }
        }
        Commands::Day { date } => {
            let day = match date {
                Some(value) => parse_datetime(&value)?,
                None => Utc::now(),
            };
            let events = app.service.events_for_date(day).await;
            if events.is_empty() {
                println!("No events on {}.", day.format("%d.%m.%Y"));
            } else {
                for event in &events {
                    print_event_line(event);
                }
            }
        }
        Commands::Range { start, end } => {
            let window_start = parse_datetime(&start)?;
            let window_end = parse_datetime(&end)?;
            for event in app.service.events_for_range(window_start, window_end).await {
                print_event_line(&event);
            }
        }
        Commands::Delete { id, series } => {
            let event_id = EventId::from(id.as_str());
            app.service.delete_event(&event_id, series).await?;
            println!("Deleted {id}");
            print_sync_hint(&app).await;
        }
        Commands::Queue { json } => {
            let items = app.engine.pending_items().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else if items.is_empty() {
                println!("Sync queue is empty.");
            } else {
                for item in &items {
                    println!(
                        "{:<8} {:<6} {}  retries: {}",
                        format!("{:?}", item.op).to_lowercase(),
                        format!("{:?}", item.entity).to_lowercase(),
                        item.entity_id,
                        item.retry_count
                    );
                }
            }
        }
        Commands::Sync => {
            app.service.sync_pending_changes().await;
            println!("Sync status: {}", app.service.sync_status());
        }
        Commands::Status => {
            let events = app.service.events().await;
            let pending = app.engine.pending_items().await;
            println!("Sync status: {}", app.service.sync_status());
            println!("Events: {}", events.len());
            println!("Pending sync items: {}", pending.len());
        }
    }

    Ok(())
}

struct App {
    service: Arc<EventService>,
    engine: Arc<SyncEngine>,
}

impl App {
    async fn open(
        store_path: Option<PathBuf>,
        group: String,
        user: String,
    ) -> Result<Self, CliError> {
        let path = store_path.unwrap_or_else(default_store_path);
        let kv = Arc::new(FileKv::new(path));
        let store = EventStore::new(kv.clone());
        let queue = SyncQueueStore::new(kv);
        let remote = Arc::new(MemoryRemote::new());

        // No remote backend is wired up yet, so the CLI runs permanently
        // offline: mutations queue durably and drain once a backend exists.
        tracing::info!("Running in local-only mode (no remote backend configured)");
        let connectivity = Connectivity::new(false);
        let engine = SyncEngine::new(
            store.clone(),
            queue,
            remote.clone() as Arc<dyn RemoteStore>,
            connectivity.watch(),
        );
        let service = EventService::new(
            CalendarConfig::new(group, user),
            store,
            engine.clone(),
            remote as Arc<dyn RemoteStore>,
        )?;
        service.reload().await;
        Ok(Self {
            service: Arc::new(service),
            engine,
        })
    }
}

fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hearth")
        .join("store.json")
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>, CliError> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M") {
        return local_to_utc(naive, value);
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return local_to_utc(naive, value);
        }
    }
    Err(CliError::InvalidDate(value.to_string()))
}

fn local_to_utc(naive: NaiveDateTime, raw: &str) -> Result<DateTime<Utc>, CliError> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| CliError::InvalidDate(raw.to_string()))
}

fn parse_color(value: &str) -> Result<EventColor, CliError> {
    match value.to_ascii_lowercase().as_str() {
        "red" => Ok(EventColor::Red),
        "teal" => Ok(EventColor::Teal),
        "blue" => Ok(EventColor::Blue),
        "orange" => Ok(EventColor::Orange),
        "green" => Ok(EventColor::Green),
        "yellow" => Ok(EventColor::Yellow),
        "purple" => Ok(EventColor::Purple),
        "gray" => Ok(EventColor::Gray),
        _ => Err(CliError::UnknownColor(value.to_string())),
    }
}

fn build_rule(
    repeat: Option<&str>,
    interval: u32,
    count: Option<u32>,
    until: Option<&str>,
) -> Result<Option<RecurrenceRule>, CliError> {
    let Some(repeat) = repeat else {
        return Ok(None);
    };
    let frequency = match repeat.to_ascii_lowercase().as_str() {
        "daily" => Frequency::Daily,
        "weekly" => Frequency::Weekly,
        "monthly" => Frequency::Monthly,
        "yearly" => Frequency::Yearly,
        _ => return Err(CliError::UnknownFrequency(repeat.to_string())),
    };
    let mut rule = RecurrenceRule::new(frequency, interval);
    rule.count = count;
    rule.end_date = until.map(parse_datetime).transpose()?;
    Ok(Some(rule))
}

fn print_event_line(event: &Event) {
    let local_start = event.start_date.with_timezone(&Local);
    let when = if event.all_day {
        local_start.format("%d.%m.%Y (all day)").to_string()
    } else {
        format!(
            "{} {}\u{2013}{}",
            local_start.format("%d.%m.%Y"),
            local_start.format("%H:%M"),
            event.end_date.with_timezone(&Local).format("%H:%M")
        )
    };
    let sync_marker = if event.is_synced { "" } else { " *" };
    println!("{when}  {}  ({}){sync_marker}", event.title, event.id);
}

async fn print_sync_hint(app: &App) {
    let pending = app.engine.pending_items().await.len();
    if pending > 0 {
        println!("({pending} change(s) queued for sync)");
    }
}
