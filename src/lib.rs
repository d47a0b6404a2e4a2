pub mod aggregate;
pub mod bookmarks;
pub mod config;
pub mod db;
pub mod discovery;
pub mod geo;
pub mod models;
pub mod selection;
pub mod sort;
pub mod sources;
pub mod tracking;
mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bookmarks::BookmarkOutcome;
use config::{AppConfig, ConfigStore};
use db::Store;
use discovery::{Discovery, ManualEventInput, SearchRequest};
use geo::{DistanceEngine, GeoResolver, NominatimGeocoder};
use models::{event_type_label, DiscoveredEvent};
use selection::CommitOutcome;
use sort::SortKey;

#[derive(Parser)]
#[command(name = "market-scout")]
#[command(about = "Find craft fairs, markets and conventions near you and track the ones you apply to")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search all enabled sources around a ZIP code, "lat,lon" pair or place name
    Search {
        location: String,

        /// Search radius in miles (defaults to the configured radius)
        #[arg(short, long)]
        radius: Option<u32>,

        /// Only this event type (e.g. "craft-fair", "farmers-market", "convention")
        #[arg(short = 't', long = "type")]
        event_type: Option<String>,

        /// First date to include (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last date to include (YYYY-MM-DD, defaults to three months after --from)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Also look at last year's events
        #[arg(long)]
        historical: bool,

        /// date, date-desc, distance, cost or name
        #[arg(short, long)]
        sort: Option<SortKey>,

        /// Add every result not yet applied to the events list
        #[arg(long)]
        apply_all: bool,
    },
    /// Resolve a location and print its coordinates
    Resolve { location: String },
    /// Save an event you found elsewhere
    Add {
        name: String,

        #[arg(short, long)]
        date: String,

        #[arg(short, long)]
        end: Option<String>,

        #[arg(short, long)]
        location: String,

        #[arg(short, long, default_value_t = 0.0)]
        cost: f64,

        #[arg(short = 't', long = "type", default_value = "craft-fair")]
        event_type: String,

        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },
    /// List saved manual entries
    Saved {
        /// Remove the saved entry with this id
        #[arg(long)]
        remove: Option<String>,
    },
    /// Add a saved entry to the events list and mark it applied
    Apply { id: String },
    /// Toggle the interested flag on an event
    Interested { id: String },
    /// Show applied and interested events
    Tracked,
    /// List bookmarks, or bookmark/unbookmark a saved entry
    Bookmarks {
        #[arg(long, conflicts_with = "remove")]
        add: Option<String>,

        #[arg(long)]
        remove: Option<String>,
    },
    /// Show or change stored settings
    Config {
        #[arg(long)]
        radius: Option<u32>,

        #[arg(long)]
        sort: Option<SortKey>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("market_scout_lib=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run() {
    init_tracing();
    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: could not start async runtime: {err}");
            std::process::exit(1);
        }
    };
    if let Err(err) = runtime.block_on(dispatch(cli)) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config_store = ConfigStore::load();
    let config = config_store.read();
    let today = Local::now().date_naive();

    match cli.command {
        Commands::Search {
            location,
            radius,
            event_type,
            from,
            to,
            historical,
            sort,
            apply_all,
        } => {
            let request = SearchRequest {
                location,
                radius_miles: radius.unwrap_or(config.default_radius_miles),
                event_type,
                date_from: from,
                date_to: to,
                include_historical: historical,
                today,
            };
            let sort = sort.unwrap_or_else(|| config.default_sort.parse().unwrap_or_default());
            cmd_search(&config, request, sort, apply_all).await
        }
        Commands::Resolve { location } => cmd_resolve(&config, &location).await,
        Commands::Add {
            name,
            date,
            end,
            location,
            cost,
            event_type,
            url,
            description,
        } => {
            let input = ManualEventInput {
                name,
                start_date: date,
                end_date: end,
                location,
                table_cost: cost,
                event_type,
                url,
                description,
            };
            cmd_add(&config, input).await
        }
        Commands::Saved { remove } => cmd_saved(&config, remove.as_deref()),
        Commands::Apply { id } => cmd_apply(&config, &id),
        Commands::Interested { id } => cmd_interested(&config, &id),
        Commands::Tracked => cmd_tracked(&config),
        Commands::Bookmarks { add, remove } => {
            cmd_bookmarks(&config, add.as_deref(), remove.as_deref(), today)
        }
        Commands::Config { radius, sort } => cmd_config(&config_store, radius, sort),
    }
}

fn open_store() -> Result<Arc<Store>> {
    Ok(Arc::new(Store::open_default().context("opening the data store")?))
}

fn build_engine(config: &AppConfig) -> Result<DistanceEngine> {
    let geocoder = NominatimGeocoder::from_config(config).context("building the geocoder")?;
    Ok(DistanceEngine::new(GeoResolver::new(Arc::new(geocoder))))
}

fn open_session(config: &AppConfig) -> Result<Discovery> {
    let store = open_store()?;
    let engine = build_engine(config)?;
    let sources = sources::active_sources(config, store.clone());
    Ok(Discovery::new(store, sources, engine)?)
}

fn print_event(discovery: &Discovery, event: &DiscoveredEvent, today: NaiveDate) {
    let location = discovery
        .display_location_of(&event.id)
        .unwrap_or_else(|| event.location.clone());
    let distance = match event.distance {
        Some(miles) => format!("{miles:.1} mi"),
        None => "-".to_string(),
    };
    let status = discovery.status(&event.id);
    let mut flags = Vec::new();
    if status.applied {
        flags.push("applied");
    }
    if status.interested {
        flags.push("interested");
    }
    println!(
        "{}  {:<40}  {:<28}  {:>9}  ${:<7.0} {:<6} {:<10} {} {}",
        event.start_date,
        event.name,
        location,
        distance,
        event.cost(),
        event.profitability().label(),
        event.time_status(today).label(),
        event.id,
        flags.join(",")
    );
}

async fn cmd_search(
    config: &AppConfig,
    request: SearchRequest,
    sort: SortKey,
    apply_all: bool,
) -> Result<()> {
    let today = request.today;
    let mut discovery = open_session(config)?;
    let outcome = discovery.search(request).await?;

    if outcome.count == 0 {
        println!("No events found near {}.", outcome.location);
        println!("Try a larger radius, --historical, or `market-scout add` for events found elsewhere.");
        return Ok(());
    }

    println!("{} events near {}", outcome.count, outcome.location);
    if !outcome.failed_sources.is_empty() {
        println!("(unavailable: {})", outcome.failed_sources.join(", "));
    }
    for event in discovery.sorted(sort) {
        print_event(&discovery, &event, today);
    }

    if apply_all {
        let selected = discovery.select_all_unapplied();
        let summary = discovery.bulk_apply()?;
        println!(
            "Applied to {selected} events: {} added, {} already in your events list",
            summary.added, summary.already_existed
        );
    }
    Ok(())
}

async fn cmd_resolve(config: &AppConfig, location: &str) -> Result<()> {
    let store = open_store()?;
    let engine = build_engine(config)?;
    if let Some(saved) = store.user_location()? {
        engine.resolver().seed(&saved);
    }
    let resolved = engine.resolver().resolve(location).await?;
    println!("{}", resolved.address);
    println!("lat {:.5}, lon {:.5}", resolved.lat, resolved.lon);
    if let Some(zip) = &resolved.zip {
        println!("zip {zip}");
    }
    Ok(())
}

async fn cmd_add(config: &AppConfig, input: ManualEventInput) -> Result<()> {
    let mut discovery = open_session(config)?;
    let event = discovery.save_manual_event(input).await?;
    println!(
        "Saved {} ({}) on {} at {} as {}",
        event.name,
        event_type_label(&event.event_type),
        event.start_date,
        event.location,
        event.id
    );
    Ok(())
}

fn cmd_saved(config: &AppConfig, remove: Option<&str>) -> Result<()> {
    let mut discovery = open_session(config)?;
    if let Some(id) = remove {
        if discovery.remove_saved_event(id)? {
            println!("Removed {id}");
        } else {
            println!("No saved entry with id {id}");
        }
        return Ok(());
    }
    let saved = discovery.saved_events()?;
    if saved.is_empty() {
        println!("No saved events yet.");
    }
    for event in saved {
        println!(
            "{}  {:<40}  {:<28}  {}",
            event.start_date, event.name, event.location, event.id
        );
    }
    Ok(())
}

fn cmd_apply(config: &AppConfig, id: &str) -> Result<()> {
    let mut discovery = open_session(config)?;
    match discovery.quick_apply(id)? {
        CommitOutcome::Added => println!("Added to your events list and marked applied."),
        CommitOutcome::AlreadyExisted => {
            println!("Already in your events list. Marked applied.")
        }
    }
    Ok(())
}

fn cmd_interested(config: &AppConfig, id: &str) -> Result<()> {
    let mut discovery = open_session(config)?;
    if discovery.mark_interested(id)? {
        println!("Marked {id} as interested");
    } else {
        println!("Cleared interested on {id}");
    }
    Ok(())
}

fn cmd_tracked(config: &AppConfig) -> Result<()> {
    let discovery = open_session(config)?;
    let entries = discovery.tracking().entries();
    if entries.is_empty() {
        println!("Nothing tracked yet.");
    }
    for (id, status) in entries {
        let mut flags = Vec::new();
        if status.applied {
            flags.push("applied");
        }
        if status.interested {
            flags.push("interested");
        }
        println!(
            "{id}  {:<20}  {}",
            flags.join(","),
            status.tracked_at.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn cmd_bookmarks(
    config: &AppConfig,
    add: Option<&str>,
    remove: Option<&str>,
    today: NaiveDate,
) -> Result<()> {
    let mut discovery = open_session(config)?;
    if let Some(id) = add {
        match discovery.bookmark(id, today)? {
            BookmarkOutcome::Added(saved) if saved.event.is_historical => {
                println!("Bookmarked {}. It already happened; keep it for next year.", saved.event.name)
            }
            BookmarkOutcome::Added(saved) => println!("Bookmarked {}", saved.event.name),
            BookmarkOutcome::AlreadyBookmarked => println!("{id} is already bookmarked"),
        }
        return Ok(());
    }
    if let Some(id) = remove {
        if discovery.remove_bookmark(id)? {
            println!("Removed bookmark {id}");
        } else {
            println!("No bookmark with id {id}");
        }
        return Ok(());
    }

    let bookmarks = discovery.bookmarks();
    if bookmarks.is_empty() {
        println!("No bookmarks yet.");
    }
    for bookmark in bookmarks {
        let next = bookmark
            .suggested_date(today)
            .map(|date| format!("next: {date}"))
            .unwrap_or_default();
        println!(
            "{}  {:<40}  {:<28}  {}",
            bookmark.original_date, bookmark.event.name, bookmark.event.location, next
        );
    }
    Ok(())
}

fn cmd_config(store: &ConfigStore, radius: Option<u32>, sort: Option<SortKey>) -> Result<()> {
    let config = if radius.is_some() || sort.is_some() {
        store
            .update(|config| {
                if let Some(radius) = radius {
                    config.default_radius_miles = radius;
                }
                if let Some(sort) = sort {
                    config.default_sort = sort.to_string();
                }
            })
            .map_err(anyhow::Error::msg)?
    } else {
        store.read()
    };
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
