use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use vaccal_core::*;

#[derive(Parser)]
#[command(name = "vaccal")]
#[command(about = "Child vaccination calendar", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use this config file instead of the default one
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the child's profile (clears all progress)
    Setup {
        /// Date of birth (YYYY-MM-DD)
        #[arg(long)]
        dob: String,

        /// Country code, e.g. RU or US
        #[arg(long)]
        country: String,
    },

    /// Show the vaccination schedule (default)
    Show {
        /// Reference day for overdue/upcoming (YYYY-MM-DD, default today)
        #[arg(long)]
        today: Option<String>,

        /// Only overdue vaccinations
        #[arg(long, conflicts_with = "upcoming")]
        overdue: bool,

        /// Only vaccinations due within the configured number of months
        #[arg(long)]
        upcoming: bool,
    },

    /// List optional vaccinations that can be added
    Optional,

    /// Add an optional vaccination to the schedule
    Add { id: String },

    /// Remove an optional vaccination from the schedule
    Remove { id: String },

    /// Toggle a vaccination between done and not done
    Done { id: String },

    /// Set the note for a vaccination (no text clears it)
    Note {
        id: String,
        text: Vec<String>,
    },

    /// Forget the profile and all progress
    Reset,

    /// List countries with a vaccination catalog
    Countries,

    /// Export the schedule to CSV
    Export {
        /// Output file
        path: PathBuf,

        /// Reference day for statuses (YYYY-MM-DD, default today)
        #[arg(long)]
        today: Option<String>,
    },
}

fn main() -> Result<()> {
    vaccal_core::logging::init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());

    match cli.command {
        Some(Commands::Countries) => cmd_countries(&config),
        Some(command) => {
            let mut store = open_store(&data_dir, &config)?;
            match command {
                Commands::Setup { dob, country } => cmd_setup(&mut store, &dob, &country),
                Commands::Show {
                    today,
                    overdue,
                    upcoming,
                } => cmd_show(&store, today.as_deref(), overdue, upcoming, &config),
                Commands::Optional => cmd_optional(&store),
                Commands::Add { id } => cmd_add(&mut store, &id),
                Commands::Remove { id } => cmd_remove(&mut store, &id),
                Commands::Done { id } => cmd_done(&mut store, &id),
                Commands::Note { id, text } => cmd_note(&mut store, &id, &text.join(" ")),
                Commands::Reset => cmd_reset(&mut store),
                Commands::Export { path, today } => cmd_export(&store, &path, today.as_deref()),
                Commands::Countries => cmd_countries(&config),
            }
        }
        None => {
            // Default to "show" command
            let store = open_store(&data_dir, &config)?;
            cmd_show(&store, None, false, false, &config)
        }
    }
}

fn open_store(data_dir: &Path, config: &Config) -> Result<VaccinationStore<FileStore>> {
    tracing::debug!("Opening store in {:?}", data_dir);
    let kv = FileStore::open(data_dir.join("store.json"))?;
    let provider = CatalogProvider::from_config(&config.catalog);
    Ok(VaccinationStore::open(kv, provider))
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| Error::InvalidDate(format!("'{}': {}", value, e)))
}

fn today_or(value: Option<&str>) -> Result<NaiveDate> {
    match value {
        Some(value) => parse_date(value),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

/// Print a hint and report whether the store has a profile
fn require_profile<K: KeyValueStore>(store: &VaccinationStore<K>) -> bool {
    if store.state() == StoreState::Onboarding {
        println!("No profile yet. Run `vaccal setup --dob YYYY-MM-DD --country CODE` first.");
        return false;
    }
    true
}

fn report_catalog_status(status: &CatalogStatus) {
    match status {
        CatalogStatus::Fallback {
            requested,
            country,
            reason,
        } => {
            println!("⚠ No catalog for {} ({}); showing {} instead.", requested, reason, country);
        }
        CatalogStatus::Unavailable { requested, reason } => {
            println!("⚠ No catalog for {} ({}); the schedule is empty.", requested, reason);
        }
        CatalogStatus::Loaded { .. } | CatalogStatus::NotLoaded => {}
    }
}

fn cmd_setup<K: KeyValueStore>(
    store: &mut VaccinationStore<K>,
    dob: &str,
    country: &str,
) -> Result<()> {
    let date_of_birth = parse_date(dob)?;
    let status = store.set_profile(date_of_birth, country)?;

    if let Some(profile) = store.profile() {
        println!(
            "✓ Profile saved: born {}, country {}",
            profile.date_of_birth, profile.country_code
        );
    }
    report_catalog_status(&status);
    println!("  {} mandatory vaccinations scheduled", store.mandatory_entries().len());
    Ok(())
}

fn cmd_show<K: KeyValueStore>(
    store: &VaccinationStore<K>,
    today: Option<&str>,
    overdue: bool,
    upcoming: bool,
    config: &Config,
) -> Result<()> {
    if !require_profile(store) {
        return Ok(());
    }
    let today = today_or(today)?;

    if let Some(profile) = store.profile() {
        println!(
            "Child born {} · country {}",
            profile.date_of_birth, profile.country_code
        );
    }
    report_catalog_status(store.catalog_status());
    let (completed, total) = store.progress();
    println!("Progress: {}/{} done", completed, total);

    let items = if overdue {
        store.overdue(today)
    } else if upcoming {
        store.upcoming(today, config.schedule.upcoming_months)
    } else {
        store.schedule(today)
    };

    if items.is_empty() {
        println!("\nNothing to show.");
        return Ok(());
    }

    println!();
    for item in &items {
        display_item(item);
    }
    Ok(())
}

fn display_item(item: &ScheduleItem) {
    let mark = if item.completed { "x" } else { " " };
    let due = item
        .due_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "unknown   ".to_string());
    let kind = match item.kind {
        EntryKind::Mandatory => "",
        EntryKind::Optional => " [optional]",
    };
    let status = match item.status {
        DueStatus::Overdue => " (overdue)",
        _ => "",
    };

    println!(
        "  [{}] {}  {:<20} {}{}{}",
        mark, due, item.entry.id, item.entry.name, kind, status
    );
    if let Some(note) = &item.note {
        println!("      note: {}", note);
    }
}

fn cmd_optional<K: KeyValueStore>(store: &VaccinationStore<K>) -> Result<()> {
    if !require_profile(store) {
        return Ok(());
    }

    let available = store.available_optional_entries();
    if available.is_empty() {
        println!("No optional vaccinations left to add.");
        return Ok(());
    }

    println!("Optional vaccinations:");
    for entry in available {
        println!("  {:<20} {} ({})", entry.id, entry.name, entry.age_offset);
        if let Some(description) = &entry.description {
            println!("      {}", description);
        }
    }
    Ok(())
}

fn cmd_add<K: KeyValueStore>(store: &mut VaccinationStore<K>, id: &str) -> Result<()> {
    if !require_profile(store) {
        return Ok(());
    }

    if store.add_optional(id)? {
        println!("✓ Added {} to the schedule", id);
    } else if store.is_optional_included(id) {
        println!("{} is already on the schedule", id);
    } else {
        println!("No optional vaccination '{}' in this catalog", id);
    }
    Ok(())
}

fn cmd_remove<K: KeyValueStore>(store: &mut VaccinationStore<K>, id: &str) -> Result<()> {
    if !require_profile(store) {
        return Ok(());
    }

    if store.remove_optional(id)? {
        println!("✓ Removed {} from the schedule", id);
    } else {
        println!("{} is not on the schedule", id);
    }
    Ok(())
}

fn cmd_done<K: KeyValueStore>(store: &mut VaccinationStore<K>, id: &str) -> Result<()> {
    if !require_profile(store) {
        return Ok(());
    }

    if store.catalog().and_then(|c| c.entry(id)).is_none() {
        println!("⚠ '{}' is not in the current catalog", id);
        return Ok(());
    }
    if store.toggle_completed(id)? {
        println!("✓ {} marked as done", id);
    } else {
        println!("✓ {} marked as not done", id);
    }
    Ok(())
}

fn cmd_note<K: KeyValueStore>(store: &mut VaccinationStore<K>, id: &str, text: &str) -> Result<()> {
    if !require_profile(store) {
        return Ok(());
    }

    store.set_note(text, id)?;
    if store.note(id).is_empty() {
        println!("✓ Note cleared for {}", id);
    } else {
        println!("✓ Note saved for {}", id);
    }
    Ok(())
}

fn cmd_reset<K: KeyValueStore>(store: &mut VaccinationStore<K>) -> Result<()> {
    store.clear_profile()?;
    println!("✓ Profile and progress cleared");
    Ok(())
}

fn cmd_countries(config: &Config) -> Result<()> {
    let provider = CatalogProvider::from_config(&config.catalog);
    for country in provider.available_countries() {
        println!("  {}  {}", country.code, country.name);
    }
    Ok(())
}

fn cmd_export<K: KeyValueStore>(
    store: &VaccinationStore<K>,
    path: &Path,
    today: Option<&str>,
) -> Result<()> {
    if !require_profile(store) {
        return Ok(());
    }

    let items = store.schedule(today_or(today)?);
    let count = vaccal_core::export::export_schedule(&items, path)?;
    println!("✓ Exported {} vaccinations", count);
    println!("  CSV: {}", path.display());
    Ok(())
}
