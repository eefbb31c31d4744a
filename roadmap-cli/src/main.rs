mod cli;
mod prompts;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use colored::{ColoredString, Colorize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use roadmap_core::db::{
    create_backend, export_store_json, import_store_json, migrate_store, KeyValueStore,
};
use roadmap_core::export::{export_file_name, parse_import, write_export};
use roadmap_core::{
    filter_items, get_config_path, upcoming_deadlines, validate_schedule, Applied, FetchRequest,
    HttpRoadmapSource, Item, ItemPatch, NewItem, Priority, Progress, RoadmapSession,
    RoadmapSource, StageStatus, StatusBreakdown, StatusFilter, StatusModel, TechStatus, Track,
    TrackPreference, TrackSource, TrackerConfig, WorkflowStatus,
};

use crate::cli::{Cli, Command, ConfigCommand, DbCommand};

/// Deadlines this close are listed by `stats`
const UPCOMING_DAYS: i64 = 7;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => get_config_path()?,
    };

    // Config commands run before the config is loaded
    if let Command::Config(config_cmd) = &cli.command {
        return handle_config_command(config_cmd, &config_path);
    }

    let config = TrackerConfig::load_or_default(&config_path)?;
    tracing::debug!(config = %config_path.display(), model = %config.status_model, "config loaded");
    match config.status_model {
        StatusModel::Checklist => run::<TechStatus>(&cli, &config).await,
        StatusModel::Stages => run::<StageStatus>(&cli, &config).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run<S: WorkflowStatus>(cli: &Cli, config: &TrackerConfig) -> Result<()> {
    let store_path = config.resolved_store_path()?;
    let store = create_backend(&store_path, config.backend_type()?)?;
    let source = Arc::new(HttpRoadmapSource::new(
        &config.api_base_url,
        config.request_timeout(),
    )?);

    if let Command::Db(db_cmd) = &cli.command {
        return handle_db_command::<S>(db_cmd, store, source, config);
    }

    let preference = if cli.local {
        TrackPreference::Local
    } else {
        config.track
    };
    let mut session: RoadmapSession<S> =
        RoadmapSession::open(store, &config.store_keys(), source.clone(), preference);
    if !session.engine().is_writable() || !session.catalog().is_writable() {
        eprintln!(
            "{} Stored data could not be read and will not be overwritten; changes are not saved until `db clear`.",
            "!".yellow()
        );
    }

    match &cli.command {
        Command::Roadmaps => list_roadmaps(source.as_ref(), session.remembered()).await,
        Command::Sync { roadmap } => sync(&mut session, roadmap.clone()).await,
        command => {
            if preference != TrackPreference::Local {
                load_remote(&mut session).await;
            }
            match session.active_source() {
                TrackSource::RemoteBacked => {
                    item_command::<S, _>(session.engine_mut(), TrackSource::RemoteBacked, command)
                }
                TrackSource::LocalOnly => {
                    item_command::<S, _>(session.catalog_mut(), TrackSource::LocalOnly, command)
                }
            }
        }
    }
}

/// Fetches the remembered roadmap; failures only warn so the local catalog can take over
async fn load_remote<S: WorkflowStatus>(session: &mut RoadmapSession<S>) {
    if let Applied::Failed(message) = session.fetch(FetchRequest::Initial).await {
        eprintln!(
            "{} Could not load roadmap ({}); using the local catalog.",
            "!".yellow(),
            message
        );
    }
}

async fn list_roadmaps(source: &dyn RoadmapSource, remembered: Option<&str>) -> Result<()> {
    let roadmaps = source.list_roadmaps().await?;
    if roadmaps.is_empty() {
        println!("{}", "No roadmaps available.".yellow());
        return Ok(());
    }

    println!("{:<2} {:<24} | {:<30} | {}", "", "ID", "Title", "Description");
    println!("{}", "-".repeat(90));
    for roadmap in roadmaps {
        let marker = if remembered == Some(roadmap.id.as_str()) {
            "*".green()
        } else {
            " ".normal()
        };
        println!(
            "{:<2} {:<24} | {:<30} | {}",
            marker,
            roadmap.id,
            roadmap.title,
            roadmap.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn sync<S: WorkflowStatus>(
    session: &mut RoadmapSession<S>,
    roadmap: Option<String>,
) -> Result<()> {
    let request = match roadmap {
        Some(id) => FetchRequest::Select(id),
        None => FetchRequest::Initial,
    };

    match session.fetch(request).await {
        Applied::Ready { count } => {
            let title = session
                .selected()
                .map(|roadmap| roadmap.title.clone())
                .unwrap_or_default();
            println!("{} Loaded {} items from '{}'.", "✓".green(), count, title);
            print_progress(&session.engine().progress());
            Ok(())
        }
        Applied::Failed(message) => anyhow::bail!("Sync failed: {}", message),
        Applied::Stale => Ok(()),
    }
}

fn item_command<S, T>(track: &mut T, source: TrackSource, command: &Command) -> Result<()>
where
    S: WorkflowStatus,
    T: Track<S>,
{
    match command {
        Command::List { status, search } => {
            let filter = match status {
                Some(raw) => StatusFilter::parse(raw)
                    .with_context(|| format!("Unknown status '{}'. {}", raw, valid_statuses::<S>()))?,
                None => StatusFilter::All,
            };
            let items = filter_items(track.items(), filter, search.as_deref().unwrap_or(""));
            print_items(&items, source);
        }
        Command::Stats => print_stats(track.items(), source),
        Command::Status { id, status } => {
            let status = parse_status::<S>(status)?;
            ensure_exists(track, id)?;
            track.transition(id, status)?;
            println!("{} {} is now {}.", "✓".green(), id, colored_status(status));
        }
        Command::Cycle { id } => {
            ensure_exists(track, id)?;
            track.cycle_status(id);
            if let Some(item) = track.working_set().get(id) {
                println!("{} {} is now {}.", "✓".green(), id, colored_status(item.status));
            }
        }
        Command::Notes { id, text } => {
            ensure_exists(track, id)?;
            track.set_notes(id, text);
            println!("{} Notes updated.", "✓".green());
        }
        Command::Schedule {
            id,
            deadline,
            clear_deadline,
            hours,
        } => {
            ensure_exists(track, id)?;
            let parsed = deadline.as_deref().map(parse_date).transpose()?;
            let problems = validate_schedule(parsed, *hours, Local::now().date_naive());
            if !problems.is_empty() {
                anyhow::bail!("{}", problems.join("; "));
            }

            let patch = ItemPatch {
                deadline: if *clear_deadline { Some(None) } else { parsed.map(Some) },
                estimated_hours: hours.map(Some),
                ..ItemPatch::default()
            };
            track.update_item(id, &patch);
            println!("{} Schedule updated.", "✓".green());
        }
        Command::Bulk { status, ids } => {
            let status = parse_status::<S>(status)?;
            let unknown: Vec<&str> = ids
                .iter()
                .map(String::as_str)
                .filter(|id| !track.working_set().contains(id))
                .collect();
            track.bulk_set_status(ids, status);
            println!(
                "{} Set {} item(s) to {}.",
                "✓".green(),
                ids.len() - unknown.len(),
                colored_status(status)
            );
            if !unknown.is_empty() {
                println!("{} Ignored unknown IDs: {}", "!".yellow(), unknown.join(", "));
            }
        }
        Command::CompleteAll { yes } => {
            if !*yes && !prompts::confirm("Mark every item as completed?")? {
                println!("{}", "Cancelled.".yellow());
                return Ok(());
            }
            track.complete_all();
            println!("{} All items completed.", "✓".green());
        }
        Command::ResetAll { yes } => {
            if !*yes && !prompts::confirm("Reset the status of every item?")? {
                println!("{}", "Cancelled.".yellow());
                return Ok(());
            }
            track.reset_all();
            println!("{} All items reset to {}.", "✓".green(), S::initial());
        }
        Command::Random => match track.pick_random() {
            Some(item) => println!(
                "{} Start with: {} ({})",
                "✓".green(),
                item.title.bold(),
                item.id
            ),
            None => println!("{}", "Every item is already underway.".yellow()),
        },
        Command::Add {
            title,
            description,
            priority,
            category,
            hours,
        } => {
            let priority = priority
                .as_deref()
                .map(|raw| {
                    Priority::parse(raw).with_context(|| {
                        format!("Unknown priority '{}'. Use low, medium or high", raw)
                    })
                })
                .transpose()?;
            if let Some(hours) = hours {
                let problems = validate_schedule(None, Some(*hours), Local::now().date_naive());
                if !problems.is_empty() {
                    anyhow::bail!("{}", problems.join("; "));
                }
            }

            let given = NewItem {
                title: title.clone().unwrap_or_default(),
                description: description.clone().unwrap_or_default(),
                priority,
                category: category.clone(),
                estimated_hours: *hours,
                deadline: None,
            };
            let ask_optional = title.is_none() && description.is_none();
            let fields = prompts::prompt_new_item(given, ask_optional)?;
            let item = track.add_item(fields);
            println!("{} Added {} ({}).", "✓".green(), item.title, item.id);
        }
        Command::Export { output } => {
            let path = output
                .clone()
                .unwrap_or_else(|| export_file_name(Local::now().date_naive()).into());
            write_export(&path, track.items())?;
            println!(
                "{} Exported {} items to {}.",
                "✓".green(),
                track.items().len(),
                path.display()
            );
        }
        Command::Import { file, yes } => {
            let content = fs::read_to_string(file)
                .with_context(|| format!("Failed to read import file: {:?}", file))?;
            let items: Vec<Item<S>> = parse_import(&content)?;

            if !*yes {
                println!(
                    "{} This replaces all {} current items with {} imported ones.",
                    "!".yellow(),
                    track.items().len(),
                    items.len()
                );
                if !prompts::confirm("Continue with the import?")? {
                    println!("{}", "Import cancelled.".yellow());
                    return Ok(());
                }
            }
            let count = track.import_replace(items)?.len();
            println!("{} Imported {} items.", "✓".green(), count);
        }
        Command::Roadmaps | Command::Sync { .. } | Command::Config(_) | Command::Db(_) => {
            unreachable!("handled before item commands")
        }
    }

    Ok(())
}

fn ensure_exists<S: WorkflowStatus, T: Track<S>>(track: &T, id: &str) -> Result<()> {
    if !track.working_set().contains(id) {
        anyhow::bail!("No item with ID '{}'", id);
    }
    Ok(())
}

fn valid_statuses<S: WorkflowStatus>() -> String {
    let names: Vec<&str> = S::ALL.iter().map(|status| status.as_str()).collect();
    format!("Valid statuses: {}", names.join(", "))
}

fn parse_status<S: WorkflowStatus>(raw: &str) -> Result<S> {
    S::parse(raw).with_context(|| format!("Unknown status '{}'. {}", raw, valid_statuses::<S>()))
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", raw))
}

fn colored_status<S: WorkflowStatus>(status: S) -> ColoredString {
    let label = status.as_str();
    if status.is_completed() {
        label.green()
    } else if status == S::in_progress() {
        label.blue()
    } else if status == S::initial() {
        label.yellow()
    } else {
        label.red()
    }
}

fn print_items<S: WorkflowStatus>(items: &[&Item<S>], source: TrackSource) {
    if items.is_empty() {
        println!("{}", "No items found.".yellow());
        return;
    }

    println!(
        "{:<36} | {:<30} | {:<12} | {:<15} | {:<10}",
        "ID", "Title", "Status", "Category", "Deadline"
    );
    println!("{}", "-".repeat(115));
    for item in items {
        let deadline = item
            .deadline
            .map(|date| date.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<36} | {:<30} | {:<12} | {:<15} | {:<10}",
            item.id,
            item.title,
            colored_status(item.status),
            item.category,
            deadline
        );
    }
    println!("{}", format!("({} items, {} track)", items.len(), source).dimmed());
}

fn print_progress(progress: &Progress) {
    println!(
        "Progress: {}% ({} of {} completed, {} in progress, {} not started)",
        progress.percent().to_string().bold(),
        progress.completed,
        progress.total,
        progress.in_progress,
        progress.not_started
    );
}

fn print_stats<S: WorkflowStatus>(items: &[Item<S>], source: TrackSource) {
    println!("{}", format!("Statistics ({} track)", source).blue().bold());
    print_progress(&Progress::of(items));

    let breakdown = StatusBreakdown::of(items);
    println!();
    for row in &breakdown.rows {
        println!(
            "  {:<12} {:>4}  {:>3}%",
            colored_status(row.status),
            row.count,
            row.percent
        );
    }

    let today = Local::now().date_naive();
    let due = upcoming_deadlines(items, today, UPCOMING_DAYS);
    if !due.is_empty() {
        println!("\n{}", "Upcoming deadlines:".yellow());
        for item in due {
            let marker = match item.deadline {
                Some(date) if date < today => "overdue".red(),
                _ => "due".normal(),
            };
            println!(
                "  {} {} {}",
                item.deadline.map(|d| d.to_string()).unwrap_or_default(),
                marker,
                item.title
            );
        }
    }
}

fn handle_config_command(command: &ConfigCommand, config_path: &Path) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let config = TrackerConfig::load_or_default(config_path)?;
            println!("{} {}", "Config file:".blue(), config_path.display());
            let store = create_backend(&config.resolved_store_path()?, config.backend_type()?)?;
            let stats = store.stats()?;
            match store.location() {
                Some(path) => println!(
                    "{} {} ({}, {} keys)",
                    "Store:".blue(),
                    path.display(),
                    stats.backend_type,
                    stats.key_count
                ),
                None => println!("{} {} ({} keys)", "Store:".blue(), stats.backend_type, stats.key_count),
            }
            println!();
            print!("{}", config.to_yaml()?);
        }
        ConfigCommand::Init => {
            if TrackerConfig::create_default(config_path)? {
                println!("{} Wrote default config to {}", "✓".green(), config_path.display());
            } else {
                println!(
                    "{} Config already exists at {}",
                    "!".yellow(),
                    config_path.display()
                );
            }
        }
    }
    Ok(())
}

fn handle_db_command<S: WorkflowStatus>(
    command: &DbCommand,
    store: Arc<dyn KeyValueStore>,
    source: Arc<dyn RoadmapSource>,
    config: &TrackerConfig,
) -> Result<()> {
    match command {
        DbCommand::Migrate { to } => {
            let target = create_backend(to, None)?;
            let copied = migrate_store(store.as_ref(), target.as_ref())?;
            println!(
                "{} Copied {} keys from {} to {} ({}).",
                "✓".green(),
                copied,
                store.backend_type(),
                to.display(),
                target.backend_type()
            );
        }
        DbCommand::Dump { output } => {
            export_store_json(store.as_ref(), output)?;
            println!("{} Wrote store backup to {}.", "✓".green(), output.display());
        }
        DbCommand::Restore { file } => {
            let restored = import_store_json(store.as_ref(), file)?;
            println!("{} Restored {} keys.", "✓".green(), restored);
        }
        DbCommand::Clear { catalog, all, yes } => {
            let question = if *all {
                "Remove all local data (item edits, local catalog, remembered roadmap)?"
            } else if *catalog {
                "Replace the local catalog with the starter items?"
            } else {
                "Remove all local edits to roadmap items?"
            };
            if !*yes && !prompts::confirm(question)? {
                println!("{}", "Cancelled.".yellow());
                return Ok(());
            }

            let mut session: RoadmapSession<S> =
                RoadmapSession::open(store, &config.store_keys(), source, config.track);
            if *all {
                session.clear_local_data()?;
                println!("{} Cleared all local data.", "✓".green());
            } else if *catalog {
                session.catalog_mut().clear()?;
                println!("{} Local catalog restored to the starter items.", "✓".green());
            } else {
                let cleared = session.engine().overlay().len();
                session.engine_mut().clear_overlay();
                println!("{} Cleared {} stored edits.", "✓".green(), cleared);
            }
        }
    }
    Ok(())
}
