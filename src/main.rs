pub mod models {
    pub mod dashboard;
    pub mod site;
}

pub mod aggregator;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod db {
    pub mod models;
}
pub mod schema;
pub mod utils;
pub mod validation;
pub mod services {
    pub mod dashboard;
    pub mod demo;
    pub mod measurements;
    pub mod progress;
    pub mod query;
    pub mod sync;
    pub mod users;
}

use crate::cli::{classify_json, decode_arg, range_check, ranges_catalog, Command, RecordAction, Resource, USAGE};
use crate::config::{Config, SiteConfig};
use crate::services::{dashboard, demo, measurements, progress, sync, users};
use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{error, info};
use serde::Serialize;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

fn apply_database_migrations(conn: &mut PgConnection) -> Result<(), String> {
    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) => {
            if applied.is_empty() {
                info!("Database schema is up to date; no migrations were applied");
            } else {
                let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                info!("Applied {} database migration(s): {}", applied.len(), names);
            }
            Ok(())
        }
        Err(e) => Err(format!("Applying database migrations failed: {}", e)),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| format!("serialising output failed: {}", e))?;
    println!("{}", text);
    Ok(())
}

fn run_records(
    conn: &mut PgConnection,
    site: &SiteConfig,
    resource: Resource,
    action: RecordAction,
) -> Result<(), String> {
    let missing = |id: i64| format!("{} {} not found", resource, id);
    let deleted = |id: i64, found: bool| match found {
        true => print_json(&serde_json::json!({ "deleted": id })),
        false => Err(missing(id)),
    };
    let what = resource.to_string();

    match (resource, action) {
        (Resource::Progress, RecordAction::List(filter)) => {
            let filter = match filter {
                Some(raw) => decode_arg("progress filter", &raw)?,
                None => progress::ProgressFilter::default(),
            };
            print_json(&progress::list(conn, site, &filter)?)
        }
        (Resource::Progress, RecordAction::Get(id)) => {
            print_json(&progress::get(conn, site, id)?.ok_or_else(|| missing(id))?)
        }
        (Resource::Progress, RecordAction::Add(raw)) => {
            print_json(&progress::create(conn, site, &decode_arg(&what, &raw)?, None)?)
        }
        (Resource::Progress, RecordAction::Update(id, raw)) => {
            print_json(&progress::update(conn, site, id, &decode_arg(&what, &raw)?)?.ok_or_else(|| missing(id))?)
        }
        (Resource::Progress, RecordAction::Delete(id)) => deleted(id, progress::delete(conn, site, id)?),

        (Resource::Measurements, RecordAction::List(filter)) => {
            let filter = match filter {
                Some(raw) => decode_arg("measurement filter", &raw)?,
                None => measurements::MeasurementFilter::default(),
            };
            print_json(&measurements::list(conn, site, &filter)?)
        }
        (Resource::Measurements, RecordAction::Get(id)) => {
            print_json(&measurements::get(conn, site, id)?.ok_or_else(|| missing(id))?)
        }
        (Resource::Measurements, RecordAction::Add(raw)) => {
            print_json(&measurements::create(conn, site, &decode_arg(&what, &raw)?, None)?)
        }
        (Resource::Measurements, RecordAction::Update(id, raw)) => print_json(
            &measurements::update(conn, site, id, &decode_arg(&what, &raw)?)?.ok_or_else(|| missing(id))?,
        ),
        (Resource::Measurements, RecordAction::Delete(id)) => deleted(id, measurements::delete(conn, site, id)?),

        (Resource::Users, RecordAction::List(None)) => print_json(&users::list_active(conn)?),
        (Resource::Users, RecordAction::List(Some(_))) => Err("users list takes no filter".to_string()),
        (Resource::Users, RecordAction::Get(id)) => print_json(&users::get(conn, id)?.ok_or_else(|| missing(id))?),
        (Resource::Users, RecordAction::Add(raw)) => print_json(&users::create(conn, &decode_arg(&what, &raw)?)?),
        (Resource::Users, RecordAction::Update(id, raw)) => {
            print_json(&users::update(conn, id, &decode_arg(&what, &raw)?)?.ok_or_else(|| missing(id))?)
        }
        (Resource::Users, RecordAction::Delete(id)) => deleted(id, users::deactivate(conn, id)?),
    }
}

pub fn run(command: Command) -> Result<(), String> {
    if command == Command::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    // 1) Load config
    let cfg = Config::from_env()?;
    let site = &cfg.site;
    info!(
        "Config loaded (site={}, towers={}, total_units={}, max_floor={}, warning_margin={})",
        site.site_id,
        site.towers.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(","),
        site.total_units,
        site.max_floor,
        site.ranges.margin()
    );

    if !command.needs_database() {
        return match &command {
            Command::Classify(raw) => print_json(&classify_json(&site.ranges, raw)?),
            Command::Ranges => print_json(&ranges_catalog(&site.ranges)),
            Command::RangeCheck(category, value) => print_json(&range_check(&site.ranges, category, *value)?),
            _ => Ok(()),
        };
    }

    // 2) Connect DB
    let mut conn = PgConnection::establish(&cfg.database_url).map_err(|e| format!("DB connection failed: {}", e))?;
    info!("Connected to database");

    // 3) Apply pending database migrations
    apply_database_migrations(&mut conn)?;

    // 4) Execute the command
    let today = Utc::now().date_naive();
    match command {
        Command::Dashboard => print_json(&dashboard::dashboard_data(&mut conn, site, today)?),
        Command::Summary => print_json(&dashboard::summary(&mut conn, site, today)?),
        Command::Towers => print_json(&dashboard::tower_progress(&mut conn, site)?),
        Command::Breakdown => print_json(&dashboard::status_breakdown(&mut conn, site)?),
        Command::Reclassify => print_json(&measurements::reclassify_all(&mut conn, site)?),
        Command::Sync(path) => {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| format!("failed to read sync batch {}: {}", path.display(), e))?;
            let items = sync::parse_batch(&text)?;
            print_json(&sync::sync_batch(&mut conn, site, &items))
        }
        Command::Seed => print_json(&demo::run(&mut conn, site)?),
        Command::Records(resource, action) => run_records(&mut conn, site, resource, action),
        Command::Classify(_) | Command::Ranges | Command::RangeCheck(..) | Command::Help => Ok(()),
    }
}

fn main() {
    let cli = match cli::parse_args(std::env::args_os().skip(1)) {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };
    let loaded_env = match cli::load_env(cli.env_file.as_deref()) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "encinos-progress {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(cli.command) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
