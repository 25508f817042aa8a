mod args;
mod config;
mod dirs;
mod interrupt;

use std::io;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use billing_db::{Db, ReportTable};
use chrono::{NaiveDate, Utc};
use ingest::{ManifestResolver, RunOptions, SourceOutcome, run_sources, store_for_source};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = args::parse_args().map_err(|err| {
        eprintln!("{err}");
        args::print_help();
        io::Error::new(io::ErrorKind::InvalidInput, "invalid arguments")
    })?;

    let loaded = config::load_or_create(args.config.as_deref()).map_err(io::Error::other)?;
    if loaded.created {
        println!(
            "Created config at {}. Add [[sources]] entries and run again.",
            loaded.file.display()
        );
    }
    let config = loaded.config;

    let sources = config
        .sources
        .iter()
        .filter(|source| args.sources.is_empty() || args.sources.contains(&source.provider_id))
        .cloned()
        .collect::<Vec<_>>();
    if sources.is_empty() {
        println!("No sources to ingest.");
        return Ok(());
    }

    let cancel =
        interrupt::cancel_on_interrupt().map_err(|err| io::Error::other(err.to_string()))?;
    let options = run_options(&config, args.months, Utc::now().date_naive(), cancel);
    log::info!(
        "ingesting {} sources into {} for {} months",
        sources.len(),
        config.data_dir.display(),
        options.months.len()
    );

    let outcomes = run_sources(&config.data_dir, &sources, &options, store_for_source);
    let failed = outcomes.iter().filter(|outcome| outcome.result.is_err()).count();
    for outcome in &outcomes {
        print_outcome(outcome);
    }
    print_table_counts(&config.data_dir, &outcomes);

    if options.cancelled() {
        println!("Run interrupted; remaining files will be picked up next run.");
    }
    if failed > 0 {
        return Err(io::Error::other(format!("{failed} of {} sources failed", outcomes.len())).into());
    }
    Ok(())
}

fn run_options(
    config: &config::CliConfig,
    months: Option<u32>,
    today: NaiveDate,
    cancel: Arc<AtomicBool>,
) -> RunOptions {
    RunOptions {
        staging_root: config.staging_dir.clone(),
        months: ManifestResolver::recent_months(today, months.unwrap_or(config.months)),
        today,
        batch_size: config.batch_size,
        cancel,
    }
}

fn print_outcome(outcome: &SourceOutcome) {
    match &outcome.result {
        Ok(stats) => {
            println!(
                "{} [{}]: {} manifests, {} files processed ({} fetched, {} reused, {} skipped), {} new line items, {} duplicates, {} daily / {} summary rows",
                outcome.provider_id,
                outcome.schema,
                stats.manifests_resolved,
                stats.files_processed,
                stats.files_fetched,
                stats.files_reused,
                stats.files_skipped,
                stats.rows.line_items(),
                stats.rows.duplicates_skipped,
                stats.daily_rows,
                stats.summary_rows
            );
            for issue in &stats.issues {
                println!("  issue: {}: {}", issue.file_path, issue.message);
            }
        }
        Err(err) => println!("{} [{}]: failed: {}", outcome.provider_id, outcome.schema, err),
    }
}

fn print_table_counts(data_dir: &std::path::Path, outcomes: &[SourceOutcome]) {
    let mut schemas = outcomes
        .iter()
        .map(|outcome| outcome.schema.as_str())
        .collect::<Vec<_>>();
    schemas.sort_unstable();
    schemas.dedup();
    for schema in schemas {
        let db = match Db::open_tenant(data_dir, schema) {
            Ok(db) => db,
            Err(err) => {
                log::warn!("unable to reopen tenant {}: {}", schema, err);
                continue;
            }
        };
        println!("{schema}:");
        for table in ReportTable::ALL {
            match db.count_rows(table) {
                Ok(count) => println!("  {:<40} {}", table.table_name(), count),
                Err(err) => log::warn!("count {}: {}", table.table_name(), err),
            }
        }
    }
}
