use anyhow::{bail, Result};
use bhop_records::database_ops::db::Db;
use bhop_records::database_ops::fastdl::{bulk_sync_file_hashes, download_url};
use bhop_records::database_ops::lazy_fill::ensure_map_wr;
use bhop_records::database_ops::maps::{get_full_details, search_maps, MapDetails};
use bhop_records::database_ops::reconcile::reconcile_recent;
use bhop_records::database_ops::tas_sheet::sync_tas;
use bhop_records::database_ops::worker_manager::WorkerManager;
use bhop_records::logging::{init_tracing, LogFormat, DEFAULT_FILTER};
use bhop_records::normalization::format_seconds;
use bhop_records::util::config::SyncConfig;
use bhop_records::util::env as env_util;
use bhop_records::Feeds;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "maps", version, about = "Bhop map records CLI")]
struct Cli {
    /// Optional override for the database URL
    #[arg(long, global = true)]
    db_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Run one sync pass now
    Sync {
        #[arg(value_enum, default_value_t = SyncTarget::All)]
        target: SyncTarget,
    },
    /// Find maps whose name contains QUERY
    Search {
        query: String,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Print stored records for one map, fetching the WR when none is stored
    Show {
        map: String,
        /// Do not call the record feed for a missing WR
        #[arg(long, default_value_t = false)]
        no_fill: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SyncTarget {
    Records,
    Fastdl,
    Tas,
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    init_tracing(DEFAULT_FILTER, LogFormat::from_env_or(LogFormat::Compact))?;

    let cli = Cli::parse();
    let mut cfg = SyncConfig::from_env();
    if let Some(url) = cli.db_url {
        cfg.database_url = url;
    }
    let db = Db::connect(&cfg.database_url, cfg.max_connections).await?;
    let feeds = Feeds::from_config(&cfg)?;

    match cli.command {
        Commands::Sync { target } => match target {
            SyncTarget::Records => {
                let s = reconcile_recent(&db, feeds.records.as_ref(), feeds.hashes.as_ref()).await?;
                println!(
                    "records: {} seen, {} current, {} created, {} updated, {} bad time, {} errors",
                    s.entries_seen,
                    s.skipped_current,
                    s.created,
                    s.updated,
                    s.skipped_bad_time,
                    s.feed_errors + s.storage_errors
                );
            }
            SyncTarget::Fastdl => {
                let s = bulk_sync_file_hashes(&db, feeds.hashes.as_ref()).await?;
                println!("fastdl: {} hashes upserted", s.rows_upserted);
            }
            SyncTarget::Tas => {
                let s = sync_tas(&db, feeds.tas.as_ref()).await?;
                println!(
                    "tas: {} rows, {} applied, {} unmatched, {} bad time, {} failed",
                    s.rows_seen, s.rows_applied, s.rows_unmatched, s.rows_bad_time, s.rows_failed
                );
            }
            SyncTarget::All => {
                WorkerManager::new(db.clone())
                    .run_all(vec![feeds.records_worker(), feeds.bulk_worker()])
                    .await?;
                println!("sync complete");
            }
        },
        Commands::Search { query, limit } => {
            let names = search_maps(&db, &query, limit).await?;
            match names.as_slice() {
                [] => println!("No maps found."),
                [only] => show(&db, &feeds, &cfg, only, false).await?,
                many => {
                    for name in many {
                        println!("{name}");
                    }
                }
            }
        }
        Commands::Show { map, no_fill } => show(&db, &feeds, &cfg, map.trim(), no_fill).await?,
    }
    db.pool.close().await;
    Ok(())
}

async fn show(db: &Db, feeds: &Feeds, cfg: &SyncConfig, map: &str, no_fill: bool) -> Result<()> {
    let Some(details) = get_full_details(db, map).await? else {
        bail!("map {map:?} not found");
    };
    let details = if no_fill {
        details
    } else {
        ensure_map_wr(db, feeds.records.as_ref(), details).await
    };
    print!("{}", render(&details, &cfg.fastdl_download_base));
    Ok(())
}

fn render(d: &MapDetails, download_base: &str) -> String {
    let r = &d.record;
    let mut out = format!("{}\n", r.name);
    if let Some(tier) = r.tier {
        out.push_str(&format!("  tier:   {tier}\n"));
    }
    out.push_str(&line("wr:", r.wr_time_seconds, r.wr_runner.as_deref(), d.wr_server.as_deref()));
    out.push_str(&line("tas:", r.tas_time_seconds, r.tas_runner.as_deref(), d.tas_server.as_deref()));
    if let Some(hash) = &r.file_hash {
        out.push_str(&format!("  file:   {}\n", download_url(download_base, hash, &r.name)));
    }
    out
}

fn line(label: &str, secs: Option<f64>, runner: Option<&str>, server: Option<&str>) -> String {
    match secs {
        None => format!("  {label:<6}  -\n"),
        Some(s) => {
            let mut l = format!("  {label:<6}  {}", format_seconds(s));
            if let Some(runner) = runner {
                l.push_str(&format!(" by {runner}"));
            }
            if let Some(server) = server {
                l.push_str(&format!(" on {server}"));
            }
            l.push('\n');
            l
        }
    }
}
