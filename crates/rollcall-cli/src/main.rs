use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use clap::{Parser, Subcommand};
use rollcall_core::Gallery;
use rollcall_ledger::{
    parse_day_offset, AttendanceRecord, Ledger, LedgerOptions, TIMESTAMP_FORMAT,
};

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance operator CLI")]
struct Cli {
    /// Attendance database
    #[arg(long, env = "ROLLCALL_DB_PATH", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize an embedding gallery cache
    Gallery {
        #[arg(long, env = "ROLLCALL_GALLERY_PATH", default_value = "faces/encodings_cache.json")]
        path: PathBuf,
    },
    /// List attendance records, newest first
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Only records from the current attendance day
        #[arg(long)]
        today: bool,
        /// UTC offset that defines the attendance day, e.g. "+05:30" or "UTC"
        #[arg(
            long,
            env = "ROLLCALL_DAY_OFFSET",
            default_value = "+00:00",
            value_parser = parse_day_offset
        )]
        day_offset: FixedOffset,
    },
    /// Export attendance as CSV
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Gallery { path } => {
            let gallery = Gallery::load(&path)
                .with_context(|| format!("failed to load gallery from {}", path.display()))?;
            print!("{}", summarize_gallery(&gallery));
        }
        Commands::List {
            json,
            today,
            day_offset,
        } => {
            let options = LedgerOptions {
                day_zone: day_offset,
                ..LedgerOptions::default()
            };
            let ledger = open_existing(cli.db, options).await?;
            let mut records = ledger.list_all().await?;
            if today {
                records = only_today(records, &ledger, Utc::now());
            }
            if json {
                let rows: Vec<_> = records
                    .iter()
                    .map(|r| {
                        serde_json::json!({
                            "name": r.name,
                            "time": r.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if records.is_empty() {
                println!("No attendance recorded");
            } else {
                for r in &records {
                    println!("{}  {}", r.timestamp.format(TIMESTAMP_FORMAT), r.name);
                }
            }
        }
        Commands::Export { output } => {
            let ledger = open_existing(cli.db, LedgerOptions::default()).await?;
            let csv = ledger.export_csv().await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &csv)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    tracing::info!(path = %path.display(), bytes = csv.len(), "export written");
                }
                None => std::io::stdout().write_all(&csv)?,
            }
        }
    }

    Ok(())
}

fn default_db_path() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall/attendance.db")
}

/// Open the ledger for reading; a missing database is an error rather than
/// silently created.
async fn open_existing(db: Option<PathBuf>, options: LedgerOptions) -> Result<Ledger> {
    let path = db.unwrap_or_else(default_db_path);
    ensure_exists(&path)?;
    Ledger::open(&path, options)
        .await
        .with_context(|| format!("failed to open ledger at {}", path.display()))
}

fn ensure_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("no attendance database at {}", path.display());
    }
    Ok(())
}

/// Records whose civil date matches the ledger's current day.
fn only_today(
    records: Vec<AttendanceRecord>,
    ledger: &Ledger,
    now: DateTime<Utc>,
) -> Vec<AttendanceRecord> {
    let today = ledger.civil_time(now).date();
    records
        .into_iter()
        .filter(|r| r.timestamp.date() == today)
        .collect()
}

fn summarize_gallery(gallery: &Gallery) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in gallery.entries() {
        *counts.entry(entry.label.as_str()).or_default() += 1;
    }

    let mut out = format!(
        "entries: {}\nidentities: {}\ndimension: {}\n",
        gallery.len(),
        counts.len(),
        gallery
            .dimension()
            .map_or_else(|| "-".to_string(), |d| d.to_string()),
    );
    for (label, n) in counts {
        out.push_str(&format!("  {label} ({n})\n"));
    }
    out
}
