use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use rollcall_core::{
    Config, Embedding, EmbeddingFileEncoder, EuclideanMatcher, Gallery, Identity, Matcher,
};
use rollcall_ledger::{Attendance, AttendanceRecord, CsvLedgerStore, LedgerStore, MarkOutcome};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face recognition attendance CLI")]
struct Cli {
    /// TOML configuration file (defaults to $ROLLCALL_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List enrolled identities
    Gallery,
    /// Match a probe embedding (JSON array of floats) against the gallery
    Identify {
        /// Path to the probe embedding
        probe: PathBuf,
    },
    /// Print attendance records
    Ledger {
        /// Only records for this day (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Only records for this person
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Record a sighting by hand
    Mark {
        /// Identity label, as enrolled in the gallery
        name: String,
        /// Sighting time, "YYYY-MM-DD HH:MM:SS" (defaults to now)
        #[arg(long, value_parser = parse_timestamp)]
        at: Option<NaiveDateTime>,
    },
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Gallery => {
            let gallery = load_gallery(&config)?;
            if gallery.is_empty() {
                println!("No identities enrolled in {}", config.gallery_dir.display());
                return Ok(());
            }
            for identity in gallery.identities() {
                println!("{identity}\t{} reference(s)", gallery.count_for(identity));
            }
        }
        Commands::Identify { probe } => {
            let raw = std::fs::read_to_string(&probe)
                .with_context(|| format!("reading probe {}", probe.display()))?;
            let embedding: Embedding = serde_json::from_str(&raw)
                .with_context(|| format!("parsing probe {}", probe.display()))?;

            let gallery = load_gallery(&config)?;
            let matcher = EuclideanMatcher::new(config.match_threshold);
            let result = matcher.identify(&embedding, &gallery);
            match result.nearest {
                Some(idx) => println!(
                    "{}\tdistance {:.4}\tnearest {}\tthreshold {}",
                    result.label(),
                    result.distance,
                    gallery.entries()[idx].identity,
                    config.match_threshold
                ),
                None => println!("{}\tno comparable reference", result.label()),
            }
        }
        Commands::Ledger { date, name } => {
            let ledger = CsvLedgerStore::new(&config.ledger_path)
                .load()
                .context("loading attendance ledger")?;
            let name = name.map(Identity::new);
            let rows: Vec<&AttendanceRecord> = ledger.select(date, name.as_ref()).collect();
            print_ledger(&rows);
        }
        Commands::Mark { name, at } => {
            if name.trim().is_empty() {
                bail!("identity label must not be empty");
            }
            let identity = Identity::new(name);
            let at = at.unwrap_or_else(|| Local::now().naive_local());

            let mut attendance = Attendance::new(CsvLedgerStore::new(&config.ledger_path));
            let outcome = attendance
                .mark(&identity, at)
                .context("updating attendance ledger")?;
            let stamp = at.format("%Y-%m-%d %H:%M:%S");
            match outcome {
                MarkOutcome::LoggedIn => println!("{identity}: logged in at {stamp}"),
                MarkOutcome::LogoutUpdated => println!("{identity}: last seen {stamp}"),
                MarkOutcome::Unchanged => println!("{identity}: already recorded"),
            }
        }
    }

    Ok(())
}

fn load_gallery(config: &Config) -> Result<Gallery> {
    Gallery::from_dir(&config.gallery_dir, &mut EmbeddingFileEncoder)
        .context("building face gallery")
}

fn print_ledger(rows: &[&AttendanceRecord]) {
    if rows.is_empty() {
        println!("No attendance records");
        return;
    }
    let width = rows
        .iter()
        .map(|r| r.identity.as_str().chars().count())
        .max()
        .unwrap_or(0)
        .max("Name".len());

    println!("{:<width$}  {:<10}  {:<8}  {:<8}", "Name", "Date", "Login", "Logout");
    for r in rows {
        let logout = r
            .logout
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<width$}  {}  {}  {}",
            r.identity.as_str(),
            r.date.format("%Y-%m-%d"),
            r.login.format("%H:%M:%S"),
            logout
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp() {
        let at = parse_timestamp("2024-01-01 09:00:05").unwrap();
        assert_eq!(at.to_string(), "2024-01-01 09:00:05");
    }

    #[test]
    fn test_parse_timestamp_rejects_other_forms() {
        assert!(parse_timestamp("2024-01-01T09:00:05").is_err());
        assert!(parse_timestamp("2024-01-01").is_err());
        assert!(parse_timestamp("09:00:05").is_err());
    }

    #[test]
    fn test_ledger_command_filters() {
        let args = ["rollcall", "ledger", "--date", "2024-01-02", "--name", "alice"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Ledger { date, name } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 2));
                assert_eq!(name.as_deref(), Some("alice"));
            }
            _ => panic!("expected ledger command"),
        }
    }

    #[test]
    fn test_mark_command_parses_time() {
        let args = ["rollcall", "mark", "bob", "--at", "2024-01-01 17:30:00"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Mark { name, at } => {
                assert_eq!(name, "bob");
                assert_eq!(at, Some(parse_timestamp("2024-01-01 17:30:00").unwrap()));
            }
            _ => panic!("expected mark command"),
        }
    }

    #[test]
    fn test_mark_command_rejects_bad_time() {
        assert!(Cli::try_parse_from(["rollcall", "mark", "bob", "--at", "5pm"]).is_err());
    }
}
