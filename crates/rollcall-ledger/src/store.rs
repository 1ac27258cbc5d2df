//! Durable ledger storage.
//!
//! The CSV store keeps the whole ledger in one file and replaces it in full
//! on every save: write to a temporary file beside the target, fsync, then
//! rename over it, so readers see either the old or the new ledger.

use crate::record::{AttendanceRecord, Ledger};
use chrono::{NaiveDate, NaiveTime};
use rollcall_core::Identity;
use serde::Deserialize;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger corrupt: {path}: {reason}")]
    Corrupt { path: String, reason: String },
    #[error("ledger io: {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger encode: {0}")]
    Encode(#[from] csv::Error),
}

/// Whole-ledger load/save. Implementations must make `save` all-or-nothing.
pub trait LedgerStore {
    /// Load the full ledger; a store that does not exist yet is empty.
    fn load(&self) -> Result<Ledger, LedgerError>;

    /// Replace the durable ledger with `ledger`.
    fn save(&self, ledger: &Ledger) -> Result<(), LedgerError>;
}

/// One CSV row, `Name,Date,Login Time,Logout Time`.
#[derive(Debug, Deserialize)]
struct LedgerRow {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Login Time")]
    login: String,
    #[serde(rename = "Logout Time")]
    logout: String,
}

impl From<&AttendanceRecord> for LedgerRow {
    fn from(r: &AttendanceRecord) -> Self {
        Self {
            name: r.identity.to_string(),
            date: r.date.format(DATE_FORMAT).to_string(),
            login: r.login.format(TIME_FORMAT).to_string(),
            logout: r
                .logout
                .map(|t| t.format(TIME_FORMAT).to_string())
                .unwrap_or_default(),
        }
    }
}

impl LedgerRow {
    fn into_record(self) -> Result<AttendanceRecord, String> {
        // Names are kept byte-for-byte; only date and time cells are trimmed.
        if self.name.is_empty() {
            return Err("empty Name".into());
        }
        let date = NaiveDate::parse_from_str(self.date.trim(), DATE_FORMAT)
            .map_err(|e| format!("bad Date {:?}: {e}", self.date))?;
        let login = NaiveTime::parse_from_str(self.login.trim(), TIME_FORMAT)
            .map_err(|e| format!("bad Login Time {:?}: {e}", self.login))?;
        let logout = match self.logout.trim() {
            "" => None,
            raw => Some(
                NaiveTime::parse_from_str(raw, TIME_FORMAT)
                    .map_err(|e| format!("bad Logout Time {raw:?}: {e}"))?,
            ),
        };
        Ok(AttendanceRecord {
            identity: Identity::new(self.name),
            date,
            login,
            logout,
        })
    }
}

/// Ledger kept as a single CSV file.
#[derive(Debug, Clone)]
pub struct CsvLedgerStore {
    path: PathBuf,
}

impl CsvLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn corrupt(&self, reason: impl Into<String>) -> LedgerError {
        LedgerError::Corrupt {
            path: self.path.display().to_string(),
            reason: reason.into(),
        }
    }

    fn io(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn parse<R: std::io::Read>(&self, reader: R) -> Result<Ledger, LedgerError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let mut ledger = Ledger::new();
        let mut keys = HashSet::new();
        for (i, row) in reader.deserialize::<LedgerRow>().enumerate() {
            let row_no = i + 1;
            let row = row.map_err(|e| self.corrupt(format!("row {row_no}: {e}")))?;
            let record = row
                .into_record()
                .map_err(|reason| self.corrupt(format!("row {row_no}: {reason}")))?;
            if !keys.insert((record.identity.clone(), record.date)) {
                return Err(self.corrupt(format!(
                    "row {row_no}: duplicate entry for {} on {}",
                    record.identity, record.date
                )));
            }
            ledger.push(record);
        }
        Ok(ledger)
    }

    fn encode(ledger: &Ledger) -> Result<Vec<u8>, LedgerError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        // Header is written explicitly so an empty ledger still carries it.
        writer.write_record(["Name", "Date", "Login Time", "Logout Time"])?;
        for record in ledger {
            let row = LedgerRow::from(record);
            writer.write_record([&row.name, &row.date, &row.login, &row.logout])?;
        }
        writer
            .into_inner()
            .map_err(|e| LedgerError::Encode(csv::Error::from(e.into_error())))
    }
}

impl LedgerStore for CsvLedgerStore {
    fn load(&self) -> Result<Ledger, LedgerError> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no ledger yet; starting empty");
                return Ok(Ledger::new());
            }
            Err(e) => return Err(self.io(e)),
        };
        let ledger = self.parse(file)?;
        tracing::debug!(path = %self.path.display(), records = ledger.len(), "ledger loaded");
        Ok(ledger)
    }

    fn save(&self, ledger: &Ledger) -> Result<(), LedgerError> {
        let bytes = Self::encode(ledger)?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| self.io(e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| self.io(e))?;
        tmp.write_all(&bytes).map_err(|e| self.io(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io(e))?;
        tmp.persist(&self.path).map_err(|e| self.io(e.error))?;

        tracing::debug!(path = %self.path.display(), records = ledger.len(), "ledger saved");
        Ok(())
    }
}

/// In-process store, for tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    ledger: std::sync::Mutex<Ledger>,
}

impl MemoryLedgerStore {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger: std::sync::Mutex::new(ledger),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&self) -> Result<Ledger, LedgerError> {
        Ok(self.lock().clone())
    }

    fn save(&self, ledger: &Ledger) -> Result<(), LedgerError> {
        *self.lock() = ledger.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::record;
    use chrono::NaiveDateTime;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn sample() -> Ledger {
        let ledger = record(&"alice".into(), at("2024-01-01 09:00:00"), Ledger::new());
        let ledger = record(&"alice".into(), at("2024-01-01 17:30:12"), ledger);
        let ledger = record(&"bob".into(), at("2024-01-01 09:05:00"), ledger);
        record(&"alice".into(), at("2024-01-02 08:59:59"), ledger)
    }

    #[test]
    fn test_load_absent_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvLedgerStore::new(dir.path().join("attendance.csv"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvLedgerStore::new(dir.path().join("attendance.csv"));
        store.save(&sample()).unwrap();

        let text = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(
            text,
            "Name,Date,Login Time,Logout Time\n\
             alice,2024-01-01,09:00:00,17:30:12\n\
             bob,2024-01-01,09:05:00,\n\
             alice,2024-01-02,08:59:59,\n"
        );
    }

    #[test]
    fn test_save_empty_ledger_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvLedgerStore::new(dir.path().join("attendance.csv"));
        store.save(&Ledger::new()).unwrap();
        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            "Name,Date,Login Time,Logout Time\n"
        );
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvLedgerStore::new(dir.path().join("attendance.csv"));
        let ledger = sample();

        store.save(&ledger).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, ledger);

        store.save(&loaded).unwrap();
        assert_eq!(store.load().unwrap(), ledger);
    }

    #[test]
    fn test_save_creates_parent_dir_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvLedgerStore::new(dir.path().join("nested/deeper/attendance.csv"));
        store.save(&sample()).unwrap();
        store.save(&Ledger::new()).unwrap();

        assert!(store.load().unwrap().is_empty());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("nested/deeper"))
            .unwrap()
            .collect();
        assert_eq!(leftovers.len(), 1, "temporary files must not linger");
    }

    #[test]
    fn test_load_tolerates_spaced_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        std::fs::write(
            &path,
            "Name, Date, Login Time, Logout Time\nalice, 2024-01-01, 09:00:00, \n",
        )
        .unwrap();

        let ledger = CsvLedgerStore::new(&path).load().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let record = ledger.get(&"alice".into(), day).unwrap();
        assert_eq!(record.login, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(record.logout, None);
    }

    #[test]
    fn test_round_trip_keeps_names_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvLedgerStore::new(dir.path().join("attendance.csv"));
        let names = ["alice", "alice ", " alice", "Doe, Jane", "say \"hi\""];
        let mut ledger = Ledger::new();
        for name in names {
            ledger = record(&name.into(), at("2024-01-01 09:00:00"), ledger);
            ledger = record(&name.into(), at("2024-01-01 09:30:00"), ledger);
        }

        store.save(&ledger).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, ledger);
        let labels: Vec<&str> = loaded.records().iter().map(|r| r.identity.as_str()).collect();
        assert_eq!(labels, names);
    }

    fn assert_corrupt(contents: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        std::fs::write(&path, contents).unwrap();
        let result = CsvLedgerStore::new(&path).load();
        assert!(
            matches!(result, Err(LedgerError::Corrupt { .. })),
            "expected corrupt ledger for {contents:?}, got {result:?}"
        );
    }

    #[test]
    fn test_load_missing_column_is_corrupt() {
        assert_corrupt("Name,Date,Login Time\nalice,2024-01-01,09:00:00\n");
    }

    #[test]
    fn test_load_bad_fields_are_corrupt() {
        assert_corrupt("Name,Date,Login Time,Logout Time\nalice,01/02/2024,09:00:00,\n");
        assert_corrupt("Name,Date,Login Time,Logout Time\nalice,2024-01-01,9am,\n");
        assert_corrupt("Name,Date,Login Time,Logout Time\nalice,2024-01-01,09:00:00,late\n");
        assert_corrupt("Name,Date,Login Time,Logout Time\n,2024-01-01,09:00:00,\n");
    }

    #[test]
    fn test_load_duplicate_key_is_corrupt() {
        assert_corrupt(
            "Name,Date,Login Time,Logout Time\n\
             alice,2024-01-01,09:00:00,\n\
             alice,2024-01-01,10:00:00,\n",
        );
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryLedgerStore::default();
        assert!(store.load().unwrap().is_empty());
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), sample());
    }
}
