//! rollcall-ledger — Daily attendance ledger.
//!
//! Converts a stream of `(identity, timestamp)` sightings into one
//! login/logout record per identity per day, persisted as a CSV file.

pub mod controller;
pub mod record;
pub mod store;

pub use controller::{record, Attendance, MarkOutcome};
pub use record::{AttendanceRecord, Ledger};
pub use store::{CsvLedgerStore, LedgerError, LedgerStore, MemoryLedgerStore};
