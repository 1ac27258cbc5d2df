//! Attendance controller: folds sightings into the daily ledger.
//!
//! Per `(identity, date)` a record moves from absent to open on the first
//! sighting of the day; every later sighting only advances the logout
//! time. Login is never rewritten.

use crate::record::{AttendanceRecord, Ledger};
use crate::store::{LedgerError, LedgerStore};
use chrono::{NaiveDateTime, NaiveTime, Timelike};
use rollcall_core::Identity;

/// What a sighting did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// First sighting of the day; a new record was opened.
    LoggedIn,
    /// Logout time moved forward.
    LogoutUpdated,
    /// Repeat or stale sighting; ledger unchanged.
    Unchanged,
}

/// Apply one sighting to `ledger` and return the updated ledger.
pub fn record(identity: &Identity, at: NaiveDateTime, ledger: Ledger) -> Ledger {
    apply(identity, at, ledger).0
}

fn apply(identity: &Identity, at: NaiveDateTime, mut ledger: Ledger) -> (Ledger, MarkOutcome) {
    let date = at.date();
    // Ledger resolution is one second.
    let time = truncate_to_second(at.time());

    let outcome = match ledger.get_mut(identity, date) {
        None => {
            ledger.push(AttendanceRecord {
                identity: identity.clone(),
                date,
                login: time,
                logout: None,
            });
            MarkOutcome::LoggedIn
        }
        Some(existing) if time > existing.login && existing.logout.map_or(true, |t| time > t) => {
            existing.logout = Some(time);
            MarkOutcome::LogoutUpdated
        }
        Some(_) => MarkOutcome::Unchanged,
    };

    (ledger, outcome)
}

fn truncate_to_second(time: NaiveTime) -> NaiveTime {
    time.with_nanosecond(0).unwrap_or(time)
}

/// Serializes load → record → save against one store.
///
/// Owning the service (`&mut self`) is the critical section: with a single
/// owner per store, no two updates interleave.
pub struct Attendance<S> {
    store: S,
}

impl<S: LedgerStore> Attendance<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record a sighting and persist the ledger when it changed.
    pub fn mark(
        &mut self,
        identity: &Identity,
        at: NaiveDateTime,
    ) -> Result<MarkOutcome, LedgerError> {
        let ledger = self.store.load()?;
        let (ledger, outcome) = apply(identity, at, ledger);

        match outcome {
            MarkOutcome::Unchanged => {
                tracing::trace!(%identity, %at, "sighting already recorded");
            }
            MarkOutcome::LoggedIn | MarkOutcome::LogoutUpdated => {
                self.store.save(&ledger)?;
                tracing::info!(%identity, %at, ?outcome, "attendance updated");
            }
        }
        Ok(outcome)
    }
}
