use chrono::{NaiveDate, NaiveTime};
use rollcall_core::Identity;

/// First-seen / last-seen pair for one identity on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub identity: Identity,
    pub date: NaiveDate,
    pub login: NaiveTime,
    /// Last sighting of the day; absent until a second sighting arrives.
    pub logout: Option<NaiveTime>,
}

impl AttendanceRecord {
    pub fn key(&self) -> (&Identity, NaiveDate) {
        (&self.identity, self.date)
    }
}

/// Attendance records in insertion order, at most one per `(identity, date)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    records: Vec<AttendanceRecord>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, identity: &Identity, date: NaiveDate) -> Option<&AttendanceRecord> {
        self.records
            .iter()
            .find(|r| &r.identity == identity && r.date == date)
    }

    pub(crate) fn get_mut(
        &mut self,
        identity: &Identity,
        date: NaiveDate,
    ) -> Option<&mut AttendanceRecord> {
        self.records
            .iter_mut()
            .find(|r| &r.identity == identity && r.date == date)
    }

    /// Records for one day, in ledger order.
    pub fn on(&self, date: NaiveDate) -> impl Iterator<Item = &AttendanceRecord> {
        self.records.iter().filter(move |r| r.date == date)
    }

    /// Records matching an optional day and an optional identity, in ledger order.
    pub fn select<'a>(
        &'a self,
        date: Option<NaiveDate>,
        identity: Option<&'a Identity>,
    ) -> impl Iterator<Item = &'a AttendanceRecord> + 'a {
        self.records
            .iter()
            .filter(move |r| date.map_or(true, |d| r.date == d))
            .filter(move |r| identity.map_or(true, |i| &r.identity == i))
    }

    /// Append a record whose key is not yet present.
    pub(crate) fn push(&mut self, record: AttendanceRecord) {
        debug_assert!(self.get(&record.identity, record.date).is_none());
        self.records.push(record);
    }
}

impl<'a> IntoIterator for &'a Ledger {
    type Item = &'a AttendanceRecord;
    type IntoIter = std::slice::Iter<'a, AttendanceRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
