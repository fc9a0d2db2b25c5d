//! Immutable time entries and the step that materializes them.

use std::error::Error as StdError;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{TimerSession, elapsed};
use crate::types::{ActivityRef, EntryId, Rate};

/// A completed, immutable record of tracked time.
///
/// Entries are only built through [`materialize`], [`TimeEntry::from_parts`]
/// or [`TimeEntry::revised`], all of which derive `amount` and `date` the same
/// way. There are no setters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeEntry {
    id: EntryId,
    task: String,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    date: NaiveDate,
    duration_minutes: u64,
    category: String,
    activity: ActivityRef,
    billable: bool,
    rate: Rate,
    amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    supersedes: Option<EntryId>,
}

/// Stored fields of an entry, without the derived ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryParts {
    pub id: EntryId,
    pub task: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_minutes: u64,
    pub category: String,
    pub activity: ActivityRef,
    pub billable: bool,
    pub rate: Rate,
    pub supersedes: Option<EntryId>,
}

/// Changes requested by an edit. `None` keeps the existing value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryEdit {
    pub task: Option<String>,
    pub category: Option<String>,
    pub activity: Option<ActivityRef>,
    pub billable: Option<bool>,
    pub rate: Option<Rate>,
    pub duration_minutes: Option<u64>,
}

impl TimeEntry {
    /// Builds an entry, deriving `date` from `ended_at` and computing `amount`.
    #[must_use]
    pub fn from_parts(parts: EntryParts) -> Self {
        let amount = billable_amount(parts.billable, parts.rate, parts.duration_minutes);
        Self {
            date: parts.ended_at.date_naive(),
            amount,
            id: parts.id,
            task: parts.task,
            started_at: parts.started_at,
            ended_at: parts.ended_at,
            duration_minutes: parts.duration_minutes,
            category: parts.category,
            activity: parts.activity,
            billable: parts.billable,
            rate: parts.rate,
            supersedes: parts.supersedes,
        }
    }

    /// Builds a replacement for this entry with `edit` applied.
    ///
    /// The replacement has a fresh ID and points back at this one. The end
    /// time is kept; a changed duration moves the start time.
    #[must_use]
    pub fn revised(&self, edit: EntryEdit) -> Self {
        let started_at = edit
            .duration_minutes
            .and_then(|minutes| i64::try_from(minutes).ok())
            .and_then(Duration::try_minutes)
            .and_then(|span| self.ended_at.checked_sub_signed(span))
            .unwrap_or(self.started_at);
        Self::from_parts(EntryParts {
            id: EntryId::generate(),
            task: edit.task.unwrap_or_else(|| self.task.clone()),
            started_at,
            ended_at: self.ended_at,
            duration_minutes: edit.duration_minutes.unwrap_or(self.duration_minutes),
            category: edit.category.unwrap_or_else(|| self.category.clone()),
            activity: edit.activity.unwrap_or_else(|| self.activity.clone()),
            billable: edit.billable.unwrap_or(self.billable),
            rate: edit.rate.unwrap_or(self.rate),
            supersedes: Some(self.id.clone()),
        })
    }

    pub const fn id(&self) -> &EntryId {
        &self.id
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub const fn ended_at(&self) -> DateTime<Utc> {
        self.ended_at
    }

    pub const fn date(&self) -> NaiveDate {
        self.date
    }

    pub const fn duration_minutes(&self) -> u64 {
        self.duration_minutes
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub const fn activity(&self) -> &ActivityRef {
        &self.activity
    }

    pub const fn billable(&self) -> bool {
        self.billable
    }

    pub const fn rate(&self) -> Rate {
        self.rate
    }

    pub const fn amount(&self) -> Decimal {
        self.amount
    }

    pub const fn supersedes(&self) -> Option<&EntryId> {
        self.supersedes.as_ref()
    }
}

/// `rate * minutes / 60` for billable time, otherwise zero.
pub fn billable_amount(billable: bool, rate: Rate, duration_minutes: u64) -> Decimal {
    if billable {
        rate.value() * Decimal::from(duration_minutes) / Decimal::from(60)
    } else {
        Decimal::ZERO
    }
}

/// Rounds seconds to the nearest minute, halves rounding up.
pub const fn round_to_minutes(secs: u64) -> u64 {
    secs.saturating_add(30) / 60
}

/// Converts a stopped session into an entry.
///
/// `stopped_at` is the wall-clock stop time. Any open segment is counted up
/// to that instant, so callers may pass a session that is still running.
pub fn materialize(session: &TimerSession, stopped_at: DateTime<Utc>) -> TimeEntry {
    let total_secs = elapsed(session, stopped_at);
    let started_at = i64::try_from(total_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|span| stopped_at.checked_sub_signed(span))
        .unwrap_or(stopped_at);
    TimeEntry::from_parts(EntryParts {
        id: EntryId::generate(),
        task: session.task_name().to_string(),
        started_at,
        ended_at: stopped_at,
        duration_minutes: round_to_minutes(total_secs),
        category: session.category().to_string(),
        activity: session.activity().clone(),
        billable: session.billable(),
        rate: session.rate(),
        supersedes: None,
    })
}

/// Failure reported by a persistence backend.
#[derive(Debug, Error)]
#[error("failed to persist entry {entry_id}: {source}")]
pub struct SinkError {
    entry_id: EntryId,
    #[source]
    source: Box<dyn StdError + Send + Sync>,
}

impl SinkError {
    /// Wraps a backend error for the given entry.
    pub fn new(entry_id: EntryId, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            entry_id,
            source: source.into(),
        }
    }

    /// The entry that could not be stored.
    pub const fn entry_id(&self) -> &EntryId {
        &self.entry_id
    }
}

/// Durable destination for new entries.
///
/// `append` must not return `Ok` until the entry is durable. The store keeps
/// the session alive when it returns an error.
pub trait EntrySink {
    fn append(&mut self, entry: &TimeEntry) -> Result<(), SinkError>;
}

/// A sink that keeps nothing beyond the in-memory log.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EntrySink for NullSink {
    fn append(&mut self, _entry: &TimeEntry) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Append-only collection of entries.
#[derive(Debug, Clone, Default)]
pub struct EntryLog {
    entries: Vec<TimeEntry>,
}

impl EntryLog {
    pub(crate) fn push(&mut self, entry: TimeEntry) {
        self.entries.push(entry);
    }

    /// Every entry in append order, superseded ones included.
    pub fn all(&self) -> &[TimeEntry] {
        &self.entries
    }

    /// Looks up an entry by ID.
    pub fn get(&self, id: &EntryId) -> Option<&TimeEntry> {
        self.entries.iter().find(|entry| entry.id() == id)
    }

    /// Whether a later entry replaces `id`.
    pub fn is_superseded(&self, id: &EntryId) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.supersedes() == Some(id))
    }

    /// Entries that have not been replaced by a revision.
    pub fn current(&self) -> impl Iterator<Item = &TimeEntry> {
        self.entries
            .iter()
            .filter(|entry| !self.is_superseded(entry.id()))
    }

    /// Sum of `amount` over current entries.
    pub fn total_amount(&self) -> Decimal {
        self.current().map(TimeEntry::amount).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
