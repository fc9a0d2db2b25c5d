//! The live timer session and the elapsed-time calculator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ActivityRef, Rate};

/// Lifecycle phase of a [`TimerSession`], derived from its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Not running and nothing banked.
    Idle,
    /// A run segment is open.
    Running,
    /// Not running, with banked time.
    Paused,
}

impl Phase {
    /// String representation for display.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
        }
    }
}

/// Catalog metadata attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Binding {
    /// What the time is tracked against.
    pub activity: ActivityRef,
    /// Display title, used as the task name.
    pub task_name: String,
    /// Whether the time is billable.
    pub billable: bool,
    /// Hourly rate.
    pub rate: Rate,
    /// Reporting category.
    pub category: String,
}

/// The single live record of what is being timed.
///
/// Fields are only writable from inside this crate; the store is the one
/// component that calls the mutators. A running session is exactly one whose
/// `started_at` is set, so the running flag and the start timestamp cannot
/// disagree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimerSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    accumulated_seconds: u64,
    #[serde(flatten)]
    binding: Binding,
}

impl TimerSession {
    /// Creates an idle session with no binding.
    #[must_use]
    pub fn idle() -> Self {
        Self::default()
    }

    /// Whether a run segment is open.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Start of the open run segment, if running.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Seconds banked from finished run segments.
    #[must_use]
    pub const fn accumulated_seconds(&self) -> u64 {
        self.accumulated_seconds
    }

    /// Current task name.
    #[must_use]
    pub fn task_name(&self) -> &str {
        &self.binding.task_name
    }

    /// Current activity reference.
    #[must_use]
    pub const fn activity(&self) -> &ActivityRef {
        &self.binding.activity
    }

    /// Current category.
    #[must_use]
    pub fn category(&self) -> &str {
        &self.binding.category
    }

    /// Whether the bound activity is billable.
    #[must_use]
    pub const fn billable(&self) -> bool {
        self.binding.billable
    }

    /// Hourly rate of the bound activity.
    #[must_use]
    pub const fn rate(&self) -> Rate {
        self.binding.rate
    }

    /// The full binding.
    #[must_use]
    pub const fn binding(&self) -> &Binding {
        &self.binding
    }

    /// Derived lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        if self.is_running() {
            Phase::Running
        } else if self.accumulated_seconds > 0 {
            Phase::Paused
        } else {
            Phase::Idle
        }
    }

    pub(crate) fn open_segment(&mut self, at: DateTime<Utc>) {
        self.started_at = Some(at);
    }

    /// Closes the open segment at `end`, banking its length. Returns the
    /// seconds banked, or `None` if nothing was running.
    pub(crate) fn close_segment(&mut self, end: DateTime<Utc>) -> Option<u64> {
        let start = self.started_at.take()?;
        let secs = segment_seconds(start, end);
        self.accumulated_seconds = self.accumulated_seconds.saturating_add(secs);
        Some(secs)
    }

    pub(crate) fn set_task_name(&mut self, name: impl Into<String>) {
        self.binding.task_name = name.into();
    }

    pub(crate) fn set_binding(&mut self, binding: Binding) {
        self.binding = binding;
    }
}

/// Length of a run segment in whole seconds; a negative span is 0.
fn segment_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    u64::try_from((end - start).num_seconds()).unwrap_or(0)
}

/// Total tracked seconds for `session` as of `now`.
///
/// Banked time plus the open segment measured on the wall clock. A `now`
/// earlier than the segment start contributes nothing.
pub fn elapsed(session: &TimerSession, now: DateTime<Utc>) -> u64 {
    let running = session
        .started_at
        .map_or(0, |start| segment_seconds(start, now));
    session.accumulated_seconds.saturating_add(running)
}

/// Formats seconds as `M:SS`, or `H:MM:SS` from one hour on.
pub fn format_elapsed(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn idle_session_elapsed_is_zero() {
        let session = TimerSession::idle();
        assert_eq!(elapsed(&session, at("2026-03-02T09:00:00Z")), 0);
        assert_eq!(session.phase(), Phase::Idle);
        assert!(session.activity().is_none());
    }

    #[test]
    fn running_session_adds_open_segment() {
        let mut session = TimerSession::idle();
        session.open_segment(at("2026-03-02T09:00:00Z"));
        assert_eq!(elapsed(&session, at("2026-03-02T09:02:05Z")), 125);
        assert_eq!(session.phase(), Phase::Running);
    }

    #[test]
    fn clock_skew_clamps_to_banked_time() {
        let mut session = TimerSession::idle();
        session.open_segment(at("2026-03-02T09:00:00Z"));
        session.close_segment(at("2026-03-02T09:00:40Z"));
        session.open_segment(at("2026-03-02T09:10:00Z"));

        assert_eq!(elapsed(&session, at("2026-03-02T09:05:00Z")), 40);
    }

    #[test]
    fn elapsed_non_decreasing_while_running_and_constant_while_paused() {
        let start = at("2026-03-02T09:00:00Z");
        let mut session = TimerSession::idle();
        session.open_segment(start);

        let mut previous = 0;
        for step in 0..120 {
            let now = start + Duration::milliseconds(step * 700);
            let value = elapsed(&session, now);
            assert!(value >= previous);
            previous = value;
        }

        session.close_segment(start + Duration::seconds(84));
        let banked = elapsed(&session, start + Duration::seconds(84));
        for later in [85, 600, 86_400] {
            assert_eq!(elapsed(&session, start + Duration::seconds(later)), banked);
        }
        assert_eq!(session.phase(), Phase::Paused);
    }

    #[test]
    fn close_segment_without_open_segment_is_none() {
        let mut session = TimerSession::idle();
        assert_eq!(session.close_segment(at("2026-03-02T09:00:00Z")), None);
        assert_eq!(session.accumulated_seconds(), 0);
    }

    #[test]
    fn format_elapsed_minutes_and_hours() {
        assert_eq!(format_elapsed(0), "0:00");
        assert_eq!(format_elapsed(125), "2:05");
        assert_eq!(format_elapsed(3599), "59:59");
        assert_eq!(format_elapsed(3723), "1:02:03");
    }
}
