//! The timer session store.
//!
//! [`TimerStore`] is the only writer of the live [`TimerSession`]. It owns the
//! sending half of a `watch` channel holding the session; every command that
//! changes state publishes the new snapshot in one step, so readers see either
//! the state before a command or the state after it. Commands that would not
//! change anything publish nothing.
//!
//! Readers hold a [`SessionReader`], which can look at the latest snapshot and
//! wait for the next one but has no way to modify it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::entry::{EntryEdit, EntryLog, EntrySink, NullSink, SinkError, TimeEntry, materialize};
use crate::session::{Binding, Phase, TimerSession, elapsed};
use crate::types::EntryId;

/// Task name given to a session started without one.
pub const DEFAULT_PLACEHOLDER_TASK: &str = "Untitled task";

/// Errors from store commands.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `stop_and_save` on a session with no tracked time.
    #[error("nothing to save")]
    NothingToSave,

    /// The persistence backend refused the entry. The session is untouched.
    #[error(transparent)]
    Persist(#[from] SinkError),

    /// No entry with the given ID.
    #[error("entry not found: {id}")]
    EntryNotFound { id: EntryId },

    /// The entry has already been replaced by a revision.
    #[error("entry {id} has already been revised")]
    AlreadySuperseded { id: EntryId },
}

/// Read-only view of the live session.
#[derive(Debug, Clone)]
pub struct SessionReader {
    rx: watch::Receiver<TimerSession>,
}

impl SessionReader {
    /// Returns a copy of the latest snapshot.
    pub fn snapshot(&self) -> TimerSession {
        self.rx.borrow().clone()
    }

    /// Elapsed seconds of the latest snapshot as of `now`.
    pub fn elapsed(&self, now: DateTime<Utc>) -> u64 {
        elapsed(&self.rx.borrow(), now)
    }

    /// Whether the session is running in the latest snapshot.
    pub fn is_running(&self) -> bool {
        self.rx.borrow().is_running()
    }

    /// Phase of the latest snapshot.
    pub fn phase(&self) -> Phase {
        self.rx.borrow().phase()
    }

    /// Waits until a new snapshot is published.
    ///
    /// Returns `false` once the store has been dropped.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// Owner of the live timer session and the entry log.
pub struct TimerStore {
    tx: watch::Sender<TimerSession>,
    clock: Arc<dyn Clock>,
    sink: Box<dyn EntrySink>,
    entries: EntryLog,
    placeholder_task: String,
}

impl std::fmt::Debug for TimerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerStore")
            .field("session", &*self.tx.borrow())
            .field("entries", &self.entries.len())
            .field("placeholder_task", &self.placeholder_task)
            .finish_non_exhaustive()
    }
}

impl TimerStore {
    /// Creates a store holding an idle session, with no durable sink.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (tx, _rx) = watch::channel(TimerSession::idle());
        Self {
            tx,
            clock,
            sink: Box::new(NullSink),
            entries: EntryLog::default(),
            placeholder_task: DEFAULT_PLACEHOLDER_TASK.to_string(),
        }
    }

    /// Sends new entries to `sink` before they are acknowledged.
    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn EntrySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Overrides the task name used when starting without one.
    #[must_use]
    pub fn with_placeholder_task(mut self, name: impl Into<String>) -> Self {
        self.placeholder_task = name.into();
        self
    }

    /// Returns a reader that observes every published snapshot.
    pub fn subscribe(&self) -> SessionReader {
        SessionReader {
            rx: self.tx.subscribe(),
        }
    }

    /// Returns a copy of the current session.
    pub fn snapshot(&self) -> TimerSession {
        self.tx.borrow().clone()
    }

    /// Entries created by this store, in creation order.
    pub const fn entries(&self) -> &EntryLog {
        &self.entries
    }

    /// The clock commands are evaluated against.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Starts a run segment. Returns `false` if already running.
    ///
    /// An empty task name is replaced by the placeholder so the session can
    /// always be displayed.
    pub fn start(&mut self) -> bool {
        let now = self.clock.now();
        let placeholder = &self.placeholder_task;
        let started = self.tx.send_if_modified(|session| {
            if session.is_running() {
                return false;
            }
            if session.task_name().is_empty() {
                session.set_task_name(placeholder.clone());
            }
            session.open_segment(now);
            true
        });
        if started {
            info!(task = %self.tx.borrow().task_name(), "timer started");
        } else {
            debug!("start ignored: already running");
        }
        started
    }

    /// Resumes a paused session. Banked time is kept.
    pub fn resume(&mut self) -> bool {
        self.start()
    }

    /// Closes the open run segment now. Returns `false` if not running.
    pub fn pause(&mut self) -> bool {
        let now = self.clock.now();
        self.close_segment_at(now)
    }

    /// Closes the open run segment at `cutoff` instead of now.
    ///
    /// The cutoff is clamped between the segment start and now, so the banked
    /// time never exceeds what `pause` would have banked.
    pub fn pause_at(&mut self, cutoff: DateTime<Utc>) -> bool {
        let now = self.clock.now();
        let end = match self.tx.borrow().started_at() {
            Some(start) => cutoff.clamp(start, now.max(start)),
            None => now,
        };
        self.close_segment_at(end)
    }

    fn close_segment_at(&mut self, end: DateTime<Utc>) -> bool {
        let mut banked = None;
        let paused = self.tx.send_if_modified(|session| {
            banked = session.close_segment(end);
            banked.is_some()
        });
        if let Some(secs) = banked {
            info!(
                segment_secs = secs,
                accumulated_secs = self.tx.borrow().accumulated_seconds(),
                "timer paused"
            );
        } else {
            debug!("pause ignored: not running");
        }
        paused
    }

    /// Replaces the catalog binding. Timekeeping fields are never touched.
    pub fn bind_activity(&mut self, binding: Binding) -> bool {
        let activity = binding.activity.to_string();
        let changed = self.tx.send_if_modified(|session| {
            if *session.binding() == binding {
                return false;
            }
            session.set_binding(binding);
            true
        });
        if changed {
            info!(%activity, "activity bound");
        }
        changed
    }

    /// Materializes the session into an entry and returns to idle.
    ///
    /// Fails with [`StoreError::NothingToSave`] when no time has been tracked.
    /// If the sink fails the session is left exactly as it was, still running
    /// if it was running, so the caller can retry.
    pub fn stop_and_save(&mut self) -> Result<TimeEntry, StoreError> {
        let now = self.clock.now();
        let entry = {
            let session = self.tx.borrow();
            if elapsed(&session, now) == 0 {
                debug!("stop rejected: nothing to save");
                return Err(StoreError::NothingToSave);
            }
            materialize(&session, now)
        };

        if let Err(err) = self.sink.append(&entry) {
            warn!(error = %err, "failed to persist entry; session kept");
            return Err(err.into());
        }

        info!(
            entry_id = %entry.id(),
            duration_minutes = entry.duration_minutes(),
            amount = %entry.amount(),
            "session saved"
        );
        self.entries.push(entry.clone());
        self.tx.send_replace(TimerSession::idle());
        Ok(entry)
    }

    /// Drops the session without creating an entry. Returns `false` if
    /// there was nothing to discard.
    pub fn discard(&mut self) -> bool {
        let discarded = self.tx.send_if_modified(|session| {
            if *session == TimerSession::idle() {
                return false;
            }
            *session = TimerSession::idle();
            true
        });
        if discarded {
            info!("session discarded");
        }
        discarded
    }

    /// Appends a replacement for an existing entry.
    ///
    /// The original stays in the log and is marked as superseded.
    pub fn revise_entry(&mut self, id: &EntryId, edit: EntryEdit) -> Result<TimeEntry, StoreError> {
        if self.entries.is_superseded(id) {
            return Err(StoreError::AlreadySuperseded { id: id.clone() });
        }
        let original = self
            .entries
            .get(id)
            .ok_or_else(|| StoreError::EntryNotFound { id: id.clone() })?;
        let replacement = original.revised(edit);
        self.sink.append(&replacement)?;
        info!(entry_id = %replacement.id(), supersedes = %id, "entry revised");
        self.entries.push(replacement.clone());
        Ok(replacement)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use chrono::Duration;
    use rust_decimal::Decimal;

    use super::*;
    use crate::clock::ManualClock;
    use crate::types::{ActivityRef, Rate, WorkOrderId};

    fn setup() -> (TimerStore, ManualClock) {
        let start = DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = ManualClock::new(start);
        let store = TimerStore::new(Arc::new(clock.clone()));
        (store, clock)
    }

    fn billable_binding() -> Binding {
        Binding {
            activity: ActivityRef::WorkOrder(WorkOrderId::new("WO-1042").unwrap()),
            task_name: "Replace conveyor belt".to_string(),
            billable: true,
            rate: Rate::per_hour(500),
            category: "maintenance".to_string(),
        }
    }

    /// Sink that fails while `failing` is set.
    struct FlakySink {
        failing: Rc<Cell<bool>>,
        appended: Rc<Cell<usize>>,
    }

    impl EntrySink for FlakySink {
        fn append(&mut self, entry: &TimeEntry) -> Result<(), SinkError> {
            if self.failing.get() {
                return Err(SinkError::new(entry.id().clone(), "disk full"));
            }
            self.appended.set(self.appended.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn start_defaults_task_name_and_ticks() {
        let (mut store, clock) = setup();
        assert!(store.start());
        assert_eq!(store.snapshot().task_name(), DEFAULT_PLACEHOLDER_TASK);

        clock.advance_secs(1);
        let reader = store.subscribe();
        assert_eq!(reader.elapsed(clock.now()), 1);
    }

    #[test]
    fn start_keeps_existing_task_name() {
        let (mut store, _clock) = setup();
        store.bind_activity(billable_binding());
        store.start();
        assert_eq!(store.snapshot().task_name(), "Replace conveyor belt");
    }

    #[test]
    fn start_while_running_is_noop() {
        let (mut store, clock) = setup();
        store.start();
        let before = store.snapshot();
        clock.advance_secs(10);

        assert!(!store.start());
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn pause_while_idle_is_noop() {
        let (mut store, _clock) = setup();
        assert!(!store.pause());
        assert_eq!(store.snapshot(), TimerSession::idle());
    }

    #[test]
    fn pause_banks_segment() {
        let (mut store, clock) = setup();
        store.start();
        clock.advance_secs(125);
        assert!(store.pause());

        let session = store.snapshot();
        assert_eq!(session.accumulated_seconds(), 125);
        assert!(!session.is_running());
        assert_eq!(session.started_at(), None);
        assert_eq!(session.phase(), Phase::Paused);
        assert_eq!(crate::session::format_elapsed(elapsed(&session, clock.now())), "2:05");
    }

    #[test]
    fn pause_resume_preserves_banked_time() {
        let (mut store, clock) = setup();
        store.start();
        clock.advance_secs(47);
        store.pause();
        let banked = store.snapshot().accumulated_seconds();

        clock.advance_secs(600);
        store.resume();
        assert_eq!(store.snapshot().accumulated_seconds(), banked);
        assert_eq!(elapsed(&store.snapshot(), clock.now()), banked);
    }

    #[test]
    fn pause_at_clamps_cutoff() {
        let (mut store, clock) = setup();
        store.start();
        let started = clock.now();
        clock.advance_secs(400);

        assert!(store.pause_at(started + Duration::seconds(100)));
        assert_eq!(store.snapshot().accumulated_seconds(), 100);

        store.resume();
        let resumed = clock.now();
        clock.advance_secs(50);
        store.pause_at(resumed - Duration::seconds(500));
        assert_eq!(store.snapshot().accumulated_seconds(), 100);

        store.resume();
        clock.advance_secs(20);
        store.pause_at(clock.now() + Duration::seconds(500));
        assert_eq!(store.snapshot().accumulated_seconds(), 120);
    }

    #[test]
    fn clock_set_backwards_never_loses_banked_time() {
        let (mut store, clock) = setup();
        store.start();
        clock.advance_secs(90);
        store.pause();
        store.resume();
        let resumed = clock.now();

        clock.set(resumed - Duration::seconds(40));
        let reader = store.subscribe();
        assert_eq!(reader.elapsed(clock.now()), 90);
        assert!(store.pause());
        assert_eq!(store.snapshot().accumulated_seconds(), 90);

        clock.set(resumed + Duration::seconds(30));
        store.resume();
        clock.advance_secs(30);
        assert_eq!(store.stop_and_save().unwrap().duration_minutes(), 2);
    }

    #[test]
    fn stop_and_save_rounds_total_run_time() {
        let (mut store, clock) = setup();
        store.start();
        clock.advance_secs(125);
        store.pause();
        clock.advance_secs(300);
        store.resume();
        clock.advance_secs(55);

        let entry = store.stop_and_save().unwrap();

        assert_eq!(entry.duration_minutes(), 3);
        assert_eq!(entry.amount(), Decimal::ZERO);
        assert_eq!(store.snapshot(), TimerSession::idle());
        assert_eq!(store.entries().len(), 1);
    }

    #[test]
    fn billable_session_computes_amount() {
        let (mut store, clock) = setup();
        store.bind_activity(billable_binding());
        store.start();
        clock.advance_secs(125);
        store.pause();
        store.resume();
        clock.advance_secs(55);

        let entry = store.stop_and_save().unwrap();
        assert_eq!(entry.amount(), Decimal::from(25));
        assert!(store.snapshot().activity().is_none());
    }

    #[test]
    fn stop_with_nothing_tracked_is_rejected() {
        let (mut store, _clock) = setup();
        assert!(matches!(store.stop_and_save(), Err(StoreError::NothingToSave)));

        store.start();
        let before = store.snapshot();
        assert!(matches!(store.stop_and_save(), Err(StoreError::NothingToSave)));
        assert_eq!(store.snapshot(), before);
        assert!(store.entries().is_empty());
    }

    #[test]
    fn second_stop_is_rejected() {
        let (mut store, clock) = setup();
        store.start();
        clock.advance_secs(90);
        store.stop_and_save().unwrap();
        assert!(matches!(store.stop_and_save(), Err(StoreError::NothingToSave)));
        assert_eq!(store.entries().len(), 1);
    }

    #[test]
    fn sink_failure_keeps_session() {
        let (store, clock) = setup();
        let failing = Rc::new(Cell::new(true));
        let appended = Rc::new(Cell::new(0));
        let mut store = store.with_sink(Box::new(FlakySink {
            failing: Rc::clone(&failing),
            appended: Rc::clone(&appended),
        }));
        store.start();
        clock.advance_secs(600);
        let before = store.snapshot();

        let err = store.stop_and_save().unwrap_err();
        assert!(matches!(err, StoreError::Persist(_)));
        assert_eq!(store.snapshot(), before);
        assert!(store.snapshot().is_running());
        assert!(store.entries().is_empty());

        failing.set(false);
        let entry = store.stop_and_save().unwrap();
        assert_eq!(entry.duration_minutes(), 10);
        assert_eq!(appended.get(), 1);
        assert_eq!(store.snapshot().phase(), Phase::Idle);
    }

    #[test]
    fn discard_resets_without_entry() {
        let (mut store, clock) = setup();
        store.bind_activity(billable_binding());
        store.start();
        clock.advance_secs(30);
        store.pause();

        assert!(store.discard());
        assert_eq!(store.snapshot(), TimerSession::idle());
        assert!(store.entries().is_empty());
        assert!(!store.discard());
    }

    #[test]
    fn bind_never_touches_timekeeping() {
        let (mut store, clock) = setup();
        let check = |store: &mut TimerStore| {
            let before = store.snapshot();
            store.bind_activity(billable_binding());
            let after = store.snapshot();
            assert_eq!(after.is_running(), before.is_running());
            assert_eq!(after.started_at(), before.started_at());
            assert_eq!(after.accumulated_seconds(), before.accumulated_seconds());
            store.bind_activity(Binding::default());
        };

        check(&mut store);
        store.start();
        clock.advance_secs(12);
        check(&mut store);
        store.pause();
        check(&mut store);
    }

    #[test]
    fn noop_commands_publish_nothing() {
        let (mut store, clock) = setup();
        let mut reader = store.subscribe();
        reader.rx.mark_unchanged();

        store.pause();
        assert!(!reader.rx.has_changed().unwrap());

        store.start();
        assert!(reader.rx.has_changed().unwrap());
        reader.rx.mark_unchanged();

        clock.advance_secs(5);
        store.start();
        assert!(!reader.rx.has_changed().unwrap());
    }

    #[test]
    fn revise_entry_appends_replacement() {
        let (mut store, clock) = setup();
        store.bind_activity(billable_binding());
        store.start();
        clock.advance_secs(3600);
        let original = store.stop_and_save().unwrap();

        let revised = store
            .revise_entry(
                original.id(),
                EntryEdit {
                    billable: Some(false),
                    ..EntryEdit::default()
                },
            )
            .unwrap();

        assert_eq!(revised.amount(), Decimal::ZERO);
        assert_eq!(store.entries().len(), 2);
        assert_eq!(store.entries().current().count(), 1);
        assert!(matches!(
            store.revise_entry(original.id(), EntryEdit::default()),
            Err(StoreError::AlreadySuperseded { .. })
        ));

        let missing = EntryId::new("missing").unwrap();
        assert!(matches!(
            store.revise_entry(&missing, EntryEdit::default()),
            Err(StoreError::EntryNotFound { .. })
        ));
    }
}
