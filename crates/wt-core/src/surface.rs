//! Presentations of the live session.
//!
//! A surface holds nothing but a [`SessionReader`] and its own presentation
//! flags. Every frame is computed from the latest snapshot and the wall clock,
//! so any number of surfaces open at once show the same time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::clock::Clock;
use crate::session::{Phase, format_elapsed};
use crate::store::SessionReader;

/// Default redraw period.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// One rendered state of a surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    pub surface: &'static str,
    pub phase: Phase,
    pub elapsed_secs: u64,
    pub display: String,
    /// Omitted when the surface is collapsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
}

impl Frame {
    fn from_reader(
        surface: &'static str,
        reader: &SessionReader,
        now: DateTime<Utc>,
        collapsed: bool,
    ) -> Self {
        let session = reader.snapshot();
        let elapsed_secs = crate::session::elapsed(&session, now);
        Self {
            surface,
            phase: session.phase(),
            elapsed_secs,
            display: format_elapsed(elapsed_secs),
            task_name: (!collapsed).then(|| session.task_name().to_string()),
        }
    }
}

/// A presentation of the live session.
pub trait Surface: Send + Sync {
    /// Short identifier used in frames and logs.
    fn name(&self) -> &'static str;

    /// Renders the surface as of `now`, or `None` when it is hidden.
    fn render(&self, now: DateTime<Utc>) -> Option<Frame>;
}

/// The full dashboard timer panel. Always visible while mounted.
#[derive(Debug, Clone)]
pub struct Dashboard {
    reader: SessionReader,
}

impl Dashboard {
    pub const fn new(reader: SessionReader) -> Self {
        Self { reader }
    }
}

impl Surface for Dashboard {
    fn name(&self) -> &'static str {
        "dashboard"
    }

    fn render(&self, now: DateTime<Utc>) -> Option<Frame> {
        Some(Frame::from_reader(self.name(), &self.reader, now, false))
    }
}

/// Screens of the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    Splash,
    Login,
    Dashboard,
    Timesheet,
    Reports,
    Settings,
}

impl Screen {
    /// Whether the floating control is hidden on this screen.
    pub const fn hides_floating_control(self) -> bool {
        matches!(self, Self::Splash | Self::Login)
    }
}

/// The persistent floating timer control.
///
/// Collapse, dismissal and screen suppression are presentation state only;
/// none of them touch the session.
#[derive(Debug)]
pub struct FloatingControl {
    reader: SessionReader,
    collapsed: AtomicBool,
    dismissed: AtomicBool,
    suppressed: AtomicBool,
}

impl FloatingControl {
    pub const fn new(reader: SessionReader) -> Self {
        Self {
            reader,
            collapsed: AtomicBool::new(false),
            dismissed: AtomicBool::new(false),
            suppressed: AtomicBool::new(false),
        }
    }

    /// Flips between collapsed and expanded. Returns the new collapsed state.
    pub fn toggle_collapsed(&self) -> bool {
        !self.collapsed.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn is_collapsed(&self) -> bool {
        self.collapsed.load(Ordering::Relaxed)
    }

    /// Hides the control for the rest of the process.
    pub fn dismiss(&self) {
        if !self.dismissed.swap(true, Ordering::Relaxed) {
            debug!("floating control dismissed");
        }
    }

    pub fn is_dismissed(&self) -> bool {
        self.dismissed.load(Ordering::Relaxed)
    }

    /// Tells the control which screen the host is showing.
    pub fn set_screen(&self, screen: Screen) {
        self.suppressed
            .store(screen.hides_floating_control(), Ordering::Relaxed);
    }

    /// Visible unless dismissed, suppressed by the screen, or idle.
    pub fn is_visible(&self) -> bool {
        !self.is_dismissed()
            && !self.suppressed.load(Ordering::Relaxed)
            && self.reader.phase() != Phase::Idle
    }
}

impl Surface for FloatingControl {
    fn name(&self) -> &'static str {
        "floating"
    }

    fn render(&self, now: DateTime<Utc>) -> Option<Frame> {
        self.is_visible()
            .then(|| Frame::from_reader(self.name(), &self.reader, now, self.is_collapsed()))
    }
}

/// A running redraw schedule for one surface.
///
/// Dropping the handle cancels this surface's ticks and nothing else.
#[derive(Debug)]
pub struct TickerHandle {
    surface: &'static str,
    task: JoinHandle<()>,
}

impl TickerHandle {
    pub const fn surface(&self) -> &'static str {
        self.surface
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.task.abort();
        debug!(surface = self.surface, "ticker stopped");
    }
}

/// Renders `surface` every `period` and sends visible frames to `frames`.
///
/// The first frame is produced one period after spawning. Ticks missed while
/// the process was suspended are skipped; the next frame still shows the
/// correct time because it is computed from the wall clock.
pub fn spawn_ticker<S>(
    surface: Arc<S>,
    period: Duration,
    clock: Arc<dyn Clock>,
    frames: mpsc::UnboundedSender<Frame>,
) -> TickerHandle
where
    S: Surface + 'static,
{
    let name = surface.name();
    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if let Some(frame) = surface.render(clock.now()) {
                if frames.send(frame).is_err() {
                    break;
                }
            }
        }
    });
    debug!(surface = name, period_ms = period.as_millis(), "ticker started");
    TickerHandle {
        surface: name,
        task,
    }
}
