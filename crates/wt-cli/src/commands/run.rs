//! Interactive timer session (`wt run`).
//!
//! One task owns the store and the idle monitor. It reacts to input lines,
//! idle checks and surface frames in a single `select!` loop, so every
//! command is applied in order and the surfaces only ever read snapshots.

use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use wt_core::{
    ActivityRef, CatalogIndex, Clock, Dashboard, FloatingControl, Frame, IdleMonitor, MonitorMode,
    Phase, Screen, StoreError, Surface, SystemClock, TickerHandle, TimerStore, bind,
    format_elapsed, spawn_ticker,
};
use wt_db::Database;

use super::entries::{format_amount, write_entries};
use crate::Config;

const HELP: &str = "\
Commands:
  start            start the timer
  pause            pause the timer
  resume           resume a paused timer
  stop             save the session as a time entry
  discard          throw the session away
  bind <ref>       bind wo:<id>, qa:<id>, other:<reason> or none
  keep             keep running after an idle alert
  idle-stop        pause after an idle alert
  status           show both surfaces and the idle state
  collapse         collapse or expand the floating control
  dismiss          hide the floating control
  screen <name>    switch screen (splash, login, dashboard, timesheet, reports, settings)
  entries          list entries saved in this run
  quit             exit";

/// Arguments for `wt run`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RunArgs {
    /// Print a frame from each surface on every tick.
    #[arg(long)]
    pub live: bool,

    /// Run without idle detection.
    #[arg(long)]
    pub no_idle: bool,
}

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Pause,
    Resume,
    Stop,
    Discard,
    Bind(ActivityRef),
    Keep,
    IdleStop,
    Status,
    Collapse,
    Dismiss,
    Screen(Screen),
    Entries,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let (word, rest) = line
            .trim()
            .split_once(char::is_whitespace)
            .map_or((line.trim(), ""), |(word, rest)| (word, rest.trim()));
        let command = match word {
            "start" => Self::Start,
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "stop" => Self::Stop,
            "discard" => Self::Discard,
            "bind" if rest.is_empty() => bail!("usage: bind <ref>"),
            "bind" => Self::Bind(rest.parse()?),
            "keep" => Self::Keep,
            "idle-stop" => Self::IdleStop,
            "status" => Self::Status,
            "collapse" => Self::Collapse,
            "dismiss" => Self::Dismiss,
            "screen" => Self::Screen(parse_screen(rest)?),
            "entries" => Self::Entries,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => bail!("unknown command '{other}'; type 'help' for a list"),
        };
        Ok(command)
    }
}

fn parse_screen(name: &str) -> Result<Screen> {
    let screen = match name {
        "splash" => Screen::Splash,
        "login" => Screen::Login,
        "dashboard" => Screen::Dashboard,
        "timesheet" => Screen::Timesheet,
        "reports" => Screen::Reports,
        "settings" => Screen::Settings,
        "" => bail!("usage: screen <name>"),
        other => bail!("unknown screen '{other}'"),
    };
    Ok(screen)
}

/// Whether the loop should keep reading input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Everything the interactive loop owns.
#[derive(Debug)]
pub struct Session {
    store: TimerStore,
    monitor: IdleMonitor,
    catalog: CatalogIndex,
    dashboard: Arc<Dashboard>,
    floating: Arc<FloatingControl>,
}

impl Session {
    pub fn new(store: TimerStore, monitor: IdleMonitor, catalog: CatalogIndex) -> Self {
        let dashboard = Arc::new(Dashboard::new(store.subscribe()));
        let floating = Arc::new(FloatingControl::new(store.subscribe()));
        floating.set_screen(Screen::Dashboard);
        Self {
            store,
            monitor,
            catalog,
            dashboard,
            floating,
        }
    }

    pub const fn store(&self) -> &TimerStore {
        &self.store
    }

    pub const fn monitor(&self) -> &IdleMonitor {
        &self.monitor
    }

    /// Starts one ticker per surface, all feeding `frames`.
    pub fn spawn_tickers(
        &self,
        period: Duration,
        frames: &mpsc::UnboundedSender<Frame>,
    ) -> Vec<TickerHandle> {
        let clock = Arc::clone(self.store.clock());
        vec![
            spawn_ticker(
                Arc::clone(&self.dashboard),
                period,
                Arc::clone(&clock),
                frames.clone(),
            ),
            spawn_ticker(Arc::clone(&self.floating), period, clock, frames.clone()),
        ]
    }

    /// Applies one input line. Any line, even an invalid one, counts as presence.
    pub fn handle_line<W: Write>(&mut self, line: &str, out: &mut W) -> Result<Flow> {
        let now = self.store.clock().now();
        self.monitor.record_activity(now);
        if line.trim().is_empty() {
            return Ok(Flow::Continue);
        }
        match line.parse::<Command>() {
            Ok(command) => self.execute(command, out),
            Err(err) => {
                writeln!(out, "{err}")?;
                Ok(Flow::Continue)
            }
        }
    }

    /// Runs a parsed command.
    pub fn execute<W: Write>(&mut self, command: Command, out: &mut W) -> Result<Flow> {
        match command {
            Command::Start => {
                if self.store.start() {
                    writeln!(out, "Started: {}", self.store.snapshot().task_name())?;
                } else {
                    writeln!(out, "Timer is already running.")?;
                }
            }
            Command::Pause => {
                if self.store.pause() {
                    writeln!(out, "Paused at {}.", self.display())?;
                } else {
                    writeln!(out, "Timer is not running.")?;
                }
            }
            Command::Resume => {
                if self.store.resume() {
                    writeln!(out, "Resumed at {}.", self.display())?;
                } else {
                    writeln!(out, "Timer is already running.")?;
                }
            }
            Command::Stop => match self.store.stop_and_save() {
                Ok(entry) => {
                    write!(out, "Saved {} min of {}", entry.duration_minutes(), entry.task())?;
                    if entry.billable() {
                        write!(out, " ({})", format_amount(entry.amount()))?;
                    }
                    writeln!(out, ".")?;
                }
                Err(StoreError::NothingToSave) => writeln!(out, "Nothing to save.")?,
                Err(err) => {
                    tracing::error!(error = %err, "failed to save entry");
                    writeln!(out, "Could not save the entry: {err}")?;
                    writeln!(out, "The timer was left as it was; try 'stop' again.")?;
                }
            },
            Command::Discard => {
                if self.store.discard() {
                    writeln!(out, "Discarded.")?;
                } else {
                    writeln!(out, "Nothing to discard.")?;
                }
            }
            Command::Bind(reference) => {
                bind(&mut self.store, &self.catalog, reference);
                let session = self.store.snapshot();
                if session.activity().is_none() {
                    writeln!(out, "Binding cleared.")?;
                } else {
                    let task = match session.task_name() {
                        "" => "(unknown activity)",
                        name => name,
                    };
                    write!(out, "Bound to {task}")?;
                    if session.billable() {
                        write!(out, ", billable at {}/h", session.rate())?;
                    }
                    writeln!(out, ".")?;
                }
            }
            Command::Keep => {
                let now = self.store.clock().now();
                match self.monitor.keep_running(now) {
                    Ok(()) => writeln!(out, "Keeping the timer running.")?,
                    Err(err) => writeln!(out, "{err}")?,
                }
            }
            Command::IdleStop => match self.monitor.stop_timer(&mut self.store) {
                Ok(true) => writeln!(out, "Paused at {}.", self.display())?,
                Ok(false) => writeln!(out, "Timer was not running.")?,
                Err(err) => writeln!(out, "{err}")?,
            },
            Command::Status => self.write_status(out)?,
            Command::Collapse => {
                if self.floating.toggle_collapsed() {
                    writeln!(out, "Floating control collapsed.")?;
                } else {
                    writeln!(out, "Floating control expanded.")?;
                }
            }
            Command::Dismiss => {
                self.floating.dismiss();
                writeln!(out, "Floating control dismissed.")?;
            }
            Command::Screen(screen) => {
                self.floating.set_screen(screen);
                writeln!(out, "Screen: {screen:?}.")?;
            }
            Command::Entries => {
                let entries: Vec<_> = self.store.entries().current().cloned().collect();
                write_entries(out, &entries)?;
            }
            Command::Help => writeln!(out, "{HELP}")?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Checks for idleness and announces a newly raised alert.
    pub fn poll_idle<W: Write>(&mut self, out: &mut W) -> Result<()> {
        let now = self.store.clock().now();
        if let Some(alert) = self.monitor.poll(&self.store.snapshot(), now) {
            writeln!(
                out,
                "No input for {} min. Type 'keep' to keep the timer running or 'idle-stop' to pause it.",
                alert.idle_for().num_minutes()
            )?;
        }
        Ok(())
    }

    fn display(&self) -> String {
        format_elapsed(self.store.snapshot().accumulated_seconds())
    }

    fn write_status<W: Write>(&self, out: &mut W) -> Result<()> {
        let now = self.store.clock().now();
        let surfaces: [&dyn Surface; 2] = [self.dashboard.as_ref(), self.floating.as_ref()];
        for surface in surfaces {
            match surface.render(now) {
                Some(frame) => writeln!(out, "{}", format_frame(&frame))?,
                None => writeln!(out, "[{}] hidden", surface.name())?,
            }
        }
        match (self.monitor.mode(), self.monitor.pending_alert()) {
            (MonitorMode::Degraded { reason }, _) => writeln!(out, "idle: off ({reason})")?,
            (MonitorMode::Active, Some(alert)) => writeln!(
                out,
                "idle: alert raised after {} min without input",
                alert.idle_for().num_minutes()
            )?,
            (MonitorMode::Active, None) => writeln!(out, "idle: watching")?,
        }
        let entries = self.store.entries();
        writeln!(
            out,
            "entries: {} saved, {} billable",
            entries.current().count(),
            format_amount(entries.total_amount())
        )?;
        Ok(())
    }

    /// Warns about time that would be lost on exit.
    fn finish<W: Write>(&self, out: &mut W) -> Result<()> {
        let session = self.store.snapshot();
        if session.phase() != Phase::Idle {
            let now = self.store.clock().now();
            let shown = format_elapsed(wt_core::elapsed(&session, now));
            tracing::warn!(phase = session.phase().as_str(), "exiting with unsaved time");
            writeln!(out, "Exiting with {shown} unsaved; the session was not saved.")?;
        }
        Ok(())
    }
}

/// Renders a frame as one line.
pub fn format_frame(frame: &Frame) -> String {
    match &frame.task_name {
        Some(task) => format!(
            "[{}] {} {} {task}",
            frame.surface,
            frame.display,
            frame.phase.as_str()
        ),
        None => format!("[{}] {} {}", frame.surface, frame.display, frame.phase.as_str()),
    }
}

/// Drives `session` from `input` until EOF or `quit`.
///
/// With `live` set, both surfaces tick at that period and their frames are
/// written to `out` as they arrive.
pub async fn drive<R, W>(
    input: R,
    out: &mut W,
    mut session: Session,
    live: Option<Duration>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
    let _tickers = live.map_or_else(Vec::new, |period| {
        session.spawn_tickers(period, &frames_tx)
    });

    let mut idle_tick = tokio::time::interval(session.monitor.config().poll_interval);
    idle_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    writeln!(out, "Type 'help' for commands.")?;
    out.flush()?;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if session.handle_line(&line, out)? == Flow::Quit {
                    break;
                }
            }
            _ = idle_tick.tick() => session.poll_idle(out)?,
            Some(frame) = frames_rx.recv() => writeln!(out, "{}", format_frame(&frame))?,
        }
        out.flush()?;
    }
    session.finish(out)?;
    out.flush()?;
    Ok(())
}

/// Runs the interactive session against stdin and stdout.
pub async fn run(db: Database, config: &Config, args: &RunArgs) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let now = clock.now();
    let catalog = config.load_catalog()?.index();
    let store = TimerStore::new(clock)
        .with_sink(Box::new(db))
        .with_placeholder_task(config.placeholder_task.clone());

    let idle_config = config.idle.to_idle_config();
    let monitor = if args.no_idle {
        IdleMonitor::degraded(idle_config, now, "disabled by --no-idle")
    } else if !config.idle.enabled {
        IdleMonitor::degraded(idle_config, now, "disabled in config")
    } else {
        IdleMonitor::new(idle_config, now)
    };

    let live = args.live.then(|| config.tick_period());
    let session = Session::new(store, monitor, catalog);
    drive(
        BufReader::new(tokio::io::stdin()),
        &mut std::io::stdout(),
        session,
        live,
    )
    .await
}
