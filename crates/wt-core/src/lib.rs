//! Timer/session engine for the time tracker.
//!
//! This crate contains the live timing model and its invariants:
//! - Session: the one live timer record and the elapsed-time calculator
//! - Store: the single writer of the session, publishing snapshots to readers
//! - Idle: the watchdog that flags abandoned running sessions
//! - Catalog: binding work orders and activities to the session
//! - Surface: dashboard and floating presentations driven by snapshots
//! - Entry: immutable time entries and the materializer

pub mod catalog;
pub mod clock;
pub mod entry;
pub mod idle;
pub mod session;
pub mod store;
pub mod surface;
mod types;

pub use catalog::{ActivityCatalog, ActivityInfo, CatalogIndex, StaticCatalog, bind, resolve};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{
    EntryEdit, EntryLog, EntryParts, EntrySink, NullSink, SinkError, TimeEntry, materialize,
};
pub use idle::{IdleAlert, IdleConfig, IdleError, IdleMonitor, IdleStopPolicy, MonitorMode};
pub use session::{Binding, Phase, TimerSession, elapsed, format_elapsed};
pub use store::{SessionReader, StoreError, TimerStore};
pub use surface::{Dashboard, FloatingControl, Frame, Screen, Surface, TickerHandle, spawn_ticker};
pub use types::{ActivityId, ActivityRef, EntryId, Rate, ValidationError, WorkOrderId};
