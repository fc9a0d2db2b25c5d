//! Idle detection for running sessions.
//!
//! The host feeds user-presence signals into [`IdleMonitor::record_activity`]
//! and calls [`IdleMonitor::poll`] on a fixed interval. When a running session
//! has seen no presence for the configured threshold, the monitor raises a
//! single [`IdleAlert`] that stays outstanding until it is resolved with
//! [`IdleMonitor::keep_running`] or [`IdleMonitor::stop_timer`].

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::session::TimerSession;
use crate::store::TimerStore;

/// How much of the idle stretch is kept when the user stops from an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleStopPolicy {
    /// Pause at the moment of resolution; the idle stretch stays tracked.
    #[default]
    IncludeIdle,
    /// Pause as of the last presence signal; the idle stretch is dropped.
    TrimToLastActivity,
}

/// Idle monitor settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleConfig {
    /// Time without presence before an alert is raised.
    /// Default: 5 minutes.
    pub threshold: Duration,
    /// How often the host should call [`IdleMonitor::poll`].
    /// Default: 30 seconds.
    pub poll_interval: StdDuration,
    /// Applied by [`IdleMonitor::stop_timer`].
    pub stop_policy: IdleStopPolicy,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            threshold: Duration::minutes(5),
            poll_interval: StdDuration::from_secs(30),
            stop_policy: IdleStopPolicy::IncludeIdle,
        }
    }
}

/// An outstanding idle alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdleAlert {
    /// When the alert was raised.
    pub raised_at: DateTime<Utc>,
    /// Last presence seen before the alert (or the segment start, if later).
    pub last_activity: DateTime<Utc>,
    /// Start of the run segment the alert was raised for.
    pub segment_started_at: DateTime<Utc>,
}

impl IdleAlert {
    /// How long the user had been away when the alert was raised.
    pub fn idle_for(&self) -> Duration {
        self.raised_at - self.last_activity
    }
}

/// Whether the monitor is able to detect idleness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorMode {
    /// Presence signals are attached.
    Active,
    /// No presence source; the monitor never raises.
    Degraded { reason: String },
}

/// Errors resolving an alert.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdleError {
    /// Resolution requested with no alert outstanding.
    #[error("no idle alert is outstanding")]
    NoAlert,
}

/// Watchdog that flags a running session as possibly abandoned.
#[derive(Debug, Clone)]
pub struct IdleMonitor {
    config: IdleConfig,
    mode: MonitorMode,
    last_activity: DateTime<Utc>,
    alert: Option<IdleAlert>,
}

impl IdleMonitor {
    /// Creates a monitor with presence signals attached.
    pub fn new(config: IdleConfig, now: DateTime<Utc>) -> Self {
        Self {
            config,
            mode: MonitorMode::Active,
            last_activity: now,
            alert: None,
        }
    }

    /// Creates a monitor that has no presence source and never raises.
    pub fn degraded(config: IdleConfig, now: DateTime<Utc>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(%reason, "idle detection disabled");
        Self {
            config,
            mode: MonitorMode::Degraded { reason },
            last_activity: now,
            alert: None,
        }
    }

    pub const fn config(&self) -> &IdleConfig {
        &self.config
    }

    pub const fn mode(&self) -> &MonitorMode {
        &self.mode
    }

    pub const fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// The outstanding alert, if any.
    pub const fn pending_alert(&self) -> Option<&IdleAlert> {
        self.alert.as_ref()
    }

    /// Records a user-presence signal.
    ///
    /// An outstanding alert is not cleared; only an explicit resolution does
    /// that.
    pub fn record_activity(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    /// Checks the session and raises an alert if it has gone idle.
    ///
    /// Returns the alert only at the moment it is raised. Starting a run
    /// segment counts as presence, so a stale signal from before the start
    /// never triggers an alert. An alert whose segment has since been closed
    /// is dropped.
    pub fn poll(&mut self, session: &TimerSession, now: DateTime<Utc>) -> Option<IdleAlert> {
        if matches!(self.mode, MonitorMode::Degraded { .. }) {
            return None;
        }
        if let Some(alert) = &self.alert {
            if session.started_at() == Some(alert.segment_started_at) {
                return None;
            }
            debug!("dropping idle alert for a closed segment");
            self.alert = None;
        }
        let started_at = session.started_at()?;
        let last_activity = self.last_activity.max(started_at);
        if now - last_activity < self.config.threshold {
            return None;
        }
        let alert = IdleAlert {
            raised_at: now,
            last_activity,
            segment_started_at: started_at,
        };
        info!(
            idle_secs = alert.idle_for().num_seconds(),
            "idle alert raised"
        );
        self.alert = Some(alert.clone());
        Some(alert)
    }

    /// Dismisses the alert and treats the user as present from `now`.
    pub fn keep_running(&mut self, now: DateTime<Utc>) -> Result<(), IdleError> {
        self.alert.take().ok_or(IdleError::NoAlert)?;
        self.last_activity = self.last_activity.max(now);
        info!("idle alert dismissed; timer kept running");
        Ok(())
    }

    /// Dismisses the alert and pauses the store according to the stop policy.
    ///
    /// Returns whether the store was running and got paused. If the segment
    /// the alert was raised for is no longer open, the alert is only cleared.
    pub fn stop_timer(&mut self, store: &mut TimerStore) -> Result<bool, IdleError> {
        let alert = self.alert.take().ok_or(IdleError::NoAlert)?;
        if store.snapshot().started_at() != Some(alert.segment_started_at) {
            debug!("idle alert outlived its segment; cleared without pausing");
            return Ok(false);
        }
        let paused = match self.config.stop_policy {
            IdleStopPolicy::IncludeIdle => store.pause(),
            IdleStopPolicy::TrimToLastActivity => store.pause_at(alert.last_activity),
        };
        info!(policy = ?self.config.stop_policy, paused, "idle alert resolved by stopping");
        Ok(paused)
    }
}
