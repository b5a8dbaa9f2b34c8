//! The monitoring session: connection lifecycle, the event loop, and shutdown.
//!
//! A session moves through `Connecting → Listening → Draining → Closed`.
//! While listening, a single `select!` races the interrupt signal, the
//! runtime deadline, and the next feed event, so a deadline fires even when
//! the feed is idle. Every exit path goes through draining, which closes the
//! log file and the feed connection exactly once.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::client::{Feed, FeedEvent, Transport};
use crate::error::MonitorError;
use crate::event::CallEvent;
use crate::filter::{FilterConfig, runtime_duration};
use crate::format::EventFormatter;
use crate::log_file::{DEFAULT_LOG_DIR, SessionLog};
use crate::lookup::NameLookup;
use crate::parser::{ParseError, parse_call_event};

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Listening,
    Draining,
    Closed,
}

/// Why a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The runtime bound elapsed.
    Deadline,
    /// The operator asked to stop.
    Interrupted,
}

/// What happened to a single inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Matched and written out.
    Printed,
    /// Didn't pass the filters.
    Filtered,
    /// Not a session stop; the other stages lack link details.
    Ignored,
    /// Same session already printed recently.
    Duplicate,
    /// Session started too long ago.
    Stale,
    /// Couldn't be parsed.
    Malformed,
}

/// Tunables that aren't part of the filter.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Directory for session log files.
    pub log_dir: PathBuf,

    /// Events that started longer ago than this are dropped.
    pub max_event_age: Duration,

    /// A session id printed within this window is not printed again.
    pub dedup_window: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            max_event_age: Duration::from_secs(120),
            dedup_window: Duration::from_secs(30),
        }
    }
}

/// Mutable state of one session, owned by the controller.
#[derive(Debug)]
pub struct SessionState {
    /// Wall-clock start, used to name the log file.
    pub started_at: DateTime<Utc>,

    /// Monotonic start.
    pub started: Instant,

    /// When the runtime bound expires, if there is one.
    pub deadline: Option<Instant>,

    pub phase: Phase,

    log: Option<SessionLog>,
}

impl SessionState {
    /// Capture the start time and open the log file if logging is enabled.
    ///
    /// A log file that can't be opened is reported and the session continues
    /// console-only.
    pub fn start(config: &FilterConfig, settings: &SessionSettings) -> Self {
        let started_at = Utc::now();
        let started = Instant::now();
        let deadline = config.runtime_minutes.and_then(|minutes| {
            let deadline = runtime_duration(minutes).and_then(|d| started.checked_add(d));
            if deadline.is_none() {
                warn!("Runtime of {} minutes is out of range; running unbounded", minutes);
            }
            deadline
        });

        let log = if config.log_enabled {
            match SessionLog::create(&settings.log_dir, started_at) {
                Ok(log) => {
                    info!("Logging to: {}", log.path().display());
                    Some(log)
                }
                Err(e) => {
                    error!(
                        "Failed to open log file in {}: {}; continuing without logging",
                        settings.log_dir.display(),
                        e
                    );
                    None
                }
            }
        } else {
            None
        };

        Self {
            started_at,
            started,
            deadline,
            phase: Phase::Connecting,
            log,
        }
    }

    /// Whether a log file is currently open.
    pub fn is_logging(&self) -> bool {
        self.log.is_some()
    }

    fn enter(&mut self, phase: Phase) {
        debug!("Session phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    fn close_log(&mut self) {
        if let Some(log) = self.log.take() {
            let lines = log.lines();
            match log.close() {
                Ok(path) => info!("Log file closed: {} ({} lines)", path.display(), lines),
                Err(e) => warn!("Error closing log file: {}", e),
            }
        }
    }
}

/// Remembers recently printed session ids.
#[derive(Debug, Default)]
pub struct RecentSessions {
    seen: HashMap<String, DateTime<Utc>>,
}

impl RecentSessions {
    /// Record `session_id` and report whether it should be printed.
    ///
    /// Ids seen within `window` are rejected. Entries older than twice the
    /// window are purged.
    pub fn check(&mut self, session_id: &str, now: DateTime<Utc>, window: Duration) -> bool {
        let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
        let purge_after = window.checked_mul(2).unwrap_or(TimeDelta::MAX);
        self.seen.retain(|_, seen| now - *seen <= purge_after);

        if session_id.is_empty() {
            return true;
        }
        if let Some(seen) = self.seen.get(session_id)
            && now - *seen < window
        {
            return false;
        }
        self.seen.insert(session_id.to_string(), now);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Drives one monitoring session.
pub struct SessionController<L, W> {
    config: FilterConfig,
    settings: SessionSettings,
    formatter: EventFormatter,
    lookup: L,
    console: W,
    recent: RecentSessions,
}

impl<L, W> SessionController<L, W>
where
    L: NameLookup,
    W: Write,
{
    pub fn new(config: FilterConfig, settings: SessionSettings, lookup: L, console: W) -> Self {
        Self {
            formatter: EventFormatter::from_config(&config),
            config,
            settings,
            lookup,
            console,
            recent: RecentSessions::default(),
        }
    }

    /// Run the session to completion.
    ///
    /// Returns the shutdown reason on a deadline or interrupt. Returns an
    /// error if the feed can't be reached, drops beyond recovery, or the
    /// console can't be written. The log file and feed connection are
    /// released before returning in every case.
    pub async fn run<T>(
        mut self,
        transport: &T,
        shutdown: watch::Receiver<bool>,
    ) -> Result<ShutdownReason, MonitorError>
    where
        T: Transport,
    {
        let mut state = SessionState::start(&self.config, &self.settings);
        if let Some(minutes) = self.config.runtime_minutes {
            info!("Will run for {} minute(s)", minutes);
        }

        let shutdown = shutdown_requested(shutdown);
        tokio::pin!(shutdown);
        let deadline = deadline_reached(state.deadline);
        tokio::pin!(deadline);

        let connected = tokio::select! {
            biased;

            _ = &mut shutdown => Err(Ok(ShutdownReason::Interrupted)),
            _ = &mut deadline => Err(Ok(ShutdownReason::Deadline)),
            result = transport.connect() => result.map_err(Err),
        };

        let mut feed = match connected {
            Ok(feed) => feed,
            Err(outcome) => {
                state.enter(Phase::Draining);
                state.close_log();
                state.enter(Phase::Closed);
                return outcome;
            }
        };

        state.enter(Phase::Listening);
        let outcome = loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break Ok(ShutdownReason::Interrupted);
                }

                _ = &mut deadline => {
                    info!("Runtime expired, shutting down");
                    break Ok(ShutdownReason::Deadline);
                }

                event = feed.next_event() => match event {
                    Some(FeedEvent::Message(raw)) => {
                        if let Err(e) = self.handle_message(&raw, Utc::now(), &mut state) {
                            break Err(e);
                        }
                    }
                    Some(FeedEvent::Connected) => {
                        info!("Connected to BrandMeister");
                        eprintln!("\n{}\n{}", self.formatter.header(), self.formatter.separator());
                    }
                    Some(FeedEvent::Disconnected(reason)) => {
                        warn!("Disconnected: {}", reason);
                    }
                    Some(FeedEvent::Error(e)) => {
                        error!("Feed error: {}", e);
                    }
                    None => {
                        break Err(MonitorError::connection("feed closed and could not be recovered"));
                    }
                }
            }
        };

        state.enter(Phase::Draining);
        state.close_log();
        feed.close().await;
        state.enter(Phase::Closed);

        debug!(
            "Session ran for {:.1}s",
            state.started.elapsed().as_secs_f64()
        );
        outcome
    }

    /// Route one raw feed message through the pipeline.
    ///
    /// Only console write failures are errors; everything else is a
    /// [`Disposition`].
    pub fn handle_message(
        &mut self,
        raw: &str,
        now: DateTime<Utc>,
        state: &mut SessionState,
    ) -> Result<Disposition, MonitorError> {
        let event = match parse_call_event(raw, now) {
            Ok(event) => event,
            Err(e @ ParseError::IncompleteRecord(_)) => {
                trace!("Ignoring {}", e);
                return Ok(Disposition::Ignored);
            }
            Err(e) => {
                warn!("Skipping malformed message: {}", e);
                debug!("Malformed message: {}", raw);
                return Ok(Disposition::Malformed);
            }
        };

        if !event.is_session_stop() {
            trace!("Ignoring {}", event);
            return Ok(Disposition::Ignored);
        }

        if !self
            .recent
            .check(&event.session_id, now, self.settings.dedup_window)
        {
            trace!("Duplicate session {}", event.session_id);
            return Ok(Disposition::Duplicate);
        }

        let max_age = TimeDelta::from_std(self.settings.max_event_age).unwrap_or(TimeDelta::MAX);
        if now - event.timestamp > max_age {
            debug!("Stale event: {}", event);
            return Ok(Disposition::Stale);
        }

        let event = self.resolve_callsign(event);

        if !self.config.matches(&event) {
            trace!("Filtered: {}", event);
            return Ok(Disposition::Filtered);
        }

        let line = self.formatter.render(&event, &self.lookup);
        writeln!(self.console, "{}", line)?;
        self.console.flush()?;

        if let Some(log) = state.log.as_mut()
            && let Err(e) = log.write_line(&line)
        {
            error!("Failed to write log file: {}; logging disabled", e);
            state.close_log();
        }

        Ok(Disposition::Printed)
    }

    /// Fill in a missing callsign from the DMR id.
    fn resolve_callsign(&self, event: CallEvent) -> CallEvent {
        if !event.callsign.is_empty() {
            return event;
        }
        match event.source_id.and_then(|id| self.lookup.by_id(id)) {
            Some(subscriber) => {
                let callsign = subscriber.callsign.clone();
                event.with_callsign(callsign)
            }
            None => event,
        }
    }
}

/// Resolves once `true` is sent. Never resolves if the sender goes away.
async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Resolves at `deadline`, or never when there is none.
async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
