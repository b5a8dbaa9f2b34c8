//! Call event filtering for selective output.
//!
//! A [`FilterConfig`] is built once at startup from the command line and
//! stays fixed for the session. Every filter dimension that is set must
//! match (AND logic); unset dimensions match anything.

use regex::Regex;
use std::time::Duration;

use crate::error::MonitorError;
use crate::event::CallEvent;

/// Session-scoped filter and display settings.
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    /// Searched for anywhere in the callsign, exactly as given (no case folding).
    pub callsign_pattern: Option<Regex>,

    /// Exact destination talkgroup.
    pub talkgroup: Option<u32>,

    /// Exact BrandMeister master server id.
    pub peer_id: Option<u32>,

    /// Append the operator's first name to each line. Display only.
    pub show_name: bool,

    /// Write matched lines to a session log file.
    pub log_enabled: bool,

    /// Stop the session after this many minutes.
    pub runtime_minutes: Option<f64>,
}

impl FilterConfig {
    /// Compile and set the callsign pattern.
    ///
    /// Returns a configuration error if the pattern is not a valid regex.
    pub fn with_callsign_pattern(mut self, pattern: &str) -> Result<Self, MonitorError> {
        let regex = Regex::new(pattern).map_err(|e| {
            MonitorError::configuration(format!("invalid callsign pattern '{}': {}", pattern, e))
        })?;
        self.callsign_pattern = Some(regex);
        Ok(self)
    }

    /// Set the talkgroup filter.
    pub fn with_talkgroup(mut self, talkgroup: u32) -> Self {
        self.talkgroup = Some(talkgroup);
        self
    }

    /// Set the master server filter.
    pub fn with_peer_id(mut self, peer_id: u32) -> Self {
        self.peer_id = Some(peer_id);
        self
    }

    /// Enable the first name column.
    pub fn with_names(mut self, show_name: bool) -> Self {
        self.show_name = show_name;
        self
    }

    /// Enable the session log file.
    pub fn with_logging(mut self, log_enabled: bool) -> Self {
        self.log_enabled = log_enabled;
        self
    }

    /// Bound the session runtime.
    ///
    /// Returns a configuration error unless `minutes` is positive and finite.
    pub fn with_runtime_minutes(mut self, minutes: f64) -> Result<Self, MonitorError> {
        validate_runtime(minutes)?;
        self.runtime_minutes = Some(minutes);
        Ok(self)
    }

    /// Check if an event passes every configured filter.
    pub fn matches(&self, event: &CallEvent) -> bool {
        // Regex search, not a full match
        if let Some(ref pattern) = self.callsign_pattern
            && !pattern.is_match(&event.callsign)
        {
            return false;
        }

        if let Some(talkgroup) = self.talkgroup
            && event.talkgroup != talkgroup
        {
            return false;
        }

        if let Some(peer_id) = self.peer_id
            && event.peer_id != peer_id
        {
            return false;
        }

        true
    }

    /// Whether any filter dimension is set.
    pub fn is_filtering(&self) -> bool {
        self.callsign_pattern.is_some() || self.talkgroup.is_some() || self.peer_id.is_some()
    }

    /// Human-readable summary of the active filters, e.g. `Callsign: ^OH, TG: 244`.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(ref pattern) = self.callsign_pattern {
            parts.push(format!("Callsign: {}", pattern.as_str()));
        }
        if let Some(talkgroup) = self.talkgroup {
            parts.push(format!("TG: {}", talkgroup));
        }
        if let Some(peer_id) = self.peer_id {
            parts.push(format!("Peer: {}", peer_id));
        }
        parts.join(", ")
    }
}

/// Check if an event passes the filters in `config`.
pub fn matches(event: &CallEvent, config: &FilterConfig) -> bool {
    config.matches(event)
}

/// Longest accepted runtime: one year.
pub const MAX_RUNTIME_MINUTES: f64 = 365.0 * 24.0 * 60.0;

/// Validate a runtime bound in minutes.
pub fn validate_runtime(minutes: f64) -> Result<(), MonitorError> {
    if !minutes.is_finite() || minutes <= 0.0 {
        return Err(MonitorError::configuration(format!(
            "runtime must be a positive number of minutes, got {}",
            minutes
        )));
    }
    if minutes > MAX_RUNTIME_MINUTES {
        return Err(MonitorError::configuration(format!(
            "runtime must be at most {} minutes, got {}",
            MAX_RUNTIME_MINUTES, minutes
        )));
    }
    Ok(())
}

/// Convert a runtime in minutes to a duration.
///
/// Returns `None` for values that aren't a representable positive duration.
pub fn runtime_duration(minutes: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(minutes * 60.0)
        .ok()
        .filter(|d| !d.is_zero())
}
