//! Transient status messages.

use std::time::{Duration, Instant};

/// How long each kind of message stays visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTimings {
    /// Lifetime of success and info messages.
    pub success: Duration,
    /// Lifetime of error messages.
    pub error: Duration,
}

impl Default for StatusTimings {
    fn default() -> Self {
        Self {
            success: Duration::from_secs(4),
            error: Duration::from_secs(6),
        }
    }
}

/// Severity of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// Neutral information.
    Info,
    /// An operation completed.
    Success,
    /// An operation failed.
    Error,
}

/// A message shown in the status area until it expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    /// Severity, used for styling.
    pub kind: StatusKind,
    /// Text shown to the user.
    pub text: String,
    expires_at: Instant,
}

/// Status area collaborator of a page. Holds at most one message.
#[derive(Debug, Clone)]
pub struct StatusArea {
    timings: StatusTimings,
    current: Option<StatusMessage>,
}

impl Default for StatusArea {
    fn default() -> Self {
        Self::new(StatusTimings::default())
    }
}

impl StatusArea {
    #[must_use]
    pub const fn new(timings: StatusTimings) -> Self {
        Self {
            timings,
            current: None,
        }
    }

    pub fn info(&mut self, text: impl Into<String>) {
        self.show_at(StatusKind::Info, text, Instant::now());
    }

    pub fn success(&mut self, text: impl Into<String>) {
        self.show_at(StatusKind::Success, text, Instant::now());
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.show_at(StatusKind::Error, text, Instant::now());
    }

    /// Replaces the current message, timing it from `now`.
    pub fn show_at(&mut self, kind: StatusKind, text: impl Into<String>, now: Instant) {
        let lifetime = match kind {
            StatusKind::Error => self.timings.error,
            StatusKind::Info | StatusKind::Success => self.timings.success,
        };
        self.current = Some(StatusMessage {
            kind,
            text: text.into(),
            expires_at: now + lifetime,
        });
    }

    /// Drops the message once it has expired.
    pub fn tick(&mut self, now: Instant) {
        if self.current.as_ref().is_some_and(|m| now >= m.expires_at) {
            self.current = None;
        }
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    #[must_use]
    pub const fn current(&self) -> Option<&StatusMessage> {
        self.current.as_ref()
    }
}
