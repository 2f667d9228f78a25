//! User-visible status messages.
//!
//! Fire-and-forget: callers never wait on or inspect a notification after
//! raising it. [`LogNotifier`] forwards to the `log` facade; the
//! [`NotificationBoard`] additionally keeps a short, auto-dismissing queue
//! that a dashboard can render.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for transient user-facing messages.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: Level, message: &str);
}

fn log_notification(level: Level, message: &str) {
    match level {
        Level::Info | Level::Success => log::info!("{message}"),
        Level::Warning => log::warn!("{message}"),
        Level::Error => log::error!("{message}"),
    }
}

/// Forwards every notification to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, level: Level, message: &str) {
        log_notification(level, message);
    }
}

// ---------------------------------------------------------------------------
// NotificationBoard
// ---------------------------------------------------------------------------

pub const DEFAULT_TTL: Duration = Duration::from_secs(4);
pub const DEFAULT_CAPACITY: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub level: Level,
    pub message: String,
    pub raised_at: Instant,
}

/// Bounded queue of auto-dismissing notifications.
#[derive(Debug)]
pub struct NotificationBoard {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<VecDeque<Notification>>,
}

impl Default for NotificationBoard {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }
}

impl NotificationBoard {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, VecDeque<Notification>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push_at(&self, level: Level, message: &str, now: Instant) {
        let mut entries = self.entries();
        entries.push_back(Notification {
            level,
            message: message.to_string(),
            raised_at: now,
        });
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Live notifications, newest last. Expired entries are dropped.
    pub fn active(&self) -> Vec<Notification> {
        self.active_at(Instant::now())
    }

    pub fn active_at(&self, now: Instant) -> Vec<Notification> {
        let mut entries = self.entries();
        entries.retain(|n| now.saturating_duration_since(n.raised_at) < self.ttl);
        entries.iter().cloned().collect()
    }

    /// Most recent live notification.
    pub fn latest(&self) -> Option<Notification> {
        self.active().pop()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }
}

impl Notifier for NotificationBoard {
    fn notify(&self, level: Level, message: &str) {
        log_notification(level, message);
        self.push_at(level, message, Instant::now());
    }
}
