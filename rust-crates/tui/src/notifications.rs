use std::{
    collections::VecDeque,
    time::{
        Duration,
        Instant,
    },
};

pub const DEDUP_WINDOW: Duration = Duration::from_secs(3);
const MAX_NOTIFICATIONS: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
    pub at: Instant,
}

/// Recent user-facing messages, newest last. Repeats of a message inside the
/// dedup window are dropped.
#[derive(Debug)]
pub struct Notifier {
    window: Duration,
    entries: VecDeque<Notification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEDUP_WINDOW)
    }
}

impl Notifier {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: VecDeque::new(),
        }
    }

    /// Returns false when the message was suppressed as a duplicate.
    pub fn push(&mut self, severity: Severity, message: impl Into<String>, now: Instant) -> bool {
        let message = message.into();
        let duplicate = self.entries.iter().rev().any(|entry| {
            entry.message == message && now.saturating_duration_since(entry.at) < self.window
        });
        if duplicate {
            return false;
        }
        self.entries.push_back(Notification {
            severity,
            message,
            at: now,
        });
        while self.entries.len() > MAX_NOTIFICATIONS {
            self.entries.pop_front();
        }
        true
    }

    pub fn latest(&self) -> Option<&Notification> {
        self.entries.back()
    }

    pub fn recent(&self, count: usize) -> impl Iterator<Item = &Notification> {
        self.entries.iter().rev().take(count)
    }
}
