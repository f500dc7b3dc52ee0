//! External collaborators the pipeline consumes, plus simple implementations.

use crate::error::VoltError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Reports whether the network link is up.
pub trait NetworkStatus: Send + Sync {
    fn is_connected(&self) -> bool;
}

/// Source of the API key for the remote services.
pub trait CredentialStore: Send + Sync {
    fn api_key(&self) -> Option<String>;
}

/// User-facing one-line status display.
pub trait StatusSink: Send + Sync {
    fn show(&self, text: &str);
}

/// Pipeline lifecycle points reported to the [`ActivityNotifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Activity {
    /// A trigger was accepted and a run started.
    Started,
    /// The run completed and the pipeline is idle again.
    Idle,
    /// The run failed.
    Failed,
}

/// Receives lifecycle notifications (wakes a display, resets an idle timer, ...).
pub trait ActivityNotifier: Send + Sync {
    fn notify(&self, activity: Activity);
}

/// Produces the message shown when a run fails.
pub trait FallbackResponder: Send + Sync {
    fn respond(&self, failure: &VoltError) -> String;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Network status that can be toggled at runtime.
#[derive(Debug)]
pub struct StaticNetwork {
    connected: AtomicBool,
}

impl StaticNetwork {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl NetworkStatus for StaticNetwork {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// In-memory API key, replaceable at runtime.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    key: Mutex<Option<String>>,
}

impl StaticCredentials {
    pub fn new(key: Option<String>) -> Self {
        Self {
            key: Mutex::new(key),
        }
    }

    pub fn set_key(&self, key: Option<String>) {
        *lock(&self.key) = key;
    }
}

impl CredentialStore for StaticCredentials {
    fn api_key(&self) -> Option<String> {
        lock(&self.key).clone()
    }
}

/// Status sink that logs through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn show(&self, text: &str) {
        tracing::info!(status = %text, "status");
    }
}

/// Status sink that keeps every message, for tests.
#[derive(Debug, Default)]
pub struct RecordingStatusSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }

    pub fn last(&self) -> Option<String> {
        lock(&self.messages).last().cloned()
    }
}

impl StatusSink for RecordingStatusSink {
    fn show(&self, text: &str) {
        lock(&self.messages).push(text.to_string());
    }
}

/// Notifier that counts each activity.
#[derive(Debug, Default)]
pub struct CountingNotifier {
    counts: Mutex<HashMap<Activity, u32>>,
}

impl CountingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, activity: Activity) -> u32 {
        lock(&self.counts).get(&activity).copied().unwrap_or(0)
    }
}

impl ActivityNotifier for CountingNotifier {
    fn notify(&self, activity: Activity) {
        *lock(&self.counts).entry(activity).or_insert(0) += 1;
    }
}

/// Notifier that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl ActivityNotifier for NoopNotifier {
    fn notify(&self, _activity: Activity) {}
}
