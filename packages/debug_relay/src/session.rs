use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::{Mutex, MutexGuard};

use crate::dispatcher::Dispatcher;

/// Which peer a dispatcher serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peer {
    /// Holds desktop→mobile commands and the mobile runtime's long poll.
    Mobile,
    /// Holds mobile→desktop events and the debugger UI's long poll.
    Desktop,
}

/// The two mailboxes of one target.
#[derive(Debug, Default)]
pub struct Channels {
    pub mobile: Dispatcher,
    pub desktop: Dispatcher,
    retired: bool,
}

impl Channels {
    /// Set once the session has been evicted from the registry. Nothing
    /// reachable can deliver to a retired session.
    pub fn is_retired(&self) -> bool {
        self.retired
    }

    pub fn for_peer(&mut self, peer: Peer) -> &mut Dispatcher {
        match peer {
            Peer::Mobile => &mut self.mobile,
            Peer::Desktop => &mut self.desktop,
        }
    }

    /// Start a new mobile generation: close the old mobile poll and replace
    /// the mobile dispatcher outright, dropping its backlog with it.
    pub fn replace_mobile(&mut self) {
        self.mobile.end();
        self.mobile = Dispatcher::new();
    }
}

/// Point-in-time view of a session, for listings and tests.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub target_id: String,
    pub last_access: DateTime<Utc>,
    pub mobile_queued: usize,
    pub mobile_waiting: bool,
    pub desktop_queued: usize,
    pub desktop_waiting: bool,
}

#[derive(Debug)]
pub struct Session {
    target_id: String,
    channels: Mutex<Channels>,
    last_access_ms: AtomicI64,
}

impl Session {
    pub fn new(target_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            target_id: target_id.into(),
            channels: Mutex::new(Channels::default()),
            last_access_ms: AtomicI64::new(now.timestamp_millis()),
        }
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Lock both dispatchers. Everything one protocol operation does happens
    /// under a single guard.
    pub async fn channels(&self) -> MutexGuard<'_, Channels> {
        self.channels.lock().await
    }

    pub fn touch(&self, now: DateTime<Utc>) {
        self.last_access_ms
            .fetch_max(now.timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_access(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_access_ms.load(Ordering::Relaxed))
            .unwrap_or_default()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let channels = self.channels().await;
        SessionSnapshot {
            target_id: self.target_id.clone(),
            last_access: self.last_access(),
            mobile_queued: channels.mobile.queue_len(),
            mobile_waiting: channels.mobile.has_waiting_client(),
            desktop_queued: channels.desktop.queue_len(),
            desktop_waiting: channels.desktop.has_waiting_client(),
        }
    }

    /// Force-close any poll still parked on either side.
    pub async fn close_all(&self) {
        let mut channels = self.channels().await;
        channels.mobile.end();
        channels.desktop.end();
    }

    /// Close both sides and refuse further operations. Requests that resolved
    /// this session before it was evicted must resolve again.
    pub async fn retire(&self) {
        let mut channels = self.channels().await;
        channels.retired = true;
        channels.mobile.end();
        channels.desktop.end();
    }
}
