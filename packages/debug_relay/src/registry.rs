//! Target id → session mapping, plus the catch-all default session.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::session::{Session, SessionSnapshot};

/// Target id reported for the default session. It never appears as a
/// registry key.
pub const DEFAULT_TARGET_ID: &str = "default";

/// Idle-session eviction. Only active when explicitly configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    /// Sessions untouched for longer than this are dropped.
    pub max_idle: Duration,
    /// How often the sweeper runs.
    pub interval: Duration,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    default_session: Arc<Session>,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let default_session = Arc::new(Session::new(DEFAULT_TARGET_ID, clock.now()));
        Self {
            sessions: RwLock::new(HashMap::new()),
            default_session,
            clock,
        }
    }

    pub fn default_session(&self) -> Arc<Session> {
        self.default_session.clone()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Look up a known target, refreshing its last access time.
    pub async fn get(&self, target_id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.read().await.get(target_id).cloned()?;
        session.touch(self.clock.now());
        Some(session)
    }

    pub async fn contains(&self, target_id: &str) -> bool {
        self.sessions.read().await.contains_key(target_id)
    }

    /// Look up a target, creating it on first contact. Insertion happens
    /// under the write lock, so concurrent first contacts for the same id
    /// all end up with the same session.
    pub async fn get_or_create(&self, target_id: &str) -> Arc<Session> {
        if let Some(session) = self.get(target_id).await {
            return session;
        }

        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(target_id.to_string())
            .or_insert_with(|| {
                info!(target_id, "New debug target");
                Arc::new(Session::new(target_id, now))
            })
            .clone();
        session.touch(now);
        session
    }

    /// Known target ids, sorted. The default session is not included.
    pub async fn target_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn snapshots(&self) -> Vec<SessionSnapshot> {
        let sessions: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
        let mut snapshots = Vec::with_capacity(sessions.len());
        for session in sessions {
            snapshots.push(session.snapshot().await);
        }
        snapshots.sort_by(|a, b| a.target_id.cmp(&b.target_id));
        snapshots
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop every session idle for longer than `max_idle`, closing any long
    /// polls still parked on them. Returns the evicted target ids.
    pub async fn evict_idle(&self, max_idle: Duration) -> Vec<String> {
        let max_idle = chrono::Duration::from_std(max_idle).unwrap_or(chrono::Duration::MAX);
        let now = self.clock.now();

        let evicted: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write().await;
            let stale: Vec<String> = sessions
                .iter()
                .filter(|(_, s)| now - s.last_access() > max_idle)
                .map(|(id, _)| id.clone())
                .collect();
            stale.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        let mut ids = Vec::with_capacity(evicted.len());
        for session in evicted {
            session.retire().await;
            info!(target_id = session.target_id(), "Evicted idle debug target");
            ids.push(session.target_id().to_string());
        }
        ids.sort();
        ids
    }

    /// End every parked long poll, the default session's included. Used at
    /// shutdown so held requests do not block the drain.
    pub async fn close_all(&self) {
        let sessions: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
        for session in sessions {
            session.close_all().await;
        }
        self.default_session.close_all().await;
    }
}

/// Periodically evict idle sessions according to `policy`.
pub fn spawn_sweeper(registry: Arc<SessionRegistry>, policy: EvictionPolicy) -> JoinHandle<()> {
    info!(
        "Idle target eviction enabled (max idle {}s, sweep every {}s)",
        policy.max_idle.as_secs(),
        policy.interval.as_secs()
    );
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(policy.interval);
        loop {
            interval.tick().await;
            let evicted = registry.evict_idle(policy.max_idle).await;
            if !evicted.is_empty() {
                debug!("Sweep evicted {} targets", evicted.len());
            }
        }
    })
}
