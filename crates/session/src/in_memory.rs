//! In-memory session store with last-accessed TTL eviction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lakeclaw_core::event::{DomainEvent, EventBus};
use lakeclaw_core::session::{SessionField, SessionRecord, SessionStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A session store backed by a `HashMap` behind one async `RwLock`.
///
/// All mutation goes through [`SessionStore`] methods, so the locking
/// discipline lives here and nowhere else.
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
    ttl: Option<chrono::Duration>,
    events: Option<Arc<EventBus>>,
}

impl InMemorySessionStore {
    /// A store that never evicts.
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl: None,
            events: None,
        }
    }

    /// Drop sessions idle for longer than `ttl`. A zero TTL disables eviction.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = if ttl.is_zero() {
            None
        } else {
            chrono::Duration::from_std(ttl).ok()
        };
        self
    }

    /// Publish clear/eviction events on this bus.
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Number of live sessions (expired-but-unswept ones included).
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Remove every session idle past the TTL. Returns how many were dropped.
    pub async fn evict_expired(&self) -> usize {
        self.evict_expired_at(Utc::now()).await
    }

    async fn evict_expired_at(&self, now: DateTime<Utc>) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };

        let evicted = {
            let mut sessions = self.sessions.write().await;
            let before = sessions.len();
            sessions.retain(|_, rec| now - rec.last_accessed <= ttl);
            before - sessions.len()
        };

        if evicted > 0 {
            info!(count = evicted, "Evicted idle sessions");
            if let Some(events) = &self.events {
                events.publish(DomainEvent::SessionsEvicted {
                    count: evicted,
                    timestamp: now,
                });
            }
        }
        evicted
    }

    /// Run [`evict_expired`](Self::evict_expired) every `interval` until
    /// `cancel` fires.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Session sweeper stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        self.evict_expired().await;
                    }
                }
            }
        })
    }

    fn is_expired(&self, record: &SessionRecord, now: DateTime<Utc>) -> bool {
        self.ttl.is_some_and(|ttl| now - record.last_accessed > ttl)
    }

    /// The live record for `session_id`, replacing a missing or expired one
    /// with a fresh default. Caller holds the write lock.
    fn live_entry<'a>(
        &self,
        sessions: &'a mut HashMap<String, SessionRecord>,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> &'a mut SessionRecord {
        let expired = sessions
            .get(session_id)
            .is_some_and(|rec| self.is_expired(rec, now));
        if expired {
            debug!(session_id, "Session expired, starting fresh");
            sessions.remove(session_id);
        }
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionRecord::new(session_id))
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> SessionRecord {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let record = self.live_entry(&mut sessions, session_id, now);
        record.last_accessed = now;
        record.clone()
    }

    async fn update(&self, session_id: &str, field: SessionField, value: String) {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let record = self.live_entry(&mut sessions, session_id, now);
        debug!(session_id, field = %field, value = %value, "Session field updated");
        record.set_field(field, value);
        record.last_accessed = now;
    }

    async fn unset(&self, session_id: &str, field: SessionField) {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let record = self.live_entry(&mut sessions, session_id, now);
        debug!(session_id, field = %field, "Session field unset");
        record.unset_field(field);
        record.last_accessed = now;
    }

    async fn clear(&self, session_id: &str) {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            debug!(session_id, "Session cleared");
        }
        if let Some(events) = &self.events {
            events.publish(DomainEvent::SessionCleared {
                session_id: session_id.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    async fn snapshot(&self, session_id: &str) -> SessionRecord {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            if let Some(record) = sessions.get(session_id) {
                if !self.is_expired(record, now) {
                    return record.clone();
                }
            }
        }
        let mut sessions = self.sessions.write().await;
        self.live_entry(&mut sessions, session_id, now).clone()
    }
}
