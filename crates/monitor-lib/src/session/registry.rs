//! Registry of independent per-device sessions

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use super::{MonitoringSession, SessionSummary};
use crate::error::SessionError;

/// Sessions keyed by device ID. Sessions share no mutable state.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, MonitoringSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, returning any session it replaced. A replaced
    /// session is disconnected, like one that was removed.
    pub fn insert(&self, session: MonitoringSession) -> Option<MonitoringSession> {
        debug!(device = %session.device_id(), "Registering session");
        let incoming = Arc::clone(&session.inner);
        let replaced = self
            .sessions
            .insert(session.device_id().to_string(), session)?;
        if !Arc::ptr_eq(&replaced.inner, &incoming) {
            let _ = replaced.disconnect();
            debug!(device = %replaced.device_id(), "Replaced session");
        }
        Some(replaced)
    }

    pub fn get(&self, device_id: &str) -> Option<MonitoringSession> {
        self.sessions.get(device_id).map(|r| r.value().clone())
    }

    /// Remove a session, disconnecting it first
    pub fn remove(&self, device_id: &str) -> Option<MonitoringSession> {
        let (_, session) = self.sessions.remove(device_id)?;
        let _ = session.disconnect();
        debug!(device = %device_id, "Unregistered session");
        Some(session)
    }

    /// Device IDs in sorted order
    pub fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Summaries sorted by device ID
    pub fn summaries(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> =
            self.sessions.iter().map(|r| r.value().summary()).collect();
        summaries.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        summaries
    }

    /// Connect every disconnected session; returns how many changed state
    pub fn connect_all(&self) -> Result<usize, SessionError> {
        let mut connected = 0;
        for session in self.sessions() {
            match session.connect() {
                Ok(()) => connected += 1,
                Err(e) if e.is_benign() => {}
                Err(e) => return Err(e),
            }
        }
        info!(connected, "Connected sessions");
        Ok(connected)
    }

    /// Disconnect every connected session; returns how many changed state
    pub fn disconnect_all(&self) -> usize {
        let disconnected = self
            .sessions()
            .iter()
            .filter(|session| session.disconnect().is_ok())
            .count();
        info!(disconnected, "Disconnected sessions");
        disconnected
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Clone handles out so no map shard lock is held during transitions
    fn sessions(&self) -> Vec<MonitoringSession> {
        self.sessions.iter().map(|r| r.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricId;
    use crate::session::SessionStatus;
    use crate::source::SimulatedSource;

    fn session(id: &str) -> MonitoringSession {
        MonitoringSession::builder(id)
            .source(Arc::new(SimulatedSource::seeded(1)))
            .track(MetricId::HeartRate)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = SessionRegistry::new();
        registry.insert(session("b"));
        registry.insert(session("a"));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.device_ids(), vec!["a".to_string(), "b".to_string()]);
        assert!(registry.get("a").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_connect_and_disconnect_all() {
        let registry = SessionRegistry::new();
        registry.insert(session("a"));
        registry.insert(session("b"));

        assert_eq!(registry.connect_all().unwrap(), 2);
        // already connected sessions are skipped
        assert_eq!(registry.connect_all().unwrap(), 0);
        assert!(registry
            .summaries()
            .iter()
            .all(|s| s.status == SessionStatus::Connected));

        assert_eq!(registry.disconnect_all(), 2);
        assert_eq!(registry.disconnect_all(), 0);
    }

    #[tokio::test]
    async fn test_replacing_a_session_disconnects_it() {
        let registry = SessionRegistry::new();
        let original = session("a");
        registry.insert(original.clone());
        registry.connect_all().unwrap();

        let replaced = registry.insert(session("a")).unwrap();
        assert_eq!(replaced.status(), SessionStatus::Disconnected);
        assert_eq!(original.status(), SessionStatus::Disconnected);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("a").unwrap().status(),
            SessionStatus::Disconnected
        );
        assert_eq!(registry.connect_all().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reinserting_same_session_keeps_it_connected() {
        let registry = SessionRegistry::new();
        let original = session("a");
        registry.insert(original.clone());
        registry.connect_all().unwrap();

        assert!(registry.insert(original.clone()).is_some());
        assert_eq!(original.status(), SessionStatus::Connected);
    }

    #[tokio::test]
    async fn test_remove_disconnects() {
        let registry = SessionRegistry::new();
        registry.insert(session("a"));
        registry.connect_all().unwrap();

        let removed = registry.remove("a").unwrap();
        assert_eq!(removed.status(), SessionStatus::Disconnected);
        assert!(registry.is_empty());
        assert!(registry.remove("a").is_none());
    }
}
