use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{DomainError, Segment, Session};
use crate::ports::SegmentStore;

/// In-memory segment store.
///
/// Reference adapter for the record store port: hosts with a real database
/// bring their own implementation, tests and single-process embedders use
/// this one. Enforces the same constraints a relational store would —
/// unique ids and an existing owner for every segment.
#[derive(Default)]
pub struct MemorySegmentStore {
    inner: RwLock<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    sessions: HashMap<Uuid, Session>,
    segments: HashMap<Uuid, Segment>,
}

impl MemorySegmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SegmentStore for MemorySegmentStore {
    async fn insert_session(&self, session: &Session) -> Result<(), DomainError> {
        let mut inner = self.inner.write();
        if inner.sessions.contains_key(&session.id) {
            return Err(DomainError::Constraint(format!(
                "session {} already exists",
                session.id
            )));
        }
        inner.sessions.insert(session.id, session.clone());
        debug!(session_id = %session.id, "Session record inserted");
        Ok(())
    }

    async fn insert_segment(&self, segment: &Segment) -> Result<(), DomainError> {
        let mut inner = self.inner.write();
        if !inner.sessions.contains_key(&segment.session_id) {
            return Err(DomainError::Constraint(format!(
                "segment {} references unknown session {}",
                segment.id, segment.session_id
            )));
        }
        if inner.segments.contains_key(&segment.id) {
            return Err(DomainError::Constraint(format!(
                "segment {} already exists",
                segment.id
            )));
        }
        inner.segments.insert(segment.id, segment.clone());
        debug!(segment_id = %segment.id, "Segment record inserted");
        Ok(())
    }

    async fn update_segment(&self, segment: &Segment) -> Result<(), DomainError> {
        let mut inner = self.inner.write();
        match inner.segments.get_mut(&segment.id) {
            Some(existing) => {
                *existing = segment.clone();
                Ok(())
            }
            None => Err(DomainError::Constraint(format!(
                "segment {} does not exist",
                segment.id
            ))),
        }
    }

    async fn fetch_sessions(&self) -> Result<Vec<Session>, DomainError> {
        let inner = self.inner.read();
        let mut sessions: Vec<Session> = inner.sessions.values().cloned().collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    async fn fetch_session(&self, session_id: Uuid) -> Result<Option<Session>, DomainError> {
        Ok(self.inner.read().sessions.get(&session_id).cloned())
    }

    async fn fetch_segments(&self, session_id: Uuid) -> Result<Vec<Segment>, DomainError> {
        let inner = self.inner.read();
        let mut segments: Vec<Segment> = inner
            .segments
            .values()
            .filter(|s| s.session_id == session_id)
            .cloned()
            .collect();
        segments.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        Ok(segments)
    }

    async fn fetch_all_segments(&self) -> Result<Vec<Segment>, DomainError> {
        let inner = self.inner.read();
        let mut segments: Vec<Segment> = inner.segments.values().cloned().collect();
        segments.sort_by_key(|s| s.created_at);
        Ok(segments)
    }

    async fn remove_session(&self, session_id: Uuid) -> Result<Vec<Segment>, DomainError> {
        let mut inner = self.inner.write();
        if inner.sessions.remove(&session_id).is_none() {
            return Err(DomainError::Constraint(format!(
                "session {} does not exist",
                session_id
            )));
        }

        let removed_ids: Vec<Uuid> = inner
            .segments
            .values()
            .filter(|s| s.session_id == session_id)
            .map(|s| s.id)
            .collect();
        let removed = removed_ids
            .iter()
            .filter_map(|id| inner.segments.remove(id))
            .collect::<Vec<_>>();

        debug!(
            session_id = %session_id,
            segments = removed.len(),
            "Session record removed with cascade"
        );
        Ok(removed)
    }
}
