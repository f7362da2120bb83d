use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{DomainError, Segment, Session};

/// Port for the session/segment record store.
///
/// The store is the single source of truth for durable state: a segment's
/// audio artifact may only be deleted after the corresponding record write
/// has succeeded. Implementations report `DomainError::Io` for storage
/// failures and `DomainError::Constraint` for id collisions or missing
/// owners; the orchestrator surfaces these distinctly from transcription
/// failures.
#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// Insert a new session record.
    async fn insert_session(&self, session: &Session) -> Result<(), DomainError>;

    /// Insert a new segment record under an existing session.
    async fn insert_segment(&self, segment: &Segment) -> Result<(), DomainError>;

    /// Save the current state of an existing segment record.
    async fn update_segment(&self, segment: &Segment) -> Result<(), DomainError>;

    /// Fetch all session records.
    async fn fetch_sessions(&self) -> Result<Vec<Session>, DomainError>;

    /// Fetch one session record.
    async fn fetch_session(&self, session_id: Uuid) -> Result<Option<Session>, DomainError>;

    /// Fetch the segment records belonging to one session.
    async fn fetch_segments(&self, session_id: Uuid) -> Result<Vec<Segment>, DomainError>;

    /// Fetch every segment record across all sessions.
    async fn fetch_all_segments(&self) -> Result<Vec<Segment>, DomainError>;

    /// Delete a session and cascade to its segments.
    ///
    /// Returns the removed segments so the caller can reclaim their audio
    /// artifacts.
    async fn remove_session(&self, session_id: Uuid) -> Result<Vec<Segment>, DomainError>;
}
