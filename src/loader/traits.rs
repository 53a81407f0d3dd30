use crate::model::{DiagnosticSession, SessionError};

/// Supplies one fully collected diagnostic session.
#[async_trait::async_trait]
pub trait SessionSource: Send + Sync {
    async fn load(&self) -> Result<DiagnosticSession, SessionError>;
}
