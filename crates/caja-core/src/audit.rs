use serde::Serialize;
use time::OffsetDateTime;

use crate::models::Actor;

/// One append-only audit record emitted after a committed state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditFact {
    pub actor: Actor,
    pub action: &'static str,
    pub entity_type: &'static str,
    pub entity_id: String,
    pub detail: String,
    pub timestamp: OffsetDateTime,
}

pub trait AuditSink: Send + Sync {
    fn record(&self, fact: AuditFact);
}
