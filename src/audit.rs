use std::sync::Mutex;

use caja_core::{AuditFact, AuditSink};

/// Writes every fact to the `audit` tracing target.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, fact: AuditFact) {
        tracing::info!(
            target: "audit",
            actor_id = %fact.actor.id,
            actor = %fact.actor.name,
            action = fact.action,
            entity_type = fact.entity_type,
            entity_id = %fact.entity_id,
            timestamp = %fact.timestamp,
            "{}",
            fact.detail
        );
        metrics::increment_counter!("caja_audit_facts_total", "action" => fact.action);
    }
}

/// Keeps facts in memory. Used by tests and by callers that forward facts elsewhere.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    facts: Mutex<Vec<AuditFact>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn facts(&self) -> Vec<AuditFact> {
        match self.facts.lock() {
            Ok(facts) => facts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn actions(&self) -> Vec<&'static str> {
        self.facts().iter().map(|f| f.action).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, fact: AuditFact) {
        match self.facts.lock() {
            Ok(mut facts) => facts.push(fact),
            Err(poisoned) => poisoned.into_inner().push(fact),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caja_core::Actor;
    use time::OffsetDateTime;

    #[test]
    fn memory_sink_keeps_order() {
        let sink = MemoryAuditSink::new();
        for action in ["register.open", "receipt.create"] {
            sink.record(AuditFact {
                actor: Actor::new("1", "Ana"),
                action,
                entity_type: "register",
                entity_id: "2024-03-01".to_string(),
                detail: String::new(),
                timestamp: OffsetDateTime::UNIX_EPOCH,
            });
        }
        assert_eq!(sink.actions(), vec!["register.open", "receipt.create"]);
    }
}
