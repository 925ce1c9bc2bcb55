//! Hash-chained event log (spec.md §4.4). No teacher analogue — built
//! directly from the spec's algorithm, guarded by the single mutex spec.md
//! §5 requires ("Events: strictly serialised by a single mutex guarding
//! (last_sequence, last_hash)").

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{ActorType, Event, EventCheckpoint, EventKind};
use crate::ports::EventRepository;

struct ChainCursor {
    last_sequence_num: i64,
    last_hash: Option<String>,
}

pub struct EventChain {
    repo: Arc<dyn EventRepository>,
    cursor: Mutex<ChainCursor>,
}

#[derive(Debug, thiserror::Error)]
pub enum EventChainError {
    #[error(transparent)]
    Repository(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Builds the canonical string hashed for an event — every field but the
/// hash itself, in a fixed order so the same inputs always serialise the
/// same way regardless of map iteration order.
fn canonical_payload(
    sequence_num: i64,
    prev_hash: &Option<String>,
    actor_id: &Option<Uuid>,
    actor_type: ActorType,
    kind: EventKind,
    resource_type: &str,
    resource_id: &Option<String>,
    organization_id: &Option<Uuid>,
    payload: &HashMap<String, Value>,
    occurred_at: DateTime<Utc>,
) -> String {
    let mut payload_keys: Vec<&String> = payload.keys().collect();
    payload_keys.sort();
    let payload_str: String = payload_keys
        .into_iter()
        .map(|k| format!("{k}={}", payload.get(k).map(|v| v.to_string()).unwrap_or_default()))
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "{}|{}|{}|{:?}|{:?}|{}|{}|{}|{}|{}",
        sequence_num,
        prev_hash.as_deref().unwrap_or(""),
        actor_id.map(|id| id.to_string()).unwrap_or_default(),
        actor_type,
        kind,
        resource_type,
        resource_id.as_deref().unwrap_or(""),
        organization_id.map(|id| id.to_string()).unwrap_or_default(),
        payload_str,
        occurred_at.to_rfc3339(),
    )
}

fn compute_hash(payload: &str) -> String {
    hex::encode(Sha256::digest(payload.as_bytes()))
}

impl EventChain {
    pub async fn new(repo: Arc<dyn EventRepository>) -> Result<Self, EventChainError> {
        let last = repo.last().await?;
        let cursor = match last {
            Some(event) => ChainCursor {
                last_sequence_num: event.sequence_num,
                last_hash: Some(event.hash),
            },
            None => ChainCursor {
                last_sequence_num: 0,
                last_hash: None,
            },
        };
        Ok(Self {
            repo,
            cursor: Mutex::new(cursor),
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_event(
        &self,
        actor_id: Option<Uuid>,
        actor_type: ActorType,
        kind: EventKind,
        resource_type: String,
        resource_id: Option<String>,
        organization_id: Option<Uuid>,
        payload: HashMap<String, Value>,
    ) -> Result<Event, EventChainError> {
        let mut cursor = self.cursor.lock().await;
        let sequence_num = cursor.last_sequence_num + 1;
        let prev_hash = cursor.last_hash.clone();
        let occurred_at = Utc::now();

        let canonical = canonical_payload(
            sequence_num,
            &prev_hash,
            &actor_id,
            actor_type,
            kind,
            &resource_type,
            &resource_id,
            &organization_id,
            &payload,
            occurred_at,
        );
        let hash = compute_hash(&canonical);

        let event = Event {
            id: Uuid::new_v4(),
            sequence_num,
            prev_hash,
            hash: hash.clone(),
            actor_id,
            actor_type,
            kind,
            resource_type,
            resource_id,
            organization_id,
            payload,
            occurred_at,
        };

        let persisted = self.repo.append(event).await?;
        cursor.last_sequence_num = sequence_num;
        cursor.last_hash = Some(hash);
        Ok(persisted)
    }

    /// Loads `[start, end]`, checks for sequence gaps, verifies each
    /// `prev_hash` links to the previous `hash`, and recomputes each hash.
    pub async fn verify_range(&self, start: i64, end: i64) -> Result<VerificationReport, EventChainError> {
        let events = self.repo.range(start, end).await?;
        let mut errors = Vec::new();
        let mut expected_seq = start;
        let mut expected_prev_hash: Option<String> = None;

        for event in &events {
            if event.sequence_num != expected_seq {
                errors.push(format!(
                    "sequence gap: expected {expected_seq}, found {}",
                    event.sequence_num
                ));
                expected_seq = event.sequence_num;
            }
            if event.sequence_num > 1 && event.prev_hash != expected_prev_hash {
                errors.push(format!(
                    "prev_hash mismatch at sequence {}: expected {:?}, found {:?}",
                    event.sequence_num, expected_prev_hash, event.prev_hash
                ));
            }

            let canonical = canonical_payload(
                event.sequence_num,
                &event.prev_hash,
                &event.actor_id,
                event.actor_type,
                event.kind,
                &event.resource_type,
                &event.resource_id,
                &event.organization_id,
                &event.payload,
                event.occurred_at,
            );
            let recomputed = compute_hash(&canonical);
            if recomputed != event.hash {
                errors.push(format!(
                    "hash mismatch at sequence {}: stored payload does not recompute to the stored hash",
                    event.sequence_num
                ));
            }

            expected_seq += 1;
            expected_prev_hash = Some(event.hash.clone());
        }

        Ok(VerificationReport {
            valid: errors.is_empty(),
            errors,
        })
    }

    pub async fn checkpoint(&self) -> Result<Option<EventCheckpoint>, EventChainError> {
        let cursor = self.cursor.lock().await;
        let Some(last_hash) = cursor.last_hash.clone() else {
            return Ok(None);
        };
        let last_sequence_num = cursor.last_sequence_num;
        drop(cursor);

        let events = self.repo.range(1, last_sequence_num).await?;
        let last_event_id = events
            .last()
            .map(|e| e.id)
            .ok_or_else(|| EventChainError::Repository(anyhow::anyhow!("checkpoint requested but no events persisted")))?;

        let concatenated: String = events.iter().map(|e| e.hash.as_str()).collect();
        let digest = compute_hash(&concatenated);

        Ok(Some(EventCheckpoint {
            last_event_id,
            last_sequence_num,
            last_hash,
            digest,
            total_count: events.len() as i64,
            created_at: Utc::now(),
        }))
    }

    /// Streams events up to `occurred_before`, optionally filtered by
    /// resource_type, to `handler` in batches of 100. Continues past
    /// individual handler errors — they are logged, not propagated.
    pub async fn replay<F>(
        &self,
        occurred_before: DateTime<Utc>,
        resource_types: Option<Vec<String>>,
        mut handler: F,
    ) -> Result<(), EventChainError>
    where
        F: FnMut(&Event) -> Result<(), anyhow::Error>,
    {
        let events = self.repo.before(occurred_before, resource_types).await?;
        for batch in events.chunks(100) {
            for event in batch {
                if let Err(e) = handler(event) {
                    tracing::error!(sequence_num = event.sequence_num, error = %e, "replay handler failed, continuing");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::InMemoryEventRepository;

    fn empty_payload() -> HashMap<String, Value> {
        HashMap::new()
    }

    #[tokio::test]
    async fn sequence_numbers_are_contiguous_from_one() {
        let repo: Arc<dyn EventRepository> = Arc::new(InMemoryEventRepository::new());
        let chain = EventChain::new(repo).await.unwrap();
        for _ in 0..5 {
            chain
                .create_event(None, ActorType::System, EventKind::RoleCreated, "role".to_string(), None, None, empty_payload())
                .await
                .unwrap();
        }
        let report = chain.verify_range(1, 5).await.unwrap();
        assert!(report.valid, "{:?}", report.errors);
    }

    #[tokio::test]
    async fn tampering_with_a_payload_is_detected() {
        let repo = Arc::new(InMemoryEventRepository::new());
        let trait_repo: Arc<dyn EventRepository> = repo.clone();
        let chain = EventChain::new(trait_repo).await.unwrap();
        for _ in 0..5 {
            chain
                .create_event(None, ActorType::System, EventKind::RoleCreated, "role".to_string(), None, None, empty_payload())
                .await
                .unwrap();
        }

        let mut tampered = repo.range(3, 3).await.unwrap().remove(0);
        tampered.payload.insert("tampered".to_string(), Value::Bool(true));
        repo.append(tampered).await.unwrap();

        let report = chain.verify_range(1, 5).await.unwrap();
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains('3')));
    }
}
