//! Per-consultation serialization of commit-then-broadcast sections.
//!
//! Holding the consultation's guard across "store write, then enqueue to
//! the registry" makes broadcast order equal commit order, so a peer never
//! sees `session-ended` before a message that committed earlier.

use crate::models::ConsultationId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Idle locks are pruned once the map grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Default)]
pub struct Sequencer {
    locks: Mutex<HashMap<ConsultationId, Arc<Mutex<()>>>>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one consultation.
    pub async fn lock(&self, consultation_id: ConsultationId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() > PRUNE_THRESHOLD {
                // Only the map holds an idle lock; guards keep their Arc alive.
                locks.retain(|id, lock| *id == consultation_id || Arc::strong_count(lock) > 1);
            }
            Arc::clone(locks.entry(consultation_id).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}
